//! Symbol vocabularies for one-hot text encoding.
//!
//! A [`Vocabulary`] is a bidirectional symbol ↔ index mapping at either
//! character or word resolution. Character vocabularies are built from a fixed
//! alphabet; word vocabularies are loaded from an external table whose indices
//! start at 1 and are shifted down to start at 0.
//!
//! Alias entries resolve to an existing index without counting toward
//! [`Vocabulary::len`], which is the width of every one-hot tensor.

mod torch;

use std::collections::HashMap;
use std::path::Path;

use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, PlumageError, VocabularyError};

/// Character alphabet in index order. `-` appears twice; only its first
/// occurrence gets an index.
const ALPHABET: &str = "abcdefghijklmnopqrstuvwxyz0123456789 -,;.!?:'\"/\\|_@#$%^&*~`+-=<>()[]{}";

/// Alias symbols of the character vocabulary: (alias, canonical).
const CHAR_ALIASES: &[(&str, &str)] = &[("ï", "i")];

/// Temporal resolution of a vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    /// One token per character
    #[default]
    Char,
    /// One token per whitespace-separated word
    Word,
}

impl Level {
    /// Split text into tokens at this resolution.
    pub fn split<'a>(&self, text: &'a str) -> Vec<&'a str> {
        match self {
            Level::Char => text
                .char_indices()
                .map(|(i, c)| &text[i..i + c.len_utf8()])
                .collect(),
            Level::Word => text.split_whitespace().collect(),
        }
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Level::Char => write!(f, "char"),
            Level::Word => write!(f, "word"),
        }
    }
}

/// A vocabulary entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Entry {
    index: usize,
    /// Aliases share an index with a canonical symbol and are excluded from `len`.
    alias: bool,
}

/// Bidirectional symbol ↔ index mapping.
#[derive(Debug, Clone)]
pub struct Vocabulary {
    level: Level,
    entries: HashMap<String, Entry>,
    /// Canonical symbol for each index.
    symbols: Vec<String>,
}

impl Vocabulary {
    /// Build the fixed character-level vocabulary.
    pub fn characters() -> Self {
        let mut vocab = Self {
            level: Level::Char,
            entries: HashMap::new(),
            symbols: Vec::new(),
        };
        for c in ALPHABET.chars() {
            let symbol = c.to_string();
            if vocab.entries.contains_key(&symbol) {
                continue;
            }
            vocab.entries.insert(
                symbol.clone(),
                Entry {
                    index: vocab.symbols.len(),
                    alias: false,
                },
            );
            vocab.symbols.push(symbol);
        }
        for (alias, canonical) in CHAR_ALIASES {
            if let Some(&Entry { index, .. }) = vocab.entries.get(*canonical) {
                vocab
                    .entries
                    .insert(alias.to_string(), Entry { index, alias: true });
            }
        }
        vocab
    }

    /// Build a word-level vocabulary from `(word, 1-based index)` pairs.
    ///
    /// Indices must cover `1..=n` exactly once for `n` words.
    pub fn from_one_based<I>(pairs: I, source: &Path) -> Result<Self, VocabularyError>
    where
        I: IntoIterator<Item = (String, i64)>,
    {
        let pairs: Vec<(String, i64)> = pairs.into_iter().collect();
        let len = pairs.len();
        let mut slots: Vec<Option<String>> = vec![None; len];
        let mut entries = HashMap::with_capacity(len);

        for (word, one_based) in pairs {
            if one_based < 1 || one_based as usize > len {
                return Err(VocabularyError::Format {
                    path: source.to_path_buf(),
                    message: format!(
                        "index {one_based} of {word:?} outside 1..={len}"
                    ),
                });
            }
            let index = one_based as usize - 1;
            if let Some(existing) = &slots[index] {
                return Err(VocabularyError::Format {
                    path: source.to_path_buf(),
                    message: format!("{word:?} and {existing:?} share index {one_based}"),
                });
            }
            slots[index] = Some(word.clone());
            entries.insert(word, Entry { index, alias: false });
        }

        // Every slot is filled: `len` distinct indices in 0..len.
        let symbols = slots.into_iter().flatten().collect();
        Ok(Self {
            level: Level::Word,
            entries,
            symbols,
        })
    }

    /// Load a word-level vocabulary table.
    ///
    /// `.t7` files are Torch7 serialized tables; `.json` files hold an object
    /// of word → index. Both use 1-based indices.
    pub fn load_words(path: &Path) -> Result<Self, VocabularyError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());

        let pairs = match extension.as_deref() {
            Some("t7") => torch::read_word_table(path)?,
            Some("json") => {
                let content =
                    std::fs::read_to_string(path).map_err(|e| VocabularyError::Read {
                        path: path.to_path_buf(),
                        message: e.to_string(),
                    })?;
                let table: HashMap<String, i64> =
                    serde_json::from_str(&content).map_err(|e| VocabularyError::Format {
                        path: path.to_path_buf(),
                        message: e.to_string(),
                    })?;
                table.into_iter().collect()
            }
            _ => {
                return Err(VocabularyError::Format {
                    path: path.to_path_buf(),
                    message: "expected a .t7 or .json vocabulary table".to_string(),
                })
            }
        };

        let vocab = Self::from_one_based(pairs, path)?;
        tracing::info!("Loaded word vocabulary: {} words from {:?}", vocab.len(), path);
        Ok(vocab)
    }

    /// Build the vocabulary for a configured level.
    ///
    /// Word level without a table path is a configuration error.
    pub fn from_config(level: Level, table: Option<&Path>) -> Result<Self, PlumageError> {
        match level {
            Level::Char => {
                if let Some(path) = table {
                    tracing::warn!("Ignoring vocabulary file {:?} at char level", path);
                }
                Ok(Self::characters())
            }
            Level::Word => {
                let path = table.ok_or_else(|| {
                    ConfigError::ValidationError(
                        "vocabulary.file is required when vocabulary.level = \"word\"".into(),
                    )
                })?;
                Ok(Self::load_words(path)?)
            }
        }
    }

    /// Temporal resolution of this vocabulary.
    pub fn level(&self) -> Level {
        self.level
    }

    /// Number of distinct usable indices (aliases excluded).
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    /// Whether the vocabulary is empty.
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Index of a token, following aliases.
    pub fn index_of(&self, token: &str) -> Option<usize> {
        self.entries.get(token).map(|e| e.index)
    }

    /// Whether a token is an alias of another symbol.
    pub fn is_alias(&self, token: &str) -> bool {
        self.entries.get(token).is_some_and(|e| e.alias)
    }

    /// Canonical symbol at an index.
    pub fn symbol(&self, index: usize) -> Option<&str> {
        self.symbols.get(index).map(String::as_str)
    }

    /// Split text into tokens at this vocabulary's resolution.
    pub fn split<'a>(&self, text: &'a str) -> Vec<&'a str> {
        self.level.split(text)
    }

    /// One-hot encode stored character codes into a `[len, cutoff]` tensor.
    ///
    /// Codes past `cutoff` are dropped before decoding to characters.
    pub fn encode(&self, codes: &[u32], cutoff: usize) -> Result<Array2<f32>, VocabularyError> {
        let text = codes
            .iter()
            .take(cutoff)
            .map(|&code| char::from_u32(code).ok_or(VocabularyError::InvalidCharCode { code }))
            .collect::<Result<String, _>>()?;
        self.encode_text(&text, cutoff)
    }

    /// One-hot encode text into a `[len, cutoff]` tensor.
    ///
    /// Column `t` has a single 1 at the index of token `t`; columns past the
    /// last token stay zero.
    pub fn encode_text(&self, text: &str, cutoff: usize) -> Result<Array2<f32>, VocabularyError> {
        let mut one_hot = Array2::<f32>::zeros((self.len(), cutoff));
        for (t, token) in self.split(text).into_iter().take(cutoff).enumerate() {
            let index = self
                .index_of(token)
                .ok_or_else(|| VocabularyError::UnknownToken {
                    token: token.to_string(),
                })?;
            one_hot[[index, t]] = 1.0;
        }
        Ok(one_hot)
    }

    /// Decode a one-hot tensor column by column; all-zero columns are `None`.
    pub fn decode(&self, one_hot: ArrayView2<f32>) -> Vec<Option<String>> {
        one_hot
            .columns()
            .into_iter()
            .map(|column| {
                let (index, &value) = column
                    .iter()
                    .enumerate()
                    .max_by(|a, b| a.1.total_cmp(b.1))?;
                if value > 0.0 {
                    self.symbol(index).map(str::to_string)
                } else {
                    None
                }
            })
            .collect()
    }

    /// Decode a one-hot tensor back to text, stopping at the first empty column.
    pub fn decode_text(&self, one_hot: ArrayView2<f32>) -> String {
        let tokens: Vec<String> = self.decode(one_hot).into_iter().map_while(|t| t).collect();
        match self.level {
            Level::Char => tokens.concat(),
            Level::Word => tokens.join(" "),
        }
    }

    /// BLAKE3 hash of the level and all symbols in index order.
    ///
    /// Stored with checkpoints so an encoder is never paired with a
    /// vocabulary it was not trained on.
    pub fn content_hash(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.level.to_string().as_bytes());
        hasher.update(b"\n");
        for symbol in &self.symbols {
            hasher.update(symbol.as_bytes());
            hasher.update(b"\n");
        }
        hasher.finalize().to_hex().to_string()
    }
}
