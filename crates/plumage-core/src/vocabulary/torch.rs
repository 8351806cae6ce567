//! Minimal reader for Torch7 serialized tables.
//!
//! Word vocabularies for the CUB description data ship as `.t7` files holding
//! a single table of byte-string keys and numeric indices. Only the object
//! types such a table can contain are decoded; anything else is a format
//! error. Integers are little-endian `i32`, numbers little-endian `f64`.

use std::collections::HashMap;
use std::path::Path;

use crate::error::VocabularyError;

const TYPE_NIL: i32 = 0;
const TYPE_NUMBER: i32 = 1;
const TYPE_STRING: i32 = 2;
const TYPE_TABLE: i32 = 3;
const TYPE_TORCH: i32 = 4;
const TYPE_BOOLEAN: i32 = 5;

/// Deepest table nesting accepted. A word table needs one level.
const MAX_DEPTH: usize = 64;

#[derive(Debug, Clone, PartialEq)]
enum Value {
    Nil,
    Number(f64),
    Bytes(Vec<u8>),
    Boolean(bool),
    Table(Vec<(Value, Value)>),
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
    /// Tables already read, keyed by their serialization index.
    seen: HashMap<i32, Value>,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            seen: HashMap::new(),
        }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], String> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| format!("unexpected end of file at byte {}", self.pos))?;
        let data = self.data;
        let bytes = &data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn read_i32(&mut self) -> Result<i32, String> {
        let bytes = self.take(4)?;
        Ok(i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn read_f64(&mut self) -> Result<f64, String> {
        let bytes = self.take(8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(bytes);
        Ok(f64::from_le_bytes(buf))
    }

    fn read_len(&mut self) -> Result<usize, String> {
        let len = self.read_i32()?;
        usize::try_from(len).map_err(|_| format!("negative length {len}"))
    }

    fn read_object(&mut self) -> Result<Value, String> {
        self.read_nested(0)
    }

    fn read_nested(&mut self, depth: usize) -> Result<Value, String> {
        match self.read_i32()? {
            TYPE_NIL => Ok(Value::Nil),
            TYPE_NUMBER => Ok(Value::Number(self.read_f64()?)),
            TYPE_STRING => {
                let len = self.read_len()?;
                Ok(Value::Bytes(self.take(len)?.to_vec()))
            }
            TYPE_BOOLEAN => Ok(Value::Boolean(self.read_i32()? == 1)),
            TYPE_TABLE => {
                let index = self.read_i32()?;
                if let Some(table) = self.seen.get(&index) {
                    return Ok(table.clone());
                }
                if depth >= MAX_DEPTH {
                    return Err(format!(
                        "tables nested deeper than {MAX_DEPTH} levels at byte {}",
                        self.pos
                    ));
                }
                let size = self.read_len()?;
                let mut entries = Vec::with_capacity(size.min(1 << 20));
                for _ in 0..size {
                    let key = self.read_nested(depth + 1)?;
                    let value = self.read_nested(depth + 1)?;
                    entries.push((key, value));
                }
                let table = Value::Table(entries);
                self.seen.insert(index, table.clone());
                Ok(table)
            }
            TYPE_TORCH => Err("torch class objects are not supported".to_string()),
            other => Err(format!("unsupported object type {other}")),
        }
    }
}

/// Read a `.t7` file holding a table of word → 1-based index.
pub(crate) fn read_word_table(path: &Path) -> Result<Vec<(String, i64)>, VocabularyError> {
    let data = std::fs::read(path).map_err(|e| VocabularyError::Read {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    parse_word_table(&data).map_err(|message| VocabularyError::Format {
        path: path.to_path_buf(),
        message,
    })
}

fn parse_word_table(data: &[u8]) -> Result<Vec<(String, i64)>, String> {
    let entries = match Reader::new(data).read_object()? {
        Value::Table(entries) => entries,
        other => return Err(format!("expected a table at the top level, found {other:?}")),
    };

    entries
        .into_iter()
        .map(|(key, value)| {
            let word = match key {
                Value::Bytes(bytes) => {
                    String::from_utf8(bytes).map_err(|e| format!("key is not UTF-8: {e}"))?
                }
                other => return Err(format!("expected a string key, found {other:?}")),
            };
            let index = match value {
                Value::Number(n) if n.fract() == 0.0 && n.abs() < i64::MAX as f64 => n as i64,
                other => {
                    return Err(format!(
                        "expected an integer index for {word:?}, found {other:?}"
                    ))
                }
            };
            Ok((word, index))
        })
        .collect()
}
