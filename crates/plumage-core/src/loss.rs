//! Symmetric structured joint embedding loss between image and text embeddings.
//!
//! Compatibility between an image embedding `v` and a text embedding `t` is
//! the inner product `<v, t>`. For every image, the mean compatibility with
//! the descriptions of each class is ranked with a hinge margin of 1 against
//! its own class; the same is done for every description against the images
//! of each class. The loss is the mean hinge over images plus the mean hinge
//! over descriptions.
//!
//! The loss is built from tensor operations, so on an autodiff backend its
//! gradients come from `backward()`. The image encoder is frozen, so training
//! only tracks the text side.

use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};
use ndarray::ArrayView1;

use crate::error::LossError;

/// Ranking margin between the true class and any other class.
const MARGIN: f32 = 1.0;

/// Pairwise compatibility `<v_i, t_j>`, `[images, texts]`.
pub fn compatibility<B: Backend>(images: Tensor<B, 2>, texts: Tensor<B, 2>) -> Tensor<B, 2> {
    images.matmul(texts.transpose())
}

/// Joint embedding loss between `N` image embeddings and their descriptions.
///
/// Text layouts:
/// - `batched == false`: `[N, D]` (one description per image) or `[N, n, D]`
/// - `batched == true`: `[N·n, D]`, the `n` descriptions of image `i` in rows
///   `i·n..(i+1)·n`
///
/// Every description carries the label of its image. Returns a one-element
/// tensor.
pub fn encoders_loss<B: Backend, const D: usize>(
    images: Tensor<B, 2>,
    texts: Tensor<B, D>,
    labels: ArrayView1<i64>,
    batched: bool,
) -> Result<Tensor<B, 1>, LossError> {
    let [n_images, dim] = images.dims();
    if labels.len() != n_images {
        return Err(mismatch(format!(
            "{} image embeddings but {} labels",
            n_images,
            labels.len()
        )));
    }

    let text_shape = texts.dims().to_vec();
    let per_image = descriptions_per_image(&text_shape, n_images, batched)?;
    if text_shape.last() != Some(&dim) {
        return Err(mismatch(format!(
            "image embeddings have {dim} dimensions, text embeddings have shape {text_shape:?}"
        )));
    }

    let mut classes = labels.to_vec();
    classes.sort_unstable();
    classes.dedup();
    if classes.len() < 2 {
        return Err(LossError::SingleClass);
    }

    let image_class: Vec<usize> = labels
        .iter()
        .map(|label| classes.partition_point(|c| c < label))
        .collect();
    let rows = n_images * per_image;
    let text_class: Vec<usize> = (0..rows).map(|j| image_class[j / per_image]).collect();

    let device = images.device();
    let texts: Tensor<B, 2> = texts.reshape([rows, dim]);
    let scores = compatibility(images, texts);

    // Image side ranks classes of descriptions, text side classes of images
    let image_value = ranking_side(
        scores.clone(),
        &image_class,
        &text_class,
        classes.len(),
        &device,
    );
    let text_value = ranking_side(
        scores.transpose(),
        &text_class,
        &image_class,
        classes.len(),
        &device,
    );
    Ok(image_value + text_value)
}

/// Number of descriptions per image implied by the text layout.
fn descriptions_per_image(
    text_shape: &[usize],
    n_images: usize,
    batched: bool,
) -> Result<usize, LossError> {
    let per_image = match (batched, text_shape) {
        (true, &[rows, _]) => {
            if n_images == 0 || rows % n_images != 0 {
                return Err(mismatch(format!(
                    "{rows} batched text rows do not split evenly over {n_images} images"
                )));
            }
            rows / n_images
        }
        (false, &[rows, _]) | (false, &[rows, _, _]) if rows != n_images => {
            return Err(mismatch(format!(
                "{n_images} image embeddings but {rows} text rows"
            )));
        }
        (false, &[_, _]) => 1,
        (false, &[_, n, _]) => n,
        _ => {
            return Err(mismatch(format!(
                "unsupported text embedding shape {text_shape:?} (batched = {batched})"
            )));
        }
    };

    if per_image == 0 {
        return Err(mismatch("no text embeddings".to_string()));
    }
    Ok(per_image)
}

/// One direction of the ranking loss.
///
/// `scores[a, b]` is the compatibility of anchor `a` with candidate `b`.
/// Each anchor is scored against its mean compatibility with the candidates
/// of every class; the result is the mean hinge over anchors.
fn ranking_side<B: Backend>(
    scores: Tensor<B, 2>,
    anchor_class: &[usize],
    candidate_class: &[usize],
    n_classes: usize,
    device: &B::Device,
) -> Tensor<B, 1> {
    let n_anchors = anchor_class.len();
    let n_candidates = candidate_class.len();

    let mut counts = vec![0usize; n_classes];
    for &c in candidate_class {
        counts[c] += 1;
    }
    // Column c averages the candidates of class c
    let mut averaging = vec![0.0f32; n_candidates * n_classes];
    for (b, &c) in candidate_class.iter().enumerate() {
        averaging[b * n_classes + c] = 1.0 / counts[c] as f32;
    }
    let mut truth = vec![0.0f32; n_anchors * n_classes];
    for (a, &c) in anchor_class.iter().enumerate() {
        truth[a * n_classes + c] = 1.0;
    }
    let others: Vec<f32> = truth.iter().map(|t| 1.0 - t).collect();

    let averaging = matrix::<B>(averaging, [n_candidates, n_classes], device);
    let truth = matrix::<B>(truth, [n_anchors, n_classes], device);
    let others = matrix::<B>(others, [n_anchors, n_classes], device);
    let spread = matrix::<B>(vec![1.0; n_classes], [1, n_classes], device);

    let means = scores.matmul(averaging);
    let truth_score = (means.clone() * truth).sum_dim(1).matmul(spread);

    // The true class column is zeroed, which the clamp at 0 makes harmless
    (means - truth_score)
        .add_scalar(MARGIN)
        .mul(others)
        .max_dim(1)
        .clamp_min(0.0)
        .mean()
}

fn matrix<B: Backend>(values: Vec<f32>, shape: [usize; 2], device: &B::Device) -> Tensor<B, 2> {
    Tensor::from_data(TensorData::new(values, shape), device)
}

fn mismatch(message: String) -> LossError {
    LossError::BatchMismatch { message }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{default_device, InferenceBackend, TrainingBackend};
    use burn::tensor::ElementConversion;
    use ndarray::arr1;

    type B = InferenceBackend;
    type TB = TrainingBackend;

    fn tensor<Bk: Backend<Device = burn::backend::ndarray::NdArrayDevice>, const D: usize>(values: &[f32], shape: [usize; D]) -> Tensor<Bk, D> {
        Tensor::from_data(TensorData::new(values.to_vec(), shape), &default_device())
    }

    /// Deterministic, well-spread fixtures: three classes, two descriptions each.
    fn fixture() -> (Vec<f32>, Vec<f32>) {
        let images = (0..12)
            .map(|k| ((k / 4 * 7 + k % 4 * 3) % 11) as f32 / 11.0 - 0.5)
            .collect();
        let texts = (0..24)
            .map(|k| ((k / 4 * 5 + k % 4 * 7 + 3) % 13) as f32 / 13.0 - 0.5)
            .collect();
        (images, texts)
    }

    fn value<const D: usize>(images: Tensor<B, 2>, texts: Tensor<B, D>, labels: &[i64], batched: bool) -> f32 {
        let labels = arr1(labels);
        encoders_loss(images, texts, labels.view(), batched)
            .unwrap()
            .into_scalar()
            .elem()
    }

    #[test]
    fn test_compatibility_prefers_matched_pairs() {
        let images = tensor::<B, 2>(&[1.0, 0.0, 0.0, 1.0], [2, 2]);
        let texts = tensor::<B, 2>(&[0.9, 0.1, 0.2, 0.8], [2, 2]);
        let scores = compatibility(images, texts).into_data().to_vec::<f32>().unwrap();
        assert!(scores[0] > scores[1]);
        assert!(scores[3] > scores[2]);
    }

    #[test]
    fn test_matched_batch_has_lower_loss() {
        let diagonal = [2.0, 0.0, 0.0, 0.0, 2.0, 0.0, 0.0, 0.0, 2.0];
        let rotated = [0.0, 2.0, 0.0, 0.0, 0.0, 2.0, 2.0, 0.0, 0.0];
        let labels = [1, 2, 3];

        let good = value(tensor(&diagonal, [3, 3]), tensor::<B, 2>(&diagonal, [3, 3]), &labels, true);
        let bad = value(tensor(&diagonal, [3, 3]), tensor::<B, 2>(&rotated, [3, 3]), &labels, true);
        assert_eq!(good, 0.0);
        assert!(bad > good, "{bad} should exceed {good}");
    }

    #[test]
    fn test_single_description_layout() {
        let images = [1.0, 0.0, 0.0, 1.0];
        let texts = [0.0, 1.0, 1.0, 0.0];
        let labels = [1, 2];

        let squeezed = value(tensor(&images, [2, 2]), tensor::<B, 2>(&texts, [2, 2]), &labels, false);
        let batched = value(tensor(&images, [2, 2]), tensor::<B, 2>(&texts, [2, 2]), &labels, true);
        assert_eq!(squeezed, batched);
        // Both hinges are 1 + 1 - 0 on each side
        assert!((squeezed - 4.0).abs() < 1e-6);
    }

    #[test]
    fn test_backward_gives_ranking_subgradients() {
        let images = tensor::<TB, 2>(&[1.0, 0.0, 0.0, 1.0], [2, 2]).require_grad();
        let texts = tensor::<TB, 2>(&[0.0, 1.0, 1.0, 0.0], [2, 2]).require_grad();
        let labels = arr1(&[1, 2]);

        let loss = encoders_loss(images.clone(), texts.clone(), labels.view(), true).unwrap();
        let grads = loss.backward();

        let text_grad = texts.grad(&grads).unwrap().into_data().to_vec::<f32>().unwrap();
        let image_grad = images.grad(&grads).unwrap().into_data().to_vec::<f32>().unwrap();
        let close = |a: &[f32], b: &[f32]| a.iter().zip(b).all(|(x, y)| (x - y).abs() < 1e-6);
        assert!(close(&text_grad, &[-1.0, 1.0, 1.0, -1.0]), "{text_grad:?}");
        assert!(close(&image_grad, &[1.0, -1.0, -1.0, 1.0]), "{image_grad:?}");
    }

    #[test]
    fn test_gradient_step_lowers_loss() {
        let (images, texts) = fixture();
        let labels = arr1(&[5, 2, 9]);
        let frozen = tensor::<TB, 2>(&images, [3, 4]);
        let texts = tensor::<TB, 2>(&texts, [6, 4]).require_grad();

        let loss = encoders_loss(frozen.clone(), texts.clone(), labels.view(), true).unwrap();
        let before: f32 = loss.clone().into_scalar().elem();
        assert!(before > 0.0);
        let grads = loss.backward();
        let step = texts.grad(&grads).unwrap().mul_scalar(0.05);
        let moved = Tensor::<TB, 2>::from_inner(texts.inner().sub(step));

        let after: f32 = encoders_loss(frozen, moved, labels.view(), true)
            .unwrap()
            .into_scalar()
            .elem();
        assert!(after < before, "loss went from {before} to {after}");
    }

    #[test]
    fn test_batched_and_unbatched_layouts_agree() {
        let (images, texts) = fixture();
        let labels = [5, 2, 9];

        let batched = value(tensor(&images, [3, 4]), tensor::<B, 2>(&texts, [6, 4]), &labels, true);
        let unbatched = value(tensor(&images, [3, 4]), tensor::<B, 3>(&texts, [3, 2, 4]), &labels, false);
        assert!((batched - unbatched).abs() < 1e-6);
    }

    #[test]
    fn test_repeated_labels_share_class_means() {
        // Two images of class 1 and one of class 2
        let images = [1.0, 0.0, 1.0, 0.0, 0.0, 1.0];
        let texts: Vec<f32> = images.iter().map(|v| v * 2.0).collect();
        let loss = value(tensor(&images, [3, 2]), tensor::<B, 2>(&texts, [3, 2]), &[1, 1, 2], true);
        assert_eq!(loss, 0.0);
    }

    #[test]
    fn test_shape_mismatches_are_rejected() {
        let labels = arr1(&[1, 2, 3]);
        let images = || Tensor::<B, 2>::zeros([3, 4], &default_device());
        let zeros2 = |shape: [usize; 2]| Tensor::<B, 2>::zeros(shape, &default_device());
        let is_mismatch = |r: Result<Tensor<B, 1>, LossError>| {
            matches!(r, Err(LossError::BatchMismatch { .. }))
        };

        assert!(is_mismatch(encoders_loss(images(), zeros2([4, 4]), labels.view(), true)));
        assert!(is_mismatch(encoders_loss(images(), zeros2([4, 4]), labels.view(), false)));
        assert!(is_mismatch(encoders_loss(images(), zeros2([3, 5]), labels.view(), true)));

        let short_labels = arr1(&[1, 2]);
        assert!(is_mismatch(encoders_loss(images(), zeros2([3, 4]), short_labels.view(), true)));

        let stacked = Tensor::<B, 3>::zeros([3, 2, 4], &default_device());
        assert!(is_mismatch(encoders_loss(images(), stacked, labels.view(), true)));
    }

    #[test]
    fn test_single_class_is_rejected() {
        let images = Tensor::<B, 2>::ones([2, 3], &default_device());
        let texts = Tensor::<B, 2>::ones([2, 3], &default_device());
        let labels = arr1(&[4, 4]);
        assert!(matches!(
            encoders_loss(images, texts, labels.view(), true),
            Err(LossError::SingleClass)
        ));
    }
}
