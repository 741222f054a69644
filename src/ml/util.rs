// ============================================================
// Layer 5 — Tensor Helpers
// ============================================================
// Small numerically careful building blocks shared by the
// executor, the scorer and the losses. Everything here works on
// rank-1 tensors; scalars are rank-1 tensors of shape [1].

use burn::prelude::*;
use burn::tensor::activation;

/// Fill value for masked logits. Large and finite so that
/// `exp(fill - max)` underflows to zero without producing NaNs.
pub const MASK_FILL: f32 = -1e7;

/// Added inside logarithms of probabilities.
pub const LOG_EPS: f32 = 1e-10;

pub fn vector<B: Backend>(values: Vec<f32>, device: &B::Device) -> Tensor<B, 1> {
    let len = values.len();
    Tensor::<B, 1>::from_data(TensorData::new(values, [len]), device)
}

pub fn matrix<B: Backend>(
    values: Vec<f32>,
    rows:   usize,
    cols:   usize,
    device: &B::Device,
) -> Tensor<B, 2> {
    Tensor::<B, 2>::from_data(TensorData::new(values, [rows, cols]), device)
}

pub fn scalar<B: Backend>(value: f32, device: &B::Device) -> Tensor<B, 1> {
    vector(vec![value], device)
}

pub fn to_vec<B: Backend>(tensor: Tensor<B, 1>) -> Vec<f32> {
    tensor.into_data().convert::<f32>().to_vec::<f32>().unwrap_or_default()
}

/// Value of a shape-[1] tensor.
pub fn scalar_value<B: Backend>(tensor: Tensor<B, 1>) -> f32 {
    tensor.into_scalar().elem::<f32>()
}

/// Bool mask tensor where `true` marks positions to fill.
pub fn fill_mask<B: Backend>(keep: &[bool], device: &B::Device) -> Tensor<B, 1, Bool> {
    let fill: Vec<bool> = keep.iter().map(|k| !k).collect();
    let len = fill.len();
    Tensor::<B, 1, Bool>::from_data(TensorData::new(fill, [len]), device)
}

/// Replace every position where `keep` is false with MASK_FILL.
pub fn mask_logits<B: Backend>(logits: Tensor<B, 1>, keep: &[bool]) -> Tensor<B, 1> {
    let device = logits.device();
    logits.mask_fill(fill_mask::<B>(keep, &device), MASK_FILL)
}

/// log(sum(exp(values))) over a non-empty vector; returns shape [1].
///
/// The shift is taken from the detached host values so it never
/// contributes a gradient path.
pub fn logsumexp<B: Backend>(values: Tensor<B, 1>) -> Tensor<B, 1> {
    let host  = to_vec(values.clone().detach());
    let max   = host.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let shift = if max.is_finite() { max } else { 0.0 };
    values.sub_scalar(shift).exp().sum().log().add_scalar(shift)
}

pub fn log_softmax<B: Backend>(logits: Tensor<B, 1>) -> Tensor<B, 1> {
    activation::log_softmax(logits, 0)
}

pub fn masked_softmax<B: Backend>(logits: Tensor<B, 1>, keep: &[bool]) -> Tensor<B, 1> {
    activation::softmax(mask_logits(logits, keep), 0)
}

/// Scale a vector to sum to one; all-zero stays all-zero.
pub fn normalise<B: Backend>(values: Tensor<B, 1>) -> Tensor<B, 1> {
    let total = values.clone().sum().add_scalar(LOG_EPS);
    values.div(total)
}

/// `first · second` for two vectors of equal length; returns shape [1].
pub fn dot<B: Backend>(first: Tensor<B, 1>, second: Tensor<B, 1>) -> Tensor<B, 1> {
    first.mul(second).sum()
}

/// Sum a list of shape-[1] tensors; zero when the list is empty.
pub fn sum_all<B: Backend>(terms: Vec<Tensor<B, 1>>, device: &B::Device) -> Tensor<B, 1> {
    if terms.is_empty() {
        return scalar(0.0, device);
    }
    Tensor::cat(terms, 0).sum()
}

pub fn argmax(values: &[f32]) -> Option<usize> {
    values
        .iter()
        .enumerate()
        .fold(None, |best: Option<(usize, f32)>, (i, &v)| match best {
            Some((_, b)) if b >= v => best,
            _ => Some((i, v)),
        })
        .map(|(i, _)| i)
}
