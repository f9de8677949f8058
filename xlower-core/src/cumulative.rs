//! Prefix and suffix scans along one axis.
//!
//! A scan is a single windowed reduction: the window spans the whole axis and
//! slides with stride 1 over the input padded with `init` on one side. The
//! amount and side of the padding select inclusive or exclusive and forward
//! or reverse; an exclusive scan yields one extra element which is sliced off.

use crate::{Dim, GraphTensor, ReduceOp};

/// Scan `input` along `dim` with `operator`, `init` being its identity.
///
/// The output has the shape of `input`. The scanned axis must be static.
pub fn build_cumulative_computation(
    input: &GraphTensor,
    dim: usize,
    operator: ReduceOp,
    init: &GraphTensor,
    exclusive: bool,
    reverse: bool,
) -> GraphTensor {
    let rank = input.rank();
    assert!(dim < rank, "scan axis {dim} out of range for {}", input.shape());
    let size = match input.dim(dim) {
        Dim::Static(n) => n,
        Dim::Dynamic(_) => panic!("scan axis {dim} of {} is dynamic", input.shape()),
    };
    if size == 0 {
        return input.clone();
    }

    let window_strides = vec![1; rank];
    let mut window_dims = vec![1; rank];
    window_dims[dim] = size;
    let mut padding = vec![(0, 0); rank];
    padding[dim].0 = size - usize::from(!exclusive);
    if reverse {
        let (lo, hi) = padding[dim];
        padding[dim] = (hi, lo);
    }
    log::trace!(
        "scan {} along {dim}: window {window_dims:?}, padding {padding:?}",
        operator.name()
    );
    let result =
        input.reduce_window_with_padding(init, operator, &window_dims, &window_strides, &padding);
    if exclusive {
        let offset = usize::from(reverse);
        result.slice_in_dim(offset, size + offset, 1, dim)
    } else {
        result
    }
}

pub fn build_cumsum(input: &GraphTensor, dim: usize, exclusive: bool, reverse: bool) -> GraphTensor {
    let init = GraphTensor::zero(&input.graph(), input.elem());
    build_cumulative_computation(input, dim, ReduceOp::Add, &init, exclusive, reverse)
}

pub fn build_cumprod(
    input: &GraphTensor,
    dim: usize,
    exclusive: bool,
    reverse: bool,
) -> GraphTensor {
    let init = GraphTensor::one(&input.graph(), input.elem());
    build_cumulative_computation(input, dim, ReduceOp::Mul, &init, exclusive, reverse)
}

/// Running maximum; exclusive positions with nothing before them hold the type minimum.
pub fn build_cummax(input: &GraphTensor, dim: usize, exclusive: bool, reverse: bool) -> GraphTensor {
    let init = GraphTensor::min_value(&input.graph(), input.elem());
    build_cumulative_computation(input, dim, ReduceOp::Max, &init, exclusive, reverse)
}

/// Running minimum; exclusive positions with nothing before them hold the type maximum.
pub fn build_cummin(input: &GraphTensor, dim: usize, exclusive: bool, reverse: bool) -> GraphTensor {
    let init = GraphTensor::max_value(&input.graph(), input.elem());
    build_cumulative_computation(input, dim, ReduceOp::Min, &init, exclusive, reverse)
}
