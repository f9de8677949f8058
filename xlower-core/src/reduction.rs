//! Reductions over a subset of axes.
//!
//! Every builder here is a specialization of [`build_reduce`]: a fold with an
//! associative [`ReduceOp`] and its identity, followed by optional scaling and
//! a reshape that restores the reduced axes as size 1 when `keep_dims` is set.
//!
//! `dims` must be sorted, unique and below the input rank. This is a
//! precondition of every function in this module and is not re-checked in
//! release builds.

use crate::{
    shape::{all_dimensions, dimensions_size},
    Dim, DynamicSize, ElemType, GraphTensor, ReduceOp,
};

/// Shape bookkeeping of a single reduction.
#[derive(Clone)]
pub struct ReductionInfo {
    /// Output dims: reduced axes are dropped, or kept as 1 with `keep_dims`.
    pub new_dimensions: Vec<Dim>,
    /// Number of input elements folded into each output element.
    pub element_count: DynamicSize,
}

pub fn reduction_info(input: &GraphTensor, dims: &[usize], keep_dims: bool) -> ReductionInfo {
    let new_dimensions = input
        .dims()
        .into_iter()
        .enumerate()
        .filter_map(|(axis, d)| match (dims.contains(&axis), keep_dims) {
            (false, _) => Some(d),
            (true, true) => Some(Dim::Static(1)),
            (true, false) => None,
        })
        .collect();
    ReductionInfo {
        new_dimensions,
        element_count: dimensions_size(input, dims),
    }
}

fn restore_dims(result: GraphTensor, info: &ReductionInfo, keep_dims: bool) -> GraphTensor {
    if keep_dims {
        result.reshape(&info.new_dimensions)
    } else {
        result
    }
}

/// Fold `dims` of `input` with `operator`, starting from `init`.
pub fn build_reduce(
    input: &GraphTensor,
    dims: &[usize],
    keep_dims: bool,
    operator: ReduceOp,
    init: &GraphTensor,
) -> (GraphTensor, ReductionInfo) {
    let info = reduction_info(input, dims, keep_dims);
    let result = input.reduce(init, operator, dims);
    (restore_dims(result, &info, keep_dims), info)
}

/// `input * (count != 0 ? 1 / count : NaN)`, with `count` an integral scalar
/// converted to `elem`.
pub fn scale_value(input: &GraphTensor, count: &GraphTensor, elem: ElemType) -> GraphTensor {
    let graph = input.graph();
    let zero = GraphTensor::zero(&graph, count.elem());
    let one = GraphTensor::one(&graph, elem);
    let scale = GraphTensor::select(
        &count.ne(&zero),
        &(one / count.convert(elem)),
        &GraphTensor::nan_value(&graph, elem),
    );
    input * scale
}

/// Scale `reduced` by the total element count of `input`.
pub fn average_value(input: &GraphTensor, reduced: &GraphTensor) -> GraphTensor {
    let count = dimensions_size(input, &all_dimensions(input.rank()));
    scale_value(reduced, &count.size, input.elem())
}

fn summation(
    input: &GraphTensor,
    dims: &[usize],
    keep_dims: bool,
    scale: bool,
) -> (GraphTensor, ReductionInfo) {
    let info = reduction_info(input, dims, keep_dims);
    let init = GraphTensor::zero(&input.graph(), input.elem());
    let mut result = input.reduce(&init, ReduceOp::Add, dims);
    if scale {
        result = scale_value(&result, &info.element_count.size, input.elem());
    }
    (restore_dims(result, &info, keep_dims), info)
}

pub fn build_sum(input: &GraphTensor, dims: &[usize], keep_dims: bool) -> GraphTensor {
    summation(input, dims, keep_dims, false).0
}

pub fn build_prod(input: &GraphTensor, dims: &[usize], keep_dims: bool) -> GraphTensor {
    let init = GraphTensor::one(&input.graph(), input.elem());
    build_reduce(input, dims, keep_dims, ReduceOp::Mul, &init).0
}

/// Mean over `dims`; an empty reduction yields NaN.
pub fn build_mean(input: &GraphTensor, dims: &[usize], keep_dims: bool) -> GraphTensor {
    summation(input, dims, keep_dims, true).0
}

/// Standard deviation over `dims`. The unbiased estimator divides by
/// `count - 1`; with a single element that is NaN.
pub fn build_std_deviation(
    input: &GraphTensor,
    dims: &[usize],
    keep_dims: bool,
    unbiased: bool,
) -> GraphTensor {
    let mean = build_mean(input, dims, true);
    let bcast_mean = mean.broadcast_in_dim(&input.dims(), &all_dimensions(input.rank()));
    let diff = input - bcast_mean;
    let squared = &diff * &diff;
    let variance = if unbiased {
        let (sum, info) = summation(&squared, dims, keep_dims, false);
        let count = info.element_count.size;
        let one = GraphTensor::one(&input.graph(), count.elem());
        scale_value(&sum, &(&count - &one), input.elem())
    } else {
        summation(&squared, dims, keep_dims, true).0
    };
    variance.sqrt()
}

/// Logical AND over `dims`: 1 where every element is nonzero.
pub fn build_all(input: &GraphTensor, dims: &[usize], keep_dims: bool) -> GraphTensor {
    let init = GraphTensor::one(&input.graph(), input.elem());
    build_reduce(input, dims, keep_dims, ReduceOp::All, &init).0
}

/// Logical OR over `dims`: 1 where any element is nonzero.
pub fn build_any(input: &GraphTensor, dims: &[usize], keep_dims: bool) -> GraphTensor {
    let init = GraphTensor::zero(&input.graph(), input.elem());
    build_reduce(input, dims, keep_dims, ReduceOp::Any, &init).0
}

fn extremum_in_dims(
    input: &GraphTensor,
    dims: &[usize],
    keep_dims: bool,
    operator: ReduceOp,
) -> GraphTensor {
    let graph = input.graph();
    let init = match operator {
        ReduceOp::Max => GraphTensor::min_value(&graph, input.elem()),
        _ => GraphTensor::max_value(&graph, input.elem()),
    };
    let info = reduction_info(input, dims, keep_dims);
    // Only checkable when every reduced axis is static.
    if let Some(count) = info.element_count.static_size {
        assert!(
            count > 0,
            "{} over dims {dims:?} of {} reduces no elements",
            operator.name(),
            input.shape()
        );
    }
    let result = input.reduce(&init, operator, dims);
    restore_dims(result, &info, keep_dims)
}

pub fn build_max_in_dims(input: &GraphTensor, dims: &[usize], keep_dims: bool) -> GraphTensor {
    extremum_in_dims(input, dims, keep_dims, ReduceOp::Max)
}

pub fn build_max_in_dim(input: &GraphTensor, dim: usize, keep_dims: bool) -> GraphTensor {
    build_max_in_dims(input, &[dim], keep_dims)
}

pub fn build_min_in_dims(input: &GraphTensor, dims: &[usize], keep_dims: bool) -> GraphTensor {
    extremum_in_dims(input, dims, keep_dims, ReduceOp::Min)
}

pub fn build_min_in_dim(input: &GraphTensor, dim: usize, keep_dims: bool) -> GraphTensor {
    build_min_in_dims(input, &[dim], keep_dims)
}

/// `log(sum(exp(x - m))) + m` with `m` the maximum over `dims`.
pub fn build_logsumexp(input: &GraphTensor, dims: &[usize], keep_dims: bool) -> GraphTensor {
    let mut max_in_dims = build_max_in_dims(input, dims, true);
    let exps = (input - &max_in_dims).exp();
    let logs = build_sum(&exps, dims, keep_dims).log();
    if !keep_dims {
        // Summing the singleton axes drops them without changing values.
        max_in_dims = build_sum(&max_in_dims, dims, false);
    }
    logs + max_in_dims
}

fn arg_extremum(input: &GraphTensor, dim: i64, keep_dim: bool, find_max: bool) -> GraphTensor {
    let (operand, axis) = match usize::try_from(dim) {
        Ok(axis) => (input.clone(), axis),
        Err(_) => {
            let total = dimensions_size(input, &all_dimensions(input.rank()));
            let flat = match total.static_size {
                Some(n) => Dim::Static(n),
                None => Dim::Dynamic(total.size.id()),
            };
            (input.reshape(&[flat]), 0)
        }
    };
    let result = operand.arg_extremum(ElemType::I64, axis, find_max);
    if keep_dim {
        let mut dims = operand.dims();
        dims[axis] = Dim::Static(1);
        result.reshape(&dims)
    } else {
        result
    }
}

/// `s64` index of the maximum along `dim`, or over the flattened input when
/// `dim` is negative.
pub fn build_arg_max(input: &GraphTensor, dim: i64, keep_dim: bool) -> GraphTensor {
    arg_extremum(input, dim, keep_dim, true)
}

/// `s64` index of the minimum along `dim`, or over the flattened input when
/// `dim` is negative.
pub fn build_arg_min(input: &GraphTensor, dim: i64, keep_dim: bool) -> GraphTensor {
    arg_extremum(input, dim, keep_dim, false)
}
