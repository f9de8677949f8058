//! Loss functions with their paired gradient formulas.
//!
//! Each `*_backward` returns the gradient with respect to `input`, scaled
//! consistently with the reduction of its forward counterpart.

use std::{fmt, str::FromStr};

use crate::{reduction::average_value, Error, GraphTensor, ReduceOp};

/// How an elementwise loss is aggregated.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ReductionMode {
    None,
    #[default]
    Mean,
    Sum,
}

impl fmt::Display for ReductionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::None => "none",
            Self::Mean => "mean",
            Self::Sum => "sum",
        })
    }
}

impl FromStr for ReductionMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Self::None),
            "mean" => Ok(Self::Mean),
            "sum" => Ok(Self::Sum),
            other => Err(Error::msg(format!("unknown reduction mode {other:?}"))),
        }
    }
}

/// Integer encoding used by callers that pass the mode as an attribute.
impl TryFrom<i64> for ReductionMode {
    type Error = Error;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::None),
            1 => Ok(Self::Mean),
            2 => Ok(Self::Sum),
            other => Err(Error::msg(format!("unknown reduction mode {other}"))),
        }
    }
}

fn sum_all(x: &GraphTensor) -> GraphTensor {
    x.reduce_all(&GraphTensor::zero(&x.graph(), x.elem()), ReduceOp::Add)
}

fn weight_or_ones(input: &GraphTensor, weight: Option<&GraphTensor>) -> GraphTensor {
    match weight {
        Some(w) => {
            assert_eq!(
                w.dims(),
                input.dims(),
                "binary cross entropy: weight {} does not match input {}",
                w.shape(),
                input.shape()
            );
            w.clone()
        }
        None => GraphTensor::full(&input.graph(), 1.0, input.elem(), &input.dims()),
    }
}

/// `-w * (t * log(x) + (1 - t) * log(1 - x))`
pub fn build_binary_cross_entropy(
    input: &GraphTensor,
    target: &GraphTensor,
    weight: Option<&GraphTensor>,
    reduction: ReductionMode,
) -> GraphTensor {
    let weight = weight_or_ones(input, weight);
    let one = input.scalar_like(1.0);
    let result = -weight * (target * input.log() + (&one - target) * (&one - input).log());
    match reduction {
        ReductionMode::None => result,
        ReductionMode::Sum => sum_all(&result),
        ReductionMode::Mean => average_value(&result, &sum_all(&result)),
    }
}

/// `w * (x - t) / x / (1 - x) * grad_output`
pub fn build_binary_cross_entropy_backward(
    grad_output: &GraphTensor,
    input: &GraphTensor,
    target: &GraphTensor,
    weight: Option<&GraphTensor>,
    reduction: ReductionMode,
) -> GraphTensor {
    let weight = weight_or_ones(input, weight);
    let one = input.scalar_like(1.0);
    let result = weight * (input - target) / input / (&one - input) * grad_output;
    match reduction {
        ReductionMode::Mean => average_value(input, &result),
        ReductionMode::None | ReductionMode::Sum => result,
    }
}

/// `|x - t|`
pub fn build_l1_loss(
    input: &GraphTensor,
    target: &GraphTensor,
    reduction: ReductionMode,
) -> GraphTensor {
    let result = (input - target).abs();
    match reduction {
        ReductionMode::None => result,
        ReductionMode::Sum => sum_all(&result),
        ReductionMode::Mean => average_value(input, &sum_all(&result)),
    }
}

/// `sign(x - t) * grad_output`, where a tie counts as positive.
pub fn build_l1_loss_backward(
    grad_output: &GraphTensor,
    input: &GraphTensor,
    target: &GraphTensor,
    reduction: ReductionMode,
) -> GraphTensor {
    let positive = input.ge(target);
    if reduction == ReductionMode::None {
        let one = input.scalar_like(1.0);
        let mask = GraphTensor::select(&positive, &one, &-&one);
        return mask * grad_output;
    }
    let grad_value = match reduction {
        ReductionMode::Mean => average_value(input, grad_output),
        _ => grad_output.clone(),
    };
    GraphTensor::select(&positive, &grad_value, &-&grad_value)
}

/// Constant `1 / n` for a static input, or `None` when its size is dynamic.
fn static_scale(input: &GraphTensor) -> Option<(usize, GraphTensor)> {
    input
        .shape()
        .element_count()
        .map(|n| (n, input.scalar_like(1.0 / n as f64)))
}

/// `(x - t)^2`. The mean of an empty input is NaN.
pub fn build_mse_loss(
    input: &GraphTensor,
    target: &GraphTensor,
    reduction: ReductionMode,
) -> GraphTensor {
    let diff = input - target;
    let result = &diff * &diff;
    if reduction == ReductionMode::None {
        return result;
    }
    let result = sum_all(&result);
    if reduction == ReductionMode::Sum {
        return result;
    }
    match static_scale(input) {
        Some((0, _)) => GraphTensor::nan_value(&input.graph(), input.elem()),
        Some((_, scale)) => result * scale,
        None => average_value(input, &result),
    }
}

/// `2 * (x - t) * grad_output`, with `grad_output` scaled by `1 / n` under `Mean`.
pub fn build_mse_loss_backward(
    grad_output: &GraphTensor,
    input: &GraphTensor,
    target: &GraphTensor,
    reduction: ReductionMode,
) -> GraphTensor {
    let two = input.scalar_like(2.0);
    let d_input = two * (input - target);
    let grad_value = match reduction {
        ReductionMode::None | ReductionMode::Sum => grad_output.clone(),
        ReductionMode::Mean => match static_scale(input) {
            Some((_, scale)) => grad_output * scale,
            None => average_value(input, grad_output),
        },
    };
    d_input * grad_value
}
