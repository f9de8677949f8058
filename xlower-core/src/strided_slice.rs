//! NumPy style strided slicing.
//!
//! A slice spec has one entry per index expression. Each entry is a
//! `begin:end:stride` triple, modified by one bit in each of five masks:
//!
//! - `begin` / `end`: ignore the given bound and use the full extent in the
//!   direction of the stride.
//! - `ellipsis`: expands to as many whole axes as needed to cover the input.
//!   At most one entry may carry it; a spec without one gets an implicit
//!   trailing ellipsis.
//! - `new_axis`: inserts a size-1 axis without consuming an input axis.
//! - `shrink_axis`: takes the single element at `begin` and drops the axis.
//!
//! An entry with several structural bits is an ellipsis first, then a new
//! axis, then a shrink.

use crate::{Error, GraphTensor, Result};

/// The five bit masks of a slice spec, bit `i` applying to entry `i`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SliceMasks {
    pub begin: i32,
    pub end: i32,
    pub ellipsis: i32,
    pub new_axis: i32,
    pub shrink_axis: i32,
}

/// Concrete parameters of a strided slice over every input axis.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StridedSliceSpec {
    pub begin: Vec<i64>,
    pub end: Vec<i64>,
    pub strides: Vec<i64>,
    /// Shape of the raw slice, one entry per input axis.
    pub processing_sizes: Vec<usize>,
    /// Shape after inserting new axes and removing shrunk ones.
    pub final_sizes: Vec<usize>,
}

#[derive(Clone, Copy)]
enum FinalAxis {
    Dense(usize),
    NewAxis,
    Shrink,
}

fn bit(mask: i32, i: usize) -> bool {
    i < 32 && mask & (1 << i) != 0
}

struct DenseSpec {
    begin: Vec<i64>,
    end: Vec<i64>,
    strides: Vec<i64>,
    begin_mask: Vec<bool>,
    end_mask: Vec<bool>,
    shrink: Vec<bool>,
    final_axes: Vec<FinalAxis>,
}

/// Expand ellipsis and new-axis entries so there is exactly one entry per input axis.
fn to_dense(
    rank: usize,
    begin: &[i64],
    end: &[i64],
    strides: &[i64],
    masks: SliceMasks,
) -> Result<DenseSpec> {
    // Without an explicit ellipsis, one trails the last entry.
    let (ellipsis_pos, entries) = if masks.ellipsis == 0 {
        (begin.len(), begin.len() + 1)
    } else {
        (masks.ellipsis.trailing_zeros() as usize, begin.len())
    };
    let new_axis_after_ellipsis = (ellipsis_pos + 1..entries)
        .filter(|&i| bit(masks.new_axis, i))
        .count();

    let mut dense = DenseSpec {
        begin: vec![0; rank],
        end: vec![0; rank],
        strides: vec![1; rank],
        begin_mask: vec![false; rank],
        end_mask: vec![false; rank],
        shrink: vec![false; rank],
        final_axes: Vec::with_capacity(entries),
    };
    let mut full_index = 0;
    for i in 0..entries {
        if i == ellipsis_pos {
            let next_index = (rank + 1 + new_axis_after_ellipsis)
                .saturating_sub(entries - i)
                .min(rank);
            while full_index < next_index {
                dense.begin_mask[full_index] = true;
                dense.end_mask[full_index] = true;
                dense.final_axes.push(FinalAxis::Dense(full_index));
                full_index += 1;
            }
        } else if bit(masks.new_axis, i) {
            dense.final_axes.push(FinalAxis::NewAxis);
        } else {
            if full_index == rank {
                return Err(Error::SliceSpec(format!(
                    "entry {i} indexes past the {rank} input axes"
                )));
            }
            dense.begin[full_index] = begin[i];
            dense.end[full_index] = end[i];
            dense.strides[full_index] = strides[i];
            dense.begin_mask[full_index] = bit(masks.begin, i);
            dense.end_mask[full_index] = bit(masks.end, i);
            if bit(masks.shrink_axis, i) {
                dense.shrink[full_index] = true;
                dense.final_axes.push(FinalAxis::Shrink);
            } else {
                dense.final_axes.push(FinalAxis::Dense(full_index));
            }
            full_index += 1;
        }
    }
    Ok(dense)
}

/// Resolve a slice spec against `input_sizes`.
///
/// Negative bounds count from the end of the axis. Bounds are clamped to
/// `[0, dim]` for a positive stride and to `[-1, dim - 1]` for a negative one.
///
/// At most 32 entries are accepted, and no mask may set a bit past the last entry.
pub fn compute_indexing_bounds_and_strides(
    input_sizes: &[usize],
    begin: &[i64],
    end: &[i64],
    strides: &[i64],
    masks: SliceMasks,
) -> Result<StridedSliceSpec> {
    if begin.len() != end.len() || begin.len() != strides.len() {
        return Err(Error::SliceSpec(format!(
            "begin, end and strides have lengths {}, {} and {}",
            begin.len(),
            end.len(),
            strides.len()
        )));
    }
    if begin.len() > 32 {
        return Err(Error::SliceSpec(format!(
            "{} entries do not fit the 32-bit masks",
            begin.len()
        )));
    }
    let entry_bits = u32::MAX.checked_shr(32 - begin.len() as u32).unwrap_or(0);
    for (name, mask) in [
        ("begin", masks.begin),
        ("end", masks.end),
        ("ellipsis", masks.ellipsis),
        ("new_axis", masks.new_axis),
        ("shrink_axis", masks.shrink_axis),
    ] {
        if mask as u32 & !entry_bits != 0 {
            return Err(Error::SliceSpec(format!(
                "{name} mask {mask:#x} has bits past the {} entries",
                begin.len()
            )));
        }
    }
    if masks.ellipsis.count_ones() > 1 {
        return Err(Error::SliceSpec(
            "multiple ellipses in slice spec".to_string(),
        ));
    }

    let rank = input_sizes.len();
    let mut dense = to_dense(rank, begin, end, strides, masks)?;
    let mut processing_sizes = Vec::with_capacity(rank);
    for axis in 0..rank {
        let dim = input_sizes[axis] as i64;
        let stride = dense.strides[axis];
        if stride == 0 {
            return Err(Error::ZeroStride { axis });
        }
        let (lo, hi) = if stride > 0 { (0, dim) } else { (-1, dim - 1) };
        let canonical = |x: i64, masked: bool, is_end: bool| -> i64 {
            if masked {
                // Full extent in the direction of travel.
                if (stride > 0) == is_end {
                    hi
                } else {
                    lo
                }
            } else {
                let x = if x < 0 { x + dim } else { x };
                x.clamp(lo, hi)
            }
        };

        if dense.shrink[axis] {
            let index = dense.begin[axis];
            let forward = if index < 0 { index + dim } else { index };
            if !(0..dim).contains(&forward) {
                return Err(Error::SliceIndexOutOfBounds { axis, index, dim });
            }
            if stride < 0 {
                return Err(Error::SliceSpec(format!(
                    "axis {axis} shrinks with negative stride {stride}"
                )));
            }
            dense.begin[axis] = forward;
            dense.end[axis] = forward + 1;
        } else {
            dense.begin[axis] = canonical(dense.begin[axis], dense.begin_mask[axis], false);
            dense.end[axis] = canonical(dense.end[axis], dense.end_mask[axis], true);
        }

        let interval = dense.end[axis] - dense.begin[axis];
        let size = if interval == 0 || (interval < 0) != (stride < 0) {
            0
        } else {
            let (interval, stride) = (interval.abs(), stride.abs());
            (interval / stride + i64::from(interval % stride != 0)) as usize
        };
        processing_sizes.push(size);
    }

    let final_sizes = dense
        .final_axes
        .iter()
        .filter_map(|axis| match axis {
            FinalAxis::Dense(i) => Some(processing_sizes[*i]),
            FinalAxis::NewAxis => Some(1),
            FinalAxis::Shrink => None,
        })
        .collect();
    Ok(StridedSliceSpec {
        begin: dense.begin,
        end: dense.end,
        strides: dense.strides,
        processing_sizes,
        final_sizes,
    })
}

/// Apply a resolved spec to `input`, which must have static dims.
///
/// Negative-stride axes are reversed first, turning them into forward slices.
pub fn build_strided_slice(input: &GraphTensor, spec: &StridedSliceSpec) -> GraphTensor {
    let shape = input.shape();
    let dims = shape
        .static_dims()
        .unwrap_or_else(|| panic!("strided slice of dynamic shape {shape}"));
    assert_eq!(
        spec.processing_sizes.len(),
        dims.len(),
        "strided slice spec of rank {} applied to {shape}",
        spec.processing_sizes.len()
    );

    let reversed: Vec<usize> = (0..dims.len()).filter(|&i| spec.strides[i] < 0).collect();
    let operand = if reversed.is_empty() {
        input.clone()
    } else {
        input.rev(&reversed)
    };

    let mut start = Vec::with_capacity(dims.len());
    let mut limit = Vec::with_capacity(dims.len());
    let mut strides = Vec::with_capacity(dims.len());
    for (axis, &dim) in dims.iter().enumerate() {
        let (b, s) = if spec.strides[axis] < 0 {
            (dim as i64 - 1 - spec.begin[axis], -spec.strides[axis])
        } else {
            (spec.begin[axis], spec.strides[axis])
        };
        let size = spec.processing_sizes[axis];
        let (b, s) = (b.max(0) as usize, s as usize);
        if size == 0 {
            start.push(0);
            limit.push(0);
        } else {
            start.push(b);
            limit.push(b + (size - 1) * s + 1);
        }
        strides.push(s);
    }
    log::trace!("strided slice {start:?}..{limit:?} step {strides:?} of {shape}");
    let sliced = operand.slice(&start, &limit, &strides);
    sliced.reshape_static(&spec.final_sizes)
}
