use rayon::iter::{IntoParallelIterator, ParallelIterator};

use crate::{
    bail,
    graph::{Node, NodeId, Op, ReduceOp},
    storage::BackendDevice,
    tensor::{contiguous_strides, unravel_index},
    Context, Dim, ElemType, Error, Result, RunConfig, Scalar, Shape, Tensor,
};

pub struct CpuDevice;

/// Element buffer. Floating types are held as `f64`, predicate and integral
/// types as exact `i64`.
#[derive(Clone, Debug)]
pub enum CpuBuffer {
    Int(Vec<i64>),
    Float(Vec<f64>),
}

/// Host buffer, with values already rounded into `elem`.
#[derive(Clone, Debug)]
pub struct CpuStorage {
    pub(crate) elem: ElemType,
    pub(crate) data: CpuBuffer,
}

impl CpuStorage {
    /// `values` must already be rounded into `elem`.
    pub(crate) fn from_scalars(elem: ElemType, values: impl IntoIterator<Item = Scalar>) -> Self {
        let values = values.into_iter();
        let data = if elem.is_floating() {
            CpuBuffer::Float(values.map(Scalar::to_f64).collect())
        } else {
            CpuBuffer::Int(values.map(Scalar::to_i64).collect())
        };
        Self { elem, data }
    }

    pub(crate) fn len(&self) -> usize {
        match &self.data {
            CpuBuffer::Int(v) => v.len(),
            CpuBuffer::Float(v) => v.len(),
        }
    }

    pub(crate) fn get(&self, i: usize) -> Scalar {
        match &self.data {
            CpuBuffer::Int(v) => Scalar::Int(v[i]),
            CpuBuffer::Float(v) => Scalar::Float(v[i]),
        }
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = Scalar> + '_ {
        (0..self.len()).map(|i| self.get(i))
    }
}

impl BackendDevice for CpuDevice {
    fn run_graph(
        &self,
        nodes: &[Node],
        order: &[usize],
        output: NodeId,
        args: &[Tensor],
        config: &RunConfig,
    ) -> Result<Tensor> {
        let mut results: Vec<Option<Tensor>> = vec![None; nodes.len()];
        for &idx in order {
            let node = &nodes[idx];
            log::trace!("evaluating node {idx}: {} : {}", node.op.label(), node.shape);
            let value = evaluate(node, &results, args, config)
                .with_context(|| format!("while evaluating node {idx} ({})", node.op.label()))?;
            results[idx] = Some(value);
        }
        results[usize::from(output)]
            .take()
            .context("graph output was not evaluated")
    }
}

fn operand(results: &[Option<Tensor>], id: NodeId) -> Result<&Tensor> {
    results[usize::from(id)]
        .as_ref()
        .context("operand evaluated out of order")
}

fn scalar_value(results: &[Option<Tensor>], id: NodeId) -> Result<Scalar> {
    let t = operand(results, id)?;
    if t.element_count() != 1 {
        bail!("expected a scalar operand, got dims {:?}", t.dims());
    }
    Ok(t.storage().get(0))
}

/// Concrete extents of a node shape; dynamic axes read their size node.
fn resolve_dims(shape: &Shape, results: &[Option<Tensor>]) -> Result<Vec<usize>> {
    shape
        .dims()
        .iter()
        .map(|d| match d {
            Dim::Static(n) => Ok(*n),
            Dim::Dynamic(id) => {
                let v = operand(results, *id)?.to_scalar::<i64>()?;
                usize::try_from(v).map_err(|_| Error::msg(format!("negative dynamic size {v}")))
            }
        })
        .collect()
}

/// Evaluate `f` at every multi-index of `out_dims`, in row-major order.
/// `f` must return values already rounded into `elem`.
fn generate<F>(elem: ElemType, out_dims: &[usize], config: &RunConfig, f: F) -> CpuStorage
where
    F: Fn(&[usize]) -> Scalar + Sync,
{
    let n: usize = out_dims.iter().product();
    let strides = contiguous_strides(out_dims);
    let at = |flat: usize| {
        let mut idx = vec![0; out_dims.len()];
        unravel_index(flat, &strides, &mut idx);
        f(&idx)
    };
    let parallel = n > config.par_threshold;
    let data = if elem.is_floating() {
        CpuBuffer::Float(collect(n, parallel, |i| at(i).to_f64()))
    } else {
        CpuBuffer::Int(collect(n, parallel, |i| at(i).to_i64()))
    };
    CpuStorage { elem, data }
}

fn collect<T, F>(n: usize, parallel: bool, f: F) -> Vec<T>
where
    T: Send,
    F: Fn(usize) -> T + Sync + Send,
{
    if parallel {
        (0..n).into_par_iter().map(f).collect()
    } else {
        (0..n).map(f).collect()
    }
}

fn broadcast_runtime(lhs: &[usize], rhs: &[usize]) -> Result<Vec<usize>> {
    if lhs.is_empty() {
        return Ok(rhs.to_vec());
    }
    if rhs.is_empty() {
        return Ok(lhs.to_vec());
    }
    if lhs.len() != rhs.len() {
        bail!("rank mismatch between {lhs:?} and {rhs:?}");
    }
    lhs.iter()
        .zip(rhs)
        .map(|(&a, &b)| match (a, b) {
            _ if a == b => Ok(a),
            (1, n) | (n, 1) => Ok(n),
            _ => Err(Error::msg(format!(
                "incompatible runtime dims {lhs:?} and {rhs:?}"
            ))),
        })
        .collect()
}

fn broadcast_source(idx: &[usize], dims: &[usize], strides: &[usize]) -> usize {
    if dims.is_empty() {
        return 0;
    }
    idx.iter()
        .zip(dims)
        .zip(strides)
        .map(|((&i, &d), &s)| if d == 1 { 0 } else { i * s })
        .sum()
}

/// Broadcasting elementwise map over up to three operands.
fn elementwise<F>(inputs: &[&Tensor], elem: ElemType, config: &RunConfig, f: F) -> Result<Tensor>
where
    F: Fn(&[Scalar]) -> Scalar + Sync,
{
    let mut out_dims: Vec<usize> = vec![];
    for t in inputs {
        out_dims = broadcast_runtime(&out_dims, t.dims())?;
    }
    let sources: Vec<(&CpuStorage, &[usize], Vec<usize>)> = inputs
        .iter()
        .map(|t| (t.storage(), t.dims(), contiguous_strides(t.dims())))
        .collect();
    let storage = generate(elem, &out_dims, config, |idx| {
        let mut vals = [Scalar::Int(0); 3];
        for (k, (data, dims, strides)) in sources.iter().enumerate() {
            vals[k] = data.get(broadcast_source(idx, dims, strides));
        }
        elem.round(f(&vals[..sources.len()]))
    });
    Ok(Tensor::from_storage(out_dims, storage))
}

fn evaluate(
    node: &Node,
    results: &[Option<Tensor>],
    args: &[Tensor],
    config: &RunConfig,
) -> Result<Tensor> {
    let elem = node.shape.elem();
    match &node.op {
        Op::Parameter { index, .. } => Ok(args[*index].clone()),
        Op::Constant { value } => Ok(Tensor::from_storage(
            vec![],
            CpuStorage::from_scalars(elem, [elem.round(*value)]),
        )),
        Op::UnaryOp { v_id, operator } => {
            let f = operator.to_closure();
            elementwise(&[operand(results, *v_id)?], elem, config, |v| f(v[0]))
        }
        Op::BinaryOp {
            l_id,
            r_id,
            operator,
        } => {
            let f = operator.as_closure();
            let (l, r) = (operand(results, *l_id)?, operand(results, *r_id)?);
            elementwise(&[l, r], elem, config, |v| f(v[0], v[1]))
        }
        Op::Compare {
            l_id,
            r_id,
            direction,
        } => {
            let f = direction.as_closure();
            let (l, r) = (operand(results, *l_id)?, operand(results, *r_id)?);
            elementwise(&[l, r], elem, config, |v| Scalar::from_bool(f(v[0], v[1])))
        }
        Op::Select {
            pred,
            on_true,
            on_false,
        } => {
            let inputs = [
                operand(results, *pred)?,
                operand(results, *on_true)?,
                operand(results, *on_false)?,
            ];
            elementwise(&inputs, elem, config, |v| {
                if v[0].is_truthy() {
                    v[1]
                } else {
                    v[2]
                }
            })
        }
        Op::Convert { v_id } => {
            elementwise(&[operand(results, *v_id)?], elem, config, |v| v[0])
        }
        Op::Reduce {
            v_id,
            init,
            operator,
            dims,
        } => reduce(
            operand(results, *v_id)?,
            scalar_value(results, *init)?,
            *operator,
            dims,
        ),
        Op::ReduceWindow {
            v_id,
            init,
            operator,
            window_dims,
            window_strides,
            padding,
        } => reduce_window(
            operand(results, *v_id)?,
            scalar_value(results, *init)?,
            *operator,
            window_dims,
            window_strides,
            padding,
            config,
        ),
        Op::Reshape { v_id } => {
            let x = operand(results, *v_id)?;
            let dims = resolve_dims(&node.shape, results)?;
            if dims.iter().product::<usize>() != x.element_count() {
                bail!("cannot reshape dims {:?} into {dims:?}", x.dims());
            }
            Ok(Tensor::from_storage(dims, x.storage().clone()))
        }
        Op::BroadcastInDim { v_id, broadcast_dims } => {
            let x = operand(results, *v_id)?;
            let out_dims = resolve_dims(&node.shape, results)?;
            for (i, &axis) in broadcast_dims.iter().enumerate() {
                let n = x.dims()[i];
                if n != 1 && n != out_dims[axis] {
                    bail!("cannot broadcast dims {:?} into {out_dims:?}", x.dims());
                }
            }
            let strides = contiguous_strides(x.dims());
            let data = x.storage();
            let values = generate(elem, &out_dims, config, |idx| {
                let src: usize = broadcast_dims
                    .iter()
                    .enumerate()
                    .map(|(i, &axis)| {
                        if x.dims()[i] == 1 {
                            0
                        } else {
                            idx[axis] * strides[i]
                        }
                    })
                    .sum();
                data.get(src)
            });
            Ok(Tensor::from_storage(out_dims, values))
        }
        Op::Slice {
            v_id,
            start,
            limit,
            strides,
        } => {
            let x = operand(results, *v_id)?;
            let out_dims: Vec<usize> = x
                .dims()
                .iter()
                .enumerate()
                .map(|(i, &n)| limit[i].min(n).saturating_sub(start[i]).div_ceil(strides[i]))
                .collect();
            let in_strides = contiguous_strides(x.dims());
            let data = x.storage();
            let values = generate(elem, &out_dims, config, |idx| {
                let src: usize = idx
                    .iter()
                    .enumerate()
                    .map(|(i, &o)| (start[i] + o * strides[i]) * in_strides[i])
                    .sum();
                data.get(src)
            });
            Ok(Tensor::from_storage(out_dims, values))
        }
        Op::Rev { v_id, dims } => {
            let x = operand(results, *v_id)?;
            let in_dims = x.dims();
            let in_strides = contiguous_strides(in_dims);
            let data = x.storage();
            let values = generate(elem, in_dims, config, |idx| {
                let src: usize = idx
                    .iter()
                    .enumerate()
                    .map(|(i, &o)| {
                        let p = if dims.contains(&i) { in_dims[i] - 1 - o } else { o };
                        p * in_strides[i]
                    })
                    .sum();
                data.get(src)
            });
            Ok(Tensor::from_storage(in_dims.to_vec(), values))
        }
        Op::ArgExtremum {
            v_id,
            axis,
            find_max,
        } => arg_extremum(operand(results, *v_id)?, elem, *axis, *find_max, config),
        Op::GetDimensionSize { v_id, axis } => {
            let x = operand(results, *v_id)?;
            let n = x.dims()[*axis];
            Ok(Tensor::from_storage(
                vec![],
                CpuStorage::from_scalars(elem, [elem.round(Scalar::Int(n as i64))]),
            ))
        }
    }
}

fn reduce(x: &Tensor, init: Scalar, operator: ReduceOp, dims: &[usize]) -> Result<Tensor> {
    let in_dims = x.dims();
    if let Some(bad) = dims.iter().find(|&&d| d >= in_dims.len()) {
        bail!("reduce axis {bad} out of range for dims {in_dims:?}");
    }
    let elem = x.elem();
    let out_dims: Vec<usize> = in_dims
        .iter()
        .enumerate()
        .filter(|(i, _)| !dims.contains(i))
        .map(|(_, &n)| n)
        .collect();
    let in_strides = contiguous_strides(in_dims);
    let out_strides = contiguous_strides(&out_dims);
    let mut acc = vec![init; out_dims.iter().product()];
    let mut index = vec![0; in_dims.len()];
    for (flat, v) in x.storage().iter().enumerate() {
        unravel_index(flat, &in_strides, &mut index);
        let mut o = 0;
        let mut k = 0;
        for (axis, &ix) in index.iter().enumerate() {
            if !dims.contains(&axis) {
                o += ix * out_strides[k];
                k += 1;
            }
        }
        acc[o] = elem.round(operator.combine(acc[o], v));
    }
    Ok(Tensor::from_storage(out_dims, CpuStorage::from_scalars(elem, acc)))
}

fn reduce_window(
    x: &Tensor,
    init: Scalar,
    operator: ReduceOp,
    window_dims: &[usize],
    window_strides: &[usize],
    padding: &[(usize, usize)],
    config: &RunConfig,
) -> Result<Tensor> {
    let in_dims = x.dims();
    let rank = in_dims.len();
    if window_dims.len() != rank || window_strides.len() != rank || padding.len() != rank {
        bail!("reduce_window parameters do not match rank {rank}");
    }
    let elem = x.elem();
    let out_dims: Vec<usize> = (0..rank)
        .map(|i| {
            let padded = in_dims[i] + padding[i].0 + padding[i].1;
            if padded < window_dims[i] {
                0
            } else {
                (padded - window_dims[i]) / window_strides[i] + 1
            }
        })
        .collect();
    let in_strides = contiguous_strides(in_dims);
    let win_strides = contiguous_strides(window_dims);
    let win_count: usize = window_dims.iter().product();
    let data = x.storage();
    let values = generate(elem, &out_dims, config, |idx| {
        let mut acc = init;
        let mut w = vec![0; rank];
        for wflat in 0..win_count {
            unravel_index(wflat, &win_strides, &mut w);
            let mut src = 0;
            let mut in_bounds = true;
            for d in 0..rank {
                let pos = (idx[d] * window_strides[d] + w[d]) as isize - padding[d].0 as isize;
                if pos < 0 || pos as usize >= in_dims[d] {
                    in_bounds = false;
                    break;
                }
                src += pos as usize * in_strides[d];
            }
            // Padding positions contribute the init value.
            let v = if in_bounds { data.get(src) } else { init };
            acc = elem.round(operator.combine(acc, v));
        }
        acc
    });
    Ok(Tensor::from_storage(out_dims, values))
}

fn arg_extremum(
    x: &Tensor,
    index_type: ElemType,
    axis: usize,
    find_max: bool,
    config: &RunConfig,
) -> Result<Tensor> {
    let in_dims = x.dims();
    if axis >= in_dims.len() {
        bail!("arg_extremum axis {axis} out of range for dims {in_dims:?}");
    }
    let mut out_dims = in_dims.to_vec();
    let n = out_dims.remove(axis);
    let in_strides = contiguous_strides(in_dims);
    let data = x.storage();
    let values = generate(index_type, &out_dims, config, |idx| {
        let base: usize = idx
            .iter()
            .enumerate()
            .map(|(i, &o)| {
                let d = if i < axis { i } else { i + 1 };
                o * in_strides[d]
            })
            .sum();
        let mut best_k = 0;
        let mut best = Scalar::Float(f64::NAN);
        for k in 0..n {
            let v = data.get(base + k * in_strides[axis]);
            let better = if k == 0 {
                true
            } else if best.is_nan() {
                false
            } else if v.is_nan() {
                true
            } else if find_max {
                v > best
            } else {
                v < best
            };
            if better {
                best = v;
                best_k = k;
            }
        }
        index_type.round(Scalar::Int(best_k as i64))
    });
    Ok(Tensor::from_storage(out_dims, values))
}
