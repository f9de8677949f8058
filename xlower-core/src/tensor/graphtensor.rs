use std::ops::{Add, Div, Mul, Neg, Sub};

use crate::{
    graph::{BinaryOpType, ComparisonDirection, Graph, NodeId, Op, ReduceOp, UnaryOpType},
    Dim, ElemType, Scalar, Shape,
};

/// A tensor representing an intermediary result of a graph. Performing operations
/// on this tensor will not cause any computations.
///
/// The handle is a node index plus the graph it indexes into; cloning it is cheap.
/// Building methods check shapes and element types eagerly and panic on
/// malformed input, since that is a bug in the lowering that produced it.
#[derive(Clone)]
pub struct GraphTensor {
    id: NodeId,
    graph: Graph,
}

impl std::fmt::Debug for GraphTensor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "GraphTensor({:?}: {})", self.id, self.shape())
    }
}

impl GraphTensor {
    pub(crate) fn from_id(id: NodeId, graph: Graph) -> Self {
        Self { id, graph }
    }

    fn push(graph: &Graph, op: Op, shape: Shape) -> Self {
        let id = graph.add_node(op, shape);
        Self {
            id,
            graph: graph.clone(),
        }
    }

    /// Get the graph node ID.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Retrieve the graph for this `GraphTensor`.
    pub fn graph(&self) -> Graph {
        self.graph.clone()
    }

    pub fn shape(&self) -> Shape {
        self.graph.shape_of(self.id)
    }

    pub fn elem(&self) -> ElemType {
        self.shape().elem()
    }

    pub fn dims(&self) -> Vec<Dim> {
        self.shape().dims().to_vec()
    }

    pub fn dim(&self, axis: usize) -> Dim {
        self.shape().dim(axis)
    }

    pub fn rank(&self) -> usize {
        self.shape().rank()
    }

    fn check_same_graph(&self, other: &GraphTensor, what: &str) {
        assert!(
            self.graph.same_graph(&other.graph),
            "{what}: operands belong to different graphs"
        );
    }
}

// Leaves.
impl GraphTensor {
    #[must_use]
    /// Declare graph input `index`, fed by `CompiledGraph::run`.
    pub fn parameter(graph: &Graph, index: usize, shape: Shape, name: &str) -> Self {
        Self::push(
            graph,
            Op::Parameter {
                index,
                name: name.to_string(),
            },
            shape,
        )
    }

    #[must_use]
    /// Declare a graph input whose `None` axes are only known at run time.
    /// Each such axis becomes [`Dim::Dynamic`], backed by a size node of the
    /// parameter.
    pub fn dynamic_parameter(
        graph: &Graph,
        index: usize,
        elem: ElemType,
        dims: &[Option<usize>],
        name: &str,
    ) -> Self {
        let placeholder = dims.iter().map(|d| Dim::Static(d.unwrap_or(0))).collect();
        let param = Self::parameter(graph, index, Shape::new(elem, placeholder), name);
        let resolved = dims
            .iter()
            .enumerate()
            .map(|(axis, d)| match d {
                Some(n) => Dim::Static(*n),
                None => Dim::Dynamic(param.get_dimension_size(axis).id()),
            })
            .collect();
        graph.set_dims(param.id, resolved);
        param
    }

    #[must_use]
    /// A scalar literal. `value` is rounded into `elem`.
    pub fn constant(graph: &Graph, value: f64, elem: ElemType) -> Self {
        Self::literal(graph, Scalar::Float(value), elem)
    }

    #[must_use]
    /// A scalar literal from an exact value, rounded into `elem`.
    pub fn literal(graph: &Graph, value: Scalar, elem: ElemType) -> Self {
        Self::push(
            graph,
            Op::Constant {
                value: elem.round(value),
            },
            Shape::scalar(elem),
        )
    }

    #[must_use]
    pub fn zero(graph: &Graph, elem: ElemType) -> Self {
        Self::constant(graph, 0.0, elem)
    }

    #[must_use]
    pub fn one(graph: &Graph, elem: ElemType) -> Self {
        Self::constant(graph, 1.0, elem)
    }

    #[must_use]
    pub fn nan_value(graph: &Graph, elem: ElemType) -> Self {
        assert!(elem.is_floating(), "NaN requested for non-floating type {elem}");
        Self::constant(graph, f64::NAN, elem)
    }

    #[must_use]
    /// The type minimum (negative infinity for floating types).
    pub fn min_value(graph: &Graph, elem: ElemType) -> Self {
        Self::literal(graph, elem.min_value(), elem)
    }

    #[must_use]
    /// The type maximum (positive infinity for floating types).
    pub fn max_value(graph: &Graph, elem: ElemType) -> Self {
        Self::literal(graph, elem.max_value(), elem)
    }

    #[must_use]
    /// A tensor of the given dims filled with `value`.
    pub fn full(graph: &Graph, value: f64, elem: ElemType, dims: &[Dim]) -> Self {
        Self::constant(graph, value, elem).broadcast_in_dim(dims, &[])
    }

    #[must_use]
    /// A scalar literal of this tensor's element type.
    pub fn scalar_like(&self, value: f64) -> Self {
        Self::constant(&self.graph, value, self.elem())
    }
}

/// Shape of an elementwise op over `lhs` and `rhs`: equal ranks broadcast
/// over static size-1 axes, and a rank-0 operand broadcasts against anything.
fn broadcast_dims(what: &str, lhs: &[Dim], rhs: &[Dim]) -> Vec<Dim> {
    if lhs.is_empty() {
        return rhs.to_vec();
    }
    if rhs.is_empty() {
        return lhs.to_vec();
    }
    assert_eq!(
        lhs.len(),
        rhs.len(),
        "{what}: rank mismatch between {lhs:?} and {rhs:?}"
    );
    lhs.iter()
        .zip(rhs)
        .map(|(&a, &b)| match (a, b) {
            _ if a == b => a,
            (Dim::Static(1), other) | (other, Dim::Static(1)) => other,
            (Dim::Static(n), Dim::Dynamic(_)) | (Dim::Dynamic(_), Dim::Static(n)) => {
                Dim::Static(n)
            }
            (Dim::Dynamic(_), Dim::Dynamic(_)) => a,
            (Dim::Static(x), Dim::Static(y)) => {
                panic!("{what}: incompatible sizes {x} and {y} in {lhs:?} vs {rhs:?}")
            }
        })
        .collect()
}

// Elementwise.
impl GraphTensor {
    fn unary(&self, operator: UnaryOpType) -> Self {
        Self::push(
            &self.graph,
            Op::UnaryOp {
                v_id: self.id,
                operator,
            },
            self.shape(),
        )
    }

    fn binary(&self, rhs: &GraphTensor, operator: BinaryOpType) -> Self {
        let what = operator.as_c_op();
        self.check_same_graph(rhs, what);
        let (l, r) = (self.shape(), rhs.shape());
        assert_eq!(
            l.elem(),
            r.elem(),
            "{what}: element type mismatch between {l} and {r}"
        );
        if matches!(operator, BinaryOpType::And | BinaryOpType::Or) {
            assert!(
                !l.elem().is_floating(),
                "{what}: logical op on floating type {}",
                l.elem()
            );
        }
        let dims = broadcast_dims(what, l.dims(), r.dims());
        Self::push(
            &self.graph,
            Op::BinaryOp {
                l_id: self.id,
                r_id: rhs.id,
                operator,
            },
            Shape::new(l.elem(), dims),
        )
    }

    #[must_use]
    pub fn abs(&self) -> Self {
        self.unary(UnaryOpType::Abs)
    }

    #[must_use]
    /// Natural logarithm.
    pub fn log(&self) -> Self {
        self.unary(UnaryOpType::Log)
    }

    #[must_use]
    pub fn exp(&self) -> Self {
        self.unary(UnaryOpType::Exp)
    }

    #[must_use]
    /// Elementwise unary square root.
    pub fn sqrt(&self) -> Self {
        self.unary(UnaryOpType::Sqrt)
    }

    #[must_use]
    pub fn maximum(&self, rhs: &GraphTensor) -> Self {
        self.binary(rhs, BinaryOpType::Max)
    }

    #[must_use]
    pub fn minimum(&self, rhs: &GraphTensor) -> Self {
        self.binary(rhs, BinaryOpType::Min)
    }

    #[must_use]
    pub fn and(&self, rhs: &GraphTensor) -> Self {
        self.binary(rhs, BinaryOpType::And)
    }

    #[must_use]
    pub fn or(&self, rhs: &GraphTensor) -> Self {
        self.binary(rhs, BinaryOpType::Or)
    }

    #[must_use]
    /// Elementwise comparison producing `pred`.
    pub fn compare(&self, rhs: &GraphTensor, direction: ComparisonDirection) -> Self {
        let what = "compare";
        self.check_same_graph(rhs, what);
        let (l, r) = (self.shape(), rhs.shape());
        assert_eq!(
            l.elem(),
            r.elem(),
            "{what}: element type mismatch between {l} and {r}"
        );
        let dims = broadcast_dims(what, l.dims(), r.dims());
        Self::push(
            &self.graph,
            Op::Compare {
                l_id: self.id,
                r_id: rhs.id,
                direction,
            },
            Shape::new(ElemType::Pred, dims),
        )
    }

    #[must_use]
    pub fn ne(&self, rhs: &GraphTensor) -> Self {
        self.compare(rhs, ComparisonDirection::Ne)
    }

    #[must_use]
    pub fn ge(&self, rhs: &GraphTensor) -> Self {
        self.compare(rhs, ComparisonDirection::Ge)
    }

    #[must_use]
    pub fn gt(&self, rhs: &GraphTensor) -> Self {
        self.compare(rhs, ComparisonDirection::Gt)
    }

    #[must_use]
    pub fn le(&self, rhs: &GraphTensor) -> Self {
        self.compare(rhs, ComparisonDirection::Le)
    }

    #[must_use]
    pub fn lt(&self, rhs: &GraphTensor) -> Self {
        self.compare(rhs, ComparisonDirection::Lt)
    }

    #[must_use]
    /// `pred ? on_true : on_false`, broadcasting all three operands.
    pub fn select(pred: &GraphTensor, on_true: &GraphTensor, on_false: &GraphTensor) -> Self {
        let what = "select";
        pred.check_same_graph(on_true, what);
        pred.check_same_graph(on_false, what);
        let (p, t, f) = (pred.shape(), on_true.shape(), on_false.shape());
        assert_eq!(p.elem(), ElemType::Pred, "{what}: predicate is {p}");
        assert_eq!(
            t.elem(),
            f.elem(),
            "{what}: element type mismatch between {t} and {f}"
        );
        let dims = broadcast_dims(what, &broadcast_dims(what, p.dims(), t.dims()), f.dims());
        Self::push(
            &pred.graph,
            Op::Select {
                pred: pred.id,
                on_true: on_true.id,
                on_false: on_false.id,
            },
            Shape::new(t.elem(), dims),
        )
    }

    #[must_use]
    /// Convert to another element type. Floating to integral truncates toward zero.
    pub fn convert(&self, elem: ElemType) -> Self {
        Self::push(
            &self.graph,
            Op::Convert { v_id: self.id },
            self.shape().with_elem(elem),
        )
    }
}

// Reductions and data movement.
impl GraphTensor {
    fn check_init(&self, init: &GraphTensor, what: &str) {
        self.check_same_graph(init, what);
        let s = init.shape();
        assert!(
            s.rank() == 0 && s.elem() == self.elem(),
            "{what}: init value must be a {} scalar, got {s}",
            self.elem()
        );
    }

    #[must_use]
    /// Fold `dims` (sorted, unique, in range) with `operator` starting from `init`.
    /// The reduced axes are removed from the result.
    pub fn reduce(&self, init: &GraphTensor, operator: ReduceOp, dims: &[usize]) -> Self {
        self.check_init(init, "reduce");
        let shape = self.shape();
        debug_assert!(
            dims.windows(2).all(|w| w[0] < w[1]) && dims.iter().all(|&d| d < shape.rank()),
            "reduce: dims {dims:?} must be sorted, unique and below rank {}",
            shape.rank()
        );
        let out = shape
            .dims()
            .iter()
            .enumerate()
            .filter(|(i, _)| !dims.contains(i))
            .map(|(_, d)| *d)
            .collect();
        Self::push(
            &self.graph,
            Op::Reduce {
                v_id: self.id,
                init: init.id,
                operator,
                dims: dims.to_vec(),
            },
            Shape::new(shape.elem(), out),
        )
    }

    #[must_use]
    /// Fold every axis into a scalar.
    pub fn reduce_all(&self, init: &GraphTensor, operator: ReduceOp) -> Self {
        let dims: Vec<usize> = (0..self.rank()).collect();
        self.reduce(init, operator, &dims)
    }

    #[must_use]
    /// Sliding-window fold. Padding is `(before, after)` per axis and is
    /// filled with `init`.
    pub fn reduce_window_with_padding(
        &self,
        init: &GraphTensor,
        operator: ReduceOp,
        window_dims: &[usize],
        window_strides: &[usize],
        padding: &[(usize, usize)],
    ) -> Self {
        let what = "reduce_window";
        self.check_init(init, what);
        let shape = self.shape();
        let rank = shape.rank();
        assert!(
            window_dims.len() == rank && window_strides.len() == rank && padding.len() == rank,
            "{what}: window {window_dims:?}, strides {window_strides:?} and padding {padding:?} must all have rank {rank}"
        );
        let out = shape
            .dims()
            .iter()
            .enumerate()
            .map(|(i, d)| {
                let (w, s, (lo, hi)) = (window_dims[i], window_strides[i], padding[i]);
                assert!(w > 0 && s > 0, "{what}: window and stride must be positive");
                match d {
                    Dim::Static(n) => {
                        let padded = n + lo + hi;
                        Dim::Static(if padded < w { 0 } else { (padded - w) / s + 1 })
                    }
                    Dim::Dynamic(_) => {
                        assert!(
                            w == 1 && s == 1 && lo == 0 && hi == 0,
                            "{what}: axis {i} is dynamic and can only carry a unit window"
                        );
                        *d
                    }
                }
            })
            .collect();
        Self::push(
            &self.graph,
            Op::ReduceWindow {
                v_id: self.id,
                init: init.id,
                operator,
                window_dims: window_dims.to_vec(),
                window_strides: window_strides.to_vec(),
                padding: padding.to_vec(),
            },
            Shape::new(shape.elem(), out),
        )
    }

    #[must_use]
    /// Row-major reshape. Dynamic target sizes are resolved when the graph runs.
    pub fn reshape(&self, dims: &[Dim]) -> Self {
        let shape = self.shape();
        let target = Shape::new(shape.elem(), dims.to_vec());
        if let (Some(from), Some(to)) = (shape.element_count(), target.element_count()) {
            assert_eq!(from, to, "reshape: cannot reshape {shape} into {target}");
        }
        Self::push(&self.graph, Op::Reshape { v_id: self.id }, target)
    }

    #[must_use]
    pub fn reshape_static(&self, dims: &[usize]) -> Self {
        let dims: Vec<Dim> = dims.iter().copied().map(Dim::Static).collect();
        self.reshape(&dims)
    }

    #[must_use]
    /// Broadcast into `dims`; operand axis `i` lands on output axis
    /// `broadcast_dims[i]` and must be 1 or match it.
    pub fn broadcast_in_dim(&self, dims: &[Dim], broadcast_dims: &[usize]) -> Self {
        let what = "broadcast_in_dim";
        let shape = self.shape();
        assert_eq!(
            broadcast_dims.len(),
            shape.rank(),
            "{what}: {broadcast_dims:?} does not cover operand {shape}"
        );
        for (i, &out_axis) in broadcast_dims.iter().enumerate() {
            assert!(
                out_axis < dims.len(),
                "{what}: axis {out_axis} out of range for {dims:?}"
            );
            if let (Dim::Static(n), Dim::Static(m)) = (shape.dim(i), dims[out_axis]) {
                assert!(
                    n == 1 || n == m,
                    "{what}: operand {shape} axis {i} cannot expand to {m}"
                );
            }
        }
        Self::push(
            &self.graph,
            Op::BroadcastInDim {
                v_id: self.id,
                broadcast_dims: broadcast_dims.to_vec(),
            },
            Shape::new(shape.elem(), dims.to_vec()),
        )
    }

    #[must_use]
    /// Strided slice with positive strides. A dynamic axis can only be kept
    /// whole, by passing `0..usize::MAX` step 1.
    pub fn slice(&self, start: &[usize], limit: &[usize], strides: &[usize]) -> Self {
        let what = "slice";
        let shape = self.shape();
        let rank = shape.rank();
        assert!(
            start.len() == rank && limit.len() == rank && strides.len() == rank,
            "{what}: bounds must have rank {rank}"
        );
        let out = (0..rank)
            .map(|i| {
                let (b, e, s) = (start[i], limit[i], strides[i]);
                match shape.dim(i) {
                    Dim::Dynamic(_) if b == 0 && e == usize::MAX && s == 1 => shape.dim(i),
                    Dim::Dynamic(_) => panic!("{what}: axis {i} of {shape} is dynamic"),
                    Dim::Static(n) => {
                        assert!(
                            s > 0 && b <= e && e <= n,
                            "{what}: invalid bounds {b}..{e} step {s} for axis {i} of size {n}"
                        );
                        Dim::Static((e - b).div_ceil(s))
                    }
                }
            })
            .collect();
        Self::push(
            &self.graph,
            Op::Slice {
                v_id: self.id,
                start: start.to_vec(),
                limit: limit.to_vec(),
                strides: strides.to_vec(),
            },
            Shape::new(shape.elem(), out),
        )
    }

    #[must_use]
    /// Slice only axis `dim`, keeping every other axis whole.
    pub fn slice_in_dim(&self, start: usize, limit: usize, stride: usize, dim: usize) -> Self {
        let shape = self.shape();
        let rank = shape.rank();
        let mut starts = vec![0; rank];
        let mut limits: Vec<usize> = shape
            .dims()
            .iter()
            .map(|d| d.as_static().unwrap_or(usize::MAX))
            .collect();
        let mut strides = vec![1; rank];
        starts[dim] = start;
        limits[dim] = limit;
        strides[dim] = stride;
        self.slice(&starts, &limits, &strides)
    }

    #[must_use]
    /// Reverse the order of elements along `dims`.
    pub fn rev(&self, dims: &[usize]) -> Self {
        let shape = self.shape();
        assert!(
            dims.iter().all(|&d| d < shape.rank()),
            "rev: {dims:?} out of range for {shape}"
        );
        Self::push(
            &self.graph,
            Op::Rev {
                v_id: self.id,
                dims: dims.to_vec(),
            },
            shape,
        )
    }

    #[must_use]
    /// Index of the extremal element along `axis`, as `index_type`.
    /// Ties resolve to the lowest index; NaN counts as extremal.
    pub fn arg_extremum(&self, index_type: ElemType, axis: usize, find_max: bool) -> Self {
        let shape = self.shape();
        assert!(axis < shape.rank(), "arg_extremum: axis {axis} out of range for {shape}");
        assert!(
            index_type.is_integral(),
            "arg_extremum: index type {index_type} must be integral"
        );
        let mut dims = shape.dims().to_vec();
        dims.remove(axis);
        Self::push(
            &self.graph,
            Op::ArgExtremum {
                v_id: self.id,
                axis,
                find_max,
            },
            Shape::new(index_type, dims),
        )
    }

    #[must_use]
    pub fn arg_max(&self, axis: usize) -> Self {
        self.arg_extremum(ElemType::I64, axis, true)
    }

    #[must_use]
    pub fn arg_min(&self, axis: usize) -> Self {
        self.arg_extremum(ElemType::I64, axis, false)
    }

    #[must_use]
    /// Runtime extent of `axis` as an `s64` scalar.
    pub fn get_dimension_size(&self, axis: usize) -> Self {
        let shape = self.shape();
        assert!(
            axis < shape.rank(),
            "get_dimension_size: axis {axis} out of range for {shape}"
        );
        Self::push(
            &self.graph,
            Op::GetDimensionSize { v_id: self.id, axis },
            Shape::scalar(ElemType::I64),
        )
    }
}

macro_rules! graphtensor_binop {
    ($trait:ident, $fn_name:ident) => {
        impl $trait<&GraphTensor> for &GraphTensor {
            type Output = GraphTensor;
            /// Add an elementwise operation to the graph.
            fn $fn_name(self, rhs: &GraphTensor) -> Self::Output {
                self.binary(rhs, BinaryOpType::$trait)
            }
        }

        impl $trait<GraphTensor> for GraphTensor {
            type Output = GraphTensor;
            fn $fn_name(self, rhs: GraphTensor) -> Self::Output {
                self.binary(&rhs, BinaryOpType::$trait)
            }
        }

        impl $trait<&GraphTensor> for GraphTensor {
            type Output = GraphTensor;
            fn $fn_name(self, rhs: &GraphTensor) -> Self::Output {
                self.binary(rhs, BinaryOpType::$trait)
            }
        }

        impl $trait<GraphTensor> for &GraphTensor {
            type Output = GraphTensor;
            fn $fn_name(self, rhs: GraphTensor) -> Self::Output {
                self.binary(&rhs, BinaryOpType::$trait)
            }
        }
    };
}

graphtensor_binop!(Add, add);
graphtensor_binop!(Div, div);
graphtensor_binop!(Mul, mul);
graphtensor_binop!(Sub, sub);

impl Neg for &GraphTensor {
    type Output = GraphTensor;
    fn neg(self) -> Self::Output {
        self.unary(UnaryOpType::Neg)
    }
}

impl Neg for GraphTensor {
    type Output = GraphTensor;
    fn neg(self) -> Self::Output {
        self.unary(UnaryOpType::Neg)
    }
}
