use std::fmt::{self, Display};

use crate::{graph::NodeId, ElemType, GraphTensor, Scalar};

/// Size of one axis.
///
/// A dynamic axis refers to a scalar `s64` node of the same graph which holds
/// the extent once the graph runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Dim {
    Static(usize),
    Dynamic(NodeId),
}

impl Dim {
    pub fn as_static(&self) -> Option<usize> {
        match self {
            Self::Static(n) => Some(*n),
            Self::Dynamic(_) => None,
        }
    }

    pub fn is_dynamic(&self) -> bool {
        matches!(self, Self::Dynamic(_))
    }
}

impl From<usize> for Dim {
    fn from(value: usize) -> Self {
        Self::Static(value)
    }
}

impl Display for Dim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static(n) => write!(f, "{n}"),
            Self::Dynamic(id) => write!(f, "?{}", usize::from(*id)),
        }
    }
}

/// Element type plus ordered axis sizes of a graph node.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Shape {
    elem: ElemType,
    dims: Vec<Dim>,
}

impl Shape {
    pub fn new(elem: ElemType, dims: Vec<Dim>) -> Self {
        Self { elem, dims }
    }

    /// A shape whose sizes are all known while building the graph.
    pub fn from_static(elem: ElemType, dims: &[usize]) -> Self {
        Self {
            elem,
            dims: dims.iter().copied().map(Dim::Static).collect(),
        }
    }

    pub fn scalar(elem: ElemType) -> Self {
        Self { elem, dims: vec![] }
    }

    pub fn elem(&self) -> ElemType {
        self.elem
    }

    pub fn dims(&self) -> &[Dim] {
        &self.dims
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    pub fn dim(&self, axis: usize) -> Dim {
        self.dims[axis]
    }

    /// All sizes, or `None` if any axis is dynamic.
    pub fn static_dims(&self) -> Option<Vec<usize>> {
        self.dims.iter().map(Dim::as_static).collect()
    }

    /// Number of elements, or `None` if any axis is dynamic.
    pub fn element_count(&self) -> Option<usize> {
        self.static_dims().map(|d| d.iter().product())
    }

    pub fn with_elem(&self, elem: ElemType) -> Self {
        Self {
            elem,
            dims: self.dims.clone(),
        }
    }

    pub(crate) fn dims_mut(&mut self) -> &mut Vec<Dim> {
        &mut self.dims
    }
}

impl Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[", self.elem)?;
        for (i, d) in self.dims.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{d}")?;
        }
        f.write_str("]")
    }
}

/// The product of a set of axis sizes.
#[derive(Clone)]
pub struct DynamicSize {
    /// Scalar `s64` node with the product.
    pub size: GraphTensor,
    /// The product when every contributing axis is static.
    pub static_size: Option<usize>,
}

/// `[0, 1, ..., rank - 1]`
pub fn all_dimensions(rank: usize) -> Vec<usize> {
    (0..rank).collect()
}

/// Product of the sizes of `input` at `dims`.
///
/// Static axes are folded at build time; every dynamic axis contributes one
/// multiplication by its size node.
pub fn dimensions_size(input: &GraphTensor, dims: &[usize]) -> DynamicSize {
    let shape = input.shape();
    let graph = input.graph();
    let mut static_product = 1usize;
    let mut dynamic = Vec::new();
    for &axis in dims {
        match shape.dim(axis) {
            Dim::Static(n) => static_product *= n,
            Dim::Dynamic(id) => dynamic.push(GraphTensor::from_id(id, graph.clone())),
        }
    }
    let mut size =
        GraphTensor::literal(&graph, Scalar::Int(static_product as i64), ElemType::I64);
    let static_size = if dynamic.is_empty() {
        Some(static_product)
    } else {
        None
    };
    for d in dynamic {
        size = &size * &d;
    }
    DynamicSize { size, static_size }
}
