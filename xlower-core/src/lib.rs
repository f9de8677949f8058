//! xlower lowers high-level tensor operations into a deferred computation graph.
//!
//! Reductions, statistics, losses, cumulative scans and strided slices are
//! expressed as compositions of a small set of graph primitives: parameters,
//! elementwise ops, reduces, windowed reduces, reshapes and broadcasts. Nothing
//! is computed while building; the graph is compiled and then run on a
//! reference CPU backend.
//!
//! ## A quick guide
//! - First, create a [`Graph`]. This holds all the nodes.
//! - Tensors are modelled with a [`GraphTensor`]. These represent the operation but do not perform any computation.
//! - Lower operations with the builders in [`reduction`], [`cumulative`], [`loss`] and [`strided_slice`].
//! - Compile the graph using [`Graph::compile`]. This returns a [`CompiledGraph`].
//! - Run using [`CompiledGraph::run`], feeding one concrete [`Tensor`] per parameter.
//!
//! ## What can you do with it?
//! ```
//! use xlower_core::{cumulative, reduction, ElemType, Graph, GraphTensor, Shape, Tensor};
//!
//! let graph = Graph::empty();
//! let x = GraphTensor::parameter(&graph, 0, Shape::from_static(ElemType::F32, &[2, 3]), "x");
//! let mean = reduction::build_mean(&x, &[1], false);
//! let scan = cumulative::build_cumsum(&mean, 0, false, false);
//!
//! let compiled = graph.compile(&scan).unwrap();
//! let input = Tensor::new(&[1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]).unwrap();
//! let res = compiled.run(&[input]).unwrap();
//!
//! assert_eq!(res.dims(), &[2]);
//! assert_eq!(res.to_vec::<f32>().unwrap(), vec![2.0, 7.0]);
//! ```

mod config;
mod cpu_storage;
pub mod cumulative;
mod dtype;
mod error;
mod graph;
pub mod loss;
pub mod reduction;
mod shape;
mod storage;
pub mod strided_slice;
mod tensor;

pub use config::{RunConfig, DUMP_DOT_ENV, PAR_THRESHOLD_ENV};
pub use dtype::{DType, ElemType, Scalar};
pub use error::{Context, Error, Result};
pub use graph::{
    BinaryOpType, CompiledGraph, ComparisonDirection, Graph, Node, NodeId, Op, ReduceOp,
    UnaryOpType,
};
pub use loss::ReductionMode;
pub use reduction::ReductionInfo;
pub use shape::{all_dimensions, dimensions_size, Dim, DynamicSize, Shape};
pub use strided_slice::{SliceMasks, StridedSliceSpec};
pub use tensor::{GraphTensor, Tensor};
