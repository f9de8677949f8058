use crate::{
    graph::{Node, NodeId},
    Result, RunConfig, Tensor,
};

/// An execution engine for compiled graphs.
///
/// `order` is a topological order of the nodes needed for `output`; `args[i]`
/// feeds the parameter with index `i` and has already been checked against
/// its declared shape.
pub trait BackendDevice {
    fn run_graph(
        &self,
        nodes: &[Node],
        order: &[usize],
        output: NodeId,
        args: &[Tensor],
        config: &RunConfig,
    ) -> Result<Tensor>;
}
