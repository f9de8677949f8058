use std::{
    collections::HashSet,
    env, fs,
    path::Path,
    process::Command,
    sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use crate::{
    bail,
    cpu_storage::CpuDevice,
    storage::BackendDevice,
    Dim, Error, GraphTensor, Result, RunConfig, Scalar, Shape, Tensor,
};

use petgraph::{algo::toposort, graphmap::DiGraphMap, Graph as PetGraph};
use petgraph::{
    dot::{Config, Dot},
    graph::NodeIndex,
};

/// Arena of graph nodes. Cloning the graph clones the handle, not the nodes;
/// nodes are only ever appended.
#[derive(Clone, Default)]
pub struct Graph {
    data: Arc<RwLock<Vec<Node>>>,
}

impl Graph {
    /// Create an empty Graph
    pub fn empty() -> Self {
        Self::default()
    }

    /// Read-only access to the list of nodes
    pub fn get_nodes(&self) -> RwLockReadGuard<'_, Vec<Node>> {
        self.data.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<Node>> {
        self.data.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn len(&self) -> usize {
        self.get_nodes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.get_nodes().is_empty()
    }

    /// Append a node and return its id. Id allocation and insertion happen
    /// under one lock, so concurrent builders never observe a torn arena.
    pub(crate) fn add_node(&self, op: Op, shape: Shape) -> NodeId {
        let mut nodes = self.write();
        let id = NodeId(nodes.len());
        nodes.push(Node { op, shape });
        id
    }

    pub fn shape_of(&self, id: NodeId) -> Shape {
        self.get_nodes()[id.0].shape.clone()
    }

    pub(crate) fn set_dims(&self, id: NodeId, dims: Vec<Dim>) {
        *self.write()[id.0].shape.dims_mut() = dims;
    }

    pub fn same_graph(&self, other: &Graph) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }

    pub fn to_petgraph(&self) -> PetGraph<String, ()> {
        let nodes = self.get_nodes();
        let mut g = PetGraph::<String, ()>::new();
        let idx_map: Vec<NodeIndex> = nodes
            .iter()
            .map(|node| g.add_node(format!("{} : {}", node.op.label(), node.shape)))
            .collect();
        for (i, node) in nodes.iter().enumerate() {
            for src in node.dependencies() {
                g.add_edge(idx_map[src.0], idx_map[i], ());
            }
        }
        g
    }

    /// Produce a DOT format string of this graph.
    pub fn to_dot(&self) -> String {
        let g = self.to_petgraph();
        format!("{:?}", Dot::with_config(&g, &[Config::EdgeNoLabel]))
    }

    /// Visualize the graph by saving it to this file.
    ///
    /// Install graphvis:
    /// - brew install graphviz
    /// - apt install graphviz
    pub fn visualize<P: AsRef<Path>>(&self, filename: P) -> Result<()> {
        let path = filename.as_ref();
        let tmp_dir = env::temp_dir();
        let dot_path = tmp_dir.join("graph.dot");
        let png_path = path.to_path_buf();

        fs::write(&dot_path, self.to_dot())?;
        let status = Command::new("dot")
            .args([
                "-Tpng",
                &dot_path.display().to_string(),
                "-o",
                &png_path.display().to_string(),
            ])
            .status()?;
        if !status.success() {
            bail!("graphviz exited with {status}");
        }

        Ok(())
    }

    /// Compile the subgraph which produces `output`, using [`RunConfig::from_env`].
    pub fn compile(&self, output: &GraphTensor) -> Result<CompiledGraph> {
        self.compile_with_config(output, RunConfig::from_env())
    }

    pub fn compile_with_config(
        &self,
        output: &GraphTensor,
        config: RunConfig,
    ) -> Result<CompiledGraph> {
        if !self.same_graph(&output.graph()) {
            bail!("output tensor belongs to a different graph");
        }
        if let Some(path) = &config.dump_dot {
            fs::write(path, self.to_dot())?;
        }

        let nodes = self.get_nodes().clone();

        // Parameters are numbered over the whole graph, not only the reachable part.
        let mut param_indices = Vec::new();
        for node in nodes.iter() {
            if let Op::Parameter { index, .. } = node.op {
                if param_indices.contains(&index) {
                    return Err(Error::DuplicateParameter(index));
                }
                param_indices.push(index);
            }
        }
        param_indices.sort_unstable();
        if param_indices.iter().enumerate().any(|(i, &p)| i != p) {
            bail!("parameter indices must be 0-based and dense, got {param_indices:?}");
        }

        let mut reachable = HashSet::new();
        let mut stack = vec![output.id()];
        while let Some(id) = stack.pop() {
            if reachable.insert(id) {
                stack.extend(nodes[id.0].dependencies());
            }
        }

        let mut dep_graph = DiGraphMap::<usize, ()>::new();
        for id in reachable.iter() {
            dep_graph.add_node(id.0);
        }
        for id in reachable.iter() {
            for src in nodes[id.0].dependencies() {
                dep_graph.add_edge(src.0, id.0, ());
            }
        }
        let order = toposort(&dep_graph, None).map_err(|_| Error::CycleDetected)?;

        log::debug!(
            "compiled graph: {} nodes, {} reachable from {:?}, {} parameters",
            nodes.len(),
            order.len(),
            output.id(),
            param_indices.len()
        );

        Ok(CompiledGraph {
            nodes: Arc::new(nodes),
            order,
            output: output.id(),
            num_params: param_indices.len(),
            config,
        })
    }
}

/// A graph lowered to an evaluation order, ready to run on the reference backend.
#[derive(Debug)]
pub struct CompiledGraph {
    nodes: Arc<Vec<Node>>,
    order: Vec<usize>,
    output: NodeId,
    num_params: usize,
    config: RunConfig,
}

impl CompiledGraph {
    pub fn with_config(mut self, config: RunConfig) -> Self {
        self.config = config;
        self
    }

    pub fn num_parameters(&self) -> usize {
        self.num_params
    }

    pub fn output_shape(&self) -> &Shape {
        &self.nodes[self.output.0].shape
    }

    /// Run the graph. `args[i]` feeds the parameter with index `i`.
    pub fn run(&self, args: &[Tensor]) -> Result<Tensor> {
        if args.len() != self.num_params {
            return Err(Error::ArgumentCount {
                expected: self.num_params,
                got: args.len(),
            });
        }
        for &idx in self.order.iter() {
            let node = &self.nodes[idx];
            if let Op::Parameter { index, .. } = node.op {
                check_argument(index, &node.shape, &args[index])?;
            }
        }
        CpuDevice.run_graph(&self.nodes, &self.order, self.output, args, &self.config)
    }
}

fn check_argument(index: usize, shape: &Shape, arg: &Tensor) -> Result<()> {
    let matches = arg.elem() == shape.elem()
        && arg.dims().len() == shape.rank()
        && shape
            .dims()
            .iter()
            .zip(arg.dims())
            .all(|(d, &n)| d.as_static().map_or(true, |s| s == n));
    if matches {
        Ok(())
    } else {
        Err(Error::ArgumentMismatch {
            index,
            expected: shape.to_string(),
            got: format!("{}{:?}", arg.elem(), arg.dims()),
        })
    }
}

#[derive(PartialEq, Debug, Clone, Copy)]
pub enum BinaryOpType {
    Add,
    Div,
    Sub,
    Mul,
    Max,
    Min,
    And,
    Or,
}

impl BinaryOpType {
    pub fn as_c_op(&self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Div => "/",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Max => "max",
            Self::Min => "min",
            Self::And => "&&",
            Self::Or => "||",
        }
    }

    /// Integral arithmetic wraps. Integral division by zero yields -1.
    pub fn as_closure(&self) -> fn(Scalar, Scalar) -> Scalar {
        match self {
            Self::Add => |x, y| x.zip_with(y, i64::wrapping_add, |a, b| a + b),
            Self::Div => |x, y| x.zip_with(y, int_div, |a, b| a / b),
            Self::Sub => |x, y| x.zip_with(y, i64::wrapping_sub, |a, b| a - b),
            Self::Mul => |x, y| x.zip_with(y, i64::wrapping_mul, |a, b| a * b),
            Self::Max => |x, y| x.zip_with(y, i64::max, nan_max),
            Self::Min => |x, y| x.zip_with(y, i64::min, nan_min),
            Self::And => |x, y| Scalar::from_bool(x.is_truthy() && y.is_truthy()),
            Self::Or => |x, y| Scalar::from_bool(x.is_truthy() || y.is_truthy()),
        }
    }
}

#[derive(PartialEq, Debug, Clone, Copy)]
pub enum UnaryOpType {
    Neg,
    Abs,
    Log,
    Exp,
    Sqrt,
}

impl UnaryOpType {
    /// Transcendental ops evaluate in `f64` for every element type.
    pub fn to_closure(&self) -> fn(Scalar) -> Scalar {
        match self {
            Self::Neg => |x| x.map(i64::wrapping_neg, |v| -v),
            Self::Abs => |x| x.map(i64::wrapping_abs, f64::abs),
            Self::Log => |x| Scalar::Float(x.to_f64().ln()),
            Self::Exp => |x| Scalar::Float(x.to_f64().exp()),
            Self::Sqrt => |x| Scalar::Float(x.to_f64().sqrt()),
        }
    }
}

#[derive(PartialEq, Debug, Clone, Copy)]
pub enum ComparisonDirection {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl ComparisonDirection {
    pub fn as_closure(&self) -> fn(Scalar, Scalar) -> bool {
        match self {
            Self::Eq => |x, y| x == y,
            Self::Ne => |x, y| x != y,
            Self::Lt => |x, y| x < y,
            Self::Le => |x, y| x <= y,
            Self::Gt => |x, y| x > y,
            Self::Ge => |x, y| x >= y,
        }
    }
}

/// Associative, commutative combiner of a reduction.
///
/// `All` and `Any` fold "truthiness": `(x != 0 && y != 0) ? 1 : 0` and
/// `(x != 0 || y != 0) ? 1 : 0`, in the element type of the input.
#[derive(PartialEq, Eq, Debug, Clone, Copy, Hash)]
pub enum ReduceOp {
    Add,
    Mul,
    Max,
    Min,
    All,
    Any,
}

impl ReduceOp {
    pub fn combine(&self, x: Scalar, y: Scalar) -> Scalar {
        match self {
            Self::Add => x.zip_with(y, i64::wrapping_add, |a, b| a + b),
            Self::Mul => x.zip_with(y, i64::wrapping_mul, |a, b| a * b),
            Self::Max => x.zip_with(y, i64::max, nan_max),
            Self::Min => x.zip_with(y, i64::min, nan_min),
            Self::All => Scalar::from_bool(x.is_truthy() && y.is_truthy()),
            Self::Any => Scalar::from_bool(x.is_truthy() || y.is_truthy()),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Mul => "mul",
            Self::Max => "max",
            Self::Min => "min",
            Self::All => "all",
            Self::Any => "any",
        }
    }
}

fn int_div(x: i64, y: i64) -> i64 {
    if y == 0 {
        -1
    } else {
        x.wrapping_div(y)
    }
}

fn nan_max(x: f64, y: f64) -> f64 {
    if x.is_nan() || y.is_nan() {
        f64::NAN
    } else {
        x.max(y)
    }
}

fn nan_min(x: f64, y: f64) -> f64 {
    if x.is_nan() || y.is_nan() {
        f64::NAN
    } else {
        x.min(y)
    }
}

#[derive(PartialEq, Debug, Clone)]
pub enum Op {
    Parameter {
        index: usize,
        name: String,
    },
    /// Scalar literal, already rounded into the node's element type.
    Constant {
        value: Scalar,
    },
    UnaryOp {
        v_id: NodeId,
        operator: UnaryOpType,
    },
    BinaryOp {
        l_id: NodeId,
        r_id: NodeId,
        operator: BinaryOpType,
    },
    Compare {
        l_id: NodeId,
        r_id: NodeId,
        direction: ComparisonDirection,
    },
    Select {
        pred: NodeId,
        on_true: NodeId,
        on_false: NodeId,
    },
    Convert {
        v_id: NodeId,
    },
    Reduce {
        v_id: NodeId,
        init: NodeId,
        operator: ReduceOp,
        dims: Vec<usize>,
    },
    ReduceWindow {
        v_id: NodeId,
        init: NodeId,
        operator: ReduceOp,
        window_dims: Vec<usize>,
        window_strides: Vec<usize>,
        padding: Vec<(usize, usize)>,
    },
    /// Row-major reshape to the node's dims.
    Reshape {
        v_id: NodeId,
    },
    /// Operand axis `i` maps to output axis `broadcast_dims[i]`.
    BroadcastInDim {
        v_id: NodeId,
        broadcast_dims: Vec<usize>,
    },
    Slice {
        v_id: NodeId,
        start: Vec<usize>,
        limit: Vec<usize>,
        strides: Vec<usize>,
    },
    Rev {
        v_id: NodeId,
        dims: Vec<usize>,
    },
    ArgExtremum {
        v_id: NodeId,
        axis: usize,
        find_max: bool,
    },
    GetDimensionSize {
        v_id: NodeId,
        axis: usize,
    },
}

impl Op {
    pub fn operands(&self) -> Vec<NodeId> {
        match self {
            Op::Parameter { .. } | Op::Constant { .. } => vec![],
            Op::UnaryOp { v_id, .. }
            | Op::Convert { v_id }
            | Op::Reshape { v_id }
            | Op::BroadcastInDim { v_id, .. }
            | Op::Slice { v_id, .. }
            | Op::Rev { v_id, .. }
            | Op::ArgExtremum { v_id, .. }
            | Op::GetDimensionSize { v_id, .. } => vec![*v_id],
            Op::BinaryOp { l_id, r_id, .. } | Op::Compare { l_id, r_id, .. } => {
                vec![*l_id, *r_id]
            }
            Op::Select {
                pred,
                on_true,
                on_false,
            } => vec![*pred, *on_true, *on_false],
            Op::Reduce { v_id, init, .. } | Op::ReduceWindow { v_id, init, .. } => {
                vec![*v_id, *init]
            }
        }
    }

    pub fn label(&self) -> String {
        match self {
            Op::Parameter { index, name } => format!("Parameter({index}, {name})"),
            Op::Constant { value } => format!("Constant({value})"),
            Op::UnaryOp { operator, .. } => format!("UnOp({operator:?})"),
            Op::BinaryOp { operator, .. } => format!("BinOp({})", operator.as_c_op()),
            Op::Compare { direction, .. } => format!("Compare({direction:?})"),
            Op::Select { .. } => "Select".to_string(),
            Op::Convert { .. } => "Convert".to_string(),
            Op::Reduce { operator, dims, .. } => {
                format!("Reduce({}, dims={dims:?})", operator.name())
            }
            Op::ReduceWindow {
                operator,
                window_dims,
                padding,
                ..
            } => format!(
                "ReduceWindow({}, window={window_dims:?}, padding={padding:?})",
                operator.name()
            ),
            Op::Reshape { .. } => "Reshape".to_string(),
            Op::BroadcastInDim { broadcast_dims, .. } => {
                format!("BroadcastInDim({broadcast_dims:?})")
            }
            Op::Slice {
                start,
                limit,
                strides,
                ..
            } => format!("Slice({start:?}, {limit:?}, {strides:?})"),
            Op::Rev { dims, .. } => format!("Rev({dims:?})"),
            Op::ArgExtremum { axis, find_max, .. } => {
                let name = if *find_max { "ArgMax" } else { "ArgMin" };
                format!("{name}(axis={axis})")
            }
            Op::GetDimensionSize { axis, .. } => format!("GetDimensionSize({axis})"),
        }
    }
}

#[derive(PartialEq, Debug, Clone)]
pub struct Node {
    pub op: Op,
    pub shape: Shape,
}

impl Node {
    /// Nodes which must be evaluated before this one: its operands plus, for
    /// ops whose output extent is taken from the node shape, the size nodes
    /// of its dynamic axes.
    pub fn dependencies(&self) -> Vec<NodeId> {
        let mut deps = self.op.operands();
        if matches!(self.op, Op::Reshape { .. } | Op::BroadcastInDim { .. }) {
            for d in self.shape.dims() {
                if let Dim::Dynamic(id) = d {
                    if !deps.contains(id) {
                        deps.push(*id);
                    }
                }
            }
        }
        deps
    }
}

/// Index of a node in its [`Graph`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct NodeId(usize);

impl From<NodeId> for usize {
    fn from(value: NodeId) -> Self {
        value.0
    }
}

impl From<&NodeId> for usize {
    fn from(value: &NodeId) -> Self {
        value.0
    }
}
