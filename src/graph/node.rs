use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::constraint::FunctionKind;
use crate::context::{ContextRef, NamedFunction};
use crate::value::Value;

/// Arena index of a live node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub(crate) u32);

/// Arena index known to hold a variable node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VarId(pub(crate) NodeId);

impl VarId {
    pub(crate) fn node(self) -> NodeId {
        self.0
    }
}

/// Cached result of one node, behind the per-node value lock.
#[derive(Debug)]
pub(crate) struct NodeState {
    pub value: Value,
    /// Bumped whenever `value` actually changes.
    pub generation: u64,
    pub recomputes: u64,
    /// Per-element refresh counters; non-empty only for vector nodes.
    pub element_recomputes: Vec<u64>,
}

impl NodeState {
    pub fn new(value: Value) -> Self {
        Self {
            value,
            generation: 0,
            recomputes: 0,
            element_recomputes: Vec::new(),
        }
    }
}

/// One element of a reference's cached resolution chain.
#[derive(Debug, Clone)]
pub(crate) enum StepOutcome {
    /// The segment named a subcontext.
    Descend(ContextRef),
    /// The segment named a variable property; the generation is the
    /// variable's value generation observed at resolution time.
    Variable(VarId, u64),
}

#[derive(Debug, Clone)]
pub(crate) struct ResolvedStep {
    /// The context the segment was looked up in.
    pub input: ContextRef,
    pub outcome: StepOutcome,
}

/// Per-segment resolution cache; re-resolution short-circuits while each
/// step's input context and observed variable generation are unchanged.
#[derive(Debug, Default)]
pub(crate) struct ResolutionChain {
    pub steps: Vec<ResolvedStep>,
}

#[derive(Debug)]
pub(crate) struct ReferenceNode {
    /// Leading-`.` reference: walks the owning variable's context instead
    /// of a bound origin.
    pub relative: bool,
    /// Root context bound at compile time (absolute references).
    pub origin: Option<ContextRef>,
    /// Child expression whose evaluated context is walked.
    pub origin_expr: Option<NodeId>,
    pub path: Vec<String>,
    pub chain: Mutex<ResolutionChain>,
    /// Variables this reference is currently registered on.
    pub listening: Vec<VarId>,
}

#[derive(Debug)]
pub(crate) struct VariableNode {
    pub name: String,
    /// Context supplied when the contents were last set; relative
    /// references under this variable resolve against it.
    pub context: Option<ContextRef>,
    pub contents: Option<NodeId>,
    /// Reference nodes registered on this variable.
    pub listeners: Vec<NodeId>,
    /// Variables this variable's contents listen to, one entry per
    /// registered reference edge.
    pub sources: Vec<VarId>,
}

#[derive(Debug)]
pub(crate) enum NodeKind {
    Literal,
    Function {
        kind: FunctionKind,
        inputs: Vec<NodeId>,
    },
    Named {
        function: Arc<NamedFunction>,
        inputs: Vec<NodeId>,
    },
    Reference(ReferenceNode),
    Vector {
        elements: Vec<NodeId>,
    },
    Variable(VariableNode),
}

#[derive(Debug)]
pub(crate) struct Node {
    /// Every non-variable node has exactly one parent; the root of a
    /// contents tree points at its owning variable.
    pub parent: Option<NodeId>,
    pub kind: NodeKind,
    pub state: Mutex<NodeState>,
}

impl Node {
    pub fn new(kind: NodeKind, value: Value) -> Self {
        Self {
            parent: None,
            kind,
            state: Mutex::new(NodeState::new(value)),
        }
    }

    pub fn children(&self) -> Vec<NodeId> {
        match &self.kind {
            NodeKind::Literal => Vec::new(),
            NodeKind::Function { inputs, .. } | NodeKind::Named { inputs, .. } => inputs.clone(),
            NodeKind::Reference(reference) => reference.origin_expr.into_iter().collect(),
            NodeKind::Vector { elements } => elements.clone(),
            NodeKind::Variable(variable) => variable.contents.into_iter().collect(),
        }
    }

    pub fn cached_value(&self) -> Value {
        self.state.lock().value.clone()
    }
}

pub(crate) type ChangeCallback = dyn Fn(VarId, &Value) + Send + Sync;

/// Node storage plus the variable registry. Topology (parents, listener
/// edges, vector membership) only changes under the engine's structure
/// write lock; cached values change under each node's own state lock.
#[derive(Default)]
pub(crate) struct Graph {
    slots: Vec<Option<Node>>,
    free: Vec<usize>,
    pub names: HashMap<String, VarId>,
    pub callbacks: HashMap<VarId, Vec<Arc<ChangeCallback>>>,
}

impl Graph {
    pub fn alloc(&mut self, node: Node) -> NodeId {
        match self.free.pop() {
            Some(idx) => {
                self.slots[idx] = Some(node);
                NodeId(idx as u32)
            }
            None => {
                self.slots.push(Some(node));
                NodeId((self.slots.len() - 1) as u32)
            }
        }
    }

    pub fn release(&mut self, id: NodeId) {
        let idx = id.0 as usize;
        debug_assert!(self.slots[idx].is_some(), "double free of node {:?}", id);
        self.slots[idx] = None;
        self.free.push(idx);
    }

    pub fn node(&self, id: NodeId) -> &Node {
        self.slots[id.0 as usize].as_ref().expect("live node")
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        self.slots[id.0 as usize].as_mut().expect("live node")
    }

    pub fn var(&self, id: VarId) -> &VariableNode {
        match &self.node(id.node()).kind {
            NodeKind::Variable(variable) => variable,
            _ => unreachable!("VarId does not point at a variable node"),
        }
    }

    pub fn var_mut(&mut self, id: VarId) -> &mut VariableNode {
        match &mut self.node_mut(id.node()).kind {
            NodeKind::Variable(variable) => variable,
            _ => unreachable!("VarId does not point at a variable node"),
        }
    }

    /// Walk parent edges up to the variable owning this node's tree.
    pub fn owner_of(&self, mut id: NodeId) -> Option<VarId> {
        loop {
            if matches!(self.node(id).kind, NodeKind::Variable(_)) {
                return Some(VarId(id));
            }
            id = self.node(id).parent?;
        }
    }
}
