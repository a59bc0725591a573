mod compile;
mod eval;
mod node;
mod propagate;
mod reference;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use thiserror::Error;
use tracing::debug;

use crate::context::{Builtins, ContextRef, FunctionFactory};
use crate::graph::compile::{
    CompileCx, apply_rewire, evaluate_subtree, find_cycle, instantiate, release_subtree,
};
use crate::graph::eval::{refresh_variable, refresh_vector_element};
use crate::graph::node::{Graph, Node, NodeKind, VariableNode};
use crate::graph::propagate::SettleState;
use crate::syntax::ast::Ast;
use crate::syntax::error::SyntaxError;
use crate::syntax::parser::parse;
use crate::value::Value;

pub use node::VarId;

/// Structural failures, rejected synchronously; the graph is left exactly
/// as it was. Evaluation failures never appear here; they are
/// [`Value::Error`](crate::value::Value) values flowing through the graph.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GraphError {
    #[error(transparent)]
    Syntax(#[from] SyntaxError),
    #[error("circular dependency: `{from}` would depend on `{to}`")]
    Cycle { from: String, to: String },
    #[error("unknown function `{name}`")]
    UnknownFunction { name: String },
    #[error("variable `{name}` does not hold a vector")]
    NotAVector { name: String },
    #[error("element {index} out of range for `{name}`")]
    ElementOutOfRange { name: String, index: usize },
    #[error("graph did not settle within {timeout:?}")]
    SettleTimeout { timeout: Duration },
    #[error("snapshot failed: {message}")]
    Snapshot { message: String },
}

/// Recompute counters for one variable, read by tests and tooling.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct VarStats {
    pub recomputes: u64,
    /// Per-element counters when the contents are a vector.
    pub element_recomputes: Vec<u64>,
}

pub(crate) struct EngineInner {
    pub graph: RwLock<Graph>,
    pub settle: SettleState,
    /// Serializes whole propagations against each other; nodes within one
    /// propagation still recompute in parallel, and plain value reads stay
    /// concurrent throughout.
    pub propagation: parking_lot::Mutex<()>,
}

/// The dependency-graph engine: owns every node, enforces acyclicity, and
/// re-drives dependent expressions when a variable changes.
///
/// Cloning shares the engine; all methods take `&self` and are safe to
/// call from several threads. A structure lock guards topology; each
/// node's cached value sits behind its own lock.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(EngineInner {
                graph: RwLock::new(Graph::default()),
                settle: SettleState::default(),
                propagation: parking_lot::Mutex::new(()),
            }),
        }
    }

    /// Get or create the named variable. Fresh variables hold `Null`.
    pub fn variable(&self, name: &str) -> VarId {
        let mut graph = self.inner.graph.write();
        if let Some(&var) = graph.names.get(name) {
            return var;
        }
        let id = graph.alloc(Node::new(
            NodeKind::Variable(VariableNode {
                name: name.to_string(),
                context: None,
                contents: None,
                listeners: Vec::new(),
                sources: Vec::new(),
            }),
            Value::Null,
        ));
        let var = VarId(id);
        graph.names.insert(name.to_string(), var);
        debug!(name, "created variable");
        var
    }

    pub fn name(&self, var: VarId) -> String {
        self.inner.graph.read().var(var).name.clone()
    }

    /// The variable's current cached value.
    pub fn value(&self, var: VarId) -> Value {
        self.inner.graph.read().node(var.node()).cached_value()
    }

    /// Replace the contents with a plain value and notify dependents.
    pub fn set_value(&self, var: VarId, value: impl Into<Value>) {
        let value = value.into();
        let changed;
        {
            let mut graph = self.inner.graph.write();
            if let Some(old) = graph.var(var).contents {
                release_subtree(&mut graph, old, Some(var));
            }
            let literal = graph.alloc(Node::new(NodeKind::Literal, value));
            graph.node_mut(literal).parent = Some(var.node());
            graph.var_mut(var).contents = Some(literal);
            changed = refresh_variable(&graph, var);
        }
        if changed {
            propagate::run(&self.inner, var, true);
        }
    }

    /// Parse `text` and wire it as the variable's contents, resolving
    /// function calls through the built-in library.
    pub fn set_contents(
        &self,
        var: VarId,
        text: &str,
        ctx: Option<&ContextRef>,
    ) -> Result<(), GraphError> {
        self.set_contents_with(var, text, ctx, &Builtins)
    }

    /// Like [`set_contents`](Engine::set_contents) with a caller-supplied
    /// function factory.
    pub fn set_contents_with(
        &self,
        var: VarId,
        text: &str,
        ctx: Option<&ContextRef>,
        factory: &dyn FunctionFactory,
    ) -> Result<(), GraphError> {
        let ast = parse(text)?;
        self.replace_contents(var, &ast, ctx, factory)
    }

    /// Wire an already-parsed expression as the variable's contents.
    pub fn set_contents_ast(
        &self,
        var: VarId,
        ast: &Ast,
        ctx: Option<&ContextRef>,
    ) -> Result<(), GraphError> {
        self.replace_contents(var, ast, ctx, &Builtins)
    }

    /// One-shot parse-and-evaluate against an optional root context.
    pub fn evaluate(&self, text: &str, ctx: Option<&ContextRef>) -> Result<Value, GraphError> {
        let ast = parse(text)?;
        let var = {
            let mut graph = self.inner.graph.write();
            let id = graph.alloc(Node::new(
                NodeKind::Variable(VariableNode {
                    name: "(eval)".to_string(),
                    context: None,
                    contents: None,
                    listeners: Vec::new(),
                    sources: Vec::new(),
                }),
                Value::Null,
            ));
            VarId(id)
        };
        let result = self
            .replace_contents(var, &ast, ctx, &Builtins)
            .map(|_| self.value(var));
        let mut graph = self.inner.graph.write();
        if let Some(contents) = graph.var(var).contents {
            release_subtree(&mut graph, contents, Some(var));
        }
        graph.release(var.node());
        result
    }

    /// Register a value-changed notification for the variable.
    pub fn on_change(
        &self,
        var: VarId,
        callback: impl Fn(VarId, &Value) + Send + Sync + 'static,
    ) {
        self.inner
            .graph
            .write()
            .callbacks
            .entry(var)
            .or_default()
            .push(Arc::new(callback));
    }

    /// Ask every listener of the variable to recompute. A listener whose
    /// recomputed value is unchanged propagates nothing further.
    pub fn notify_listeners(&self, var: VarId) {
        propagate::run(&self.inner, var, false);
    }

    /// Block until no recomputation is in flight, up to `timeout`.
    pub fn settle(&self, timeout: Duration) -> bool {
        self.inner.settle.wait(timeout)
    }

    /// Settle-gated serialization of every named variable's value.
    pub fn snapshot(&self, timeout: Duration) -> Result<serde_json::Value, GraphError> {
        if !self.settle(timeout) {
            return Err(GraphError::SettleTimeout { timeout });
        }
        let graph = self.inner.graph.read();
        let values: BTreeMap<String, Value> = graph
            .names
            .iter()
            .map(|(name, &var)| (name.clone(), graph.node(var.node()).cached_value()))
            .collect();
        serde_json::to_value(values).map_err(|error| GraphError::Snapshot {
            message: error.to_string(),
        })
    }

    /// Current (name, value) pairs, sorted by name.
    pub fn variables(&self) -> Vec<(String, Value)> {
        let graph = self.inner.graph.read();
        let mut out: Vec<(String, Value)> = graph
            .names
            .iter()
            .map(|(name, &var)| (name.clone(), graph.node(var.node()).cached_value()))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    pub fn stats(&self, var: VarId) -> VarStats {
        let graph = self.inner.graph.read();
        let recomputes = graph.node(var.node()).state.lock().recomputes;
        let element_recomputes = graph
            .var(var)
            .contents
            .map(|contents| graph.node(contents).state.lock().element_recomputes.clone())
            .unwrap_or_default();
        VarStats {
            recomputes,
            element_recomputes,
        }
    }

    /// Replace one element of a vector-valued variable, recomputing only
    /// that element's propagation domain.
    pub fn set_element(&self, var: VarId, index: usize, text: &str) -> Result<(), GraphError> {
        let ast = parse(text)?;
        self.splice_element(var, index, Splice::Replace(&ast))
    }

    /// Insert an element, renumbering every subsequent element.
    pub fn insert_element(&self, var: VarId, index: usize, text: &str) -> Result<(), GraphError> {
        let ast = parse(text)?;
        self.splice_element(var, index, Splice::Insert(&ast))
    }

    /// Remove an element, renumbering every subsequent element.
    pub fn remove_element(&self, var: VarId, index: usize) -> Result<(), GraphError> {
        self.splice_element(var, index, Splice::Remove)
    }

    fn replace_contents(
        &self,
        var: VarId,
        ast: &Ast,
        ctx: Option<&ContextRef>,
        factory: &dyn FunctionFactory,
    ) -> Result<(), GraphError> {
        let changed;
        {
            let mut graph = self.inner.graph.write();
            let saved_context = graph.var(var).context.clone();

            let cx = CompileCx { ctx, factory };
            let root = instantiate(&mut graph, ast, &cx)?;

            // Parent the fresh tree (and install the new context) before the
            // first evaluation so relative references can find their owner;
            // listener edges are still unregistered, so this is reversible.
            graph.node_mut(root).parent = Some(var.node());
            graph.var_mut(var).context = ctx.cloned();

            let mut rewires = Vec::new();
            evaluate_subtree(&graph, root, &mut rewires);

            if let Some(source) = find_cycle(&graph, var, &rewires) {
                let from = graph.var(var).name.clone();
                let to = graph.var(source).name.clone();
                release_subtree(&mut graph, root, None);
                graph.var_mut(var).context = saved_context;
                return Err(GraphError::Cycle { from, to });
            }

            if let Some(old) = graph.var(var).contents {
                release_subtree(&mut graph, old, Some(var));
            }
            graph.var_mut(var).contents = Some(root);
            for rw in rewires {
                apply_rewire(&mut graph, rw.reference, rw.listen);
            }
            changed = refresh_variable(&graph, var);
        }
        if changed {
            propagate::run(&self.inner, var, true);
        }
        Ok(())
    }

    fn splice_element(
        &self,
        var: VarId,
        index: usize,
        op: Splice<'_>,
    ) -> Result<(), GraphError> {
        let changed;
        {
            let mut graph = self.inner.graph.write();
            let name = graph.var(var).name.clone();
            let Some(root) = graph.var(var).contents else {
                return Err(GraphError::NotAVector { name });
            };
            let NodeKind::Vector { elements } = &graph.node(root).kind else {
                return Err(GraphError::NotAVector { name });
            };
            let len = elements.len();
            let limit = if matches!(op, Splice::Insert(_)) { len } else { len.saturating_sub(1) };
            if (len == 0 && !matches!(op, Splice::Insert(_))) || index > limit {
                return Err(GraphError::ElementOutOfRange { name, index });
            }

            match op {
                Splice::Replace(ast) | Splice::Insert(ast) => {
                    let ctx = graph.var(var).context.clone();
                    let cx = CompileCx {
                        ctx: ctx.as_ref(),
                        factory: &Builtins,
                    };
                    let element = instantiate(&mut graph, ast, &cx)?;
                    graph.node_mut(element).parent = Some(root);
                    let mut rewires = Vec::new();
                    evaluate_subtree(&graph, element, &mut rewires);
                    if let Some(source) = find_cycle(&graph, var, &rewires) {
                        let from = graph.var(var).name.clone();
                        let to = graph.var(source).name.clone();
                        release_subtree(&mut graph, element, None);
                        return Err(GraphError::Cycle { from, to });
                    }

                    if matches!(op, Splice::Replace(_)) {
                        let old = {
                            let NodeKind::Vector { elements } =
                                &mut graph.node_mut(root).kind
                            else {
                                unreachable!("checked above");
                            };
                            std::mem::replace(&mut elements[index], element)
                        };
                        release_subtree(&mut graph, old, Some(var));
                        for rw in rewires {
                            apply_rewire(&mut graph, rw.reference, rw.listen);
                        }
                        let slot_changed = refresh_vector_element(&graph, root, index);
                        changed = slot_changed && refresh_variable(&graph, var);
                    } else {
                        let element_value = graph.node(element).cached_value();
                        {
                            let NodeKind::Vector { elements } =
                                &mut graph.node_mut(root).kind
                            else {
                                unreachable!("checked above");
                            };
                            elements.insert(index, element);
                        }
                        for rw in rewires {
                            apply_rewire(&mut graph, rw.reference, rw.listen);
                        }
                        let mut state = graph.node(root).state.lock();
                        state.element_recomputes.insert(index, 0);
                        if let Value::Vector(values) = &mut state.value {
                            values.insert(index, element_value);
                        }
                        state.generation += 1;
                        drop(state);
                        changed = refresh_variable(&graph, var);
                    }
                }
                Splice::Remove => {
                    let element = {
                        let NodeKind::Vector { elements } = &mut graph.node_mut(root).kind
                        else {
                            unreachable!("checked above");
                        };
                        elements.remove(index)
                    };
                    release_subtree(&mut graph, element, Some(var));
                    let mut state = graph.node(root).state.lock();
                    state.element_recomputes.remove(index);
                    if let Value::Vector(values) = &mut state.value
                        && index < values.len()
                    {
                        values.remove(index);
                    }
                    state.generation += 1;
                    drop(state);
                    changed = refresh_variable(&graph, var);
                }
            }
        }
        if changed {
            propagate::run(&self.inner, var, true);
        }
        Ok(())
    }
}

#[derive(Clone, Copy)]
enum Splice<'a> {
    Replace(&'a Ast),
    Insert(&'a Ast),
    Remove,
}
