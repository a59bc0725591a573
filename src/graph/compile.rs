use std::collections::HashSet;

use parking_lot::Mutex;
use tracing::debug;

use crate::constraint::FunctionKind;
use crate::context::{ContextRef, FunctionFactory};
use crate::graph::GraphError;
use crate::graph::eval::refresh_node;
use crate::graph::node::{
    Graph, Node, NodeId, NodeKind, ReferenceNode, ResolutionChain, VarId,
};
use crate::graph::reference::Rewire;
use crate::syntax::ast::{Ast, RefOrigin};
use crate::value::Value;

pub(crate) struct CompileCx<'a> {
    pub ctx: Option<&'a ContextRef>,
    pub factory: &'a dyn FunctionFactory,
}

/// Instantiate an AST into detached arena nodes. No listener edges are
/// registered yet; references resolve on the first evaluation pass and
/// report their wanted edges as rewires. On failure every node built so
/// far is released, leaving the arena as it was.
pub(crate) fn instantiate(
    graph: &mut Graph,
    ast: &Ast,
    cx: &CompileCx,
) -> Result<NodeId, GraphError> {
    let id = match ast {
        Ast::Number(n) => alloc_literal(graph, Value::Number(*n)),
        Ast::Str(s) => alloc_literal(graph, Value::Str(s.clone())),
        Ast::Bool(b) => alloc_literal(graph, Value::Bool(*b)),
        Ast::Null => alloc_literal(graph, Value::Null),
        Ast::Unary { op, operand } => {
            let children = build_children(graph, &[operand.as_ref()], cx)?;
            alloc_function(graph, op.kind(), children)
        }
        Ast::Binary { op, left, right } => {
            let children = build_children(graph, &[left.as_ref(), right.as_ref()], cx)?;
            alloc_function(graph, op.kind(), children)
        }
        Ast::Ternary {
            condition,
            then_branch,
            else_branch,
        } => {
            let children = build_children(
                graph,
                &[condition.as_ref(), then_branch.as_ref(), else_branch.as_ref()],
                cx,
            )?;
            alloc_function(graph, FunctionKind::Ternary, children)
        }
        Ast::Range { from, to } => {
            let children = build_children(graph, &[from.as_ref(), to.as_ref()], cx)?;
            alloc_function(graph, FunctionKind::Range, children)
        }
        Ast::Index { base, index } => {
            let children = build_children(graph, &[base.as_ref(), index.as_ref()], cx)?;
            alloc_function(graph, FunctionKind::Index, children)
        }
        Ast::Evaluate { operand } => {
            let children = build_children(graph, &[operand.as_ref()], cx)?;
            alloc_function(graph, FunctionKind::Evaluate, children)
        }
        Ast::Call { name, args } => {
            let Some(function) = cx.factory.create(name) else {
                return Err(GraphError::UnknownFunction { name: name.clone() });
            };
            let refs: Vec<&Ast> = args.iter().collect();
            let children = build_children(graph, &refs, cx)?;
            let id = graph.alloc(Node::new(
                NodeKind::Named {
                    function,
                    inputs: children.clone(),
                },
                Value::Null,
            ));
            adopt(graph, id, &children);
            id
        }
        Ast::Reference { origin, path } => {
            let (relative, bound, origin_expr) = match origin {
                RefOrigin::Root => (false, cx.ctx.cloned(), None),
                RefOrigin::Relative => (true, None, None),
                RefOrigin::Expr(base) => {
                    let child = instantiate(graph, base, cx)?;
                    (false, None, Some(child))
                }
            };
            let id = graph.alloc(Node::new(
                NodeKind::Reference(ReferenceNode {
                    relative,
                    origin: bound,
                    origin_expr,
                    path: path.clone(),
                    chain: Mutex::new(ResolutionChain::default()),
                    listening: Vec::new(),
                }),
                Value::Null,
            ));
            if let Some(child) = origin_expr {
                adopt(graph, id, &[child]);
            }
            id
        }
        Ast::Vector { elements } => {
            let refs: Vec<&Ast> = elements.iter().collect();
            let children = build_children(graph, &refs, cx)?;
            let id = graph.alloc(Node::new(
                NodeKind::Vector {
                    elements: children.clone(),
                },
                Value::Null,
            ));
            graph
                .node(id)
                .state
                .lock()
                .element_recomputes
                .resize(children.len(), 0);
            adopt(graph, id, &children);
            id
        }
    };
    Ok(id)
}

fn alloc_literal(graph: &mut Graph, value: Value) -> NodeId {
    graph.alloc(Node::new(NodeKind::Literal, value))
}

fn alloc_function(graph: &mut Graph, kind: FunctionKind, children: Vec<NodeId>) -> NodeId {
    let id = graph.alloc(Node::new(
        NodeKind::Function {
            kind,
            inputs: children.clone(),
        },
        Value::Null,
    ));
    adopt(graph, id, &children);
    id
}

fn build_children(
    graph: &mut Graph,
    asts: &[&Ast],
    cx: &CompileCx,
) -> Result<Vec<NodeId>, GraphError> {
    let mut children = Vec::with_capacity(asts.len());
    for &ast in asts {
        match instantiate(graph, ast, cx) {
            Ok(child) => children.push(child),
            Err(error) => {
                for built in children {
                    release_subtree(graph, built, None);
                }
                return Err(error);
            }
        }
    }
    Ok(children)
}

/// Single-parent invariant: each child is adopted exactly once, at
/// construction.
fn adopt(graph: &mut Graph, parent: NodeId, children: &[NodeId]) {
    for &child in children {
        let node = graph.node_mut(child);
        debug_assert!(node.parent.is_none(), "node adopted twice");
        node.parent = Some(parent);
    }
}

/// First full evaluation of a freshly built subtree, bottom-up. Reference
/// nodes report their wanted listener edges through `rewires`.
pub(crate) fn evaluate_subtree(graph: &Graph, id: NodeId, rewires: &mut Vec<Rewire>) {
    for child in graph.node(id).children() {
        evaluate_subtree(graph, child, rewires);
    }
    if !matches!(graph.node(id).kind, NodeKind::Literal) {
        refresh_node(graph, id, rewires);
    }
}

/// Release a subtree, deregistering every reference in it from the
/// variables it listens to. `owner` is the variable whose source
/// bookkeeping mirrors those edges (None while the tree is detached).
pub(crate) fn release_subtree(graph: &mut Graph, id: NodeId, owner: Option<VarId>) {
    for child in graph.node(id).children() {
        release_subtree(graph, child, owner);
    }
    if let NodeKind::Reference(reference) = &graph.node(id).kind {
        let listening = reference.listening.clone();
        for var in listening {
            remove_one(&mut graph.var_mut(var).listeners, &id);
            if let Some(owner) = owner {
                remove_one(&mut graph.var_mut(owner).sources, &var);
            }
        }
    }
    graph.release(id);
}

/// Move a reference's listener edges to the wanted set, updating the
/// owning variable's source bookkeeping to match.
pub(crate) fn apply_rewire(graph: &mut Graph, reference: NodeId, listen: Vec<VarId>) {
    let owner = graph.owner_of(reference);
    let NodeKind::Reference(node) = &mut graph.node_mut(reference).kind else {
        return;
    };
    let old = std::mem::replace(&mut node.listening, listen.clone());
    for var in old {
        remove_one(&mut graph.var_mut(var).listeners, &reference);
        if let Some(owner) = owner {
            remove_one(&mut graph.var_mut(owner).sources, &var);
        }
    }
    for var in listen {
        graph.var_mut(var).listeners.push(reference);
        if let Some(owner) = owner {
            graph.var_mut(owner).sources.push(var);
        }
    }
    debug!(?reference, ?owner, "rewired listener edges");
}

fn remove_one<T: PartialEq>(items: &mut Vec<T>, item: &T) {
    if let Some(at) = items.iter().position(|x| x == item) {
        items.remove(at);
    }
}

/// Reachability check before wiring `target`'s new contents: if any
/// wanted source variable transitively depends on `target`, the edge
/// would close a cycle. Returns the offending source.
pub(crate) fn find_cycle(graph: &Graph, target: VarId, rewires: &[Rewire]) -> Option<VarId> {
    let sources: HashSet<VarId> = rewires
        .iter()
        .flat_map(|rw| rw.listen.iter().copied())
        .collect();
    for &source in &sources {
        if source == target || depends_on(graph, source, target) {
            return Some(source);
        }
    }
    None
}

fn depends_on(graph: &Graph, from: VarId, target: VarId) -> bool {
    let mut visited: HashSet<VarId> = HashSet::new();
    let mut stack = vec![from];
    while let Some(var) = stack.pop() {
        if var == target {
            return true;
        }
        if !visited.insert(var) {
            continue;
        }
        for &source in &graph.var(var).sources {
            if !visited.contains(&source) {
                stack.push(source);
            }
        }
    }
    false
}
