use crate::constraint::{FunctionKind, MatchOutcome, constraints_for};
use crate::graph::node::{Graph, NodeId, NodeKind, VarId};
use crate::graph::reference::{Rewire, resolve};
use crate::value::{ErrorValue, RangeValue, Value};

/// Compute a node's value from its children's current cached values.
/// Never panics and never returns `Err`: expected failures come back as
/// error values.
pub(crate) fn compute_value(graph: &Graph, id: NodeId, rewires: &mut Vec<Rewire>) -> Value {
    let node = graph.node(id);
    match &node.kind {
        NodeKind::Literal => node.cached_value(),
        NodeKind::Function { kind, inputs } => {
            let values: Vec<Value> = inputs
                .iter()
                .map(|&input| graph.node(input).cached_value())
                .collect();
            apply(*kind, &values)
        }
        NodeKind::Named { function, inputs } => {
            let values: Vec<Value> = inputs
                .iter()
                .map(|&input| graph.node(input).cached_value())
                .collect();
            if let Some(error) = first_error(&values) {
                return error;
            }
            match function.constraints().matches(&values) {
                MatchOutcome::Match { constraint } => function.eval(constraint, &values),
                MatchOutcome::TypeMismatch {
                    constraint,
                    position,
                } => Value::error(ErrorValue::TypeMismatch {
                    function: function.name().to_string(),
                    constraint,
                    position,
                    inputs: values,
                }),
                MatchOutcome::CountMismatch => Value::error(ErrorValue::InputCount {
                    function: function.name().to_string(),
                    given: values.len(),
                }),
            }
        }
        NodeKind::Reference(reference) => {
            let resolution = resolve(graph, id, reference);
            if !same_listen_set(&reference.listening, &resolution.listen) {
                rewires.push(Rewire {
                    reference: id,
                    listen: resolution.listen,
                });
            }
            resolution.value
        }
        NodeKind::Vector { elements } => Value::Vector(
            elements
                .iter()
                .map(|&element| graph.node(element).cached_value())
                .collect(),
        ),
        NodeKind::Variable(variable) => variable
            .contents
            .map(|contents| graph.node(contents).cached_value())
            .unwrap_or(Value::Null),
    }
}

fn same_listen_set(current: &[VarId], desired: &[VarId]) -> bool {
    current.len() == desired.len() && desired.iter().all(|v| current.contains(v))
}

/// Recompute one node, bumping its counter; returns whether the cached
/// value actually changed.
pub(crate) fn refresh_node(graph: &Graph, id: NodeId, rewires: &mut Vec<Rewire>) -> bool {
    let new = compute_value(graph, id, rewires);
    let mut state = graph.node(id).state.lock();
    state.recomputes += 1;
    if state.value != new {
        state.value = new;
        state.generation += 1;
        true
    } else {
        false
    }
}

/// Recompute a single element slot of a vector node, leaving the other
/// slots (and their counters) untouched.
pub(crate) fn refresh_vector_element(graph: &Graph, vector: NodeId, index: usize) -> bool {
    let node = graph.node(vector);
    let NodeKind::Vector { elements } = &node.kind else {
        unreachable!("refresh_vector_element on non-vector node");
    };
    let element_value = graph.node(elements[index]).cached_value();
    let mut state = node.state.lock();
    if state.element_recomputes.len() != elements.len() {
        state.element_recomputes.resize(elements.len(), 0);
    }
    state.element_recomputes[index] += 1;
    match &mut state.value {
        Value::Vector(values) if index < values.len() => {
            if values[index] == element_value {
                false
            } else {
                values[index] = element_value;
                state.generation += 1;
                true
            }
        }
        _ => {
            drop(state);
            let rebuilt = Value::Vector(
                elements
                    .iter()
                    .map(|&element| graph.node(element).cached_value())
                    .collect(),
            );
            let mut state = node.state.lock();
            let changed = state.value != rebuilt;
            if changed {
                state.value = rebuilt;
                state.generation += 1;
            }
            changed
        }
    }
}

/// Pull the contents value into the variable's cache.
pub(crate) fn refresh_variable(graph: &Graph, var: VarId) -> bool {
    let contents_value = graph
        .var(var)
        .contents
        .map(|contents| graph.node(contents).cached_value())
        .unwrap_or(Value::Null);
    let mut state = graph.node(var.node()).state.lock();
    state.recomputes += 1;
    if state.value != contents_value {
        state.value = contents_value;
        state.generation += 1;
        true
    } else {
        false
    }
}

/// Tree-shaped synchronous propagation: after `child` changed, recompute
/// each ancestor in turn, stopping as soon as a cached value is unchanged.
/// Vector parents refresh only the changed element's slot. Returns the
/// owning variable when the change reached (and changed) it.
pub(crate) fn bubble(graph: &Graph, mut child: NodeId, rewires: &mut Vec<Rewire>) -> Option<VarId> {
    loop {
        let parent = graph.node(child).parent?;
        match &graph.node(parent).kind {
            NodeKind::Variable(_) => {
                let var = VarId(parent);
                return refresh_variable(graph, var).then_some(var);
            }
            NodeKind::Vector { elements } => {
                let index = elements
                    .iter()
                    .position(|&e| e == child)
                    .expect("child is an element of its parent vector");
                if !refresh_vector_element(graph, parent, index) {
                    return None;
                }
            }
            _ => {
                if !refresh_node(graph, parent, rewires) {
                    return None;
                }
            }
        }
        child = parent;
    }
}

fn first_error(values: &[Value]) -> Option<Value> {
    values.iter().find(|v| v.is_error()).cloned()
}

/// Constraint-dispatched evaluation of a built-in operator.
pub(crate) fn apply(kind: FunctionKind, inputs: &[Value]) -> Value {
    // Errors flow through ahead of any constraint checking.
    if let Some(error) = first_error(inputs) {
        return error;
    }
    let constraint = match constraints_for(kind).matches(inputs) {
        MatchOutcome::Match { constraint } => constraint,
        MatchOutcome::TypeMismatch {
            constraint,
            position,
        } => {
            return Value::error(ErrorValue::TypeMismatch {
                function: kind.name().to_string(),
                constraint,
                position,
                inputs: inputs.to_vec(),
            });
        }
        MatchOutcome::CountMismatch => {
            return Value::error(ErrorValue::InputCount {
                function: kind.name().to_string(),
                given: inputs.len(),
            });
        }
    };

    match (kind, constraint) {
        (FunctionKind::Add, 0) => numeric2(inputs, |a, b| Value::Number(a + b)),
        (FunctionKind::Add, _) => match (&inputs[0], &inputs[1]) {
            (Value::Str(a), Value::Str(b)) => Value::Str(format!("{}{}", a, b)),
            _ => type_confusion(kind, inputs),
        },
        (FunctionKind::Subtract, _) => numeric2(inputs, |a, b| Value::Number(a - b)),
        (FunctionKind::Multiply, _) => numeric2(inputs, |a, b| Value::Number(a * b)),
        (FunctionKind::Divide, _) => numeric2(inputs, |a, b| {
            if b == 0.0 {
                Value::error(ErrorValue::DivisionByZero)
            } else {
                Value::Number(a / b)
            }
        }),
        (FunctionKind::Power, 0) => numeric2(inputs, |a, b| Value::Number(a.powf(b))),
        (FunctionKind::Power, _) => boolean2(inputs, |a, b| Value::Bool(a ^ b)),
        (FunctionKind::Negate, _) => numeric1(inputs, |a| Value::Number(-a)),
        (FunctionKind::Not, 0) => boolean1(inputs, |a| Value::Bool(!a)),
        (FunctionKind::Not, _) => numeric1(inputs, |a| Value::Number(!(a as i64) as f64)),
        (FunctionKind::And, 0) => boolean2(inputs, |a, b| Value::Bool(a && b)),
        (FunctionKind::And, _) => bitwise2(inputs, |a, b| a & b),
        (FunctionKind::Or, 0) => boolean2(inputs, |a, b| Value::Bool(a || b)),
        (FunctionKind::Or, _) => bitwise2(inputs, |a, b| a | b),
        (FunctionKind::Xor, 0) => boolean2(inputs, |a, b| Value::Bool(a ^ b)),
        (FunctionKind::Xor, _) => bitwise2(inputs, |a, b| a ^ b),
        (FunctionKind::Greater, c) => comparison(kind, c, inputs),
        (FunctionKind::Less, c) => comparison(kind, c, inputs),
        (FunctionKind::GreaterEq, c) => comparison(kind, c, inputs),
        (FunctionKind::LessEq, c) => comparison(kind, c, inputs),
        (FunctionKind::Equal, _) => Value::Bool(inputs[0] == inputs[1]),
        (FunctionKind::NotEqual, _) => Value::Bool(inputs[0] != inputs[1]),
        (FunctionKind::Ternary, _) => match inputs[0].as_bool() {
            Some(true) => inputs[1].clone(),
            Some(false) => inputs[2].clone(),
            None => type_confusion(kind, inputs),
        },
        (FunctionKind::Range, _) => {
            numeric2(inputs, |a, b| Value::Range(RangeValue::new(a, b)))
        }
        (FunctionKind::Index, _) => index(inputs),
        (FunctionKind::Evaluate, _) => inputs[0].clone(),
    }
}

fn index(inputs: &[Value]) -> Value {
    let Some(ordinal) = inputs[1].as_number() else {
        return type_confusion(FunctionKind::Index, inputs);
    };
    let whole = ordinal.trunc() as i64;
    let base_len = match &inputs[0] {
        Value::Vector(elements) => elements.len(),
        Value::Range(range) => range.len(),
        Value::Str(s) => s.chars().count(),
        _ => return type_confusion(FunctionKind::Index, inputs),
    };
    if ordinal.fract() != 0.0 || whole < 0 || whole as usize >= base_len {
        return Value::error(ErrorValue::Index {
            index: whole,
            len: base_len,
        });
    }
    let at = whole as usize;
    match &inputs[0] {
        Value::Vector(elements) => elements[at].clone(),
        Value::Range(range) => range
            .at(at)
            .map(Value::Number)
            .unwrap_or_else(|| {
                Value::error(ErrorValue::Index {
                    index: whole,
                    len: range.len(),
                })
            }),
        Value::Str(s) => s
            .chars()
            .nth(at)
            .map(|c| Value::Str(c.to_string()))
            .unwrap_or_else(|| {
                Value::error(ErrorValue::Index {
                    index: whole,
                    len: s.chars().count(),
                })
            }),
        _ => type_confusion(FunctionKind::Index, inputs),
    }
}

fn comparison(kind: FunctionKind, constraint: usize, inputs: &[Value]) -> Value {
    use std::cmp::Ordering;
    let ordering = if constraint == 0 {
        match (inputs[0].as_number(), inputs[1].as_number()) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ => return type_confusion(kind, inputs),
        }
    } else {
        match (inputs[0].as_str(), inputs[1].as_str()) {
            (Some(a), Some(b)) => Some(a.cmp(b)),
            _ => return type_confusion(kind, inputs),
        }
    };
    let Some(ordering) = ordering else {
        // NaN comparisons are false on every operator.
        return Value::Bool(false);
    };
    let result = match kind {
        FunctionKind::Greater => ordering == Ordering::Greater,
        FunctionKind::Less => ordering == Ordering::Less,
        FunctionKind::GreaterEq => ordering != Ordering::Less,
        FunctionKind::LessEq => ordering != Ordering::Greater,
        _ => unreachable!("comparison on non-comparison kind"),
    };
    Value::Bool(result)
}

fn numeric1(inputs: &[Value], op: impl Fn(f64) -> Value) -> Value {
    match inputs[0].as_number() {
        Some(a) => op(a),
        None => Value::error(ErrorValue::eval("expected a number")),
    }
}

fn numeric2(inputs: &[Value], op: impl Fn(f64, f64) -> Value) -> Value {
    match (inputs[0].as_number(), inputs[1].as_number()) {
        (Some(a), Some(b)) => op(a, b),
        _ => Value::error(ErrorValue::eval("expected two numbers")),
    }
}

fn boolean1(inputs: &[Value], op: impl Fn(bool) -> Value) -> Value {
    match inputs[0].as_bool() {
        Some(a) => op(a),
        None => Value::error(ErrorValue::eval("expected a boolean")),
    }
}

fn boolean2(inputs: &[Value], op: impl Fn(bool, bool) -> Value) -> Value {
    match (inputs[0].as_bool(), inputs[1].as_bool()) {
        (Some(a), Some(b)) => op(a, b),
        _ => Value::error(ErrorValue::eval("expected two booleans")),
    }
}

fn bitwise2(inputs: &[Value], op: impl Fn(i64, i64) -> i64) -> Value {
    numeric2(inputs, |a, b| Value::Number(op(a as i64, b as i64) as f64))
}

/// The constraint match admitted these inputs but the dispatch arm could
/// not use them; reported as a generic mismatch against overload 0.
fn type_confusion(kind: FunctionKind, inputs: &[Value]) -> Value {
    Value::error(ErrorValue::TypeMismatch {
        function: kind.name().to_string(),
        constraint: 0,
        position: 0,
        inputs: inputs.to_vec(),
    })
}
