use crate::context::{ContextRef, Property};
use crate::graph::node::{Graph, NodeId, ReferenceNode, ResolvedStep, StepOutcome, VarId};
use crate::value::{ErrorValue, Value};

/// A listener edge set that should move: produced during read-locked
/// evaluation, applied later under the structure write lock.
#[derive(Debug, Clone)]
pub(crate) struct Rewire {
    pub reference: NodeId,
    pub listen: Vec<VarId>,
}

pub(crate) struct Resolution {
    pub value: Value,
    /// Variables encountered during the walk, in path order.
    pub listen: Vec<VarId>,
}

impl Resolution {
    fn err(value: ErrorValue, listen: Vec<VarId>) -> Self {
        Self {
            value: Value::error(value),
            listen,
        }
    }
}

/// Walk the reference's path segment by segment: subcontexts take
/// precedence, then properties. Variable properties are recorded so the
/// reference can listen to them; their values continue the walk when more
/// segments remain. Failures resolve to reference-error values carrying
/// the segments consumed so far.
pub(crate) fn resolve(graph: &Graph, id: NodeId, reference: &ReferenceNode) -> Resolution {
    let mut listen = Vec::new();

    // An origin expression that failed takes precedence over any
    // "cannot resolve" report of our own.
    if let Err(error) = origin_error(graph, reference) {
        return Resolution {
            value: error,
            listen,
        };
    }
    let Some(mut ctx) = starting_context(graph, id, reference) else {
        return Resolution::err(
            ErrorValue::Reference {
                relative: reference.relative,
                path: reference.path.first().cloned().into_iter().collect(),
            },
            listen,
        );
    };

    let mut chain = reference.chain.lock();
    let mut reuse = true;
    let mut consumed: Vec<String> = Vec::new();

    for (i, segment) in reference.path.iter().enumerate() {
        consumed.push(segment.clone());
        let last = i + 1 == reference.path.len();

        if reuse {
            match cached_step(graph, &chain.steps, i, &ctx) {
                CacheHit::Descend(next) => {
                    if last {
                        return Resolution {
                            value: Value::Context(next),
                            listen,
                        };
                    }
                    ctx = next;
                    continue;
                }
                CacheHit::Variable(var, value) => {
                    listen.push(var);
                    match continue_with(value, last) {
                        Walk::Done(value) => return Resolution { value, listen },
                        Walk::Descend(next) => {
                            ctx = next;
                            continue;
                        }
                        Walk::NotAContext => {
                            return Resolution::err(
                                ErrorValue::Reference {
                                    relative: reference.relative,
                                    path: consumed,
                                },
                                listen,
                            );
                        }
                    }
                }
                CacheHit::Miss => {
                    reuse = false;
                    chain.steps.truncate(i);
                }
            }
        }

        if let Some(sub) = ctx.subcontext(segment) {
            chain.steps.push(ResolvedStep {
                input: ctx.clone(),
                outcome: StepOutcome::Descend(sub.clone()),
            });
            if last {
                return Resolution {
                    value: Value::Context(sub),
                    listen,
                };
            }
            ctx = sub;
            continue;
        }

        match ctx.property(segment) {
            Some(Property::Value(value)) => {
                // Plain host values are re-read on every resolution; only
                // contexts and variables are worth caching.
                if let Value::Context(next) = &value {
                    chain.steps.push(ResolvedStep {
                        input: ctx.clone(),
                        outcome: StepOutcome::Descend(next.clone()),
                    });
                }
                match continue_with(value, last) {
                    Walk::Done(value) => return Resolution { value, listen },
                    Walk::Descend(next) => {
                        ctx = next;
                        continue;
                    }
                    Walk::NotAContext => {
                        return Resolution::err(
                            ErrorValue::Reference {
                                relative: reference.relative,
                                path: consumed,
                            },
                            listen,
                        );
                    }
                }
            }
            Some(Property::Variable(var)) => {
                let (value, generation) = {
                    let state = graph.node(var.node()).state.lock();
                    (state.value.clone(), state.generation)
                };
                chain.steps.push(ResolvedStep {
                    input: ctx.clone(),
                    outcome: StepOutcome::Variable(var, generation),
                });
                listen.push(var);
                match continue_with(value, last) {
                    Walk::Done(value) => return Resolution { value, listen },
                    Walk::Descend(next) => {
                        ctx = next;
                        continue;
                    }
                    Walk::NotAContext => {
                        return Resolution::err(
                            ErrorValue::Reference {
                                relative: reference.relative,
                                path: consumed,
                            },
                            listen,
                        );
                    }
                }
            }
            None => {
                return Resolution::err(
                    ErrorValue::Reference {
                        relative: reference.relative,
                        path: consumed,
                    },
                    listen,
                );
            }
        }
    }

    // Empty path: the reference is just its origin context.
    Resolution {
        value: Value::Context(ctx),
        listen,
    }
}

enum CacheHit {
    Descend(ContextRef),
    Variable(VarId, Value),
    Miss,
}

fn cached_step(graph: &Graph, steps: &[ResolvedStep], index: usize, ctx: &ContextRef) -> CacheHit {
    let Some(step) = steps.get(index) else {
        return CacheHit::Miss;
    };
    if !step.input.same(ctx) {
        return CacheHit::Miss;
    }
    match &step.outcome {
        StepOutcome::Descend(next) => CacheHit::Descend(next.clone()),
        StepOutcome::Variable(var, generation) => {
            let state = graph.node(var.node()).state.lock();
            if state.generation == *generation {
                CacheHit::Variable(*var, state.value.clone())
            } else {
                CacheHit::Miss
            }
        }
    }
}

enum Walk {
    Done(Value),
    Descend(ContextRef),
    NotAContext,
}

/// Decide how a property value continues the walk. Errors stored in
/// variables flow out as the reference's own value.
fn continue_with(value: Value, last: bool) -> Walk {
    if last {
        return Walk::Done(value);
    }
    match value {
        Value::Context(next) => Walk::Descend(next),
        Value::Error(_) => Walk::Done(value),
        _ => Walk::NotAContext,
    }
}

fn starting_context(graph: &Graph, id: NodeId, reference: &ReferenceNode) -> Option<ContextRef> {
    if let Some(origin) = &reference.origin {
        return Some(origin.clone());
    }
    if let Some(expr) = reference.origin_expr {
        return match graph.node(expr).cached_value() {
            Value::Context(ctx) => Some(ctx),
            _ => None,
        };
    }
    if reference.relative {
        let owner = graph.owner_of(id)?;
        return graph.var(owner).context.clone();
    }
    None
}

/// An origin expression that evaluated to an error takes precedence over
/// the "not a context" report.
fn origin_error(graph: &Graph, reference: &ReferenceNode) -> Result<(), Value> {
    if let Some(expr) = reference.origin_expr {
        let value = graph.node(expr).cached_value();
        if value.is_error() {
            return Err(value);
        }
    }
    Ok(())
}
