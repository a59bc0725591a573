use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, RwLockUpgradableReadGuard};
use rayon::prelude::*;
use tracing::{debug, trace};

use crate::graph::EngineInner;
use crate::graph::compile::apply_rewire;
use crate::graph::eval::{bubble, refresh_node};
use crate::graph::node::{ChangeCallback, Graph, NodeId, NodeKind, VarId};
use crate::graph::reference::Rewire;
use crate::value::{ErrorValue, Value};

/// Tracks in-flight recomputations so `settle` can wait for quiescence.
#[derive(Default)]
pub(crate) struct SettleState {
    in_flight: Mutex<usize>,
    cond: Condvar,
}

impl SettleState {
    pub fn begin(&self) {
        *self.in_flight.lock() += 1;
    }

    pub fn end(&self) {
        let mut count = self.in_flight.lock();
        *count -= 1;
        if *count == 0 {
            self.cond.notify_all();
        }
    }

    /// Block until nothing is recomputing, up to `timeout`.
    pub fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut count = self.in_flight.lock();
        while *count > 0 {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            if self
                .cond
                .wait_for(&mut count, deadline - now)
                .timed_out()
                && *count > 0
            {
                return false;
            }
        }
        true
    }
}

/// Fan-out propagation from a variable whose value (may have) changed.
///
/// The dirty set is the transitive listener closure; each dirty variable
/// waits on an inbound counter of its not-yet-settled sources. Zero-count
/// variables form a wave and recompute in parallel; waves run strictly in
/// sequence. A variable recomputes only from references whose source
/// actually changed, so an unchanged variable propagates nothing.
pub(crate) fn run(inner: &EngineInner, origin: VarId, fire_origin: bool) {
    inner.settle.begin();
    // One propagation at a time; concurrent mutators queue here while
    // readers keep going.
    let _serial = inner.propagation.lock();
    let mut pending_rewires: Vec<Rewire> = Vec::new();
    let mut notifications: Vec<(Arc<ChangeCallback>, VarId, Value)> = Vec::new();

    {
        let graph = inner.graph.read();
        if fire_origin {
            queue_callbacks(&graph, origin, &mut notifications);
        }

        // Transitive listener closure, remembering which reference each
        // dirty variable should recompute from (and for which source).
        let mut triggers: HashMap<VarId, Vec<(NodeId, VarId)>> = HashMap::new();
        let mut dirty: Vec<VarId> = Vec::new();
        let mut seen: HashSet<VarId> = HashSet::from([origin]);
        let mut frontier = vec![origin];
        while let Some(var) = frontier.pop() {
            for &reference in &graph.var(var).listeners {
                let Some(owner) = graph.owner_of(reference) else {
                    continue;
                };
                triggers.entry(owner).or_default().push((reference, var));
                if seen.insert(owner) {
                    dirty.push(owner);
                    frontier.push(owner);
                }
            }
        }

        if !dirty.is_empty() {
            trace!(dirty = dirty.len(), "propagating");
            let dirty_set: HashSet<VarId> = dirty.iter().copied().collect();
            let mut in_degree: HashMap<VarId, usize> = dirty
                .iter()
                .map(|&var| {
                    let waiting: HashSet<VarId> = graph
                        .var(var)
                        .sources
                        .iter()
                        .copied()
                        .filter(|source| dirty_set.contains(source))
                        .collect();
                    (var, waiting.len())
                })
                .collect();

            let mut wave: Vec<VarId> = in_degree
                .iter()
                .filter_map(|(&var, &degree)| (degree == 0).then_some(var))
                .collect();
            let mut changed: HashSet<VarId> = HashSet::from([origin]);
            let mut processed: HashSet<VarId> = HashSet::new();

            while !wave.is_empty() {
                let results: Vec<(VarId, bool, Vec<Rewire>)> = if wave.len() > 1 {
                    wave.par_iter()
                        .map(|&var| recompute_variable(&graph, var, &triggers, &changed))
                        .collect()
                } else {
                    wave.iter()
                        .map(|&var| recompute_variable(&graph, var, &triggers, &changed))
                        .collect()
                };

                for (var, var_changed, rewires) in results {
                    processed.insert(var);
                    pending_rewires.extend(rewires);
                    if var_changed {
                        changed.insert(var);
                        queue_callbacks(&graph, var, &mut notifications);
                    }
                }

                // Completing a wave unblocks the listeners of every member,
                // changed or not.
                let mut next: Vec<VarId> = Vec::new();
                for &var in &wave {
                    let mut owners: HashSet<VarId> = HashSet::new();
                    for &reference in &graph.var(var).listeners {
                        if let Some(owner) = graph.owner_of(reference) {
                            owners.insert(owner);
                        }
                    }
                    for owner in owners {
                        if !dirty_set.contains(&owner) || processed.contains(&owner) {
                            continue;
                        }
                        if let Some(degree) = in_degree.get_mut(&owner) {
                            *degree = degree.saturating_sub(1);
                            if *degree == 0 {
                                next.push(owner);
                            }
                        }
                    }
                }
                wave = next;
            }

            // Anything still waiting sits on a cycle the structural check
            // could not see; surface it as a value.
            for &var in &dirty {
                if !processed.contains(&var) {
                    mark_circular(&graph, var, &dirty_set, &processed);
                    queue_callbacks(&graph, var, &mut notifications);
                }
            }
        }
    }

    // Reference re-resolutions wanted new listener edges: escalate to a
    // write lock only if some edge actually needs to move.
    if !pending_rewires.is_empty() {
        let guard = inner.graph.upgradable_read();
        let stale: Vec<Rewire> = pending_rewires
            .into_iter()
            .filter(|rw| {
                match &guard.node(rw.reference).kind {
                    NodeKind::Reference(node) => node.listening != rw.listen,
                    _ => false,
                }
            })
            .collect();
        if !stale.is_empty() {
            debug!(edges = stale.len(), "applying deferred rewires");
            let mut graph = RwLockUpgradableReadGuard::upgrade(guard);
            for rw in stale {
                apply_rewire(&mut graph, rw.reference, rw.listen);
            }
        }
    }

    // Callbacks run outside every lock so they may freely mutate the
    // engine (and start their own propagation).
    drop(_serial);
    for (callback, var, value) in notifications {
        callback(var, &value);
    }
    inner.settle.end();
}

fn recompute_variable(
    graph: &Graph,
    var: VarId,
    triggers: &HashMap<VarId, Vec<(NodeId, VarId)>>,
    changed: &HashSet<VarId>,
) -> (VarId, bool, Vec<Rewire>) {
    let mut rewires = Vec::new();
    let mut var_changed = false;
    if let Some(entries) = triggers.get(&var) {
        for &(reference, source) in entries {
            if !changed.contains(&source) {
                continue;
            }
            if refresh_node(graph, reference, &mut rewires)
                && let Some(reached) = bubble(graph, reference, &mut rewires)
            {
                debug_assert_eq!(reached, var, "bubble escaped its owning variable");
                var_changed = true;
            }
        }
    }
    (var, var_changed, rewires)
}

/// Replace a wave-stuck variable's value with a circularity error naming
/// the first unsettled source it waits on.
fn mark_circular(graph: &Graph, var: VarId, dirty: &HashSet<VarId>, processed: &HashSet<VarId>) {
    let to = graph
        .var(var)
        .sources
        .iter()
        .find(|source| dirty.contains(source) && !processed.contains(source))
        .map(|source| graph.var(*source).name.clone())
        .unwrap_or_else(|| graph.var(var).name.clone());
    let error = Value::error(ErrorValue::Circular {
        from: graph.var(var).name.clone(),
        to,
    });
    let mut state = graph.node(var.node()).state.lock();
    if state.value != error {
        state.value = error;
        state.generation += 1;
    }
}

fn queue_callbacks(
    graph: &Graph,
    var: VarId,
    notifications: &mut Vec<(Arc<ChangeCallback>, VarId, Value)>,
) {
    if let Some(callbacks) = graph.callbacks.get(&var) {
        let value = graph.node(var.node()).cached_value();
        for callback in callbacks {
            notifications.push((callback.clone(), var, value.clone()));
        }
    }
}
