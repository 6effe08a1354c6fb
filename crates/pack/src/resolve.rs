//! # Dependency Resolution
//!
//! Produces the load order: a total order over enabled packages in which
//! every dependency precedes its dependents.
//!
//! The sort is Kahn's algorithm over the declared dependency graph.
//! Determinism is guaranteed by processing the initial zero-in-degree set
//! in lexicographic name order and appending nodes FIFO as their in-degree
//! drops to zero; resolution of a fixed registry always yields the same
//! order.
//!
//! Version constraints (`name@constraint`) are advisory: a mismatch against
//! the dependency's declared tag warns but never blocks. Edges to
//! undeclared or disabled packages warn and are dropped. The only fatal
//! outcome is a cycle, whose error names every node still on one.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use thiserror::Error;
use tracing::warn;

use crate::hooks::{Event, Hooks};
use crate::id::Name;
use crate::package::Ref;
use crate::registry::{Filter, Registry};

//================================================================================================
// Types
//================================================================================================

/// An error that aborts resolution.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ResolveError {
    /// The dependency graph contains at least one cycle.
    #[error("dependency cycle detected among: {}", nodes.join(", "))]
    Cycle {
        /// Every node whose in-degree never reached zero, sorted by name.
        nodes: Vec<String>,
    },
}

/// The non-fatal outcome of a resolution run.
#[derive(Debug, Default)]
pub struct Resolution {
    /// Human-readable dependency warnings, already logged to stderr.
    pub warnings: Vec<String>,
}

//================================================================================================
// Functions
//================================================================================================

/// Topologically sorts the enabled packages and writes the load order into
/// the registry.
///
/// Fires `pre-resolve` before any edge is built and `post-resolve` after
/// the order is written.
pub fn resolve(registry: &mut Registry, hooks: &Hooks) -> Result<Resolution, ResolveError> {
    hooks.fire(Event::PreResolve, None);

    let enabled: BTreeSet<Name> = registry
        .each(Filter::Enabled)
        .map(|r| r.name.clone())
        .collect();

    let mut resolution = Resolution::default();

    // Forward adjacency (dependency -> dependents) drives the queue;
    // reverse adjacency (dependent -> remaining dependencies) tracks
    // in-degrees.
    let mut forward: BTreeMap<Name, BTreeSet<Name>> = BTreeMap::new();
    let mut reverse: BTreeMap<Name, BTreeSet<Name>> = BTreeMap::new();

    for dependent in &enabled {
        let Some(config) = registry.config(dependent) else {
            continue;
        };
        for spec in &config.depends {
            let (bare, want) = match spec.split_once('@') {
                Some((bare, want)) => (bare, Some(want)),
                None => (spec.as_str(), None),
            };

            if !enabled.contains(bare) {
                let message = format!("{dependent} depends on {bare}, which is not declared");
                warn!("{message}");
                resolution.warnings.push(message);
                continue;
            }

            if let Some(want) = want {
                if let Some(Ref::Tag(tag)) = registry.record(bare).map(|r| &r.r#ref) {
                    if tag != want {
                        let message = format!(
                            "{dependent} depends on {bare}@{want} but {bare} is declared with tag={tag}"
                        );
                        warn!("{message}");
                        resolution.warnings.push(message);
                    }
                }
            }

            let bare: Name = match bare.parse() {
                Ok(name) => name,
                Err(_) => continue, // unreachable for a declared name
            };
            forward.entry(bare.clone()).or_default().insert(dependent.clone());
            reverse.entry(dependent.clone()).or_default().insert(bare);
        }
    }

    let mut queue: VecDeque<Name> = enabled
        .iter()
        .filter(|n| reverse.get(*n).map_or(true, BTreeSet::is_empty))
        .cloned()
        .collect();

    let mut order = Vec::with_capacity(enabled.len());
    while let Some(node) = queue.pop_front() {
        if let Some(dependents) = forward.get(&node) {
            for dependent in dependents.clone() {
                let remaining = reverse.entry(dependent.clone()).or_default();
                remaining.remove(&node);
                if remaining.is_empty() {
                    queue.push_back(dependent);
                }
            }
        }
        order.push(node);
    }

    if order.len() < enabled.len() {
        let nodes: Vec<String> = enabled
            .iter()
            .filter(|n| !order.contains(n))
            .map(ToString::to_string)
            .collect();
        return Err(ResolveError::Cycle { nodes });
    }

    registry.set_load_order(order);
    hooks.fire(Event::PostResolve, None);

    Ok(resolution)
}

//================================================================================================
// Tests
//================================================================================================
