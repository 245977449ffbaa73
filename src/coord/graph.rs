//! Dependency table construction
//!
//! Turns the static dependency lists of a component set into a table of
//! outstanding blockers, oriented by run direction. Dangling references and
//! cycles are rejected here, before anything is dispatched.

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::core::errors::{Result, StackError};
use crate::coord::types::{ComponentId, ComponentSet, Direction};

/// Per-run mapping from a not-yet-dispatched component to the components still blocking it
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DependencyTable {
    entries: BTreeMap<ComponentId, BTreeSet<ComponentId>>,
}

impl DependencyTable {
    /// Components whose blocking set is empty, in table order
    pub fn ready(&self) -> Vec<ComponentId> {
        self.entries
            .iter()
            .filter(|(_, blockers)| blockers.is_empty())
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Remove an entry as it is dispatched, returning its remaining blockers
    pub fn take(&mut self, id: &ComponentId) -> Option<BTreeSet<ComponentId>> {
        self.entries.remove(id)
    }

    /// Remove a completed component from every remaining blocking set.
    ///
    /// Returns how many entries it was actually blocking; absent blockers are no-ops.
    pub fn unblock(&mut self, completed: &ComponentId) -> usize {
        self.entries
            .values_mut()
            .filter_map(|blockers| blockers.remove(completed).then_some(()))
            .count()
    }

    /// Drop every pending entry, returning the ids that will now never dispatch
    pub fn clear(&mut self) -> Vec<ComponentId> {
        std::mem::take(&mut self.entries).into_keys().collect()
    }

    pub fn blockers(&self, id: &ComponentId) -> Option<&BTreeSet<ComponentId>> {
        self.entries.get(id)
    }

    pub fn contains(&self, id: &ComponentId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Build the table treating the selected set as the complete set of known components
pub fn build(configs: &ComponentSet, direction: Direction) -> Result<DependencyTable> {
    let known: BTreeSet<ComponentId> = configs.keys().cloned().collect();
    build_with_known(configs, &known, direction)
}

/// Build the table for a selection out of a larger project.
///
/// A dependency outside `configs` but inside `known` is considered already
/// satisfied and ignored; one outside both is a dangling reference.
pub fn build_with_known(
    configs: &ComponentSet,
    known: &BTreeSet<ComponentId>,
    direction: Direction,
) -> Result<DependencyTable> {
    check_references(configs, known)?;
    check_acyclic(configs)?;

    let mut entries: BTreeMap<ComponentId, BTreeSet<ComponentId>> = configs
        .keys()
        .map(|id| (id.clone(), BTreeSet::new()))
        .collect();

    for (id, config) in configs {
        for dep in config.dependencies.iter().filter(|d| configs.contains_key(*d)) {
            match direction {
                Direction::Forward => {
                    if let Some(blockers) = entries.get_mut(id) {
                        blockers.insert(dep.clone());
                    }
                }
                Direction::Reverse => {
                    if let Some(blockers) = entries.get_mut(dep) {
                        blockers.insert(id.clone());
                    }
                }
            }
        }
    }

    tracing::debug!(
        "Built {} dependency table with {} entries ({} ready)",
        direction,
        entries.len(),
        entries.values().filter(|b| b.is_empty()).count()
    );

    Ok(DependencyTable { entries })
}

fn check_references(configs: &ComponentSet, known: &BTreeSet<ComponentId>) -> Result<()> {
    for (id, config) in configs {
        for dep in &config.dependencies {
            if dep == id {
                return Err(StackError::configuration(format!(
                    "component '{}' depends on itself",
                    config.name
                )));
            }
            if !configs.contains_key(dep) && !known.contains(dep) {
                return Err(StackError::configuration(format!(
                    "component '{}' depends on unknown component '{}'",
                    config.name, dep
                )));
            }
        }
    }
    Ok(())
}

fn check_acyclic(configs: &ComponentSet) -> Result<()> {
    let mut graph: DiGraph<&ComponentId, ()> = DiGraph::new();
    let mut index: HashMap<&ComponentId, NodeIndex> = HashMap::new();

    for id in configs.keys() {
        index.insert(id, graph.add_node(id));
    }
    for (id, config) in configs {
        for dep in &config.dependencies {
            if let (Some(&from), Some(&to)) = (index.get(dep), index.get(id)) {
                graph.add_edge(from, to, ());
            }
        }
    }

    let cycles: Vec<String> = tarjan_scc(&graph)
        .into_iter()
        .filter(|scc| scc.len() > 1)
        .map(|scc| {
            let mut names: Vec<&str> = scc
                .iter()
                .map(|&node| configs[graph[node]].name.as_str())
                .collect();
            names.sort_unstable();
            names.join(" -> ")
        })
        .collect();

    if cycles.is_empty() {
        Ok(())
    } else {
        Err(StackError::configuration(format!(
            "circular dependency between components: {}",
            cycles.join(", ")
        )))
    }
}
