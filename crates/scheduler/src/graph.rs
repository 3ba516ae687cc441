//! Unified task/gate dependency bookkeeping for the scheduling loop.
//!
//! `sykli-graph`'s [`ElaboratedGraph`] keeps tasks and gates as two separate
//! lists; §3 "Gate" has a task's `depends_on` name either one
//! ("Downstream dependencies see a gate as a predecessor"). The scheduler
//! needs one admission graph over both, so this module builds it once per
//! run from the elaborated graph's existing `depends_on` edges.

use std::collections::{HashMap, HashSet};

use sykli_core::ir::Gate;
use sykli_graph::{ElaboratedGraph, ElaboratedTask};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Task,
    Gate,
}

/// The scheduler's admission graph: every task and gate name, its distinct
/// predecessor count, and the reverse edge map used to admit successors as
/// predecessors complete.
pub struct RunGraph<'g> {
    pub kinds: HashMap<&'g str, NodeKind>,
    pub tasks: HashMap<&'g str, &'g ElaboratedTask>,
    pub gates: HashMap<&'g str, &'g Gate>,
    pub predecessors: HashMap<&'g str, Vec<&'g str>>,
    pub successors: HashMap<&'g str, Vec<&'g str>>,
}

impl<'g> RunGraph<'g> {
    #[must_use]
    pub fn build(graph: &'g ElaboratedGraph) -> Self {
        let mut kinds = HashMap::new();
        let mut tasks = HashMap::new();
        let mut gates = HashMap::new();
        let mut predecessors = HashMap::new();
        let mut successors: HashMap<&str, Vec<&str>> = HashMap::new();

        for elaborated in &graph.tasks {
            let name = elaborated.task.name.as_str();
            kinds.insert(name, NodeKind::Task);
            tasks.insert(name, elaborated);
            let preds: Vec<&str> = dedup_preserving_order(&elaborated.task.depends_on);
            for &pred in &preds {
                successors.entry(pred).or_default().push(name);
            }
            predecessors.insert(name, preds);
        }

        for gate in &graph.gates {
            let name = gate.name.as_str();
            kinds.insert(name, NodeKind::Gate);
            gates.insert(name, gate);
            predecessors.entry(name).or_default();
        }

        for name in kinds.keys() {
            successors.entry(name).or_default();
        }

        Self { kinds, tasks, gates, predecessors, successors }
    }

    #[must_use]
    pub fn pending_counts(&self) -> HashMap<&'g str, usize> {
        self.predecessors.iter().map(|(&name, preds)| (name, preds.len())).collect()
    }

    #[must_use]
    pub fn node_names(&self) -> Vec<&'g str> {
        self.kinds.keys().copied().collect()
    }

    #[must_use]
    pub fn successors_of(&self, name: &str) -> &[&'g str] {
        self.successors.get(name).map_or(&[], Vec::as_slice)
    }
}

fn dedup_preserving_order<'a>(names: &'a [String]) -> Vec<&'a str> {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(names.len());
    for name in names {
        if seen.insert(name.as_str()) {
            out.push(name.as_str());
        }
    }
    out
}
