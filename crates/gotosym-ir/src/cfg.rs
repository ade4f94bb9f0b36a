//! Control-flow-graph view of a function body.
//!
//! Built once per function and consulted by the interpreter for merge
//! scheduling: instructions with more than one incoming edge are the join
//! points where divergent states are recombined. Back-edge classification
//! itself is positional (a goto targeting itself or an earlier index), but
//! the graph gives incoming-edge counts and successor sets without
//! re-scanning the body.

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Dfs;
use petgraph::Direction;

use crate::instruction::InstructionKind;
use crate::program::GotoFunction;

/// Per-function control-flow graph. Node `i` is instruction index `i`.
#[derive(Debug)]
pub struct Cfg {
    graph: DiGraph<usize, ()>,
}

impl Cfg {
    /// Builds the graph from a function body.
    ///
    /// Fall-through edges are added for every non-terminator; `Goto` adds
    /// its target (plus fall-through when conditional); `Return` and `Throw`
    /// edge to the final `EndFunction`; `StartThread` continues in the
    /// spawning thread only (the spawned entry is not an intra-thread edge).
    pub fn new(function: &GotoFunction) -> Self {
        let mut graph = DiGraph::new();
        let nodes: Vec<NodeIndex> = (0..function.body.len())
            .map(|i| graph.add_node(i))
            .collect();
        let end = function.end_index();

        for (i, instruction) in function.body.iter().enumerate() {
            match &instruction.kind {
                InstructionKind::Goto { cond, target } => {
                    graph.add_edge(nodes[i], nodes[*target], ());
                    if !cond.is_true() && i + 1 < function.body.len() {
                        graph.add_edge(nodes[i], nodes[i + 1], ());
                    }
                }
                InstructionKind::Return { .. } | InstructionKind::Throw { .. } => {
                    if i != end {
                        graph.add_edge(nodes[i], nodes[end], ());
                    }
                }
                InstructionKind::StartThread { target } => {
                    // Spawn edge so the thread body counts as reachable.
                    graph.add_edge(nodes[i], nodes[*target], ());
                    if i + 1 < function.body.len() {
                        graph.add_edge(nodes[i], nodes[i + 1], ());
                    }
                }
                InstructionKind::CatchPush { handlers } => {
                    for (_, target) in handlers {
                        graph.add_edge(nodes[i], nodes[*target], ());
                    }
                    if i + 1 < function.body.len() {
                        graph.add_edge(nodes[i], nodes[i + 1], ());
                    }
                }
                InstructionKind::EndFunction | InstructionKind::EndThread => {}
                _ => {
                    if i + 1 < function.body.len() {
                        graph.add_edge(nodes[i], nodes[i + 1], ());
                    }
                }
            }
        }

        Cfg { graph }
    }

    /// Number of control-flow edges entering the instruction.
    pub fn incoming_count(&self, index: usize) -> usize {
        self.graph
            .neighbors_directed(NodeIndex::new(index), Direction::Incoming)
            .count()
    }

    /// Successor instruction indices.
    pub fn successors(&self, index: usize) -> Vec<usize> {
        let mut out: Vec<usize> = self
            .graph
            .neighbors_directed(NodeIndex::new(index), Direction::Outgoing)
            .map(|n| n.index())
            .collect();
        out.sort_unstable();
        out
    }

    /// Instruction indices not reachable from the function entry. Dead
    /// code is legal but usually indicates a front-end problem worth a
    /// diagnostic.
    pub fn unreachable_instructions(&self) -> Vec<usize> {
        let mut seen = vec![false; self.graph.node_count()];
        if !seen.is_empty() {
            let mut dfs = Dfs::new(&self.graph, NodeIndex::new(0));
            while let Some(node) = dfs.next(&self.graph) {
                seen[node.index()] = true;
            }
        }
        seen.iter()
            .enumerate()
            .filter(|(_, reached)| !**reached)
            .map(|(i, _)| i)
            .collect()
    }

    /// Instruction indices where more than one control-flow path arrives --
    /// the join points at which states are merged. Function entry counts as
    /// one arrival at index 0, so a loop header at the top of the body is a
    /// join point as soon as a back-edge targets it.
    pub fn merge_points(&self) -> Vec<usize> {
        (0..self.graph.node_count())
            .filter(|&i| {
                let entry = usize::from(i == 0);
                self.incoming_count(i) + entry > 1
            })
            .collect()
    }
}
