// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

use crate::graph::ptg::PointsToGraph;

/// The `in`/`out` points-to snapshots of one program point. Each flow set
/// exclusively owns its snapshots; the engine replaces them wholesale and
/// never aliases another point's graphs.
#[derive(Clone, Default)]
pub struct FlowSet {
    in_graph: PointsToGraph,
    out_graph: PointsToGraph,
}

impl FlowSet {
    pub fn new() -> Self {
        FlowSet::default()
    }

    pub fn in_graph(&self) -> &PointsToGraph {
        &self.in_graph
    }

    pub fn out_graph(&self) -> &PointsToGraph {
        &self.out_graph
    }

    pub fn set_in(&mut self, graph: PointsToGraph) {
        self.in_graph = graph;
    }

    pub fn set_out(&mut self, graph: PointsToGraph) {
        self.out_graph = graph;
    }
}
