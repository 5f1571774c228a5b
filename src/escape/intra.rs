// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

//! The per-method worklist fixed-point engine. Drives the transfer
//! functions over a body's CFG until no point's `out` snapshot changes,
//! then publishes the exit-point graph and the accumulated raw summary.

use log::*;
use petgraph::graph::NodeIndex;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::escape::transfer::{self, TransferCtx};
use crate::graph::flow_set::FlowSet;
use crate::graph::ptg::{ObjectNode, PointsToGraph};
use crate::mir::body::{Body, Local, SiteId, Statement};
use crate::mir::method::{ClassId, MethodId};
use crate::mir::program::Program;
use crate::summary::{ConditionalValue, EscapeStatus, MethodSummary};

pub struct IntraAnalysis<'a> {
    program: &'a Program,
    method: MethodId,
    body: &'a Body,
}

impl<'a> IntraAnalysis<'a> {
    pub fn new(program: &'a Program, method: MethodId, body: &'a Body) -> Self {
        IntraAnalysis {
            program,
            method,
            body,
        }
    }

    /// Runs the fixed point and returns the method's final points-to
    /// graph (the exit point's `out`) and its raw summary.
    pub fn run(&self) -> (PointsToGraph, MethodSummary) {
        let body = self.body;
        let mut summary = MethodSummary::new();

        // Parameters are bound before the first instruction. Each
        // parameter object carries a caller-anchored argument-relative
        // fact, dischargeable only with caller context.
        let mut entry = PointsToGraph::new();
        for index in 0..body.param_count {
            let obj = ObjectNode::parameter(index);
            entry.force_put_var(Local(index), obj);
            summary.insert(
                obj,
                EscapeStatus::conditional(ConditionalValue::new(None, obj, Vec::new(), true)),
            );
        }

        if body.point_count() == 0 {
            return (entry, summary);
        }

        let alloc_classes = collect_alloc_classes(body);
        let ctx = TransferCtx {
            program: self.program,
            alloc_classes: &alloc_classes,
        };

        let mut flow: BTreeMap<NodeIndex, FlowSet> = body
            .points()
            .map(|point| (point, FlowSet::new()))
            .collect();

        let mut work: BTreeSet<NodeIndex> = BTreeSet::new();
        let mut work_next: BTreeSet<NodeIndex> = body.points().collect();
        let entry_point = body.points().next().expect("non-empty body");

        let mut rounds = 0usize;
        while !work_next.is_empty() {
            std::mem::swap(&mut work, &mut work_next);
            work_next.clear();

            while let Some(u) = work.pop_first() {
                work_next.remove(&u);

                // in[u] = union(out[pred] for pred in preds(u)), seeded
                // with the parameter bindings at the entry point.
                let mut in_new = if u == entry_point {
                    entry.clone()
                } else {
                    PointsToGraph::new()
                };
                for pred in body.preds(u) {
                    in_new.union(flow[&pred].out_graph());
                }

                // A point with unchanged non-empty input is a no-op; a
                // perpetually empty input must still be reapplied, since
                // the point's own transfer function may be the sole
                // origin of new objects.
                if in_new == *flow[&u].in_graph() && !in_new.is_empty() {
                    for succ in body.succs(u) {
                        work_next.remove(&succ);
                    }
                    continue;
                }

                let mut out_new = in_new.clone();
                transfer::apply(body.stmt(u), &mut out_new, &mut summary, &ctx);

                let flow_set = flow.get_mut(&u).expect("flow set exists for every point");
                flow_set.set_in(in_new);
                if out_new != *flow_set.out_graph() {
                    flow_set.set_out(out_new);
                    for succ in body.succs(u) {
                        work_next.insert(succ);
                    }
                }
            }
            rounds += 1;
        }
        trace!(
            "method {} converged after {} worklist rounds",
            self.method.0,
            rounds
        );

        // The exit point is the last entry in point-map iteration order.
        let (_, exit) = flow.iter().next_back().expect("non-empty flow map");
        (exit.out_graph().clone(), summary)
    }
}

fn collect_alloc_classes(body: &Body) -> HashMap<SiteId, ClassId> {
    let mut map = HashMap::new();
    for point in body.points() {
        let stmt = body.stmt(point);
        if let Statement::AllocObject { class, .. } = stmt.kind {
            map.insert(stmt.site, class);
        }
    }
    map
}
