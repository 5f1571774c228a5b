// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

//! Escape analysis over compiled method bodies, in two phases: a
//! per-method intraprocedural fixed point publishing raw summaries, then
//! a demand-driven interprocedural resolver discharging the deferred
//! conditional facts.

pub mod intra;
pub mod resolver;
mod transfer;

use anyhow::{Context, Result};
use itertools::Itertools;
use log::*;
use std::collections::HashMap;

use crate::escape::intra::IntraAnalysis;
use crate::escape::resolver::{ResolutionStatus, SummaryResolver};
use crate::graph::ptg::{ObjectNode, PointsToGraph};
use crate::mir::method::MethodId;
use crate::mir::program::Program;
use crate::summary::MethodSummary;

/// Everything both phases produced, keyed by method.
pub struct AnalysisResults {
    /// Exit-point points-to graph per analyzed method.
    pub ptgs: HashMap<MethodId, PointsToGraph>,
    /// Phase-1 summaries, conditional facts still in place.
    pub raw_summaries: HashMap<MethodId, MethodSummary>,
    /// Phase-2 summaries after resolution.
    pub solved_summaries: HashMap<MethodId, MethodSummary>,
    /// Terminal resolution status per (method, object).
    pub resolution: HashMap<MethodId, HashMap<ObjectNode, ResolutionStatus>>,
}

pub struct EscapeAnalysis<'a> {
    program: &'a Program,
}

impl<'a> EscapeAnalysis<'a> {
    pub fn new(program: &'a Program) -> Self {
        EscapeAnalysis { program }
    }

    pub fn analyze(&self) -> Result<AnalysisResults> {
        let mut ptgs = HashMap::new();
        let mut raw_summaries = HashMap::new();

        for (method, body) in self
            .program
            .bodies()
            .sorted_by_key(|(method, _)| *method)
        {
            body.validate()
                .with_context(|| format!("invalid body for {}", self.program.method_name(method)))?;
            debug!("analysing {}", self.program.method_name(method));
            let (ptg, summary) = IntraAnalysis::new(self.program, method, body).run();
            ptgs.insert(method, ptg);
            raw_summaries.insert(method, summary);
        }
        info!("phase 1 done: {} method(s) analysed", raw_summaries.len());

        let mut resolver = SummaryResolver::new(self.program, &raw_summaries, &ptgs);
        resolver.resolve();
        let (solved_summaries, resolution) = resolver.finish();
        info!("phase 2 done: summaries resolved");

        Ok(AnalysisResults {
            ptgs,
            raw_summaries,
            solved_summaries,
            resolution,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::mir::body::{Body, Local, SiteId, Statement};

    #[test]
    fn rejects_malformed_bodies() {
        let mut program = Program::new();
        let class = program.add_class("Main");
        let m = program.add_method(class, "run");
        let mut body = Body::new(0, 1);
        // local 5 is out of range
        body.add_stmt(SiteId(0), Statement::StaticStore { rhs: Local(5) });
        program.set_body(m, body);

        assert!(EscapeAnalysis::new(&program).analyze().is_err());
    }

    #[test]
    fn end_to_end_over_two_methods() {
        let mut program = Program::new();
        let class = program.add_class("Main");
        let sink = program.add_method(class, "sink");
        let caller = program.add_method(class, "run");

        let mut sink_body = Body::new(1, 1);
        let p0 = sink_body.add_stmt(SiteId(0), Statement::StaticStore { rhs: Local(0) });
        let p1 = sink_body.add_stmt(SiteId(1), Statement::Return { value: None });
        sink_body.add_edge(p0, p1);
        program.set_body(sink, sink_body);

        let mut caller_body = Body::new(0, 1);
        let q0 = caller_body.add_stmt(SiteId(0), Statement::AllocObject { lhs: Local(0), class });
        let q1 = caller_body.add_stmt(
            SiteId(1),
            Statement::Invoke { lhs: None, callee: sink, args: vec![Local(0)] },
        );
        let q2 = caller_body.add_stmt(SiteId(2), Statement::Return { value: None });
        caller_body.add_edge(q0, q1);
        caller_body.add_edge(q1, q2);
        program.set_body(caller, caller_body);

        let results = EscapeAnalysis::new(&program).analyze().unwrap();
        let obj = crate::graph::ptg::ObjectNode::new(SiteId(0), crate::graph::ptg::ObjectKind::Internal);
        assert!(results.raw_summaries[&caller][&obj].contains_conditional());
        assert!(results.solved_summaries[&caller][&obj].does_escape());
        assert_eq!(
            results.resolution[&caller][&obj],
            ResolutionStatus::Resolved
        );
    }
}
