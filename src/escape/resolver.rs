// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

//! The interprocedural resolver. Walks the published raw summaries and
//! discharges deferred conditional facts on demand, memoized per
//! (method, object) through a three-state-plus-terminals status table.
//! A dependency cycle back onto an in-progress pair contributes no new
//! evidence, which is what makes recursion converge.

use itertools::Itertools;
use log::*;
use std::collections::HashMap;

use crate::graph::ptg::{ObjectKind, ObjectNode, PointsToGraph};
use crate::mir::body::RETURN_LOCAL;
use crate::mir::method::MethodId;
use crate::mir::program::Program;
use crate::summary::{ConditionalValue, EscapeStatus, MethodSummary};

/// Progress marker per (method, object). Terminal states are final.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ResolutionStatus {
    Unattempted,
    InProgress,
    Resolved,
    UnResolved,
    /// Every remaining fact needs the immediate caller's own context.
    CallerOnly,
}

/// What one fact resolved to.
enum Verdict {
    Escapes,
    Confined,
    /// Cannot be discharged yet; the original fact stays pending.
    Pending,
}

pub struct SummaryResolver<'a> {
    program: &'a Program,
    existing: &'a HashMap<MethodId, MethodSummary>,
    ptgs: &'a HashMap<MethodId, PointsToGraph>,
    status: HashMap<MethodId, HashMap<ObjectNode, ResolutionStatus>>,
    solved: HashMap<MethodId, MethodSummary>,
}

impl<'a> SummaryResolver<'a> {
    pub fn new(
        program: &'a Program,
        existing: &'a HashMap<MethodId, MethodSummary>,
        ptgs: &'a HashMap<MethodId, PointsToGraph>,
    ) -> Self {
        let mut status = HashMap::new();
        let mut solved = HashMap::new();
        for (method, summary) in existing {
            let table = summary
                .keys()
                .map(|obj| (*obj, ResolutionStatus::Unattempted))
                .collect();
            status.insert(*method, table);
            solved.insert(*method, MethodSummary::new());
        }
        SummaryResolver {
            program,
            existing,
            ptgs,
            status,
            solved,
        }
    }

    /// Resolves every (method, object) pair, then gives `CallerOnly`
    /// leftovers one pass of caller-context discharge.
    pub fn resolve(&mut self) {
        for method in self.existing.keys().copied().sorted() {
            for obj in self.existing[&method].keys().copied().sorted() {
                self.out_of_context_solve(obj, method);
            }
        }

        let caller_only: Vec<(MethodId, ObjectNode)> = self
            .status
            .iter()
            .flat_map(|(method, table)| {
                table
                    .iter()
                    .filter(|(_, s)| **s == ResolutionStatus::CallerOnly)
                    .map(|(obj, _)| (*method, *obj))
            })
            .sorted()
            .collect();
        for (method, obj) in caller_only {
            self.discharge_caller_only(obj, method);
        }
    }

    /// Consumes the resolver, yielding the solved summaries and the
    /// terminal status table.
    pub fn finish(
        self,
    ) -> (
        HashMap<MethodId, MethodSummary>,
        HashMap<MethodId, HashMap<ObjectNode, ResolutionStatus>>,
    ) {
        (self.solved, self.status)
    }

    fn status_of(&self, method: MethodId, obj: ObjectNode) -> ResolutionStatus {
        self.status
            .get(&method)
            .and_then(|table| table.get(&obj))
            .copied()
            .unwrap_or(ResolutionStatus::Unattempted)
    }

    fn set_status(&mut self, method: MethodId, obj: ObjectNode, s: ResolutionStatus) {
        self.status.entry(method).or_default().insert(obj, s);
    }

    fn solved_status(&self, method: MethodId, obj: ObjectNode) -> Option<&EscapeStatus> {
        self.solved.get(&method).and_then(|map| map.get(&obj))
    }

    fn store_solved(&mut self, method: MethodId, obj: ObjectNode, status: EscapeStatus) {
        self.solved.entry(method).or_default().insert(obj, status);
    }

    fn out_of_context_solve(&mut self, obj: ObjectNode, method: MethodId) {
        match self.status_of(method, obj) {
            ResolutionStatus::Resolved
            | ResolutionStatus::UnResolved
            | ResolutionStatus::CallerOnly => return,
            ResolutionStatus::InProgress => return,
            ResolutionStatus::Unattempted => {}
        }
        self.set_status(method, obj, ResolutionStatus::InProgress);

        // An object reachable in a graph but absent from its summary has
        // no proof of confinement; keep it conservative.
        let raw = match self.existing.get(&method).and_then(|s| s.get(&obj)) {
            Some(raw) => raw.clone(),
            None => {
                warn!("object {} of m{} has no raw summary entry", obj, method.0);
                EscapeStatus::escape()
            }
        };
        if raw.contains_no_escape() || raw.does_escape() {
            self.set_status(method, obj, ResolutionStatus::Resolved);
            self.store_solved(method, obj, raw);
            return;
        }

        let mut out = EscapeStatus::no_escape();
        for cv in raw.conditionals().cloned().collect::<Vec<_>>() {
            match self.resolution_helper(&cv, obj, method) {
                Verdict::Escapes => {
                    out.set_escape();
                    break;
                }
                Verdict::Pending => out.add_conditional(cv),
                Verdict::Confined => {}
            }
        }
        let status = if out.does_escape() || !out.contains_conditional() {
            ResolutionStatus::Resolved
        } else if out.is_caller_only() {
            ResolutionStatus::CallerOnly
        } else {
            ResolutionStatus::UnResolved
        };
        self.store_solved(method, obj, out);
        self.set_status(method, obj, status);
    }

    fn resolution_helper(
        &mut self,
        cv: &ConditionalValue,
        obj: ObjectNode,
        method: MethodId,
    ) -> Verdict {
        let target_method = match cv.method {
            Some(m) => m,
            // Anchored on our own caller; nothing to do out of context.
            None => return Verdict::Pending,
        };
        if !self.program.has_body(target_method) {
            return if self.program.is_trusted_primitive(target_method) {
                Verdict::Confined
            } else {
                // Unrecognized library operation: cannot be discharged.
                Verdict::Pending
            };
        }

        let mut pending = false;
        for target in self.collect_targets(cv) {
            if self.status_of(target_method, target) == ResolutionStatus::Unattempted {
                self.out_of_context_solve(target, target_method);
            }
            match self.status_of(target_method, target) {
                ResolutionStatus::Resolved => {
                    let escapes = self
                        .solved_status(target_method, target)
                        .map_or(false, |s| s.does_escape());
                    if escapes {
                        return Verdict::Escapes;
                    }
                }
                ResolutionStatus::UnResolved => pending = true,
                // A cycle back onto an in-progress pair is neutral.
                ResolutionStatus::InProgress => {}
                ResolutionStatus::CallerOnly => {
                    match self.caller_solve(target, target_method, obj, method) {
                        Verdict::Escapes => return Verdict::Escapes,
                        Verdict::Pending => pending = true,
                        Verdict::Confined => {}
                    }
                }
                ResolutionStatus::Unattempted => {}
            }
        }
        if pending {
            Verdict::Pending
        } else {
            Verdict::Confined
        }
    }

    /// The objects `cv` denotes inside its target method: the root
    /// (return-value roots resolve through the callee's return local)
    /// plus every object reached while walking the fact's field path.
    fn collect_targets(&self, cv: &ConditionalValue) -> Vec<ObjectNode> {
        let method = match cv.method {
            Some(m) => m,
            None => return Vec::new(),
        };
        let ptg = match self.ptgs.get(&method) {
            Some(ptg) => ptg,
            None => {
                debug!("no points-to graph for m{}", method.0);
                return Vec::new();
            }
        };

        let roots: Vec<ObjectNode> = if cv.root.kind == ObjectKind::ReturnValue {
            ptg.var_set(RETURN_LOCAL)
                .map(|set| set.iter().copied().sorted().collect())
                .unwrap_or_default()
        } else {
            vec![cv.root]
        };

        let mut out = roots.clone();
        let mut frontier = roots;
        for field in &cv.field_path {
            let mut next = Vec::new();
            for o in &frontier {
                if let Some(targets) = ptg.fields.get(o).and_then(|fields| fields.get(field)) {
                    for t in targets.iter().copied().sorted() {
                        if !out.contains(&t) {
                            out.push(t);
                        }
                        next.push(t);
                    }
                }
            }
            frontier = next;
        }
        out
    }

    /// Discharges a `CallerOnly` target one call level up, in the context
    /// of `(caller_obj, caller_method)` whose fact `cv` led us to it.
    fn caller_solve(
        &mut self,
        target: ObjectNode,
        target_method: MethodId,
        caller_obj: ObjectNode,
        caller_method: MethodId,
    ) -> Verdict {
        debug_assert_eq!(self.status_of(target_method, target), ResolutionStatus::CallerOnly);
        let residual = match self.solved_status(target_method, target) {
            Some(status) => status.clone(),
            None => return Verdict::Pending,
        };

        let mut pending = false;
        for cvv in residual.conditionals() {
            let mut unresolved_here = false;
            for depth in 0..=cvv.depth() {
                for object in self.relevant_objects(cvv, caller_method, target_method, depth) {
                    if object == caller_obj {
                        // our own in-progress resolution; no new evidence
                        continue;
                    }
                    if self.status_of(caller_method, object) == ResolutionStatus::Unattempted {
                        self.out_of_context_solve(object, caller_method);
                    }
                    match self.status_of(caller_method, object) {
                        ResolutionStatus::Resolved => {
                            let escapes = self
                                .solved_status(caller_method, object)
                                .map_or(false, |s| s.does_escape());
                            if escapes {
                                return Verdict::Escapes;
                            }
                        }
                        ResolutionStatus::UnResolved => unresolved_here = true,
                        ResolutionStatus::InProgress => {}
                        // Discharging would need that caller's own
                        // caller; escalate instead of recursing without
                        // bound.
                        ResolutionStatus::CallerOnly => return Verdict::Escapes,
                        ResolutionStatus::Unattempted => {}
                    }
                }
            }
            if unresolved_here {
                pending = true;
            }
        }
        if pending {
            Verdict::Pending
        } else {
            Verdict::Confined
        }
    }

    /// Caller-side objects whose recorded facts target `callee` with the
    /// same root shape and field-path prefix as the residual fact `cvv`.
    fn relevant_objects(
        &self,
        cvv: &ConditionalValue,
        caller_method: MethodId,
        callee_method: MethodId,
        depth: usize,
    ) -> Vec<ObjectNode> {
        let summary = match self.existing.get(&caller_method) {
            Some(summary) => summary,
            None => return Vec::new(),
        };
        let mut out = Vec::new();
        for (object, status) in summary.iter().sorted_by_key(|(object, _)| **object) {
            let matched = status.conditionals().any(|fact| {
                fact.method == Some(callee_method) && fact.matches_at_depth(cvv, depth)
            });
            if matched {
                out.push(*object);
            }
        }
        out
    }

    /// Final sweep for objects left `CallerOnly`: match their residual
    /// caller-anchored facts against every candidate caller. An escaping
    /// or itself-caller-dependent match escalates the object to `Escape`;
    /// no match leaves the residual facts in place.
    fn discharge_caller_only(&mut self, obj: ObjectNode, method: MethodId) {
        if self.status_of(method, obj) != ResolutionStatus::CallerOnly {
            return;
        }
        let residual = match self.solved_status(method, obj) {
            Some(status) => status.clone(),
            None => return,
        };

        let callers: Vec<MethodId> = self.existing.keys().copied().sorted().collect();
        let mut escapes = false;
        'facts: for cvv in residual.conditionals().filter(|cv| cv.method.is_none()) {
            for caller in &callers {
                for depth in 0..=cvv.depth() {
                    for object in self.relevant_objects(cvv, *caller, method, depth) {
                        if (*caller, object) == (method, obj) {
                            continue;
                        }
                        if self.status_of(*caller, object) == ResolutionStatus::Unattempted {
                            self.out_of_context_solve(object, *caller);
                        }
                        match self.status_of(*caller, object) {
                            ResolutionStatus::Resolved => {
                                let caller_escapes = self
                                    .solved_status(*caller, object)
                                    .map_or(false, |s| s.does_escape());
                                if caller_escapes {
                                    escapes = true;
                                    break 'facts;
                                }
                            }
                            ResolutionStatus::CallerOnly => {
                                escapes = true;
                                break 'facts;
                            }
                            ResolutionStatus::UnResolved
                            | ResolutionStatus::InProgress
                            | ResolutionStatus::Unattempted => {}
                        }
                    }
                }
            }
        }
        if escapes {
            debug!(
                "caller context escalates {} of m{} to escape",
                obj, method.0
            );
            self.store_solved(method, obj, EscapeStatus::escape());
            self.set_status(method, obj, ResolutionStatus::Resolved);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::escape::intra::IntraAnalysis;
    use crate::graph::ptg::ObjectKind;
    use crate::mir::body::{Body, Local, SiteId, Statement};

    fn internal(site: u32) -> ObjectNode {
        ObjectNode::new(SiteId(site), ObjectKind::Internal)
    }

    fn external(site: u32) -> ObjectNode {
        ObjectNode::new(SiteId(site), ObjectKind::External)
    }

    fn chain(body: &mut Body, sites: Vec<Statement>) {
        let mut prev = None;
        for (i, kind) in sites.into_iter().enumerate() {
            let point = body.add_stmt(SiteId(i as u32), kind);
            if let Some(prev) = prev {
                body.add_edge(prev, point);
            }
            prev = Some(point);
        }
    }

    fn run_phase_one(
        program: &Program,
    ) -> (
        HashMap<MethodId, MethodSummary>,
        HashMap<MethodId, PointsToGraph>,
    ) {
        let mut raw = HashMap::new();
        let mut ptgs = HashMap::new();
        for (method, body) in program.bodies() {
            let (ptg, summary) = IntraAnalysis::new(program, method, body).run();
            raw.insert(method, summary);
            ptgs.insert(method, ptg);
        }
        (raw, ptgs)
    }

    fn resolve(
        program: &Program,
    ) -> (
        HashMap<MethodId, MethodSummary>,
        HashMap<MethodId, HashMap<ObjectNode, ResolutionStatus>>,
    ) {
        let (raw, ptgs) = run_phase_one(program);
        let mut resolver = SummaryResolver::new(program, &raw, &ptgs);
        resolver.resolve();
        resolver.finish()
    }

    #[test]
    fn argument_escapes_into_callee_static() {
        let mut program = Program::new();
        let class = program.add_class("Main");
        let sink = program.add_method(class, "sink");
        let caller = program.add_method(class, "run");

        let mut sink_body = Body::new(1, 1);
        chain(
            &mut sink_body,
            vec![
                Statement::StaticStore { rhs: Local(0) },
                Statement::Return { value: None },
            ],
        );
        program.set_body(sink, sink_body);

        let mut caller_body = Body::new(0, 1);
        chain(
            &mut caller_body,
            vec![
                Statement::AllocObject { lhs: Local(0), class },
                Statement::Invoke { lhs: None, callee: sink, args: vec![Local(0)] },
                Statement::Return { value: None },
            ],
        );
        program.set_body(caller, caller_body);

        let (solved, status) = resolve(&program);
        assert!(solved[&caller][&internal(0)].does_escape());
        assert_eq!(status[&caller][&internal(0)], ResolutionStatus::Resolved);
    }

    #[test]
    fn argument_confined_when_callee_only_holds_it_locally() {
        let mut program = Program::new();
        let class = program.add_class("Main");
        let reader = program.add_method(class, "read");
        let caller = program.add_method(class, "run");

        let mut reader_body = Body::new(1, 2);
        chain(
            &mut reader_body,
            vec![
                Statement::Copy { lhs: Local(1), rhs: Local(0) },
                Statement::Return { value: None },
            ],
        );
        program.set_body(reader, reader_body);

        let mut caller_body = Body::new(0, 1);
        chain(
            &mut caller_body,
            vec![
                Statement::AllocObject { lhs: Local(0), class },
                Statement::Invoke { lhs: None, callee: reader, args: vec![Local(0)] },
                Statement::Return { value: None },
            ],
        );
        program.set_body(caller, caller_body);

        let (solved, status) = resolve(&program);
        assert!(solved[&caller][&internal(0)].contains_no_escape());
        assert_eq!(status[&caller][&internal(0)], ResolutionStatus::Resolved);
        // the callee's parameter object still depends on other callers
        assert_eq!(
            status[&reader][&ObjectNode::parameter(0)],
            ResolutionStatus::CallerOnly
        );
    }

    #[test]
    fn returned_object_leaked_by_caller_escapes() {
        let mut program = Program::new();
        let class = program.add_class("Main");
        let make = program.add_method(class, "make");
        let caller = program.add_method(class, "run");

        let mut make_body = Body::new(0, 1);
        chain(
            &mut make_body,
            vec![
                Statement::AllocObject { lhs: Local(0), class },
                Statement::Return { value: Some(Local(0)) },
            ],
        );
        program.set_body(make, make_body);

        let mut caller_body = Body::new(0, 1);
        chain(
            &mut caller_body,
            vec![
                Statement::Invoke { lhs: Some(Local(0)), callee: make, args: vec![] },
                Statement::StaticStore { rhs: Local(0) },
                Statement::Return { value: None },
            ],
        );
        program.set_body(caller, caller_body);

        let (solved, status) = resolve(&program);
        assert!(solved[&caller][&external(0)].does_escape());
        // the escalation flows back into the factory through its caller
        assert!(solved[&make][&internal(0)].does_escape());
        assert_eq!(status[&make][&internal(0)], ResolutionStatus::Resolved);
    }

    #[test]
    fn returned_object_confined_by_harmless_caller_keeps_residual_facts() {
        let mut program = Program::new();
        let class = program.add_class("Main");
        let make = program.add_method(class, "make");
        let caller = program.add_method(class, "run");

        let mut make_body = Body::new(0, 1);
        chain(
            &mut make_body,
            vec![
                Statement::AllocObject { lhs: Local(0), class },
                Statement::Return { value: Some(Local(0)) },
            ],
        );
        program.set_body(make, make_body);

        let mut caller_body = Body::new(0, 1);
        chain(
            &mut caller_body,
            vec![
                Statement::Invoke { lhs: Some(Local(0)), callee: make, args: vec![] },
                Statement::Return { value: None },
            ],
        );
        program.set_body(caller, caller_body);

        let (solved, status) = resolve(&program);
        assert!(solved[&caller][&external(0)].contains_no_escape());
        assert_eq!(status[&make][&internal(0)], ResolutionStatus::CallerOnly);
        assert!(!solved[&make][&internal(0)].does_escape());
    }

    #[test]
    fn object_stored_into_parameter_field_escapes_with_the_argument() {
        let mut program = Program::new();
        let class = program.add_class("Main");
        let f = program.intern_field("f");
        let holder = program.add_method(class, "hold");
        let caller = program.add_method(class, "run");

        // hold(p0) { p0.f = new X; }
        let mut holder_body = Body::new(1, 2);
        chain(
            &mut holder_body,
            vec![
                Statement::AllocObject { lhs: Local(1), class },
                Statement::FieldStore { base: Local(0), field: f, rhs: Local(1) },
                Statement::Return { value: None },
            ],
        );
        program.set_body(holder, holder_body);

        // run() { y = new; hold(y); STATIC = y; }
        let mut caller_body = Body::new(0, 1);
        chain(
            &mut caller_body,
            vec![
                Statement::AllocObject { lhs: Local(0), class },
                Statement::Invoke { lhs: None, callee: holder, args: vec![Local(0)] },
                Statement::StaticStore { rhs: Local(0) },
                Statement::Return { value: None },
            ],
        );
        program.set_body(caller, caller_body);

        let (solved, status) = resolve(&program);
        assert!(solved[&caller][&internal(0)].does_escape());
        // X was stored into a field of the escaping argument
        assert!(solved[&holder][&internal(0)].does_escape());
        assert_eq!(status[&holder][&internal(0)], ResolutionStatus::Resolved);
    }

    #[test]
    fn mutual_recursion_converges_and_confines_locals() {
        let mut program = Program::new();
        let class = program.add_class("Main");
        let a = program.add_method(class, "a");
        let b = program.add_method(class, "b");

        // a(p0) { b(p0); x = new; b(x); }
        let mut a_body = Body::new(1, 2);
        chain(
            &mut a_body,
            vec![
                Statement::Invoke { lhs: None, callee: b, args: vec![Local(0)] },
                Statement::AllocObject { lhs: Local(1), class },
                Statement::Invoke { lhs: None, callee: b, args: vec![Local(1)] },
                Statement::Return { value: None },
            ],
        );
        program.set_body(a, a_body);

        // b(p0) { a(p0); }
        let mut b_body = Body::new(1, 1);
        chain(
            &mut b_body,
            vec![
                Statement::Invoke { lhs: None, callee: a, args: vec![Local(0)] },
                Statement::Return { value: None },
            ],
        );
        program.set_body(b, b_body);

        let (solved, status) = resolve(&program);
        // site 1 is the allocation inside a
        assert!(!solved[&a][&internal(1)].does_escape());
        assert_ne!(status[&a][&internal(1)], ResolutionStatus::Unattempted);
    }

    #[test]
    fn unknown_library_call_stays_unresolved() {
        let mut program = Program::new();
        let class = program.add_class("Main");
        let lib_class = program.add_class("some.Unknown");
        let lib = program.add_library_method(lib_class, "consume");
        let caller = program.add_method(class, "run");

        let mut caller_body = Body::new(0, 1);
        chain(
            &mut caller_body,
            vec![
                Statement::AllocObject { lhs: Local(0), class },
                Statement::Invoke { lhs: None, callee: lib, args: vec![Local(0)] },
                Statement::Return { value: None },
            ],
        );
        program.set_body(caller, caller_body);

        let (solved, status) = resolve(&program);
        assert_eq!(status[&caller][&internal(0)], ResolutionStatus::UnResolved);
        assert!(solved[&caller][&internal(0)].contains_conditional());
        assert!(!solved[&caller][&internal(0)].does_escape());
    }

    #[test]
    fn trusted_primitive_call_is_transparent() {
        let mut program = Program::new();
        let class = program.add_class("Main");
        let ps = program.add_class("java.io.PrintStream");
        let println = program.add_library_method(ps, "println");
        let caller = program.add_method(class, "run");

        let mut caller_body = Body::new(0, 2);
        chain(
            &mut caller_body,
            vec![
                Statement::AllocObject { lhs: Local(0), class },
                Statement::Invoke { lhs: Some(Local(1)), callee: println, args: vec![Local(0)] },
                Statement::Return { value: None },
            ],
        );
        program.set_body(caller, caller_body);

        let (solved, status) = resolve(&program);
        assert!(solved[&caller][&internal(0)].contains_no_escape());
        assert!(solved[&caller][&external(1)].contains_no_escape());
        assert_eq!(status[&caller][&internal(0)], ResolutionStatus::Resolved);
    }
}
