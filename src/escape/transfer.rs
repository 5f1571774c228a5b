// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

//! Per-statement transfer functions. Each function mutates the given
//! graph snapshot in place and escalates summary entries; a write it
//! cannot fully characterize escalates toward `Escape`, never toward
//! `NoEscape`.

use std::collections::{HashMap, HashSet};

use crate::graph::ptg::{ObjectKind, ObjectNode, PointsToGraph};
use crate::mir::body::{FieldId, Local, SiteId, Statement, Stmt, ARRAY_ELEM, RETURN_LOCAL};
use crate::mir::method::{ClassId, MethodId};
use crate::mir::program::Program;
use crate::summary::{ConditionalValue, EscapeStatus, MethodSummary};

/// Read-only context shared by all transfer applications within one
/// method body.
pub(crate) struct TransferCtx<'a> {
    pub program: &'a Program,
    /// Allocation class per site, for the monitor classification check.
    pub alloc_classes: &'a HashMap<SiteId, ClassId>,
}

fn fresh(site: SiteId, kind: ObjectKind) -> ObjectNode {
    if site.is_valid() {
        ObjectNode::new(site, kind)
    } else {
        ObjectNode::invalid()
    }
}

/// Applies `stmt` to `graph` (the `in` snapshot copy that becomes `out`)
/// and the shared per-method summary.
pub(crate) fn apply(
    stmt: &Stmt,
    graph: &mut PointsToGraph,
    summary: &mut MethodSummary,
    ctx: &TransferCtx,
) {
    let site = stmt.site;
    match &stmt.kind {
        Statement::AllocObject { lhs, class } => alloc_object(site, *lhs, *class, graph, summary, ctx),
        Statement::AllocArray { lhs } => alloc_array(site, *lhs, graph, summary),
        Statement::Copy { lhs, rhs } => copy(site, *lhs, *rhs, graph, summary),
        Statement::ConstString { lhs } => const_string(site, *lhs, graph, summary),
        Statement::ConstClass { lhs } => const_class(site, *lhs, graph, summary),
        Statement::FieldLoad { lhs, base, field } => field_load(site, *lhs, *base, *field, graph, summary),
        Statement::FieldStore { base, field, rhs } => field_store(*base, *field, *rhs, graph, summary),
        Statement::StaticLoad { lhs } => static_load(site, *lhs, graph, summary),
        Statement::StaticStore { rhs } => graph.cascade_escape(*rhs, summary),
        Statement::ArrayLoad { lhs, base } => array_load(site, *lhs, *base, graph, summary),
        Statement::ArrayStore { base, rhs } => field_store(*base, ARRAY_ELEM, *rhs, graph, summary),
        Statement::Invoke { lhs, callee, args } => invoke(site, *lhs, *callee, args, graph, summary, ctx),
        Statement::Return { value } => return_stmt(*value, graph, summary),
        Statement::Throw { value } => graph.cascade_escape(*value, summary),
        Statement::MonitorEnter { value } | Statement::MonitorExit { value } => {
            monitor(*value, graph, summary, ctx)
        }
        Statement::Nop => {}
    }
}

fn alloc_object(
    site: SiteId,
    lhs: Local,
    class: ClassId,
    graph: &mut PointsToGraph,
    summary: &mut MethodSummary,
    ctx: &TransferCtx,
) {
    let obj = fresh(site, ObjectKind::Internal);
    graph.force_put_var(lhs, obj);
    // A thread-spawning type is visible to its spawned execution from the
    // moment it exists.
    let status = if ctx.program.is_concurrent_type(class) {
        EscapeStatus::escape()
    } else {
        EscapeStatus::no_escape()
    };
    summary.entry(obj).or_insert(status);
}

fn alloc_array(site: SiteId, lhs: Local, graph: &mut PointsToGraph, summary: &mut MethodSummary) {
    let obj = fresh(site, ObjectKind::Internal);
    graph.force_put_var(lhs, obj);
    summary.entry(obj).or_insert_with(EscapeStatus::no_escape);
}

fn copy(site: SiteId, lhs: Local, rhs: Local, graph: &mut PointsToGraph, summary: &mut MethodSummary) {
    match graph.var_set(rhs).cloned() {
        Some(set) => graph.put_var_set(lhs, set),
        None => {
            // rhs has no recorded set; register an escaped external
            // placeholder and clear lhs.
            let obj = fresh(site, ObjectKind::External);
            summary.insert(obj, EscapeStatus::escape());
            graph.put_var_set(lhs, HashSet::new());
        }
    }
}

fn const_string(site: SiteId, lhs: Local, graph: &mut PointsToGraph, summary: &mut MethodSummary) {
    let obj = fresh(site, ObjectKind::Internal);
    graph.force_put_var(lhs, obj);
    let status = if obj.kind == ObjectKind::InvalidSite {
        EscapeStatus::escape()
    } else {
        EscapeStatus::no_escape()
    };
    summary.insert(obj, status);
}

fn const_class(site: SiteId, lhs: Local, graph: &mut PointsToGraph, summary: &mut MethodSummary) {
    // Class constants are interned process-wide.
    let obj = fresh(site, ObjectKind::Internal);
    graph.force_put_var(lhs, obj);
    summary.insert(obj, EscapeStatus::escape());
}

fn field_load(
    site: SiteId,
    lhs: Local,
    base: Local,
    field: FieldId,
    graph: &mut PointsToGraph,
    summary: &mut MethodSummary,
) {
    let parents = match graph.var_set(base).cloned() {
        Some(parents) => parents,
        None => {
            // The base is unmodeled; the loaded value may alias anything.
            let obj = fresh(site, ObjectKind::External);
            graph.force_put_var(lhs, obj);
            summary.insert(obj, EscapeStatus::escape());
            return;
        }
    };
    if graph.has_field(base, field) {
        let assembled = graph.assemble_field_objects(base, field);
        graph.put_var_set(lhs, assembled);
    } else {
        // First load through this field: synthesize one external object
        // and record it as the field target of every parent.
        let obj = fresh(site, ObjectKind::External);
        graph.force_put_var(lhs, obj);
        let mut status = EscapeStatus::no_escape();
        for parent in &parents {
            graph.make_field(*parent, field, obj);
            if let Some(parent_status) = summary.get(parent) {
                status.join(&parent_status.make_field(field));
            }
        }
        summary.insert(obj, status);
    }
}

fn field_store(
    base: Local,
    field: FieldId,
    rhs: Local,
    graph: &mut PointsToGraph,
    summary: &mut MethodSummary,
) {
    let parents = match graph.var_set(base).cloned() {
        Some(parents) => parents,
        None => {
            // Unmodeled destination: everything reachable from rhs may
            // become visible anywhere.
            graph.cascade_escape(rhs, summary);
            return;
        }
    };
    match graph.var_set(rhs).cloned() {
        Some(rhs_set) => {
            for parent in &parents {
                graph.make_field_set(*parent, field, rhs_set.clone());
            }
            graph.propagate_es(base, field, rhs, summary);
        }
        None => {
            // rhs was cleared (e.g. a null store); register the edge key
            // with no targets.
            for parent in &parents {
                graph.make_field_set(*parent, field, HashSet::new());
            }
        }
    }
}

fn static_load(site: SiteId, lhs: Local, graph: &mut PointsToGraph, summary: &mut MethodSummary) {
    let obj = fresh(site, ObjectKind::External);
    graph.force_put_var(lhs, obj);
    summary.insert(obj, EscapeStatus::escape());
}

fn array_load(
    site: SiteId,
    lhs: Local,
    base: Local,
    graph: &mut PointsToGraph,
    summary: &mut MethodSummary,
) {
    let parents = match graph.var_set(base).cloned() {
        Some(parents) => parents,
        None => {
            let obj = fresh(site, ObjectKind::External);
            graph.force_put_var(lhs, obj);
            summary.insert(obj, EscapeStatus::escape());
            return;
        }
    };
    // One internal- and one external-tagged child per load site; each
    // parent contributes to the child matching its own kind.
    let internal_child = fresh(site, ObjectKind::Internal);
    let external_child = fresh(site, ObjectKind::External);
    let mut children = HashSet::new();
    for parent in &parents {
        let child = match parent.kind {
            ObjectKind::Internal => internal_child,
            _ => external_child,
        };
        graph.make_field(*parent, ARRAY_ELEM, child);
        let projected = summary
            .get(parent)
            .cloned()
            .unwrap_or_default()
            .make_field(ARRAY_ELEM);
        summary.entry(child).or_default().join(&projected);
        children.insert(child);
    }
    graph.put_var_set(lhs, children);
}

fn invoke(
    site: SiteId,
    lhs: Option<Local>,
    callee: MethodId,
    args: &[Local],
    graph: &mut PointsToGraph,
    summary: &mut MethodSummary,
    ctx: &TransferCtx,
) {
    let trusted = ctx.program.is_trusted_primitive(callee);
    if let Some(lhs) = lhs {
        let obj = fresh(site, ObjectKind::External);
        graph.force_put_var(lhs, obj);
        let status = if trusted {
            EscapeStatus::no_escape()
        } else {
            EscapeStatus::conditional(ConditionalValue::new(
                Some(callee),
                ObjectNode::return_value(),
                Vec::new(),
                false,
            ))
        };
        summary.insert(obj, status);
    }
    if trusted {
        return;
    }
    // Each argument object escapes iff the callee's matching parameter
    // object does; defer to the resolver.
    for (index, arg) in args.iter().enumerate() {
        if let Some(objs) = graph.var_set(*arg).cloned() {
            let cv = ConditionalValue::new(
                Some(callee),
                ObjectNode::parameter(index as u32),
                Vec::new(),
                true,
            );
            for o in objs {
                summary.entry(o).or_default().add_conditional(cv.clone());
            }
        }
    }
}

fn return_stmt(value: Option<Local>, graph: &mut PointsToGraph, summary: &mut MethodSummary) {
    let value = match value {
        Some(value) => value,
        None => return,
    };
    if let Some(set) = graph.var_set(value).cloned() {
        // Multiple return statements union into the reserved return local.
        graph.add_var_set(RETURN_LOCAL, &set);
    }
    let cv = ConditionalValue::new(None, ObjectNode::return_value(), Vec::new(), false);
    for o in graph.reachables(value) {
        summary.entry(o).or_default().add_conditional(cv.clone());
    }
}

fn monitor(value: Local, graph: &mut PointsToGraph, summary: &mut MethodSummary, ctx: &TransferCtx) {
    let objs = match graph.var_set(value) {
        Some(objs) => objs.clone(),
        None => return,
    };
    for o in objs {
        if o.kind != ObjectKind::Internal {
            continue;
        }
        let concurrent = ctx
            .alloc_classes
            .get(&o.site)
            .map_or(false, |class| ctx.program.is_concurrent_type(*class));
        if concurrent {
            summary.entry(o).or_default().set_escape();
        }
    }
}
