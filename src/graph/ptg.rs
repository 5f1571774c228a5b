// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

//! The points-to graph: variables to sets of abstract heap objects, and
//! (object, field) pairs to sets of abstract heap objects. One graph
//! snapshot per program point; transfer functions mutate a snapshot in
//! place.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;

use crate::mir::body::{FieldId, Local, SiteId};
use crate::summary::{EscapeStatus, MethodSummary};

/// Where an abstract object comes from.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub enum ObjectKind {
    /// Allocated by a statement in analyzed code.
    Internal,
    /// A value of unknown or opaque origin: loaded from an unmodeled
    /// field, produced by a library call, or reached through an
    /// unresolved base.
    External,
    /// Bound to a formal parameter slot; the site is the parameter index.
    Parameter,
    /// The synthetic root standing for a method's return value.
    ReturnValue,
    /// Placeholder when the front end supplied no site identifier.
    InvalidSite,
}

/// An abstract heap object. Identity is `(site, kind)`; two objects
/// created for the same site and kind are the same object, which keeps
/// re-applied transfer functions idempotent.
#[derive(Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct ObjectNode {
    pub site: SiteId,
    pub kind: ObjectKind,
}

impl ObjectNode {
    pub fn new(site: SiteId, kind: ObjectKind) -> Self {
        ObjectNode { site, kind }
    }

    pub fn invalid() -> Self {
        ObjectNode {
            site: SiteId::INVALID,
            kind: ObjectKind::InvalidSite,
        }
    }

    /// The object bound to parameter slot `index`.
    pub fn parameter(index: u32) -> Self {
        ObjectNode {
            site: SiteId(index),
            kind: ObjectKind::Parameter,
        }
    }

    /// The synthetic return-value root.
    pub fn return_value() -> Self {
        ObjectNode {
            site: SiteId(0),
            kind: ObjectKind::ReturnValue,
        }
    }
}

impl fmt::Display for ObjectNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ObjectKind::Internal => write!(f, "obj@{}", self.site.0),
            ObjectKind::External => write!(f, "ext@{}", self.site.0),
            ObjectKind::Parameter => write!(f, "param#{}", self.site.0),
            ObjectKind::ReturnValue => write!(f, "retval"),
            ObjectKind::InvalidSite => write!(f, "obj@?"),
        }
    }
}

impl fmt::Debug for ObjectNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

#[derive(Clone, Default, PartialEq, Eq)]
pub struct PointsToGraph {
    /// variable -> points-to set
    pub vars: HashMap<Local, HashSet<ObjectNode>>,
    /// (object, field) -> heap edge targets
    pub fields: HashMap<ObjectNode, HashMap<FieldId, HashSet<ObjectNode>>>,
}

impl PointsToGraph {
    pub fn new() -> Self {
        PointsToGraph::default()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty() && self.fields.is_empty()
    }

    /// Merge `other` into `self`: set union per key on both maps.
    /// Commutative, associative, idempotent; this is the join used to
    /// compute a point's `in` from its predecessors' `out`s.
    pub fn union(&mut self, other: &PointsToGraph) {
        for (var, set) in &other.vars {
            self.vars.entry(*var).or_default().extend(set.iter().copied());
        }
        for (obj, field_map) in &other.fields {
            let own = self.fields.entry(*obj).or_default();
            for (field, targets) in field_map {
                own.entry(*field).or_default().extend(targets.iter().copied());
            }
        }
    }

    /// Definite reassignment: `v` now points at exactly `obj`.
    pub fn force_put_var(&mut self, v: Local, obj: ObjectNode) {
        let mut set = HashSet::new();
        set.insert(obj);
        self.vars.insert(v, set);
    }

    /// Definite reassignment to an arbitrary set.
    pub fn put_var_set(&mut self, v: Local, set: HashSet<ObjectNode>) {
        self.vars.insert(v, set);
    }

    /// Accumulate `set` into `v`'s points-to set.
    pub fn add_var_set(&mut self, v: Local, set: &HashSet<ObjectNode>) {
        self.vars.entry(v).or_default().extend(set.iter().copied());
    }

    pub fn var_set(&self, v: Local) -> Option<&HashSet<ObjectNode>> {
        self.vars.get(&v)
    }

    /// Adds `target` to `fields[obj][field]`. Accumulates: stores through
    /// different paths all remain visible.
    pub fn make_field(&mut self, obj: ObjectNode, field: FieldId, target: ObjectNode) {
        self.fields
            .entry(obj)
            .or_default()
            .entry(field)
            .or_default()
            .insert(target);
    }

    /// Adds every element of `targets` to `fields[obj][field]`. A
    /// recorded empty set still registers the edge key.
    pub fn make_field_set(&mut self, obj: ObjectNode, field: FieldId, targets: HashSet<ObjectNode>) {
        self.fields
            .entry(obj)
            .or_default()
            .entry(field)
            .or_default()
            .extend(targets);
    }

    /// Does any object in `vars[base]` have a recorded `field` edge?
    pub fn has_field(&self, base: Local, field: FieldId) -> bool {
        match self.vars.get(&base) {
            Some(objs) => objs.iter().any(|o| {
                self.fields
                    .get(o)
                    .map_or(false, |fields| fields.contains_key(&field))
            }),
            None => false,
        }
    }

    /// Union of `fields[o][field]` over all `o` in `vars[base]`.
    pub fn assemble_field_objects(&self, base: Local, field: FieldId) -> HashSet<ObjectNode> {
        let mut out = HashSet::new();
        if let Some(objs) = self.vars.get(&base) {
            for o in objs {
                if let Some(targets) = self.fields.get(o).and_then(|fields| fields.get(&field)) {
                    out.extend(targets.iter().copied());
                }
            }
        }
        out
    }

    /// Escalates each object in `vars[rhs]` by the field-projection of
    /// every base object's status through `field`.
    pub fn propagate_es(
        &self,
        base: Local,
        field: FieldId,
        rhs: Local,
        summary: &mut MethodSummary,
    ) {
        let mut projected = EscapeStatus::no_escape();
        if let Some(parents) = self.vars.get(&base) {
            for parent in parents {
                if let Some(status) = summary.get(parent) {
                    projected.join(&status.make_field(field));
                }
            }
        }
        if let Some(objs) = self.vars.get(&rhs) {
            for o in objs {
                summary.entry(*o).or_default().join(&projected);
            }
        }
    }

    /// Marks everything transitively reachable from `root` as `Escape`.
    /// Used when a value's destination is unknown.
    pub fn cascade_escape(&self, root: Local, summary: &mut MethodSummary) {
        for o in self.reachables(root) {
            summary.entry(o).or_default().set_escape();
        }
    }

    /// Transitive closure over `vars`/`fields` edges starting from
    /// `vars[root]`, in first-visit order.
    pub fn reachables(&self, root: Local) -> Vec<ObjectNode> {
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        let mut queue: VecDeque<ObjectNode> = VecDeque::new();
        if let Some(objs) = self.vars.get(&root) {
            for o in objs {
                if seen.insert(*o) {
                    queue.push_back(*o);
                }
            }
        }
        while let Some(o) = queue.pop_front() {
            out.push(o);
            if let Some(field_map) = self.fields.get(&o) {
                for targets in field_map.values() {
                    for t in targets {
                        if seen.insert(*t) {
                            queue.push_back(*t);
                        }
                    }
                }
            }
        }
        out
    }
}

impl fmt::Debug for PointsToGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "vars: {:?}, fields: {:?}", self.vars, self.fields)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::mir::body::ARRAY_ELEM;

    fn obj(site: u32) -> ObjectNode {
        ObjectNode::new(SiteId(site), ObjectKind::Internal)
    }

    #[test]
    fn union_is_idempotent_and_commutative() {
        let mut a = PointsToGraph::new();
        a.force_put_var(Local(0), obj(1));
        a.make_field(obj(1), FieldId(0), obj(2));
        let mut b = PointsToGraph::new();
        b.force_put_var(Local(0), obj(3));
        b.force_put_var(Local(1), obj(4));

        let mut ab = a.clone();
        ab.union(&b);
        let mut ba = b.clone();
        ba.union(&a);
        assert_eq!(ab, ba);

        let mut twice = ab.clone();
        twice.union(&ab);
        assert_eq!(twice, ab);
    }

    #[test]
    fn make_field_accumulates() {
        let mut g = PointsToGraph::new();
        g.force_put_var(Local(0), obj(1));
        g.make_field(obj(1), FieldId(0), obj(2));
        g.make_field(obj(1), FieldId(0), obj(3));
        let targets = g.assemble_field_objects(Local(0), FieldId(0));
        assert_eq!(targets.len(), 2);
        assert!(targets.contains(&obj(2)) && targets.contains(&obj(3)));
    }

    #[test]
    fn force_put_var_overwrites() {
        let mut g = PointsToGraph::new();
        g.force_put_var(Local(0), obj(1));
        g.force_put_var(Local(0), obj(2));
        assert_eq!(g.var_set(Local(0)).unwrap().len(), 1);
        assert!(g.var_set(Local(0)).unwrap().contains(&obj(2)));
    }

    #[test]
    fn cascade_escape_reaches_through_fields() {
        let mut g = PointsToGraph::new();
        g.force_put_var(Local(0), obj(1));
        g.make_field(obj(1), FieldId(0), obj(2));
        g.make_field(obj(2), ARRAY_ELEM, obj(3));
        // a cycle must not diverge
        g.make_field(obj(3), FieldId(1), obj(1));

        let mut summary = MethodSummary::new();
        g.cascade_escape(Local(0), &mut summary);
        for site in 1..=3 {
            assert!(summary.get(&obj(site)).unwrap().does_escape());
        }
    }

    #[test]
    fn reachables_ignores_unrelated_objects() {
        let mut g = PointsToGraph::new();
        g.force_put_var(Local(0), obj(1));
        g.force_put_var(Local(1), obj(9));
        let reached = g.reachables(Local(0));
        assert_eq!(reached, vec![obj(1)]);
    }
}
