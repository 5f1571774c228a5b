// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

//! The escape lattice: `NoEscape` < conditional-fact set < `Escape`.
//!
//! An `EscapeStatus` carries an escape bit plus a set of deferred
//! [`ConditionalValue`] facts. At the lattice level the bit is absorbing:
//! once set, the status *is* `Escape` and every predicate answers
//! accordingly. The fact set is never literally dropped, so the resolver
//! can still shape-match call-site facts recorded on objects that later
//! escalated to `Escape`.

use std::collections::btree_set;
use std::collections::BTreeSet;
use std::collections::HashMap;
use std::fmt;

use crate::graph::ptg::ObjectNode;
use crate::mir::body::FieldId;
use crate::mir::method::MethodId;

/// A deferred escape fact: "escapes iff the object reached from `root`
/// via `field_path` in `method` escapes". `method == None` anchors the
/// fact on the current method's own caller; it can only be discharged
/// with caller context.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConditionalValue {
    pub method: Option<MethodId>,
    pub root: ObjectNode,
    pub field_path: Vec<FieldId>,
    /// True for facts rooted at a parameter/argument position, false for
    /// return-value-rooted facts.
    pub argument_relative: bool,
}

impl ConditionalValue {
    pub fn new(
        method: Option<MethodId>,
        root: ObjectNode,
        field_path: Vec<FieldId>,
        argument_relative: bool,
    ) -> Self {
        ConditionalValue {
            method,
            root,
            field_path,
            argument_relative,
        }
    }

    pub fn depth(&self) -> usize {
        self.field_path.len()
    }

    /// The same fact one field deeper.
    pub fn extend_field(&self, field: FieldId) -> Self {
        let mut field_path = self.field_path.clone();
        field_path.push(field);
        ConditionalValue {
            method: self.method,
            root: self.root,
            field_path,
            argument_relative: self.argument_relative,
        }
    }

    /// Do `self` and `other` agree on root shape and on the first `depth`
    /// path components?
    pub fn matches_at_depth(&self, other: &ConditionalValue, depth: usize) -> bool {
        self.root == other.root
            && self.field_path.len() >= depth
            && other.field_path.len() >= depth
            && self.field_path[..depth] == other.field_path[..depth]
    }
}

impl fmt::Display for ConditionalValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.method {
            Some(m) => write!(f, "<m{}, {}", m.0, self.root)?,
            None => write!(f, "<caller, {}", self.root)?,
        }
        for field in &self.field_path {
            write!(f, ".{:?}", field)?;
        }
        write!(f, ">")
    }
}

/// The escape status of one abstract object.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct EscapeStatus {
    escaped: bool,
    conditionals: BTreeSet<ConditionalValue>,
}

impl EscapeStatus {
    /// Bottom: provably confined.
    pub fn no_escape() -> Self {
        EscapeStatus::default()
    }

    /// Top: may be visible beyond the allocating method and thread.
    pub fn escape() -> Self {
        EscapeStatus {
            escaped: true,
            conditionals: BTreeSet::new(),
        }
    }

    pub fn conditional(cv: ConditionalValue) -> Self {
        let mut conditionals = BTreeSet::new();
        conditionals.insert(cv);
        EscapeStatus {
            escaped: false,
            conditionals,
        }
    }

    pub fn set_escape(&mut self) {
        self.escaped = true;
    }

    pub fn does_escape(&self) -> bool {
        self.escaped
    }

    /// Definitely confined: no escape bit and no pending facts.
    pub fn contains_no_escape(&self) -> bool {
        !self.escaped && self.conditionals.is_empty()
    }

    /// Has at least one pending conditional fact.
    pub fn contains_conditional(&self) -> bool {
        !self.conditionals.is_empty()
    }

    /// Every pending fact is anchored on the current method's caller.
    pub fn is_caller_only(&self) -> bool {
        !self.conditionals.is_empty() && self.conditionals.iter().all(|cv| cv.method.is_none())
    }

    pub fn add_conditional(&mut self, cv: ConditionalValue) {
        self.conditionals.insert(cv);
    }

    pub fn conditionals(&self) -> btree_set::Iter<'_, ConditionalValue> {
        self.conditionals.iter()
    }

    /// Lattice join. Commutative, associative, idempotent; `Escape` is
    /// absorbing and a definite `NoEscape` operand contributes nothing.
    pub fn join(&mut self, other: &EscapeStatus) {
        self.escaped |= other.escaped;
        for cv in &other.conditionals {
            self.conditionals.insert(cv.clone());
        }
    }

    /// Field projection: the contribution a value reached via `field`
    /// inherits from this status. `Escape` propagates unchanged,
    /// `NoEscape` contributes nothing, and each pending fact has `field`
    /// appended to its path for later resolution against the target
    /// method's own layout at that depth.
    pub fn make_field(&self, field: FieldId) -> EscapeStatus {
        EscapeStatus {
            escaped: self.escaped,
            conditionals: self
                .conditionals
                .iter()
                .map(|cv| cv.extend_field(field))
                .collect(),
        }
    }
}

impl fmt::Display for EscapeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.contains_no_escape() {
            return write!(f, "NoEscape");
        }
        if self.escaped {
            write!(f, "Escape")?;
            if self.conditionals.is_empty() {
                return Ok(());
            }
            write!(f, " ")?;
        }
        let mut first = true;
        for cv in &self.conditionals {
            if !first {
                write!(f, " ")?;
            }
            write!(f, "{}", cv)?;
            first = false;
        }
        Ok(())
    }
}

/// Per-method map from abstract object to escape status.
pub type MethodSummary = HashMap<ObjectNode, EscapeStatus>;
