// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

//! A method body as delivered by the front end: a control-flow graph of
//! abstract statements, each carrying a stable site identifier.

use anyhow::{bail, Result};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::fmt;

use crate::mir::method::{ClassId, MethodId};

/// Stable per-instruction identifier assigned by the front end.
#[derive(Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct SiteId(pub u32);

impl SiteId {
    /// Sentinel for a statement the front end could not assign an
    /// identifier to. Objects created at such a site are invalid-site
    /// placeholders.
    pub const INVALID: SiteId = SiteId(u32::MAX);

    pub fn is_valid(self) -> bool {
        self != SiteId::INVALID
    }
}

impl fmt::Debug for SiteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "SiteId({})", self.0)
        } else {
            write!(f, "SiteId(?)")
        }
    }
}

/// A local variable slot. Parameter values occupy the leading slots
/// `0..param_count` of a body.
#[derive(Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct Local(pub u32);

/// Reserved local that accumulates the points-to sets of all returned
/// values, so the resolver can resolve return-value roots against it.
pub const RETURN_LOCAL: Local = Local(u32::MAX);

impl fmt::Debug for Local {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == RETURN_LOCAL {
            write!(f, "ret")
        } else {
            write!(f, "l{}", self.0)
        }
    }
}

/// An interned field key.
#[derive(Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct FieldId(pub u32);

impl FieldId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Reserved synthetic field key standing in for "any array element".
pub const ARRAY_ELEM: FieldId = FieldId(u32::MAX);

impl fmt::Debug for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == ARRAY_ELEM {
            write!(f, "[]")
        } else {
            write!(f, "f{}", self.0)
        }
    }
}

/// The abstract statement kinds the front end can produce. The enum is
/// exhaustive: a kind the loader cannot classify is rejected at the input
/// boundary, not here.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Statement {
    /// `x = new T`
    AllocObject { lhs: Local, class: ClassId },
    /// `x = new T[..]` (including multi-dimensional allocations)
    AllocArray { lhs: Local },
    /// `x = y`; casts unwrap to this rule
    Copy { lhs: Local, rhs: Local },
    /// `x = "literal"`
    ConstString { lhs: Local },
    /// `x = T.class`
    ConstClass { lhs: Local },
    /// `x = y.f`
    FieldLoad { lhs: Local, base: Local, field: FieldId },
    /// `y.f = x`
    FieldStore { base: Local, field: FieldId, rhs: Local },
    /// `x = T.g` (read of a global field)
    StaticLoad { lhs: Local },
    /// `T.g = x` (write to a global field)
    StaticStore { rhs: Local },
    /// `x = y[i]`
    ArrayLoad { lhs: Local, base: Local },
    /// `y[i] = x`
    ArrayStore { base: Local, rhs: Local },
    /// `x = m(args)` or bare `m(args)`
    Invoke {
        lhs: Option<Local>,
        callee: MethodId,
        args: Vec<Local>,
    },
    /// `return` or `return v`
    Return { value: Option<Local> },
    /// `throw v`
    Throw { value: Local },
    MonitorEnter { value: Local },
    MonitorExit { value: Local },
    /// Branches, gotos, switches and other control-only statements.
    Nop,
}

/// A program point: a statement plus its site identifier.
#[derive(Clone, Debug)]
pub struct Stmt {
    pub site: SiteId,
    pub kind: Statement,
}

/// A method body. Statements are CFG nodes; the designated exit point is
/// the last statement in point-map iteration order, i.e. insertion order.
#[derive(Debug)]
pub struct Body {
    pub(crate) cfg: DiGraph<Stmt, ()>,
    pub param_count: u32,
    pub local_count: u32,
}

impl Body {
    pub fn new(param_count: u32, local_count: u32) -> Self {
        Body {
            cfg: DiGraph::new(),
            param_count,
            local_count,
        }
    }

    pub fn add_stmt(&mut self, site: SiteId, kind: Statement) -> NodeIndex {
        self.cfg.add_node(Stmt { site, kind })
    }

    pub fn add_edge(&mut self, from: NodeIndex, to: NodeIndex) {
        self.cfg.add_edge(from, to, ());
    }

    pub fn stmt(&self, point: NodeIndex) -> &Stmt {
        &self.cfg[point]
    }

    pub fn point_count(&self) -> usize {
        self.cfg.node_count()
    }

    /// All program points in insertion order.
    pub fn points(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        self.cfg.node_indices()
    }

    pub fn preds(&self, point: NodeIndex) -> impl Iterator<Item = NodeIndex> + '_ {
        self.cfg.neighbors_directed(point, Direction::Incoming)
    }

    pub fn succs(&self, point: NodeIndex) -> impl Iterator<Item = NodeIndex> + '_ {
        self.cfg.neighbors_directed(point, Direction::Outgoing)
    }

    /// Rejects a body whose statements reference local slots outside the
    /// declared range. Such a body is malformed input; analyzing it cannot
    /// be sound.
    pub fn validate(&self) -> Result<()> {
        let check = |site: SiteId, l: Local| -> Result<()> {
            if l != RETURN_LOCAL && l.0 >= self.local_count {
                bail!("statement at site {:?} references undeclared local {:?}", site, l);
            }
            Ok(())
        };
        if self.param_count > self.local_count {
            bail!(
                "body declares {} parameters but only {} locals",
                self.param_count,
                self.local_count
            );
        }
        for point in self.points() {
            let stmt = self.stmt(point);
            let site = stmt.site;
            match &stmt.kind {
                Statement::AllocObject { lhs, .. }
                | Statement::AllocArray { lhs }
                | Statement::ConstString { lhs }
                | Statement::ConstClass { lhs }
                | Statement::StaticLoad { lhs } => check(site, *lhs)?,
                Statement::Copy { lhs, rhs } => {
                    check(site, *lhs)?;
                    check(site, *rhs)?;
                }
                Statement::FieldLoad { lhs, base, .. } | Statement::ArrayLoad { lhs, base } => {
                    check(site, *lhs)?;
                    check(site, *base)?;
                }
                Statement::FieldStore { base, rhs, .. } | Statement::ArrayStore { base, rhs } => {
                    check(site, *base)?;
                    check(site, *rhs)?;
                }
                Statement::StaticStore { rhs } => check(site, *rhs)?,
                Statement::Invoke { lhs, args, .. } => {
                    if let Some(lhs) = lhs {
                        check(site, *lhs)?;
                    }
                    for arg in args {
                        check(site, *arg)?;
                    }
                }
                Statement::Return { value } => {
                    if let Some(value) = value {
                        check(site, *value)?;
                    }
                }
                Statement::Throw { value }
                | Statement::MonitorEnter { value }
                | Statement::MonitorExit { value } => check(site, *value)?,
                Statement::Nop => {}
            }
        }
        Ok(())
    }
}
