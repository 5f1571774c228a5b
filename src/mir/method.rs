// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

use std::fmt;

/// The unique identifier for each method known to the analysis.
/// Library methods without an analyzable body get an id like any other,
/// so deferred facts can target them uniformly.
#[derive(Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct MethodId(pub u32);

impl MethodId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for MethodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MethodId({})", self.0)
    }
}

/// The unique identifier for each declared class.
#[derive(Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct ClassId(pub u32);

impl ClassId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClassId({})", self.0)
    }
}

/// Information that identifies a method instance.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct MethodRef {
    /// The declaring class.
    pub class: ClassId,
    /// The simple method name, e.g. `<init>` or `visitMaxs`.
    pub name: Box<str>,
    /// A library method is opaque to the analysis: it has no body and its
    /// effects are either trusted or left pending.
    pub is_library: bool,
}

impl MethodRef {
    pub fn new(class: ClassId, name: &str, is_library: bool) -> Self {
        MethodRef {
            class,
            name: name.into(),
            is_library,
        }
    }
}
