// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

//! Per-run program table. Replaces ambient registries: the driver owns one
//! `Program`, phase 1 reads bodies out of it, and both phases consult the
//! front-end classification predicates through it.

use lazy_static::lazy_static;
use std::collections::{HashMap, HashSet};

use crate::mir::body::{Body, FieldId, ARRAY_ELEM};
use crate::mir::method::{ClassId, MethodId, MethodRef};

lazy_static! {
    /// Library operations recognized as trusted primitives: they neither
    /// retain nor publish their arguments and their results do not alias
    /// caller state.
    static ref DEFAULT_TRUSTED: HashSet<(&'static str, &'static str)> = {
        let mut set = HashSet::new();
        set.insert(("java.lang.Object", "<init>"));
        set.insert(("java.lang.Integer", "<init>"));
        set.insert(("java.io.PrintStream", "println"));
        set
    };
}

#[derive(Debug)]
pub struct Program {
    methods: Vec<MethodRef>,
    classes: Vec<Box<str>>,
    fields: Vec<Box<str>>,
    bodies: HashMap<MethodId, Body>,
    concurrent_classes: HashSet<ClassId>,
    trusted_primitives: HashSet<MethodId>,
}

impl Default for Program {
    fn default() -> Self {
        Self::new()
    }
}

impl Program {
    pub fn new() -> Self {
        Program {
            methods: Vec::new(),
            classes: Vec::new(),
            fields: Vec::new(),
            bodies: HashMap::new(),
            concurrent_classes: HashSet::new(),
            trusted_primitives: HashSet::new(),
        }
    }

    pub fn add_class(&mut self, name: &str) -> ClassId {
        if let Some(pos) = self.classes.iter().position(|c| &**c == name) {
            return ClassId(pos as u32);
        }
        self.classes.push(name.into());
        ClassId((self.classes.len() - 1) as u32)
    }

    pub fn intern_field(&mut self, name: &str) -> FieldId {
        if let Some(pos) = self.fields.iter().position(|f| &**f == name) {
            return FieldId(pos as u32);
        }
        self.fields.push(name.into());
        FieldId((self.fields.len() - 1) as u32)
    }

    pub fn add_method(&mut self, class: ClassId, name: &str) -> MethodId {
        self.methods.push(MethodRef::new(class, name, false));
        MethodId((self.methods.len() - 1) as u32)
    }

    /// Declares an opaque library method. Methods on the built-in trusted
    /// allow-list are marked trusted automatically.
    pub fn add_library_method(&mut self, class: ClassId, name: &str) -> MethodId {
        self.methods.push(MethodRef::new(class, name, true));
        let id = MethodId((self.methods.len() - 1) as u32);
        let class_name = &*self.classes[class.index()];
        if DEFAULT_TRUSTED.contains(&(class_name, name)) {
            self.trusted_primitives.insert(id);
        }
        id
    }

    pub fn set_body(&mut self, method: MethodId, body: Body) {
        self.bodies.insert(method, body);
    }

    pub fn mark_concurrent(&mut self, class: ClassId) {
        self.concurrent_classes.insert(class);
    }

    pub fn mark_trusted(&mut self, method: MethodId) {
        self.trusted_primitives.insert(method);
    }

    /// External predicate: does instantiating `class` spawn concurrent
    /// execution (thread-like types)?
    pub fn is_concurrent_type(&self, class: ClassId) -> bool {
        self.concurrent_classes.contains(&class)
    }

    /// External predicate: is `method` a recognized trusted primitive
    /// operation?
    pub fn is_trusted_primitive(&self, method: MethodId) -> bool {
        self.trusted_primitives.contains(&method)
    }

    pub fn has_body(&self, method: MethodId) -> bool {
        self.bodies.contains_key(&method)
    }

    pub fn body(&self, method: MethodId) -> Option<&Body> {
        self.bodies.get(&method)
    }

    pub fn bodies(&self) -> impl Iterator<Item = (MethodId, &Body)> {
        self.bodies.iter().map(|(m, b)| (*m, b))
    }

    pub fn method(&self, method: MethodId) -> &MethodRef {
        &self.methods[method.index()]
    }

    pub fn method_count(&self) -> usize {
        self.methods.len()
    }

    pub fn class_name(&self, class: ClassId) -> &str {
        &self.classes[class.index()]
    }

    pub fn field_name(&self, field: FieldId) -> &str {
        if field == ARRAY_ELEM {
            "[]"
        } else {
            &self.fields[field.index()]
        }
    }

    /// `Class::name` rendering used by dumps and error messages.
    pub fn method_name(&self, method: MethodId) -> String {
        let m = self.method(method);
        format!("{}::{}", self.class_name(m.class), m.name)
    }
}
