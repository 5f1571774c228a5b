// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

//! JSON front end. A front end (typically a bytecode lifter) serializes
//! the program as one document: class and method declarations plus one
//! statement list and edge list per analyzed body. The loader interns
//! names, resolves callees and rejects anything it cannot classify.

use anyhow::{anyhow, bail, Context, Result};
use petgraph::graph::NodeIndex;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::mir::body::{Body, Local, SiteId, Statement};
use crate::mir::method::MethodId;
use crate::mir::program::Program;

#[derive(Deserialize)]
struct ProgramDoc {
    #[serde(default)]
    concurrent_classes: Vec<String>,
    methods: Vec<MethodDoc>,
}

#[derive(Deserialize)]
struct MethodDoc {
    class: String,
    name: String,
    #[serde(default)]
    library: bool,
    #[serde(default)]
    trusted: bool,
    body: Option<BodyDoc>,
}

#[derive(Deserialize)]
struct BodyDoc {
    params: u32,
    locals: u32,
    statements: Vec<StmtDoc>,
    #[serde(default)]
    edges: Vec<(usize, usize)>,
}

#[derive(Deserialize)]
struct StmtDoc {
    op: String,
    site: Option<u32>,
    lhs: Option<u32>,
    base: Option<u32>,
    rhs: Option<u32>,
    value: Option<u32>,
    field: Option<String>,
    class: Option<String>,
    callee: Option<String>,
    #[serde(default)]
    args: Vec<u32>,
}

pub fn load_program(path: &Path) -> Result<Program> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("cannot read program file {}", path.display()))?;
    parse_program(&text)
}

pub fn parse_program(text: &str) -> Result<Program> {
    let doc: ProgramDoc = serde_json::from_str(text).context("malformed program document")?;
    let mut program = Program::new();

    for class in &doc.concurrent_classes {
        let id = program.add_class(class);
        program.mark_concurrent(id);
    }

    // Declarations first, so bodies can reference any method.
    let mut by_name: HashMap<String, MethodId> = HashMap::new();
    for m in &doc.methods {
        let class = program.add_class(&m.class);
        let id = if m.library {
            program.add_library_method(class, &m.name)
        } else {
            program.add_method(class, &m.name)
        };
        if m.trusted {
            program.mark_trusted(id);
        }
        if by_name.insert(format!("{}::{}", m.class, m.name), id).is_some() {
            bail!("duplicate declaration of {}::{}", m.class, m.name);
        }
    }

    for m in &doc.methods {
        let body_doc = match &m.body {
            Some(body_doc) => body_doc,
            None => continue,
        };
        let id = by_name[&format!("{}::{}", m.class, m.name)];
        let body = build_body(&mut program, body_doc, &by_name)
            .with_context(|| format!("in body of {}::{}", m.class, m.name))?;
        body.validate()
            .with_context(|| format!("in body of {}::{}", m.class, m.name))?;
        program.set_body(id, body);
    }
    Ok(program)
}

fn build_body(
    program: &mut Program,
    doc: &BodyDoc,
    by_name: &HashMap<String, MethodId>,
) -> Result<Body> {
    let mut body = Body::new(doc.params, doc.locals);
    let mut points: Vec<NodeIndex> = Vec::with_capacity(doc.statements.len());
    for (index, stmt) in doc.statements.iter().enumerate() {
        let site = stmt.site.map_or(SiteId::INVALID, SiteId);
        let kind = classify(program, stmt, by_name)
            .with_context(|| format!("statement {} ({:?})", index, stmt.op))?;
        points.push(body.add_stmt(site, kind));
    }
    for &(from, to) in &doc.edges {
        let from = *points
            .get(from)
            .ok_or_else(|| anyhow!("edge source {} out of range", from))?;
        let to = *points
            .get(to)
            .ok_or_else(|| anyhow!("edge target {} out of range", to))?;
        body.add_edge(from, to);
    }
    Ok(body)
}

fn classify(
    program: &mut Program,
    stmt: &StmtDoc,
    by_name: &HashMap<String, MethodId>,
) -> Result<Statement> {
    let local = |operand: Option<u32>, role: &str| -> Result<Local> {
        operand.map(Local).ok_or_else(|| anyhow!("missing {} operand", role))
    };
    Ok(match stmt.op.as_str() {
        "alloc" => {
            let class = stmt
                .class
                .as_deref()
                .ok_or_else(|| anyhow!("missing class operand"))?;
            Statement::AllocObject {
                lhs: local(stmt.lhs, "lhs")?,
                class: program.add_class(class),
            }
        }
        "alloc_array" => Statement::AllocArray { lhs: local(stmt.lhs, "lhs")? },
        "copy" => Statement::Copy {
            lhs: local(stmt.lhs, "lhs")?,
            rhs: local(stmt.rhs, "rhs")?,
        },
        "const_string" => Statement::ConstString { lhs: local(stmt.lhs, "lhs")? },
        "const_class" => Statement::ConstClass { lhs: local(stmt.lhs, "lhs")? },
        "load" => {
            let field = stmt
                .field
                .as_deref()
                .ok_or_else(|| anyhow!("missing field operand"))?;
            Statement::FieldLoad {
                lhs: local(stmt.lhs, "lhs")?,
                base: local(stmt.base, "base")?,
                field: program.intern_field(field),
            }
        }
        "store" => {
            let field = stmt
                .field
                .as_deref()
                .ok_or_else(|| anyhow!("missing field operand"))?;
            Statement::FieldStore {
                base: local(stmt.base, "base")?,
                field: program.intern_field(field),
                rhs: local(stmt.rhs, "rhs")?,
            }
        }
        "static_load" => Statement::StaticLoad { lhs: local(stmt.lhs, "lhs")? },
        "static_store" => Statement::StaticStore { rhs: local(stmt.rhs, "rhs")? },
        "array_load" => Statement::ArrayLoad {
            lhs: local(stmt.lhs, "lhs")?,
            base: local(stmt.base, "base")?,
        },
        "array_store" => Statement::ArrayStore {
            base: local(stmt.base, "base")?,
            rhs: local(stmt.rhs, "rhs")?,
        },
        "invoke" => {
            let callee = stmt
                .callee
                .as_deref()
                .ok_or_else(|| anyhow!("missing callee operand"))?;
            let callee = *by_name
                .get(callee)
                .ok_or_else(|| anyhow!("unknown callee {:?}", callee))?;
            Statement::Invoke {
                lhs: stmt.lhs.map(Local),
                callee,
                args: stmt.args.iter().copied().map(Local).collect(),
            }
        }
        "return" => Statement::Return { value: stmt.value.map(Local) },
        "throw" => Statement::Throw { value: local(stmt.value, "value")? },
        "monitor_enter" => Statement::MonitorEnter { value: local(stmt.value, "value")? },
        "monitor_exit" => Statement::MonitorExit { value: local(stmt.value, "value")? },
        // control-only statements carry no dataflow
        "nop" | "branch" | "goto" | "if" | "switch" => Statement::Nop,
        other => bail!("unrecognized statement op {:?}", other),
    })
}
