// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::{Context, Result};
use itertools::Itertools;
use log::*;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};

use crate::escape::resolver::ResolutionStatus;
use crate::escape::AnalysisResults;
use crate::graph::ptg::ObjectNode;
use crate::mir::method::MethodId;
use crate::mir::program::Program;
use crate::summary::MethodSummary;
use crate::util::options::AnalysisOptions;

pub fn dump_results(
    program: &Program,
    results: &AnalysisResults,
    options: &AnalysisOptions,
) -> Result<()> {
    if let Some(raw_output) = &options.raw_output {
        info!("Dumping raw summaries...");
        dump_summaries(program, &results.raw_summaries, None, raw_output)?;
    }
    if let Some(solved_output) = &options.solved_output {
        info!("Dumping resolved summaries...");
        dump_summaries(
            program,
            &results.solved_summaries,
            Some(&results.resolution),
            solved_output,
        )?;
    }
    if let Some(ptg_output) = &options.ptg_output {
        info!("Dumping points-to graphs...");
        dump_ptgs(program, results, ptg_output)?;
    }
    Ok(())
}

fn dump_summaries(
    program: &Program,
    summaries: &HashMap<MethodId, MethodSummary>,
    resolution: Option<&HashMap<MethodId, HashMap<ObjectNode, ResolutionStatus>>>,
    output: &str,
) -> Result<()> {
    let file = File::create(output).with_context(|| format!("cannot create {}", output))?;
    let mut writer = BufWriter::new(file);
    for method in summaries.keys().copied().sorted() {
        writeln!(writer, "{} {{", program.method_name(method))?;
        let summary = &summaries[&method];
        for obj in summary.keys().copied().sorted() {
            match resolution.and_then(|r| r.get(&method)).and_then(|t| t.get(&obj)) {
                Some(status) => {
                    writeln!(writer, "    {} = {}  [{:?}]", obj, summary[&obj], status)?
                }
                None => writeln!(writer, "    {} = {}", obj, summary[&obj])?,
            }
        }
        writeln!(writer, "}}")?;
    }
    Ok(())
}

fn dump_ptgs(program: &Program, results: &AnalysisResults, output: &str) -> Result<()> {
    let file = File::create(output).with_context(|| format!("cannot create {}", output))?;
    let mut writer = BufWriter::new(file);
    for method in results.ptgs.keys().copied().sorted() {
        let ptg = &results.ptgs[&method];
        writeln!(writer, "{} {{", program.method_name(method))?;
        for local in ptg.vars.keys().copied().sorted() {
            let objs = ptg.vars[&local].iter().sorted().join(", ");
            writeln!(writer, "    {:?} -> {{{}}}", local, objs)?;
        }
        for obj in ptg.fields.keys().copied().sorted() {
            let field_map = &ptg.fields[&obj];
            for field in field_map.keys().copied().sorted() {
                let targets = field_map[&field].iter().sorted().join(", ");
                writeln!(
                    writer,
                    "    {}.{} -> {{{}}}",
                    obj,
                    program.field_name(field),
                    targets
                )?;
            }
        }
        writeln!(writer, "}}")?;
    }
    Ok(())
}
