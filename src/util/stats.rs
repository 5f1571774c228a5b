// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

use log::*;
use std::io::{BufWriter, Write};
use std::time::Duration;

use crate::escape::resolver::ResolutionStatus;
use crate::escape::AnalysisResults;

pub struct AnalysisStats<'a> {
    results: &'a AnalysisResults,
    elapsed: Duration,
}

impl<'a> AnalysisStats<'a> {
    pub fn new(results: &'a AnalysisResults, elapsed: Duration) -> Self {
        AnalysisStats { results, elapsed }
    }

    pub fn dump_stats(&self) {
        let mut stat_writer = BufWriter::new(Box::new(std::io::stdout()) as Box<dyn Write>);

        info!("Dumping escape statistics...");
        stat_writer
            .write_all("##########################################################\n".as_bytes())
            .expect("Unable to write data");
        self.dump_summary_stat(&mut stat_writer);
        stat_writer
            .write_all("----------------------------------------------------------\n".as_bytes())
            .expect("Unable to write data");
        self.dump_resolution_stat(&mut stat_writer);
        stat_writer
            .write_all(
                format!(
                    "Analysis time: {}\n",
                    humantime::format_duration(self.elapsed)
                )
                .as_bytes(),
            )
            .expect("Unable to write data");
        stat_writer
            .write_all("##########################################################\n".as_bytes())
            .expect("Unable to write data");
    }

    fn dump_summary_stat<W: Write>(&self, stat_writer: &mut BufWriter<W>) {
        let num_methods = self.results.solved_summaries.len();
        let mut num_objects = 0;
        let mut num_escaping = 0;
        let mut num_confined = 0;
        let mut num_conditional = 0;
        for summary in self.results.solved_summaries.values() {
            for status in summary.values() {
                num_objects += 1;
                if status.does_escape() {
                    num_escaping += 1;
                } else if status.contains_no_escape() {
                    num_confined += 1;
                } else {
                    num_conditional += 1;
                }
            }
        }

        stat_writer
            .write_all("Escape Statistics: \n".as_bytes())
            .expect("Unable to write data");
        stat_writer
            .write_all(format!("#Methods: {}\n", num_methods).as_bytes())
            .expect("Unable to write data");
        stat_writer
            .write_all(format!("#Objects: {}\n", num_objects).as_bytes())
            .expect("Unable to write data");
        stat_writer
            .write_all(format!("#Escaping: {}\n", num_escaping).as_bytes())
            .expect("Unable to write data");
        stat_writer
            .write_all(format!("#Confined: {}\n", num_confined).as_bytes())
            .expect("Unable to write data");
        stat_writer
            .write_all(format!("#Conditional: {}\n", num_conditional).as_bytes())
            .expect("Unable to write data");
    }

    fn dump_resolution_stat<W: Write>(&self, stat_writer: &mut BufWriter<W>) {
        let mut resolved = 0;
        let mut unresolved = 0;
        let mut caller_only = 0;
        for table in self.results.resolution.values() {
            for status in table.values() {
                match status {
                    ResolutionStatus::Resolved => resolved += 1,
                    ResolutionStatus::UnResolved => unresolved += 1,
                    ResolutionStatus::CallerOnly => caller_only += 1,
                    ResolutionStatus::Unattempted | ResolutionStatus::InProgress => {}
                }
            }
        }

        stat_writer
            .write_all("Resolution Statistics: \n".as_bytes())
            .expect("Unable to write data");
        stat_writer
            .write_all(format!("#Resolved: {}\n", resolved).as_bytes())
            .expect("Unable to write data");
        stat_writer
            .write_all(format!("#Unresolved: {}\n", unresolved).as_bytes())
            .expect("Unable to write data");
        stat_writer
            .write_all(format!("#Caller-dependent: {}\n", caller_only).as_bytes())
            .expect("Unable to write data");
    }
}
