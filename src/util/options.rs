// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

//! Analysis options.

use clap::{Arg, Command};

const RUPEA_USAGE: &str = r#"rupea [OPTIONS] INPUT"#;

/// Creates the clap::Command metadata for argument parsing.
fn make_options_parser() -> Command<'static> {
    Command::new("rupea")
        .no_binary_name(true)
        .override_usage(RUPEA_USAGE)
        .version(env!("CARGO_PKG_VERSION"))
        .arg(Arg::new("raw-output")
            .long("dump-raw")
            .takes_value(true)
            .help("Dump the raw (unresolved) per-method summaries to the output file."))
        .arg(Arg::new("solved-output")
            .long("dump-solved")
            .takes_value(true)
            .help("Dump the resolved per-method summaries to the output file."))
        .arg(Arg::new("ptg-output")
            .long("dump-ptg")
            .takes_value(true)
            .help("Dump the exit-point points-to graph of every analyzed method."))
        .arg(Arg::new("dump-stats")
            .long("dump-stats")
            .takes_value(false)
            .help("Dump the statistics of the analysis results."))
        .arg(Arg::new("INPUT")
            .required(true)
            .help("The program document to be analyzed."))
}

#[derive(Clone, Debug)]
pub struct AnalysisOptions {
    pub input: String,

    pub dump_stats: bool,
    pub raw_output: Option<String>,
    pub solved_output: Option<String>,
    pub ptg_output: Option<String>,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            input: String::new(),
            dump_stats: false,
            raw_output: None,
            solved_output: None,
            ptg_output: None,
        }
    }
}

impl AnalysisOptions {
    /// Parses options from a list of strings, exiting with diagnostics on
    /// invalid input.
    pub fn parse_from_args(&mut self, args: &[String]) {
        let matches = match make_options_parser().try_get_matches_from(args.iter()) {
            Ok(matches) => matches,
            Err(e) => e.exit(),
        };

        if let Some(input) = matches.get_one::<String>("INPUT") {
            self.input = input.clone();
        }
        self.dump_stats = matches.contains_id("dump-stats");
        self.raw_output = matches.get_one::<String>("raw-output").cloned();
        self.solved_output = matches.get_one::<String>("solved-output").cloned();
        self.ptg_output = matches.get_one::<String>("ptg-output").cloned();
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parses_outputs_and_flags() {
        let mut options = AnalysisOptions::default();
        options.parse_from_args(&args(&[
            "--dump-solved",
            "solved.txt",
            "--dump-stats",
            "program.json",
        ]));
        assert_eq!(options.input, "program.json");
        assert_eq!(options.solved_output.as_deref(), Some("solved.txt"));
        assert!(options.dump_stats);
        assert!(options.raw_output.is_none());
    }
}
