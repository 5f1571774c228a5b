// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

//! The main routine of `rupea`.
//!
//! Loads a serialized program document, runs both analysis phases and
//! writes whatever outputs the options request.

use anyhow::Result;
use log::*;
use std::env;
use std::path::Path;
use std::time::Instant;

use rupea::escape::EscapeAnalysis;
use rupea::mir::loader;
use rupea::util::options::AnalysisOptions;
use rupea::util::results_dumper;
use rupea::util::stats::AnalysisStats;

fn main() {
    // Initialize loggers.
    if env::var("RUPEA_LOG").is_ok() {
        let e = env_logger::Env::new()
            .filter("RUPEA_LOG")
            .write_style("RUPEA_LOG_STYLE");
        env_logger::init_from_env(e);
    }

    let mut options = AnalysisOptions::default();
    let args = env::args().skip(1).collect::<Vec<_>>();
    options.parse_from_args(&args);
    info!("Options: {:?}", options);

    if let Err(e) = run(&options) {
        error!("{:#}", e);
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(options: &AnalysisOptions) -> Result<()> {
    let start = Instant::now();
    let program = loader::load_program(Path::new(&options.input))?;
    info!("Loaded {} method(s)", program.method_count());

    let results = EscapeAnalysis::new(&program).analyze()?;
    results_dumper::dump_results(&program, &results, options)?;

    if options.dump_stats {
        AnalysisStats::new(&results, start.elapsed()).dump_stats();
    }
    Ok(())
}
