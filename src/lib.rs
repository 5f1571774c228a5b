// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

//! Whole-program static escape analysis over compiled object-oriented
//! program bodies: a per-method worklist dataflow pass builds points-to
//! graphs and raw escape summaries, then an interprocedural resolver
//! discharges the deferred, context-dependent facts.

pub mod escape;
pub mod graph;
pub mod mir;
pub mod summary;
pub mod util;
