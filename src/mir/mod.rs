// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

//! The abstract program representation handed over by the front end:
//! methods, classes, statement bodies and the external classification
//! predicates.

pub mod body;
pub mod loader;
pub mod method;
pub mod program;
