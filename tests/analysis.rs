// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.
//
// End-to-end runs over serialized program documents.

use rupea::escape::resolver::ResolutionStatus;
use rupea::escape::EscapeAnalysis;
use rupea::graph::ptg::{ObjectKind, ObjectNode};
use rupea::mir::body::SiteId;
use rupea::mir::loader::parse_program;
use rupea::mir::method::MethodId;

fn internal(site: u32) -> ObjectNode {
    ObjectNode::new(SiteId(site), ObjectKind::Internal)
}

#[test]
fn confined_escaping_and_conditional_objects() {
    // run() { a = new Main; b = new Thread; STATIC = c; c = new Main;
    //         STATIC = c; helper(a); }
    // helper(p0) { }
    let text = r#"{
        "concurrent_classes": ["java.lang.Thread"],
        "methods": [
            {
                "class": "Main", "name": "run",
                "body": {
                    "params": 0, "locals": 3,
                    "statements": [
                        {"op": "alloc", "site": 0, "lhs": 0, "class": "Main"},
                        {"op": "alloc", "site": 1, "lhs": 1, "class": "java.lang.Thread"},
                        {"op": "alloc", "site": 2, "lhs": 2, "class": "Main"},
                        {"op": "static_store", "site": 3, "rhs": 2},
                        {"op": "invoke", "site": 4, "callee": "Main::helper", "args": [0]},
                        {"op": "return", "site": 5}
                    ],
                    "edges": [[0, 1], [1, 2], [2, 3], [3, 4], [4, 5]]
                }
            },
            {
                "class": "Main", "name": "helper",
                "body": {
                    "params": 1, "locals": 1,
                    "statements": [{"op": "return", "site": 0}],
                    "edges": []
                }
            }
        ]
    }"#;
    let program = parse_program(text).unwrap();
    let results = EscapeAnalysis::new(&program).analyze().unwrap();

    let run = MethodId(0);
    let solved = &results.solved_summaries[&run];
    // passed only to a harmless helper
    assert!(solved[&internal(0)].contains_no_escape());
    // thread-like allocation escapes at the site
    assert!(solved[&internal(1)].does_escape());
    // published through a global
    assert!(solved[&internal(2)].does_escape());
    for obj in [internal(0), internal(1), internal(2)] {
        assert_eq!(results.resolution[&run][&obj], ResolutionStatus::Resolved);
    }
}

#[test]
fn escape_flows_back_through_the_call_chain() {
    // make() { x = new Main; return x; }
    // run()  { y = make(); STATIC = y; }
    let text = r#"{
        "methods": [
            {
                "class": "Main", "name": "make",
                "body": {
                    "params": 0, "locals": 1,
                    "statements": [
                        {"op": "alloc", "site": 0, "lhs": 0, "class": "Main"},
                        {"op": "return", "site": 1, "value": 0}
                    ],
                    "edges": [[0, 1]]
                }
            },
            {
                "class": "Main", "name": "run",
                "body": {
                    "params": 0, "locals": 1,
                    "statements": [
                        {"op": "invoke", "site": 0, "lhs": 0, "callee": "Main::make"},
                        {"op": "static_store", "site": 1, "rhs": 0},
                        {"op": "return", "site": 2}
                    ],
                    "edges": [[0, 1], [1, 2]]
                }
            }
        ]
    }"#;
    let program = parse_program(text).unwrap();
    let results = EscapeAnalysis::new(&program).analyze().unwrap();

    let make = MethodId(0);
    // the caller leaked the returned object
    assert!(results.solved_summaries[&make][&internal(0)].does_escape());
    assert!(results.raw_summaries[&make][&internal(0)].contains_conditional());
}

#[test]
fn branches_merge_conservatively() {
    // run(p0) { if (..) x = new Main; else x = p0; STATIC = x; }
    let text = r#"{
        "methods": [{
            "class": "Main", "name": "run",
            "body": {
                "params": 1, "locals": 2,
                "statements": [
                    {"op": "if", "site": 0},
                    {"op": "alloc", "site": 1, "lhs": 1, "class": "Main"},
                    {"op": "copy", "site": 2, "lhs": 1, "rhs": 0},
                    {"op": "static_store", "site": 3, "rhs": 1},
                    {"op": "return", "site": 4}
                ],
                "edges": [[0, 1], [0, 2], [1, 3], [2, 3], [3, 4]]
            }
        }]
    }"#;
    let program = parse_program(text).unwrap();
    let results = EscapeAnalysis::new(&program).analyze().unwrap();

    let run = MethodId(0);
    // both arms reach the global store
    assert!(results.solved_summaries[&run][&internal(1)].does_escape());
    assert!(results.solved_summaries[&run][&ObjectNode::parameter(0)].does_escape());
}

#[test]
fn trusted_library_calls_do_not_taint_arguments() {
    let text = r#"{
        "methods": [
            {
                "class": "Main", "name": "run",
                "body": {
                    "params": 0, "locals": 1,
                    "statements": [
                        {"op": "alloc", "site": 0, "lhs": 0, "class": "Main"},
                        {"op": "invoke", "site": 1, "callee": "java.io.PrintStream::println", "args": [0]},
                        {"op": "return", "site": 2}
                    ],
                    "edges": [[0, 1], [1, 2]]
                }
            },
            {"class": "java.io.PrintStream", "name": "println", "library": true}
        ]
    }"#;
    let program = parse_program(text).unwrap();
    let results = EscapeAnalysis::new(&program).analyze().unwrap();

    let run = MethodId(0);
    assert!(results.solved_summaries[&run][&internal(0)].contains_no_escape());
}
