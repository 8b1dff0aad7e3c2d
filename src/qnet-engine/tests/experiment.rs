// Copyright 2021 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Synthesized programs run end to end against a stand-in solver.

use std::collections::HashMap;

use float_cmp::approx_eq;

use qnet_core::expr::{Environment, Target};
use qnet_core::model::{Bound, Model, ResultKind};
use qnet_core::program::{Interpreter, Solver};
use qnet_engine::writer::table::read_table;
use qnet_engine::{Document, Options};

fn load(name: &str) -> Document {
    let path = format!("{}/tests/models/{}", env!("CARGO_MANIFEST_DIR"), name);
    Document::load(&path, Options::default()).unwrap_or_else(|e| panic!("{path}: {e}"))
}

/// Reports the asymptotic throughput bound `min(N/(D+Z), 1/Dmax)` for
/// every closed chain and zero for everything else.  Fails when a
/// parameter cannot be evaluated.
#[derive(Default)]
struct BoundSolver {
    throughput: HashMap<String, f64>,
}

impl Solver for BoundSolver {
    fn solve(&mut self, model: &Model, env: &Environment) -> bool {
        self.throughput.clear();
        let mut env = env.clone();
        for (name, chain) in model.chains.iter() {
            let bound = Bound::new(name, model);
            let values = (
                chain.customers().map(|n| n.eval_number(&mut env)),
                bound.d_sum().eval_number(&mut env),
                bound.z_sum().eval_number(&mut env),
                bound.d_max().eval_number(&mut env),
            );
            let (n, d, z, d_max) = match values {
                (Some(Ok(n)), Ok(d), Ok(z), Ok(d_max)) => (n, d, z, d_max),
                (None, ..) => continue,
                _ => return false,
            };
            self.throughput
                .insert(name.clone(), (n / (d + z)).min(1.0 / d_max));
        }
        true
    }

    fn result(&self, target: &Target, kind: ResultKind) -> Option<f64> {
        match (target, kind) {
            (Target::Chain(name), ResultKind::Throughput) => {
                Some(self.throughput.get(name).copied().unwrap_or(0.0))
            }
            _ => Some(0.0),
        }
    }
}

fn run(doc: &Document, bindings: &[(&str, f64)]) -> (String, usize) {
    let mut interp = Interpreter::new(doc.model(), BoundSolver::default(), Vec::new());
    for (name, value) in bindings {
        interp.bind(name, *value);
    }
    interp.run(&doc.program()).unwrap();
    let solves = interp.environment().value("_0").unwrap_or(0.0) as usize;
    let out = String::from_utf8(interp.into_output()).unwrap();
    (out, solves)
}

#[test]
fn test_customer_sweep() {
    let doc = load("closed.jmva");
    let (out, solves) = run(&doc, &[]);
    assert_eq!(5, solves);

    let table = read_table(out.as_bytes()).unwrap();
    assert_eq!(5, table.rows.len());
    let n = table.column("$N1").unwrap();
    let x = table.column("$X_users").unwrap();
    assert_eq!(vec![1.0, 2.0, 3.0, 4.0, 5.0], n);
    // D = 1.5, Z = 2, Dmax = 1
    for (n, x) in n.iter().zip(x.iter()) {
        let expected = (n / 3.5).min(1.0);
        assert!(approx_eq!(f64, expected, *x, epsilon = 1e-12), "N={n}: {x}");
    }
}

#[test]
fn test_population_mix_sweep() {
    let doc = load("mix.jmva");
    assert!(doc.undefined_external_variables().is_empty());
    let (out, _) = run(&doc, &[]);
    let table = read_table(out.as_bytes()).unwrap();
    assert_eq!(Some(vec![0.25, 0.5, 0.75]), table.column("Beta"));

    // c1 has D = 1.5 and Dmax = 1; N = round(Beta * 10)
    let x = table.column("$X_c1").unwrap();
    for (n, x) in [2.5f64.round(), 5.0, 7.5f64.round()].iter().zip(x.iter()) {
        let expected = (n / 1.5).min(1.0);
        assert!(approx_eq!(f64, expected, *x, epsilon = 1e-12), "N={n}: {x}");
    }
}

#[test]
fn test_external_variables_must_be_bound() {
    let doc = load("mixed.jmva");
    assert_eq!(vec!["$Z".to_owned()], doc.undefined_external_variables());

    // an unbound think time makes every solve fail
    let (out, _) = run(&doc, &[]);
    assert!(out.contains("solver failed: $0=1"));

    // nothing is swept, so there is one row per station
    let (out, _) = run(&doc, &[("$Z", 1.0)]);
    assert!(!out.contains("solver failed"));
    let lines: Vec<&str> = out.lines().collect();
    assert_eq!(4, lines.len());
    assert!(lines[0].starts_with("Station, "));
    assert!(lines[1].starts_with("cpu, "));
    assert!(lines[3].starts_with("terminal, "));
}

#[test]
fn test_plot_program_runs() {
    let mut doc = load("closed.jmva");
    doc.plot(ResultKind::Throughput, None).unwrap();
    let (out, _) = run(&doc, &[]);
    assert!(out.starts_with("$DATA << EOF\n"));
    assert!(out.contains("\nEOF\n"));
    assert!(out.contains("set label 2 \"N*=3.5\" at 3.5,1* 1.02,0 right"));
    assert!(out.contains("x/(3.5) with lines title \"1/(Dsum+Z)\""));
}
