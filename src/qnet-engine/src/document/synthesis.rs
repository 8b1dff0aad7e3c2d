// Copyright 2021 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Builds the experiment program: one loop per sweep axis around a
//! solve, printing every result column after each successful solve.

use qnet_core::expr::{BinaryOp, Environment, Expr, ExprRef};
use qnet_core::program::{Program, Stmt};

use super::Document;
use super::whatif::Comprehension;

/// Iteration counter maintained by the loop body.
const COUNTER: &str = "_0";
const SEPARATOR: &str = ", ";

/// A statement printing `text` on a line of its own.
pub(crate) fn print_line(text: &str) -> Stmt {
    Stmt::Print {
        separator: None,
        args: vec![Expr::string(text)],
    }
}

impl Document {
    /// True when output is one row per station rather than one row per
    /// solve.
    fn rows_by_station(&self) -> bool {
        self.independent_variables.is_empty() && !self.station_index.is_empty()
    }

    pub fn program(&self) -> Program {
        let mut program = Program::new();
        program.extend(self.prologue.iter().cloned());
        if self.gnuplot.is_empty() {
            program.push(self.print_csv_header());
        } else {
            program.push(print_line("$DATA << EOF"));
        }
        program.push(Stmt::Assign(COUNTER.to_owned(), Expr::constant(0.0)));
        program.push(self.foreach_loop(&self.whatifs));
        if !self.gnuplot.is_empty() {
            program.push(print_line("EOF"));
            program.extend(self.gnuplot.iter().cloned());
        }
        program
    }

    /// Nests one loop per axis around the loop body; the first axis is
    /// the innermost loop.
    fn foreach_loop(&self, axes: &[Comprehension]) -> Stmt {
        match axes.split_last() {
            None => Stmt::Block(self.loop_body()),
            Some((outer, inner)) => outer.collect(vec![self.foreach_loop(inner)]),
        }
    }

    fn loop_body(&self) -> Vec<Stmt> {
        let mut body = vec![Stmt::Assign(
            COUNTER.to_owned(),
            Expr::op2(
                BinaryOp::Add,
                Expr::var(COUNTER, false),
                Expr::constant(1.0),
            ),
        )];
        body.extend(self.whatif_body.iter().cloned());
        body.push(Stmt::If {
            cond: Expr::call("solve", vec![]),
            then: self.solve_success(),
            otherwise: self.solve_failure(),
        });
        body
    }

    fn solve_success(&self) -> Vec<Stmt> {
        let mut block: Vec<Stmt> = self
            .result_variables
            .iter()
            .filter_map(|r| r.extract.clone())
            .collect();

        let mut rows: Vec<Vec<ExprRef>> = vec![];
        if self.rows_by_station() {
            let labels = self.station_columns();
            for (station, columns) in self.station_rows() {
                let mut row = vec![Expr::string(station)];
                for label in labels.iter() {
                    row.push(match columns.iter().find(|(l, _)| l == label) {
                        Some((_, name)) => Expr::var(name, false),
                        None => Expr::string(""),
                    });
                }
                rows.push(row);
            }
        } else {
            rows.push(
                self.result_variables
                    .iter()
                    .map(|r| Expr::var(&r.name, false))
                    .collect(),
            );
        }

        block.extend(rows.into_iter().filter(|row| !row.is_empty()).map(|args| {
            Stmt::Print {
                separator: Some(SEPARATOR.to_owned()),
                args,
            }
        }));
        block
    }

    fn solve_failure(&self) -> Vec<Stmt> {
        vec![Stmt::Print {
            separator: None,
            args: vec![
                Expr::string("solver failed: $0="),
                Expr::var(COUNTER, false),
            ],
        }]
    }

    /// Each station and its result variables, labelled by the variable
    /// name without the station.
    fn station_rows(&self) -> Vec<(&str, Vec<(String, &str)>)> {
        let mut rows: Vec<(&str, Vec<(String, &str)>)> = vec![];
        for result in self.result_variables.iter() {
            let station = match self.station_index.get(&result.name) {
                Some(station) => station.as_str(),
                None => break,
            };
            if rows.last().map(|(s, _)| *s) != Some(station) {
                rows.push((station, vec![]));
            }
            let suffix = format!("_{}", station.replace(' ', "_"));
            let label = result.name.replacen(&suffix, "", 1);
            if let Some((_, columns)) = rows.last_mut() {
                columns.push((label, result.name.as_str()));
            }
        }
        rows
    }

    /// Labels of the per-station columns: those of the station with the
    /// most columns, then any others in order of appearance.
    fn station_columns(&self) -> Vec<String> {
        let rows = self.station_rows();
        let mut labels: Vec<String> = rows
            .iter()
            .max_by_key(|(_, columns)| columns.len())
            .map(|(_, columns)| columns.iter().map(|(label, _)| label.clone()).collect())
            .unwrap_or_default();
        for (_, columns) in rows.iter() {
            for (label, _) in columns.iter() {
                if !labels.contains(label) {
                    labels.push(label.clone());
                }
            }
        }
        labels
    }

    /// Column titles of the CSV output.
    pub fn csv_header(&self) -> Vec<String> {
        if !self.rows_by_station() {
            return self
                .result_variables
                .iter()
                .map(|r| r.name.clone())
                .collect();
        }
        let mut header = vec!["Station".to_owned()];
        header.extend(self.station_columns());
        header
    }

    pub fn csv_header_line(&self) -> String {
        self.csv_header().join(SEPARATOR)
    }

    fn print_csv_header(&self) -> Stmt {
        Stmt::Print {
            separator: Some(SEPARATOR.to_owned()),
            args: self.csv_header().iter().map(|s| Expr::string(s)).collect(),
        }
    }

    /// Input variables that nothing in the document binds.
    pub fn undefined_external_variables(&self) -> Vec<String> {
        self.vars
            .input_variables()
            .iter()
            .filter(|name| !self.vars.is_owned(name))
            .filter(|name| self.whatif(name).is_none())
            .filter(|name| !self.independent_variables.contains(name))
            .cloned()
            .collect()
    }

    /// Variable values of the first point of the sweep.
    pub fn environment(&self) -> Environment {
        let mut env = Environment::new();
        for axis in self.whatifs.iter() {
            if let Some(value) = axis.value(0) {
                env.set(axis.name(), value);
            }
        }
        for stmt in self.prologue.iter().chain(self.whatif_body.iter()) {
            if let Stmt::Assign(name, value) = stmt {
                if let Ok(value) = value.eval_number(&mut env) {
                    env.set(name, value);
                }
            }
        }
        env
    }

    /// Numeric value of `expr` at the first point of the sweep; unbound
    /// variables count as zero.
    pub fn value_of(&self, expr: &ExprRef) -> f64 {
        if let Some(value) = expr.as_const() {
            return value;
        }
        let mut env = self.environment();
        expr.eval_number(&mut env).unwrap_or(0.0)
    }
}
