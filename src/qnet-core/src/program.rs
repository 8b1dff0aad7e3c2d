// Copyright 2021 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Statements of a synthesized experiment program and a small
//! interpreter that runs one against a [`Solver`].

use std::fmt;
use std::io::Write;

use tracing::debug;

use crate::common::Result;
use crate::expr::{Environment, ExprRef, Scope, Target, Value};
use crate::model::{Model, ResultKind};
use crate::program_err;

#[derive(Clone, Debug, PartialEq)]
pub enum Stmt {
    Assign(String, ExprRef),
    If {
        cond: ExprRef,
        then: Vec<Stmt>,
        otherwise: Vec<Stmt>,
    },
    Foreach {
        var: String,
        values: Vec<f64>,
        body: Vec<Stmt>,
    },
    /// Prints `args` joined by `separator`, followed by a newline.
    Print {
        separator: Option<String>,
        args: Vec<ExprRef>,
    },
    Block(Vec<Stmt>),
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Program {
    pub stmts: Vec<Stmt>,
}

impl Program {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn push(&mut self, stmt: Stmt) {
        self.stmts.push(stmt);
    }

    pub fn extend<I: IntoIterator<Item = Stmt>>(&mut self, stmts: I) {
        self.stmts.extend(stmts);
    }

    /// Number of loops anywhere in the program.
    pub fn loop_count(&self) -> usize {
        fn count(stmts: &[Stmt]) -> usize {
            stmts
                .iter()
                .map(|stmt| match stmt {
                    Stmt::Foreach { body, .. } => 1 + count(body),
                    Stmt::If {
                        then, otherwise, ..
                    } => count(then) + count(otherwise),
                    Stmt::Block(body) => count(body),
                    _ => 0,
                })
                .sum()
        }
        count(&self.stmts)
    }
}

fn write_indent(f: &mut fmt::Formatter, depth: usize) -> fmt::Result {
    write!(f, "{:width$}", "", width = depth * 4)
}

fn write_block(f: &mut fmt::Formatter, stmts: &[Stmt], depth: usize) -> fmt::Result {
    for stmt in stmts {
        write_stmt(f, stmt, depth)?;
    }
    Ok(())
}

fn write_stmt(f: &mut fmt::Formatter, stmt: &Stmt, depth: usize) -> fmt::Result {
    match stmt {
        Stmt::Assign(name, value) => {
            write_indent(f, depth)?;
            writeln!(f, "{name} = {value};")
        }
        Stmt::If {
            cond,
            then,
            otherwise,
        } => {
            write_indent(f, depth)?;
            writeln!(f, "if ({cond}) {{")?;
            write_block(f, then, depth + 1)?;
            if !otherwise.is_empty() {
                write_indent(f, depth)?;
                writeln!(f, "}} else {{")?;
                write_block(f, otherwise, depth + 1)?;
            }
            write_indent(f, depth)?;
            writeln!(f, "}}")
        }
        Stmt::Foreach { var, values, body } => {
            write_indent(f, depth)?;
            let values = values
                .iter()
                .map(|v| crate::expr::fmt_real(*v))
                .collect::<Vec<_>>()
                .join(", ");
            writeln!(f, "foreach ({var} in [{values}]) {{")?;
            write_block(f, body, depth + 1)?;
            write_indent(f, depth)?;
            writeln!(f, "}}")
        }
        Stmt::Print { separator, args } => {
            write_indent(f, depth)?;
            write!(f, "println(")?;
            if let Some(separator) = separator {
                write!(f, "{:?}, ", separator)?;
            }
            for (i, arg) in args.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{arg}")?;
            }
            writeln!(f, ");")
        }
        Stmt::Block(body) => {
            write_indent(f, depth)?;
            writeln!(f, "{{")?;
            write_block(f, body, depth + 1)?;
            write_indent(f, depth)?;
            writeln!(f, "}}")
        }
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write_block(f, &self.stmts, 0)
    }
}

/// The analytic solver a program drives.
pub trait Solver {
    /// Solves `model` with its variables bound by `env`.
    fn solve(&mut self, model: &Model, env: &Environment) -> bool;
    /// A result of the last successful solve.
    fn result(&self, target: &Target, kind: ResultKind) -> Option<f64>;
}

pub struct Interpreter<'a, S: Solver, W: Write> {
    model: &'a Model,
    solver: S,
    out: W,
    env: Environment,
}

impl<'a, S: Solver, W: Write> Interpreter<'a, S, W> {
    pub fn new(model: &'a Model, solver: S, out: W) -> Self {
        Interpreter {
            model,
            solver,
            out,
            env: Environment::new(),
        }
    }

    /// Pre-binds an external variable.
    pub fn bind(&mut self, name: &str, value: f64) {
        self.env.set(name, value);
    }

    pub fn environment(&self) -> &Environment {
        &self.env
    }

    pub fn into_output(self) -> W {
        self.out
    }

    pub fn run(&mut self, program: &Program) -> Result<()> {
        self.exec_block(&program.stmts)
    }

    fn exec_block(&mut self, stmts: &[Stmt]) -> Result<()> {
        for stmt in stmts {
            self.exec(stmt)?;
        }
        Ok(())
    }

    fn exec(&mut self, stmt: &Stmt) -> Result<()> {
        match stmt {
            Stmt::Assign(name, value) => {
                let value = value.eval_number(self)?;
                self.env.set(name, value);
            }
            Stmt::If {
                cond,
                then,
                otherwise,
            } => {
                if cond.eval(self)?.is_true() {
                    self.exec_block(then)?;
                } else {
                    self.exec_block(otherwise)?;
                }
            }
            Stmt::Foreach { var, values, body } => {
                for value in values.iter() {
                    self.env.set(var, *value);
                    self.exec_block(body)?;
                }
            }
            Stmt::Print { separator, args } => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args.iter() {
                    values.push(arg.eval(self)?.to_string());
                }
                let line = values.join(separator.as_deref().unwrap_or(""));
                writeln!(self.out, "{line}")?;
            }
            Stmt::Block(body) => self.exec_block(body)?,
        }
        Ok(())
    }
}

impl<S: Solver, W: Write> Scope for Interpreter<'_, S, W> {
    fn get(&self, name: &str) -> Option<Value> {
        self.env.get(name)
    }

    fn call(&mut self, name: &str, args: &[Value]) -> Result<Value> {
        let string_arg = |i: usize| match args.get(i) {
            Some(Value::Str(s)) => Ok(s.clone()),
            _ => program_err!(TypeMismatch, format!("{name} expects a name argument")),
        };
        match name {
            "solve" => {
                let ok = self.solver.solve(self.model, &self.env);
                debug!(ok = ok, "solve");
                Ok(Value::Bool(ok))
            }
            "station" => Ok(Value::Object(Target::Station(string_arg(0)?))),
            "chain" => Ok(Value::Object(Target::Chain(string_arg(0)?))),
            "class" => match args.first() {
                Some(Value::Object(Target::Station(station))) => Ok(Value::Object(Target::Class {
                    station: station.clone(),
                    class: string_arg(1)?,
                })),
                _ => program_err!(TypeMismatch, "class expects a station".to_owned()),
            },
            _ => program_err!(UndefinedSymbol, format!("unknown function {name}")),
        }
    }

    fn property(&mut self, object: &Target, name: &str) -> Result<Value> {
        let kind = match ResultKind::from_property(name) {
            Some(kind) => kind,
            None => return program_err!(UndefinedSymbol, format!("{object}.{name}")),
        };
        match self.solver.result(object, kind) {
            Some(value) => Ok(Value::Number(value)),
            None => program_err!(SolverFailed, format!("no {name} for {object}")),
        }
    }
}
