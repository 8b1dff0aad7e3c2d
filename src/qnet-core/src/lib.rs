// Copyright 2021 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Collaborators of the experiment document engine: errors, expression
//! nodes, the network model store and the program interpreter.

#![forbid(unsafe_code)]

pub mod common;
pub mod expr;
pub mod model;
pub mod program;

pub use self::common::{Error, ErrorCode, ErrorKind, Result};
pub use self::expr::{Environment, Expr, ExprRef, Scope, Target, Value};
pub use self::model::{Bound, Chain, Demand, Model, ResultKind, Station, StationType};
pub use self::program::{Interpreter, Program, Solver, Stmt};
