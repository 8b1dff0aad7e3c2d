// Copyright 2021 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Expression nodes shared between the document engine, the writers
//! and the program interpreter.
//!
//! Attribute values in a document resolve either to a constant or to a
//! named variable.  Everything else (arithmetic, function calls, object
//! property reads) is built by the engine when it synthesizes a program
//! or a bound.  Nodes are reference counted so the same logical variable
//! can be shared by several owners without copying.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use lazy_static::lazy_static;

use crate::common::Result;
use crate::program_err;

pub type ExprRef = Rc<Expr>;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOp {
    fn precedence(self) -> u8 {
        match self {
            BinaryOp::Add | BinaryOp::Sub => 1,
            BinaryOp::Mul | BinaryOp::Div => 2,
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Const(f64),
    Str(String),
    /// `external` variables are supplied from outside the program (the
    /// `$` variables of a document); internal ones are locals.
    Var {
        name: String,
        external: bool,
    },
    Op2(BinaryOp, ExprRef, ExprRef),
    Call(String, Vec<ExprRef>),
    Property(ExprRef, String),
}

/// The object a result property is read from.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Target {
    Station(String),
    Class { station: String, class: String },
    Chain(String),
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Target::Station(name) => write!(f, "station(\"{name}\")"),
            Target::Class { station, class } => {
                write!(f, "class(station(\"{station}\"), \"{class}\")")
            }
            Target::Chain(name) => write!(f, "chain(\"{name}\")"),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Number(f64),
    Str(String),
    Bool(bool),
    Object(Target),
}

impl Value {
    pub fn as_number(&self) -> Result<f64> {
        match self {
            Value::Number(n) => Ok(*n),
            Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
            other => program_err!(TypeMismatch, format!("expected a number, not {other}")),
        }
    }

    pub fn is_true(&self) -> bool {
        match self {
            Value::Number(n) => *n != 0.0,
            Value::Bool(b) => *b,
            Value::Str(s) => !s.is_empty(),
            Value::Object(_) => true,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{n}"),
            Value::Str(s) => write!(f, "{s}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Object(target) => write!(f, "{target}"),
        }
    }
}

/// Name resolution for [`Expr::eval`].  Built-in math functions are
/// handled by the evaluator itself; everything else is delegated.
pub trait Scope {
    fn get(&self, name: &str) -> Option<Value>;
    fn call(&mut self, name: &str, args: &[Value]) -> Result<Value>;
    fn property(&mut self, object: &Target, name: &str) -> Result<Value>;
}

/// A flat name to number binding, the simplest [`Scope`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Environment {
    values: HashMap<String, f64>,
}

impl Environment {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn set(&mut self, name: &str, value: f64) {
        self.values.insert(name.to_owned(), value);
    }

    pub fn value(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }
}

impl Scope for Environment {
    fn get(&self, name: &str) -> Option<Value> {
        self.values.get(name).map(|v| Value::Number(*v))
    }

    fn call(&mut self, name: &str, _args: &[Value]) -> Result<Value> {
        program_err!(UndefinedSymbol, format!("unknown function {name}"))
    }

    fn property(&mut self, object: &Target, name: &str) -> Result<Value> {
        program_err!(UndefinedSymbol, format!("{object}.{name}"))
    }
}

#[derive(Copy, Clone)]
enum Builtin {
    Round,
    Floor,
    Ceil,
    Abs,
    Min,
    Max,
}

lazy_static! {
    static ref BUILTINS: HashMap<&'static str, Builtin> = {
        let mut m = HashMap::new();
        m.insert("round", Builtin::Round);
        m.insert("floor", Builtin::Floor);
        m.insert("ceil", Builtin::Ceil);
        m.insert("abs", Builtin::Abs);
        m.insert("min", Builtin::Min);
        m.insert("max", Builtin::Max);
        m
    };
}

fn apply_builtin(builtin: Builtin, name: &str, args: &[Value]) -> Result<Value> {
    let args = args
        .iter()
        .map(|a| a.as_number())
        .collect::<Result<Vec<f64>>>()?;
    let unary = |f: fn(f64) -> f64| -> Result<Value> {
        if args.len() != 1 {
            return program_err!(TypeMismatch, format!("{name} takes one argument"));
        }
        Ok(Value::Number(f(args[0])))
    };
    match builtin {
        Builtin::Round => unary(f64::round),
        Builtin::Floor => unary(f64::floor),
        Builtin::Ceil => unary(f64::ceil),
        Builtin::Abs => unary(f64::abs),
        Builtin::Min | Builtin::Max => {
            if args.is_empty() {
                return program_err!(TypeMismatch, format!("{name} needs an argument"));
            }
            let fold: fn(f64, f64) -> f64 = if matches!(builtin, Builtin::Min) {
                f64::min
            } else {
                f64::max
            };
            let first = args[0];
            Ok(Value::Number(args[1..].iter().fold(first, |a, b| fold(a, *b))))
        }
    }
}

impl Expr {
    pub fn constant(value: f64) -> ExprRef {
        Rc::new(Expr::Const(value))
    }

    pub fn string(value: &str) -> ExprRef {
        Rc::new(Expr::Str(value.to_owned()))
    }

    pub fn var(name: &str, external: bool) -> ExprRef {
        Rc::new(Expr::Var {
            name: name.to_owned(),
            external,
        })
    }

    pub fn call(name: &str, args: Vec<ExprRef>) -> ExprRef {
        Rc::new(Expr::Call(name.to_owned(), args))
    }

    pub fn property(object: ExprRef, name: &str) -> ExprRef {
        Rc::new(Expr::Property(object, name.to_owned()))
    }

    pub fn op2(op: BinaryOp, lhs: ExprRef, rhs: ExprRef) -> ExprRef {
        Rc::new(Expr::Op2(op, lhs, rhs))
    }

    pub fn as_const(&self) -> Option<f64> {
        match self {
            Expr::Const(n) => Some(*n),
            _ => None,
        }
    }

    pub fn var_name(&self) -> Option<&str> {
        match self {
            Expr::Var { name, .. } => Some(name),
            _ => None,
        }
    }

    pub fn is_var(&self, name: &str) -> bool {
        self.var_name() == Some(name)
    }

    pub fn eval(&self, scope: &mut dyn Scope) -> Result<Value> {
        match self {
            Expr::Const(n) => Ok(Value::Number(*n)),
            Expr::Str(s) => Ok(Value::Str(s.clone())),
            Expr::Var { name, .. } => match scope.get(name) {
                Some(value) => Ok(value),
                None => program_err!(UndefinedVariable, name.clone()),
            },
            Expr::Op2(op, l, r) => {
                let l = l.eval(scope)?.as_number()?;
                let r = r.eval(scope)?.as_number()?;
                let value = match op {
                    BinaryOp::Add => l + r,
                    BinaryOp::Sub => l - r,
                    BinaryOp::Mul => l * r,
                    BinaryOp::Div => l / r,
                };
                Ok(Value::Number(value))
            }
            Expr::Call(name, args) => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args.iter() {
                    values.push(arg.eval(&mut *scope)?);
                }
                match BUILTINS.get(name.as_str()) {
                    Some(builtin) => apply_builtin(*builtin, name, &values),
                    None => scope.call(name, &values),
                }
            }
            Expr::Property(object, name) => match object.eval(scope)? {
                Value::Object(target) => scope.property(&target, name),
                other => program_err!(TypeMismatch, format!("{other} has no property {name}")),
            },
        }
    }

    pub fn eval_number(&self, scope: &mut dyn Scope) -> Result<f64> {
        self.eval(scope)?.as_number()
    }
}

/// Formats a real so it always reads back as a real (`4.0`, not `4`).
pub fn fmt_real(value: f64) -> String {
    format!("{value:?}")
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Expr::Const(n) => write!(f, "{}", fmt_real(*n)),
            Expr::Str(s) => write!(f, "\"{}\"", s.replace('"', "\\\"")),
            Expr::Var { name, .. } => write!(f, "{name}"),
            Expr::Op2(op, l, r) => {
                let prec = op.precedence();
                let wrap_l = matches!(l.as_ref(), Expr::Op2(lop, _, _) if lop.precedence() < prec);
                let wrap_r = matches!(r.as_ref(), Expr::Op2(rop, _, _)
                    if rop.precedence() < prec
                        || (rop.precedence() == prec && matches!(op, BinaryOp::Sub | BinaryOp::Div)));
                if wrap_l {
                    write!(f, "({l})")?;
                } else {
                    write!(f, "{l}")?;
                }
                write!(f, " {} ", op.symbol())?;
                if wrap_r {
                    write!(f, "({r})")
                } else {
                    write!(f, "{r}")
                }
            }
            Expr::Call(name, args) => {
                write!(f, "{name}(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, ")")
            }
            Expr::Property(object, name) => write!(f, "{object}.{name}"),
        }
    }
}

/// True when `expr` is absent or is the constant `value`.
pub fn is_default(expr: Option<&ExprRef>, value: f64) -> bool {
    match expr {
        None => true,
        Some(expr) => expr.as_const() == Some(value),
    }
}

// The builders below fold constants and treat a missing operand as the
// identity for the operation.

pub fn add(a: Option<ExprRef>, b: Option<ExprRef>) -> Option<ExprRef> {
    match (a, b) {
        (None, b) => b,
        (a, None) => a,
        (Some(a), Some(b)) => match (a.as_const(), b.as_const()) {
            (Some(x), Some(y)) => Some(Expr::constant(x + y)),
            (Some(x), _) if x == 0.0 => Some(b),
            (_, Some(y)) if y == 0.0 => Some(a),
            _ => Some(Expr::op2(BinaryOp::Add, a, b)),
        },
    }
}

pub fn subtract(a: Option<ExprRef>, b: Option<ExprRef>) -> Option<ExprRef> {
    match (a, b) {
        (a, None) => a,
        (None, Some(b)) => match b.as_const() {
            Some(y) => Some(Expr::constant(-y)),
            None => Some(Expr::op2(BinaryOp::Sub, Expr::constant(0.0), b)),
        },
        (Some(a), Some(b)) => match (a.as_const(), b.as_const()) {
            (Some(x), Some(y)) => Some(Expr::constant(x - y)),
            (_, Some(y)) if y == 0.0 => Some(a),
            _ => Some(Expr::op2(BinaryOp::Sub, a, b)),
        },
    }
}

pub fn multiply(a: Option<ExprRef>, b: Option<ExprRef>) -> Option<ExprRef> {
    match (a, b) {
        (None, b) => b,
        (a, None) => a,
        (Some(a), Some(b)) => match (a.as_const(), b.as_const()) {
            (Some(x), Some(y)) => Some(Expr::constant(x * y)),
            (Some(x), _) if x == 1.0 => Some(b),
            (_, Some(y)) if y == 1.0 => Some(a),
            _ => Some(Expr::op2(BinaryOp::Mul, a, b)),
        },
    }
}

pub fn divide(a: Option<ExprRef>, b: Option<ExprRef>) -> Option<ExprRef> {
    match (a, b) {
        (a, None) => a,
        (None, Some(b)) => reciprocal(Some(b)),
        (Some(a), Some(b)) => match (a.as_const(), b.as_const()) {
            (Some(x), Some(y)) if y != 0.0 => Some(Expr::constant(x / y)),
            (_, Some(y)) if y == 1.0 => Some(a),
            _ => Some(Expr::op2(BinaryOp::Div, a, b)),
        },
    }
}

pub fn reciprocal(a: Option<ExprRef>) -> Option<ExprRef> {
    let a = a?;
    match a.as_const() {
        Some(x) if x != 0.0 => Some(Expr::constant(1.0 / x)),
        _ => Some(Expr::op2(BinaryOp::Div, Expr::constant(1.0), a)),
    }
}

pub fn max(a: Option<ExprRef>, b: Option<ExprRef>) -> Option<ExprRef> {
    match (a, b) {
        (None, b) => b,
        (a, None) => a,
        (Some(a), Some(b)) => match (a.as_const(), b.as_const()) {
            (Some(x), Some(y)) => Some(Expr::constant(x.max(y))),
            _ => Some(Expr::call("max", vec![a, b])),
        },
    }
}

#[cfg(test)]
use float_cmp::approx_eq;

#[test]
fn test_display_precedence() {
    let beta = Expr::var("Beta", false);
    let n = Expr::var("_N_c2", false);
    let one_minus = Expr::op2(BinaryOp::Sub, Expr::constant(1.0), beta.clone());
    let e = Expr::call("round", vec![Expr::op2(BinaryOp::Mul, one_minus, n)]);
    assert_eq!("round((1.0 - Beta) * _N_c2)", format!("{e}"));

    let e = Expr::op2(
        BinaryOp::Sub,
        Expr::var("a", false),
        Expr::op2(BinaryOp::Sub, Expr::var("b", false), Expr::var("c", false)),
    );
    assert_eq!("a - (b - c)", format!("{e}"));

    let station = Expr::call("station", vec![Expr::string("p1")]);
    let e = Expr::property(station, "throughput");
    assert_eq!("station(\"p1\").throughput", format!("{e}"));
}

#[test]
fn test_eval_arithmetic_and_builtins() {
    let mut env = Environment::new();
    env.set("Beta", 0.5);
    env.set("_N_c1", 10.0);
    let e = Expr::call(
        "round",
        vec![Expr::op2(
            BinaryOp::Mul,
            Expr::var("Beta", false),
            Expr::var("_N_c1", false),
        )],
    );
    assert!(approx_eq!(f64, 5.0, e.eval_number(&mut env).unwrap()));

    let e = Expr::call("max", vec![Expr::constant(2.0), Expr::constant(7.5)]);
    assert!(approx_eq!(f64, 7.5, e.eval_number(&mut env).unwrap()));

    let err = Expr::var("$S1", true).eval(&mut env).unwrap_err();
    assert_eq!(crate::common::ErrorCode::UndefinedVariable, err.code);
}

#[test]
fn test_folding_builders() {
    let two = Some(Expr::constant(2.0));
    let four = Some(Expr::constant(4.0));
    assert_eq!(Some(6.0), add(two.clone(), four.clone()).unwrap().as_const());
    assert_eq!(Some(0.5), reciprocal(two.clone()).unwrap().as_const());
    assert_eq!(Some(4.0), max(two.clone(), four.clone()).unwrap().as_const());
    assert_eq!(Some(2.0), multiply(None, two.clone()).unwrap().as_const());
    assert!(add(None, None).is_none());

    let s = Some(Expr::var("$S1", true));
    assert_eq!("$S1 / 2.0", format!("{}", divide(s.clone(), two).unwrap()));
    assert_eq!("$S1", format!("{}", divide(s.clone(), Some(Expr::constant(1.0))).unwrap()));
    assert_eq!("max($S1, 4.0)", format!("{}", max(s, four).unwrap()));
    assert!(is_default(None, 0.0));
    assert!(is_default(Some(&Expr::constant(1.0)), 1.0));
}
