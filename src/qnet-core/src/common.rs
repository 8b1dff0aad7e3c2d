// Copyright 2021 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::fmt;
use std::{error, result};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    NoError, // will never be produced
    CannotOpen,
    CannotRead,
    NotAllowed,
    InputIsTerminal,
    XmlSyntax,
    UnexpectedElement,
    UnexpectedAttribute,
    MissingAttribute,
    InvalidLiteral,
    DuplicateSymbol,
    UndefinedSymbol,
    InvalidWhatIf,
    PopulationMix,
    InvalidParameter,
    UndefinedVariable,
    TypeMismatch,
    NotAWhatIf,
    SolverFailed,
    Generic,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use ErrorCode::*;
        let name = match self {
            NoError => "no_error",
            CannotOpen => "cannot_open",
            CannotRead => "cannot_read",
            NotAllowed => "not_allowed",
            InputIsTerminal => "input_is_terminal",
            XmlSyntax => "xml_syntax",
            UnexpectedElement => "unexpected_element",
            UnexpectedAttribute => "unexpected_attribute",
            MissingAttribute => "missing_attribute",
            InvalidLiteral => "invalid_literal",
            DuplicateSymbol => "duplicate_symbol",
            UndefinedSymbol => "undefined_symbol",
            InvalidWhatIf => "invalid_what_if",
            PopulationMix => "population_mix",
            InvalidParameter => "invalid_parameter",
            UndefinedVariable => "undefined_variable",
            TypeMismatch => "type_mismatch",
            NotAWhatIf => "not_a_what_if",
            SolverFailed => "solver_failed",
            Generic => "generic",
        };

        write!(f, "{name}")
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Io,
    Parse,
    Model,
    Program,
    Output,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Error {
    pub kind: ErrorKind,
    pub code: ErrorCode,
    pub details: Option<String>,
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error {
            kind: ErrorKind::Output,
            code: ErrorCode::Generic,
            details: Some(err.to_string()),
        }
    }
}

impl Error {
    pub fn new(kind: ErrorKind, code: ErrorCode, details: Option<String>) -> Self {
        Error {
            kind,
            code,
            details,
        }
    }

    pub fn get_details(&self) -> Option<String> {
        self.details.clone()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let kind = match self.kind {
            ErrorKind::Io => "IoError",
            ErrorKind::Parse => "ParseError",
            ErrorKind::Model => "ModelError",
            ErrorKind::Program => "ProgramError",
            ErrorKind::Output => "OutputError",
        };
        match self.details {
            Some(ref details) => write!(f, "{}{{{}: {}}}", kind, self.code, details),
            None => write!(f, "{}{{{}}}", kind, self.code),
        }
    }
}

impl error::Error for Error {}

pub type Result<T> = result::Result<T, Error>;

#[macro_export]
macro_rules! io_err(
    ($code:tt, $str:expr) => {{
        use $crate::common::{Error, ErrorCode, ErrorKind};
        Err(Error::new(ErrorKind::Io, ErrorCode::$code, Some($str)))
    }}
);

#[macro_export]
macro_rules! parse_err(
    ($code:tt, $str:expr) => {{
        use $crate::common::{Error, ErrorCode, ErrorKind};
        Err(Error::new(ErrorKind::Parse, ErrorCode::$code, Some($str)))
    }}
);

#[macro_export]
macro_rules! model_err(
    ($code:tt, $str:expr) => {{
        use $crate::common::{Error, ErrorCode, ErrorKind};
        Err(Error::new(ErrorKind::Model, ErrorCode::$code, Some($str)))
    }}
);

#[macro_export]
macro_rules! program_err {
    ($code:tt, $str:expr) => {{
        use $crate::common::{Error, ErrorCode, ErrorKind};
        Err(Error::new(ErrorKind::Program, ErrorCode::$code, Some($str)))
    }};
    ($code:tt) => {{
        use $crate::common::{Error, ErrorCode, ErrorKind};
        Err(Error::new(ErrorKind::Program, ErrorCode::$code, None))
    }};
}

#[macro_export]
macro_rules! output_err(
    ($code:tt, $str:expr) => {{
        use $crate::common::{Error, ErrorCode, ErrorKind};
        Err(Error::new(ErrorKind::Output, ErrorCode::$code, Some($str)))
    }}
);

#[test]
fn test_error_display() {
    let err = Error::new(
        ErrorKind::Parse,
        ErrorCode::UnexpectedElement,
        Some("bogus".to_owned()),
    );
    assert_eq!("ParseError{unexpected_element: bogus}", format!("{err}"));

    let err = Error::new(ErrorKind::Program, ErrorCode::SolverFailed, None);
    assert_eq!("ProgramError{solver_failed}", format!("{err}"));
}

#[test]
fn test_error_macros() {
    let result: Result<()> = model_err!(DuplicateSymbol, "p1".to_owned());
    let err = result.unwrap_err();
    assert_eq!(ErrorKind::Model, err.kind);
    assert_eq!(ErrorCode::DuplicateSymbol, err.code);
    assert_eq!(Some("p1".to_owned()), err.get_details());
}
