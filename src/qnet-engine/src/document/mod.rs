// Copyright 2021 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! An experiment document: the network model it describes plus
//! everything needed to turn it into a runnable experiment (variable
//! registries, sweep axes, result observations and their columns).

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use tracing::warn;

use qnet_core::common::{Error, ErrorCode, ErrorKind, Result};
use qnet_core::model::{Model, ResultKind};
use qnet_core::program::Stmt;

mod parser;
mod results;
mod source;
mod synthesis;
mod variables;
mod whatif;

pub use self::parser::ARRIVAL_PROCESS;
pub use self::results::{measure_kind, measure_type};
pub use self::variables::{Entity, Registry, SIGIL, VariableKind, Variables};
pub use self::whatif::{BETA, Comprehension, PopulationMix, WhatIfKind};

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Options {
    /// Emit resolved numbers rather than symbolic expressions.
    pub strict: bool,
    /// Log every element as it is parsed.
    pub xml_debug: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
        }
    }
}

/// A problem found while parsing, tied to an element and source line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub line: usize,
    pub element: String,
    pub code: ErrorCode,
    pub details: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}: {}: <{}>: {} ({})",
            self.line, self.severity, self.element, self.details, self.code
        )
    }
}

/// A named result column and the statement that extracts it from the
/// solver.  Sweep variables have no extraction statement.
#[derive(Clone, Debug, PartialEq)]
pub struct ResultVariable {
    pub name: String,
    pub extract: Option<Stmt>,
}

/// A program body embedded in the document, kept verbatim.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmbeddedProgram {
    pub text: String,
    pub line: usize,
}

/// Station to class to measure, for one solver iteration.
pub type MeasureTable = BTreeMap<String, BTreeMap<String, BTreeMap<ResultKind, f64>>>;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct IterationResults {
    pub solver: String,
    pub iterations: usize,
    pub stations: MeasureTable,
}

#[cfg_attr(feature = "debug-derive", derive(Debug))]
pub struct Document {
    input_file_name: String,
    options: Options,
    model: Model,
    vars: Variables,
    whatifs: Vec<Comprehension>,
    independent_variables: Vec<String>,
    result_variables: Vec<ResultVariable>,
    result_index: HashMap<String, usize>,
    station_index: HashMap<String, String>,
    prologue: Vec<Stmt>,
    whatif_body: Vec<Stmt>,
    population_mix: Option<PopulationMix>,
    original_populations: BTreeMap<String, f64>,
    pragmas: BTreeMap<String, String>,
    embedded_program: Option<EmbeddedProgram>,
    results: BTreeMap<usize, IterationResults>,
    gnuplot: Vec<Stmt>,
    plot_customers: bool,
    diagnostics: Vec<Diagnostic>,
}

impl Document {
    pub fn new(input_file_name: &str, options: Options) -> Self {
        Document {
            input_file_name: input_file_name.to_owned(),
            options,
            model: Model::new(),
            vars: Variables::default(),
            whatifs: vec![],
            independent_variables: vec![],
            result_variables: vec![],
            result_index: HashMap::new(),
            station_index: HashMap::new(),
            prologue: vec![],
            whatif_body: vec![],
            population_mix: None,
            original_populations: BTreeMap::new(),
            pragmas: BTreeMap::new(),
            embedded_program: None,
            results: BTreeMap::new(),
            gnuplot: vec![],
            plot_customers: false,
            diagnostics: vec![],
        }
    }

    /// Reads and parses the document at `path` (`-` is standard input).
    pub fn load(path: &str, options: Options) -> Result<Document> {
        let contents = source::read_input(path)?;
        Document::from_bytes(path, &contents, options)
    }

    pub fn from_bytes(input_file_name: &str, contents: &[u8], options: Options) -> Result<Document> {
        let mut doc = Document::new(input_file_name, options);
        parser::parse(&mut doc, contents)?;

        let errors: Vec<String> = doc
            .diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Error)
            .map(|d| format!("{}:{}", doc.input_file_name, d))
            .collect();
        if !errors.is_empty() {
            return Err(Error::new(
                ErrorKind::Parse,
                ErrorCode::Generic,
                Some(errors.join("\n")),
            ));
        }

        let undefined = doc.undefined_external_variables();
        if !undefined.is_empty() {
            warn!(
                file = doc.input_file_name.as_str(),
                "undefined external variables: {}",
                undefined.join(", ")
            );
        }

        Ok(doc)
    }

    pub fn parse_str(input_file_name: &str, contents: &str, options: Options) -> Result<Document> {
        Document::from_bytes(input_file_name, contents.as_bytes(), options)
    }

    pub fn input_file_name(&self) -> &str {
        &self.input_file_name
    }

    pub fn options(&self) -> Options {
        self.options
    }

    pub fn set_strict(&mut self, strict: bool) {
        self.options.strict = strict;
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn variables(&self) -> &Variables {
        &self.vars
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Warning)
    }

    /// Sweep axes in declaration order.
    pub fn whatifs(&self) -> &[Comprehension] {
        &self.whatifs
    }

    pub fn whatif(&self, name: &str) -> Option<&Comprehension> {
        self.whatifs.iter().find(|c| c.name() == name)
    }

    pub fn independent_variables(&self) -> &[String] {
        &self.independent_variables
    }

    pub fn result_variables(&self) -> &[ResultVariable] {
        &self.result_variables
    }

    /// The station a default result variable reports on.
    pub fn station_of(&self, result: &str) -> Option<&str> {
        self.station_index.get(result).map(|s| s.as_str())
    }

    pub fn population_mix(&self) -> Option<&PopulationMix> {
        self.population_mix.as_ref()
    }

    /// Population a closed class had when it was declared, if constant.
    pub fn original_population(&self, chain: &str) -> Option<f64> {
        self.original_populations.get(chain).copied()
    }

    pub fn pragmas(&self) -> &BTreeMap<String, String> {
        &self.pragmas
    }

    pub fn embedded_program(&self) -> Option<&EmbeddedProgram> {
        self.embedded_program.as_ref()
    }

    pub fn saved_results(&self) -> &BTreeMap<usize, IterationResults> {
        &self.results
    }

    /// True once a customer-count sweep has been declared.
    pub fn plot_customers(&self) -> bool {
        self.plot_customers
    }

    pub(crate) fn gnuplot_mut(&mut self) -> &mut Vec<Stmt> {
        &mut self.gnuplot
    }

    pub(crate) fn report(&mut self, severity: Severity, line: usize, element: &str, err: &Error) {
        let details = err.get_details().unwrap_or_default();
        if severity == Severity::Warning {
            warn!(line = line, element = element, "{}", details);
        }
        self.diagnostics.push(Diagnostic {
            severity,
            line,
            element: element.to_owned(),
            code: err.code,
            details,
        });
    }
}
