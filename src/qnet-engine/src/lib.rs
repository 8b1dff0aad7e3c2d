// Copyright 2021 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Queueing-network experiment documents.
//!
//! [`Document`] parses an experiment description into a network model
//! plus the sweeps and observations around it, and synthesizes the
//! program that runs the experiment.  The [`writer`] module turns a
//! document back into XML, CSV or a gnuplot script.

#![forbid(unsafe_code)]

pub mod document;
pub mod writer;

pub use self::document::{
    Comprehension, Diagnostic, Document, EmbeddedProgram, IterationResults, Options,
    PopulationMix, ResultVariable, Severity, WhatIfKind,
};
pub use self::writer::{Intercepts, Point};
