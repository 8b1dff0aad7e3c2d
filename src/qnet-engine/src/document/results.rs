// Copyright 2021 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Result observations and their column positions.
//!
//! Every observation is a variable assigned from a solver object
//! property after a successful solve.  Columns are numbered from one in
//! registration order, which is also the order values are printed.

use std::collections::{BTreeMap, HashMap};

use lazy_static::lazy_static;
use tracing::debug;

use qnet_core::common::Result;
use qnet_core::expr::{Expr, ExprRef};
use qnet_core::model::ResultKind;
use qnet_core::parse_err;
use qnet_core::program::Stmt;

use super::variables::SIGIL;
use super::{Document, ResultVariable};

/// Default result names, in column order.
pub(crate) const RESULT_NAMES: [(&str, ResultKind); 5] = [
    ("$Q", ResultKind::QueueLength),
    ("$R", ResultKind::ResidenceTime),
    ("$T", ResultKind::ResponseTime),
    ("$U", ResultKind::Utilization),
    ("$X", ResultKind::Throughput),
];

lazy_static! {
    static ref MEASURE_TYPES: HashMap<&'static str, ResultKind> = {
        let mut m = HashMap::new();
        m.insert("Number of Customers", ResultKind::QueueLength);
        m.insert("Throughput", ResultKind::Throughput);
        m.insert("Residence time", ResultKind::ResidenceTime);
        m.insert("Utilization", ResultKind::Utilization);
        m
    };
}

/// The `measureType` attribute naming `kind`.
pub fn measure_type(kind: ResultKind) -> &'static str {
    match kind {
        ResultKind::QueueLength => "Number of Customers",
        ResultKind::Throughput => "Throughput",
        ResultKind::ResidenceTime | ResultKind::ResponseTime => "Residence time",
        ResultKind::Utilization => "Utilization",
    }
}

pub fn measure_kind(label: &str) -> Option<ResultKind> {
    MEASURE_TYPES.get(label).copied()
}

fn station_object(station: &str) -> ExprRef {
    Expr::call("station", vec![Expr::string(station)])
}

impl Document {
    /// Adds `name` as an output column and returns its (1-based)
    /// position.  Registering a name twice returns the first position.
    pub fn register_result(&mut self, name: &str, extract: Option<Stmt>) -> usize {
        if let Some(ordinal) = self.result_index.get(name) {
            return *ordinal;
        }
        self.result_variables.push(ResultVariable {
            name: name.to_owned(),
            extract,
        });
        let ordinal = self.result_variables.len();
        self.result_index.insert(name.to_owned(), ordinal);
        ordinal
    }

    pub fn column_of(&self, name: &str) -> Option<usize> {
        self.result_index.get(name).copied()
    }

    /// True when some result is read from the solver, as opposed to a
    /// sweep variable echoed into the output.
    pub fn has_observations(&self) -> bool {
        self.result_variables.iter().any(|r| r.extract.is_some())
    }

    /// Observes `kind` at `station` (or at its `class`), storing it in
    /// `name`.  Returns the variable holding the observation, which is
    /// the earlier one if the entity already reports `kind`, or `None`
    /// when the station or class does not exist.
    pub fn create_observation(
        &mut self,
        name: &str,
        kind: ResultKind,
        station: &str,
        class: Option<&str>,
    ) -> Option<String> {
        let m = self.model.stations.get_mut(station)?;
        let mut object = station_object(station);
        let results = match class {
            None => &mut m.results,
            Some(k) => {
                let demand = m.classes.get_mut(k)?;
                object = Expr::call("class", vec![object, Expr::string(k)]);
                &mut demand.results
            }
        };
        if let Some(existing) = results.get(&kind) {
            return Some(existing.clone());
        }
        results.insert(kind, name.to_owned());

        let extract = Stmt::Assign(name.to_owned(), Expr::property(object, kind.property()));
        self.register_result(name, Some(extract));
        Some(name.to_owned())
    }

    /// Observes `kind` for a whole chain.
    pub fn create_chain_observation(
        &mut self,
        name: &str,
        kind: ResultKind,
        chain: &str,
    ) -> Option<String> {
        let k = self.model.chains.get_mut(chain)?;
        if let Some(existing) = k.results.get(&kind) {
            return Some(existing.clone());
        }
        k.results.insert(kind, name.to_owned());

        let object = Expr::call("chain", vec![Expr::string(chain)]);
        let extract = Stmt::Assign(name.to_owned(), Expr::property(object, kind.property()));
        self.register_result(name, Some(extract));
        Some(name.to_owned())
    }

    /// Observes everything: queue length, residence time, utilization
    /// and throughput at every station (per class when a station serves
    /// several), plus response time and throughput for every chain.
    pub fn define_default_results(&mut self) {
        let stations: Vec<(String, Vec<String>)> = self
            .model
            .stations
            .iter()
            .map(|(name, m)| (name.clone(), m.classes.keys().cloned().collect()))
            .collect();
        for (station, classes) in stations.iter() {
            for (key, kind) in RESULT_NAMES {
                if kind == ResultKind::ResponseTime {
                    continue;
                }
                let station_result = format!("{key}_{station}").replace(' ', "_");
                if classes.len() > 1 {
                    for class in classes.iter() {
                        let class_result = format!("{station_result}({class})");
                        self.create_observation(&class_result, kind, station, Some(class));
                        self.station_index.insert(class_result, station.clone());
                    }
                }
                self.create_observation(&station_result, kind, station, None);
                self.station_index.insert(station_result, station.clone());
            }
        }

        let chains: Vec<String> = self.model.chains.keys().cloned().collect();
        for chain in chains.iter() {
            for (key, kind) in RESULT_NAMES {
                if kind != ResultKind::ResponseTime && kind != ResultKind::Throughput {
                    continue;
                }
                self.create_chain_observation(&format!("{key}_{chain}"), kind, chain);
            }
        }
    }

    /// Handles a `measure` element.  A `$` mean value asks for an
    /// observation; a number is a result from an earlier run and is
    /// saved against the current solution iteration.  Returns the
    /// observation variable, if one was created or reused.
    pub(crate) fn create_measure(
        &mut self,
        station: &str,
        class: Option<&str>,
        measure: &str,
        mean_value: &str,
        iteration: Option<(usize, &str, usize)>,
    ) -> Result<Option<String>> {
        let kind = match measure_kind(measure) {
            Some(kind) => kind,
            None => return parse_err!(InvalidParameter, format!("measureType=\"{measure}\"")),
        };
        let mean_value = mean_value.trim();
        if mean_value.starts_with(SIGIL) {
            if !self.model.stations.contains_key(station) {
                return parse_err!(UndefinedSymbol, format!("station {station}"));
            }
            return Ok(self.create_observation(mean_value, kind, station, class));
        }

        let value = match mean_value.parse::<f64>() {
            Ok(value) => value,
            Err(_) => return parse_err!(InvalidLiteral, format!("meanValue=\"{mean_value}\"")),
        };
        match (class, iteration) {
            (Some(class), Some((i, solver, iterations))) => {
                let mut values = BTreeMap::new();
                values.insert(kind, value);
                self.save_results(i, solver, iterations, station, class, &values);
            }
            _ => debug!(station = station, "measure {} ignored", measure),
        }
        Ok(None)
    }

    /// Records solver output for one station and class.
    pub fn save_results(
        &mut self,
        iteration: usize,
        solver: &str,
        iterations: usize,
        station: &str,
        class: &str,
        values: &BTreeMap<ResultKind, f64>,
    ) {
        let entry = self.results.entry(iteration).or_default();
        entry.solver = solver.to_owned();
        entry.iterations = iterations;
        entry
            .stations
            .entry(station.to_owned())
            .or_default()
            .entry(class.to_owned())
            .or_default()
            .extend(values.iter().map(|(k, v)| (*k, *v)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Options;
    use qnet_core::common::ErrorCode;
    use qnet_core::model::{Demand, Station, StationType};

    fn network(classes: &[&str]) -> Document {
        let mut doc = Document::new("net.jmva", Options::default());
        for class in classes {
            doc.model
                .insert_closed_chain(class, Expr::constant(4.0), Expr::constant(0.0))
                .unwrap();
        }
        for (name, kind) in [("terminal", StationType::Delay), ("cpu", StationType::LoadIndependent)] {
            let station = doc
                .model
                .insert_station(name, Station::new(kind, Expr::constant(1.0)))
                .unwrap();
            for class in classes {
                *station.demand_mut(class) = Demand::new(Expr::constant(1.0), Expr::constant(1.0));
            }
        }
        doc
    }

    #[test]
    fn test_observation_is_idempotent() {
        let mut doc = network(&["c1"]);
        let a = doc.create_observation("$X1", ResultKind::Throughput, "cpu", None);
        let b = doc.create_observation("$X2", ResultKind::Throughput, "cpu", None);
        assert_eq!(Some("$X1".to_owned()), a);
        assert_eq!(a, b);
        assert_eq!(1, doc.result_variables().len());
        assert_eq!(Some(1), doc.column_of("$X1"));
        assert_eq!(None, doc.column_of("$X2"));

        let c = doc.create_observation("$U1", ResultKind::Utilization, "cpu", Some("c1"));
        assert_eq!(Some("$U1".to_owned()), c);
        assert_eq!(Some(2), doc.column_of("$U1"));
        assert_eq!(2, doc.register_result("$U1", None));
        assert!(doc.has_observations());
    }

    #[test]
    fn test_missing_station_yields_nothing() {
        let mut doc = network(&["c1"]);
        assert_eq!(None, doc.create_observation("$X1", ResultKind::Throughput, "disk", None));
        assert_eq!(
            None,
            doc.create_observation("$X1", ResultKind::Throughput, "cpu", Some("c9"))
        );
        assert!(doc.result_variables().is_empty());

        let err = doc
            .create_measure("disk", None, "Throughput", "$X1", None)
            .unwrap_err();
        assert_eq!(ErrorCode::UndefinedSymbol, err.code);
        let err = doc
            .create_measure("cpu", None, "Latency", "$X1", None)
            .unwrap_err();
        assert_eq!(ErrorCode::InvalidParameter, err.code);
    }

    #[test]
    fn test_default_results() {
        let mut doc = network(&["c1"]);
        doc.define_default_results();
        let names: Vec<&str> = doc
            .result_variables()
            .iter()
            .map(|r| r.name.as_str())
            .collect();
        assert_eq!(
            vec![
                "$Q_cpu", "$R_cpu", "$U_cpu", "$X_cpu", "$Q_terminal", "$R_terminal",
                "$U_terminal", "$X_terminal", "$T_c1", "$X_c1",
            ],
            names
        );
        assert_eq!(Some("cpu"), doc.station_of("$U_cpu"));
        assert_eq!(None, doc.station_of("$T_c1"));

        // a second pass reuses every observation
        doc.define_default_results();
        assert_eq!(10, doc.result_variables().len());
    }

    #[test]
    fn test_default_results_per_class() {
        let mut doc = network(&["a", "b"]);
        doc.define_default_results();
        let names: Vec<&str> = doc
            .result_variables()
            .iter()
            .take(3)
            .map(|r| r.name.as_str())
            .collect();
        assert_eq!(vec!["$Q_cpu(a)", "$Q_cpu(b)", "$Q_cpu"], names);
    }

    #[test]
    fn test_saved_measures() {
        let mut doc = network(&["c1"]);
        doc.create_measure("cpu", Some("c1"), "Utilization", "0.75", Some((1, "MVA", 3)))
            .unwrap();
        let saved = &doc.saved_results()[&1];
        assert_eq!("MVA", saved.solver);
        assert_eq!(3, saved.iterations);
        assert_eq!(0.75, saved.stations["cpu"]["c1"][&ResultKind::Utilization]);
    }
}
