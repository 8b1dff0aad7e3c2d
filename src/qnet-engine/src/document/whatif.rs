// Copyright 2021 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Sweep axes.  A `whatIf` element names a model parameter and a list
//! of values; the parameter is replaced by a variable and the list
//! becomes a [`Comprehension`] the synthesized program loops over.

use std::collections::HashMap;
use std::fmt;

use float_cmp::approx_eq;
use lazy_static::lazy_static;
use tracing::warn;

use qnet_core::common::Result;
use qnet_core::expr::{BinaryOp, Expr, fmt_real};
use qnet_core::parse_err;
use qnet_core::program::Stmt;

use super::Document;
use super::variables::{Entity, VariableKind};

/// Loop variable of a population mix sweep.
pub const BETA: &str = "Beta";

#[derive(Clone, Debug, PartialEq)]
pub struct Comprehension {
    name: String,
    values: Vec<f64>,
    integer: bool,
}

impl Comprehension {
    pub fn new(name: &str, values: Vec<f64>, integer: bool) -> Self {
        Comprehension {
            name: name.to_owned(),
            values,
            integer,
        }
    }

    /// Parses a `;` separated value list bound to `name`.
    pub fn parse(name: &str, list: &str, integer: bool) -> Result<Self> {
        Ok(Comprehension::new(
            name,
            Comprehension::parse_values(list, integer)?,
            integer,
        ))
    }

    fn parse_values(list: &str, integer: bool) -> Result<Vec<f64>> {
        let mut values = vec![];
        for item in list.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            let value = match item.parse::<f64>() {
                Ok(value) if value.is_finite() => value,
                _ => return parse_err!(InvalidLiteral, format!("values=\"{list}\": {item}")),
            };
            if integer {
                if value < 0.0 {
                    return parse_err!(InvalidLiteral, format!("values=\"{list}\": {item} < 0"));
                }
                values.push(value.round());
            } else {
                values.push(value);
            }
        }

        if values.len() > 2 {
            let step = values[1] - values[0];
            let arithmetic = values
                .windows(2)
                .all(|w| approx_eq!(f64, w[1] - w[0], step, epsilon = 1e-9));
            if !arithmetic {
                warn!("values=\"{}\" is not an arithmetic progression", list);
            }
        }

        Ok(values)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_integer(&self) -> bool {
        self.integer
    }

    pub fn begin(&self) -> f64 {
        self.values.first().copied().unwrap_or(0.0)
    }

    pub fn step(&self) -> f64 {
        match self.values.as_slice() {
            [a, b, ..] => b - a,
            _ => 0.0,
        }
    }

    pub fn size(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn min(&self) -> f64 {
        self.values.iter().copied().fold(f64::INFINITY, f64::min)
    }

    pub fn max(&self) -> f64 {
        self.values.iter().copied().fold(f64::NEG_INFINITY, f64::max)
    }

    pub fn contains(&self, value: f64) -> bool {
        self.values
            .iter()
            .any(|v| approx_eq!(f64, *v, value, epsilon = 1e-9))
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn value(&self, i: usize) -> Option<f64> {
        self.values.get(i).copied()
    }

    /// A loop binding this axis' variable to each value around `body`.
    pub fn collect(&self, body: Vec<Stmt>) -> Stmt {
        Stmt::Foreach {
            var: self.name.clone(),
            values: self.values.clone(),
            body,
        }
    }
}

impl fmt::Display for Comprehension {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let values: Vec<String> = self.values.iter().map(|v| fmt_real(*v)).collect();
        write!(f, "{}", values.join(";"))
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum WhatIfKind {
    ArrivalRates,
    CustomerNumbers,
    NumberOfServers,
    PopulationMix,
    ServiceDemands,
}

lazy_static! {
    static ref WHAT_IF_KINDS: HashMap<&'static str, WhatIfKind> = {
        let mut m = HashMap::new();
        m.insert("Arrival Rates", WhatIfKind::ArrivalRates);
        m.insert("Customer Numbers", WhatIfKind::CustomerNumbers);
        m.insert("Number of Servers", WhatIfKind::NumberOfServers);
        m.insert("Population Mix", WhatIfKind::PopulationMix);
        m.insert("Service Demands", WhatIfKind::ServiceDemands);
        m
    };
}

impl WhatIfKind {
    pub fn from_label(label: &str) -> Option<WhatIfKind> {
        WHAT_IF_KINDS.get(label).copied()
    }

    pub fn label(self) -> &'static str {
        match self {
            WhatIfKind::ArrivalRates => "Arrival Rates",
            WhatIfKind::CustomerNumbers => "Customer Numbers",
            WhatIfKind::NumberOfServers => "Number of Servers",
            WhatIfKind::PopulationMix => "Population Mix",
            WhatIfKind::ServiceDemands => "Service Demands",
        }
    }

    /// Customer and server counts only take whole values.
    pub fn is_integer(self) -> bool {
        matches!(self, WhatIfKind::CustomerNumbers | WhatIfKind::NumberOfServers)
    }
}

/// A two class sweep: class 1 gets `round(Beta * n1)` customers and
/// class 2 gets `round((1 - Beta) * n2)`.
#[derive(Clone, Debug, PartialEq)]
pub struct PopulationMix {
    pub class1: String,
    pub class2: String,
    pub n1: f64,
    pub n2: f64,
    /// `(Beta, customers)` for each sweep value.
    pub axis1: Vec<(f64, f64)>,
    pub axis2: Vec<(f64, f64)>,
}

impl PopulationMix {
    pub fn population_variable(class: &str) -> String {
        format!("N_{class}")
    }

    fn original_variable(class: &str) -> String {
        format!("_N_{class}")
    }
}

fn required<'a>(attr: &str, value: Option<&'a str>) -> Result<&'a str> {
    match value {
        Some(value) if !value.is_empty() => Ok(value),
        _ => parse_err!(MissingAttribute, attr.to_owned()),
    }
}

impl Document {
    /// Declares a sweep over `kind` for the named class and/or station.
    pub fn create_what_if(
        &mut self,
        class_name: Option<&str>,
        station_name: Option<&str>,
        kind: &str,
        values: &str,
    ) -> Result<()> {
        let kind = match WhatIfKind::from_label(kind) {
            Some(kind) => kind,
            None => return parse_err!(InvalidWhatIf, format!("type=\"{kind}\"")),
        };
        let values = Comprehension::parse_values(values, kind.is_integer())?;

        let x_var = match kind {
            WhatIfKind::ArrivalRates => self.set_arrival_rate(class_name)?,
            WhatIfKind::CustomerNumbers => self.set_customers(class_name)?,
            WhatIfKind::NumberOfServers => self.set_multiplicity(station_name)?,
            WhatIfKind::PopulationMix => self.set_population_mix(class_name)?,
            WhatIfKind::ServiceDemands => self.set_demand(station_name, class_name)?,
        };
        let comprehension = Comprehension::new(&x_var, values, kind.is_integer());

        self.independent_variables.push(x_var.clone());
        self.register_result(&x_var, None);

        if !comprehension.is_empty() {
            if kind == WhatIfKind::PopulationMix {
                self.set_population_mix_axes(&comprehension);
            }
            self.whatifs.push(comprehension);
        }
        Ok(())
    }

    fn set_arrival_rate(&mut self, class_name: Option<&str>) -> Result<String> {
        let class_name = required("className", class_name)?;
        let chain = match self.model.chains.get_mut(class_name) {
            Some(chain) => chain,
            None => return parse_err!(UndefinedSymbol, format!("class {class_name}")),
        };
        if !chain.is_open() {
            return parse_err!(InvalidWhatIf, format!("class {class_name} is closed"));
        }
        let name = self
            .vars
            .ensure_variable(&Entity::chain(class_name), VariableKind::ArrivalRate);
        chain.set_arrival_rate(Expr::var(&name, false));
        Ok(name)
    }

    fn set_customers(&mut self, class_name: Option<&str>) -> Result<String> {
        let class_name = required("className", class_name)?;
        let chain = match self.model.chains.get_mut(class_name) {
            Some(chain) => chain,
            None => return parse_err!(UndefinedSymbol, format!("class {class_name}")),
        };
        if !chain.is_closed() {
            return parse_err!(InvalidWhatIf, format!("class {class_name} is open"));
        }
        let name = self
            .vars
            .ensure_variable(&Entity::chain(class_name), VariableKind::Population);
        chain.set_customers(Expr::var(&name, false));
        self.plot_customers = true;
        Ok(name)
    }

    fn set_demand(&mut self, station_name: Option<&str>, class_name: Option<&str>) -> Result<String> {
        let station_name = required("stationName", station_name)?;
        let class_name = required("className", class_name)?;
        let demand = match self
            .model
            .stations
            .get_mut(station_name)
            .and_then(|station| station.classes.get_mut(class_name))
        {
            Some(demand) => demand,
            None => {
                return parse_err!(
                    UndefinedSymbol,
                    format!("class {class_name} at station {station_name}")
                );
            }
        };
        let name = self.vars.ensure_variable(
            &Entity::demand(station_name, class_name),
            VariableKind::ServiceTime,
        );
        demand.service_time = Some(Expr::var(&name, false));
        Ok(name)
    }

    fn set_multiplicity(&mut self, station_name: Option<&str>) -> Result<String> {
        let station_name = required("stationName", station_name)?;
        let station = match self.model.stations.get_mut(station_name) {
            Some(station) => station,
            None => return parse_err!(UndefinedSymbol, format!("station {station_name}")),
        };
        let name = self
            .vars
            .ensure_variable(&Entity::station(station_name), VariableKind::Multiplicity);
        station.copies = Expr::var(&name, false);
        Ok(name)
    }

    /// Replaces both class populations with variables derived from the
    /// sweep variable `Beta` and the populations captured when the
    /// classes were declared.
    fn set_population_mix(&mut self, class_name: Option<&str>) -> Result<String> {
        if self.model.chains.len() != 2 {
            return parse_err!(
                PopulationMix,
                format!("needs exactly two classes, found {}", self.model.chains.len())
            );
        }
        if self.population_mix.is_some() {
            return parse_err!(PopulationMix, "population mix already declared".to_owned());
        }
        let class1 = required("className", class_name)?.to_owned();
        if !self.model.chains.contains_key(&class1) {
            return parse_err!(UndefinedSymbol, format!("class {class1}"));
        }
        let class2 = match self.model.chains.keys().find(|k| **k != class1) {
            Some(k) => k.clone(),
            None => return parse_err!(PopulationMix, "needs two distinct classes".to_owned()),
        };

        let mut populations = [0.0; 2];
        for (i, class) in [&class1, &class2].into_iter().enumerate() {
            populations[i] = match self.original_populations.get(class) {
                Some(n) => *n,
                None => {
                    return parse_err!(
                        PopulationMix,
                        format!("population of class {class} is not a constant")
                    );
                }
            };
        }

        let beta = Expr::var(BETA, false);
        let fractions = [
            beta.clone(),
            Expr::op2(BinaryOp::Sub, Expr::constant(1.0), beta),
        ];
        for (i, class) in [&class1, &class2].into_iter().enumerate() {
            let population = PopulationMix::population_variable(class);
            let original = PopulationMix::original_variable(class);
            self.vars
                .rebind(Entity::chain(class), VariableKind::Population, &population);
            if let Some(chain) = self.model.chains.get_mut(class.as_str()) {
                chain.set_customers(Expr::var(&population, false));
            }
            self.prologue
                .push(Stmt::Assign(original.clone(), Expr::constant(populations[i])));
            let scaled = Expr::op2(
                BinaryOp::Mul,
                fractions[i].clone(),
                Expr::var(&original, false),
            );
            self.whatif_body
                .push(Stmt::Assign(population, Expr::call("round", vec![scaled])));
        }

        self.population_mix = Some(PopulationMix {
            class1,
            class2,
            n1: populations[0],
            n2: populations[1],
            axis1: vec![],
            axis2: vec![],
        });
        Ok(BETA.to_owned())
    }

    fn set_population_mix_axes(&mut self, comprehension: &Comprehension) {
        if let Some(mix) = self.population_mix.as_mut() {
            mix.axis1.clear();
            mix.axis2.clear();
            for beta in comprehension.values() {
                mix.axis1.push((*beta, (mix.n1 * beta).round()));
                mix.axis2.push((*beta, (mix.n2 * (1.0 - beta)).round()));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Options;
    use qnet_core::common::ErrorCode;
    use qnet_core::expr::Environment;

    fn two_class_document() -> Document {
        let mut doc = Document::new("mix.jmva", Options::default());
        for (name, n) in [("c1", 10.0), ("c2", 6.0)] {
            doc.model
                .insert_closed_chain(name, Expr::constant(n), Expr::constant(0.0))
                .unwrap();
            doc.original_populations.insert(name.to_owned(), n);
        }
        doc
    }

    #[test]
    fn test_comprehension() {
        let c = Comprehension::parse("$N1", "1.0;2.0;3.0", false).unwrap();
        assert_eq!(3, c.size());
        assert_eq!(1.0, c.min());
        assert_eq!(3.0, c.max());
        assert_eq!(1.0, c.step());
        assert!(c.contains(2.0));
        assert!(!c.contains(2.5));
        assert_eq!("1.0;2.0;3.0", format!("{c}"));

        let c = Comprehension::parse("$M1", " 1.2; ;2.7 ", true).unwrap();
        assert_eq!(&[1.0, 3.0], c.values());

        let err = Comprehension::parse("$M1", "1;-2", true).unwrap_err();
        assert_eq!(ErrorCode::InvalidLiteral, err.code);
        let err = Comprehension::parse("$S1", "1;two", false).unwrap_err();
        assert_eq!(ErrorCode::InvalidLiteral, err.code);
        assert!(Comprehension::parse("$S1", "", false).unwrap().is_empty());
    }

    #[test]
    fn test_customer_numbers() {
        let mut doc = two_class_document();
        doc.create_what_if(Some("c1"), None, "Customer Numbers", "4.0;5.0;6.0")
            .unwrap();
        assert_eq!(1, doc.whatifs().len());
        assert_eq!("$N1", doc.whatifs()[0].name());
        assert_eq!(&["$N1".to_owned()], doc.independent_variables());
        assert!(doc.model().chain("c1").unwrap().customers().unwrap().is_var("$N1"));
        assert!(doc.plot_customers());

        let err = doc
            .create_what_if(Some("c1"), None, "Think Times", "1;2")
            .unwrap_err();
        assert_eq!(ErrorCode::InvalidWhatIf, err.code);
        let err = doc
            .create_what_if(Some("c1"), None, "Arrival Rates", "1;2")
            .unwrap_err();
        assert_eq!(ErrorCode::InvalidWhatIf, err.code);
    }

    #[test]
    fn test_population_mix() {
        let mut doc = two_class_document();
        doc.create_what_if(Some("c1"), None, "Population Mix", "0.25;0.5;0.75")
            .unwrap();
        assert_eq!(&["Beta".to_owned()], doc.independent_variables());
        assert_eq!(2, doc.prologue.len());
        assert_eq!(2, doc.whatif_body.len());

        let mut env = Environment::new();
        env.set(BETA, 0.5);
        for stmt in doc.prologue.iter().chain(doc.whatif_body.iter()) {
            if let Stmt::Assign(name, value) = stmt {
                let value = value.eval_number(&mut env).unwrap();
                env.set(name, value);
            }
        }
        assert_eq!(Some(5.0), env.value("N_c1"));
        assert_eq!(Some(3.0), env.value("N_c2"));

        let mix = doc.population_mix().unwrap();
        assert_eq!((0.5, 5.0), mix.axis1[1]);
        assert_eq!((0.5, 3.0), mix.axis2[1]);
        assert!(doc.variables().input_variables().contains("N_c2"));

        let err = doc
            .create_what_if(Some("c2"), None, "Population Mix", "0.5")
            .unwrap_err();
        assert_eq!(ErrorCode::PopulationMix, err.code);
    }

    #[test]
    fn test_population_mix_needs_two_classes() {
        let mut doc = Document::new("one.jmva", Options::default());
        doc.model
            .insert_closed_chain("c1", Expr::constant(4.0), Expr::constant(0.0))
            .unwrap();
        let err = doc
            .create_what_if(Some("c1"), None, "Population Mix", "0.5")
            .unwrap_err();
        assert_eq!(ErrorCode::PopulationMix, err.code);
    }
}
