// Copyright 2021 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! The queueing network itself: chains (customer classes), stations and
//! the per station/class demands, plus the result-variable bookkeeping
//! each entity carries.
//!
//! Chains and stations are kept in name order so every walk over the
//! model (writers, default results, bounds) is reproducible.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use crate::common::Result;
use crate::expr::{self, Expr, ExprRef};
use crate::model_err;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResultKind {
    QueueLength,
    ResidenceTime,
    ResponseTime,
    Throughput,
    Utilization,
}

impl ResultKind {
    pub const ALL: [ResultKind; 5] = [
        ResultKind::QueueLength,
        ResultKind::ResidenceTime,
        ResultKind::ResponseTime,
        ResultKind::Throughput,
        ResultKind::Utilization,
    ];

    /// Name of the solver object property holding this result.
    pub fn property(self) -> &'static str {
        match self {
            ResultKind::QueueLength => "queue_length",
            ResultKind::ResidenceTime => "residence_time",
            ResultKind::ResponseTime => "response_time",
            ResultKind::Throughput => "throughput",
            ResultKind::Utilization => "utilization",
        }
    }

    pub fn from_property(name: &str) -> Option<ResultKind> {
        ResultKind::ALL.into_iter().find(|kind| kind.property() == name)
    }

    pub fn label(self) -> &'static str {
        match self {
            ResultKind::QueueLength => "Number of Customers",
            ResultKind::ResidenceTime => "Residence Time",
            ResultKind::ResponseTime => "Response Time",
            ResultKind::Throughput => "Throughput",
            ResultKind::Utilization => "Utilization",
        }
    }
}

/// Result kind to the name of the variable that receives it.
pub type ResultVariables = BTreeMap<ResultKind, String>;

#[derive(Clone, Debug, PartialEq)]
pub enum ChainKind {
    Closed {
        customers: ExprRef,
        think_time: ExprRef,
    },
    Open {
        arrival_rate: ExprRef,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub struct Chain {
    pub kind: ChainKind,
    pub comment: String,
    pub results: ResultVariables,
}

impl Chain {
    pub fn closed(customers: ExprRef, think_time: ExprRef) -> Self {
        Chain {
            kind: ChainKind::Closed {
                customers,
                think_time,
            },
            comment: String::new(),
            results: ResultVariables::new(),
        }
    }

    pub fn open(arrival_rate: ExprRef) -> Self {
        Chain {
            kind: ChainKind::Open { arrival_rate },
            comment: String::new(),
            results: ResultVariables::new(),
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.kind, ChainKind::Closed { .. })
    }

    pub fn is_open(&self) -> bool {
        matches!(self.kind, ChainKind::Open { .. })
    }

    pub fn customers(&self) -> Option<&ExprRef> {
        match &self.kind {
            ChainKind::Closed { customers, .. } => Some(customers),
            ChainKind::Open { .. } => None,
        }
    }

    pub fn think_time(&self) -> Option<&ExprRef> {
        match &self.kind {
            ChainKind::Closed { think_time, .. } => Some(think_time),
            ChainKind::Open { .. } => None,
        }
    }

    pub fn arrival_rate(&self) -> Option<&ExprRef> {
        match &self.kind {
            ChainKind::Open { arrival_rate } => Some(arrival_rate),
            ChainKind::Closed { .. } => None,
        }
    }

    /// Returns false when the chain is open.
    pub fn set_customers(&mut self, value: ExprRef) -> bool {
        match &mut self.kind {
            ChainKind::Closed { customers, .. } => {
                *customers = value;
                true
            }
            ChainKind::Open { .. } => false,
        }
    }

    /// Returns false when the chain is closed.
    pub fn set_arrival_rate(&mut self, value: ExprRef) -> bool {
        match &mut self.kind {
            ChainKind::Open { arrival_rate } => {
                *arrival_rate = value;
                true
            }
            ChainKind::Closed { .. } => false,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StationType {
    Delay,
    LoadIndependent,
    Multiserver,
}

impl StationType {
    /// Stations that queue customers, as opposed to pure delays.
    pub fn is_queueing(self) -> bool {
        matches!(self, StationType::LoadIndependent | StationType::Multiserver)
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Demand {
    pub service_time: Option<ExprRef>,
    pub visits: Option<ExprRef>,
    pub results: ResultVariables,
}

impl Demand {
    pub fn new(service_time: ExprRef, visits: ExprRef) -> Self {
        Demand {
            service_time: Some(service_time),
            visits: Some(visits),
            results: ResultVariables::new(),
        }
    }

    /// Service demand, `S * V`.  Missing visits count as one.
    pub fn demand(&self) -> Option<ExprRef> {
        match (&self.service_time, &self.visits) {
            (None, _) => None,
            (Some(s), None) => Some(s.clone()),
            (Some(s), Some(v)) => expr::multiply(Some(s.clone()), Some(v.clone())),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Station {
    pub kind: StationType,
    pub copies: ExprRef,
    pub reference: bool,
    pub comment: String,
    pub classes: BTreeMap<String, Demand>,
    pub results: ResultVariables,
}

impl Station {
    pub fn new(kind: StationType, copies: ExprRef) -> Self {
        Station {
            kind,
            copies,
            reference: false,
            comment: String::new(),
            classes: BTreeMap::new(),
            results: ResultVariables::new(),
        }
    }

    pub fn has_class(&self, name: &str) -> bool {
        self.classes.contains_key(name)
    }

    /// Returns the demand for `class`, inserting an empty one if needed.
    pub fn demand_mut(&mut self, class: &str) -> &mut Demand {
        self.classes.entry(class.to_owned()).or_default()
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Model {
    pub comment: String,
    pub chains: BTreeMap<String, Chain>,
    pub stations: BTreeMap<String, Station>,
}

impl Model {
    pub fn new() -> Self {
        Default::default()
    }

    fn insert_chain(&mut self, name: &str, chain: Chain) -> Result<&mut Chain> {
        match self.chains.entry(name.to_owned()) {
            Entry::Occupied(_) => model_err!(DuplicateSymbol, format!("duplicate class {name}")),
            Entry::Vacant(entry) => Ok(entry.insert(chain)),
        }
    }

    pub fn insert_closed_chain(
        &mut self,
        name: &str,
        customers: ExprRef,
        think_time: ExprRef,
    ) -> Result<&mut Chain> {
        self.insert_chain(name, Chain::closed(customers, think_time))
    }

    pub fn insert_open_chain(&mut self, name: &str, arrival_rate: ExprRef) -> Result<&mut Chain> {
        self.insert_chain(name, Chain::open(arrival_rate))
    }

    pub fn insert_station(&mut self, name: &str, station: Station) -> Result<&mut Station> {
        match self.stations.entry(name.to_owned()) {
            Entry::Occupied(_) => {
                model_err!(DuplicateSymbol, format!("duplicate station {name}"))
            }
            Entry::Vacant(entry) => Ok(entry.insert(station)),
        }
    }

    pub fn chain(&self, name: &str) -> Option<&Chain> {
        self.chains.get(name)
    }

    pub fn station(&self, name: &str) -> Option<&Station> {
        self.stations.get(name)
    }

    /// First station flagged as the reference (customer) station.
    pub fn reference_station(&self) -> Option<&str> {
        self.stations
            .iter()
            .find(|(_, station)| station.reference)
            .map(|(name, _)| name.as_str())
    }

    /// Sum of the populations of all closed chains.
    pub fn total_customers(&self) -> Option<ExprRef> {
        self.chains
            .values()
            .filter_map(|chain| chain.customers().cloned())
            .fold(None, |acc, n| expr::add(acc, Some(n)))
    }

    /// Every station gets an explicit (zero) demand for every chain.
    pub fn pad_demands(&mut self) {
        let chains: Vec<String> = self.chains.keys().cloned().collect();
        for station in self.stations.values_mut() {
            for chain in chains.iter() {
                station
                    .classes
                    .entry(chain.clone())
                    .or_insert_with(|| Demand::new(Expr::constant(0.0), Expr::constant(0.0)));
            }
        }
    }
}

/// Asymptotic bounds for a single chain.
///
/// Demands at multiserver stations are divided by the number of servers.
/// Delay stations and the chain's own think time contribute to `Z`; all
/// other stations contribute to `D_sum` and `D_max`.
pub struct Bound {
    d_max: Option<ExprRef>,
    d_sum: Option<ExprRef>,
    z_sum: Option<ExprRef>,
}

impl Bound {
    pub fn new(chain: &str, model: &Model) -> Self {
        let mut d_max = None;
        let mut d_sum = None;
        let mut z_sum = model
            .chain(chain)
            .and_then(|k| k.think_time().cloned())
            .filter(|z| !expr::is_default(Some(z), 0.0));
        for station in model.stations.values() {
            let d = Bound::demand(station, chain);
            if d.is_none() {
                continue;
            }
            if station.kind.is_queueing() {
                d_max = expr::max(d_max, d.clone());
                d_sum = expr::add(d_sum, d);
            } else {
                z_sum = expr::add(z_sum, d);
            }
        }
        Bound {
            d_max,
            d_sum,
            z_sum,
        }
    }

    /// `D(m,k)`, adjusted for multiservers.
    pub fn demand(station: &Station, chain: &str) -> Option<ExprRef> {
        let demand = station.classes.get(chain)?.demand()?;
        if station.kind == StationType::Multiserver {
            expr::divide(Some(demand), Some(station.copies.clone()))
        } else {
            Some(demand)
        }
    }

    pub fn d_max(&self) -> ExprRef {
        self.d_max.clone().unwrap_or_else(|| Expr::constant(0.0))
    }

    pub fn d_sum(&self) -> ExprRef {
        self.d_sum.clone().unwrap_or_else(|| Expr::constant(0.0))
    }

    pub fn z_sum(&self) -> ExprRef {
        self.z_sum.clone().unwrap_or_else(|| Expr::constant(0.0))
    }

    /// `N* = (D_sum + Z) / D_max`, the population where the two bounds cross.
    pub fn n_star(&self) -> ExprRef {
        expr::divide(
            expr::add(self.d_sum.clone(), self.z_sum.clone()),
            self.d_max.clone(),
        )
        .unwrap_or_else(|| Expr::constant(0.0))
    }
}

#[cfg(test)]
fn two_station_model() -> Model {
    let mut model = Model::new();
    model
        .insert_closed_chain("c1", Expr::constant(4.0), Expr::constant(0.0))
        .unwrap();
    let terminal = model
        .insert_station("terminal", Station::new(StationType::Delay, Expr::constant(1.0)))
        .unwrap();
    terminal.reference = true;
    *terminal.demand_mut("c1") = Demand::new(Expr::constant(2.0), Expr::constant(1.0));
    let cpu = model
        .insert_station("cpu", Station::new(StationType::LoadIndependent, Expr::constant(1.0)))
        .unwrap();
    *cpu.demand_mut("c1") = Demand::new(Expr::constant(0.5), Expr::constant(2.0));
    let disk = model
        .insert_station("disk", Station::new(StationType::Multiserver, Expr::constant(2.0)))
        .unwrap();
    *disk.demand_mut("c1") = Demand::new(Expr::constant(1.0), Expr::constant(1.0));
    model
}

#[test]
fn test_duplicate_symbols() {
    use crate::common::ErrorCode;

    let mut model = two_station_model();
    let err = model
        .insert_open_chain("c1", Expr::constant(1.0))
        .unwrap_err();
    assert_eq!(ErrorCode::DuplicateSymbol, err.code);
    let err = model
        .insert_station("cpu", Station::new(StationType::Delay, Expr::constant(1.0)))
        .unwrap_err();
    assert_eq!(ErrorCode::DuplicateSymbol, err.code);
    assert_eq!(3, model.stations.len());
    assert_eq!(Some("terminal"), model.reference_station());
}

#[test]
fn test_bounds() {
    let model = two_station_model();
    let bound = Bound::new("c1", &model);
    // cpu: 0.5 * 2 = 1.0, disk: 1.0 / 2 = 0.5, terminal is a delay.
    assert_eq!(Some(1.0), bound.d_max().as_const());
    assert_eq!(Some(1.5), bound.d_sum().as_const());
    assert_eq!(Some(2.0), bound.z_sum().as_const());
    assert_eq!(Some(3.5), bound.n_star().as_const());
}

#[test]
fn test_pad_demands() {
    let mut model = two_station_model();
    model
        .insert_open_chain("c2", Expr::constant(0.1))
        .unwrap();
    model.pad_demands();
    for station in model.stations.values() {
        assert!(station.has_class("c2"));
    }
    assert_eq!(Some(4.0), model.total_customers().unwrap().as_const());
}
