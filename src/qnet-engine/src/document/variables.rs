// Copyright 2021 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Attribute values to expressions, and the registries recording which
//! model entity owns each named variable.

use std::collections::BTreeSet;

use qnet_core::common::Result;
#[cfg(test)]
use qnet_core::common::ErrorCode;
use qnet_core::expr::{Expr, ExprRef};
use qnet_core::parse_err;

/// Prefix marking an attribute value as a variable rather than a number.
pub const SIGIL: char = '$';

/// A model object that can own a variable.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Entity {
    Chain(String),
    Station(String),
    Demand { station: String, class: String },
}

impl Entity {
    pub fn chain(name: &str) -> Self {
        Entity::Chain(name.to_owned())
    }

    pub fn station(name: &str) -> Self {
        Entity::Station(name.to_owned())
    }

    pub fn demand(station: &str, class: &str) -> Self {
        Entity::Demand {
            station: station.to_owned(),
            class: class.to_owned(),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum VariableKind {
    ThinkTime,
    Population,
    ArrivalRate,
    Multiplicity,
    ServiceTime,
    Visits,
}

impl VariableKind {
    pub const ALL: [VariableKind; 6] = [
        VariableKind::ThinkTime,
        VariableKind::Population,
        VariableKind::ArrivalRate,
        VariableKind::Multiplicity,
        VariableKind::ServiceTime,
        VariableKind::Visits,
    ];

    /// Stem of synthesized names: `$N1`, `$N2`, ...
    pub fn prefix(self) -> &'static str {
        match self {
            VariableKind::ThinkTime => "$Z",
            VariableKind::Population => "$N",
            VariableKind::ArrivalRate => "$A",
            VariableKind::Multiplicity => "$M",
            VariableKind::ServiceTime => "$S",
            VariableKind::Visits => "$V",
        }
    }
}

/// Entity to variable name, kept in insertion order so that synthesized
/// names only depend on the order entities were first seen.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Registry {
    entries: Vec<(Entity, String)>,
}

impl Registry {
    pub fn get(&self, entity: &Entity) -> Option<&str> {
        self.entries
            .iter()
            .find(|(e, _)| e == entity)
            .map(|(_, name)| name.as_str())
    }

    /// Records `name` for `entity` unless the entity already has one.
    pub fn insert(&mut self, entity: Entity, name: &str) -> bool {
        if self.get(&entity).is_some() {
            return false;
        }
        self.entries.push((entity, name.to_owned()));
        true
    }

    /// Records `name` for `entity`, overwriting any previous name.
    pub fn replace(&mut self, entity: Entity, name: &str) {
        match self.entries.iter_mut().find(|(e, _)| *e == entity) {
            Some(entry) => entry.1 = name.to_owned(),
            None => self.entries.push((entity, name.to_owned())),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Entity, &str)> {
        self.entries.iter().map(|(e, name)| (e, name.as_str()))
    }

    pub fn contains_name(&self, name: &str) -> bool {
        self.entries.iter().any(|(_, n)| n == name)
    }

    /// The entity owning `name`, if any.
    pub fn entity_of(&self, name: &str) -> Option<&Entity> {
        self.entries
            .iter()
            .find(|(_, n)| n == name)
            .map(|(e, _)| e)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Variables {
    think_time: Registry,
    population: Registry,
    arrival_rate: Registry,
    multiplicity: Registry,
    service_time: Registry,
    visits: Registry,
    /// Variables the document expects to be bound from outside.
    input: BTreeSet<String>,
    /// Every variable named literally in an attribute or text value.
    referenced: BTreeSet<String>,
}

fn parse_real(attr: &str, value: &str) -> Result<f64> {
    let trimmed = value.trim();
    match trimmed.parse::<f64>() {
        Ok(n) if !trimmed.is_empty() => Ok(n),
        _ => parse_err!(InvalidLiteral, format!("{attr}=\"{value}\"")),
    }
}

impl Variables {
    /// Turns a literal attribute value into a constant or a variable.
    pub fn resolve(&mut self, attr: &str, value: &str) -> Result<ExprRef> {
        let value = value.trim();
        if value.starts_with(SIGIL) {
            self.referenced.insert(value.to_owned());
            self.input.insert(value.to_owned());
            return Ok(Expr::var(value, true));
        }
        Ok(Expr::constant(parse_real(attr, value)?))
    }

    /// As [`Variables::resolve`], substituting `default` for an absent
    /// value.
    pub fn resolve_with_default(
        &mut self,
        attr: &str,
        value: Option<&str>,
        default: Option<f64>,
    ) -> Result<ExprRef> {
        match (value, default) {
            (Some(value), _) => self.resolve(attr, value),
            (None, Some(default)) => Ok(Expr::constant(default)),
            (None, None) => parse_err!(MissingAttribute, attr.to_owned()),
        }
    }

    pub fn registry(&self, kind: VariableKind) -> &Registry {
        match kind {
            VariableKind::ThinkTime => &self.think_time,
            VariableKind::Population => &self.population,
            VariableKind::ArrivalRate => &self.arrival_rate,
            VariableKind::Multiplicity => &self.multiplicity,
            VariableKind::ServiceTime => &self.service_time,
            VariableKind::Visits => &self.visits,
        }
    }

    fn registry_mut(&mut self, kind: VariableKind) -> &mut Registry {
        match kind {
            VariableKind::ThinkTime => &mut self.think_time,
            VariableKind::Population => &mut self.population,
            VariableKind::ArrivalRate => &mut self.arrival_rate,
            VariableKind::Multiplicity => &mut self.multiplicity,
            VariableKind::ServiceTime => &mut self.service_time,
            VariableKind::Visits => &mut self.visits,
        }
    }

    /// Records that `entity` takes its `kind` parameter from `value` when
    /// that value is a variable.
    pub fn register(&mut self, entity: Entity, kind: VariableKind, value: &ExprRef) {
        if let Some(name) = value.var_name() {
            self.registry_mut(kind).insert(entity, name);
        }
    }

    /// The variable for `entity`'s `kind` parameter, synthesizing the
    /// next `$N1`, `$N2`, ... name on first use.
    pub fn ensure_variable(&mut self, entity: &Entity, kind: VariableKind) -> String {
        if let Some(name) = self.registry(kind).get(entity) {
            return name.to_owned();
        }
        let registry = self.registry_mut(kind);
        let name = format!("{}{}", kind.prefix(), registry.len() + 1);
        registry.insert(entity.clone(), &name);
        self.input.insert(name.clone());
        name
    }

    /// Binds `entity` to `name` regardless of any earlier binding, and
    /// marks `name` as an input.
    pub fn rebind(&mut self, entity: Entity, kind: VariableKind, name: &str) {
        self.registry_mut(kind).replace(entity, name);
        self.input.insert(name.to_owned());
    }

    /// True when some registry other than think time owns `name`.
    pub fn is_owned(&self, name: &str) -> bool {
        VariableKind::ALL
            .iter()
            .filter(|kind| **kind != VariableKind::ThinkTime)
            .any(|kind| self.registry(*kind).contains_name(name))
    }

    /// The registry and entity owning `name`.
    pub fn owner(&self, name: &str) -> Option<(VariableKind, &Entity)> {
        VariableKind::ALL.iter().find_map(|kind| {
            self.registry(*kind)
                .entity_of(name)
                .map(|entity| (*kind, entity))
        })
    }

    pub fn input_variables(&self) -> &BTreeSet<String> {
        &self.input
    }

    pub fn referenced_variables(&self) -> &BTreeSet<String> {
        &self.referenced
    }
}

#[test]
fn test_resolve_literal_and_variable() {
    let mut vars = Variables::default();
    let e = vars.resolve("servicetime", "$S1").unwrap();
    assert!(e.is_var("$S1"));
    assert!(vars.referenced_variables().contains("$S1"));
    assert!(vars.input_variables().contains("$S1"));

    let e = vars.resolve("population", " 4.5 ").unwrap();
    assert_eq!(Some(4.5), e.as_const());

    let err = vars.resolve("population", "4x").unwrap_err();
    assert_eq!(ErrorCode::InvalidLiteral, err.code);
    let err = vars.resolve("population", "").unwrap_err();
    assert_eq!(ErrorCode::InvalidLiteral, err.code);

    let e = vars
        .resolve_with_default("thinktime", None, Some(0.0))
        .unwrap();
    assert_eq!(Some(0.0), e.as_const());
    let err = vars
        .resolve_with_default("population", None, None)
        .unwrap_err();
    assert_eq!(ErrorCode::MissingAttribute, err.code);
}

#[test]
fn test_ensure_variable_is_deterministic() {
    let mut vars = Variables::default();
    let c1 = Entity::chain("c1");
    let c2 = Entity::chain("c2");
    assert_eq!("$N1", vars.ensure_variable(&c1, VariableKind::Population));
    assert_eq!("$N2", vars.ensure_variable(&c2, VariableKind::Population));
    assert_eq!("$N1", vars.ensure_variable(&c1, VariableKind::Population));
    assert_eq!("$A1", vars.ensure_variable(&c1, VariableKind::ArrivalRate));
    assert_eq!(2, vars.registry(VariableKind::Population).len());

    let d = Entity::demand("p1", "c1");
    assert_eq!("$S1", vars.ensure_variable(&d, VariableKind::ServiceTime));
    assert!(vars.is_owned("$S1"));
    assert_eq!(
        Some((VariableKind::ServiceTime, &d)),
        vars.owner("$S1")
    );
}

#[test]
fn test_explicit_names_count_toward_synthesis() {
    let mut vars = Variables::default();
    let n = vars.resolve("population", "$users").unwrap();
    vars.register(Entity::chain("c1"), VariableKind::Population, &n);
    assert_eq!(
        "$N2",
        vars.ensure_variable(&Entity::chain("c2"), VariableKind::Population)
    );

    vars.rebind(Entity::chain("c1"), VariableKind::Population, "N_c1");
    assert_eq!(
        Some("N_c1"),
        vars.registry(VariableKind::Population).get(&Entity::chain("c1"))
    );
    assert!(vars.input_variables().contains("N_c1"));
}
