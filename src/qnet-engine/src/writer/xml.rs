// Copyright 2021 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Writes a document back out in the format it was read from.
//!
//! [`print`] reproduces the model with any solver results saved against
//! it.  [`export`] is for handing the model to another tool: in strict
//! mode every value is resolved to a number, otherwise variables are
//! kept and the sweep axes and result observations are written as
//! `whatIf` and `measure` elements so the document can be read back.

use quick_xml::Writer;

use qnet_core::common::Result;
use qnet_core::expr::{self, ExprRef};
use qnet_core::model::{ChainKind, Demand, Model, ResultVariables, Station, StationType};

use super::{
    ToXml, XmlWriter, fmt_number, into_string, new_writer, write_cdata, write_comment,
    write_empty_with_attrs, write_tag_end, write_tag_start, write_tag_start_with_attrs,
    write_tag_with_attrs,
};
use crate::document::{
    ARRIVAL_PROCESS, BETA, Document, EmbeddedProgram, PopulationMix, WhatIfKind, measure_type,
};

const XSI_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema-instance";
const SCHEMA_LOCATION: &str = "JMTmodel.xsd";

/// What follows the model description.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Trailer {
    /// Solver results saved against the document.
    Results,
    /// The result variables, as symbolic `measure` elements.
    Observations,
    Nothing,
}

struct DocumentXml<'a> {
    doc: &'a Document,
    /// The document's model with every station/class demand present.
    model: Model,
    strict: bool,
    bounds: bool,
    trailer: Trailer,
}

/// The full document, including saved results.
pub fn print(doc: &Document) -> Result<String> {
    write_document(DocumentXml::new(doc, false, Trailer::Results))
}

/// The document for another tool.  With `bounds` the reference station,
/// algorithm and sweep sections are left out.
pub fn export(doc: &Document, bounds: bool) -> Result<String> {
    let trailer = if !doc.options().strict {
        Trailer::Observations
    } else if !bounds {
        Trailer::Results
    } else {
        Trailer::Nothing
    };
    write_document(DocumentXml::new(doc, bounds, trailer))
}

fn write_document(document: DocumentXml) -> Result<String> {
    let mut writer = new_writer()?;
    document.write_xml(&mut writer)?;
    into_string(writer)
}

impl ToXml<XmlWriter> for EmbeddedProgram {
    fn write_xml(&self, writer: &mut Writer<XmlWriter>) -> Result<()> {
        write_tag_start(writer, "lqx")?;
        write_cdata(writer, &self.text)?;
        write_tag_end(writer, "lqx")
    }
}

impl ToXml<XmlWriter> for DocumentXml<'_> {
    fn write_xml(&self, writer: &mut Writer<XmlWriter>) -> Result<()> {
        let mut attrs = vec![];
        if self.bounds {
            attrs.push(("jaba", "true"));
        }
        attrs.push(("xmlns:xsi", XSI_NAMESPACE));
        attrs.push(("xsi:noNamespaceSchemaLocation", SCHEMA_LOCATION));
        write_tag_start_with_attrs(writer, "model", &attrs)?;

        for (param, value) in self.doc.pragmas().iter() {
            write_empty_with_attrs(
                writer,
                "pragma",
                &[("param", param.as_str()), ("value", value.as_str())],
            )?;
        }

        if !self.model.comment.is_empty() {
            write_tag_start(writer, "description")?;
            write_cdata(writer, &self.model.comment)?;
            write_tag_end(writer, "description")?;
        }

        write_tag_start(writer, "parameters")?;
        self.write_classes(writer)?;
        self.write_stations(writer)?;
        if !self.bounds {
            self.write_reference_stations(writer)?;
        }
        write_tag_end(writer, "parameters")?;

        if !self.bounds {
            write_tag_start(writer, "algParams")?;
            write_empty_with_attrs(
                writer,
                "algType",
                &[("maxSamples", "10000"), ("name", "MVA"), ("tolerance", "1.0E-7")],
            )?;
            write_empty_with_attrs(writer, "compareAlgs", &[("value", "false")])?;
            write_tag_end(writer, "algParams")?;

            if !self.strict {
                self.write_what_ifs(writer)?;
            }
        }

        if let Some(program) = self.doc.embedded_program() {
            program.write_xml(writer)?;
        }

        match self.trailer {
            Trailer::Results => self.write_results(writer)?,
            Trailer::Observations => self.write_observations(writer)?,
            Trailer::Nothing => {}
        }

        write_tag_end(writer, "model")
    }
}

impl<'a> DocumentXml<'a> {
    fn new(doc: &'a Document, bounds: bool, trailer: Trailer) -> Self {
        let mut model = doc.model().clone();
        model.pad_demands();
        DocumentXml {
            doc,
            model,
            strict: doc.options().strict,
            bounds,
            trailer,
        }
    }

    /// The attribute text for `value`: the expression itself when it is
    /// symbolic and output is not strict, otherwise its number.
    fn value(&self, value: Option<&ExprRef>, integer: bool) -> String {
        let value = match value {
            Some(value) if !self.strict && value.as_const().is_none() => {
                return value.to_string();
            }
            Some(value) => self.doc.value_of(value),
            None => 0.0,
        };
        if integer {
            fmt_number(value.round())
        } else {
            fmt_number(value)
        }
    }

    /// In strict output, the expression a resolved value came from.
    fn write_expression(&self, writer: &mut Writer<XmlWriter>, value: Option<&ExprRef>) -> Result<()> {
        match value {
            Some(value) if self.strict && value.as_const().is_none() => {
                write_comment(writer, &value.to_string())
            }
            _ => Ok(()),
        }
    }

    /// Population written for a closed class.  Classes in a population
    /// mix keep the population they were declared with.
    fn population(&self, name: &str, customers: &ExprRef) -> String {
        let mixed = self
            .doc
            .population_mix()
            .is_some_and(|mix| mix.class1 == name || mix.class2 == name);
        match self.doc.original_population(name) {
            Some(n) if mixed => fmt_number(n.round()),
            _ => self.value(Some(customers), true),
        }
    }

    fn write_classes(&self, writer: &mut Writer<XmlWriter>) -> Result<()> {
        let number = self.model.chains.len().to_string();
        write_tag_start_with_attrs(writer, "classes", &[("number", number.as_str())])?;
        for (name, chain) in self.model.chains.iter() {
            match &chain.kind {
                ChainKind::Closed {
                    customers,
                    think_time,
                } => {
                    let population = self.population(name, customers);
                    let think = self.value(Some(think_time), false);
                    let mut attrs = vec![("name", name.as_str()), ("population", population.as_str())];
                    if !expr::is_default(Some(think_time), 0.0) {
                        attrs.push(("thinktime", think.as_str()));
                    }
                    write_empty_with_attrs(writer, "closedclass", &attrs)?;
                    self.write_expression(writer, Some(customers))?;
                }
                ChainKind::Open { arrival_rate } => {
                    let rate = self.value(Some(arrival_rate), false);
                    write_empty_with_attrs(
                        writer,
                        "openclass",
                        &[("name", name.as_str()), ("rate", rate.as_str())],
                    )?;
                    self.write_expression(writer, Some(arrival_rate))?;
                }
            }
        }
        write_tag_end(writer, "classes")
    }

    fn write_stations(&self, writer: &mut Writer<XmlWriter>) -> Result<()> {
        let number = self.model.stations.len().to_string();
        write_tag_start_with_attrs(writer, "stations", &[("number", number.as_str())])?;
        for (name, station) in self.model.stations.iter() {
            self.write_station(writer, name, station)?;
        }
        write_tag_end(writer, "stations")
    }

    fn write_station(&self, writer: &mut Writer<XmlWriter>, name: &str, station: &Station) -> Result<()> {
        let element = match station.kind {
            StationType::Delay => "delaystation",
            StationType::LoadIndependent => "listation",
            StationType::Multiserver => "ldstation",
        };
        let servers = self.value(Some(&station.copies), true);
        let mut attrs = vec![("name", name)];
        if station.kind == StationType::Multiserver
            && (!self.strict || !self.list_carries_servers(station))
        {
            attrs.push(("servers", servers.as_str()));
        }
        write_tag_start_with_attrs(writer, element, &attrs)?;
        if !station.comment.is_empty() {
            write_comment(writer, &station.comment)?;
        }

        write_tag_start(writer, "servicetimes")?;
        for (class, demand) in station.classes.iter() {
            let attrs = [("customerclass", class.as_str())];
            if station.kind == StationType::Multiserver {
                let list = self.service_time_list(station, demand);
                write_tag_with_attrs(writer, "servicetimes", &list, &attrs)?;
            } else {
                let service_time = self.value(demand.service_time.as_ref(), false);
                write_tag_with_attrs(writer, "servicetime", &service_time, &attrs)?;
                self.write_expression(writer, demand.service_time.as_ref())?;
            }
        }
        write_tag_end(writer, "servicetimes")?;

        write_tag_start(writer, "visits")?;
        for (class, demand) in station.classes.iter() {
            let visits = self.value(demand.visits.as_ref(), false);
            write_tag_with_attrs(writer, "visit", &visits, &[("customerclass", class.as_str())])?;
            self.write_expression(writer, demand.visits.as_ref())?;
        }
        write_tag_end(writer, "visits")?;

        write_tag_end(writer, element)
    }

    /// Load dependent service times: `S / min(i, servers)` for one to
    /// the larger of the server count and the total population, so that
    /// the list length carries the number of servers.
    fn service_time_list(&self, station: &Station, demand: &Demand) -> String {
        let service_time = demand.service_time.as_ref();
        let symbolic = service_time.is_some_and(|s| s.as_const().is_none())
            || station.copies.as_const().is_none();
        if symbolic && !self.strict {
            return self.value(service_time, false);
        }

        let copies = self.doc.value_of(&station.copies);
        let customers = self
            .model
            .total_customers()
            .map(|n| self.doc.value_of(&n))
            .unwrap_or(0.0);
        let count = customers.max(copies).round();
        if count < 1.0 {
            return self.value(service_time, false);
        }
        let s = service_time.map(|s| self.doc.value_of(s)).unwrap_or(0.0);
        (1..=count as usize)
            .map(|i| {
                if copies <= 0.0 {
                    fmt_number(0.0)
                } else {
                    fmt_number(s / (i as f64).min(copies))
                }
            })
            .collect::<Vec<_>>()
            .join(";")
    }

    /// A list of resolved service times encodes the number of servers
    /// only when some class has a nonzero service time.
    fn list_carries_servers(&self, station: &Station) -> bool {
        self.doc.value_of(&station.copies) > 0.0
            && station.classes.values().any(|demand| {
                demand
                    .service_time
                    .as_ref()
                    .is_some_and(|s| self.doc.value_of(s) > 0.0)
            })
    }

    fn write_reference_stations(&self, writer: &mut Writer<XmlWriter>) -> Result<()> {
        let number = self.model.chains.len().to_string();
        write_tag_start_with_attrs(writer, "ReferenceStation", &[("number", number.as_str())])?;
        let reference = self.model.reference_station();
        for (name, chain) in self.model.chains.iter() {
            let station = if chain.is_open() {
                Some(ARRIVAL_PROCESS)
            } else {
                reference
            };
            if let Some(station) = station {
                write_empty_with_attrs(writer, "Class", &[("name", name.as_str()), ("refStation", station)])?;
            }
        }
        write_tag_end(writer, "ReferenceStation")
    }

    fn write_what_ifs(&self, writer: &mut Writer<XmlWriter>) -> Result<()> {
        let inputs = self.doc.variables().input_variables();
        if inputs.is_empty() {
            return Ok(());
        }
        write_comment(writer, "SPEX input variables")?;
        for var in inputs.iter() {
            self.write_what_if(writer, var)?;
        }
        Ok(())
    }

    /// The `whatIf` element that binds `var`, found by looking for the
    /// model parameter that uses it.
    fn write_what_if(&self, writer: &mut Writer<XmlWriter>, var: &str) -> Result<()> {
        let mut attrs: Vec<(&str, &str)> = vec![];
        let mut axis = var;

        let mix = self.doc.population_mix();
        let kind = if let Some(mix) = mix.filter(|mix| {
            var == PopulationMix::population_variable(&mix.class1)
                || var == PopulationMix::population_variable(&mix.class2)
        }) {
            if var != PopulationMix::population_variable(&mix.class1) {
                return Ok(());
            }
            attrs.push(("className", mix.class1.as_str()));
            axis = BETA;
            WhatIfKind::PopulationMix
        } else if let Some(name) = self.find_chain(var, |k| k.customers()) {
            attrs.push(("className", name));
            WhatIfKind::CustomerNumbers
        } else if let Some(name) = self.find_chain(var, |k| k.arrival_rate()) {
            attrs.push(("className", name));
            WhatIfKind::ArrivalRates
        } else if let Some((name, _)) = self
            .model
            .stations
            .iter()
            .find(|(_, m)| m.copies.is_var(var))
        {
            attrs.push(("stationName", name.as_str()));
            WhatIfKind::NumberOfServers
        } else if let Some((station, class)) = self.find_demand(var, |d| d.service_time.as_ref()) {
            attrs.push(("stationName", station));
            attrs.push(("className", class));
            WhatIfKind::ServiceDemands
        } else if let Some((station, class)) = self.find_demand(var, |d| d.visits.as_ref()) {
            return write_comment(
                writer,
                &format!("{var}: visits of {class} at {station} cannot be swept"),
            );
        } else {
            return write_comment(writer, &format!("Var not found: {var}"));
        };

        let values = self
            .doc
            .whatif(axis)
            .map(|c| c.to_string())
            .unwrap_or_default();
        attrs.push(("type", kind.label()));
        attrs.push(("values", values.as_str()));
        write_empty_with_attrs(writer, "whatIf", &attrs)?;
        write_comment(writer, var)
    }

    fn find_chain<F>(&self, var: &str, value: F) -> Option<&str>
    where
        F: Fn(&qnet_core::model::Chain) -> Option<&ExprRef>,
    {
        self.model
            .chains
            .iter()
            .find(|(_, k)| value(k).is_some_and(|e| e.is_var(var)))
            .map(|(name, _)| name.as_str())
    }

    fn find_demand<F>(&self, var: &str, value: F) -> Option<(&str, &str)>
    where
        F: Fn(&Demand) -> Option<&ExprRef>,
    {
        self.model.stations.iter().find_map(|(station, m)| {
            m.classes
                .iter()
                .find(|(_, d)| value(d).is_some_and(|e| e.is_var(var)))
                .map(|(class, _)| (station.as_str(), class.as_str()))
        })
    }

    fn write_measures(&self, writer: &mut Writer<XmlWriter>, results: &ResultVariables) -> Result<()> {
        for (kind, var) in results.iter() {
            write_empty_with_attrs(
                writer,
                "measure",
                &[("measureType", measure_type(*kind)), ("meanValue", var.as_str())],
            )?;
        }
        Ok(())
    }

    /// Result variables as `measure` elements of an unsolved solution.
    fn write_observations(&self, writer: &mut Writer<XmlWriter>) -> Result<()> {
        if self.doc.result_variables().is_empty() {
            return Ok(());
        }
        write_comment(writer, "SPEX results")?;
        write_tag_start_with_attrs(writer, "solutions", &[("ok", "false")])?;
        write_tag_start_with_attrs(writer, "algorithm", &[("iterations", "0")])?;
        for (name, station) in self.model.stations.iter() {
            write_tag_start_with_attrs(writer, "stationresults", &[("station", name.as_str())])?;
            self.write_measures(writer, &station.results)?;
            for (class, demand) in station.classes.iter() {
                write_tag_start_with_attrs(writer, "classresults", &[("customerclass", class.as_str())])?;
                self.write_measures(writer, &demand.results)?;
                write_tag_end(writer, "classresults")?;
            }
            write_tag_end(writer, "stationresults")?;
        }
        write_tag_end(writer, "algorithm")?;
        write_tag_end(writer, "solutions")
    }

    fn write_results(&self, writer: &mut Writer<XmlWriter>) -> Result<()> {
        let saved = self.doc.saved_results();
        if saved.is_empty() {
            return Ok(());
        }
        write_comment(writer, "results")?;
        for (count, (iteration, results)) in saved.iter().enumerate() {
            let count = count.to_string();
            let iteration = iteration.to_string();
            write_tag_start_with_attrs(
                writer,
                "solutions",
                &[
                    ("iteration", count.as_str()),
                    ("iterationValue", iteration.as_str()),
                    ("ok", "true"),
                ],
            )?;
            let iterations = results.iterations.to_string();
            write_tag_start_with_attrs(
                writer,
                "algorithm",
                &[
                    ("name", results.solver.as_str()),
                    ("iterations", iterations.as_str()),
                ],
            )?;
            for (station, classes) in results.stations.iter() {
                write_tag_start_with_attrs(writer, "stationresults", &[("station", station.as_str())])?;
                for (class, values) in classes.iter() {
                    write_tag_start_with_attrs(writer, "classresults", &[("customerclass", class.as_str())])?;
                    for (kind, value) in values.iter() {
                        let value = fmt_number(*value);
                        write_empty_with_attrs(
                            writer,
                            "measure",
                            &[("measureType", measure_type(*kind)), ("meanValue", value.as_str())],
                        )?;
                    }
                    write_tag_end(writer, "classresults")?;
                }
                write_tag_end(writer, "stationresults")?;
            }
            write_tag_end(writer, "algorithm")?;
            write_tag_end(writer, "solutions")?;
        }
        Ok(())
    }
}
