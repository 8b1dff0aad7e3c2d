// Copyright 2021 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Push-down parser for experiment documents.
//!
//! Each open element has a frame recording the context it opened, so
//! the context of the innermost frame decides how a child element is
//! handled.  Element names compare case-insensitively.  Errors inside
//! an element are recorded as diagnostics and the element's subtree is
//! skipped; only malformed XML or a second root element stop the parse.

use std::fmt::Display;

use quick_xml::Reader;
use quick_xml::escape::resolve_predefined_entity;
use quick_xml::events::Event;
use tracing::{debug, info};

use qnet_core::common::{Error, ErrorCode, ErrorKind, Result};
use qnet_core::expr::{self, Expr};
use qnet_core::model::{Station, StationType};
use qnet_core::parse_err;

use super::variables::{Entity, VariableKind};
use super::{Document, EmbeddedProgram, Severity};

/// `refStation` value used by open classes.
pub const ARRIVAL_PROCESS: &str = "Arrival Process";

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Context {
    Document,
    Model,
    Description,
    Parameters,
    Classes,
    Stations,
    Station,
    ServiceTimes,
    ServiceTime,
    ServiceTimeList,
    Visits,
    Visit,
    ReferenceStation,
    AlgParams,
    Solutions,
    Algorithm,
    StationResults,
    ClassResults,
    Program,
    /// An element that takes no children.
    Nop,
    /// The subtree of an element that failed; everything is ignored.
    Skip,
}

impl Context {
    /// Contexts whose character data is kept.
    fn takes_text(self) -> bool {
        matches!(
            self,
            Context::Description
                | Context::ServiceTime
                | Context::ServiceTimeList
                | Context::Visit
                | Context::Program
        )
    }
}

/// The model object an open element refers to.
#[derive(Clone, Debug, PartialEq, Eq)]
enum Payload {
    Void,
    Chain(String),
    Station(String),
    Demand { station: String, class: String },
    /// Station (and class, once `classresults` is seen) of a solution.
    Results { station: String, class: Option<String> },
    Model,
}

fn wrong_payload<T>(payload: &Payload, wanted: &str) -> Result<T> {
    parse_err!(Generic, format!("expected a {wanted}, found {payload:?}"))
}

impl Payload {
    fn station(&self) -> Result<&str> {
        match self {
            Payload::Station(station) => Ok(station),
            other => wrong_payload(other, "station"),
        }
    }

    fn demand(&self) -> Result<(&str, &str)> {
        match self {
            Payload::Demand { station, class } => Ok((station, class)),
            other => wrong_payload(other, "demand"),
        }
    }

    fn results(&self) -> Result<(&str, Option<&str>)> {
        match self {
            Payload::Results { station, class } => Ok((station, class.as_deref())),
            other => wrong_payload(other, "result set"),
        }
    }
}

struct Frame {
    element: String,
    context: Context,
    payload: Payload,
    text: String,
    line: usize,
}

#[derive(Default)]
struct Attributes(Vec<(String, String)>);

impl Attributes {
    fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    fn require(&self, key: &str) -> Result<&str> {
        match self.get(key) {
            Some(value) => Ok(value),
            None => parse_err!(MissingAttribute, key.to_owned()),
        }
    }

    fn flag(&self, key: &str) -> bool {
        matches!(
            self.get(key).map(|v| v.trim().to_ascii_lowercase()).as_deref(),
            Some("true" | "yes" | "1")
        )
    }

    /// Keys outside `allowed`, ignoring namespace declarations and
    /// schema attributes.
    fn unexpected<'a>(&'a self, allowed: &'a [&str]) -> impl Iterator<Item = &'a str> + 'a {
        self.0.iter().map(|(k, _)| k.as_str()).filter(move |k| {
            let lower = k.to_ascii_lowercase();
            !allowed.iter().any(|a| a.eq_ignore_ascii_case(k))
                && !lower.starts_with("xmlns")
                && !lower.starts_with("xsi:")
                && !lower.starts_with("http:")
        })
    }
}

/// Solution block currently open, for numeric measures.
#[derive(Default)]
struct Solution {
    iteration: usize,
    solver: String,
    iterations: usize,
}

struct Parser<'a> {
    doc: &'a mut Document,
    stack: Vec<Frame>,
    line: usize,
    offset: usize,
    seen_root: bool,
    solution: Option<Solution>,
}

fn unexpected_element<T>(name: &str) -> Result<T> {
    parse_err!(UnexpectedElement, format!("<{name}>"))
}

fn xml_syntax<E: Display>(line: usize, err: E) -> Error {
    Error::new(
        ErrorKind::Parse,
        ErrorCode::XmlSyntax,
        Some(format!("line {line}: {err}")),
    )
}

/// The text a `&name;` reference stands for.
fn resolve_reference(name: &str) -> Option<String> {
    if let Some(value) = resolve_predefined_entity(name) {
        return Some(value.to_owned());
    }
    let code = name.strip_prefix('#')?;
    let code = match code.strip_prefix('x').or_else(|| code.strip_prefix('X')) {
        Some(hex) => u32::from_str_radix(hex, 16).ok()?,
        None => code.parse::<u32>().ok()?,
    };
    char::from_u32(code).map(String::from)
}

impl<'a> Parser<'a> {
    fn new(doc: &'a mut Document) -> Self {
        Parser {
            doc,
            stack: vec![],
            line: 1,
            offset: 0,
            seen_root: false,
            solution: None,
        }
    }

    fn advance_to(&mut self, contents: &[u8], offset: usize) {
        let offset = offset.min(contents.len());
        if offset > self.offset {
            self.line += contents[self.offset..offset]
                .iter()
                .filter(|b| **b == b'\n')
                .count();
            self.offset = offset;
        }
    }

    fn trace(&self, tag: &str) {
        let depth = self.stack.len();
        if self.doc.options.xml_debug {
            info!(line = self.line, depth = depth, "{}", tag);
        } else {
            debug!(line = self.line, depth = depth, "{}", tag);
        }
    }

    fn report(&mut self, severity: Severity, element: &str, err: &Error) {
        let line = self.line;
        self.doc.report(severity, line, element, err);
    }

    fn check_attributes(&mut self, element: &str, attrs: &Attributes, allowed: &[&str]) {
        let unexpected: Vec<String> = attrs.unexpected(allowed).map(str::to_owned).collect();
        for key in unexpected {
            let err = Error::new(ErrorKind::Parse, ErrorCode::UnexpectedAttribute, Some(key));
            self.report(Severity::Error, element, &err);
        }
    }

    fn start(&mut self, element: &str, attrs: &Attributes) -> Result<()> {
        self.trace(&format!("<{element}>"));
        let context = self
            .stack
            .last()
            .map(|frame| frame.context)
            .unwrap_or(Context::Document);
        if context == Context::Document && self.seen_root {
            return parse_err!(
                UnexpectedElement,
                format!("line {}: second root element <{element}>", self.line)
            );
        }

        let (context, payload) = if context == Context::Skip {
            (Context::Skip, Payload::Void)
        } else {
            match self.dispatch(context, element, attrs) {
                Ok(next) => next,
                Err(err) => {
                    self.report(Severity::Error, element, &err);
                    (Context::Skip, Payload::Void)
                }
            }
        };
        self.stack.push(Frame {
            element: element.to_owned(),
            context,
            payload,
            text: String::new(),
            line: self.line,
        });
        Ok(())
    }

    /// Handles `element` opened inside `context`, returning the context
    /// and payload of the new frame.
    fn dispatch(
        &mut self,
        context: Context,
        element: &str,
        attrs: &Attributes,
    ) -> Result<(Context, Payload)> {
        let name = element.to_ascii_lowercase();
        let payload = self
            .stack
            .last()
            .map(|frame| frame.payload.clone())
            .unwrap_or(Payload::Void);

        match (context, name.as_str()) {
            (Context::Document, "model") => {
                self.check_attributes(element, attrs, &["xml-debug", "jaba"]);
                self.seen_root = true;
                if attrs.flag("xml-debug") {
                    self.doc.options.xml_debug = true;
                }
                Ok((Context::Model, Payload::Void))
            }

            (Context::Model, "pragma") => {
                self.check_attributes(element, attrs, &["param", "value"]);
                let param = attrs.require("param")?;
                let value = attrs.get("value").unwrap_or_default();
                self.doc.pragmas.insert(param.to_owned(), value.to_owned());
                Ok((Context::Nop, Payload::Void))
            }
            (Context::Model, "description") => {
                self.check_attributes(element, attrs, &[]);
                Ok((Context::Description, Payload::Model))
            }
            (Context::Model, "parameters") => {
                self.check_attributes(element, attrs, &[]);
                Ok((Context::Parameters, Payload::Void))
            }
            (Context::Model, "algparams") => {
                self.check_attributes(element, attrs, &[]);
                Ok((Context::AlgParams, Payload::Void))
            }
            (Context::Model, "whatif") => {
                self.check_attributes(element, attrs, &["className", "stationName", "type", "values"]);
                self.doc.create_what_if(
                    attrs.get("className"),
                    attrs.get("stationName"),
                    attrs.require("type")?,
                    attrs.require("values")?,
                )?;
                Ok((Context::Nop, Payload::Void))
            }
            (Context::Model, "solutions") => {
                self.check_attributes(
                    element,
                    attrs,
                    &["algCount", "iteration", "iterationValue", "ok", "solutionMethod"],
                );
                let iteration = attrs
                    .get("iteration")
                    .and_then(|v| v.trim().parse::<usize>().ok())
                    .unwrap_or(self.doc.results.len());
                self.solution = Some(Solution {
                    iteration,
                    ..Default::default()
                });
                Ok((Context::Solutions, Payload::Void))
            }
            (Context::Model, "lqx") => {
                self.check_attributes(element, attrs, &[]);
                Ok((Context::Program, Payload::Void))
            }

            (Context::Parameters, "classes" | "stations" | "referencestation") => {
                self.check_attributes(element, attrs, &["number"]);
                let next = match name.as_str() {
                    "classes" => Context::Classes,
                    "stations" => Context::Stations,
                    _ => Context::ReferenceStation,
                };
                Ok((next, Payload::Void))
            }

            (Context::Classes, "closedclass") => {
                self.check_attributes(element, attrs, &["name", "population", "thinktime"]);
                let chain = self.create_closed_chain(attrs)?;
                Ok((Context::Nop, Payload::Chain(chain)))
            }
            (Context::Classes, "openclass") => {
                self.check_attributes(element, attrs, &["name", "rate"]);
                let chain = self.create_open_chain(attrs)?;
                Ok((Context::Nop, Payload::Chain(chain)))
            }

            (Context::Stations, "delaystation" | "listation" | "ldstation") => {
                self.check_attributes(element, attrs, &["name", "servers"]);
                let kind = match name.as_str() {
                    "delaystation" => StationType::Delay,
                    "listation" => StationType::LoadIndependent,
                    _ => StationType::Multiserver,
                };
                let station = self.create_station(element, kind, attrs)?;
                Ok((Context::Station, Payload::Station(station)))
            }

            (Context::Station, "servicetimes") => {
                self.check_attributes(element, attrs, &[]);
                Ok((Context::ServiceTimes, payload))
            }
            (Context::Station, "visits") => {
                self.check_attributes(element, attrs, &[]);
                Ok((Context::Visits, payload))
            }

            (Context::ServiceTimes, "servicetime" | "servicetimes")
            | (Context::Visits, "visit") => {
                self.check_attributes(element, attrs, &["customerclass"]);
                let class = attrs.require("customerclass")?;
                let station = payload.station()?;
                if let Some(m) = self.doc.model.stations.get_mut(station) {
                    m.demand_mut(class);
                }
                let next = match name.as_str() {
                    "servicetime" => Context::ServiceTime,
                    "servicetimes" => Context::ServiceTimeList,
                    _ => Context::Visit,
                };
                Ok((
                    next,
                    Payload::Demand {
                        station: station.to_owned(),
                        class: class.to_owned(),
                    },
                ))
            }

            (Context::ReferenceStation, "class") => {
                self.check_attributes(element, attrs, &["name", "refStation"]);
                let ref_station = attrs.require("refStation")?;
                if ref_station != ARRIVAL_PROCESS {
                    match self.doc.model.stations.get_mut(ref_station) {
                        Some(station) => station.reference = true,
                        None => return parse_err!(UndefinedSymbol, format!("station {ref_station}")),
                    }
                }
                Ok((Context::Nop, Payload::Void))
            }

            (Context::AlgParams, "algtype") => {
                self.check_attributes(element, attrs, &["maxSamples", "name", "tolerance"]);
                Ok((Context::Nop, Payload::Void))
            }
            (Context::AlgParams, "comparealgs") => {
                self.check_attributes(
                    element,
                    attrs,
                    &["meanValue", "measureType", "successful", "value"],
                );
                Ok((Context::Nop, Payload::Void))
            }

            (Context::Solutions, "algorithm") => {
                self.check_attributes(element, attrs, &["iterations", "name"]);
                if let Some(solution) = self.solution.as_mut() {
                    solution.solver = attrs.get("name").unwrap_or_default().to_owned();
                    solution.iterations = attrs
                        .get("iterations")
                        .and_then(|v| v.trim().parse::<usize>().ok())
                        .unwrap_or(0);
                }
                Ok((Context::Algorithm, Payload::Void))
            }
            (Context::Algorithm, "stationresults") => {
                self.check_attributes(element, attrs, &["station"]);
                let station = attrs.require("station")?;
                if !self.doc.model.stations.contains_key(station) {
                    let err = Error::new(
                        ErrorKind::Parse,
                        ErrorCode::UndefinedSymbol,
                        Some(format!("station {station}: results ignored")),
                    );
                    self.report(Severity::Warning, element, &err);
                    return Ok((Context::Skip, Payload::Void));
                }
                Ok((
                    Context::StationResults,
                    Payload::Results {
                        station: station.to_owned(),
                        class: None,
                    },
                ))
            }
            (Context::Algorithm, "normconst") => Ok((Context::Nop, Payload::Void)),
            (Context::StationResults, "classresults") => {
                self.check_attributes(element, attrs, &["customerclass"]);
                let class = attrs.require("customerclass")?;
                let (station, _) = payload.results()?;
                Ok((
                    Context::ClassResults,
                    Payload::Results {
                        station: station.to_owned(),
                        class: Some(class.to_owned()),
                    },
                ))
            }
            (Context::StationResults | Context::ClassResults, "measure") => {
                self.check_attributes(element, attrs, &["meanValue", "measureType", "successful"]);
                let (station, class) = payload.results()?;
                self.create_measure(element, station, class, attrs)?;
                Ok((Context::Nop, Payload::Void))
            }

            _ => unexpected_element(element),
        }
    }

    fn create_closed_chain(&mut self, attrs: &Attributes) -> Result<String> {
        let name = attrs.require("name")?;
        let vars = &mut self.doc.vars;
        let population = vars.resolve_with_default("population", attrs.get("population"), None)?;
        let think_time = vars.resolve_with_default("thinktime", attrs.get("thinktime"), Some(0.0))?;
        self.doc
            .model
            .insert_closed_chain(name, population.clone(), think_time.clone())?;

        if let Some(n) = population.as_const() {
            self.doc.original_populations.insert(name.to_owned(), n);
        }
        let vars = &mut self.doc.vars;
        vars.register(Entity::chain(name), VariableKind::Population, &population);
        vars.register(Entity::chain(name), VariableKind::ThinkTime, &think_time);
        Ok(name.to_owned())
    }

    fn create_open_chain(&mut self, attrs: &Attributes) -> Result<String> {
        let name = attrs.require("name")?;
        let rate = self
            .doc
            .vars
            .resolve_with_default("rate", attrs.get("rate"), None)?;
        self.doc.model.insert_open_chain(name, rate.clone())?;
        self.doc
            .vars
            .register(Entity::chain(name), VariableKind::ArrivalRate, &rate);
        Ok(name.to_owned())
    }

    fn create_station(
        &mut self,
        element: &str,
        kind: StationType,
        attrs: &Attributes,
    ) -> Result<String> {
        let name = attrs.require("name")?;
        let copies = self
            .doc
            .vars
            .resolve_with_default("servers", attrs.get("servers"), Some(1.0))?;
        self.doc
            .model
            .insert_station(name, Station::new(kind, copies.clone()))?;

        if kind == StationType::Multiserver {
            self.doc
                .vars
                .register(Entity::station(name), VariableKind::Multiplicity, &copies);
        } else if !expr::is_default(Some(&copies), 1.0) {
            let err = Error::new(
                ErrorKind::Model,
                ErrorCode::InvalidParameter,
                Some(format!("station {name}: servers={copies} is not 1")),
            );
            self.report(Severity::Warning, element, &err);
        }
        Ok(name.to_owned())
    }

    fn create_measure(
        &mut self,
        element: &str,
        station: &str,
        class: Option<&str>,
        attrs: &Attributes,
    ) -> Result<()> {
        let measure = attrs.require("measureType")?;
        let mean_value = attrs.require("meanValue")?;
        let iteration = self
            .solution
            .as_ref()
            .map(|s| (s.iteration, s.solver.clone(), s.iterations));
        let iteration = iteration
            .as_ref()
            .map(|(i, solver, n)| (*i, solver.as_str(), *n));
        let observed = self
            .doc
            .create_measure(station, class, measure, mean_value, iteration)?;
        if observed.is_none() && mean_value.trim().starts_with('$') {
            let err = Error::new(
                ErrorKind::Parse,
                ErrorCode::UndefinedSymbol,
                Some(format!(
                    "class {} at station {station}: {mean_value} ignored",
                    class.unwrap_or_default()
                )),
            );
            self.report(Severity::Warning, element, &err);
        }
        Ok(())
    }

    fn end(&mut self, element: &str) {
        while let Some(frame) = self.stack.pop() {
            self.trace(&format!("</{}>", frame.element));
            let done = frame.element == element;
            if let Err(err) = self.finish(&frame) {
                let line = frame.line;
                self.doc.report(Severity::Error, line, &frame.element, &err);
            }
            if done {
                break;
            }
        }
    }

    /// Commits whatever a frame accumulated, once, when it closes.
    fn finish(&mut self, frame: &Frame) -> Result<()> {
        match frame.context {
            Context::Model => {
                if !self.doc.has_observations() {
                    self.doc.define_default_results();
                }
            }
            Context::Description => {
                self.doc.model.comment = frame.text.trim().to_owned();
            }
            Context::ServiceTime | Context::Visit => {
                let (station, class) = frame.payload.demand()?;
                let (attr, kind) = if frame.context == Context::Visit {
                    ("visit", VariableKind::Visits)
                } else {
                    ("servicetime", VariableKind::ServiceTime)
                };
                let value = self.doc.vars.resolve(attr, &frame.text)?;
                if let Some(demand) = self
                    .doc
                    .model
                    .stations
                    .get_mut(station)
                    .and_then(|m| m.classes.get_mut(class))
                {
                    if kind == VariableKind::Visits {
                        demand.visits = Some(value.clone());
                    } else {
                        demand.service_time = Some(value.clone());
                    }
                }
                self.doc
                    .vars
                    .register(Entity::demand(station, class), kind, &value);
            }
            Context::ServiceTimeList => {
                let (station, class) = frame.payload.demand()?;
                self.finish_service_time_list(station, class, &frame.text)?;
            }
            Context::Program => {
                self.doc.embedded_program = Some(EmbeddedProgram {
                    text: frame.text.trim().to_owned(),
                    line: frame.line,
                });
            }
            Context::Solutions => self.solution = None,
            _ => {}
        }
        Ok(())
    }

    /// A load dependent service time list: the first value is the
    /// service time and the number of distinct runs is the number of
    /// servers.
    fn finish_service_time_list(&mut self, station: &str, class: &str, text: &str) -> Result<()> {
        let mut count = 0usize;
        let mut last: Option<&str> = None;
        let mut service_time = None;
        for value in text.split(';').map(str::trim).filter(|v| !v.is_empty()) {
            if last != Some(value) {
                last = Some(value);
                count += 1;
                if count == 1 {
                    service_time = Some(self.doc.vars.resolve("servicetimes", value)?);
                }
            }
        }

        if let Some(m) = self.doc.model.stations.get_mut(station) {
            if let Some(st) = service_time.as_ref() {
                m.demand_mut(class).service_time = Some(st.clone());
            }
            if let Some(copies) = expr::max(
                Some(m.copies.clone()),
                Some(Expr::constant(count as f64)),
            ) {
                m.copies = copies;
            }
        }
        if let Some(st) = service_time.as_ref() {
            self.doc
                .vars
                .register(Entity::demand(station, class), VariableKind::ServiceTime, st);
        }
        Ok(())
    }

    fn text(&mut self, text: &str) {
        if let Some(frame) = self.stack.last_mut() {
            if frame.context.takes_text() {
                frame.text.push_str(text);
            }
        }
    }

    fn comment(&mut self, text: &str) {
        let text = text.trim();
        let payload = match self.stack.last() {
            Some(frame) => frame.payload.clone(),
            None => return,
        };
        let model = &mut self.doc.model;
        let target = match &payload {
            Payload::Model => Some(&mut model.comment),
            Payload::Chain(name) => model.chains.get_mut(name).map(|k| &mut k.comment),
            Payload::Station(name) => model.stations.get_mut(name).map(|m| &mut m.comment),
            _ => None,
        };
        if let Some(comment) = target {
            if !comment.is_empty() {
                comment.push('\n');
            }
            comment.push_str(text);
        }
    }
}

/// Parses `contents` into `doc`.  Element level problems are left in the
/// document's diagnostics; the error return is for documents that are
/// not well formed.
pub(crate) fn parse(doc: &mut Document, contents: &[u8]) -> Result<()> {
    let mut reader = Reader::from_reader(contents);
    reader.config_mut().trim_text(false);
    reader.config_mut().expand_empty_elements = true;

    let mut parser = Parser::new(doc);
    let mut buf = Vec::new();
    loop {
        parser.advance_to(contents, reader.buffer_position() as usize);
        let line = parser.line;
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|err| xml_syntax(line, err))?;
        match event {
            Event::Start(e) => {
                let element = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                let mut attrs = Attributes::default();
                for attr in e.attributes() {
                    let attr = attr.map_err(|err| xml_syntax(line, err))?;
                    let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
                    let value = attr
                        .decode_and_unescape_value(reader.decoder())
                        .map_err(|err| xml_syntax(line, err))?
                        .into_owned();
                    attrs.0.push((key, value));
                }
                parser.start(&element, &attrs)?;
            }
            Event::End(e) => {
                let element = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                parser.end(&element);
            }
            Event::Text(e) => parser.text(&String::from_utf8_lossy(&e)),
            Event::CData(e) => parser.text(&String::from_utf8_lossy(&e)),
            Event::GeneralRef(e) => {
                let name = String::from_utf8_lossy(&e).into_owned();
                match resolve_reference(&name) {
                    Some(text) => parser.text(&text),
                    None => return Err(xml_syntax(line, format!("unknown entity &{name};"))),
                }
            }
            Event::Comment(e) => parser.comment(&String::from_utf8_lossy(&e)),
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if !parser.seen_root {
        return parse_err!(XmlSyntax, "no <model> element".to_owned());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::document::{Document, Options};
    use qnet_core::common::ErrorCode;
    use qnet_core::model::{ResultKind, StationType};

    pub(crate) const SCENARIO_A: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="no"?>
<model xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" xsi:noNamespaceSchemaLocation="JMTmodel.xsd">
  <description><![CDATA[One class & two stations]]></description>
  <parameters>
    <classes number="1">
      <closedclass name="c1" population="4" thinktime="0"/>
    </classes>
    <stations number="2">
      <delaystation name="terminal">
        <servicetimes>
          <servicetime customerclass="c1">1</servicetime>
        </servicetimes>
        <visits>
          <visit customerclass="c1">1</visit>
        </visits>
      </delaystation>
      <listation name="p1">
        <!-- the bottleneck -->
        <servicetimes>
          <servicetime customerclass="c1">1</servicetime>
        </servicetimes>
        <visits>
          <visit customerclass="c1">1</visit>
        </visits>
      </listation>
    </stations>
    <ReferenceStation number="1">
      <Class name="c1" refStation="terminal"/>
    </ReferenceStation>
  </parameters>
  <algParams>
    <algType maxSamples="10000" name="MVA" tolerance="1.0E-7"/>
    <compareAlgs value="false"/>
  </algParams>
</model>
"#;

    fn with_parameters(body: &str, rest: &str) -> String {
        format!(
            "<?xml version=\"1.0\"?>\n<model>\n<parameters>\n<classes number=\"1\">\n\
             <closedclass name=\"c1\" population=\"4\"/>\n</classes>\n<stations number=\"1\">\n\
             <listation name=\"p1\"><servicetimes><servicetime customerclass=\"c1\">0.5</servicetime>\
             </servicetimes><visits><visit customerclass=\"c1\">2</visit></visits></listation>\n\
             {body}</stations>\n</parameters>\n{rest}</model>\n"
        )
    }

    #[test]
    fn test_scenario_a() {
        let doc = Document::parse_str("a.jmva", SCENARIO_A, Options::default()).unwrap();
        let model = doc.model();
        assert_eq!(2, model.stations.len());
        assert_eq!(1, model.chains.len());
        assert_eq!("One class & two stations", model.comment);
        assert_eq!(Some("terminal"), model.reference_station());
        assert_eq!("the bottleneck", model.station("p1").unwrap().comment);

        let p1 = model.station("p1").unwrap();
        assert_eq!(StationType::LoadIndependent, p1.kind);
        let demand = p1.classes["c1"].demand().unwrap();
        assert_eq!(Some(1.0), demand.as_const());

        for station in ["terminal", "p1"] {
            let results = &model.station(station).unwrap().results;
            for kind in [
                ResultKind::QueueLength,
                ResultKind::Throughput,
                ResultKind::Utilization,
                ResultKind::ResidenceTime,
            ] {
                assert!(results.contains_key(&kind), "{station} {kind:?}");
            }
        }
        assert!(doc.diagnostics().is_empty());
    }

    #[test]
    fn test_scenario_b() {
        let text = with_parameters(
            "",
            "<whatIf className=\"c1\" type=\"Customer Numbers\" values=\"4.0;5.0;6.0\"/>\n",
        );
        let doc = Document::parse_str("b.jmva", &text, Options::default()).unwrap();
        assert_eq!(1, doc.whatifs().len());
        assert_eq!(3, doc.whatifs()[0].size());
        assert_eq!("$N1", doc.whatifs()[0].name());
        assert!(
            doc.model()
                .chain("c1")
                .unwrap()
                .customers()
                .unwrap()
                .is_var("$N1")
        );
        assert_eq!(1, doc.program().loop_count());
    }

    #[test]
    fn test_scenario_c() {
        let text = with_parameters("", "").replace("<parameters>", "<parameters>\n<bogus/>");
        let err = Document::parse_str("c.jmva", &text, Options::default()).unwrap_err();
        let details = err.get_details().unwrap();
        assert!(details.contains("bogus"), "{details}");
        assert!(details.starts_with("c.jmva:4: error:"), "{details}");
    }

    #[test]
    fn test_scenario_e() {
        let text = with_parameters(
            "",
            "<solutions iteration=\"0\" ok=\"true\">\n<algorithm name=\"MVA\" iterations=\"3\">\n\
             <stationresults station=\"disk\">\n<classresults customerclass=\"c1\">\n\
             <measure meanValue=\"$X\" measureType=\"Throughput\" successful=\"true\"/>\n\
             </classresults>\n</stationresults>\n</algorithm>\n</solutions>\n",
        );
        let doc = Document::parse_str("e.jmva", &text, Options::default()).unwrap();
        assert_eq!(1, doc.warnings().count());
        assert!(doc.column_of("$X").is_none());
    }

    #[test]
    fn test_measures_and_saved_results() {
        let text = with_parameters(
            "",
            "<solutions iteration=\"2\" ok=\"true\">\n<algorithm name=\"MVA\" iterations=\"7\">\n\
             <stationresults station=\"p1\">\n\
             <measure meanValue=\"$U\" measureType=\"Utilization\" successful=\"true\"/>\n\
             <classresults customerclass=\"c1\">\n\
             <measure meanValue=\"0.5\" measureType=\"Throughput\" successful=\"true\"/>\n\
             </classresults>\n</stationresults>\n</algorithm>\n</solutions>\n",
        );
        let doc = Document::parse_str("m.jmva", &text, Options::default()).unwrap();
        assert_eq!(1, doc.result_variables().len());
        assert_eq!(Some(1), doc.column_of("$U"));
        let saved = &doc.saved_results()[&2];
        assert_eq!("MVA", saved.solver);
        assert_eq!(7, saved.iterations);
        assert_eq!(0.5, saved.stations["p1"]["c1"][&ResultKind::Throughput]);
    }

    #[test]
    fn test_duplicate_and_attribute_errors() {
        let text = with_parameters("<listation name=\"p1\"/>\n", "");
        let err = Document::parse_str("d.jmva", &text, Options::default()).unwrap_err();
        assert!(err.get_details().unwrap().contains("duplicate_symbol"));

        let text = with_parameters("", "").replace("population=\"4\"", "population=\"4\" colour=\"red\"");
        let err = Document::parse_str("d.jmva", &text, Options::default()).unwrap_err();
        assert!(err.get_details().unwrap().contains("colour"));

        let text = with_parameters("", "").replace("population=\"4\"", "population=\"4x\"");
        let err = Document::parse_str("d.jmva", &text, Options::default()).unwrap_err();
        assert!(err.get_details().unwrap().contains("invalid_literal"));
    }

    #[test]
    fn test_alg_params_attributes() {
        let valid = "<algParams><algType maxSamples=\"10000\" name=\"MVA\" tolerance=\"1.0E-7\"/>\
                     <compareAlgs value=\"false\"/></algParams>\n";
        assert!(Document::parse_str("p.jmva", &with_parameters("", valid), Options::default()).is_ok());

        let rest = "<algParams><algType name=\"MVA\" bogus=\"1\"/><compareAlgs value=\"false\" junk=\"x\"/>\
                    </algParams>\n<lqx extra=\"1\">print(1);</lqx>\n";
        let err = Document::parse_str("p.jmva", &with_parameters("", rest), Options::default())
            .unwrap_err();
        let details = err.get_details().unwrap();
        assert!(details.contains("<algType>: bogus"), "{details}");
        assert!(details.contains("<compareAlgs>: junk"), "{details}");
        assert!(details.contains("<lqx>: extra"), "{details}");
    }

    #[test]
    fn test_servers_warning() {
        let text = with_parameters("<delaystation name=\"z\" servers=\"2\"/>\n", "");
        let doc = Document::parse_str("w.jmva", &text, Options::default()).unwrap();
        let warning = doc.warnings().next().unwrap();
        assert_eq!(ErrorCode::InvalidParameter, warning.code);
        assert_eq!("delaystation", warning.element);
    }

    #[test]
    fn test_load_dependent_list() {
        let station = "<ldstation name=\"disk\" servers=\"1\"><servicetimes>\
                       <servicetimes customerclass=\"c1\">0.2;0.1;0.1;0.05</servicetimes>\
                       </servicetimes><visits><visit customerclass=\"c1\">1</visit></visits></ldstation>\n";
        let doc = Document::parse_str("ld.jmva", &with_parameters(station, ""), Options::default())
            .unwrap();
        let disk = doc.model().station("disk").unwrap();
        assert_eq!(StationType::Multiserver, disk.kind);
        assert_eq!(Some(3.0), disk.copies.as_const());
        assert_eq!(
            Some(0.2),
            disk.classes["c1"].service_time.as_ref().unwrap().as_const()
        );
    }

    #[test]
    fn test_variables_and_program() {
        let text = with_parameters("", "<pragma param=\"mva\" value=\"exact\"/>\n<lqx><![CDATA[println(\"hi\");]]></lqx>\n")
            .replace("population=\"4\"", "population=\"$users\"")
            .replace(">0.5<", ">$S1<");
        let doc = Document::parse_str("v.jmva", &text, Options::default()).unwrap();
        let vars = doc.variables();
        assert!(vars.referenced_variables().contains("$S1"));
        assert!(vars.input_variables().contains("$users"));
        assert!(doc.undefined_external_variables().is_empty());
        assert_eq!(Some(&"exact".to_owned()), doc.pragmas().get("mva"));
        let program = doc.embedded_program().unwrap();
        assert_eq!("println(\"hi\");", program.text);
        assert!(doc.original_population("c1").is_none());
    }

    #[test]
    fn test_fatal_errors() {
        let err = Document::parse_str("x.jmva", "<model></model><model/>", Options::default())
            .unwrap_err();
        assert_eq!(ErrorCode::UnexpectedElement, err.code);
        let err = Document::parse_str("x.jmva", "<model><parameters></model>", Options::default())
            .unwrap_err();
        assert_eq!(ErrorCode::XmlSyntax, err.code);
        let err = Document::parse_str("x.jmva", "", Options::default()).unwrap_err();
        assert_eq!(ErrorCode::XmlSyntax, err.code);
    }
}
