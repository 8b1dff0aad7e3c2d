// Copyright 2021 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Gnuplot scripts.
//!
//! A plot appends statements to the document's gnuplot section; the
//! synthesized program prints the sweep results into an inline `$DATA`
//! block and then runs those statements.  Numbers that depend on sweep
//! variables are left as expressions and evaluated when the program
//! prints them.

use std::collections::BTreeMap;
use std::mem;
use std::path::Path;

use ordered_float::OrderedFloat;
use tracing::debug;

use qnet_core::common::Result;
use qnet_core::expr::{self, Expr, ExprRef};
use qnet_core::model::{Bound, Model, ResultKind, Station};
use qnet_core::output_err;
use qnet_core::program::Stmt;

use super::fmt_number;
use crate::document::Document;

const DATA: &str = "\"$DATA\"";
const BOUNDS: &str = "\"$BOUNDS\"";
const CONTINUATION: &str = ",\\\n     ";

/// One line of script text, some parts of which may only be known at
/// run time.
#[derive(Default)]
struct Line {
    args: Vec<ExprRef>,
    text: String,
}

impl Line {
    fn new(text: &str) -> Self {
        Line {
            args: vec![],
            text: text.to_owned(),
        }
    }

    fn push(&mut self, text: &str) -> &mut Self {
        self.text.push_str(text);
        self
    }

    fn push_expr(&mut self, value: &ExprRef) -> &mut Self {
        match value.as_const() {
            Some(n) => self.text.push_str(&fmt_number(n)),
            None => {
                self.flush();
                self.args.push(value.clone());
            }
        }
        self
    }

    fn flush(&mut self) {
        if !self.text.is_empty() {
            self.args.push(Expr::string(&mem::take(&mut self.text)));
        }
    }

    fn into_stmt(mut self) -> Stmt {
        self.flush();
        Stmt::Print {
            separator: None,
            args: self.args,
        }
    }
}

fn text(line: &str) -> Stmt {
    Line::new(line).into_stmt()
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Point { x, y }
    }

    fn key(self) -> (OrderedFloat<f64>, OrderedFloat<f64>) {
        (OrderedFloat(self.x), OrderedFloat(self.y))
    }
}

/// Where the line through `p1` and `p2` crosses the line through `p3`
/// and `p4`.  Parallel lines meet at the origin.
pub fn intersect(p1: Point, p2: Point, p3: Point, p4: Point) -> Point {
    let denominator = (p1.x - p2.x) * (p3.y - p4.y) - (p1.y - p2.y) * (p3.x - p4.x);
    if denominator == 0.0 {
        return Point::new(0.0, 0.0);
    }
    let n1 = p1.x * p2.y - p1.y * p2.x;
    let n2 = p3.x * p4.y - p3.y * p4.x;
    Point::new(
        (n1 * (p3.x - p4.x) - (p1.x - p2.x) * n2) / denominator,
        (n1 * (p3.y - p4.y) - (p1.y - p2.y) * n2) / denominator,
    )
}

/// Utilization bounds of a two-class network.
///
/// In throughput space every queueing station limits the two classes to
/// the region below the line from `(0, 1/Dy)` to `(1/Dx, 0)`.  The
/// corners of the feasible region are the intercepts of those lines
/// with each other and with the axes; at each corner the utilization of
/// every queueing station is recorded, in station name order.
#[derive(Clone, Debug, Default)]
pub struct Intercepts {
    stations: Vec<String>,
    throughput: Option<Point>,
    points: BTreeMap<(OrderedFloat<f64>, OrderedFloat<f64>), Vec<f64>>,
}

impl Intercepts {
    /// Computes the bounds for chains `x` and `y`, using `value` to
    /// reduce demands to numbers.
    pub fn new<F>(model: &Model, x: &str, y: &str, value: F) -> Self
    where
        F: Fn(&ExprRef) -> f64,
    {
        let demand = |station: &Station, chain: &str| {
            Bound::demand(station, chain)
                .map(|d| value(&d))
                .unwrap_or(0.0)
        };

        let mut intercepts = Intercepts::default();
        let mut demands = vec![];
        let mut lines = vec![];
        let mut d_max = Point::new(0.0, 0.0);
        for (name, station) in model.stations.iter().filter(|(_, m)| m.kind.is_queueing()) {
            let d = Point::new(demand(station, x), demand(station, y));
            intercepts.stations.push(name.clone());
            demands.push(d);
            if d.x == 0.0 && d.y == 0.0 {
                continue;
            }
            d_max = Point::new(d_max.x.max(d.x), d_max.y.max(d.y));
            // axis intercepts, truncated at 1e20
            lines.push(Point::new(1.0 / d.x.max(1e-20), 1.0 / d.y.max(1e-20)));
        }
        if lines.is_empty() {
            return intercepts;
        }

        let mut corners = vec![];
        for (i, l1) in lines.iter().enumerate() {
            for l2 in lines[i + 1..].iter() {
                corners.push(intersect(
                    Point::new(0.0, l1.y),
                    Point::new(l1.x, 0.0),
                    Point::new(0.0, l2.y),
                    Point::new(l2.x, 0.0),
                ));
            }
        }

        let tput = Point::new(1.0 / d_max.x.max(1e-20), 1.0 / d_max.y.max(1e-20));
        intercepts.throughput = Some(tput);
        for (index, d) in demands.iter().enumerate() {
            intercepts.add(Point::new(0.0, tput.y), index, d.y * tput.y);
            for p in corners.iter() {
                if p.x < 0.0 || tput.x < p.x || p.y < 0.0 || tput.y < p.y {
                    debug!(x = p.x, y = p.y, "infeasible intercept");
                    continue;
                }
                intercepts.add(*p, index, (d.x * p.x + d.y * p.y).min(1.0));
            }
            intercepts.add(Point::new(tput.x, 0.0), index, d.x * tput.x);
        }
        intercepts
    }

    fn add(&mut self, p: Point, index: usize, utilization: f64) {
        let n = self.stations.len();
        let values = self.points.entry(p.key()).or_insert_with(|| vec![0.0; n]);
        values[index] = utilization;
    }

    /// Queueing stations, in the order of the utilization vectors.
    pub fn stations(&self) -> &[String] {
        &self.stations
    }

    /// `(1/Dmax_x, 1/Dmax_y)`, the largest throughput of each class
    /// alone.  `None` when no station has a demand.
    pub fn throughput(&self) -> Option<Point> {
        self.throughput
    }

    /// Corners ordered by x, then y, with per-station utilization.
    pub fn iter(&self) -> impl Iterator<Item = (Point, &[f64])> {
        self.points
            .iter()
            .map(|((x, y), values)| (Point::new(x.0, y.0), values.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn max_x(&self) -> f64 {
        self.points
            .keys()
            .next_back()
            .map(|(x, _)| x.0)
            .unwrap_or(0.0)
    }
}

impl Document {
    /// Appends a gnuplot script plotting `kind`.
    ///
    /// With a population mix, throughput is plotted class against class
    /// and utilization against the mix.  Otherwise `arg` selects the
    /// curves: nothing plots every chain with its asymptotic bounds, a
    /// class plots it at every station, and a station plots every class
    /// there.
    pub fn plot(&mut self, kind: ResultKind, arg: Option<&str>) -> Result<()> {
        let output = Path::new(self.input_file_name()).with_extension("svg");
        let mut script = vec![
            text(&format!("set title \"{}\"", self.model().comment)),
            text(&format!("#set output \"{}\"", output.display())),
            text("#set terminal svg"),
        ];

        self.define_default_results();

        let mut plot = Line::new("plot ");
        let mut trailer = vec![];
        let mix = self.population_mix().is_some();
        match arg {
            _ if mix && kind == ResultKind::Throughput => {
                self.plot_throughput_vs_mix(&mut script, &mut plot)?
            }
            _ if mix && kind == ResultKind::Utilization => {
                trailer = self.plot_utilization_vs_mix(&mut script, &mut plot)?
            }
            None => self.plot_chains(kind, &mut script, &mut plot)?,
            Some(arg) if self.model().chains.contains_key(arg) => {
                self.plot_class(kind, arg, &mut script, &mut plot)?
            }
            Some(arg) if self.model().stations.contains_key(arg) => {
                self.plot_station(kind, arg, &mut script, &mut plot)?
            }
            Some(arg) => return output_err!(UndefinedSymbol, format!("{arg} is not a class or station")),
        }

        script.push(text("set datafile separator \",\""));
        script.push(plot.into_stmt());
        script.extend(trailer);
        self.gnuplot_mut().extend(script);
        Ok(())
    }

    fn x_axis(&self) -> Result<&str> {
        match self.independent_variables().first() {
            Some(name) => Ok(name.as_str()),
            None => output_err!(NotAWhatIf, "nothing is varied".to_owned()),
        }
    }

    fn column(&self, name: Option<&String>) -> Result<usize> {
        match name.and_then(|name| self.column_of(name)) {
            Some(column) => Ok(column),
            None => output_err!(UndefinedSymbol, "result is not observed".to_owned()),
        }
    }

    fn axis_labels(&self, kind: ResultKind, script: &mut Vec<Stmt>) -> Result<()> {
        script.push(text(&format!("set xlabel \"{}\"", self.x_axis()?)));
        script.push(text(&format!("set ylabel \"{}\"", kind.label())));
        Ok(())
    }

    fn plot_class(
        &self,
        kind: ResultKind,
        class: &str,
        script: &mut Vec<Stmt>,
        plot: &mut Line,
    ) -> Result<()> {
        self.axis_labels(kind, script)?;
        script.push(text(&format!("set key title \"Class {class}\"")));
        script.push(text("set key top left box"));

        let mut count = 0;
        for (name, station) in self.model().stations.iter() {
            if station.reference || !station.has_class(class) {
                continue;
            }
            let result = if station.classes.len() == 1 {
                station.results.get(&kind)
            } else {
                station.classes[class].results.get(&kind)
            };
            if count > 0 {
                plot.push(", ");
            }
            plot.push(&format!(
                "{DATA} using 1:{} with linespoints title \"{name}\"",
                self.column(result)?
            ));
            count += 1;
        }
        Ok(())
    }

    fn plot_station(
        &self,
        kind: ResultKind,
        name: &str,
        script: &mut Vec<Stmt>,
        plot: &mut Line,
    ) -> Result<()> {
        self.axis_labels(kind, script)?;
        script.push(text(&format!("set key title \"Station {name}\"")));
        script.push(text("set key top left box"));

        let station = &self.model().stations[name];
        if station.classes.len() == 1 {
            let column = self.column(station.results.get(&kind))?;
            plot.push(&format!("{DATA} using 1:{column} with linespoints"));
            return Ok(());
        }
        for (i, (class, demand)) in station.classes.iter().enumerate() {
            if i > 0 {
                plot.push(", ");
            }
            plot.push(&format!(
                "{DATA} using 1:{} with linespoints title \"{class}\"",
                self.column(demand.results.get(&kind))?
            ));
        }
        Ok(())
    }

    /// Every chain against the first sweep axis, with its two asymptotic
    /// bounds and their crossing point `N*` labelled.
    fn plot_chains(&self, kind: ResultKind, script: &mut Vec<Stmt>, plot: &mut Line) -> Result<()> {
        if kind != ResultKind::Throughput && kind != ResultKind::ResponseTime {
            return output_err!(
                InvalidParameter,
                format!("{} cannot be plotted by chain", kind.label())
            );
        }

        self.axis_labels(kind, script)?;
        if kind == ResultKind::Throughput {
            script.push(text("set key bottom right"));
        } else {
            script.push(text("set key top left"));
        }
        script.push(text("set key box"));

        let x = self.x_axis()?;
        let axis = match self.whatif(x) {
            Some(axis) if axis.size() > 1 => axis,
            _ => return output_err!(NotAWhatIf, format!("{x} is not a whatif")),
        };
        let x_max = Expr::constant(axis.max());

        let model = self.model();
        let prefix = |name: &str| {
            if model.chains.len() > 1 {
                format!("{name} ")
            } else {
                String::new()
            }
        };

        let mut n_labels = 0;
        let mut y_max: Option<ExprRef> = None;
        for (i, (name, chain)) in model.chains.iter().enumerate() {
            let bounds = Bound::new(name, model);
            if i > 0 {
                plot.push(", ");
            }
            plot.push(&format!(
                "{DATA} using 1:{} with linespoints title \"{}MVA\"",
                self.column(chain.results.get(&kind))?,
                prefix(name)
            ));

            let n_star = bounds.n_star();
            let (bound, title1, title2) = if kind == ResultKind::Throughput {
                (
                    expr::reciprocal(Some(bounds.d_max())).unwrap_or_else(|| Expr::constant(0.0)),
                    "1/Dmax",
                    "1/(Dsum+Z)",
                )
            } else {
                (bounds.d_sum(), "Dsum", "N*Dmax-Z")
            };

            n_labels += 1;
            let mut label = Line::new(&format!("set label {n_labels} \""));
            label
                .push_expr(&bound)
                .push("\" at 0.2,")
                .push_expr(&bound)
                .push(" * 1.02,0 left");
            script.push(label.into_stmt());

            n_labels += 1;
            let mut label = Line::new(&format!("set label {n_labels} \"N*="));
            label
                .push_expr(&n_star)
                .push("\" at ")
                .push_expr(&n_star)
                .push(",")
                .push_expr(&bound)
                .push("* 1.02,0 right");
            script.push(label.into_stmt());

            plot.push(", ")
                .push_expr(&bound)
                .push(&format!(" with lines title \"{}{title1}\"", prefix(name)));
            if kind == ResultKind::Throughput {
                let total = expr::add(Some(bounds.d_sum()), Some(bounds.z_sum()))
                    .unwrap_or_else(|| Expr::constant(0.0));
                plot.push(", x/(").push_expr(&total);
                y_max = expr::max(y_max, Some(bound.clone()));
            } else {
                plot.push(", (x*")
                    .push_expr(&bounds.d_max())
                    .push("-")
                    .push_expr(&bounds.z_sum());
                y_max = expr::max(
                    y_max,
                    expr::subtract(
                        expr::multiply(Some(x_max.clone()), Some(bounds.d_max())),
                        Some(bounds.z_sum()),
                    ),
                );
            }
            plot.push(&format!(") with lines title \"{}{title2}\"", prefix(name)));
        }

        if let Some(y_max) = y_max {
            let mut yrange = Line::new("set yrange [0:");
            yrange.push_expr(&y_max).push(" * 1.10]");
            script.push(yrange.into_stmt());
        }
        Ok(())
    }

    /// Class 1 throughput against class 2 throughput, with the line each
    /// queueing station bounds them by.
    fn plot_throughput_vs_mix(&self, script: &mut Vec<Stmt>, plot: &mut Line) -> Result<()> {
        let mix = match self.population_mix() {
            Some(mix) => mix,
            None => return output_err!(PopulationMix, "no population mix".to_owned()),
        };
        let model = self.model();
        let (x, y) = (mix.class1.as_str(), mix.class2.as_str());
        let chain_column = |name: &str| {
            self.column(
                model
                    .chain(name)
                    .and_then(|k| k.results.get(&ResultKind::Throughput)),
            )
        };

        script.push(text(&format!("set xlabel \"{x} Throughput\"")));
        script.push(text(&format!("set ylabel \"{y} Throughput\"")));
        script.push(text("set key bottom left box"));

        plot.push(&format!(
            "{DATA} using {}:{} with linespoints title \"MVA\"",
            chain_column(x)?,
            chain_column(y)?
        ));

        let mut x_max: Option<ExprRef> = None;
        let mut y_max: Option<ExprRef> = None;
        for (name, station) in model.stations.iter().filter(|(_, m)| m.kind.is_queueing()) {
            let d_x = Bound::demand(station, x);
            let d_y = Bound::demand(station, y);
            if d_x.is_none() && d_y.is_none() {
                continue;
            }
            x_max = expr::max(x_max, d_x.clone());
            y_max = expr::max(y_max, d_y.clone());

            let d_x = d_x.unwrap_or_else(|| Expr::constant(0.0));
            plot.push(CONTINUATION);
            match d_y {
                Some(d_y) if !expr::is_default(Some(&d_y), 0.0) => {
                    plot.push("t,(1-t*").push_expr(&d_x).push(")/").push_expr(&d_y);
                }
                _ => {
                    plot.push("1/").push_expr(&d_x).push(",t");
                }
            }
            plot.push(&format!(" with lines title \"{name} Bound\""));
        }

        if expr::is_default(x_max.as_ref(), 0.0) || expr::is_default(y_max.as_ref(), 0.0) {
            debug!("throughput bounds have no range");
            return Ok(());
        }
        let scale = Some(Expr::constant(1.05));
        let (x_pos, y_pos) = match (expr::reciprocal(x_max), expr::reciprocal(y_max)) {
            (Some(x_pos), Some(y_pos)) => (x_pos, y_pos),
            _ => return Ok(()),
        };
        script.push(text("set parametric"));
        for (range, pos) in [("xrange", &x_pos), ("trange", &x_pos), ("yrange", &y_pos)] {
            let mut line = Line::new(&format!("set {range} [0:"));
            if let Some(scaled) = expr::multiply(Some(pos.clone()), scale.clone()) {
                line.push_expr(&scaled);
            }
            line.push("]");
            script.push(line.into_stmt());
        }

        let (x_value, y_value) = (self.value_of(&x_pos), self.value_of(&y_pos));
        let mut label = Line::new("set label \"(0,");
        label.push_expr(&y_pos).push(&format!(
            ")\" at {},{} left",
            fmt_number(x_value * 0.01),
            fmt_number(y_value)
        ));
        script.push(label.into_stmt());
        let mut label = Line::new("set label \"(");
        label.push_expr(&x_pos).push(&format!(
            ",0)\" at {},{} right",
            fmt_number(x_value),
            fmt_number(y_value * 0.03)
        ));
        script.push(label.into_stmt());
        Ok(())
    }

    /// Station utilization against the population mix, followed by the
    /// piecewise utilization bounds.  Returns the statements that draw
    /// the bounds once the plot exists.
    fn plot_utilization_vs_mix(&self, script: &mut Vec<Stmt>, plot: &mut Line) -> Result<Vec<Stmt>> {
        let mix = match self.population_mix() {
            Some(mix) => mix,
            None => return output_err!(PopulationMix, "no population mix".to_owned()),
        };
        let kind = ResultKind::Utilization;

        let xtics: Vec<String> = mix
            .axis1
            .iter()
            .zip(mix.axis2.iter())
            .map(|((beta, n1), (_, n2))| {
                format!(
                    "\"({},{})\" {}",
                    fmt_number(*n1),
                    fmt_number(*n2),
                    fmt_number(*beta)
                )
            })
            .collect();
        script.push(text(&format!("set xtics ({})", xtics.join(", "))));
        script.push(text(&format!(
            "set xlabel \" Customers ({},{})\"",
            mix.class1, mix.class2
        )));
        script.push(text(&format!("set ylabel \"{}\"", kind.label())));
        script.push(text("set key title \"Station\" box"));

        let model = self.model();
        for (i, (name, station)) in model
            .stations
            .iter()
            .filter(|(_, m)| m.kind.is_queueing())
            .enumerate()
        {
            if i > 0 {
                plot.push(CONTINUATION);
            }
            plot.push(&format!(
                "{DATA} using 1:{} with linespoints title \"{name}\"",
                self.column(station.results.get(&kind))?
            ));
        }

        let intercepts = Intercepts::new(model, &mix.class1, &mix.class2, |d| self.value_of(d));
        if intercepts.is_empty() {
            return Ok(vec![]);
        }

        // x is normalized to 0..1 like Beta
        let max_x = intercepts.max_x();
        let mut trailer = vec![text("$BOUNDS << EOF")];
        for (p, values) in intercepts.iter() {
            let x = if max_x > 0.0 { p.x / max_x } else { p.x };
            let mut row = vec![fmt_number(x)];
            row.extend(values.iter().map(|u| fmt_number(*u)));
            trailer.push(text(&row.join(",")));
        }
        trailer.push(text("EOF"));

        let replot: Vec<String> = intercepts
            .stations()
            .iter()
            .enumerate()
            .map(|(i, name)| {
                format!(
                    "{BOUNDS} using 1:{} with lines dt 2 title \"{name} bound\"",
                    i + 2
                )
            })
            .collect();
        trailer.push(text(&format!("replot {}", replot.join(CONTINUATION))));
        Ok(trailer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Options;
    use float_cmp::approx_eq;
    use proptest::prelude::*;
    use qnet_core::common::ErrorCode;
    use qnet_core::model::{Demand, StationType};

    const NETWORK: &str = r#"<?xml version="1.0"?>
<model>
  <description>Bottlenecks</description>
  <parameters>
    <classes number="2">
      <closedclass name="c1" population="4" thinktime="0"/>
      <closedclass name="c2" population="4" thinktime="0"/>
    </classes>
    <stations number="3">
      <delaystation name="terminal">
        <servicetimes>
          <servicetime customerclass="c1">1</servicetime>
          <servicetime customerclass="c2">1</servicetime>
        </servicetimes>
        <visits>
          <visit customerclass="c1">1</visit>
          <visit customerclass="c2">1</visit>
        </visits>
      </delaystation>
      <listation name="cpu">
        <servicetimes>
          <servicetime customerclass="c1">0.5</servicetime>
          <servicetime customerclass="c2">0.25</servicetime>
        </servicetimes>
        <visits>
          <visit customerclass="c1">2</visit>
          <visit customerclass="c2">2</visit>
        </visits>
      </listation>
      <listation name="disk">
        <servicetimes>
          <servicetime customerclass="c1">0.5</servicetime>
          <servicetime customerclass="c2">1</servicetime>
        </servicetimes>
        <visits>
          <visit customerclass="c1">1</visit>
          <visit customerclass="c2">1</visit>
        </visits>
      </listation>
    </stations>
    <ReferenceStation number="2">
      <Class name="c1" refStation="terminal"/>
      <Class name="c2" refStation="terminal"/>
    </ReferenceStation>
  </parameters>
  WHATIF
</model>
"#;

    fn network(whatif: &str) -> Document {
        let text = NETWORK.replace("WHATIF", whatif);
        Document::parse_str("net.jmva", &text, Options::default()).unwrap()
    }

    /// The script as the program would print it at the first sweep point.
    fn script(doc: &mut Document) -> Vec<String> {
        let mut env = doc.environment();
        let mut lines = vec![];
        for stmt in doc.gnuplot_mut().iter() {
            if let Stmt::Print { args, .. } = stmt {
                let line: Vec<String> = args
                    .iter()
                    .map(|arg| arg.eval(&mut env).unwrap().to_string())
                    .collect();
                lines.push(line.concat());
            }
        }
        lines
    }

    #[test]
    fn test_intersect() {
        let p = intersect(
            Point::new(0.0, 1.0),
            Point::new(2.0, 0.0),
            Point::new(0.0, 2.0),
            Point::new(1.0, 0.0),
        );
        assert!(approx_eq!(f64, 2.0 / 3.0, p.x, epsilon = 1e-12));
        assert!(approx_eq!(f64, 2.0 / 3.0, p.y, epsilon = 1e-12));

        let parallel = intersect(
            Point::new(0.0, 1.0),
            Point::new(1.0, 0.0),
            Point::new(0.0, 2.0),
            Point::new(2.0, 0.0),
        );
        assert_eq!(Point::new(0.0, 0.0), parallel);
    }

    #[test]
    fn test_intercepts() {
        let doc = network("");
        let intercepts =
            Intercepts::new(doc.model(), "c1", "c2", |d| d.as_const().unwrap_or(0.0));
        assert_eq!(&["cpu".to_owned(), "disk".to_owned()], intercepts.stations());
        assert_eq!(Some(Point::new(1.0, 1.0)), intercepts.throughput());
        assert_eq!(3, intercepts.len());
        assert_eq!(1.0, intercepts.max_x());

        let corners: Vec<(Point, Vec<f64>)> = intercepts
            .iter()
            .map(|(p, values)| (p, values.to_vec()))
            .collect();
        assert_eq!(Point::new(0.0, 1.0), corners[0].0);
        assert_eq!(vec![0.5, 1.0], corners[0].1);
        assert!(approx_eq!(f64, 2.0 / 3.0, corners[1].0.x, epsilon = 1e-12));
        assert!(approx_eq!(f64, 1.0, corners[1].1[0], epsilon = 1e-12));
        assert!(approx_eq!(f64, 1.0, corners[1].1[1], epsilon = 1e-12));
        assert_eq!(Point::new(1.0, 0.0), corners[2].0);
        assert_eq!(vec![1.0, 0.5], corners[2].1);
    }

    #[test]
    fn test_intercepts_without_demand() {
        let mut model = Model::new();
        model
            .insert_closed_chain("a", Expr::constant(1.0), Expr::constant(0.0))
            .unwrap();
        model
            .insert_closed_chain("b", Expr::constant(1.0), Expr::constant(0.0))
            .unwrap();
        model
            .insert_station("idle", Station::new(StationType::LoadIndependent, Expr::constant(1.0)))
            .unwrap();
        let intercepts = Intercepts::new(&model, "a", "b", |d| d.as_const().unwrap_or(0.0));
        assert!(intercepts.is_empty());
        assert_eq!(None, intercepts.throughput());
        assert_eq!(1, intercepts.stations().len());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(256))]

        #[test]
        fn test_intercepts_are_feasible(
            demands in prop::collection::vec((0.0f64..10.0, 0.0f64..10.0), 1..6)
        ) {
            let mut model = Model::new();
            model.insert_closed_chain("a", Expr::constant(1.0), Expr::constant(0.0)).unwrap();
            model.insert_closed_chain("b", Expr::constant(1.0), Expr::constant(0.0)).unwrap();
            for (i, (a, b)) in demands.iter().enumerate() {
                let station = model
                    .insert_station(&format!("m{i}"), Station::new(StationType::LoadIndependent, Expr::constant(1.0)))
                    .unwrap();
                *station.demand_mut("a") = Demand::new(Expr::constant(*a), Expr::constant(1.0));
                *station.demand_mut("b") = Demand::new(Expr::constant(*b), Expr::constant(1.0));
            }

            let intercepts = Intercepts::new(&model, "a", "b", |d| d.as_const().unwrap_or(0.0));
            prop_assert_eq!(demands.len(), intercepts.stations().len());
            if let Some(tput) = intercepts.throughput() {
                let mut last_x = f64::NEG_INFINITY;
                for (p, values) in intercepts.iter() {
                    prop_assert!(p.x >= 0.0 && p.x <= tput.x);
                    prop_assert!(p.y >= 0.0 && p.y <= tput.y);
                    prop_assert!(p.x >= last_x);
                    last_x = p.x;
                    prop_assert_eq!(demands.len(), values.len());
                    for u in values.iter() {
                        prop_assert!(*u >= 0.0 && *u <= 1.0 + 1e-9);
                    }
                }
            } else {
                prop_assert!(intercepts.is_empty());
            }
        }
    }

    #[test]
    fn test_plot_chains() {
        let mut doc = network(r#"<whatIf className="c1" type="Customer Numbers" values="1;2;3;4"/>"#);
        doc.plot(ResultKind::Throughput, None).unwrap();
        let lines = script(&mut doc);

        assert_eq!("set title \"Bottlenecks\"", lines[0]);
        assert_eq!("#set output \"net.svg\"", lines[1]);
        assert_eq!("set xlabel \"$N1\"", lines[3]);
        assert_eq!("set ylabel \"Throughput\"", lines[4]);
        assert_eq!("set key bottom right", lines[5]);
        assert!(lines.contains(&"set label 1 \"1\" at 0.2,1 * 1.02,0 left".to_owned()));
        assert!(lines.contains(&"set label 2 \"N*=2.5\" at 2.5,1* 1.02,0 right".to_owned()));
        assert!(lines.contains(&"set yrange [0:1 * 1.10]".to_owned()));

        let plot = lines.last().unwrap();
        let x_c1 = doc.column_of("$X_c1").unwrap();
        assert!(plot.starts_with(&format!(
            "plot \"$DATA\" using 1:{x_c1} with linespoints title \"c1 MVA\""
        )));
        assert!(plot.contains(", 1 with lines title \"c1 1/Dmax\", x/(2.5) with lines"));
        assert!(plot.contains("title \"c2 1/(Dsum+Z)\""));

        // the data block comes before the script
        let program = format!("{}", doc.program());
        let data = program.find("$DATA << EOF").unwrap();
        assert!(data < program.find("set datafile separator").unwrap());
    }

    #[test]
    fn test_plot_response_time_tracks_sweep() {
        let mut doc = network(r#"<whatIf className="c1" type="Customer Numbers" values="1;2;3;4"/>"#);
        doc.plot(ResultKind::ResponseTime, None).unwrap();
        let lines = script(&mut doc);
        assert!(lines.contains(&"set key top left".to_owned()));
        // 4 * Dmax - Z
        assert!(lines.contains(&"set yrange [0:3 * 1.10]".to_owned()));
        assert!(lines.last().unwrap().contains(", (x*1-1) with lines title \"c1 N*Dmax-Z\""));

        let err = doc.plot(ResultKind::Utilization, None).unwrap_err();
        assert_eq!(ErrorCode::InvalidParameter, err.code);
    }

    #[test]
    fn test_plot_class_and_station() {
        let mut doc = network(r#"<whatIf className="c1" type="Customer Numbers" values="1;2;3"/>"#);
        doc.plot(ResultKind::Utilization, Some("c2")).unwrap();
        let lines = script(&mut doc);
        assert!(lines.contains(&"set key title \"Class c2\"".to_owned()));
        let cpu = doc.column_of("$U_cpu(c2)").unwrap();
        let disk = doc.column_of("$U_disk(c2)").unwrap();
        assert_eq!(
            &format!(
                "plot \"$DATA\" using 1:{cpu} with linespoints title \"cpu\", \
                 \"$DATA\" using 1:{disk} with linespoints title \"disk\""
            ),
            lines.last().unwrap()
        );

        let mut doc = network(r#"<whatIf className="c1" type="Customer Numbers" values="1;2;3"/>"#);
        doc.plot(ResultKind::QueueLength, Some("disk")).unwrap();
        let lines = script(&mut doc);
        assert!(lines.contains(&"set key title \"Station disk\"".to_owned()));
        assert!(lines.last().unwrap().ends_with("with linespoints title \"c2\""));

        let err = doc.plot(ResultKind::QueueLength, Some("tape")).unwrap_err();
        assert_eq!(ErrorCode::UndefinedSymbol, err.code);
    }

    #[test]
    fn test_plot_needs_a_sweep() {
        let mut doc = network(r#"<whatIf className="c1" type="Customer Numbers" values="4"/>"#);
        let err = doc.plot(ResultKind::Throughput, None).unwrap_err();
        assert_eq!(ErrorCode::NotAWhatIf, err.code);

        let mut doc = network("");
        let err = doc.plot(ResultKind::Throughput, None).unwrap_err();
        assert_eq!(ErrorCode::NotAWhatIf, err.code);
    }

    #[test]
    fn test_plot_throughput_vs_mix() {
        let mut doc = network(r#"<whatIf className="c1" type="Population Mix" values="0.25;0.5;0.75"/>"#);
        doc.plot(ResultKind::Throughput, None).unwrap();
        let lines = script(&mut doc);
        assert!(lines.contains(&"set xlabel \"c1 Throughput\"".to_owned()));
        assert!(lines.contains(&"set parametric".to_owned()));
        assert!(lines.contains(&"set xrange [0:1.05]".to_owned()));
        assert!(lines.contains(&"set label \"(0,1)\" at 0.01,1 left".to_owned()));

        let plot = lines.last().unwrap();
        let x = doc.column_of("$X_c1").unwrap();
        let y = doc.column_of("$X_c2").unwrap();
        assert!(plot.starts_with(&format!("plot \"$DATA\" using {x}:{y} with linespoints title \"MVA\"")));
        assert!(plot.contains("t,(1-t*1)/0.5 with lines title \"cpu Bound\""));
        assert!(plot.contains("t,(1-t*0.5)/1 with lines title \"disk Bound\""));
    }

    #[test]
    fn test_plot_utilization_vs_mix() {
        let mut doc = network(r#"<whatIf className="c1" type="Population Mix" values="0.25;0.5;0.75"/>"#);
        doc.plot(ResultKind::Utilization, None).unwrap();
        let lines = script(&mut doc);
        assert!(lines.contains(&"set xtics (\"(1,3)\" 0.25, \"(2,2)\" 0.5, \"(3,1)\" 0.75)".to_owned()));
        assert!(lines.contains(&"set xlabel \" Customers (c1,c2)\"".to_owned()));

        let start = lines.iter().position(|l| l == "$BOUNDS << EOF").unwrap();
        assert_eq!("0,0.5,1", lines[start + 1]);
        assert_eq!("1,1,0.5", lines[start + 3]);
        assert_eq!("EOF", lines[start + 4]);
        assert!(lines[start - 1].starts_with("plot \"$DATA\" using 1:"));
        assert_eq!(
            "replot \"$BOUNDS\" using 1:2 with lines dt 2 title \"cpu bound\",\\\n     \
             \"$BOUNDS\" using 1:3 with lines dt 2 title \"disk bound\"",
            lines[start + 5]
        );
    }
}
