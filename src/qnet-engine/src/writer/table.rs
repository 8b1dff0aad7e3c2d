// Copyright 2021 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! CSV tables: the header of the experiment output, saved solver
//! results, and reading experiment output back.

use std::collections::HashMap;
use std::io::{Read, Write};

use serde::Serialize;

use qnet_core::common::{Error, ErrorCode, ErrorKind, Result};
use qnet_core::output_err;

use crate::document::{Document, measure_type};

fn csv_error(err: ::csv::Error) -> Error {
    Error::new(ErrorKind::Output, ErrorCode::Generic, Some(err.to_string()))
}

#[derive(Debug, Serialize)]
struct ResultRow<'a> {
    iteration: usize,
    solver: &'a str,
    station: &'a str,
    class: &'a str,
    measure: &'a str,
    value: f64,
}

/// Writes the column titles of the experiment output as one CSV record.
pub fn write_header<W: Write>(doc: &Document, out: W) -> Result<()> {
    let mut writer = ::csv::Writer::from_writer(out);
    writer.write_record(doc.csv_header()).map_err(csv_error)?;
    writer.flush()?;
    Ok(())
}

/// Tabulates the results saved in the document's solutions, one row per
/// iteration, station, class and measure.
pub fn write_results<W: Write>(doc: &Document, out: W) -> Result<usize> {
    let mut writer = ::csv::Writer::from_writer(out);
    let mut count = 0;
    for (iteration, saved) in doc.saved_results().iter() {
        for (station, classes) in saved.stations.iter() {
            for (class, values) in classes.iter() {
                for (kind, value) in values.iter() {
                    writer
                        .serialize(ResultRow {
                            iteration: *iteration,
                            solver: &saved.solver,
                            station,
                            class,
                            measure: measure_type(*kind),
                            value: *value,
                        })
                        .map_err(csv_error)?;
                    count += 1;
                }
            }
        }
    }
    writer.flush()?;
    Ok(count)
}

/// Experiment output read back into columns.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Table {
    pub offsets: HashMap<String, usize>,
    pub rows: Vec<Vec<f64>>,
}

impl Table {
    pub fn column(&self, name: &str) -> Option<Vec<f64>> {
        let i = *self.offsets.get(name)?;
        self.rows.iter().map(|row| row.get(i).copied()).collect()
    }
}

/// Reads the rows the experiment program prints.  Fields may be padded
/// with spaces; lines that are not numeric, such as solver failures,
/// are skipped.
pub fn read_table<R: Read>(input: R) -> Result<Table> {
    let mut rdr = ::csv::ReaderBuilder::new()
        .trim(::csv::Trim::All)
        .flexible(true)
        .from_reader(input);

    let headers = rdr.headers().map_err(csv_error)?.clone();
    let mut offsets = HashMap::with_capacity(headers.len());
    for (i, name) in headers.iter().enumerate() {
        if offsets.insert(name.to_owned(), i).is_some() {
            return output_err!(DuplicateSymbol, format!("column {name}"));
        }
    }

    let mut rows = vec![];
    for record in rdr.records() {
        let record = record.map_err(csv_error)?;
        if record.len() != headers.len() {
            continue;
        }
        let row: std::result::Result<Vec<f64>, _> =
            record.iter().map(|field| field.parse::<f64>()).collect();
        if let Ok(row) = row {
            rows.push(row);
        }
    }
    Ok(Table { offsets, rows })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Options;
    use std::collections::BTreeMap;
    use qnet_core::model::ResultKind;

    const MODEL: &str = r#"<?xml version="1.0"?>
<model>
  <parameters>
    <classes number="1"><closedclass name="c1" population="2"/></classes>
    <stations number="1">
      <listation name="p1">
        <servicetimes><servicetime customerclass="c1">0.5</servicetime></servicetimes>
        <visits><visit customerclass="c1">1</visit></visits>
      </listation>
    </stations>
  </parameters>
  <whatIf className="c1" type="Customer Numbers" values="1;2"/>
</model>
"#;

    #[test]
    fn test_write_header() {
        let doc = Document::parse_str("t.jmva", MODEL, Options::default()).unwrap();
        let mut out = vec![];
        write_header(&doc, &mut out).unwrap();
        let out = String::from_utf8(out).unwrap();
        assert!(out.starts_with("$N1,$Q_p1,$R_p1,$U_p1,$X_p1,"));
        assert!(out.ends_with("$T_c1,$X_c1\n"));
    }

    #[test]
    fn test_write_results() {
        let mut doc = Document::parse_str("t.jmva", MODEL, Options::default()).unwrap();
        let mut values = BTreeMap::new();
        values.insert(ResultKind::Throughput, 1.5);
        values.insert(ResultKind::Utilization, 0.75);
        doc.save_results(1, "MVA", 4, "p1", "c1", &values);

        let mut out = vec![];
        assert_eq!(2, write_results(&doc, &mut out).unwrap());
        assert_eq!(
            "iteration,solver,station,class,measure,value\n\
             1,MVA,p1,c1,Throughput,1.5\n\
             1,MVA,p1,c1,Utilization,0.75\n",
            String::from_utf8(out).unwrap()
        );
    }

    #[test]
    fn test_read_table() {
        let text = "$N1, $X_c1\n1, 0.5\nsolver failed: $0=2\n3, 1.25\n";
        let table = read_table(text.as_bytes()).unwrap();
        assert_eq!(2, table.rows.len());
        assert_eq!(Some(vec![1.0, 3.0]), table.column("$N1"));
        assert_eq!(Some(vec![0.5, 1.25]), table.column("$X_c1"));
        assert_eq!(None, table.column("$X_c2"));
    }

    #[test]
    fn test_read_table_rejects_duplicate_columns() {
        let err = read_table("a,a,b\n1,2\n".as_bytes()).unwrap_err();
        assert_eq!(ErrorCode::DuplicateSymbol, err.code);

        let table = read_table("a,b,c\n1,2\n4,5,6\n".as_bytes()).unwrap();
        assert_eq!(Some(vec![6.0]), table.column("c"));
    }
}
