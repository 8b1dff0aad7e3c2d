// Copyright 2021 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Output formats for a parsed document: the document itself (round
//! trip or export), CSV tables and gnuplot scripts.

use std::io::{Cursor, Write};

use quick_xml::Writer;
use quick_xml::events::{BytesCData, BytesDecl, BytesEnd, BytesStart, BytesText, Event};

use qnet_core::common::{Error, ErrorCode, ErrorKind, Result};

pub mod plot;
pub mod table;
pub mod xml;

pub use self::plot::{Intercepts, Point};

pub(crate) trait ToXml<W: Clone + Write> {
    fn write_xml(&self, writer: &mut Writer<W>) -> Result<()>;
}

pub(crate) type XmlWriter = Cursor<Vec<u8>>;

pub(crate) fn xml_error(err: std::io::Error) -> Error {
    Error::new(ErrorKind::Output, ErrorCode::Generic, Some(err.to_string()))
}

pub(crate) fn new_writer() -> Result<Writer<XmlWriter>> {
    let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 4);
    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("no"))))
        .map_err(xml_error)?;
    Ok(writer)
}

pub(crate) fn into_string(writer: Writer<XmlWriter>) -> Result<String> {
    let result = writer.into_inner().into_inner();
    String::from_utf8(result).map_err(|_err| {
        Error::new(
            ErrorKind::Output,
            ErrorCode::Generic,
            Some("problem converting to UTF-8".to_owned()),
        )
    })
}

pub(crate) fn write_tag_start(writer: &mut Writer<XmlWriter>, tag_name: &str) -> Result<()> {
    write_tag_start_with_attrs(writer, tag_name, &[])
}

pub(crate) fn write_tag_start_with_attrs(
    writer: &mut Writer<XmlWriter>,
    tag_name: &str,
    attrs: &[(&str, &str)],
) -> Result<()> {
    let mut elem = BytesStart::new(tag_name);
    for attr in attrs.iter() {
        elem.push_attribute(*attr);
    }
    writer.write_event(Event::Start(elem)).map_err(xml_error)
}

pub(crate) fn write_tag_end(writer: &mut Writer<XmlWriter>, tag_name: &str) -> Result<()> {
    writer
        .write_event(Event::End(BytesEnd::new(tag_name)))
        .map_err(xml_error)
}

pub(crate) fn write_tag_text(writer: &mut Writer<XmlWriter>, content: &str) -> Result<()> {
    writer
        .write_event(Event::Text(BytesText::new(content)))
        .map_err(xml_error)
}

pub(crate) fn write_tag_with_attrs(
    writer: &mut Writer<XmlWriter>,
    tag_name: &str,
    content: &str,
    attrs: &[(&str, &str)],
) -> Result<()> {
    write_tag_start_with_attrs(writer, tag_name, attrs)?;

    write_tag_text(writer, content)?;

    write_tag_end(writer, tag_name)
}

/// An element with attributes and no content: `<tag a="b"/>`.
pub(crate) fn write_empty_with_attrs(
    writer: &mut Writer<XmlWriter>,
    tag_name: &str,
    attrs: &[(&str, &str)],
) -> Result<()> {
    let mut elem = BytesStart::new(tag_name);
    for attr in attrs.iter() {
        elem.push_attribute(*attr);
    }
    writer.write_event(Event::Empty(elem)).map_err(xml_error)
}

pub(crate) fn write_comment(writer: &mut Writer<XmlWriter>, content: &str) -> Result<()> {
    // "--" may not appear inside a comment
    let content = content.replace("--", "- -");
    writer
        .write_event(Event::Comment(BytesText::from_escaped(format!(" {content} "))))
        .map_err(xml_error)
}

/// Writes `content` as CDATA.  A `]]>` inside the content is split
/// across two adjacent sections.
pub(crate) fn write_cdata(writer: &mut Writer<XmlWriter>, content: &str) -> Result<()> {
    let mut rest = content;
    while let Some(i) = rest.find("]]>") {
        writer
            .write_event(Event::CData(BytesCData::new(&rest[..i + 2])))
            .map_err(xml_error)?;
        rest = &rest[i + 2..];
    }
    writer
        .write_event(Event::CData(BytesCData::new(rest)))
        .map_err(xml_error)
}

/// Formats a number the shortest way that reads back exactly.
pub(crate) fn fmt_number(value: f64) -> String {
    format!("{value}")
}
