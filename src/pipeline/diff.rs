//! Replication diff addressing and streaming decode
//!
//! A minutely diff lives at `{base}/{f1}/{f2}/{f3}.osc.gz`, where the three
//! groups are the zero-padded millions, thousands and units of the sequence
//! number. The payload is a gzip-compressed osmChange document:
//!
//! ```xml
//! <osmChange version="0.6">
//!   <create>
//!     <node id="1" changeset="55" timestamp="2024-05-01T10:00:00Z" lat="-36.8" lon="174.7"/>
//!   </create>
//!   <modify>...</modify>
//!   <delete>...</delete>
//! </osmChange>
//! ```
//!
//! [`DiffDecoder`] walks the document event by event and yields one
//! [`NodeRecord`] per node, so memory stays bounded by the compressed payload
//! regardless of how many edits the diff holds. Ways and relations are skipped.

use super::types::{ChangeAction, ChangesetId, NodeRecord, SequenceNumber};
use crate::error::DecodeError;
use chrono::{DateTime, Utc};
use flate2::read::MultiGzDecoder;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::io::{BufRead, BufReader, Read};

/// Path segments addressing one diff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiffPath {
    pub f1: u64,
    pub f2: u64,
    pub f3: u64,
}

impl DiffPath {
    pub fn for_sequence(sequence: SequenceNumber) -> Self {
        Self {
            f1: sequence / 1_000_000,
            f2: (sequence / 1000) % 1000,
            f3: sequence % 1000,
        }
    }

    pub fn sequence(&self) -> SequenceNumber {
        self.f1 * 1_000_000 + self.f2 * 1000 + self.f3
    }

    /// Relative path of the diff below the replication base URL
    pub fn relative_path(&self) -> String {
        format!("{:03}/{:03}/{:03}.osc.gz", self.f1, self.f2, self.f3)
    }
}

/// Decode a gzip-compressed osmChange payload read from `source`
pub fn decode_gzip<R: Read>(source: R) -> DiffDecoder<BufReader<MultiGzDecoder<R>>> {
    DiffDecoder::new(BufReader::new(MultiGzDecoder::new(source)))
}

/// Incremental osmChange decoder yielding node records in document order
///
/// Stops after the first error.
pub struct DiffDecoder<R: BufRead> {
    reader: Reader<R>,
    buf: Vec<u8>,
    seen_root: bool,
    action: Option<ChangeAction>,
    done: bool,
}

impl<R: BufRead> DiffDecoder<R> {
    pub fn new(source: R) -> Self {
        let mut reader = Reader::from_reader(source);
        reader.config_mut().trim_text(true);
        Self {
            reader,
            buf: Vec::new(),
            seen_root: false,
            action: None,
            done: false,
        }
    }

    fn next_record(&mut self) -> Result<Option<NodeRecord>, DecodeError> {
        loop {
            self.buf.clear();
            let event = match self.reader.read_event_into(&mut self.buf) {
                Ok(event) => event,
                Err(quick_xml::Error::Io(err)) => {
                    return Err(DecodeError::Decompression(err.to_string()))
                }
                Err(err) => {
                    return Err(DecodeError::Xml {
                        position: self.reader.buffer_position() as u64,
                        reason: err.to_string(),
                    })
                }
            };

            match event {
                Event::Start(ref element) | Event::Empty(ref element) => {
                    let self_closing = matches!(event, Event::Empty(_));
                    let name = element.name();
                    if !self.seen_root {
                        if name.as_ref() != b"osmChange" {
                            return Err(DecodeError::UnexpectedRoot(
                                String::from_utf8_lossy(name.as_ref()).into_owned(),
                            ));
                        }
                        self.seen_root = true;
                        if self_closing {
                            // `<osmChange/>`: an empty diff
                            return Ok(None);
                        }
                        continue;
                    }
                    if let Some(action) = ChangeAction::from_tag(name.as_ref()) {
                        // `<delete/>` opens no section
                        if !self_closing {
                            self.action = Some(action);
                        }
                        continue;
                    }
                    if name.as_ref() == b"node" {
                        if let Some(action) = self.action {
                            if let Some(record) = parse_node(element, action)? {
                                return Ok(Some(record));
                            }
                        }
                    }
                }
                Event::End(element) => match element.name().as_ref() {
                    b"osmChange" => return Ok(None),
                    tag if ChangeAction::from_tag(tag).is_some() => self.action = None,
                    _ => {}
                },
                Event::Eof => {
                    return Err(if self.seen_root {
                        DecodeError::Truncated
                    } else {
                        DecodeError::UnexpectedRoot(String::new())
                    });
                }
                _ => {}
            }
        }
    }
}

impl<R: BufRead> Iterator for DiffDecoder<R> {
    type Item = Result<NodeRecord, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_record() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

/// Extract a node record; nodes without coordinates (typical for deletes)
/// cannot be placed in a region and yield `None`.
fn parse_node(
    element: &BytesStart<'_>,
    action: ChangeAction,
) -> Result<Option<NodeRecord>, DecodeError> {
    let mut changeset = None;
    let mut timestamp = None;
    let mut lat = None;
    let mut lon = None;

    for attr in element.attributes() {
        let attr = attr.map_err(|err| DecodeError::Xml {
            position: 0,
            reason: err.to_string(),
        })?;
        let value = || String::from_utf8_lossy(&attr.value).into_owned();
        match attr.key.as_ref() {
            b"changeset" => changeset = Some(value()),
            b"timestamp" => timestamp = Some(value()),
            b"lat" => lat = Some(value()),
            b"lon" => lon = Some(value()),
            _ => {}
        }
    }

    let changeset = changeset.ok_or(DecodeError::MissingAttribute("changeset"))?;
    let changeset: ChangesetId = changeset
        .parse()
        .map_err(|_| DecodeError::InvalidAttribute {
            name: "changeset",
            value: changeset.clone(),
        })?;

    let timestamp = timestamp.ok_or(DecodeError::MissingAttribute("timestamp"))?;
    let timestamp = DateTime::parse_from_rfc3339(&timestamp)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| DecodeError::InvalidAttribute {
            name: "timestamp",
            value: timestamp.clone(),
        })?;

    let (lat, lon) = match (lat, lon) {
        (Some(lat), Some(lon)) => (
            parse_coordinate("lat", lat)?,
            parse_coordinate("lon", lon)?,
        ),
        _ => return Ok(None),
    };

    Ok(Some(NodeRecord {
        changeset,
        timestamp,
        lat,
        lon,
        action,
    }))
}

fn parse_coordinate(name: &'static str, value: String) -> Result<f64, DecodeError> {
    match value.trim().parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(DecodeError::InvalidAttribute { name, value }),
    }
}
