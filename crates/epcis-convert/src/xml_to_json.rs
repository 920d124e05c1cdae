//! Streaming XML → JSON conversion.
//!
//! A pull reader walks the document: root attributes and namespace
//! declarations feed the document context, query identifiers are captured
//! on the way to the event list, and each event element is unmarshalled,
//! optionally mapped, serialised as indented JSON and pushed into the sink.
//! Whatever the input declared, the emitted document carries schema version
//! 2.0; this direction always targets 2.0.

use std::io::BufRead;

use quick_xml::events::{BytesStart, Event as XmlEvent};
use quick_xml::Reader;

use epcis_model::{json, xml, DocumentKind, EventType};

use crate::collect::{Collector, DocumentContext};
use crate::error::{Error, Result};
use crate::namespaces::NamespaceResolver;
use crate::sink::EventSink;
use crate::EventMapper;

pub struct XmlToJsonConverter<'a> {
    mapper: Option<&'a EventMapper>,
}

impl<'a> Default for XmlToJsonConverter<'a> {
    fn default() -> Self {
        XmlToJsonConverter::new()
    }
}

impl<'a> XmlToJsonConverter<'a> {
    pub fn new() -> Self {
        XmlToJsonConverter { mapper: None }
    }

    pub fn with_mapper(mapper: &'a EventMapper) -> Self {
        XmlToJsonConverter {
            mapper: Some(mapper),
        }
    }

    /// Converts one document, returning the number of events emitted. The
    /// sink is closed on every exit path; failures surface as conversion
    /// errors with the cause preserved.
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn convert<R: BufRead, C: Collector>(
        &self,
        input: R,
        sink: &mut EventSink<'_, C>,
    ) -> Result<u64> {
        match self.run(input, sink) {
            Ok(events) => {
                sink.close();
                tracing::debug!(events, "converted XML document to JSON");
                Ok(events)
            }
            Err(e) => {
                sink.fail(&e);
                sink.close();
                Err(e.into_conversion())
            }
        }
    }

    fn run<R: BufRead, C: Collector>(
        &self,
        input: R,
        sink: &mut EventSink<'_, C>,
    ) -> Result<u64> {
        let mut reader = Reader::from_reader(input);
        reader.config_mut().trim_text(true);

        let mut resolver = NamespaceResolver::new();
        let mut ctx = DocumentContext::default();
        let mut buf = Vec::new();
        let mut seen_root = false;
        let mut started = false;
        let mut ordinal: u64 = 0;
        let mut capture: Option<&'static str> = None;

        loop {
            match reader.read_event_into(&mut buf)? {
                XmlEvent::Start(e) => {
                    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                    let local = local_name(&name);
                    if !seen_root {
                        seen_root = true;
                        if let Some(kind) = DocumentKind::from_type_name(local) {
                            ctx.kind = kind;
                            read_root_attributes(&e, &mut resolver, &mut ctx)?;
                        } else if EventType::is_event_name(local) {
                            return self.convert_single_event(
                                &mut reader,
                                &e,
                                &mut resolver,
                                &mut ctx,
                                sink,
                            );
                        } else {
                            return Err(Error::conversion(format!(
                                "unexpected root element <{name}>"
                            )));
                        }
                    } else if started && EventType::is_event_name(local) {
                        let mut event_ns = Vec::new();
                        let event = xml::read_event(&mut reader, &e, &mut event_ns)?;
                        for (uri, prefix) in &event_ns {
                            resolver.add_event_ns(uri, prefix);
                        }
                        let event = self.map(event, ordinal);
                        let bytes = json::to_pretty_bytes(&event)?;
                        sink.event(&bytes)?;
                        resolver.reset_event_ns();
                        ordinal += 1;
                    } else {
                        match local {
                            "EventList" if !started => {
                                ctx.namespaces = resolver.namespace_set();
                                sink.start(&ctx)?;
                                started = true;
                            }
                            "subscriptionID" => capture = Some("subscriptionID"),
                            "queryName" => capture = Some("queryName"),
                            _ => {}
                        }
                    }
                }
                XmlEvent::Text(t) => {
                    if let Some(field) = capture {
                        let text = t.unescape()?.into_owned();
                        match field {
                            "subscriptionID" => ctx.subscription_id = Some(text),
                            "queryName" => ctx.query_name = Some(text),
                            _ => {}
                        }
                    }
                }
                XmlEvent::End(e) => {
                    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                    let local = local_name(&name);
                    if capture == Some(local) {
                        capture = None;
                    }
                    if DocumentKind::from_type_name(local).is_some() {
                        if !started {
                            // a document without events still produces a
                            // well-formed, empty output document
                            ctx.namespaces = resolver.namespace_set();
                            sink.start(&ctx)?;
                        }
                        sink.end()?;
                        return Ok(ordinal);
                    }
                }
                XmlEvent::Eof => {
                    if !seen_root {
                        return Err(Error::conversion("input document is empty"));
                    }
                    if started {
                        sink.end()?;
                    }
                    return Ok(ordinal);
                }
                _ => {}
            }
            buf.clear();
        }
    }

    /// Single-event fast path: exactly one `start_single` / `event_single` /
    /// `end_single` cycle, no document lifecycle calls.
    fn convert_single_event<R: BufRead, C: Collector>(
        &self,
        reader: &mut Reader<R>,
        start: &BytesStart<'_>,
        resolver: &mut NamespaceResolver,
        ctx: &mut DocumentContext,
        sink: &mut EventSink<'_, C>,
    ) -> Result<u64> {
        let mut event_ns = Vec::new();
        let event = xml::read_event(reader, start, &mut event_ns)?;
        for (uri, prefix) in &event_ns {
            resolver.add_document_ns(uri, prefix);
        }
        ctx.namespaces = resolver.namespace_set();
        sink.start_single(ctx)?;
        let event = self.map(event, 0);
        let bytes = json::to_pretty_bytes(&event)?;
        sink.event_single(&bytes)?;
        sink.end_single()?;
        Ok(1)
    }

    fn map(&self, event: epcis_model::Event, ordinal: u64) -> epcis_model::Event {
        match self.mapper {
            Some(mapper) => mapper(event, &[ordinal]),
            None => event,
        }
    }
}

fn local_name(name: &str) -> &str {
    name.rsplit(':').next().unwrap_or(name)
}

fn read_root_attributes(
    start: &BytesStart<'_>,
    resolver: &mut NamespaceResolver,
    ctx: &mut DocumentContext,
) -> Result<()> {
    for attr in start.attributes() {
        let attr = attr?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr.unescape_value()?.into_owned();
        if key == "xmlns" {
            resolver.add_document_ns(&value, "");
        } else if let Some(prefix) = key.strip_prefix("xmlns:") {
            resolver.add_document_ns(&value, prefix);
        } else {
            match local_name(&key) {
                // the output always declares 2.0; the input's version only
                // routed it here
                "schemaVersion" => {
                    tracing::debug!(input_version = %value, "source document schema version")
                }
                "creationDate" => ctx.creation_date = Some(value),
                _ => {
                    ctx.attributes.insert(key, value);
                }
            }
        }
    }
    Ok(())
}
