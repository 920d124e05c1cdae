//! Sinks for emitted events.
//!
//! A collector receives each serialised event between `start` and `end` and
//! shapes the final output: a progressively written JSON-LD document, a
//! progressively written XML document, or an in-memory list. `close` must be
//! idempotent and is invoked on every exit path.

use std::collections::BTreeMap;
use std::io::{self, Write};

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event as XmlEvent};
use quick_xml::Writer;
use serde_json::{Map, Value};

use epcis_model::DocumentKind;

use crate::context::{registry, ContextHandlerRegistry};
use crate::error::{Error, Result};
use crate::namespaces::{NamespaceResolver, NamespaceSet, EPCIS_2_0_XMLNS, EPCIS_QUERY_XMLNS};

/// Everything a collector needs to know about the document before the first
/// event: the kind, the output schema version, header attributes, the
/// namespaces observed on the source document, and the query identifiers.
#[derive(Debug, Clone)]
pub struct DocumentContext {
    pub kind: DocumentKind,
    pub schema_version: String,
    pub creation_date: Option<String>,
    pub attributes: BTreeMap<String, String>,
    pub namespaces: NamespaceSet,
    pub subscription_id: Option<String>,
    pub query_name: Option<String>,
}

impl Default for DocumentContext {
    fn default() -> DocumentContext {
        DocumentContext {
            kind: DocumentKind::EpcisDocument,
            schema_version: "2.0".to_string(),
            creation_date: None,
            attributes: BTreeMap::new(),
            namespaces: NamespaceSet::default(),
            subscription_id: None,
            query_name: None,
        }
    }
}

pub trait Collector {
    /// Emits the document preamble. Called once, before the first event of
    /// a full document.
    fn start(&mut self, ctx: &DocumentContext) -> Result<()>;

    /// Appends one serialised event.
    fn collect(&mut self, event: &[u8]) -> Result<()>;

    /// Closes the document. Called once, after the last event.
    fn end(&mut self) -> Result<()>;

    /// Single-event counterparts of the three calls above.
    fn start_single(&mut self, ctx: &DocumentContext) -> Result<()>;
    fn collect_single(&mut self, event: &[u8]) -> Result<()>;
    fn end_single(&mut self) -> Result<()>;

    /// Whether the current document is a plain document (as opposed to a
    /// query document). Meaningful after `start`.
    fn is_epcis_document(&self) -> bool;

    /// Releases resources. Idempotent; invoked on every exit path.
    fn close(&mut self) -> Result<()>;
}

/// Writes a JSON-LD document progressively, one event at a time, with a
/// comma between events. Nothing is buffered beyond the underlying writer.
pub struct JsonStreamCollector<W: Write> {
    writer: io::BufWriter<W>,
    registry: &'static ContextHandlerRegistry,
    query: bool,
    single_context: Option<Vec<Value>>,
    events: u64,
    closed: bool,
}

impl<W: Write> JsonStreamCollector<W> {
    pub fn new(writer: W) -> JsonStreamCollector<W> {
        JsonStreamCollector::with_registry(writer, registry())
    }

    pub fn with_registry(
        writer: W,
        registry: &'static ContextHandlerRegistry,
    ) -> JsonStreamCollector<W> {
        JsonStreamCollector {
            writer: io::BufWriter::new(writer),
            registry,
            query: false,
            single_context: None,
            events: 0,
            closed: false,
        }
    }

    /// Flushes and returns the underlying writer. Call after `end` or
    /// `end_single`.
    pub fn into_inner(mut self) -> Result<W> {
        self.writer.flush()?;
        self.writer
            .into_inner()
            .map_err(|e| Error::Io(e.into_error()))
    }
}

impl<W: Write> Collector for JsonStreamCollector<W> {
    fn start(&mut self, ctx: &DocumentContext) -> Result<()> {
        self.query = ctx.kind.is_query();
        let context = self.registry.resolve_for_json(&ctx.namespaces)?;
        let w = &mut self.writer;
        write!(w, "{{\n  \"@context\": {},", serde_json::to_string(&context)?)?;
        write!(w, "\n  \"type\": \"{}\",", ctx.kind.type_name())?;
        write!(w, "\n  \"schemaVersion\": \"{}\",", ctx.schema_version)?;
        if let Some(date) = &ctx.creation_date {
            write!(w, "\n  \"creationDate\": {},", serde_json::to_string(date)?)?;
        }
        write!(w, "\n  \"epcisBody\": {{")?;
        if self.query {
            write!(w, "\n    \"queryResults\": {{")?;
            if let Some(id) = &ctx.subscription_id {
                write!(w, "\n      \"subscriptionID\": {},", serde_json::to_string(id)?)?;
            }
            if let Some(name) = &ctx.query_name {
                write!(w, "\n      \"queryName\": {},", serde_json::to_string(name)?)?;
            }
            write!(w, "\n      \"resultsBody\": {{\n        \"eventList\": [")?;
        } else {
            write!(w, "\n    \"eventList\": [")?;
        }
        Ok(())
    }

    fn collect(&mut self, event: &[u8]) -> Result<()> {
        if self.events > 0 {
            self.writer.write_all(b",")?;
        }
        self.writer.write_all(b"\n")?;
        self.writer.write_all(event)?;
        self.events += 1;
        Ok(())
    }

    fn end(&mut self) -> Result<()> {
        if self.query {
            write!(self.writer, "\n        ]\n      }}\n    }}\n  }}\n}}")?;
        } else {
            write!(self.writer, "\n    ]\n  }}\n}}")?;
        }
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }

    fn start_single(&mut self, ctx: &DocumentContext) -> Result<()> {
        self.single_context = Some(self.registry.resolve_for_json(&ctx.namespaces)?);
        Ok(())
    }

    fn collect_single(&mut self, event: &[u8]) -> Result<()> {
        let context = self
            .single_context
            .take()
            .ok_or_else(|| Error::conversion("single event collected before start"))?;
        let parsed: Value = serde_json::from_slice(event)?;
        let fields = match parsed {
            Value::Object(map) => map,
            _ => return Err(Error::conversion("single event is not a JSON object")),
        };
        let mut out = Map::new();
        out.insert("@context".to_string(), Value::Array(context));
        out.extend(fields);
        serde_json::to_writer_pretty(&mut self.writer, &Value::Object(out))?;
        self.events += 1;
        Ok(())
    }

    fn end_single(&mut self) -> Result<()> {
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }

    fn is_epcis_document(&self) -> bool {
        !self.query
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.writer.flush()?;
        Ok(())
    }
}

/// Writes an XML document progressively. Event bytes arrive already
/// serialised; this collector owns the document preamble and closers.
pub struct XmlStreamCollector<W: Write> {
    writer: Writer<io::BufWriter<W>>,
    registry: &'static ContextHandlerRegistry,
    query: bool,
    events: u64,
    closed: bool,
}

impl<W: Write> XmlStreamCollector<W> {
    pub fn new(writer: W) -> XmlStreamCollector<W> {
        XmlStreamCollector::with_registry(writer, registry())
    }

    pub fn with_registry(
        writer: W,
        registry: &'static ContextHandlerRegistry,
    ) -> XmlStreamCollector<W> {
        XmlStreamCollector {
            writer: Writer::new(io::BufWriter::new(writer)),
            registry,
            query: false,
            events: 0,
            closed: false,
        }
    }

    pub fn into_inner(self) -> Result<W> {
        let mut buffered = self.writer.into_inner();
        buffered.flush()?;
        buffered.into_inner().map_err(|e| Error::Io(e.into_error()))
    }

    fn write_decl(&mut self) -> Result<()> {
        self.writer
            .write_event(XmlEvent::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        self.writer.get_mut().write_all(b"\n")?;
        Ok(())
    }

    fn write_text_element(&mut self, name: &str, text: &str) -> Result<()> {
        self.writer.write_event(XmlEvent::Start(BytesStart::new(name)))?;
        self.writer.write_event(XmlEvent::Text(BytesText::new(text)))?;
        self.writer.write_event(XmlEvent::End(BytesEnd::new(name)))?;
        Ok(())
    }
}

impl<W: Write> Collector for XmlStreamCollector<W> {
    fn start(&mut self, ctx: &DocumentContext) -> Result<()> {
        self.query = ctx.kind.is_query();
        let mut resolver = NamespaceResolver::new();
        self.registry.resolve_for_xml(&ctx.namespaces, &mut resolver)?;

        self.write_decl()?;
        let root_name = if self.query {
            "epcisq:EPCISQueryDocument"
        } else {
            "epcis:EPCISDocument"
        };
        let mut root = BytesStart::new(root_name);
        root.push_attribute(("xmlns:epcis", EPCIS_2_0_XMLNS));
        if self.query {
            root.push_attribute(("xmlns:epcisq", EPCIS_QUERY_XMLNS));
        }
        for (uri, prefix) in resolver.all_namespaces() {
            if !prefix.is_empty() {
                let key = format!("xmlns:{prefix}");
                root.push_attribute((key.as_str(), uri.as_str()));
            }
        }
        root.push_attribute(("schemaVersion", ctx.schema_version.as_str()));
        if let Some(date) = &ctx.creation_date {
            root.push_attribute(("creationDate", date.as_str()));
        }
        for (key, value) in &ctx.attributes {
            root.push_attribute((key.as_str(), value.as_str()));
        }
        self.writer.write_event(XmlEvent::Start(root))?;
        self.writer
            .write_event(XmlEvent::Start(BytesStart::new("EPCISBody")))?;
        if self.query {
            self.writer
                .write_event(XmlEvent::Start(BytesStart::new("epcisq:QueryResults")))?;
            if let Some(id) = &ctx.subscription_id {
                self.write_text_element("subscriptionID", id)?;
            }
            if let Some(name) = &ctx.query_name {
                self.write_text_element("queryName", name)?;
            }
            self.writer
                .write_event(XmlEvent::Start(BytesStart::new("resultsBody")))?;
        }
        self.writer
            .write_event(XmlEvent::Start(BytesStart::new("EventList")))?;
        Ok(())
    }

    fn collect(&mut self, event: &[u8]) -> Result<()> {
        let w = self.writer.get_mut();
        w.write_all(b"\n")?;
        w.write_all(event)?;
        self.events += 1;
        Ok(())
    }

    fn end(&mut self) -> Result<()> {
        self.writer.get_mut().write_all(b"\n")?;
        self.writer
            .write_event(XmlEvent::End(BytesEnd::new("EventList")))?;
        if self.query {
            self.writer
                .write_event(XmlEvent::End(BytesEnd::new("resultsBody")))?;
            self.writer
                .write_event(XmlEvent::End(BytesEnd::new("epcisq:QueryResults")))?;
        }
        self.writer
            .write_event(XmlEvent::End(BytesEnd::new("EPCISBody")))?;
        let root_name = if self.query {
            "epcisq:EPCISQueryDocument"
        } else {
            "epcis:EPCISDocument"
        };
        self.writer
            .write_event(XmlEvent::End(BytesEnd::new(root_name)))?;
        self.writer.get_mut().flush()?;
        Ok(())
    }

    fn start_single(&mut self, _ctx: &DocumentContext) -> Result<()> {
        self.write_decl()
    }

    fn collect_single(&mut self, event: &[u8]) -> Result<()> {
        self.writer.get_mut().write_all(event)?;
        self.events += 1;
        Ok(())
    }

    fn end_single(&mut self) -> Result<()> {
        let w = self.writer.get_mut();
        w.write_all(b"\n")?;
        w.flush()?;
        Ok(())
    }

    fn is_epcis_document(&self) -> bool {
        !self.query
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.writer.get_mut().flush()?;
        Ok(())
    }
}

/// Accumulates each serialised event in input order.
#[derive(Default)]
pub struct ListCollector {
    events: Vec<Vec<u8>>,
    query: bool,
    closed: bool,
}

impl ListCollector {
    pub fn new() -> ListCollector {
        ListCollector::default()
    }

    pub fn events(&self) -> &[Vec<u8>] {
        &self.events
    }

    pub fn into_events(self) -> Vec<Vec<u8>> {
        self.events
    }
}

impl Collector for ListCollector {
    fn start(&mut self, ctx: &DocumentContext) -> Result<()> {
        self.query = ctx.kind.is_query();
        Ok(())
    }

    fn collect(&mut self, event: &[u8]) -> Result<()> {
        self.events.push(event.to_vec());
        Ok(())
    }

    fn end(&mut self) -> Result<()> {
        Ok(())
    }

    fn start_single(&mut self, ctx: &DocumentContext) -> Result<()> {
        self.query = ctx.kind.is_query();
        Ok(())
    }

    fn collect_single(&mut self, event: &[u8]) -> Result<()> {
        self.events.push(event.to_vec());
        Ok(())
    }

    fn end_single(&mut self) -> Result<()> {
        Ok(())
    }

    fn is_epcis_document(&self) -> bool {
        !self.query
    }

    fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.closed = true;
        }
        Ok(())
    }
}
