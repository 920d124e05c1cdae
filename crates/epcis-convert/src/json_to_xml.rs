//! Streaming JSON → XML conversion.
//!
//! The document is walked with `DeserializeSeed`s over a streaming
//! `serde_json` deserializer, so the event list is never materialised:
//! header fields feed the document context, and each `eventList` element is
//! deserialised, optionally mapped, serialised as XML and pushed into the
//! sink the moment it is read. A top-level object whose `type` is an event
//! name takes the single-event path instead.

use std::io::Read;

use serde::de::{self, DeserializeSeed, Deserializer, MapAccess, SeqAccess, Visitor};
use serde_json::{Map, Value};

use epcis_model::{json, xml, DocumentKind, Event, EventType};

use crate::collect::{Collector, DocumentContext};
use crate::context::{registry, ContextHandlerRegistry};
use crate::error::{Error, Result};
use crate::namespaces::NamespaceResolver;
use crate::sink::EventSink;
use crate::EventMapper;

pub struct JsonToXmlConverter<'a> {
    registry: &'static ContextHandlerRegistry,
    mapper: Option<&'a EventMapper>,
}

impl<'a> Default for JsonToXmlConverter<'a> {
    fn default() -> Self {
        JsonToXmlConverter::new()
    }
}

impl<'a> JsonToXmlConverter<'a> {
    pub fn new() -> Self {
        JsonToXmlConverter {
            registry: registry(),
            mapper: None,
        }
    }

    pub fn with_mapper(mapper: &'a EventMapper) -> Self {
        JsonToXmlConverter {
            registry: registry(),
            mapper: Some(mapper),
        }
    }

    /// Converts one document, returning the number of events emitted. The
    /// sink is closed on every exit path.
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn convert<R: Read, C: Collector>(
        &self,
        input: R,
        sink: &mut EventSink<'_, C>,
    ) -> Result<u64> {
        match self.run(input, sink) {
            Ok(events) => {
                sink.close();
                tracing::debug!(events, "converted JSON document to XML");
                Ok(events)
            }
            Err(e) => {
                sink.fail(&e);
                sink.close();
                Err(e.into_conversion())
            }
        }
    }

    fn run<R: Read, C: Collector>(
        &self,
        mut input: R,
        sink: &mut EventSink<'_, C>,
    ) -> Result<u64> {
        let first = loop {
            let mut byte = [0u8; 1];
            if input.read(&mut byte)? == 0 {
                return Err(Error::conversion("input document is empty"));
            }
            if !byte[0].is_ascii_whitespace() {
                break byte[0];
            }
        };
        if first != b'{' {
            return Err(Error::conversion("document must start with a JSON object"));
        }
        let chained = std::io::Cursor::new(vec![first]).chain(input);
        let mut de = serde_json::Deserializer::from_reader(chained);

        let mut state = DocState {
            sink,
            mapper: self.mapper,
            ctx: DocumentContext::default(),
            extra: Map::new(),
            single: None,
            started: false,
            ended: false,
            ordinal: 0,
            failure: None,
        };
        if let Err(e) = DocumentSeed(&mut state).deserialize(&mut de) {
            return Err(state.failure.take().unwrap_or_else(|| Error::from(e)));
        }

        // a bare event: the type named an event and no event list streamed
        if let Some(event_type) = state.single.take() {
            if !state.started {
                self.emit_single(&mut state, event_type)?;
                return Ok(1);
            }
        }
        if !state.started {
            return Err(Error::conversion("document has no eventList"));
        }
        if !state.ended {
            state.sink.end()?;
            state.ended = true;
        }
        Ok(state.ordinal)
    }

    fn emit_single<C: Collector>(
        &self,
        state: &mut DocState<'_, '_, C>,
        event_type: EventType,
    ) -> Result<()> {
        let mut resolver = NamespaceResolver::new();
        self.registry
            .resolve_for_xml(&state.ctx.namespaces, &mut resolver)?;
        let root_ns: Vec<(String, String)> = resolver
            .all_namespaces()
            .into_iter()
            .filter(|(_, prefix)| !prefix.is_empty())
            .collect();
        state.sink.start_single(&state.ctx)?;
        let event = Event::new(event_type, std::mem::take(&mut state.extra));
        let event = match self.mapper {
            Some(mapper) => mapper(event, &[0]),
            None => event,
        };
        let bytes = xml::write_event(&event, &root_ns, true)?;
        state.sink.event_single(&bytes)?;
        state.sink.end_single()?;
        Ok(())
    }
}

struct DocState<'s, 'v, C: Collector> {
    sink: &'s mut EventSink<'v, C>,
    mapper: Option<&'s EventMapper>,
    ctx: DocumentContext,
    /// Keys that are not document framing; becomes the event body when the
    /// top-level object turns out to be a bare event.
    extra: Map<String, Value>,
    single: Option<EventType>,
    started: bool,
    ended: bool,
    ordinal: u64,
    failure: Option<Error>,
}

impl<'s, 'v, C: Collector> DocState<'s, 'v, C> {
    /// Stores the real failure and returns its rendering as a serde error,
    /// so the cause survives the trip through the deserializer.
    fn defer<E: de::Error>(&mut self, error: Error) -> E {
        let message = error.to_string();
        self.failure = Some(error);
        E::custom(message)
    }

    fn apply_context(&mut self, value: Value) {
        match value {
            Value::String(url) => self.ctx.namespaces.context_urls.push(url),
            Value::Array(entries) => {
                for entry in entries {
                    match entry {
                        Value::String(url) => self.ctx.namespaces.context_urls.push(url),
                        Value::Object(bindings) => {
                            for (prefix, uri) in bindings {
                                if let Value::String(uri) = uri {
                                    self.ctx.namespaces.bindings.insert(uri, prefix);
                                }
                            }
                        }
                        _ => {}
                    }
                }
            }
            _ => {}
        }
    }

    fn start_document(&mut self) -> Result<()> {
        if self.started {
            return Ok(());
        }
        self.sink.start(&self.ctx)?;
        self.started = true;
        Ok(())
    }

    fn end_document(&mut self) -> Result<()> {
        if self.started && !self.ended {
            self.sink.end()?;
            self.ended = true;
        }
        Ok(())
    }

    fn handle_event(&mut self, value: Value) -> Result<()> {
        let event = json::from_value(value)?;
        let event = match self.mapper {
            Some(mapper) => mapper(event, &[self.ordinal]),
            None => event,
        };
        let bytes = xml::write_event(&event, &[], true)?;
        self.sink.event(&bytes)?;
        self.ordinal += 1;
        Ok(())
    }
}

struct DocumentSeed<'x, 's, 'v, C: Collector>(&'x mut DocState<'s, 'v, C>);

impl<'de, 'x, 's, 'v, C: Collector> DeserializeSeed<'de> for DocumentSeed<'x, 's, 'v, C> {
    type Value = ();

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> std::result::Result<(), D::Error> {
        deserializer.deserialize_map(self)
    }
}

impl<'de, 'x, 's, 'v, C: Collector> Visitor<'de> for DocumentSeed<'x, 's, 'v, C> {
    type Value = ();

    fn expecting(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str("an EPCIS document object")
    }

    fn visit_map<M: MapAccess<'de>>(self, mut map: M) -> std::result::Result<(), M::Error> {
        let state = self.0;
        while let Some(key) = map.next_key::<String>()? {
            match key.as_str() {
                "@context" => {
                    let value: Value = map.next_value()?;
                    state.apply_context(value);
                }
                "type" => {
                    let name: String = map.next_value()?;
                    if let Some(kind) = DocumentKind::from_type_name(&name) {
                        state.ctx.kind = kind;
                    } else if let Some(event_type) = EventType::from_name(&name) {
                        state.single = Some(event_type);
                    } else {
                        return Err(de::Error::custom(format!(
                            "unknown document type '{name}'"
                        )));
                    }
                }
                "schemaVersion" => {
                    // the target version wins; the input's declaration is
                    // informational only
                    let version: String = map.next_value()?;
                    tracing::debug!(input_version = %version, "source document schema version");
                }
                "creationDate" => state.ctx.creation_date = Some(map.next_value()?),
                "epcisBody" => map.next_value_seed(BodySeed(&mut *state))?,
                _ => {
                    let value: Value = map.next_value()?;
                    state.extra.insert(key, value);
                }
            }
        }
        Ok(())
    }
}

struct BodySeed<'x, 's, 'v, C: Collector>(&'x mut DocState<'s, 'v, C>);

impl<'de, 'x, 's, 'v, C: Collector> DeserializeSeed<'de> for BodySeed<'x, 's, 'v, C> {
    type Value = ();

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> std::result::Result<(), D::Error> {
        deserializer.deserialize_map(self)
    }
}

impl<'de, 'x, 's, 'v, C: Collector> Visitor<'de> for BodySeed<'x, 's, 'v, C> {
    type Value = ();

    fn expecting(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str("an epcisBody object")
    }

    fn visit_map<M: MapAccess<'de>>(self, mut map: M) -> std::result::Result<(), M::Error> {
        let state = self.0;
        while let Some(key) = map.next_key::<String>()? {
            match key.as_str() {
                "eventList" => {
                    if let Err(e) = state.start_document() {
                        return Err(state.defer(e));
                    }
                    map.next_value_seed(EventListSeed(&mut *state))?;
                    if let Err(e) = state.end_document() {
                        return Err(state.defer(e));
                    }
                }
                "queryResults" => map.next_value_seed(QueryResultsSeed(&mut *state))?,
                _ => {
                    let _: Value = map.next_value()?;
                }
            }
        }
        Ok(())
    }
}

struct QueryResultsSeed<'x, 's, 'v, C: Collector>(&'x mut DocState<'s, 'v, C>);

impl<'de, 'x, 's, 'v, C: Collector> DeserializeSeed<'de> for QueryResultsSeed<'x, 's, 'v, C> {
    type Value = ();

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> std::result::Result<(), D::Error> {
        deserializer.deserialize_map(self)
    }
}

impl<'de, 'x, 's, 'v, C: Collector> Visitor<'de> for QueryResultsSeed<'x, 's, 'v, C> {
    type Value = ();

    fn expecting(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str("a queryResults object")
    }

    fn visit_map<M: MapAccess<'de>>(self, mut map: M) -> std::result::Result<(), M::Error> {
        let state = self.0;
        while let Some(key) = map.next_key::<String>()? {
            match key.as_str() {
                "subscriptionID" => state.ctx.subscription_id = Some(map.next_value()?),
                "queryName" => state.ctx.query_name = Some(map.next_value()?),
                "resultsBody" => map.next_value_seed(ResultsBodySeed(&mut *state))?,
                _ => {
                    let _: Value = map.next_value()?;
                }
            }
        }
        Ok(())
    }
}

struct ResultsBodySeed<'x, 's, 'v, C: Collector>(&'x mut DocState<'s, 'v, C>);

impl<'de, 'x, 's, 'v, C: Collector> DeserializeSeed<'de> for ResultsBodySeed<'x, 's, 'v, C> {
    type Value = ();

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> std::result::Result<(), D::Error> {
        deserializer.deserialize_map(self)
    }
}

impl<'de, 'x, 's, 'v, C: Collector> Visitor<'de> for ResultsBodySeed<'x, 's, 'v, C> {
    type Value = ();

    fn expecting(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str("a resultsBody object")
    }

    fn visit_map<M: MapAccess<'de>>(self, mut map: M) -> std::result::Result<(), M::Error> {
        let state = self.0;
        while let Some(key) = map.next_key::<String>()? {
            if key == "eventList" {
                if let Err(e) = state.start_document() {
                    return Err(state.defer(e));
                }
                map.next_value_seed(EventListSeed(&mut *state))?;
                if let Err(e) = state.end_document() {
                    return Err(state.defer(e));
                }
            } else {
                let _: Value = map.next_value()?;
            }
        }
        Ok(())
    }
}

struct EventListSeed<'x, 's, 'v, C: Collector>(&'x mut DocState<'s, 'v, C>);

impl<'de, 'x, 's, 'v, C: Collector> DeserializeSeed<'de> for EventListSeed<'x, 's, 'v, C> {
    type Value = ();

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> std::result::Result<(), D::Error> {
        deserializer.deserialize_seq(self)
    }
}

impl<'de, 'x, 's, 'v, C: Collector> Visitor<'de> for EventListSeed<'x, 's, 'v, C> {
    type Value = ();

    fn expecting(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str("an eventList array")
    }

    fn visit_seq<S: SeqAccess<'de>>(self, mut seq: S) -> std::result::Result<(), S::Error> {
        let state = self.0;
        while let Some(value) = seq.next_element::<Value>()? {
            if let Err(e) = state.handle_event(value) {
                return Err(state.defer(e));
            }
        }
        Ok(())
    }
}
