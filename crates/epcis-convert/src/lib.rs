//! Streaming converter for EPCIS documents.
//!
//! Converts business-event documents between the XML and JSON-LD syntaxes
//! and between schema versions 1.2 and 2.0, one event at a time: a document
//! with millions of events flows through without ever being materialised.
//! The entry point for whole conversions is [`VersionTransformer`]; the
//! per-direction converters, collectors and the advisory validator are
//! exposed for callers that assemble their own pipelines.

mod collect;
mod context;
mod error;
mod input;
mod json_to_xml;
mod namespaces;
mod pipe;
mod preference;
mod prescan;
mod sink;
mod transform;
mod validate;
mod versions;
mod xml_to_json;

pub use self::collect::{
    Collector, DocumentContext, JsonStreamCollector, ListCollector, XmlStreamCollector,
};
pub use self::context::{
    registry, ContextHandler, ContextHandlerRegistry, DefaultContextHandler,
    Gs1EgyptContextHandler, DEFAULT_CONTEXT_URL,
};
pub use self::error::{ConversionError, Error, Result};
pub use self::input::Input;
pub use self::json_to_xml::JsonToXmlConverter;
pub use self::namespaces::{NamespaceResolver, NamespaceSet};
pub use self::preference::{FormatPreference, RequestPreferences};
pub use self::prescan::{prescan, Detected, PRESCAN_LIMIT};
pub use self::sink::EventSink;
pub use self::transform::{
    plan, ConvertOptions, DocFormat, Leg, Representation, SchemaVersion, VersionTransformer,
};
pub use self::validate::EventValidator;
pub use self::versions::{downconvert, upconvert};
pub use self::xml_to_json::XmlToJsonConverter;

/// Pure event rewrite injected by the caller, e.g. URN ⇄ Web URI identifier
/// translation. `ancestors` ends with the event's zero-based ordinal within
/// the event list.
pub type EventMapper = dyn Fn(epcis_model::Event, &[u64]) -> epcis_model::Event + Send + Sync;
