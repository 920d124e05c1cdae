use std::fmt;
use std::str::FromStr;

use serde_json::{Map, Value};

/// Error type for event marshalling and unmarshalling.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("failed to read event XML: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("invalid XML attribute: {0}")]
    Attr(#[from] quick_xml::events::attributes::AttrError),

    #[error("failed to write event XML: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize event JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unknown event type: '{0}'")]
    UnknownEventType(String),

    #[error("malformed event: {0}")]
    Malformed(String),
}

/// The five EPCIS event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    Object,
    Aggregation,
    Transaction,
    Transformation,
    Association,
}

impl EventType {
    pub const ALL: [EventType; 5] = [
        EventType::Object,
        EventType::Aggregation,
        EventType::Transaction,
        EventType::Transformation,
        EventType::Association,
    ];

    /// The element / `type` name as it appears on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Object => "ObjectEvent",
            EventType::Aggregation => "AggregationEvent",
            EventType::Transaction => "TransactionEvent",
            EventType::Transformation => "TransformationEvent",
            EventType::Association => "AssociationEvent",
        }
    }

    pub fn from_name(name: &str) -> Option<EventType> {
        EventType::ALL.iter().copied().find(|t| t.as_str() == name)
    }

    /// Whether `name` is one of the five event element names.
    pub fn is_event_name(name: &str) -> bool {
        EventType::from_name(name).is_some()
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventType::from_name(s).ok_or_else(|| ModelError::UnknownEventType(s.to_string()))
    }
}

/// The two document kinds. Query documents carry an extra results wrapper
/// around the event list in both syntaxes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    EpcisDocument,
    EpcisQueryDocument,
}

impl DocumentKind {
    pub fn is_query(&self) -> bool {
        matches!(self, DocumentKind::EpcisQueryDocument)
    }

    /// Local name of the XML root element, which doubles as the JSON-LD
    /// `type` value.
    pub fn type_name(&self) -> &'static str {
        match self {
            DocumentKind::EpcisDocument => "EPCISDocument",
            DocumentKind::EpcisQueryDocument => "EPCISQueryDocument",
        }
    }

    pub fn from_type_name(name: &str) -> Option<DocumentKind> {
        match name {
            "EPCISDocument" => Some(DocumentKind::EpcisDocument),
            "EPCISQueryDocument" => Some(DocumentKind::EpcisQueryDocument),
            _ => None,
        }
    }
}

/// One EPCIS event: the tagged kind plus its fields in JSON-LD object form.
/// Extension fields keep their namespace prefix in the key (`"cbvmda:lotNumber"`).
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    event_type: EventType,
    fields: Map<String, Value>,
}

impl Event {
    pub fn new(event_type: EventType, fields: Map<String, Value>) -> Event {
        Event { event_type, fields }
    }

    pub fn event_type(&self) -> EventType {
        self.event_type
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn fields_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.fields
    }

    pub fn into_fields(self) -> Map<String, Value> {
        self.fields
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.fields.insert(name.into(), value);
    }
}
