//! Advisory structural validation of emitted events.
//!
//! Violations never stop the pipeline: they are logged and the event is
//! collected anyway. Only a missing or broken embedded schema is fatal, at
//! construction time.

use std::collections::HashMap;

use lazy_static::lazy_static;
use quick_xml::events::Event as XmlEvent;
use quick_xml::Reader;
use serde_json::Value;

use epcis_model::EventType;

use crate::error::{Error, Result};

const OBJECT_EVENT_SCHEMA: &str =
    include_str!("../resources/eventSchemas/ObjectEventSchema.json");
const AGGREGATION_EVENT_SCHEMA: &str =
    include_str!("../resources/eventSchemas/AggregationEventSchema.json");
const TRANSACTION_EVENT_SCHEMA: &str =
    include_str!("../resources/eventSchemas/TransactionEventSchema.json");
const TRANSFORMATION_EVENT_SCHEMA: &str =
    include_str!("../resources/eventSchemas/TransformationEventSchema.json");
const ASSOCIATION_EVENT_SCHEMA: &str =
    include_str!("../resources/eventSchemas/AssociationEventSchema.json");

pub struct EventValidator {
    schemas: HashMap<EventType, jsonschema::Validator>,
}

impl EventValidator {
    /// Compiles the embedded per-event-type schemas. Failure here is a
    /// configuration error and fatal.
    pub fn new() -> Result<EventValidator> {
        let sources = [
            (EventType::Object, OBJECT_EVENT_SCHEMA),
            (EventType::Aggregation, AGGREGATION_EVENT_SCHEMA),
            (EventType::Transaction, TRANSACTION_EVENT_SCHEMA),
            (EventType::Transformation, TRANSFORMATION_EVENT_SCHEMA),
            (EventType::Association, ASSOCIATION_EVENT_SCHEMA),
        ];
        let mut schemas = HashMap::new();
        for (event_type, source) in sources {
            let schema: Value = serde_json::from_str(source).map_err(|e| {
                Error::Config(format!("embedded schema for {event_type} is not JSON: {e}"))
            })?;
            let compiled = jsonschema::validator_for(&schema).map_err(|e| {
                Error::Config(format!("embedded schema for {event_type} does not compile: {e}"))
            })?;
            schemas.insert(event_type, compiled);
        }
        Ok(EventValidator { schemas })
    }

    /// The process-wide validator. Compiled once; shared read-only.
    pub fn shared() -> Result<&'static EventValidator> {
        lazy_static! {
            static ref SHARED: std::result::Result<EventValidator, Error> = EventValidator::new();
        }
        SHARED.as_ref().map_err(|e| Error::Config(e.to_string()))
    }

    /// Checks one serialised event, dispatching on its syntax. Advisory:
    /// findings are logged at `warn` and never returned.
    pub fn validate(&self, event: &[u8]) {
        match event.iter().copied().find(|b| !b.is_ascii_whitespace()) {
            Some(b'{') => self.validate_json(event),
            Some(b'<') => self.validate_xml(event),
            _ => tracing::warn!("event is neither JSON nor XML; skipping validation"),
        }
    }

    fn validate_json(&self, event: &[u8]) {
        let value: Value = match serde_json::from_slice(event) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(error = %e, "event is not valid JSON");
                return;
            }
        };
        let type_name = value.get("type").and_then(Value::as_str).unwrap_or_default();
        let validator = match EventType::from_name(type_name).and_then(|t| self.schemas.get(&t)) {
            Some(validator) => validator,
            None => {
                tracing::warn!(event_type = type_name, "event has no recognisable type");
                return;
            }
        };
        for violation in validator.iter_errors(&value) {
            tracing::warn!(
                event_type = type_name,
                instance_path = %violation.instance_path,
                "event violates its schema: {violation}"
            );
        }
    }

    /// Native structural check of an XML event: well-formed, rooted at an
    /// event element, with the mandatory timing fields present.
    fn validate_xml(&self, event: &[u8]) {
        let mut reader = Reader::from_reader(event);
        reader.config_mut().trim_text(true);
        let mut buf = Vec::new();
        let mut depth = 0usize;
        let mut root: Option<String> = None;
        let mut has_event_time = false;
        let mut has_zone_offset = false;
        loop {
            match reader.read_event_into(&mut buf) {
                Ok(XmlEvent::Start(e)) => {
                    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                    if depth == 0 {
                        root = Some(name);
                    } else if depth == 1 {
                        match name.as_str() {
                            "eventTime" => has_event_time = true,
                            "eventTimeZoneOffset" => has_zone_offset = true,
                            _ => {}
                        }
                    }
                    depth += 1;
                }
                Ok(XmlEvent::End(_)) => depth = depth.saturating_sub(1),
                Ok(XmlEvent::Eof) => break,
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "event XML is not well-formed");
                    return;
                }
            }
            buf.clear();
        }
        match root {
            Some(name) if EventType::is_event_name(&name) => {
                if !has_event_time {
                    tracing::warn!(event_type = %name, "event is missing eventTime");
                }
                if !has_zone_offset {
                    tracing::warn!(event_type = %name, "event is missing eventTimeZoneOffset");
                }
            }
            Some(name) => tracing::warn!(element = %name, "root element is not an event"),
            None => tracing::warn!("event XML is empty"),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn valid_events_produce_no_errors() {
        let validator = EventValidator::new().unwrap();
        let event = serde_json::to_vec(&json!({
            "type": "AggregationEvent",
            "eventTime": "2013-06-08T14:58:56.591Z",
            "eventTimeZoneOffset": "+02:00",
            "parentID": "urn:epc:id:sscc:0614141.1234567890",
            "childEPCs": ["urn:epc:id:sgtin:0614141.107346.2017"],
            "action": "OBSERVE",
        }))
        .unwrap();
        // advisory by contract: validate never fails
        validator.validate(&event);
    }

    #[test]
    fn invalid_events_are_only_logged() {
        let validator = EventValidator::new().unwrap();
        let missing_action = serde_json::to_vec(&json!({
            "type": "ObjectEvent",
            "eventTime": "2013-06-08T14:58:56.591Z",
            "eventTimeZoneOffset": "not-an-offset",
        }))
        .unwrap();
        validator.validate(&missing_action);
        validator.validate(b"{ not json at all");
        validator.validate(b"<ObjectEvent><unclosed></ObjectEvent>");
        validator.validate(b"\xff\xfe");
    }

    #[test]
    fn xml_events_are_structurally_checked() {
        let validator = EventValidator::new().unwrap();
        validator.validate(
            b"<ObjectEvent><eventTime>2021-04-01T10:00:00Z</eventTime>\
              <eventTimeZoneOffset>+00:00</eventTimeZoneOffset><action>ADD</action></ObjectEvent>",
        );
    }

    #[test]
    fn shared_validator_is_reused() {
        let first = EventValidator::shared().unwrap();
        let second = EventValidator::shared().unwrap();
        assert!(std::ptr::eq(first, second));
    }
}
