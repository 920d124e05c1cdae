//! JSON-LD marshalling of single events.

use serde_json::{Map, Value};

use crate::event::{Event, EventType, ModelError};

/// The event as a JSON-LD object, `type` first among its siblings only by
/// convention of the reader; key order is not significant.
pub fn to_value(event: &Event) -> Value {
    let mut map = Map::new();
    map.insert(
        "type".to_string(),
        Value::String(event.event_type().as_str().to_string()),
    );
    for (k, v) in event.fields() {
        map.insert(k.clone(), v.clone());
    }
    Value::Object(map)
}

/// Indented JSON bytes, the form pushed through the collector pipeline.
pub fn to_pretty_bytes(event: &Event) -> Result<Vec<u8>, ModelError> {
    Ok(serde_json::to_vec_pretty(&to_value(event))?)
}

/// Rebuilds an [`Event`] from its JSON-LD object form. A document-level
/// `@context` carried on a bare single event is dropped here; callers
/// capture it before deserialising.
pub fn from_value(value: Value) -> Result<Event, ModelError> {
    let mut map = match value {
        Value::Object(map) => map,
        other => {
            return Err(ModelError::Malformed(format!(
                "event must be a JSON object, got: {other}"
            )))
        }
    };
    let type_name = match map.remove("type") {
        Some(Value::String(name)) => name,
        _ => return Err(ModelError::Malformed("event is missing its type".to_string())),
    };
    let event_type =
        EventType::from_name(&type_name).ok_or(ModelError::UnknownEventType(type_name))?;
    map.remove("@context");
    Ok(Event::new(event_type, map))
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn events_round_trip_through_json_values() {
        let event = from_value(json!({
            "type": "ObjectEvent",
            "eventTime": "2021-04-01T10:00:00.000Z",
            "eventTimeZoneOffset": "+00:00",
            "action": "OBSERVE",
            "epcList": ["urn:epc:id:sgtin:0614141.107346.2017"],
        }))
        .expect("valid event");
        assert_eq!(EventType::Object, event.event_type());

        let value = to_value(&event);
        assert_eq!(json!("ObjectEvent"), value["type"]);
        assert_eq!(json!("OBSERVE"), value["action"]);
        assert_eq!(event, from_value(value).expect("round trip"));
    }

    #[test]
    fn unknown_and_missing_types_are_rejected() {
        assert!(matches!(
            from_value(json!({"type": "QuantityEvent"})),
            Err(ModelError::UnknownEventType(_))
        ));
        assert!(matches!(
            from_value(json!({"eventTime": "2021-04-01T10:00:00.000Z"})),
            Err(ModelError::Malformed(_))
        ));
        assert!(matches!(from_value(json!([])), Err(ModelError::Malformed(_))));
    }

    #[test]
    fn single_event_context_is_dropped() {
        let event = from_value(json!({
            "@context": ["https://ref.gs1.org/standards/epcis/2.0.0/epcis-context.jsonld"],
            "type": "AssociationEvent",
            "eventTime": "2021-04-01T10:00:00.000Z",
            "eventTimeZoneOffset": "+00:00",
        }))
        .expect("valid event");
        assert!(event.get("@context").is_none());
    }
}
