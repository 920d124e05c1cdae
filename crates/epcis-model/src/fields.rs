//! EPCIS shape tables shared by the XML and JSON directions.
//!
//! The wire formats disagree about structure in a handful of well-known
//! places: XML wraps repeated values in container elements where JSON uses
//! plain arrays, and a few elements carry their payload in attributes. The
//! tables here name those places once so reading and writing stay inverse
//! operations of each other.

use crate::event::EventType;

/// Item element name carried by each repeating list container.
pub(crate) fn list_item(container: &str) -> Option<&'static str> {
    Some(match container {
        "epcList" | "childEPCs" | "inputEPCList" | "outputEPCList" => "epc",
        "quantityList" | "childQuantityList" | "inputQuantityList" | "outputQuantityList" => {
            "quantityElement"
        }
        "bizTransactionList" => "bizTransaction",
        "sourceList" => "source",
        "destinationList" => "destination",
        "sensorElementList" => "sensorElement",
        "correctiveEventIDs" => "correctiveEventID",
        _ => return None,
    })
}

/// Elements whose value is a `type` attribute plus character content. In
/// JSON they become `{"type": …, "<name>": …}` objects.
pub(crate) fn is_typed_item(name: &str) -> bool {
    matches!(name, "bizTransaction" | "source" | "destination")
}

/// Elements whose entire payload lives in attributes.
pub(crate) fn is_attribute_element(name: &str) -> bool {
    matches!(name, "sensorMetadata" | "sensorReport")
}

/// Character content that is numeric in JSON.
pub(crate) fn is_numeric_element(name: &str) -> bool {
    matches!(name, "quantity")
}

/// Sensor report / metadata attributes that are numeric in JSON.
pub(crate) fn is_numeric_attribute(name: &str) -> bool {
    matches!(
        name,
        "value" | "minValue" | "maxValue" | "meanValue" | "sDev" | "percRank" | "percValue"
    )
}

pub(crate) fn is_boolean_attribute(name: &str) -> bool {
    name == "booleanValue"
}

const COMMON_HEAD: &[&str] = &[
    "eventTime",
    "recordTime",
    "eventTimeZoneOffset",
    "eventID",
    "errorDeclaration",
    "certificationInfo",
];

const OBJECT_TAIL: &[&str] = &[
    "epcList",
    "action",
    "bizStep",
    "disposition",
    "persistentDisposition",
    "readPoint",
    "bizLocation",
    "bizTransactionList",
    "quantityList",
    "sourceList",
    "destinationList",
    "sensorElementList",
    "ilmd",
];

const AGGREGATION_TAIL: &[&str] = &[
    "parentID",
    "childEPCs",
    "action",
    "bizStep",
    "disposition",
    "persistentDisposition",
    "readPoint",
    "bizLocation",
    "bizTransactionList",
    "childQuantityList",
    "sourceList",
    "destinationList",
    "sensorElementList",
    "ilmd",
];

const TRANSACTION_TAIL: &[&str] = &[
    "bizTransactionList",
    "parentID",
    "epcList",
    "action",
    "bizStep",
    "disposition",
    "persistentDisposition",
    "readPoint",
    "bizLocation",
    "quantityList",
    "sourceList",
    "destinationList",
    "sensorElementList",
    "ilmd",
];

const TRANSFORMATION_TAIL: &[&str] = &[
    "inputEPCList",
    "inputQuantityList",
    "outputEPCList",
    "outputQuantityList",
    "transformationID",
    "bizStep",
    "disposition",
    "persistentDisposition",
    "readPoint",
    "bizLocation",
    "bizTransactionList",
    "sourceList",
    "destinationList",
    "ilmd",
    "sensorElementList",
];

const ASSOCIATION_TAIL: &[&str] = &[
    "parentID",
    "childEPCs",
    "childQuantityList",
    "action",
    "bizStep",
    "disposition",
    "readPoint",
    "bizLocation",
    "bizTransactionList",
    "sourceList",
    "destinationList",
    "sensorElementList",
    "ilmd",
];

/// Schema element order for an event's XML body. Fields not named here
/// (extensions) are written after the known fields, in key order.
pub(crate) fn xml_order(event_type: EventType) -> impl Iterator<Item = &'static str> {
    let tail = match event_type {
        EventType::Object => OBJECT_TAIL,
        EventType::Aggregation => AGGREGATION_TAIL,
        EventType::Transaction => TRANSACTION_TAIL,
        EventType::Transformation => TRANSFORMATION_TAIL,
        EventType::Association => ASSOCIATION_TAIL,
    };
    COMMON_HEAD.iter().chain(tail.iter()).copied()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn list_containers_name_their_items() {
        assert_eq!(Some("epc"), list_item("childEPCs"));
        assert_eq!(Some("quantityElement"), list_item("inputQuantityList"));
        assert_eq!(Some("bizTransaction"), list_item("bizTransactionList"));
        assert_eq!(None, list_item("readPoint"));
        assert_eq!(None, list_item("ilmd"));
    }

    #[test]
    fn every_event_type_orders_its_action_like_fields() {
        for t in [EventType::Object, EventType::Aggregation, EventType::Association] {
            let order: Vec<_> = xml_order(t).collect();
            assert!(order.contains(&"action"), "{t:?} misses action");
            assert!(order.contains(&"eventTime"));
        }
        let transformation: Vec<_> = xml_order(EventType::Transformation).collect();
        assert!(!transformation.contains(&"action"));
        assert!(transformation.contains(&"transformationID"));
    }
}
