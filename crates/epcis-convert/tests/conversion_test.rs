//! End-to-end conversion scenarios over literal documents.

use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde_json::Value;

use epcis_convert::{
    Collector, ConvertOptions, DocumentContext, Error, EventSink, ListCollector, Representation,
    Result, VersionTransformer, XmlToJsonConverter,
};

const AGGREGATION_1_2: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<epcis:EPCISDocument xmlns:epcis="urn:epcglobal:epcis:xsd:1" schemaVersion="1.2" creationDate="2013-06-08T14:58:56.591Z">
<EPCISBody>
<EventList>
<AggregationEvent>
<eventTime>2013-06-08T14:58:56.591Z</eventTime>
<eventTimeZoneOffset>+02:00</eventTimeZoneOffset>
<parentID>urn:epc:id:sscc:0614141.1234567890</parentID>
<childEPCs>
<epc>urn:epc:id:sgtin:0614141.107346.2017</epc>
</childEPCs>
<action>OBSERVE</action>
<bizStep>urn:epcglobal:cbv:bizstep:receiving</bizStep>
</AggregationEvent>
</EventList>
</EPCISBody>
</epcis:EPCISDocument>"#;

fn convert(input: &str, source: Option<Representation>, target: Representation) -> Vec<u8> {
    let mut out = Vec::new();
    VersionTransformer::new()
        .convert(
            Cursor::new(input.as_bytes().to_vec()),
            &mut out,
            source,
            target,
            &ConvertOptions::default(),
        )
        .expect("conversion succeeds");
    out
}

#[test]
fn aggregation_event_1_2_xml_becomes_2_0_json() {
    let out = convert(AGGREGATION_1_2, None, Representation::JSON_2_0);
    let doc: Value = serde_json::from_slice(&out).expect("output is valid JSON");
    assert_eq!("EPCISDocument", doc["type"]);
    assert_eq!("2.0", doc["schemaVersion"]);
    let events = doc["epcisBody"]["eventList"].as_array().unwrap();
    assert_eq!(1, events.len());
    let event = &events[0];
    assert_eq!("AggregationEvent", event["type"]);
    assert_eq!("urn:epc:id:sscc:0614141.1234567890", event["parentID"]);
    assert_eq!(
        serde_json::json!(["urn:epc:id:sgtin:0614141.107346.2017"]),
        event["childEPCs"]
    );
    assert_eq!("OBSERVE", event["action"]);
}

const TWO_OBJECT_EVENTS_2_0: &str = r#"<epcis:EPCISDocument xmlns:epcis="urn:epcglobal:epcis:xsd:2" schemaVersion="2.0" creationDate="2021-04-01T10:00:00.000Z">
<EPCISBody>
<EventList>
<ObjectEvent>
<eventTime>2021-04-01T10:15:00.000Z</eventTime>
<eventTimeZoneOffset>+00:00</eventTimeZoneOffset>
<epcList><epc>urn:epc:id:sgtin:0614141.107346.2017</epc></epcList>
<action>OBSERVE</action>
</ObjectEvent>
<ObjectEvent>
<eventTime>2021-04-01T10:20:00.000Z</eventTime>
<eventTimeZoneOffset>+00:00</eventTimeZoneOffset>
<epcList><epc>urn:epc:id:sgtin:0614141.107346.2018</epc></epcList>
<action>ADD</action>
</ObjectEvent>
</EventList>
</EPCISBody>
</epcis:EPCISDocument>"#;

#[test]
fn a_list_collector_returns_both_events_in_order() {
    let mut sink = EventSink::new(None, Some(ListCollector::new())).unwrap();
    XmlToJsonConverter::new()
        .convert(TWO_OBJECT_EVENTS_2_0.as_bytes(), &mut sink)
        .unwrap();
    let events: Vec<Value> = sink
        .into_collector()
        .unwrap()
        .into_events()
        .iter()
        .map(|b| serde_json::from_slice(b).unwrap())
        .collect();
    assert_eq!(2, events.len());
    assert_eq!(
        "urn:epc:id:sgtin:0614141.107346.2017",
        events[0]["epcList"][0]
    );
    assert_eq!(
        "urn:epc:id:sgtin:0614141.107346.2018",
        events[1]["epcList"][0]
    );
}

#[test]
fn query_documents_round_trip_from_json_to_xml() {
    let input = serde_json::json!({
        "@context": ["https://ref.gs1.org/standards/epcis/2.0.0/epcis-context.jsonld"],
        "type": "EPCISQueryDocument",
        "schemaVersion": "2.0",
        "creationDate": "2021-04-01T10:00:00.000Z",
        "epcisBody": {
            "queryResults": {
                "subscriptionID": "sub-1",
                "queryName": "SimpleEventQuery",
                "resultsBody": {
                    "eventList": [{
                        "type": "ObjectEvent",
                        "eventTime": "2021-04-01T10:15:00.000Z",
                        "eventTimeZoneOffset": "+00:00",
                        "action": "OBSERVE"
                    }]
                }
            }
        }
    })
    .to_string();
    let out = convert(&input, None, Representation::XML_2_0);
    let xml = String::from_utf8(out).unwrap();
    assert!(xml.contains("<epcisq:EPCISQueryDocument"));
    assert!(xml.contains("<subscriptionID>sub-1</subscriptionID>"));
    assert!(xml.contains("<queryName>SimpleEventQuery</queryName>"));
    assert!(xml.contains("<resultsBody>"));
    assert!(xml.contains("<EventList>"));
    assert!(xml.contains("</epcisq:EPCISQueryDocument>"));
}

#[test]
fn gs1_egypt_context_resolves_to_its_namespace() {
    let input = serde_json::json!({
        "@context": [
            "https://ref.gs1.org/standards/epcis/2.0.0/epcis-context.jsonld",
            "https://gs1eg.org/standards/epcis/2.0.0/epcis-context.jsonld"
        ],
        "type": "EPCISDocument",
        "schemaVersion": "2.0",
        "epcisBody": { "eventList": [{
            "type": "ObjectEvent",
            "eventTime": "2021-04-01T10:15:00.000Z",
            "eventTimeZoneOffset": "+00:00",
            "action": "OBSERVE"
        }] }
    })
    .to_string();
    let out = convert(&input, None, Representation::XML_2_0);
    let xml = String::from_utf8(out).unwrap();
    assert!(xml.contains("xmlns:gs1egypthc=\"http://epcis.gs1eg.org/hc/ns\""));
}

const ASSOCIATION_2_0: &str = r#"<epcis:EPCISDocument xmlns:epcis="urn:epcglobal:epcis:xsd:2" schemaVersion="2.0">
<EPCISBody>
<EventList>
<AssociationEvent>
<eventTime>2021-04-01T10:15:00.000Z</eventTime>
<eventTimeZoneOffset>+00:00</eventTimeZoneOffset>
<parentID>urn:epc:id:grai:4012345.55555.987</parentID>
<action>ADD</action>
</AssociationEvent>
</EventList>
</EPCISBody>
</epcis:EPCISDocument>"#;

#[test]
fn strict_downconvert_suppresses_association_events() {
    let strict = convert(ASSOCIATION_2_0, None, Representation::XML_1_2);
    let xml = String::from_utf8(strict).unwrap();
    assert!(!xml.contains("AssociationEvent"));
    assert!(xml.contains("schemaVersion=\"1.2\""));

    let mut lenient_out = Vec::new();
    VersionTransformer::new()
        .convert(
            Cursor::new(ASSOCIATION_2_0.as_bytes().to_vec()),
            &mut lenient_out,
            None,
            Representation::XML_1_2,
            &ConvertOptions {
                strict12: false,
                ..ConvertOptions::default()
            },
        )
        .unwrap();
    let lenient = String::from_utf8(lenient_out).unwrap();
    assert!(lenient.contains("<extension><AssociationEvent>"));
}

#[test]
fn prescan_failure_reports_a_format_error() {
    let mut out = Vec::new();
    let result = VersionTransformer::new().convert(
        Cursor::new(b"not data!".to_vec()),
        &mut out,
        None,
        Representation::JSON_2_0,
        &ConvertOptions::default(),
    );
    match result {
        Err(Error::Format(_)) => {}
        Err(e) => panic!("unexpected error: {e}"),
        Ok(()) => panic!("expected a format error"),
    }
    assert!(out.is_empty());
}

#[test]
fn xml_to_json_to_xml_preserves_events_and_custom_prefixes() {
    let input = r#"<epcis:EPCISDocument xmlns:epcis="urn:epcglobal:epcis:xsd:2" xmlns:example="http://ns.example.com/epcis" schemaVersion="2.0" creationDate="2021-04-01T10:00:00.000Z">
<EPCISBody>
<EventList>
<ObjectEvent>
<eventTime>2021-04-01T10:15:00.000Z</eventTime>
<eventTimeZoneOffset>+00:00</eventTimeZoneOffset>
<epcList><epc>urn:epc:id:sgtin:0614141.107346.2017</epc></epcList>
<action>OBSERVE</action>
<example:myField>abc</example:myField>
</ObjectEvent>
</EventList>
</EPCISBody>
</epcis:EPCISDocument>"#;
    let json = convert(input, None, Representation::JSON_2_0);
    let doc: Value = serde_json::from_slice(&json).unwrap();
    let context = doc["@context"].as_array().unwrap();
    assert!(context
        .iter()
        .any(|entry| entry["example"] == "http://ns.example.com/epcis"));

    let back = convert(
        &String::from_utf8(json).unwrap(),
        None,
        Representation::XML_2_0,
    );
    let xml = String::from_utf8(back).unwrap();
    assert!(xml.contains("xmlns:example=\"http://ns.example.com/epcis\""));
    assert!(xml.contains("<example:myField>abc</example:myField>"));
    assert!(xml.contains("<epc>urn:epc:id:sgtin:0614141.107346.2017</epc>"));
    assert!(xml.contains("<action>OBSERVE</action>"));
}

#[test]
fn structurally_invalid_events_are_still_emitted() {
    // no action and a bogus offset: violates the ObjectEvent schema
    let input = r#"<epcis:EPCISDocument xmlns:epcis="urn:epcglobal:epcis:xsd:2" schemaVersion="2.0">
<EPCISBody>
<EventList>
<ObjectEvent>
<eventTime>2021-04-01T10:15:00.000Z</eventTime>
<eventTimeZoneOffset>whenever</eventTimeZoneOffset>
</ObjectEvent>
</EventList>
</EPCISBody>
</epcis:EPCISDocument>"#;
    let out = convert(input, None, Representation::JSON_2_0);
    let doc: Value = serde_json::from_slice(&out).unwrap();
    let events = doc["epcisBody"]["eventList"].as_array().unwrap();
    assert_eq!(1, events.len());
    assert_eq!("whenever", events[0]["eventTimeZoneOffset"]);
}

/// Counts lifecycle calls so the close-exactly-once contract is observable.
#[derive(Clone, Default)]
struct CountingCollector {
    closes: Arc<AtomicUsize>,
    fail_collect: bool,
}

impl Collector for CountingCollector {
    fn start(&mut self, _: &DocumentContext) -> Result<()> {
        Ok(())
    }
    fn collect(&mut self, _: &[u8]) -> Result<()> {
        if self.fail_collect {
            Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "collector went away",
            )))
        } else {
            Ok(())
        }
    }
    fn end(&mut self) -> Result<()> {
        Ok(())
    }
    fn start_single(&mut self, _: &DocumentContext) -> Result<()> {
        Ok(())
    }
    fn collect_single(&mut self, _: &[u8]) -> Result<()> {
        Ok(())
    }
    fn end_single(&mut self) -> Result<()> {
        Ok(())
    }
    fn is_epcis_document(&self) -> bool {
        true
    }
    fn close(&mut self) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[test]
fn the_collector_is_closed_exactly_once_on_success_and_on_failure() {
    let closes = Arc::new(AtomicUsize::new(0));
    let collector = CountingCollector {
        closes: Arc::clone(&closes),
        fail_collect: false,
    };
    let mut sink = EventSink::new(None, Some(collector)).unwrap();
    XmlToJsonConverter::new()
        .convert(TWO_OBJECT_EVENTS_2_0.as_bytes(), &mut sink)
        .unwrap();
    assert_eq!(1, closes.load(Ordering::SeqCst));

    let closes = Arc::new(AtomicUsize::new(0));
    let collector = CountingCollector {
        closes: Arc::clone(&closes),
        fail_collect: true,
    };
    let mut sink = EventSink::new(None, Some(collector)).unwrap();
    let result = XmlToJsonConverter::new().convert(TWO_OBJECT_EVENTS_2_0.as_bytes(), &mut sink);
    assert!(result.is_err());
    assert_eq!(1, closes.load(Ordering::SeqCst));
}
