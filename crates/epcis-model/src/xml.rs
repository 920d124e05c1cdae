//! XML unmarshalling and marshalling of single event elements.
//!
//! Reading buffers exactly one event subtree into a raw element tree, then
//! folds it into the JSON-LD object form using the shape tables in
//! `fields`. `extension`/`baseExtension` wrappers are spliced away so 1.2
//! shaped events fold to the same form as 2.0 ones. Writing is the inverse:
//! fields are emitted in schema order, extension fields afterwards.

use std::io::BufRead;

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event as XmlEvent};
use quick_xml::{Reader, Writer};
use serde_json::{Map, Number, Value};

use crate::event::{Event, EventType, ModelError};
use crate::fields;

/// Namespace bindings discovered while reading, as (uri, prefix) pairs. The
/// empty prefix is the default namespace.
pub type NsBindings = Vec<(String, String)>;

/// Reads the event element whose start tag was just consumed from `reader`
/// and folds it into an [`Event`]. The reader is left positioned after the
/// event's end tag. Any `xmlns` declarations found on the subtree are
/// appended to `namespaces`.
pub fn read_event<R: BufRead>(
    reader: &mut Reader<R>,
    start: &BytesStart<'_>,
    namespaces: &mut NsBindings,
) -> Result<Event, ModelError> {
    let root = read_element(reader, start, namespaces)?;
    let local = local_name(&root.name).to_string();
    let event_type =
        EventType::from_name(&local).ok_or(ModelError::UnknownEventType(local))?;
    let mut event_fields = Map::new();
    let mut children = Vec::new();
    push_flattened(&root, &mut children);
    for child in children {
        let value = element_to_value(child);
        insert_grouped(&mut event_fields, child.name.clone(), value);
    }
    Ok(Event::new(event_type, event_fields))
}

/// Writes `event` as an XML element named after its type. `root_ns` bindings
/// are declared on the element itself, which single-event output relies on.
pub fn write_event(
    event: &Event,
    root_ns: &[(String, String)],
    indent: bool,
) -> Result<Vec<u8>, ModelError> {
    let mut writer = if indent {
        Writer::new_with_indent(Vec::new(), b' ', 4)
    } else {
        Writer::new(Vec::new())
    };
    let type_name = event.event_type().as_str();
    let mut root = BytesStart::new(type_name);
    for (uri, prefix) in root_ns {
        if prefix.is_empty() {
            root.push_attribute(("xmlns", uri.as_str()));
        } else {
            let key = format!("xmlns:{prefix}");
            root.push_attribute((key.as_str(), uri.as_str()));
        }
    }
    writer.write_event(XmlEvent::Start(root))?;
    for name in fields::xml_order(event.event_type()) {
        if let Some(value) = event.get(name) {
            write_field(&mut writer, name, value)?;
        }
    }
    for (name, value) in event.fields() {
        if name.starts_with('@') || fields::xml_order(event.event_type()).any(|n| n == name.as_str()) {
            continue;
        }
        write_field(&mut writer, name, value)?;
    }
    writer.write_event(XmlEvent::End(BytesEnd::new(type_name)))?;
    Ok(writer.into_inner())
}

struct RawElement {
    name: String,
    attributes: Vec<(String, String)>,
    children: Vec<RawElement>,
    text: String,
}

fn parse_start(
    start: &BytesStart<'_>,
    namespaces: &mut NsBindings,
) -> Result<RawElement, ModelError> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let mut attributes = Vec::new();
    for attr in start.attributes() {
        let attr = attr?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr.unescape_value()?.into_owned();
        if key == "xmlns" {
            namespaces.push((value, String::new()));
        } else if let Some(prefix) = key.strip_prefix("xmlns:") {
            namespaces.push((value, prefix.to_string()));
        } else {
            attributes.push((key, value));
        }
    }
    Ok(RawElement {
        name,
        attributes,
        children: Vec::new(),
        text: String::new(),
    })
}

fn read_element<R: BufRead>(
    reader: &mut Reader<R>,
    start: &BytesStart<'_>,
    namespaces: &mut NsBindings,
) -> Result<RawElement, ModelError> {
    let mut element = parse_start(start, namespaces)?;
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            XmlEvent::Start(e) => {
                let child = read_element(reader, &e, namespaces)?;
                element.children.push(child);
            }
            XmlEvent::Empty(e) => element.children.push(parse_start(&e, namespaces)?),
            XmlEvent::Text(e) => element.text.push_str(&e.unescape()?),
            XmlEvent::CData(e) => {
                let raw = e.into_inner();
                element.text.push_str(&String::from_utf8_lossy(&raw));
            }
            // Nested starts recurse above, so the first end seen here closes
            // this element.
            XmlEvent::End(_) => break,
            XmlEvent::Eof => {
                return Err(ModelError::Malformed(format!(
                    "unexpected end of input inside <{}>",
                    element.name
                )))
            }
            _ => {}
        }
        buf.clear();
    }
    Ok(element)
}

fn local_name(name: &str) -> &str {
    name.rsplit(':').next().unwrap_or(name)
}

/// Collects `el`'s children, splicing away `extension`/`baseExtension`
/// wrappers at any depth directly below the event.
fn push_flattened<'a>(el: &'a RawElement, out: &mut Vec<&'a RawElement>) {
    for child in &el.children {
        if !child.name.contains(':')
            && matches!(child.name.as_str(), "extension" | "baseExtension")
        {
            push_flattened(child, out);
        } else {
            out.push(child);
        }
    }
}

fn insert_grouped(map: &mut Map<String, Value>, key: String, value: Value) {
    match map.get_mut(&key) {
        Some(Value::Array(items)) => items.push(value),
        Some(existing) => {
            let first = existing.take();
            *existing = Value::Array(vec![first, value]);
        }
        None => {
            map.insert(key, value);
        }
    }
}

fn element_to_value(el: &RawElement) -> Value {
    let name = el.name.as_str();
    if !name.contains(':') {
        if let Some(item) = fields::list_item(name) {
            let items: Vec<Value> = el
                .children
                .iter()
                .filter(|c| local_name(&c.name) == item)
                .map(element_to_value)
                .collect();
            return Value::Array(items);
        }
        if name == "persistentDisposition" {
            let mut obj = Map::new();
            for key in ["set", "unset"] {
                let values: Vec<Value> = el
                    .children
                    .iter()
                    .filter(|c| c.name == key)
                    .map(|c| Value::String(c.text.trim().to_string()))
                    .collect();
                if !values.is_empty() {
                    obj.insert(key.to_string(), Value::Array(values));
                }
            }
            return Value::Object(obj);
        }
        if fields::is_typed_item(name) {
            let mut obj = Map::new();
            if let Some((_, t)) = el.attributes.iter().find(|(k, _)| k == "type") {
                obj.insert("type".to_string(), Value::String(t.clone()));
            }
            obj.insert(name.to_string(), Value::String(el.text.trim().to_string()));
            return Value::Object(obj);
        }
        if fields::is_attribute_element(name) {
            let mut obj = Map::new();
            for (k, v) in &el.attributes {
                obj.insert(k.clone(), attribute_value(k, v));
            }
            return Value::Object(obj);
        }
    }
    generic_value(el)
}

fn generic_value(el: &RawElement) -> Value {
    if el.children.is_empty() && el.attributes.is_empty() {
        return scalar_value(local_name(&el.name), el.text.trim());
    }
    let extension = el.name.contains(':');
    let mut obj = Map::new();
    for (k, v) in &el.attributes {
        let key = if extension { format!("@{k}") } else { k.clone() };
        obj.insert(key, attribute_value(k, v));
    }
    for child in &el.children {
        let value = element_to_value(child);
        insert_grouped(&mut obj, child.name.clone(), value);
    }
    let text = el.text.trim();
    if el.children.is_empty() && !text.is_empty() {
        obj.insert(
            "#text".to_string(),
            scalar_value(local_name(&el.name), text),
        );
    }
    Value::Object(obj)
}

fn scalar_value(name: &str, text: &str) -> Value {
    if fields::is_numeric_element(name) {
        if let Some(n) = numeric(text) {
            return Value::Number(n);
        }
    }
    Value::String(text.to_string())
}

fn attribute_value(name: &str, text: &str) -> Value {
    if fields::is_numeric_attribute(name) {
        if let Some(n) = numeric(text) {
            return Value::Number(n);
        }
    }
    if fields::is_boolean_attribute(name) {
        if let Ok(b) = text.parse::<bool>() {
            return Value::Bool(b);
        }
    }
    Value::String(text.to_string())
}

fn numeric(text: &str) -> Option<Number> {
    if let Ok(i) = text.parse::<i64>() {
        return Some(Number::from(i));
    }
    text.parse::<f64>().ok().and_then(Number::from_f64)
}

fn write_field<W: std::io::Write>(
    writer: &mut Writer<W>,
    name: &str,
    value: &Value,
) -> Result<(), ModelError> {
    if !name.contains(':') {
        if let (Some(item), Value::Array(items)) = (fields::list_item(name), value) {
            writer.write_event(XmlEvent::Start(BytesStart::new(name)))?;
            for entry in items {
                write_field(writer, item, entry)?;
            }
            writer.write_event(XmlEvent::End(BytesEnd::new(name)))?;
            return Ok(());
        }
        if name == "persistentDisposition" {
            if let Value::Object(obj) = value {
                writer.write_event(XmlEvent::Start(BytesStart::new(name)))?;
                for key in ["set", "unset"] {
                    if let Some(Value::Array(entries)) = obj.get(key) {
                        for entry in entries {
                            write_text_element(writer, key, &scalar_text(entry))?;
                        }
                    }
                }
                writer.write_event(XmlEvent::End(BytesEnd::new(name)))?;
                return Ok(());
            }
        }
        if fields::is_typed_item(name) {
            if let Value::Object(obj) = value {
                let mut start = BytesStart::new(name);
                if let Some(Value::String(t)) = obj.get("type") {
                    start.push_attribute(("type", t.as_str()));
                }
                let text = obj.get(name).map(scalar_text).unwrap_or_default();
                writer.write_event(XmlEvent::Start(start))?;
                writer.write_event(XmlEvent::Text(BytesText::new(&text)))?;
                writer.write_event(XmlEvent::End(BytesEnd::new(name)))?;
                return Ok(());
            }
        }
        if fields::is_attribute_element(name) {
            if let Value::Object(obj) = value {
                let mut start = BytesStart::new(name);
                for (k, v) in obj {
                    start.push_attribute((k.as_str(), scalar_text(v).as_str()));
                }
                writer.write_event(XmlEvent::Empty(start))?;
                return Ok(());
            }
        }
    }
    match value {
        Value::Array(items) => {
            for entry in items {
                write_field(writer, name, entry)?;
            }
            Ok(())
        }
        Value::Object(obj) => write_object_element(writer, name, obj),
        Value::Null => Ok(()),
        other => write_text_element(writer, name, &scalar_text(other)),
    }
}

fn write_object_element<W: std::io::Write>(
    writer: &mut Writer<W>,
    name: &str,
    obj: &Map<String, Value>,
) -> Result<(), ModelError> {
    let mut start = BytesStart::new(name);
    for (k, v) in obj {
        if let Some(attr) = k.strip_prefix('@') {
            start.push_attribute((attr, scalar_text(v).as_str()));
        }
    }
    let children: Vec<(&String, &Value)> = obj
        .iter()
        .filter(|(k, _)| !k.starts_with('@') && k.as_str() != "#text")
        .collect();
    let text = obj.get("#text");
    if children.is_empty() && text.is_none() {
        writer.write_event(XmlEvent::Empty(start))?;
        return Ok(());
    }
    writer.write_event(XmlEvent::Start(start))?;
    if let Some(t) = text {
        writer.write_event(XmlEvent::Text(BytesText::new(&scalar_text(t))))?;
    }
    for (k, v) in children {
        write_field(writer, k, v)?;
    }
    writer.write_event(XmlEvent::End(BytesEnd::new(name)))?;
    Ok(())
}

fn write_text_element<W: std::io::Write>(
    writer: &mut Writer<W>,
    name: &str,
    text: &str,
) -> Result<(), ModelError> {
    writer.write_event(XmlEvent::Start(BytesStart::new(name)))?;
    writer.write_event(XmlEvent::Text(BytesText::new(text)))?;
    writer.write_event(XmlEvent::End(BytesEnd::new(name)))?;
    Ok(())
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    fn parse(xml: &str) -> (Event, NsBindings) {
        let mut reader = Reader::from_reader(xml.as_bytes());
        reader.config_mut().trim_text(true);
        let mut buf = Vec::new();
        let mut ns = Vec::new();
        loop {
            match reader.read_event_into(&mut buf).expect("read xml") {
                XmlEvent::Start(e) => {
                    let start = e.to_owned();
                    let event = read_event(&mut reader, &start, &mut ns).expect("read event");
                    return (event, ns);
                }
                XmlEvent::Eof => panic!("no event element in input"),
                _ => {}
            }
            buf.clear();
        }
    }

    const AGGREGATION: &str = r#"<AggregationEvent>
        <eventTime>2013-06-08T14:58:56.591Z</eventTime>
        <eventTimeZoneOffset>+02:00</eventTimeZoneOffset>
        <parentID>urn:epc:id:sscc:0614141.1234567890</parentID>
        <childEPCs>
            <epc>urn:epc:id:sgtin:0614141.107346.2017</epc>
            <epc>urn:epc:id:sgtin:0614141.107346.2018</epc>
        </childEPCs>
        <action>OBSERVE</action>
        <bizStep>urn:epcglobal:cbv:bizstep:receiving</bizStep>
        <readPoint><id>urn:epc:id:sgln:0614141.00777.0</id></readPoint>
    </AggregationEvent>"#;

    #[test]
    fn aggregation_event_is_unmarshalled() {
        let (event, _) = parse(AGGREGATION);
        assert_eq!(EventType::Aggregation, event.event_type());
        assert_eq!(
            Some(&json!("urn:epc:id:sscc:0614141.1234567890")),
            event.get("parentID")
        );
        assert_eq!(
            Some(&json!([
                "urn:epc:id:sgtin:0614141.107346.2017",
                "urn:epc:id:sgtin:0614141.107346.2018"
            ])),
            event.get("childEPCs")
        );
        assert_eq!(Some(&json!("OBSERVE")), event.get("action"));
        assert_eq!(
            Some(&json!({"id": "urn:epc:id:sgln:0614141.00777.0"})),
            event.get("readPoint")
        );
    }

    #[test]
    fn quantity_lists_and_biz_transactions_are_structured() {
        let xml = r#"<ObjectEvent>
            <eventTime>2021-04-01T10:00:00.000Z</eventTime>
            <eventTimeZoneOffset>+00:00</eventTimeZoneOffset>
            <epcList><epc>urn:epc:id:sgtin:0614141.107346.2018</epc></epcList>
            <action>ADD</action>
            <bizTransactionList>
                <bizTransaction type="urn:epcglobal:cbv:btt:po">urn:epc:id:gdti:0614141.00001.1618034</bizTransaction>
            </bizTransactionList>
            <quantityList>
                <quantityElement>
                    <epcClass>urn:epc:class:lgtin:4012345.012345.998877</epcClass>
                    <quantity>200</quantity>
                    <uom>KGM</uom>
                </quantityElement>
            </quantityList>
        </ObjectEvent>"#;
        let (event, _) = parse(xml);
        assert_eq!(
            Some(&json!([{
                "type": "urn:epcglobal:cbv:btt:po",
                "bizTransaction": "urn:epc:id:gdti:0614141.00001.1618034"
            }])),
            event.get("bizTransactionList")
        );
        assert_eq!(
            Some(&json!([{
                "epcClass": "urn:epc:class:lgtin:4012345.012345.998877",
                "quantity": 200,
                "uom": "KGM"
            }])),
            event.get("quantityList")
        );
    }

    #[test]
    fn extension_fields_keep_their_prefix_and_namespaces_are_captured() {
        let xml = r#"<ObjectEvent xmlns:example="http://ns.example.com/epcis">
            <eventTime>2021-04-01T10:00:00.000Z</eventTime>
            <eventTimeZoneOffset>+00:00</eventTimeZoneOffset>
            <action>OBSERVE</action>
            <example:myField>abc</example:myField>
            <example:nested><example:inner unit="u">7</example:inner></example:nested>
        </ObjectEvent>"#;
        let (event, ns) = parse(xml);
        assert_eq!(Some(&json!("abc")), event.get("example:myField"));
        assert_eq!(
            Some(&json!({"example:inner": {"@unit": "u", "#text": "7"}})),
            event.get("example:nested")
        );
        assert!(ns.contains(&("http://ns.example.com/epcis".to_string(), "example".to_string())));
    }

    #[test]
    fn legacy_extension_wrappers_are_spliced() {
        let xml = r#"<ObjectEvent>
            <eventTime>2021-04-01T10:00:00.000Z</eventTime>
            <eventTimeZoneOffset>+00:00</eventTimeZoneOffset>
            <epcList><epc>urn:epc:id:sgtin:0614141.107346.2017</epc></epcList>
            <action>OBSERVE</action>
            <extension>
                <quantityList>
                    <quantityElement>
                        <epcClass>urn:epc:class:lgtin:4012345.012345.998877</epcClass>
                        <quantity>6.5</quantity>
                        <uom>KGM</uom>
                    </quantityElement>
                </quantityList>
            </extension>
        </ObjectEvent>"#;
        let (event, _) = parse(xml);
        let quantity_list = event.get("quantityList").expect("spliced quantityList");
        assert_eq!(json!(6.5), quantity_list[0]["quantity"]);
    }

    #[test]
    fn sensor_reports_coerce_numeric_and_boolean_attributes() {
        let xml = r#"<ObjectEvent>
            <eventTime>2021-04-01T10:00:00.000Z</eventTime>
            <eventTimeZoneOffset>+00:00</eventTimeZoneOffset>
            <action>OBSERVE</action>
            <sensorElementList>
                <sensorElement>
                    <sensorMetadata time="2019-07-19T13:00:00.000Z" deviceID="urn:epc:id:giai:4000001.111"/>
                    <sensorReport type="gs1:Temperature" value="26.0" uom="CEL"/>
                    <sensorReport type="gs1:Alarm" booleanValue="true"/>
                </sensorElement>
            </sensorElementList>
        </ObjectEvent>"#;
        let (event, _) = parse(xml);
        let sensors = event.get("sensorElementList").expect("sensor list");
        let reports = &sensors[0]["sensorReport"];
        assert_eq!(json!(26.0), reports[0]["value"]);
        assert_eq!(json!(true), reports[1]["booleanValue"]);
        assert_eq!(
            json!("urn:epc:id:giai:4000001.111"),
            sensors[0]["sensorMetadata"]["deviceID"]
        );
    }

    #[test]
    fn events_are_written_in_schema_order() {
        let (event, _) = parse(AGGREGATION);
        let bytes = write_event(&event, &[], true).expect("write event");
        let xml = String::from_utf8(bytes).expect("utf-8 xml");
        let time = xml.find("<eventTime>").expect("eventTime");
        let parent = xml.find("<parentID>").expect("parentID");
        let children = xml.find("<childEPCs>").expect("childEPCs");
        let action = xml.find("<action>").expect("action");
        assert!(time < parent && parent < children && children < action);
    }

    #[test]
    fn xml_events_round_trip() {
        let (event, _) = parse(AGGREGATION);
        let bytes = write_event(&event, &[], false).expect("write event");
        let (reread, _) = parse(&String::from_utf8(bytes).expect("utf-8 xml"));
        assert_eq!(event, reread);
    }

    #[test]
    fn persistent_disposition_round_trips() {
        let xml = r#"<ObjectEvent>
            <eventTime>2021-04-01T10:00:00.000Z</eventTime>
            <eventTimeZoneOffset>+00:00</eventTimeZoneOffset>
            <action>OBSERVE</action>
            <persistentDisposition>
                <set>urn:epcglobal:cbv:disp:completeness_inferred</set>
                <unset>urn:epcglobal:cbv:disp:completeness_verified</unset>
            </persistentDisposition>
        </ObjectEvent>"#;
        let (event, _) = parse(xml);
        assert_eq!(
            Some(&json!({
                "set": ["urn:epcglobal:cbv:disp:completeness_inferred"],
                "unset": ["urn:epcglobal:cbv:disp:completeness_verified"]
            })),
            event.get("persistentDisposition")
        );
        let bytes = write_event(&event, &[], false).expect("write event");
        let (reread, _) = parse(&String::from_utf8(bytes).expect("utf-8 xml"));
        assert_eq!(event, reread);
    }

    #[test]
    fn single_event_root_declares_namespaces() {
        let (event, _) = parse(AGGREGATION);
        let ns = vec![("http://ns.example.com/epcis".to_string(), "example".to_string())];
        let bytes = write_event(&event, &ns, false).expect("write event");
        let xml = String::from_utf8(bytes).expect("utf-8 xml");
        assert!(xml.starts_with("<AggregationEvent xmlns:example=\"http://ns.example.com/epcis\">"));
    }
}
