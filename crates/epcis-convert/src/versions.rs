//! Streaming rewrite between the 1.2 and 2.0 XML syntaxes.
//!
//! 1.2 hides newer content behind `extension`/`baseExtension` wrappers;
//! 2.0 flattens them and introduces constructs 1.2 has no name for. The
//! upconvert splices wrappers away and bumps the declared version and
//! namespace; the downconvert reverses both, and either drops the
//! 2.0-only constructs (`strict12 = true`) or tucks them back under an
//! `extension` wrapper.

use std::io::{BufRead, Write};

use quick_xml::events::{BytesEnd, BytesStart, Event as XmlEvent};
use quick_xml::name::QName;
use quick_xml::{Reader, Writer};

use epcis_model::EventType;

use crate::error::Result;
use crate::namespaces::{EPCIS_1_2_XMLNS, EPCIS_2_0_XMLNS};

/// Elements that exist only from 2.0 onward. On a strict downconvert they
/// are dropped; otherwise they ride along under an `extension` wrapper.
fn is_2_0_only(local: &str, parent_is_event_list: bool) -> bool {
    match local {
        "AssociationEvent" => parent_is_event_list,
        "sensorElementList" | "persistentDisposition" => !parent_is_event_list,
        _ => false,
    }
}

/// Rewrites a 1.2 document as 2.0: version and namespace bumped,
/// `extension`/`baseExtension` wrappers spliced away. Text and formatting
/// outside the rewritten tags pass through untouched.
pub fn upconvert<R: BufRead, W: Write>(input: R, output: W) -> Result<()> {
    let mut reader = Reader::from_reader(input);
    let mut writer = Writer::new(output);
    let mut buf = Vec::new();
    // true marks an element whose tags are suppressed
    let mut spliced: Vec<bool> = Vec::new();
    loop {
        buf.clear();
        match reader.read_event_into(&mut buf)? {
            XmlEvent::Start(e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                if is_wrapper(&name) {
                    spliced.push(true);
                } else {
                    spliced.push(false);
                    if spliced.len() == 1 {
                        writer.write_event(XmlEvent::Start(rewrite_root(
                            &e,
                            "2.0",
                            EPCIS_1_2_XMLNS,
                            EPCIS_2_0_XMLNS,
                        )?))?;
                    } else {
                        writer.write_event(XmlEvent::Start(e))?;
                    }
                }
            }
            XmlEvent::Empty(e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                if !is_wrapper(&name) {
                    writer.write_event(XmlEvent::Empty(e))?;
                }
            }
            XmlEvent::End(e) => {
                if spliced.pop() != Some(true) {
                    writer.write_event(XmlEvent::End(e))?;
                }
            }
            XmlEvent::Eof => break,
            other => writer.write_event(other)?,
        }
    }
    Ok(())
}

/// Rewrites a 2.0 document as 1.2. `TransformationEvent` goes back under
/// its `extension` wrapper; 2.0-only constructs are dropped when `strict12`
/// and wrapped as extensions otherwise.
pub fn downconvert<R: BufRead, W: Write>(input: R, output: W, strict12: bool) -> Result<()> {
    let mut reader = Reader::from_reader(input);
    let mut writer = Writer::new(output);
    let mut buf = Vec::new();
    let mut skip_buf = Vec::new();
    let mut stack: Vec<Frame> = Vec::new();
    loop {
        buf.clear();
        match reader.read_event_into(&mut buf)? {
            XmlEvent::Start(e) => {
                let raw_name = e.name().as_ref().to_vec();
                let name = String::from_utf8_lossy(&raw_name).into_owned();
                let local = local_name(&name).to_string();
                let parent_is_event_list = stack
                    .last()
                    .map(|f| local_name(&f.name) == "EventList")
                    .unwrap_or(false);
                let wrap = if local == "TransformationEvent" && parent_is_event_list {
                    true
                } else if is_2_0_only(&local, parent_is_event_list)
                    && inside_event_context(&stack, parent_is_event_list)
                {
                    if strict12 {
                        reader.read_to_end_into(QName(&raw_name), &mut skip_buf)?;
                        skip_buf.clear();
                        continue;
                    }
                    true
                } else {
                    false
                };
                if wrap {
                    writer.write_event(XmlEvent::Start(BytesStart::new("extension")))?;
                }
                if stack.is_empty() {
                    writer.write_event(XmlEvent::Start(rewrite_root(
                        &e,
                        "1.2",
                        EPCIS_2_0_XMLNS,
                        EPCIS_1_2_XMLNS,
                    )?))?;
                } else {
                    writer.write_event(XmlEvent::Start(e))?;
                }
                stack.push(Frame { name, wrapped: wrap });
            }
            XmlEvent::Empty(e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                let local = local_name(&name).to_string();
                let parent_is_event_list = stack
                    .last()
                    .map(|f| local_name(&f.name) == "EventList")
                    .unwrap_or(false);
                if is_2_0_only(&local, parent_is_event_list) {
                    if strict12 {
                        continue;
                    }
                    writer.write_event(XmlEvent::Start(BytesStart::new("extension")))?;
                    writer.write_event(XmlEvent::Empty(e))?;
                    writer.write_event(XmlEvent::End(BytesEnd::new("extension")))?;
                } else {
                    writer.write_event(XmlEvent::Empty(e))?;
                }
            }
            XmlEvent::End(e) => {
                let frame = stack.pop();
                writer.write_event(XmlEvent::End(e))?;
                if frame.map(|f| f.wrapped).unwrap_or(false) {
                    writer.write_event(XmlEvent::End(BytesEnd::new("extension")))?;
                }
            }
            XmlEvent::Eof => break,
            other => writer.write_event(other)?,
        }
    }
    Ok(())
}

struct Frame {
    name: String,
    wrapped: bool,
}

fn is_wrapper(name: &str) -> bool {
    !name.contains(':') && matches!(name, "extension" | "baseExtension")
}

fn local_name(name: &str) -> &str {
    name.rsplit(':').next().unwrap_or(name)
}

/// The event-body constructs only count as 2.0-only when they sit inside an
/// event; `AssociationEvent` only directly under the event list.
fn inside_event_context(stack: &[Frame], parent_is_event_list: bool) -> bool {
    parent_is_event_list
        || stack
            .iter()
            .any(|f| EventType::is_event_name(local_name(&f.name)))
}

fn rewrite_root(
    start: &BytesStart<'_>,
    version: &str,
    ns_from: &str,
    ns_to: &str,
) -> Result<BytesStart<'static>> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let mut out = BytesStart::new(name);
    for attr in start.attributes() {
        let attr = attr?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr.unescape_value()?.into_owned();
        if local_name(&key) == "schemaVersion" {
            out.push_attribute((key.as_str(), version));
        } else if key.starts_with("xmlns") && value == ns_from {
            out.push_attribute((key.as_str(), ns_to));
        } else {
            out.push_attribute((key.as_str(), value.as_str()));
        }
    }
    Ok(out)
}
