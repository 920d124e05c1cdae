//! EPCIS domain representation and the schema-aware event codec.
//!
//! An event is held in its JSON-LD object form: a tagged event type plus a
//! map of fields whose values are `serde_json::Value`s. The `xml` module
//! knows how to pull one event element off a quick-xml reader into that form
//! and how to write the form back out as schema-ordered XML; the `json`
//! module is the (much thinner) JSON side. Knowledge of EPCIS shapes
//! (which containers repeat, which elements carry their payload in
//! attributes, which values are numeric) lives in `fields` and is shared
//! by both directions.

mod event;
mod fields;
pub mod json;
pub mod xml;

pub use event::{DocumentKind, Event, EventType, ModelError};
