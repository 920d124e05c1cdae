//! Namespace bookkeeping for one document.
//!
//! Bindings live in two scopes: document scope (declared on the root, valid
//! for every event) and event scope (discovered inside one event element,
//! reset before the next). Well-known EPCIS/GS1 URIs are implicit in the
//! JSON-LD default context and never surface from `all_namespaces`.

use std::collections::BTreeMap;

pub const EPCIS_1_2_XMLNS: &str = "urn:epcglobal:epcis:xsd:1";
pub const EPCIS_2_0_XMLNS: &str = "urn:epcglobal:epcis:xsd:2";
pub const EPCIS_QUERY_XMLNS: &str = "urn:epcglobal:epcis-query:xsd:1";

const RESERVED_URIS: &[&str] = &[
    EPCIS_1_2_XMLNS,
    EPCIS_2_0_XMLNS,
    EPCIS_QUERY_XMLNS,
    "urn:epcglobal:epcis-masterdata:xsd:1",
    "urn:epcglobal:cbv:mda",
    "http://www.w3.org/2001/XMLSchema",
    "http://www.w3.org/2001/XMLSchema-instance",
];

pub fn is_reserved_uri(uri: &str) -> bool {
    RESERVED_URIS.iter().any(|r| r.eq_ignore_ascii_case(uri))
}

/// Snapshot of namespace knowledge handed to context handlers: prefix
/// bindings as uri → prefix, plus any JSON-LD context URLs observed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct NamespaceSet {
    pub bindings: BTreeMap<String, String>,
    pub context_urls: Vec<String>,
}

impl NamespaceSet {
    pub fn has_context_url(&self, url: &str) -> bool {
        self.context_urls.iter().any(|u| u == url)
    }
}

/// Per-document resolver, threaded through a converter as a plain value.
/// Not shared between documents.
#[derive(Debug, Default)]
pub struct NamespaceResolver {
    document: BTreeMap<String, String>,
    event: BTreeMap<String, String>,
}

impl NamespaceResolver {
    pub fn new() -> NamespaceResolver {
        NamespaceResolver::default()
    }

    pub fn add_document_ns(&mut self, uri: &str, prefix: &str) {
        self.document.insert(uri.to_string(), prefix.to_string());
    }

    pub fn add_event_ns(&mut self, uri: &str, prefix: &str) {
        self.event.insert(uri.to_string(), prefix.to_string());
    }

    /// Union of both scopes as uri → prefix; document bindings win on
    /// conflict and reserved URIs are suppressed.
    pub fn all_namespaces(&self) -> BTreeMap<String, String> {
        // chain order makes document entries overwrite event entries
        self.event
            .iter()
            .chain(self.document.iter())
            .filter(|(uri, _)| !is_reserved_uri(uri))
            .map(|(uri, prefix)| (uri.clone(), prefix.clone()))
            .collect()
    }

    pub fn namespace_set(&self) -> NamespaceSet {
        NamespaceSet {
            bindings: self.all_namespaces(),
            context_urls: Vec::new(),
        }
    }

    pub fn reset_event_ns(&mut self) {
        self.event.clear();
    }

    pub fn reset(&mut self) {
        self.document.clear();
        self.event.clear();
    }
}
