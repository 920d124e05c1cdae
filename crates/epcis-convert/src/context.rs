//! JSON-LD `@context` and XML namespace policy.
//!
//! A context handler owns the mapping between a community's JSON-LD context
//! URL and its XML namespace bindings. Handlers are a fixed list compiled
//! into the binary, sorted ascending by priority with insertion order
//! breaking ties; resolution walks the list and the first handler whose
//! `is_handler` accepts the observed namespaces wins. The default handler
//! accepts anything at the lowest possible priority.

use lazy_static::lazy_static;
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::namespaces::{is_reserved_uri, NamespaceResolver, NamespaceSet};

/// The GS1 default JSON-LD context pinned on every 2.0 document.
pub const DEFAULT_CONTEXT_URL: &str =
    "https://ref.gs1.org/standards/epcis/2.0.0/epcis-context.jsonld";

pub trait ContextHandler: Send + Sync {
    /// Whether this handler is responsible for a document that carries the
    /// given namespaces and context URLs.
    fn is_handler(&self, namespaces: &NamespaceSet) -> bool;

    /// Lower wins. Fallback handlers sit at `i32::MAX`.
    fn priority(&self) -> i32;

    /// Builds the document's `@context` array.
    fn build_json_context(&self, namespaces: &NamespaceSet) -> Vec<Value>;

    /// Populates document-scope XML namespace bindings for the document.
    fn populate_xml_ns(&self, namespaces: &NamespaceSet, resolver: &mut NamespaceResolver);
}

/// Fallback: pins the GS1 default context and re-declares whatever custom
/// namespaces the document carried.
pub struct DefaultContextHandler;

impl ContextHandler for DefaultContextHandler {
    fn is_handler(&self, _namespaces: &NamespaceSet) -> bool {
        true
    }

    fn priority(&self) -> i32 {
        i32::MAX
    }

    fn build_json_context(&self, namespaces: &NamespaceSet) -> Vec<Value> {
        let mut context = vec![Value::String(DEFAULT_CONTEXT_URL.to_string())];
        let custom: Map<String, Value> = namespaces
            .bindings
            .iter()
            .filter(|(uri, prefix)| !is_reserved_uri(uri) && !prefix.is_empty())
            .map(|(uri, prefix)| (prefix.clone(), Value::String(uri.clone())))
            .collect();
        if !custom.is_empty() {
            context.push(Value::Object(custom));
        }
        context
    }

    fn populate_xml_ns(&self, namespaces: &NamespaceSet, resolver: &mut NamespaceResolver) {
        for (uri, prefix) in &namespaces.bindings {
            resolver.add_document_ns(uri, prefix);
        }
    }
}

pub const GS1_EGYPT_CONTEXT_URL: &str =
    "https://gs1eg.org/standards/epcis/2.0.0/epcis-context.jsonld";
pub const GS1_EGYPT_NS_URI: &str = "http://epcis.gs1eg.org/hc/ns";
pub const GS1_EGYPT_PREFIX: &str = "gs1egypthc";

/// GS1 Egypt healthcare: recognised either by its context URL on the JSON
/// side or by its characteristic namespace on the XML side.
pub struct Gs1EgyptContextHandler;

impl ContextHandler for Gs1EgyptContextHandler {
    fn is_handler(&self, namespaces: &NamespaceSet) -> bool {
        namespaces.has_context_url(GS1_EGYPT_CONTEXT_URL)
            || namespaces
                .bindings
                .iter()
                .any(|(uri, prefix)| uri == GS1_EGYPT_NS_URI || prefix == GS1_EGYPT_PREFIX)
    }

    fn priority(&self) -> i32 {
        0
    }

    fn build_json_context(&self, namespaces: &NamespaceSet) -> Vec<Value> {
        let mut context = vec![
            Value::String(DEFAULT_CONTEXT_URL.to_string()),
            Value::String(GS1_EGYPT_CONTEXT_URL.to_string()),
        ];
        let custom: Map<String, Value> = namespaces
            .bindings
            .iter()
            .filter(|(uri, prefix)| {
                !is_reserved_uri(uri) && !prefix.is_empty() && uri.as_str() != GS1_EGYPT_NS_URI
            })
            .map(|(uri, prefix)| (prefix.clone(), Value::String(uri.clone())))
            .collect();
        if !custom.is_empty() {
            context.push(Value::Object(custom));
        }
        context
    }

    fn populate_xml_ns(&self, namespaces: &NamespaceSet, resolver: &mut NamespaceResolver) {
        resolver.add_document_ns(GS1_EGYPT_NS_URI, GS1_EGYPT_PREFIX);
        for (uri, prefix) in &namespaces.bindings {
            resolver.add_document_ns(uri, prefix);
        }
    }
}

pub struct ContextHandlerRegistry {
    handlers: Vec<Box<dyn ContextHandler>>,
}

impl ContextHandlerRegistry {
    /// Builds a registry from `handlers`, kept sorted ascending by priority.
    /// The sort is stable, so insertion order breaks ties.
    pub fn new(handlers: Vec<Box<dyn ContextHandler>>) -> ContextHandlerRegistry {
        let mut handlers = handlers;
        handlers.sort_by_key(|h| h.priority());
        ContextHandlerRegistry { handlers }
    }

    fn handler_for(&self, namespaces: &NamespaceSet) -> Result<&dyn ContextHandler> {
        self.handlers
            .iter()
            .map(|h| h.as_ref())
            .find(|h| h.is_handler(namespaces))
            .ok_or_else(|| {
                Error::Config("no context handler matches the document namespaces".to_string())
            })
    }

    pub fn resolve_for_json(&self, namespaces: &NamespaceSet) -> Result<Vec<Value>> {
        Ok(self.handler_for(namespaces)?.build_json_context(namespaces))
    }

    pub fn resolve_for_xml(
        &self,
        namespaces: &NamespaceSet,
        resolver: &mut NamespaceResolver,
    ) -> Result<()> {
        self.handler_for(namespaces)?
            .populate_xml_ns(namespaces, resolver);
        Ok(())
    }
}

impl Default for ContextHandlerRegistry {
    fn default() -> ContextHandlerRegistry {
        ContextHandlerRegistry::new(vec![
            Box::new(Gs1EgyptContextHandler),
            Box::new(DefaultContextHandler),
        ])
    }
}

lazy_static! {
    static ref REGISTRY: ContextHandlerRegistry = ContextHandlerRegistry::default();
}

/// The process-wide registry, built once and read-only thereafter.
pub fn registry() -> &'static ContextHandlerRegistry {
    &REGISTRY
}
