//! Fan-out of emitted events to the validator and the collector.

use crate::collect::{Collector, DocumentContext};
use crate::error::{Error, Result};
use crate::validate::EventValidator;

/// Composes an optional validator with an optional collector. Validation is
/// advisory; a collector failure aborts the conversion. Converters call
/// `fail` and `close` on every exit path.
pub struct EventSink<'a, C: Collector> {
    validator: Option<&'a EventValidator>,
    collector: Option<C>,
    closed: bool,
}

impl<'a, C: Collector> EventSink<'a, C> {
    pub fn new(validator: Option<&'a EventValidator>, collector: Option<C>) -> Result<Self> {
        if validator.is_none() && collector.is_none() {
            return Err(Error::Config(
                "an event sink needs a validator or a collector".to_string(),
            ));
        }
        Ok(EventSink {
            validator,
            collector,
            closed: false,
        })
    }

    pub fn start(&mut self, ctx: &DocumentContext) -> Result<()> {
        match &mut self.collector {
            Some(c) => c.start(ctx),
            None => Ok(()),
        }
    }

    pub fn event(&mut self, event: &[u8]) -> Result<()> {
        if let Some(validator) = self.validator {
            validator.validate(event);
        }
        match &mut self.collector {
            Some(c) => c.collect(event),
            None => Ok(()),
        }
    }

    pub fn end(&mut self) -> Result<()> {
        match &mut self.collector {
            Some(c) => c.end(),
            None => Ok(()),
        }
    }

    pub fn start_single(&mut self, ctx: &DocumentContext) -> Result<()> {
        match &mut self.collector {
            Some(c) => c.start_single(ctx),
            None => Ok(()),
        }
    }

    pub fn event_single(&mut self, event: &[u8]) -> Result<()> {
        if let Some(validator) = self.validator {
            validator.validate(event);
        }
        match &mut self.collector {
            Some(c) => c.collect_single(event),
            None => Ok(()),
        }
    }

    pub fn end_single(&mut self) -> Result<()> {
        match &mut self.collector {
            Some(c) => c.end_single(),
            None => Ok(()),
        }
    }

    /// Records that the conversion is aborting. The collector is still
    /// closed separately, on every path.
    pub fn fail(&mut self, error: &Error) {
        tracing::error!(error = %error, "conversion failed; closing collector");
    }

    /// Closes the collector. Idempotent.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Some(c) = &mut self.collector {
            if let Err(e) = c.close() {
                tracing::warn!(error = %e, "failed to close collector");
            }
        }
    }

    pub fn collector(&self) -> Option<&C> {
        self.collector.as_ref()
    }

    pub fn into_collector(self) -> Option<C> {
        self.collector
    }
}
