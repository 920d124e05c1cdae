use std::io;

/// Result type alias used across the conversion pipeline.
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy of the converter. Validation findings are deliberately
/// absent: they are advisory and only ever logged.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The input bytes are not a recognisable EPCIS document.
    #[error("unrecognisable input format: {0}")]
    Format(String),

    /// A failure while unmarshalling, marshalling or rewriting events.
    #[error("failed to convert document: {0}")]
    Conversion(#[from] ConversionError),

    /// Invalid setup: no context handler matches, an embedded resource is
    /// missing or broken, or the requested conversion target cannot exist.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The underlying stream failed.
    #[error("stream failure: {0}")]
    Io(#[from] io::Error),
}

/// The causes a conversion failure can carry.
#[derive(Debug, thiserror::Error)]
pub enum ConversionError {
    #[error("{0}")]
    Message(String),

    #[error(transparent)]
    Codec(#[from] epcis_model::ModelError),

    #[error(transparent)]
    Xml(#[from] quick_xml::Error),

    #[error(transparent)]
    Attr(#[from] quick_xml::events::attributes::AttrError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// A non-conversion error surfaced inside a conversion leg; the cause
    /// is preserved for the caller.
    #[error(transparent)]
    Source(Box<Error>),
}

impl Error {
    pub fn conversion(message: impl Into<String>) -> Error {
        Error::Conversion(ConversionError::Message(message.into()))
    }

    /// Reclassifies this error as a conversion failure, keeping the
    /// original cause in the chain. Conversion legs wrap every failure this
    /// way before surfacing it.
    pub fn into_conversion(self) -> Error {
        match self {
            Error::Conversion(_) => self,
            other => Error::Conversion(ConversionError::Source(Box::new(other))),
        }
    }
}

impl From<epcis_model::ModelError> for Error {
    fn from(err: epcis_model::ModelError) -> Error {
        Error::Conversion(err.into())
    }
}

impl From<quick_xml::Error> for Error {
    fn from(err: quick_xml::Error) -> Error {
        Error::Conversion(err.into())
    }
}

impl From<quick_xml::events::attributes::AttrError> for Error {
    fn from(err: quick_xml::events::attributes::AttrError) -> Error {
        Error::Conversion(err.into())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Error {
        Error::Conversion(err.into())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn conversion_wrapping_preserves_the_cause() {
        let io_err = Error::Io(io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed"));
        let wrapped = io_err.into_conversion();
        assert!(matches!(wrapped, Error::Conversion(_)));
        assert!(wrapped.to_string().contains("pipe closed"));

        let already = Error::conversion("bad event").into_conversion();
        assert_eq!("failed to convert document: bad event", already.to_string());
    }
}
