//! Bounded sniff of the input's syntax and schema version.

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::{Error, Result};
use crate::input::Input;
use crate::transform::{DocFormat, Representation, SchemaVersion};

/// How far into the document the sniff is allowed to look.
pub const PRESCAN_LIMIT: usize = 4096;

lazy_static! {
    static ref XML_VERSION: Regex =
        Regex::new(r#"schemaVersion\s*=\s*["']([^"']*)["']"#).unwrap();
    static ref JSON_VERSION: Regex = Regex::new(r#""schemaVersion"\s*:\s*"([^"]*)""#).unwrap();
}

/// What the sniff found. `version` is empty when the document does not
/// declare one within the prescan window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detected {
    pub format: DocFormat,
    pub version: String,
}

impl Detected {
    /// Maps the sniffed values onto a conversion grid cell. An undeclared
    /// XML version is taken as 2.0; a JSON document claiming 1.2 is a
    /// configuration error because JSON-LD exists only from 2.0 onward.
    pub fn representation(&self) -> Result<Representation> {
        let version = match self.version.as_str() {
            "1.2" => SchemaVersion::V1_2,
            _ => SchemaVersion::V2_0,
        };
        Representation::new(self.format, version)
    }
}

/// Detects the input's format and declared schema version from its first
/// [`PRESCAN_LIMIT`] bytes. The input is rewound to byte zero on every
/// exit path.
pub fn prescan(input: &mut Input) -> Result<Detected> {
    let bytes = input.peek(PRESCAN_LIMIT)?;
    let first = bytes.iter().copied().find(|b| !b.is_ascii_whitespace());
    let format = match first {
        Some(b'<') => DocFormat::Xml,
        Some(b'{') => DocFormat::Json,
        Some(_) => {
            return Err(Error::Format(
                "input starts with neither '<' nor '{'".to_string(),
            ))
        }
        None => return Err(Error::Format("input is empty".to_string())),
    };
    let head = String::from_utf8_lossy(&bytes);
    let pattern: &Regex = match format {
        DocFormat::Xml => &XML_VERSION,
        DocFormat::Json => &JSON_VERSION,
    };
    let version = pattern
        .captures(&head)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_default();
    tracing::debug!(format = %format, version = %version, "prescanned input");
    Ok(Detected { format, version })
}
