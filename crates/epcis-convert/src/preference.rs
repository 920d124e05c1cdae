//! Identifier format preferences derived from GS1 request headers.
//!
//! The translation itself is injected as a mapper; this module only decides
//! whether one should run and how strictly 1.2 output is interpreted.

use std::fmt;

/// How EPC and CBV identifiers should be rendered in the output.
/// `NoPreference` and `NeverTranslates` both leave identifiers untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FormatPreference {
    #[default]
    NoPreference,
    AlwaysDigitalLink,
    AlwaysUrn,
    AlwaysWebUri,
    NeverTranslates,
}

impl FormatPreference {
    /// Parses a header value, tolerant of case and `-`/`_` separators.
    pub fn parse(value: &str) -> Option<FormatPreference> {
        let normalized: String = value
            .trim()
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .collect::<String>()
            .to_ascii_lowercase();
        Some(match normalized.as_str() {
            "nopreference" => FormatPreference::NoPreference,
            "alwaysdigitallink" | "alwaysgs1digitallink" => FormatPreference::AlwaysDigitalLink,
            "alwaysurn" | "alwaysepcurn" => FormatPreference::AlwaysUrn,
            "alwaysweburi" => FormatPreference::AlwaysWebUri,
            "nevertranslates" => FormatPreference::NeverTranslates,
            _ => return None,
        })
    }

    /// Whether this preference asks for identifier translation at all.
    pub fn translates(&self) -> bool {
        matches!(
            self,
            FormatPreference::AlwaysDigitalLink
                | FormatPreference::AlwaysUrn
                | FormatPreference::AlwaysWebUri
        )
    }
}

impl fmt::Display for FormatPreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FormatPreference::NoPreference => "No_Preference",
            FormatPreference::AlwaysDigitalLink => "Always_Digital_Link",
            FormatPreference::AlwaysUrn => "Always_URN",
            FormatPreference::AlwaysWebUri => "Always_Web_URI",
            FormatPreference::NeverTranslates => "Never_Translates",
        })
    }
}

pub const EPC_FORMAT_HEADER: &str = "GS1-EPC-Format";
pub const CBV_FORMAT_HEADER: &str = "GS1-CBV-XML-Format";
pub const COMPLIANT_1_2_HEADER: &str = "GS1-EPCIS-1.2-Compliant";

/// The preferences one request carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestPreferences {
    pub epc_format: FormatPreference,
    pub cbv_format: FormatPreference,
    /// Whether 1.2 output must stay strictly within the 1.2 schema.
    pub strict12: bool,
}

impl Default for RequestPreferences {
    fn default() -> RequestPreferences {
        RequestPreferences {
            epc_format: FormatPreference::NoPreference,
            cbv_format: FormatPreference::NoPreference,
            strict12: true,
        }
    }
}

impl RequestPreferences {
    /// Derives preferences from a header lookup. Unknown values are logged
    /// and fall back to the defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> RequestPreferences {
        RequestPreferences {
            epc_format: header_preference(&lookup, EPC_FORMAT_HEADER),
            cbv_format: header_preference(&lookup, CBV_FORMAT_HEADER),
            strict12: match lookup(COMPLIANT_1_2_HEADER) {
                Some(value) => match value.trim().to_ascii_lowercase().as_str() {
                    "true" | "yes" => true,
                    "false" | "no" => false,
                    other => {
                        tracing::warn!(header = COMPLIANT_1_2_HEADER, value = other, "unrecognised header value; assuming strict 1.2");
                        true
                    }
                },
                None => true,
            },
        }
    }

    /// Whether any identifier translation should run for this request.
    pub fn translates(&self) -> bool {
        self.epc_format.translates() || self.cbv_format.translates()
    }
}

fn header_preference(lookup: &impl Fn(&str) -> Option<String>, header: &str) -> FormatPreference {
    match lookup(header) {
        Some(value) => FormatPreference::parse(&value).unwrap_or_else(|| {
            tracing::warn!(header, value = %value, "unrecognised format preference; ignoring");
            FormatPreference::NoPreference
        }),
        None => FormatPreference::NoPreference,
    }
}
