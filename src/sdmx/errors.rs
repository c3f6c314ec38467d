//! Error types for the SDMX registry client.
//!
//! Every fetch, resolve and decode step returns one of these as a tagged
//! result so the crawler can match on the kind of failure instead of
//! unwinding.

use crate::sdmx::models::{ObjectClass, Package, StatusMessage};

#[derive(Debug, thiserror::Error)]
pub enum SdmxError {
    /// Network failure, timeout, or a non-2xx response without a decodable body.
    #[error("Request to {url} failed{}", status.map(|s| format!(" with status {s}")).unwrap_or_default())]
    Transport {
        url: String,
        status: Option<u16>,
        #[source]
        source: anyhow::Error,
    },
    #[error("Failed to decode structure message")]
    Decode(#[from] DecodeError),
    /// The registry answered with its own error envelope.
    #[error("{}", join_messages(messages))]
    Registry { messages: Vec<StatusMessage> },
    #[error(transparent)]
    Resolution(#[from] ResolutionError),
    #[error("No {0} found")]
    MissingData(&'static str),
    #[error("Category {category} appears more than once in scheme {scheme}")]
    MalformedHierarchy { scheme: String, category: String },
}

impl SdmxError {
    /// Short, stable label for the variant, used in logs and crawl reports.
    pub fn kind(&self) -> &'static str {
        match self {
            SdmxError::Transport { .. } => "transport",
            SdmxError::Decode(_) => "decode",
            SdmxError::Registry { .. } => "registry",
            SdmxError::Resolution(_) => "resolution",
            SdmxError::MissingData(_) => "missing_data",
            SdmxError::MalformedHierarchy { .. } => "malformed_hierarchy",
        }
    }

    /// Resolution failures for package/class pairs with no retrieval mapping
    /// are expected and are skipped rather than counted as failures.
    pub fn is_unsupported(&self) -> bool {
        matches!(
            self,
            SdmxError::Resolution(ResolutionError::Unsupported { .. })
        )
    }
}

fn join_messages(messages: &[StatusMessage]) -> String {
    messages
        .iter()
        .map(|m| format!("{}: {}", m.code, m.texts.join(",")))
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Debug, thiserror::Error)]
pub enum ResolutionError {
    #[error("Cannot find a REST endpoint for {class} in package {package} (id {id})")]
    Unsupported {
        package: Package,
        class: ObjectClass,
        id: String,
    },
    #[error("Reference {id} ({class}) has no maintainable parent id")]
    MissingParent { class: ObjectClass, id: String },
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Malformed XML at byte {position}: {source}")]
    Xml {
        position: u64,
        #[source]
        source: quick_xml::Error,
    },
    #[error("Invalid attribute: {0}")]
    Attribute(#[from] quick_xml::events::attributes::AttrError),
    #[error("Unrecognised message root element <{0}>")]
    UnknownRoot(String),
    #[error("Empty document")]
    Empty,
    #[error("Document ended inside <{0}>")]
    Unclosed(String),
    #[error("Missing required attribute {attribute} on <{element}>")]
    MissingAttribute {
        element: String,
        attribute: &'static str,
    },
    #[error("Invalid value {value:?} for {attribute} on <{element}>")]
    InvalidValue {
        element: String,
        attribute: &'static str,
        value: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_error_joins_code_and_texts() {
        let err = SdmxError::Registry {
            messages: vec![
                StatusMessage {
                    code: "100".into(),
                    texts: vec!["No results".into(), "for query".into()],
                },
                StatusMessage {
                    code: "500".into(),
                    texts: vec!["Internal".into()],
                },
            ],
        };
        assert_eq!(err.to_string(), "100: No results,for query\n500: Internal");
        assert_eq!(err.kind(), "registry");
    }

    #[test]
    fn test_transport_display_includes_status() {
        let err = SdmxError::Transport {
            url: "https://example.org/dataflow".into(),
            status: Some(503),
            source: anyhow::anyhow!("boom"),
        };
        assert_eq!(
            err.to_string(),
            "Request to https://example.org/dataflow failed with status 503"
        );
    }

    #[test]
    fn test_unsupported_resolution_is_flagged() {
        let err = SdmxError::from(ResolutionError::Unsupported {
            package: Package::Registry,
            class: ObjectClass::ContentConstraint,
            id: "CC".into(),
        });
        assert!(err.is_unsupported());
        assert_eq!(err.kind(), "resolution");

        let missing = SdmxError::from(ResolutionError::MissingParent {
            class: ObjectClass::Concept,
            id: "FREQ".into(),
        });
        assert!(!missing.is_unsupported());
    }
}
