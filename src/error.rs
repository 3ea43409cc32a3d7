use crate::sequence::syntax::Span;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the command line and configuration layer.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to read {what}: {source}")]
    Io {
        what: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {what}: {source}")]
    Write {
        what: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize layout: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to initialize text measurement: {0}")]
    Measure(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(String),

    #[error("Failed to parse config as TOML ({toml}) or YAML ({yaml})")]
    Parse { toml: String, yaml: String },

    #[error("Invalid config value for `{field}`: {message}")]
    Invalid { field: &'static str, message: String },
}

/// A single statement that could not be interpreted.
///
/// These never abort a document; the transformer turns them into error nodes.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TransformError {
    #[error("cannot determine receiver of `{signature}`")]
    MissingReceiver { signature: String },

    #[error("message has no method name")]
    MissingMethod,

    #[error("creation has no constructor")]
    MissingConstructor,

    #[error("async message has no receiver")]
    MissingAsyncTarget,

    #[error("unrecognized statement")]
    Unrecognized,
}

/// Geometry failures are fatal to one element only.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LayoutError {
    #[error("participant `{0}` is not in the coordinate table")]
    UnknownParticipant(String),

    #[error("{kind} fragment at {line}:{column} references no participants")]
    EmptyFragment {
        kind: String,
        line: usize,
        column: usize,
    },
}

impl LayoutError {
    pub fn empty_fragment(kind: impl Into<String>, span: Span) -> Self {
        LayoutError::EmptyFragment {
            kind: kind.into(),
            line: span.line,
            column: span.column,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_and_write_failures_name_the_operation() {
        let io = || std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let read = Error::Io {
            what: "in.zen".to_string(),
            source: io(),
        };
        let write = Error::Write {
            what: "out.json".to_string(),
            source: io(),
        };
        assert_eq!(read.to_string(), "Failed to read in.zen: denied");
        assert_eq!(write.to_string(), "Failed to write out.json: denied");
    }
}
