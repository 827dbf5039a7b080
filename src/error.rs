use thiserror::Error;

/// Errors that stop a curation stage.
///
/// Per-entry problems (bad base64, bad JSON, dead or unreachable nodes) never
/// surface here; they are counted and logged where they occur.
#[derive(Error, Debug)]
pub enum CuratorError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("YAML error in {path}: {source}")]
    Yaml {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("No 'proxies' key found in {0}")]
    MissingProxies(String),

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid subscription URL: {0}")]
    InvalidUrl(String),
}

pub type Result<T> = std::result::Result<T, CuratorError>;

impl CuratorError {
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        CuratorError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn yaml(path: impl Into<String>, source: serde_yaml::Error) -> Self {
        CuratorError::Yaml {
            path: path.into(),
            source,
        }
    }
}
