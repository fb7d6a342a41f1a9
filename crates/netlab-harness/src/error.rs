use std::path::PathBuf;
use thiserror::Error;

use netlab_abstract::{ConfigError, EngineError};

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("simulation engine error: {0}")]
    Engine(#[from] EngineError),
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize {what}: {source}")]
    Serialize {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("no classifier entry matches the summary flow ({0})")]
    FlowNotFound(String),
}
