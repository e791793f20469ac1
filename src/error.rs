use std::path::PathBuf;

use thiserror::Error;

use crate::config::StageName;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("request to {url} failed")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} answered with status {status}")]
    Status { url: String, status: u16 },

    #[error("structure not found: {0}")]
    Structural(String),

    #[error("ambiguous schema: {0}")]
    SchemaAmbiguity(String),

    #[error("i/o on {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed JSON in {}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("CSV export to {}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("could not load settings")]
    Settings(#[from] config::ConfigError),

    #[error("waiting for operator acknowledgment")]
    Acknowledge(#[source] std::io::Error),

    #[error("stage `{stage}` failed")]
    Stage {
        stage: StageName,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    /// Stage that aborted the run, if this error came out of the pipeline.
    pub fn failed_stage(&self) -> Option<StageName> {
        match self {
            Error::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}
