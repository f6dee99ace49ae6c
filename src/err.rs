use std::process::{ExitCode, Termination};

/// Errors that map to a dedicated process exit code.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AppError {
    #[error("no valid HPO terms in query")]
    NoValidQueryTerms,
}

impl AppError {
    /// Process exit code to use for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            AppError::NoValidQueryTerms => 2,
        }
    }
}

impl Termination for AppError {
    fn report(self) -> ExitCode {
        ExitCode::from(self.exit_code())
    }
}

/// Errors raised while scoring genes for a query.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ScoreError {
    /// None of the query terms is part of the embedding vocabulary.
    #[error("no valid HPO terms in query")]
    NoValidQueryTerms,
    /// A graph node has no embedding vector.
    #[error("no embedding vector for graph node {0}")]
    MissingEmbedding(String),
}

impl From<ScoreError> for Option<AppError> {
    fn from(val: ScoreError) -> Self {
        match val {
            ScoreError::NoValidQueryTerms => Some(AppError::NoValidQueryTerms),
            ScoreError::MissingEmbedding(_) => None,
        }
    }
}

/// Errors in the configuration of the evaluation harness.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("must give only one of fraction of links or path to validation links")]
    SplitModeConflict,
    #[error("must give either fraction of links or path to validation links")]
    SplitModeMissing,
    #[error("fraction must be in (0, 1] but was {0}")]
    InvalidFraction(f64),
}
