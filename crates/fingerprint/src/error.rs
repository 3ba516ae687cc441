use thiserror::Error;

#[derive(Debug, Error)]
pub enum FingerprintError {
    #[error("failed to read input file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid input glob pattern '{pattern}': {source}")]
    Glob {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },
}

pub type Result<T> = std::result::Result<T, FingerprintError>;
