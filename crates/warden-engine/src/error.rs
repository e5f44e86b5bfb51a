//! Error types for the engine binary.

/// Top-level error for the engine binary.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: warden_core::ConfigError,
    },

    /// Snapshot encoding failed.
    #[error("snapshot error: {source}")]
    Snapshot {
        /// The underlying persistence error.
        #[from]
        source: warden_core::PersistError,
    },

    /// Writing the snapshot file failed.
    #[error("failed to write snapshot: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// The tracing subscriber could not be installed.
    #[error("failed to initialize logging: {message}")]
    Logging {
        /// Description of the failure.
        message: String,
    },
}
