/// Top-level CHAI error type.
///
/// All fallible operations in `chai-core` return [`Result<T, ChaiError>`](Result).
/// Each variant wraps a domain-specific error enum, so callers can match on
/// the stage that failed without losing type information.
#[derive(thiserror::Error, Debug)]
pub enum ChaiError {
    /// A registry record could not be normalized.
    #[error("Normalize error: {0}")]
    Normalize(#[from] chai_registries::NormalizeError),

    /// Error while diffing a batch against the catalog snapshot.
    #[error("Diff error: {0}")]
    Diff(#[from] DiffError),

    /// Error during TeaRank computation.
    #[error("Rank error: {0}")]
    Rank(#[from] RankError),

    /// Error from the catalog store collaborator.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Error in configuration parsing or validation.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Errors raised by the diff engine.
#[derive(thiserror::Error, Debug)]
pub enum DiffError {
    /// One `import_id` maps to two structurally different records. Fatal for
    /// the offending record only.
    #[error("Identity conflict for {import_id}: {reason}")]
    IdentityConflict {
        import_id: String,
        reason: String,
    },

    /// The batch handed to the engine was empty.
    #[error("Empty batch: nothing to diff")]
    EmptyBatch,
}

/// Errors from the rank engine.
#[derive(thiserror::Error, Debug)]
pub enum RankError {
    /// A score became NaN or infinite.
    #[error("Non-finite score after iteration {iteration}")]
    NonFinite { iteration: u32 },

    /// The blocking rank task panicked or was cancelled by the runtime.
    #[error("Rank task aborted: {0}")]
    Aborted(String),
}

/// Errors from a [`CatalogStore`](crate::store::CatalogStore).
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    /// A row references a package or URL that does not exist.
    #[error("Dangling reference: {0}")]
    DanglingReference(String),

    /// An insert collides with an existing identity key.
    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    /// An update or delete targets a row that does not exist.
    #[error("Row not found: {0}")]
    NotFound(String),
}

/// Errors in configuration parsing and validation.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// The configuration file does not exist at the expected path.
    #[error("Config file not found: {0}")]
    NotFound(String),

    /// Configuration values are present but semantically invalid.
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// Configuration file syntax could not be parsed (TOML error).
    #[error("Parse error: {0}")]
    Parse(String),
}

/// Convenience alias for `Result<T, ChaiError>`.
pub type Result<T> = std::result::Result<T, ChaiError>;
