//! Error types for cloudmount

use thiserror::Error;

/// Main error type for cloudmount operations
#[derive(Error, Debug)]
pub enum CloudError {
    /// A required argument was empty or otherwise unusable
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A provider with the same (case-insensitive) name is already attached
    #[error("Provider already exists: {0}")]
    DuplicateProvider(String),

    /// No provider with the given name is attached
    #[error("Provider not found: {0}")]
    ProviderNotFound(String),

    /// Decryption failed (wrong key, tampered data, or malformed input)
    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    /// Name blob carries a format version we do not understand
    #[error("Name format version {0} is not supported")]
    NameVersionUnsupported(u8),

    /// Decrypted name payload is not valid UTF-16LE text
    #[error("Malformed name encoding: {0}")]
    MalformedName(String),

    /// A peer or provider endpoint could not be built
    #[error("Endpoint construction failed: {0}")]
    EndpointConstruction(String),

    /// Path does not exist on the endpoint
    #[error("Not found: {0}")]
    NotFound(String),

    /// Expected a file but found a directory
    #[error("Is a directory: {0}")]
    IsDirectory(String),

    /// Expected a directory but found a file
    #[error("Not a directory: {0}")]
    NotDirectory(String),

    /// Operation not supported by this endpoint
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// Error during serialization/deserialization
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration is missing or inconsistent
    #[error("Configuration error: {0}")]
    Config(String),

    /// General I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using CloudError
pub type CloudResult<T> = Result<T, CloudError>;
