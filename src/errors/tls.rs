use std::path::PathBuf;

use thiserror::Error;

/// TLS-specific error variants surfaced while loading plugin client material.
#[derive(Debug, Error)]
pub enum TlsError {
    /// The TLS directory itself is missing or not a directory.
    #[error("TLS directory {path} does not exist or is not a directory")]
    MissingDirectory { path: PathBuf },

    /// The CA bundle could not be read.
    #[error("Failed to read CA bundle at {path}: {source}")]
    CaReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The client certificate could not be read.
    #[error("Failed to read certificate at {path}: {source}")]
    CertificateReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The client private key could not be read.
    #[error("Failed to read private key at {path}: {source}")]
    PrivateKeyReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A file was read but does not hold a PEM block.
    #[error("File {path} is not a valid PEM document")]
    InvalidPem { path: PathBuf },
}
