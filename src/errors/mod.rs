//! # Error Handling
//!
//! Error taxonomy for connection secret stores and the details manager.
//!
//! Every error that crosses a component boundary is wrapped with a static
//! [`Context`] naming the step that failed, so a nested failure prints as
//! `"cannot propagate connection: cannot get secret: secret not found: ns/db"`
//! while callers still branch on [`ErrorKind`] rather than on message text.

mod tls;

pub use tls::TlsError;

use std::fmt;

/// Result type for connection secret operations.
pub type Result<T> = std::result::Result<T, ConnectionError>;

/// The step that failed, used as static wrapping context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Context {
    GetSecret,
    ApplySecret,
    DeleteSecret,
    ReadSecret,
    ParseSecret,
    WriteMetadata,
    WriteData,
    GetStoreConfig,
    ParseStoreConfig,
    ParseOwner,
    BuildStore,
    ConnectStore,
    ExtractCredentials,
    BuildClient,
    LoadTls,
    FetchSource,
    WriteDestination,
    PublishConnection,
    UnpublishConnection,
    FetchConnection,
    PropagateConnection,
}

impl Context {
    /// Static message printed in front of the wrapped cause.
    pub const fn message(self) -> &'static str {
        match self {
            Self::GetSecret => "cannot get secret",
            Self::ApplySecret => "cannot apply secret",
            Self::DeleteSecret => "cannot delete secret",
            Self::ReadSecret => "cannot read secret",
            Self::ParseSecret => "cannot parse secret",
            Self::WriteMetadata => "cannot write secret metadata",
            Self::WriteData => "cannot write secret data",
            Self::GetStoreConfig => "cannot get store config",
            Self::ParseStoreConfig => "cannot parse store config",
            Self::ParseOwner => "cannot parse connection secret owner",
            Self::BuildStore => "cannot build store",
            Self::ConnectStore => "cannot connect to secret store",
            Self::ExtractCredentials => "cannot extract credentials",
            Self::BuildClient => "cannot build client",
            Self::LoadTls => "cannot load TLS material",
            Self::FetchSource => "cannot read source connection secret",
            Self::WriteDestination => "cannot write destination connection secret",
            Self::PublishConnection => "cannot publish connection",
            Self::UnpublishConnection => "cannot unpublish connection",
            Self::FetchConnection => "cannot fetch connection",
            Self::PropagateConnection => "cannot propagate connection",
        }
    }
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// Coarse classification callers branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Secret or config absent.
    NotFound,
    /// Ownership or secret type conflict.
    Conflict,
    /// Backend unreachable, rejected credentials, or invalid TLS material.
    Unavailable,
    /// Backend returned a value of an unexpected shape.
    Malformed,
    /// Invalid or incomplete configuration.
    Config,
    /// Anything else.
    Internal,
}

/// Errors that can occur while reading, writing or deleting connection secrets.
#[derive(thiserror::Error, Debug)]
pub enum ConnectionError {
    /// Secret not found in the backend.
    #[error("secret not found: {name}")]
    NotFound { name: String },

    /// A named StoreConfig does not exist.
    #[error("{kind} {name} not found")]
    ConfigNotFound { kind: String, name: String },

    /// The current secret is owned by someone else.
    #[error("secret is not owned by {expected}: current owner is {actual}")]
    NotOwned { expected: String, actual: String },

    /// An unowned secret of a different type already exists.
    #[error("refusing to overwrite unowned secret of type {current} with type {desired}")]
    TypeConflict { current: String, desired: String },

    /// A write or delete option rejected the operation.
    #[error("operation rejected: {reason}")]
    Rejected { reason: String },

    /// The backend answered with an unexpected shape.
    #[error("malformed backend response at {path}: {reason}")]
    MalformedResponse { path: String, reason: String },

    /// The backend could not be reached or answered with a server error.
    #[error("backend unavailable: {message}")]
    Unavailable { message: String },

    /// The backend rejected our credentials.
    #[error("authentication failed: {message}")]
    AuthenticationFailed { message: String },

    /// The backend refused the request for another reason.
    #[error("backend error (status {status}): {message}")]
    Backend { status: u16, message: String },

    /// Invalid or incomplete configuration.
    #[error("configuration error: {message}")]
    Config { message: String },

    /// A value could not be represented in the target backend.
    #[error("invalid value for key {key}: {reason}")]
    InvalidValue { key: String, reason: String },

    /// No builder is registered for the store type.
    #[error("unsupported store type: {0}")]
    UnsupportedStoreType(String),

    #[error(transparent)]
    Tls(#[from] TlsError),

    #[error(transparent)]
    Kube(#[from] kube::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error("plugin call failed: {0}")]
    Grpc(#[from] tonic::Status),

    #[error("plugin transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A cause wrapped with the step that failed.
    #[error("{context}: {source}")]
    Wrapped {
        context: Context,
        #[source]
        source: Box<ConnectionError>,
    },
}

impl ConnectionError {
    pub fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound { name: name.into() }
    }

    pub fn config_not_found(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::ConfigNotFound { kind: kind.into(), name: name.into() }
    }

    pub fn not_owned(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::NotOwned { expected: expected.into(), actual: actual.into() }
    }

    pub fn type_conflict(current: impl Into<String>, desired: impl Into<String>) -> Self {
        Self::TypeConflict { current: current.into(), desired: desired.into() }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected { reason: reason.into() }
    }

    pub fn malformed(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedResponse { path: path.into(), reason: reason.into() }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable { message: message.into() }
    }

    pub fn authentication_failed(message: impl Into<String>) -> Self {
        Self::AuthenticationFailed { message: message.into() }
    }

    pub fn backend(status: u16, message: impl Into<String>) -> Self {
        Self::Backend { status, message: message.into() }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config { message: message.into() }
    }

    pub fn invalid_value(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue { key: key.into(), reason: reason.into() }
    }

    /// Wrap this error with the step that failed.
    pub fn wrap(self, context: Context) -> Self {
        Self::Wrapped { context, source: Box::new(self) }
    }

    /// The innermost error, skipping every context wrapper.
    pub fn root(&self) -> &ConnectionError {
        match self {
            Self::Wrapped { source, .. } => source.root(),
            other => other,
        }
    }

    /// Contexts from outermost to innermost.
    pub fn contexts(&self) -> Vec<Context> {
        let mut out = Vec::new();
        let mut current = self;
        while let Self::Wrapped { context, source } = current {
            out.push(*context);
            current = source;
        }
        out
    }

    pub fn kind(&self) -> ErrorKind {
        match self.root() {
            Self::NotFound { .. } | Self::ConfigNotFound { .. } => ErrorKind::NotFound,
            Self::NotOwned { .. } | Self::TypeConflict { .. } | Self::Rejected { .. } => {
                ErrorKind::Conflict
            }
            Self::MalformedResponse { .. } | Self::Serialization(_) => ErrorKind::Malformed,
            Self::Unavailable { .. }
            | Self::AuthenticationFailed { .. }
            | Self::Tls(_)
            | Self::Transport(_)
            | Self::Http(_) => ErrorKind::Unavailable,
            Self::Config { .. } | Self::UnsupportedStoreType(_) | Self::InvalidValue { .. } => {
                ErrorKind::Config
            }
            Self::Kube(kube::Error::Api(response)) => match response.code {
                404 => ErrorKind::NotFound,
                409 => ErrorKind::Conflict,
                401 | 403 => ErrorKind::Unavailable,
                _ => ErrorKind::Internal,
            },
            Self::Kube(_) => ErrorKind::Unavailable,
            Self::Grpc(status) => match status.code() {
                tonic::Code::NotFound => ErrorKind::NotFound,
                tonic::Code::AlreadyExists
                | tonic::Code::Aborted
                | tonic::Code::FailedPrecondition => ErrorKind::Conflict,
                tonic::Code::Unavailable
                | tonic::Code::Unauthenticated
                | tonic::Code::PermissionDenied
                | tonic::Code::DeadlineExceeded => ErrorKind::Unavailable,
                _ => ErrorKind::Internal,
            },
            Self::Backend { status, .. } if *status == 404 => ErrorKind::NotFound,
            Self::Backend { .. } | Self::Io(_) | Self::Wrapped { .. } => ErrorKind::Internal,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    pub fn is_conflict(&self) -> bool {
        self.kind() == ErrorKind::Conflict
    }
}

/// Attach a static [`Context`] to the error of a fallible call.
pub trait ResultExt<T> {
    fn context(self, context: Context) -> Result<T>;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<ConnectionError>,
{
    fn context(self, context: Context) -> Result<T> {
        self.map_err(|e| e.into().wrap(context))
    }
}

/// Map a not-found error to `Ok(None)`; every other outcome is kept.
pub fn ignore_not_found<T>(result: Result<T>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_constructors() {
        let err = ConnectionError::not_found("ns/db");
        assert!(matches!(err, ConnectionError::NotFound { .. }));
        assert_eq!(err.to_string(), "secret not found: ns/db");

        let err = ConnectionError::not_owned("uid-a", "uid-b");
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let err = ConnectionError::malformed("data.metadata.version", "expected integer");
        assert_eq!(err.kind(), ErrorKind::Malformed);
    }

    #[test]
    fn test_wrapped_display_chains_contexts() {
        let err: Result<()> = Err(ConnectionError::not_found("ns/db"));
        let err = err.context(Context::GetSecret).context(Context::FetchSource).unwrap_err();

        assert_eq!(
            err.to_string(),
            "cannot read source connection secret: cannot get secret: secret not found: ns/db"
        );
        assert_eq!(err.contexts(), vec![Context::FetchSource, Context::GetSecret]);
    }

    #[test]
    fn test_kind_sees_through_wrappers() {
        let err = ConnectionError::not_owned("a", "b").wrap(Context::ApplySecret);
        assert!(err.is_conflict());
        assert!(!err.is_not_found());

        let err = ConnectionError::from(tonic::Status::not_found("gone")).wrap(Context::GetSecret);
        assert!(err.is_not_found());

        let err = ConnectionError::backend(404, "no handler").wrap(Context::ReadSecret);
        assert!(err.is_not_found());
    }

    #[test]
    fn test_ignore_not_found() {
        let missing: Result<u8> = Err(ConnectionError::not_found("x"));
        assert!(ignore_not_found(missing).unwrap().is_none());

        let present: Result<u8> = Ok(7);
        assert_eq!(ignore_not_found(present).unwrap(), Some(7));

        let failed: Result<u8> = Err(ConnectionError::unavailable("down"));
        assert!(ignore_not_found(failed).is_err());
    }

    #[test]
    fn test_context_messages_are_static() {
        assert_eq!(Context::GetSecret.message(), "cannot get secret");
        assert_eq!(Context::ApplySecret.to_string(), "cannot apply secret");
    }
}
