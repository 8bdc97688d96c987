use std::path::Path;

use tonic::transport::{Certificate, ClientTlsConfig, Identity};
use tracing::debug;

use crate::errors::TlsError;

/// CA bundle file name inside a TLS directory.
pub const CA_FILE: &str = "ca.crt";
/// Client certificate file name inside a TLS directory.
pub const CERT_FILE: &str = "tls.crt";
/// Client private key file name inside a TLS directory.
pub const KEY_FILE: &str = "tls.key";

/// Client TLS material for plugin connections, read from a directory holding
/// `ca.crt`, `tls.crt` and `tls.key`.
#[derive(Clone)]
pub struct ClientTlsMaterial {
    pub ca: Vec<u8>,
    pub cert: Vec<u8>,
    pub key: Vec<u8>,
}

impl std::fmt::Debug for ClientTlsMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientTlsMaterial")
            .field("ca_bytes", &self.ca.len())
            .field("cert_bytes", &self.cert.len())
            .field("key", &"[REDACTED]")
            .finish()
    }
}

impl ClientTlsMaterial {
    /// Read all three files. Any missing or non-PEM file is an error.
    pub fn from_dir(dir: &Path) -> Result<Self, TlsError> {
        if !dir.is_dir() {
            return Err(TlsError::MissingDirectory { path: dir.to_path_buf() });
        }

        let ca_path = dir.join(CA_FILE);
        let ca = std::fs::read(&ca_path)
            .map_err(|source| TlsError::CaReadError { path: ca_path.clone(), source })?;
        ensure_pem(&ca, &ca_path)?;

        let cert_path = dir.join(CERT_FILE);
        let cert = std::fs::read(&cert_path)
            .map_err(|source| TlsError::CertificateReadError { path: cert_path.clone(), source })?;
        ensure_pem(&cert, &cert_path)?;

        let key_path = dir.join(KEY_FILE);
        let key = std::fs::read(&key_path)
            .map_err(|source| TlsError::PrivateKeyReadError { path: key_path.clone(), source })?;
        ensure_pem(&key, &key_path)?;

        debug!(dir = %dir.display(), "Loaded client TLS material");
        Ok(Self { ca, cert, key })
    }

    /// tonic client configuration presenting the client identity and trusting the CA.
    pub fn into_client_config(self) -> ClientTlsConfig {
        ClientTlsConfig::new()
            .ca_certificate(Certificate::from_pem(self.ca))
            .identity(Identity::from_pem(self.cert, self.key))
    }
}

/// Load a directory of client TLS material into a tonic [`ClientTlsConfig`].
pub fn load_client_tls(dir: impl AsRef<Path>) -> Result<ClientTlsConfig, TlsError> {
    ClientTlsMaterial::from_dir(dir.as_ref()).map(ClientTlsMaterial::into_client_config)
}

fn ensure_pem(bytes: &[u8], path: &Path) -> Result<(), TlsError> {
    let looks_like_pem = std::str::from_utf8(bytes).is_ok_and(|text| text.contains("-----BEGIN "));
    if looks_like_pem {
        Ok(())
    } else {
        Err(TlsError::InvalidPem { path: path.to_path_buf() })
    }
}
