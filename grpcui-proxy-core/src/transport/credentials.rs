//! # Transport Credentials
//!
//! * [`InsecureCredentials`]: plaintext HTTP/2 (h2c). The default when the operator did not
//!   configure anything, since targets are chosen by the operator and trusted.
//! * [`TlsCredentials`]: TLS through `rustls`, advertising `h2` over ALPN.
use super::{BoxFuture, BoxedIo, SharedError, TransportCredentials};
use rustls::{
    ClientConfig, RootCertStore,
    pki_types::{InvalidDnsNameError, ServerName},
};
use std::sync::Arc;
use tokio_rustls::TlsConnector;

/// Leaves the stream untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct InsecureCredentials;

impl TransportCredentials for InsecureCredentials {
    fn client_handshake<'a>(
        &'a self,
        _authority: &'a str,
        io: BoxedIo,
    ) -> BoxFuture<'a, Result<BoxedIo, SharedError>> {
        Box::pin(async move { Ok(io) })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TlsConfigError {
    #[error("Failed to read PEM certificates: '{0}'")]
    InvalidPem(#[source] std::io::Error),
    #[error("No certificates found in the provided PEM bundle")]
    NoCertificates,
    #[error("Invalid root certificate: '{0}'")]
    InvalidCertificate(#[source] rustls::Error),
    #[error("Unsupported TLS configuration: '{0}'")]
    Config(#[source] rustls::Error),
    #[error("Invalid server name '{name}': '{source}'")]
    InvalidServerName {
        name: String,
        source: InvalidDnsNameError,
    },
}

/// A failed TLS handshake.
#[derive(Debug, thiserror::Error)]
pub enum TlsHandshakeError {
    #[error("tls: invalid server name '{name}': {source}")]
    InvalidServerName {
        name: String,
        source: InvalidDnsNameError,
    },
    #[error("tls: handshake with {authority} failed: {source}")]
    Handshake {
        authority: String,
        source: std::io::Error,
    },
}

/// TLS client credentials backed by `rustls` with the `ring` provider.
#[derive(Clone)]
pub struct TlsCredentials {
    connector: TlsConnector,
    server_name: Option<ServerName<'static>>,
}

impl std::fmt::Debug for TlsCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsCredentials")
            .field("server_name", &self.server_name)
            .finish_non_exhaustive()
    }
}

impl TlsCredentials {
    /// Builds credentials trusting the given root certificates.
    pub fn new(roots: RootCertStore) -> Result<Self, TlsConfigError> {
        let provider = Arc::new(rustls::crypto::ring::default_provider());

        let mut config = ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .map_err(TlsConfigError::Config)?
            .with_root_certificates(roots)
            .with_no_client_auth();

        config.alpn_protocols = vec![b"h2".to_vec()];

        Ok(Self {
            connector: TlsConnector::from(Arc::new(config)),
            server_name: None,
        })
    }

    /// Builds credentials trusting every certificate found in a PEM bundle.
    pub fn from_pem(pem: &[u8]) -> Result<Self, TlsConfigError> {
        let mut reader = pem;
        let mut roots = RootCertStore::empty();

        for cert in rustls_pemfile::certs(&mut reader) {
            let cert = cert.map_err(TlsConfigError::InvalidPem)?;
            roots
                .add(cert)
                .map_err(TlsConfigError::InvalidCertificate)?;
        }

        if roots.is_empty() {
            return Err(TlsConfigError::NoCertificates);
        }

        Self::new(roots)
    }

    /// Overrides the name used for SNI and certificate verification.
    ///
    /// By default the host part of the dialed authority is used.
    pub fn with_server_name(mut self, name: &str) -> Result<Self, TlsConfigError> {
        let server_name = ServerName::try_from(name.to_string()).map_err(|source| {
            TlsConfigError::InvalidServerName {
                name: name.to_string(),
                source,
            }
        })?;

        self.server_name = Some(server_name);
        Ok(self)
    }

    fn server_name_for(&self, authority: &str) -> Result<ServerName<'static>, TlsHandshakeError> {
        if let Some(name) = &self.server_name {
            return Ok(name.clone());
        }

        let host = host_of(authority);
        ServerName::try_from(host.to_string()).map_err(|source| {
            TlsHandshakeError::InvalidServerName {
                name: host.to_string(),
                source,
            }
        })
    }
}

impl TransportCredentials for TlsCredentials {
    fn client_handshake<'a>(
        &'a self,
        authority: &'a str,
        io: BoxedIo,
    ) -> BoxFuture<'a, Result<BoxedIo, SharedError>> {
        Box::pin(async move {
            let server_name = self
                .server_name_for(authority)
                .map_err(|err| Arc::new(err) as SharedError)?;

            let stream = self
                .connector
                .connect(server_name, io)
                .await
                .map_err(|source| {
                    Arc::new(TlsHandshakeError::Handshake {
                        authority: authority.to_string(),
                        source,
                    }) as SharedError
                })?;

            Ok(Box::new(stream) as BoxedIo)
        })
    }
}

/// Strips the port (and IPv6 brackets) from an authority.
fn host_of(authority: &str) -> &str {
    if let Some(rest) = authority.strip_prefix('[') {
        return rest.split_once(']').map_or(rest, |(host, _)| host);
    }

    authority
        .rsplit_once(':')
        .map_or(authority, |(host, _)| host)
}
