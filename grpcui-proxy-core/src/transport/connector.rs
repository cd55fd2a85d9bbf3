//! # Connectors
//!
//! [`TcpConnector`] is the default [`NetworkConnector`]. [`Connector`] glues a network connector
//! and a set of credentials into the `tower::Service<Uri>` shape that
//! `tonic::transport::Endpoint::connect_with_connector` expects.
use super::{BoxFuture, BoxedIo, NetworkConnector, SharedError, TransportCredentials};
use crate::BoxError;
use http::Uri;
use hyper_util::rt::TokioIo;
use std::{
    sync::Arc,
    task::{Context, Poll},
};
use tokio::net::TcpStream;
use tower::Service;

/// Failure to open a TCP connection.
#[derive(Debug, thiserror::Error)]
#[error("dial tcp {authority}: {source}")]
pub struct TcpDialError {
    pub authority: String,
    #[source]
    pub source: std::io::Error,
}

/// Opens plain TCP connections with `TCP_NODELAY` set.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

impl NetworkConnector for TcpConnector {
    fn connect<'a>(&'a self, authority: &'a str) -> BoxFuture<'a, Result<BoxedIo, SharedError>> {
        Box::pin(async move {
            let to_shared = |source| -> SharedError {
                Arc::new(TcpDialError {
                    authority: authority.to_string(),
                    source,
                })
            };

            let stream = TcpStream::connect(authority).await.map_err(to_shared)?;
            stream.set_nodelay(true).map_err(to_shared)?;

            Ok(Box::new(stream) as BoxedIo)
        })
    }
}

/// A `tower` service turning a target [`Uri`] into a secured byte stream.
#[derive(Clone)]
pub(crate) struct Connector {
    network: Arc<dyn NetworkConnector>,
    credentials: Arc<dyn TransportCredentials>,
}

impl Connector {
    pub(crate) fn new(
        network: Arc<dyn NetworkConnector>,
        credentials: Arc<dyn TransportCredentials>,
    ) -> Self {
        Self {
            network,
            credentials,
        }
    }
}

impl Service<Uri> for Connector {
    type Response = TokioIo<BoxedIo>;
    type Error = BoxError;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, uri: Uri) -> Self::Future {
        let network = Arc::clone(&self.network);
        let credentials = Arc::clone(&self.credentials);

        Box::pin(async move {
            let authority = uri
                .authority()
                .map(|authority| authority.as_str().to_string())
                .ok_or_else(|| BoxError::from(format!("missing authority in uri '{uri}'")))?;

            let io = network.connect(&authority).await?;
            let io = credentials.client_handshake(&authority, io).await?;

            Ok(TokioIo::new(io))
        })
    }
}
