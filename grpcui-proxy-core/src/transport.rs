//! # Transport Primitives
//!
//! The building blocks the dialer plugs into `tonic`:
//!
//! * A [`NetworkConnector`] opens the raw byte stream to an authority (`host:port`).
//! * A [`TransportCredentials`] implementation negotiates transport security on top of it.
//! * The [`tracking`] wrappers remember the last failure each of them observed, so the dialer
//!   can report the most specific cause once `tonic` gives up with a generic error.
//!
//! Both traits return [`SharedError`] on failure. Errors are reference counted so a tracking
//! wrapper can keep a copy while handing the very same error back to its caller.
pub mod connector;
pub mod credentials;
pub mod tracking;

pub use connector::TcpConnector;
pub use credentials::{InsecureCredentials, TlsConfigError, TlsCredentials};
pub use futures_util::future::BoxFuture;
pub use tracking::{ErrorSlot, TrackingConnector, TrackingCredentials};

use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};

/// A cloneable, thread-safe error as recorded by the tracking wrappers.
pub type SharedError = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// A bidirectional byte stream usable as a gRPC transport.
pub trait Io: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> Io for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

pub type BoxedIo = Box<dyn Io>;

/// Opens raw connections to a network authority.
pub trait NetworkConnector: Send + Sync + 'static {
    fn connect<'a>(&'a self, authority: &'a str) -> BoxFuture<'a, Result<BoxedIo, SharedError>>;
}

/// Negotiates transport security over an already established connection.
pub trait TransportCredentials: Send + Sync + 'static {
    /// Performs the client side of the handshake and returns the secured stream.
    ///
    /// `authority` is the `host:port` the stream was opened against.
    fn client_handshake<'a>(
        &'a self,
        authority: &'a str,
        io: BoxedIo,
    ) -> BoxFuture<'a, Result<BoxedIo, SharedError>>;
}
