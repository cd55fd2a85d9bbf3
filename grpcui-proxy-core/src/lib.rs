//! # grpcui-proxy Core
//!
//! `grpcui-proxy-core` connects to an arbitrary gRPC server and discovers, through server
//! reflection, which methods it offers. The result is a [`Session`]: a live channel plus the
//! descriptors a presentation layer needs to render forms and invoke methods dynamically.
//!
//! ## Key Components
//!
//! * **[`Dialer`]:** Establishes the channel. Resilient dials are retried until a deadline and
//!   report the most specific failure observed (TLS handshake, then network, then deadline).
//! * **[`ReflectionClient`]:** A gRPC Reflection client speaking both `grpc.reflection.v1` and
//!   the legacy `grpc.reflection.v1alpha`.
//! * **[`DescriptorSource`]:** Where schemas come from: a live server ([`ReflectionSource`]) or
//!   a local descriptor pool ([`PoolSource`]).
//! * **[`select_methods`]:** Applies an [`InclusionPolicy`] to the advertised services.
//! * **[`Session`]:** Ties all of the above together.
//!
//! ## Transport
//!
//! The [`transport`] module holds the pluggable pieces the dialer is built from: network
//! connectors, transport credentials (plaintext or rustls based TLS) and the tracking wrappers
//! that record the last failure of each.
//!
//! ## Re-exports
//!
//! This crate re-exports `prost`, `prost-reflect`, and `tonic` to ensure that consumers
//! use compatible versions of these underlying dependencies.
pub mod dial;
pub mod reflection;
pub mod select;
pub mod session;
pub mod source;
pub mod transport;

pub use dial::{DialError, DialOptions, Dialer, dial};
pub use reflection::{ReflectionClient, ReflectionProtocol, ReflectionResolveError};
pub use select::{InclusionPolicy, SelectError, ServiceRule, select_methods};
pub use session::{ErrorKind, Introspection, Session, SessionError, SessionOptions, introspect};
pub use source::{Descriptor, DescriptorSource, PoolSource, ReflectionSource, SourceError};

// Re-exports
pub use prost;
pub use prost_reflect;
pub use tonic;

/// Type alias for the standard boxed error used in generic bounds.
type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;
