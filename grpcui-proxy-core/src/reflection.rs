//! # Server Reflection
//!
//! This module contains the logic necessary to interact with the gRPC Server Reflection Protocol.
//!
//! It enables the proxy to query a server for its own Protobuf schema at runtime, so any
//! endpoint can be introspected without pre-compiled descriptors. Both the current
//! (`grpc.reflection.v1`) and the legacy (`grpc.reflection.v1alpha`) protocols are supported.
pub mod client;

pub use client::{ReflectionClient, ReflectionProtocol, ReflectionResolveError};

/// Names of the reflection services themselves.
///
/// They are infrastructure and never exposed as invokable targets.
pub const REFLECTION_SERVICES: [&str; 2] = [
    ReflectionProtocol::V1Alpha.service_name(),
    ReflectionProtocol::V1.service_name(),
];
