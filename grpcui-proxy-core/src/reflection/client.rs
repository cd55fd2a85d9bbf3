//! # Reflection Client
//!
//! A client implementation for `grpc.reflection.v1`, falling back to `grpc.reflection.v1alpha`
//! for servers that only implement the legacy protocol.
//!
//! This client is responsible for building a complete `FileDescriptorSet` by querying
//! a server that supports reflection. It handles the complexity of dependency management by inspecting
//! imports and recursively fetching missing files until the entire schema tree for a
//! requested symbol is resolved.
//!
//! Both protocol versions share the exact same wire format, only the RPC path differs, so a
//! single set of message types is used and the path is picked at call time.
//!
//! ## References
//!
//! * [gRPC Server Reflection Protocol](https://github.com/grpc/grpc/blob/master/doc/server-reflection.md)
use crate::BoxError;
use futures_util::{Stream, stream::once};
use http::uri::PathAndQuery;
use http_body::Body as HttpBody;
use prost::Message;
use prost_types::{FileDescriptorProto, FileDescriptorSet};
use std::collections::{HashMap, HashSet};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Code, Streaming, client::GrpcService, transport::Channel};
use tonic_prost::ProstCodec;
use tonic_reflection::pb::v1::{
    ServerReflectionRequest, ServerReflectionResponse, server_reflection_request::MessageRequest,
    server_reflection_response::MessageResponse,
};
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum ReflectionResolveError {
    #[error("Internal error, the reflection client was not ready: '{0}'")]
    ClientNotReady(#[source] BoxError),

    #[error(
        "Failed to start a stream request with the reflection server, reflection might not be supported: '{0}'"
    )]
    ServerStreamInitFailed(#[source] tonic::Status),

    #[error("The server stream returned an error status: '{0}'")]
    ServerStreamFailure(#[source] tonic::Status),

    #[error("Reflection stream closed unexpectedly")]
    StreamClosed,

    #[error("Internal error: Failed to send request to stream")]
    SendFailed,

    #[error("Server returned reflection error code {code}: {message}")]
    ServerError { code: i32, message: String },

    #[error("Protocol error: Received unexpected response type: {0}")]
    UnexpectedResponseType(String),

    #[error("The server could not provide the dependency '{file}': '{status}'")]
    MissingDependency {
        file: String,
        #[source]
        status: tonic::Status,
    },

    #[error("Failed to decode FileDescriptorProto: {0}")]
    DecodeError(#[from] prost::DecodeError),
}

impl ReflectionResolveError {
    /// Whether the server reported the requested symbol or file as unknown.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::ServerStreamInitFailed(status) | Self::ServerStreamFailure(status) => {
                status.code() == Code::NotFound
            }
            Self::ServerError { code, .. } => *code == Code::NotFound as i32,
            _ => false,
        }
    }

    fn is_unimplemented(&self) -> bool {
        match self {
            Self::ServerStreamInitFailed(status) | Self::ServerStreamFailure(status) => {
                status.code() == Code::Unimplemented
            }
            _ => false,
        }
    }
}

/// The reflection protocol version spoken with the server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReflectionProtocol {
    #[default]
    V1,
    V1Alpha,
}

impl ReflectionProtocol {
    /// Fully qualified name of the reflection service for this version.
    pub const fn service_name(self) -> &'static str {
        match self {
            Self::V1 => "grpc.reflection.v1.ServerReflection",
            Self::V1Alpha => "grpc.reflection.v1alpha.ServerReflection",
        }
    }

    fn path(self) -> PathAndQuery {
        match self {
            Self::V1 => PathAndQuery::from_static(
                "/grpc.reflection.v1.ServerReflection/ServerReflectionInfo",
            ),
            Self::V1Alpha => PathAndQuery::from_static(
                "/grpc.reflection.v1alpha.ServerReflection/ServerReflectionInfo",
            ),
        }
    }
}

// The host defined in the reflection requests doesn't seem to be a mandatory field
// and there is no documentation about what it is about.
// So we won't enforce it from the user.
const EMPTY_HOST: &str = "";

/// A generic client for the gRPC Server Reflection Protocol.
pub struct ReflectionClient<S = Channel> {
    grpc: tonic::client::Grpc<S>,
    protocol: Option<ReflectionProtocol>,
    allow_missing_files: bool,
}

impl<S> ReflectionClient<S>
where
    S: GrpcService<tonic::body::Body>,
    S::Error: Into<BoxError>,
    S::ResponseBody: HttpBody<Data = tonic::codegen::Bytes> + Send + 'static,
    <S::ResponseBody as HttpBody>::Error: Into<BoxError> + Send,
{
    pub fn new(service: S) -> Self {
        Self {
            grpc: tonic::client::Grpc::new(service),
            protocol: None,
            allow_missing_files: false,
        }
    }

    /// Pins the protocol version instead of asking the server which one it speaks.
    pub fn with_protocol(mut self, protocol: ReflectionProtocol) -> Self {
        self.protocol = Some(protocol);
        self
    }

    /// Tolerates servers that cannot provide some of the files a descriptor depends on.
    ///
    /// Missing dependencies are skipped (and logged) instead of failing the whole resolution.
    pub fn allow_missing_file_descriptors(mut self) -> Self {
        self.allow_missing_files = true;
        self
    }

    /// The protocol version in use, once known.
    pub fn protocol(&self) -> Option<ReflectionProtocol> {
        self.protocol
    }

    /// Lists all services exposed by the server.
    ///
    /// The first call tries `grpc.reflection.v1` and falls back to `grpc.reflection.v1alpha`
    /// when the server does not implement it. The protocol that answered is remembered.
    pub async fn list_services(&mut self) -> Result<Vec<String>, ReflectionResolveError> {
        if let Some(protocol) = self.protocol {
            return self.list_services_over(protocol).await;
        }

        match self.list_services_over(ReflectionProtocol::V1).await {
            Ok(services) => {
                self.protocol = Some(ReflectionProtocol::V1);
                Ok(services)
            }
            Err(err) if err.is_unimplemented() => {
                debug!("server does not implement grpc.reflection.v1, falling back to v1alpha");
                let services = self
                    .list_services_over(ReflectionProtocol::V1Alpha)
                    .await?;
                self.protocol = Some(ReflectionProtocol::V1Alpha);
                Ok(services)
            }
            Err(err) => Err(err),
        }
    }

    /// Asks the reflection service for the file containing the requested symbol (e.g., `my.package.MyService`).
    ///
    /// **Recursive Resolution**:
    ///    - The server returns a `FileDescriptorProto`.
    ///    - The client inspects the imports (dependencies) of that file.
    ///    - It recursively requests any missing dependencies until the full `FileDescriptorSet` is built.
    ///
    /// # Returns
    ///
    /// * `Ok(fd_set)` - Successful reflection requests execution.
    /// * `Err(ReflectionResolveError)` - Failed to request file descriptors to the reflection service.
    pub async fn file_descriptor_set_by_symbol(
        &mut self,
        symbol: &str,
    ) -> Result<FileDescriptorSet, ReflectionResolveError> {
        let protocol = self.resolve_protocol().await?;
        let mut resolution = Resolution::default();

        let request = MessageRequest::FileContainingSymbol(symbol.to_string());

        if let Some(status) = self.resolve(protocol, request, &mut resolution).await? {
            debug!(
                symbol,
                %status,
                "reflection stream aborted while resolving dependencies, fetching them one by one"
            );
        }

        // Files whose answer was lost to an aborted stream are requested on their own stream,
        // so a failure points at exactly one file.
        while let Some(file) = resolution.next_pending() {
            let request = MessageRequest::FileByFilename(file.clone());

            match self.resolve(protocol, request, &mut resolution).await {
                Ok(_) => {}
                Err(ReflectionResolveError::ServerStreamFailure(status))
                    if status.code() == Code::NotFound =>
                {
                    self.skip_missing(&mut resolution, &file, status)?;
                }
                Err(err) => return Err(err),
            }

            if !resolution.files.contains_key(&file) {
                resolution.skipped.insert(file);
            }
        }

        Ok(FileDescriptorSet {
            file: resolution.files.into_values().collect(),
        })
    }

    /// Sends `request` on a fresh stream and collects every file it (transitively) yields.
    ///
    /// Returns the status that aborted the stream if the server gave up while dependencies were
    /// still pending.
    async fn resolve(
        &mut self,
        protocol: ReflectionProtocol,
        request: MessageRequest,
        resolution: &mut Resolution,
    ) -> Result<Option<tonic::Status>, ReflectionResolveError> {
        let (tx, rx) = mpsc::channel(100);

        let mut response_stream = self
            .open_stream(protocol, ReceiverStream::new(rx))
            .await?;

        let req = ServerReflectionRequest {
            host: EMPTY_HOST.to_string(),
            message_request: Some(request),
        };

        tx.send(req)
            .await
            .map_err(|_| ReflectionResolveError::SendFailed)?;

        collect_descriptors(
            &mut response_stream,
            tx,
            resolution,
            self.allow_missing_files,
        )
        .await
    }

    fn skip_missing(
        &self,
        resolution: &mut Resolution,
        file: &str,
        status: tonic::Status,
    ) -> Result<(), ReflectionResolveError> {
        if !self.allow_missing_files {
            return Err(ReflectionResolveError::MissingDependency {
                file: file.to_string(),
                status,
            });
        }

        warn!(
            file,
            code = ?status.code(),
            "server could not provide a dependency: {}",
            status.message()
        );
        resolution.skipped.insert(file.to_string());
        Ok(())
    }

    async fn resolve_protocol(&mut self) -> Result<ReflectionProtocol, ReflectionResolveError> {
        if let Some(protocol) = self.protocol {
            return Ok(protocol);
        }

        self.list_services().await?;
        Ok(self.protocol.unwrap_or_default())
    }

    async fn list_services_over(
        &mut self,
        protocol: ReflectionProtocol,
    ) -> Result<Vec<String>, ReflectionResolveError> {
        let req = ServerReflectionRequest {
            host: EMPTY_HOST.to_string(),
            message_request: Some(MessageRequest::ListServices(String::new())),
        };

        let mut response_stream = self
            .open_stream(protocol, once(async move { req }))
            .await?;

        let response = response_stream
            .message()
            .await
            .map_err(ReflectionResolveError::ServerStreamFailure)?
            .ok_or(ReflectionResolveError::StreamClosed)?;

        match response.message_response {
            Some(MessageResponse::ListServicesResponse(resp)) => {
                let services = resp.service.into_iter().map(|s| s.name).collect();
                Ok(services)
            }
            Some(MessageResponse::ErrorResponse(e)) => Err(ReflectionResolveError::ServerError {
                code: e.error_code,
                message: e.error_message,
            }),
            Some(other) => Err(ReflectionResolveError::UnexpectedResponseType(format!(
                "{other:?}",
            ))),
            None => Err(ReflectionResolveError::UnexpectedResponseType(
                "Empty Message".into(),
            )),
        }
    }

    async fn open_stream<R>(
        &mut self,
        protocol: ReflectionProtocol,
        requests: R,
    ) -> Result<Streaming<ServerReflectionResponse>, ReflectionResolveError>
    where
        R: Stream<Item = ServerReflectionRequest> + Send + 'static,
    {
        self.grpc
            .ready()
            .await
            .map_err(|e| ReflectionResolveError::ClientNotReady(e.into()))?;

        let codec = ProstCodec::<ServerReflectionRequest, ServerReflectionResponse>::default();

        let response = self
            .grpc
            .streaming(tonic::Request::new(requests), protocol.path(), codec)
            .await
            .map_err(ReflectionResolveError::ServerStreamInitFailed)?;

        Ok(response.into_inner())
    }
}

/// Files gathered while resolving a symbol.
#[derive(Debug, Default)]
struct Resolution {
    files: HashMap<String, FileDescriptorProto>,
    requested: HashSet<String>,
    skipped: HashSet<String>,
}

impl Resolution {
    /// A requested file that was neither received nor given up on, if any.
    fn next_pending(&self) -> Option<String> {
        self.requested
            .iter()
            .filter(|file| !self.files.contains_key(*file) && !self.skipped.contains(*file))
            .min()
            .cloned()
    }
}

async fn collect_descriptors(
    response_stream: &mut Streaming<ServerReflectionResponse>,
    request_channel: mpsc::Sender<ServerReflectionRequest>,
    resolution: &mut Resolution,
    allow_missing_files: bool,
) -> Result<Option<tonic::Status>, ReflectionResolveError> {
    let mut inflight = 1;
    let mut answered = false;

    while inflight > 0 {
        let response = match response_stream.message().await {
            Ok(Some(response)) => response,
            Ok(None) => return Err(ReflectionResolveError::StreamClosed),
            // Some servers (tonic-reflection among them) abort the stream when a requested
            // dependency is unknown instead of answering with an error message.
            Err(status) if answered && status.code() == Code::NotFound => return Ok(Some(status)),
            Err(status) => return Err(ReflectionResolveError::ServerStreamFailure(status)),
        };

        inflight -= 1;
        answered = true;

        match response.message_response {
            Some(MessageResponse::FileDescriptorResponse(res)) => {
                let sent_count =
                    process_descriptor_batch(res.file_descriptor_proto, resolution, &request_channel)
                        .await?;

                inflight += sent_count;
            }
            Some(MessageResponse::ErrorResponse(e)) => {
                let missing_file = response
                    .original_request
                    .and_then(|req| req.message_request)
                    .and_then(|req| match req {
                        MessageRequest::FileByFilename(name) => Some(name),
                        _ => None,
                    });

                match missing_file {
                    Some(file) if allow_missing_files => {
                        warn!(
                            file = %file,
                            code = e.error_code,
                            "server could not provide a dependency: {}",
                            e.error_message
                        );
                        resolution.skipped.insert(file);
                    }
                    Some(file) => {
                        return Err(ReflectionResolveError::MissingDependency {
                            file,
                            status: tonic::Status::new(
                                Code::from_i32(e.error_code),
                                e.error_message,
                            ),
                        });
                    }
                    None => {
                        return Err(ReflectionResolveError::ServerError {
                            message: e.error_message,
                            code: e.error_code,
                        });
                    }
                }
            }
            Some(other) => {
                return Err(ReflectionResolveError::UnexpectedResponseType(format!(
                    "{:?}",
                    other
                )));
            }
            None => {
                return Err(ReflectionResolveError::UnexpectedResponseType(
                    "Empty Message".into(),
                ));
            }
        }
    }

    Ok(None)
}

async fn process_descriptor_batch(
    raw_protos: Vec<Vec<u8>>,
    resolution: &mut Resolution,
    tx: &mpsc::Sender<ServerReflectionRequest>,
) -> Result<usize, ReflectionResolveError> {
    let mut sent_count = 0;

    for raw in raw_protos {
        let fd = FileDescriptorProto::decode(raw.as_ref())?;

        if let Some(name) = &fd.name
            && !resolution.files.contains_key(name)
        {
            sent_count += queue_dependencies(&fd, resolution, tx).await;

            resolution.files.insert(name.clone(), fd);
        }
    }

    Ok(sent_count)
}

async fn queue_dependencies(
    fd: &FileDescriptorProto,
    resolution: &mut Resolution,
    tx: &mpsc::Sender<ServerReflectionRequest>,
) -> usize {
    let mut count = 0;

    for dep in &fd.dependency {
        if !resolution.files.contains_key(dep) && resolution.requested.insert(dep.clone()) {
            let req = ServerReflectionRequest {
                host: EMPTY_HOST.to_string(),
                message_request: Some(MessageRequest::FileByFilename(dep.clone())),
            };

            // A closed stream leaves the file pending, it is fetched again on a new stream.
            if tx.send(req).await.is_ok() {
                count += 1;
            }
        }
    }

    count
}
