//! # Session
//!
//! A [`Session`] bundles everything a presentation layer needs to drive a server: the live
//! [`Channel`], the methods it may invoke (already filtered by the [`InclusionPolicy`]) and the
//! files describing their messages.
//!
//! The reflection client is only used while the session is being built. Once introspection is
//! done it is dropped and only the channel is retained.
use crate::{
    BoxError,
    dial::{DialError, DialOptions, Dialer},
    reflection::ReflectionClient,
    select::{InclusionPolicy, SelectError, policy::parse_method_path, select_methods},
    source::{DescriptorSource, ReflectionSource, SourceError},
    transport::TransportCredentials,
};
use http_body::Body as HttpBody;
use prost_reflect::{FileDescriptor, MethodDescriptor};
use std::sync::Arc;
use tonic::{client::GrpcService, transport::Channel};
use tracing::debug;

/// Coarse classification of a [`SessionError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The endpoint could not be dialed.
    Connection,
    /// The server described something other than a service where a service was expected.
    Protocol,
    /// The policy names services or methods the server does not advertise.
    Selection,
    /// Reflection failed or returned unusable descriptors.
    Reflection,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Dial(#[from] DialError),
    #[error(transparent)]
    Select(#[from] SelectError),
    #[error("Failed to collect file descriptors: '{0}'")]
    Files(#[source] SourceError),
}

impl SessionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SessionError::Dial(_) => ErrorKind::Connection,
            SessionError::Select(SelectError::NotAService { .. }) => ErrorKind::Protocol,
            SessionError::Select(
                SelectError::MethodsNotFound(_) | SelectError::ServicesNotFound(_),
            ) => ErrorKind::Selection,
            SessionError::Select(SelectError::Source(_)) | SessionError::Files(_) => {
                ErrorKind::Reflection
            }
        }
    }
}

/// How a [`Session`] is established.
#[derive(Clone, Default)]
pub struct SessionOptions {
    pub dial: DialOptions,
    /// Transport security. `None` means plaintext.
    pub credentials: Option<Arc<dyn TransportCredentials>>,
    pub policy: Option<InclusionPolicy>,
}

/// The outcome of introspecting a server.
#[derive(Debug, Clone)]
pub struct Introspection {
    /// Selected methods, in discovery order.
    pub methods: Vec<MethodDescriptor>,
    /// Every file describing the server's services, sorted by name.
    pub files: Vec<FileDescriptor>,
}

#[derive(Debug)]
pub struct Session {
    endpoint: String,
    channel: Channel,
    methods: Vec<MethodDescriptor>,
    files: Vec<FileDescriptor>,
}

impl Session {
    /// Dials `endpoint` and introspects it.
    ///
    /// If introspection fails the channel is closed before the error is returned.
    ///
    /// # Returns
    ///
    /// * `Ok(Session)` - A connected session.
    /// * `Err(SessionError)` - If dialing, reflection or selection failed.
    pub async fn connect(endpoint: &str, options: &SessionOptions) -> Result<Self, SessionError> {
        let channel = Dialer::new(options.dial.clone())
            .dial(endpoint, options.credentials.clone(), false)
            .await?;

        debug!(endpoint, "connected, introspecting");

        let Introspection { methods, files } =
            introspect(channel.clone(), options.policy.as_ref()).await?;

        Ok(Self {
            endpoint: endpoint.to_string(),
            channel,
            methods,
            files,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// The underlying connection, for invoking the selected methods.
    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    pub fn methods(&self) -> &[MethodDescriptor] {
        &self.methods
    }

    pub fn files(&self) -> &[FileDescriptor] {
        &self.files
    }

    /// Looks up a selected method by `package.Service/Method`.
    pub fn method(&self, path: &str) -> Option<&MethodDescriptor> {
        let (service, method) = parse_method_path(path).ok()?;

        self.methods
            .iter()
            .find(|m| m.name() == method && m.parent_service().full_name() == service)
    }

    /// Closes the connection.
    pub fn close(self) {
        debug!(endpoint = self.endpoint.as_str(), "closing session");
    }

    /// Releases the session, keeping only the connection.
    pub fn into_channel(self) -> Channel {
        self.channel
    }
}

/// Runs reflection over `service` and selects the methods allowed by `policy`.
///
/// Missing dependency files are tolerated. The reflection client is dropped before returning.
pub async fn introspect<S>(
    service: S,
    policy: Option<&InclusionPolicy>,
) -> Result<Introspection, SessionError>
where
    S: GrpcService<tonic::body::Body>,
    S::Error: Into<BoxError>,
    S::ResponseBody: HttpBody<Data = tonic::codegen::Bytes> + Send + 'static,
    <S::ResponseBody as HttpBody>::Error: Into<BoxError> + Send,
{
    let client = ReflectionClient::new(service).allow_missing_file_descriptors();
    let mut source = ReflectionSource::new(client);

    let methods = select_methods(&mut source, policy).await?;
    let files = source.all_files().await.map_err(SessionError::Files)?;

    Ok(Introspection { methods, files })
}
