//! # Resilient Dialer
//!
//! Establishes the [`Channel`] a session runs on.
//!
//! Two strategies are available:
//!
//! * **Fail-fast**: a single connection attempt, bounded by [`DialOptions::timeout`]. The first
//!   error is returned as is. Meant for short diagnostic checks.
//! * **Resilient** (the default for introspection): the target is dialed through tracking
//!   wrappers and re-attempted with exponential backoff until the deadline. When it finally
//!   fails, the most specific cause wins:
//!   1. the last TLS (credentials) handshake error,
//!   2. the last network connect error,
//!   3. the error reported by the connection machinery itself (usually the deadline).
//!
//! Dropping the future returned by [`Dialer::dial`] cancels any in-flight attempt.
use crate::transport::{
    InsecureCredentials, NetworkConnector, SharedError, TcpConnector, TrackingConnector,
    TrackingCredentials, TransportCredentials, connector::Connector,
};
use std::{sync::Arc, time::Duration};
use tokio::time::{sleep, timeout};
use tonic::transport::{Channel, Endpoint};
use tracing::debug;

/// A failed dial, carrying the cause chosen by the arbitration described in the module docs.
#[derive(Debug, thiserror::Error)]
pub enum DialError {
    #[error("Invalid endpoint '{endpoint}': {source}")]
    InvalidEndpoint {
        endpoint: String,
        source: tonic::transport::Error,
    },
    #[error("Handshake with '{endpoint}' failed: {source}")]
    Handshake {
        endpoint: String,
        source: SharedError,
    },
    #[error("Failed to connect to '{endpoint}': {source}")]
    Connect {
        endpoint: String,
        source: SharedError,
    },
    #[error("Failed to connect to '{endpoint}': {message}")]
    Transport {
        endpoint: String,
        message: String,
        source: tonic::transport::Error,
    },
    #[error(
        "Timed out after {timeout:?} connecting to '{endpoint}'{}",
        .last_attempt.as_ref().map(|err| format!(" (last error: {err})")).unwrap_or_default()
    )]
    DeadlineExceeded {
        endpoint: String,
        timeout: Duration,
        last_attempt: Option<String>,
    },
}

impl DialError {
    fn transport(endpoint: &str, source: tonic::transport::Error) -> Self {
        Self::Transport {
            endpoint: endpoint.to_string(),
            message: error_chain(&source),
            source,
        }
    }
}

/// Tuning knobs for [`Dialer`].
#[derive(Debug, Clone)]
pub struct DialOptions {
    /// Overall deadline for establishing the connection.
    pub timeout: Duration,
    /// Delay before the second attempt of a resilient dial.
    pub initial_backoff: Duration,
    /// Upper bound for the delay between attempts.
    pub max_backoff: Duration,
    /// Growth factor applied to the delay after every failed attempt.
    pub backoff_multiplier: f64,
    /// HTTP/2 keep-alive interval for the established channel.
    pub keep_alive: Option<Duration>,
}

impl Default for DialOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(120),
            backoff_multiplier: 1.6,
            keep_alive: None,
        }
    }
}

/// Dials gRPC endpoints.
///
/// Uses [`TcpConnector`] unless another [`NetworkConnector`] is injected.
#[derive(Clone)]
pub struct Dialer {
    network: Arc<dyn NetworkConnector>,
    options: DialOptions,
}

impl Default for Dialer {
    fn default() -> Self {
        Self::new(DialOptions::default())
    }
}

impl Dialer {
    pub fn new(options: DialOptions) -> Self {
        Self {
            network: Arc::new(TcpConnector),
            options,
        }
    }

    /// Replaces the connector used to open raw connections.
    pub fn with_network_connector(mut self, network: Arc<dyn NetworkConnector>) -> Self {
        self.network = network;
        self
    }

    pub fn options(&self) -> &DialOptions {
        &self.options
    }

    /// Connects to `endpoint` (`host:port`, an `http://` prefix is tolerated).
    ///
    /// Without `credentials` the connection is plaintext.
    ///
    /// # Returns
    ///
    /// * `Ok(Channel)` - A ready channel.
    /// * `Err(DialError)` - The connection could not be established. See the module docs for
    ///   which cause is reported.
    pub async fn dial(
        &self,
        endpoint: &str,
        credentials: Option<Arc<dyn TransportCredentials>>,
        fail_fast: bool,
    ) -> Result<Channel, DialError> {
        let target = self.target(endpoint)?;

        if fail_fast {
            let credentials = credentials
                .unwrap_or_else(|| Arc::new(InsecureCredentials) as Arc<dyn TransportCredentials>);
            let connector = Connector::new(Arc::clone(&self.network), credentials);

            return match timeout(self.options.timeout, target.connect_with_connector(connector))
                .await
            {
                Ok(Ok(channel)) => Ok(channel),
                Ok(Err(err)) => Err(DialError::transport(endpoint, err)),
                Err(_) => Err(DialError::DeadlineExceeded {
                    endpoint: endpoint.to_string(),
                    timeout: self.options.timeout,
                    last_attempt: None,
                }),
            };
        }

        let network = Arc::new(TrackingConnector::new(Arc::clone(&self.network)));
        let tracked_credentials = credentials.map(|c| Arc::new(TrackingCredentials::new(c)));

        let handshake: Arc<dyn TransportCredentials> = match &tracked_credentials {
            Some(credentials) => Arc::clone(credentials) as Arc<dyn TransportCredentials>,
            None => Arc::new(InsecureCredentials),
        };
        let connector = Connector::new(
            Arc::clone(&network) as Arc<dyn NetworkConnector>,
            handshake,
        );

        let raw_error = match self.connect_until_deadline(endpoint, &target, connector).await {
            Ok(channel) => return Ok(channel),
            Err(err) => err,
        };

        if let Some(source) = tracked_credentials.and_then(|c| c.last_error()) {
            return Err(DialError::Handshake {
                endpoint: endpoint.to_string(),
                source,
            });
        }

        if let Some(source) = network.last_error() {
            return Err(DialError::Connect {
                endpoint: endpoint.to_string(),
                source,
            });
        }

        Err(raw_error)
    }

    /// Keeps attempting to connect until one attempt succeeds or the deadline expires.
    async fn connect_until_deadline(
        &self,
        endpoint: &str,
        target: &Endpoint,
        connector: Connector,
    ) -> Result<Channel, DialError> {
        let mut last_attempt = None;

        let attempts = async {
            let mut backoff = self.options.initial_backoff;
            let mut attempt: u32 = 1;

            loop {
                match target.connect_with_connector(connector.clone()).await {
                    Ok(channel) => return channel,
                    Err(err) => {
                        let message = error_chain(&err);
                        debug!(endpoint, attempt, error = %message, ?backoff, "connection attempt failed");
                        last_attempt = Some(message);
                    }
                }

                sleep(backoff).await;
                backoff = self.next_backoff(backoff);
                attempt += 1;
            }
        };

        let outcome = timeout(self.options.timeout, attempts).await;

        outcome.map_err(|_| DialError::DeadlineExceeded {
            endpoint: endpoint.to_string(),
            timeout: self.options.timeout,
            last_attempt,
        })
    }

    fn next_backoff(&self, current: Duration) -> Duration {
        let next = current.as_secs_f64() * self.options.backoff_multiplier;
        Duration::from_secs_f64(next.min(self.options.max_backoff.as_secs_f64()))
    }

    fn target(&self, endpoint: &str) -> Result<Endpoint, DialError> {
        // The connector performs TLS itself, so tonic must always see a plaintext scheme.
        let authority = endpoint
            .strip_prefix("http://")
            .or_else(|| endpoint.strip_prefix("https://"))
            .unwrap_or(endpoint);

        let mut target =
            Endpoint::from_shared(format!("http://{authority}")).map_err(|source| {
                DialError::InvalidEndpoint {
                    endpoint: endpoint.to_string(),
                    source,
                }
            })?;

        target = target.connect_timeout(self.options.timeout);

        if let Some(interval) = self.options.keep_alive {
            target = target
                .http2_keep_alive_interval(interval)
                .keep_alive_while_idle(true);
        }

        Ok(target)
    }
}

/// Dials `endpoint` with the default [`Dialer`].
pub async fn dial(
    endpoint: &str,
    credentials: Option<Arc<dyn TransportCredentials>>,
    fail_fast: bool,
) -> Result<Channel, DialError> {
    Dialer::default()
        .dial(endpoint, credentials, fail_fast)
        .await
}

/// Renders an error followed by all of its sources.
///
/// `tonic::transport::Error` only displays "transport error", the interesting part lives in
/// the source chain.
fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();

    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }

    message
}
