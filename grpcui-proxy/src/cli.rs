//! # CLI
//!
//! This module defines the command-line interface of `grpcui-proxy` using `clap`.
//!
//! It is responsible for parsing user input and performing validation (e.g., ensuring methods are
//! `package.Service/Method`). Turning the arguments into core options happens here as well.
use std::{path::PathBuf, time::Duration};

use anyhow::Context;
use clap::Parser;
use grpcui_proxy_core::{
    DialOptions, InclusionPolicy, SessionOptions,
    transport::{TlsCredentials, TransportCredentials},
};
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(
    name = "grpcui-proxy",
    version,
    about = "Connect to a gRPC server and discover its methods through reflection"
)]
pub struct Cli {
    /// The server to connect to (e.g. localhost:50051)
    pub target: String,

    /// Expose every method of this service (repeatable)
    #[arg(long = "service", value_name = "SERVICE")]
    pub services: Vec<String>,

    /// Expose a single method, as package.Service/Method (repeatable)
    #[arg(long = "method", value_name = "SERVICE/METHOD", value_parser = parse_method)]
    pub methods: Vec<(String, String)>,

    /// PEM bundle of root certificates. Enables TLS
    #[arg(long, env = "GRPCUI_PROXY_CACERT")]
    pub cacert: Option<PathBuf>,

    /// Override the server name used to verify the server certificate
    #[arg(long, requires = "cacert")]
    pub servername: Option<String>,

    /// Seconds to wait for the connection to be established
    #[arg(long, value_name = "SECS", default_value = "10", value_parser = parse_timeout)]
    pub connect_timeout: Duration,

    /// Only check that the server is reachable, with a single connection attempt
    #[arg(long)]
    pub fail_fast: bool,

    /// Also list the files describing the server's schema
    #[arg(long)]
    pub files: bool,

    /// Print the result as JSON
    #[arg(long)]
    pub json: bool,
}

impl Cli {
    pub fn policy(&self) -> Option<InclusionPolicy> {
        if self.services.is_empty() && self.methods.is_empty() {
            return None;
        }

        let mut policy = InclusionPolicy::new();

        for service in &self.services {
            policy.include_service(service.as_str());
        }

        for (service, method) in &self.methods {
            policy.include_method(service.as_str(), method.as_str());
        }

        Some(policy)
    }

    pub fn credentials(&self) -> anyhow::Result<Option<Arc<dyn TransportCredentials>>> {
        let Some(path) = &self.cacert else {
            return Ok(None);
        };

        let pem = std::fs::read(path)
            .with_context(|| format!("Failed to read CA bundle '{}'", path.display()))?;

        let mut credentials = TlsCredentials::from_pem(&pem)?;

        if let Some(name) = &self.servername {
            credentials = credentials.with_server_name(name)?;
        }

        Ok(Some(Arc::new(credentials)))
    }

    pub fn session_options(&self) -> anyhow::Result<SessionOptions> {
        Ok(SessionOptions {
            dial: DialOptions {
                timeout: self.connect_timeout,
                ..Default::default()
            },
            credentials: self.credentials()?,
            policy: self.policy(),
        })
    }
}

fn parse_method(value: &str) -> Result<(String, String), String> {
    grpcui_proxy_core::select::policy::parse_method_path(value).map_err(|e| e.to_string())
}

fn parse_timeout(value: &str) -> Result<Duration, String> {
    let secs: f64 = value
        .parse()
        .map_err(|_| format!("Invalid timeout: '{value}'"))?;

    if !secs.is_finite() || secs <= 0.0 {
        return Err("The timeout must be a positive number of seconds".to_string());
    }

    Duration::try_from_secs_f64(secs).map_err(|_| format!("Timeout out of range: '{value}'"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_repeated_filters_into_a_policy() {
        let cli = Cli::try_parse_from([
            "grpcui-proxy",
            "localhost:50051",
            "--service",
            "pkg.Admin",
            "--method",
            "pkg.Greeter/SayHello",
            "--method",
            "pkg.Greeter.SayBye",
        ])
        .unwrap();

        let policy = cli.policy().unwrap();

        assert!(policy.rule("pkg.Admin").unwrap().include_service);

        let greeter = policy.rule("pkg.Greeter").unwrap();
        assert!(!greeter.include_service);
        assert_eq!(
            greeter.include_methods.iter().collect::<Vec<_>>(),
            ["SayBye", "SayHello"]
        );
    }

    #[test]
    fn no_filters_means_no_policy() {
        let cli = Cli::try_parse_from(["grpcui-proxy", "localhost:50051"]).unwrap();

        assert!(cli.policy().is_none());
        assert!(cli.credentials().unwrap().is_none());
        assert_eq!(cli.connect_timeout, Duration::from_secs(10));
    }

    #[test]
    fn rejects_invalid_arguments() {
        assert!(Cli::try_parse_from(["grpcui-proxy", "x:1", "--method", "SayHello"]).is_err());
        assert!(Cli::try_parse_from(["grpcui-proxy", "x:1", "--connect-timeout", "0"]).is_err());
        assert!(Cli::try_parse_from(["grpcui-proxy", "x:1", "--servername", "x"]).is_err());
    }

    #[test]
    fn fractional_timeouts_are_accepted() {
        let cli =
            Cli::try_parse_from(["grpcui-proxy", "x:1", "--connect-timeout", "1.5"]).unwrap();

        assert_eq!(cli.connect_timeout, Duration::from_millis(1500));
        assert_eq!(
            cli.session_options().unwrap().dial.timeout,
            Duration::from_millis(1500)
        );
    }

    #[test]
    fn out_of_range_timeouts_are_rejected() {
        for value in ["1e20", "inf", "NaN", "-1"] {
            assert!(
                Cli::try_parse_from(["grpcui-proxy", "x:1", "--connect-timeout", value]).is_err(),
                "Expected '{value}' to be rejected"
            );
        }

        assert_eq!(
            parse_timeout("1e20").unwrap_err(),
            "Timeout out of range: '1e20'"
        );
    }

    #[test]
    fn unreadable_ca_bundle_is_reported() {
        let cli =
            Cli::try_parse_from(["grpcui-proxy", "x:1", "--cacert", "/does/not/exist.pem"])
                .unwrap();

        let Err(err) = cli.credentials() else {
            panic!("Expected the CA bundle to be unreadable");
        };
        assert!(err.to_string().contains("/does/not/exist.pem"));
    }
}
