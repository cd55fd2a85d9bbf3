//! # grpcui-proxy Entry Point
//!
//! The main executable. This file drives the application lifecycle:
//!
//! 1. **Initialization**: Parses command-line arguments using [`cli::Cli`] and installs the
//!    `tracing` subscriber (`RUST_LOG`, `warn` by default). Logs go to standard error.
//! 2. **Connection**: Dials the target through `grpcui_proxy_core`, either as a single
//!    diagnostic attempt (`--fail-fast`) or as a full session with reflection.
//! 3. **Presentation**: Prints the selected methods (and files) or the error to standard
//!    output/error.

mod cli;
mod formatter;

use clap::Parser;
use cli::Cli;
use colored::Colorize;
use formatter::{FileList, FormattedString, session_json};
use grpcui_proxy_core::{Dialer, Session, SessionOptions};
use std::process;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let args = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run(args).await {
        eprintln!("{}", FormattedString::from(&err));
        process::exit(1);
    }
}

async fn run(args: Cli) -> anyhow::Result<()> {
    let options = args.session_options()?;

    if args.fail_fast {
        return check_reachable(&args, options).await;
    }

    let session = Session::connect(&args.target, &options).await?;

    if args.json {
        println!("{}", FormattedString::from(session_json(&session, args.files)));
    } else {
        println!("{}", FormattedString::from(&session));
        if args.files {
            println!("{}", FormattedString::from(FileList(session.files())));
        }
    }

    tracing::debug!(methods = session.methods().len(), "session ready");
    session.close();

    Ok(())
}

/// A single connection attempt, without reflection.
async fn check_reachable(args: &Cli, options: SessionOptions) -> anyhow::Result<()> {
    let channel = Dialer::new(options.dial)
        .dial(&args.target, options.credentials, true)
        .await?;
    drop(channel);

    if args.json {
        println!(
            "{}",
            FormattedString::from(serde_json::json!({ "endpoint": args.target, "reachable": true }))
        );
    } else {
        println!(
            "{}",
            FormattedString(format!("{} {}", "Reachable:".green().bold(), args.target))
        );
    }

    Ok(())
}
