use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};

use mailgate::artifact::{Artifact, Route};
use mailgate::config::{DEFAULT_FILENAME, InboundConfig, OutboundConfig, ServerSettings};
use mailgate::{inbound, outbound};

/// Mail-based file transfer gateway.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Poll the mailbox once and write the newest tagged attachment.
    Receive {
        /// Artifact passed through unchanged when nothing matches.
        #[arg(long)]
        input: Option<PathBuf>,
        /// Directory the attachment is written to.
        #[arg(long, default_value = ".")]
        output_dir: PathBuf,
    },
    /// Mail a file as an attachment.
    Send {
        #[arg(long)]
        input: PathBuf,
        /// Filename carried with the artifact (defaults to the input's name).
        #[arg(long)]
        filename: Option<String>,
    },
    /// Validate both configurations and print a redacted summary.
    Check,
}

fn main() -> ExitCode {
    // Install rustls crypto provider before any TLS usage (lettre builds its
    // client config from the process default).
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        eprintln!("Error: failed to install rustls crypto provider");
        return ExitCode::FAILURE;
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    match run(cli.command) {
        Ok(route) => exit_code(route),
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(command: Command) -> anyhow::Result<Route> {
    match command {
        Command::Receive { input, output_dir } => {
            let config = InboundConfig::from_env()?;
            let incoming = match input {
                Some(path) => Artifact::from_file(&path)
                    .with_context(|| format!("reading {}", path.display()))?,
                None => Artifact::default(),
            };

            let processed = inbound::poll(&config, incoming);
            if processed.route == Route::Success {
                let path = processed
                    .artifact
                    .write_to_dir(&output_dir, DEFAULT_FILENAME)
                    .with_context(|| format!("writing to {}", output_dir.display()))?;
                println!("{}", path.display());
            }
            Ok(processed.route)
        }
        Command::Send { input, filename } => {
            let config = OutboundConfig::from_env()?;
            let mut artifact = Artifact::from_file(&input)
                .with_context(|| format!("reading {}", input.display()))?;
            if let Some(filename) = filename {
                artifact.set_filename(filename);
            }
            Ok(outbound::deliver(&config, artifact).route)
        }
        Command::Check => {
            let inbound = InboundConfig::from_env()?;
            let outbound = OutboundConfig::from_env()?;
            println!("inbound:  {}", summary(&inbound.server));
            println!("          tag={:?} sender={:?} delete={}", inbound.tag, inbound.sender, inbound.delete_after_read);
            println!("outbound: {}", summary(&outbound.server));
            println!("          from={} to={}", outbound.from, outbound.recipients);
            Ok(Route::Success)
        }
    }
}

fn summary(server: &ServerSettings) -> String {
    format!(
        "{}@{}:{} insecure={}",
        server.credentials.username, server.host, server.port, server.accept_invalid_certs
    )
}

fn exit_code(route: Route) -> ExitCode {
    match route {
        Route::Success => ExitCode::SUCCESS,
        Route::NoNewData => ExitCode::from(2),
        Route::Failure => ExitCode::FAILURE,
    }
}
