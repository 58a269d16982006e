//! Summarize already-fetched Prometheus exposition text as JSON.

#![allow(clippy::print_stdout)]

use std::{
    io::{self, Read},
    path::PathBuf,
};

use clap::Parser;
use promsight::{
    Overview,
    config::{self, Config},
};
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Path to a YAML configuration file
    #[clap(short, long)]
    config: Option<PathBuf>,

    /// Pretty-print the JSON output
    #[clap(short, long)]
    pretty: bool,

    /// Emit the classified samples instead of the overview
    #[clap(short, long)]
    samples: bool,

    /// File holding exposition text. Reads stdin when omitted or `-`.
    input: Option<PathBuf>,
}

#[derive(thiserror::Error, Debug)]
enum Error {
    #[error(transparent)]
    Config(#[from] config::Error),
    #[error("Failed to read input {path:?}: {source}")]
    Input {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to read stdin: {0}")]
    Stdin(#[source] io::Error),
    #[error("Failed to serialize output: {0}")]
    Json(#[from] serde_json::Error),
}

fn read_input(input: Option<&PathBuf>) -> Result<String, Error> {
    match input {
        Some(path) if path.as_os_str() != "-" => {
            std::fs::read_to_string(path).map_err(|source| Error::Input {
                path: path.clone(),
                source,
            })
        }
        _ => {
            let mut text = String::new();
            io::stdin()
                .read_to_string(&mut text)
                .map_err(Error::Stdin)?;
            Ok(text)
        }
    }
}

fn run(args: &Args) -> Result<String, Error> {
    let config = match &args.config {
        Some(path) => {
            debug!("loading configuration from {}", path.display());
            config::load_config_from_path(path)?
        }
        None => Config::default(),
    };

    let text = read_input(args.input.as_ref())?;
    let snapshot = promsight::parse_with(&text, &config.classifier());
    info!(
        custom = snapshot.custom.len(),
        server_request = snapshot.server_request.len(),
        runtime = snapshot.runtime.len(),
        "parsed {} bytes of exposition text",
        text.len()
    );

    let output = if args.samples {
        to_json(&snapshot, args.pretty)?
    } else {
        to_json(&Overview::build(&snapshot, &config.views), args.pretty)?
    };
    Ok(output)
}

fn to_json<T: serde::Serialize>(value: &T, pretty: bool) -> Result<String, Error> {
    let json = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    Ok(json)
}

fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_ansi(false)
        .with_writer(io::stderr)
        .finish()
        .init();

    let args = Args::parse();
    let output = run(&args)?;
    println!("{output}");
    Ok(())
}
