//! promsd CLI Client
//!
//! Command-line interface for managing target groups over the HTTP API.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::Url;

/// promsd CLI
#[derive(Parser, Debug)]
#[command(name = "promsd-cli")]
#[command(about = "CLI for the promsd target registry")]
#[command(version)]
struct Args {
    /// Server base URL
    #[arg(short, long, default_value = "http://127.0.0.1:80")]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Add a target to a group
    AddTarget { group: String, target: String },

    /// Remove a target from a group
    RemoveTarget { group: String, target: String },

    /// Delete a group with all its targets and labels
    RemoveGroup { group: String },

    /// Add or overwrite labels on a group
    AddLabels {
        group: String,

        /// Labels as key=value
        #[arg(required = true)]
        labels: Vec<String>,
    },

    /// Remove one label from a group
    RemoveLabel { group: String, label: String },

    /// Show the labels of a group
    Labels { group: String },

    /// Show all target groups
    Targets {
        /// Show groups keyed by name
        #[arg(long)]
        debug: bool,
    },
}

fn main() -> ExitCode {
    let args = Args::parse();

    match run(args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<bool, Box<dyn std::error::Error>> {
    let base = Url::parse(&args.server)?;
    let client = Client::new();

    let request = match &args.command {
        Commands::AddTarget { group, target } => {
            client.post(endpoint(&base, &["api", "target", group.as_str(), target.as_str()])?)
        }
        Commands::RemoveTarget { group, target } => {
            client.delete(endpoint(&base, &["api", "target", group.as_str(), target.as_str()])?)
        }
        Commands::RemoveGroup { group } => {
            client.delete(endpoint(&base, &["api", "target", group.as_str()])?)
        }
        Commands::AddLabels { group, labels } => {
            let query: Vec<(&str, &str)> = labels.iter().map(|l| ("labels", l.as_str())).collect();
            client
                .post(endpoint(&base, &["api", "labels", "update", group.as_str()])?)
                .query(&query)
        }
        Commands::RemoveLabel { group, label } => {
            client.delete(endpoint(&base, &["api", "labels", "update", group.as_str(), label.as_str()])?)
        }
        Commands::Labels { group } => client.get(endpoint(&base, &["api", "labels", group.as_str()])?),
        Commands::Targets { debug: false } => client.get(endpoint(&base, &["api", "targets"])?),
        Commands::Targets { debug: true } => client.get(endpoint(&base, &["debug_targets"])?),
    };

    send(request)
}

fn endpoint(base: &Url, segments: &[&str]) -> Result<Url, Box<dyn std::error::Error>> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| format!("{base} cannot be a base URL"))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

fn send(request: RequestBuilder) -> Result<bool, Box<dyn std::error::Error>> {
    let response = request.send()?;
    let status = response.status();
    let body = response.text()?;
    if status.is_success() {
        print!("{body}");
        if !body.ends_with('\n') {
            println!();
        }
        Ok(true)
    } else {
        eprint!("{status}: {body}");
        Ok(false)
    }
}
