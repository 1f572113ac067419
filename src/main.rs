// Copyright 2024 SAP SE
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![warn(clippy::pedantic)]

mod api_clients;
mod card;
mod credentials;
mod error;
mod manifest;
mod plugin;
mod push;
mod settings;
mod tagging;
mod template;
mod validate;

use std::ffi::OsString;
use std::path::Path;
use std::sync::LazyLock;

use anyhow::Context;
use api_clients::RealClient;
use clap::builder::styling::Style;
use clap::error::ErrorKind;
use clap::{Parser, Subcommand};
use plugin::{Args, Outcome, Registry};
use push::ManifestTool;
use settings::{lookup_env, EcrSettings, ManifestSettings, Pipeline, RegistryLogin, TAGS_FILE};
use tracing::Level;

const BOLD_UNDERLINE: Style = Style::new().bold().underline();
static ENVIRONMENT_HELP: LazyLock<String> = LazyLock::new(|| {
    format!(
        "{BOLD_UNDERLINE}Environment variables:{BOLD_UNDERLINE:#}
  PLUGIN_ENV_FILE              dotenv file to load before reading settings
  PLUGIN_MANIFEST_TOOL         path of the manifest-tool binary
  PLUGIN_TAG, PLUGIN_TAGS      tags of the manifest list when --tags is not given
  DRONE_*                      pipeline metadata exported by the CI runner
"
    )
});

/// Publishes multi-architecture manifest lists from CI pipelines
#[derive(Parser)]
#[command(version, about, long_about = None, after_help = ENVIRONMENT_HELP.to_string(), propagate_version = true)]
struct Cli {
    /// Log level, debug and trace also print level names
    #[arg(long, env = "PLUGIN_LOG_LEVEL", default_value = "info", global = true)]
    log_level: String,

    #[command(flatten)]
    settings: ManifestSettings,

    #[command(flatten)]
    pipeline: Pipeline,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pushes to a registry using a static username and password
    #[command(after_help = ENVIRONMENT_HELP.to_string())]
    Push(RegistryLogin),

    /// Pushes to Amazon ECR, logging in through an authorization token
    #[command(after_help = ENVIRONMENT_HELP.to_string())]
    Ecr(EcrSettings),
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    if let Some(env_file) = lookup_env("PLUGIN_ENV_FILE") {
        dotenvy::from_path(&env_file).with_context(|| format!("cannot load env file {env_file}"))?;
    }

    let cli = parse_cli(std::env::args_os().collect()).unwrap_or_else(|e| e.exit());
    init_logging(&cli.log_level);

    let mut settings = cli.settings;
    settings.resolve_aliases(lookup_env);
    settings.read_tags_file(Path::new(TAGS_FILE));

    let registry = match cli.command {
        Commands::Push(mut login) => {
            login.resolve_aliases(lookup_env);
            Registry::Static(login)
        },
        Commands::Ecr(mut ecr) => {
            ecr.resolve_aliases(lookup_env);
            Registry::Ecr {
                client: RealClient::new(ecr.clone()),
                settings: ecr,
            }
        },
    };

    let pusher = ManifestTool::new(&cli.pipeline.workspace);
    let args = Args {
        pipeline: cli.pipeline,
        settings,
        registry,
    };

    match plugin::exec(&args, &pusher).await.context("while publishing the manifest list")? {
        Outcome::Skipped => {},
        Outcome::Pushed { image, pushed } => {
            tracing::debug!("published {image} in {} push(es)", pushed.len());
        },
    }

    Ok(())
}

/// Parses the command line. Without a subcommand, a binary named `*-ecr` runs `ecr` and anything else `push`.
fn parse_cli(args: Vec<OsString>) -> Result<Cli, clap::Error> {
    match Cli::try_parse_from(&args) {
        Err(e)
            if matches!(
                e.kind(),
                ErrorKind::MissingSubcommand
                    | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
                    | ErrorKind::UnknownArgument
            ) =>
        {
            Cli::try_parse_from(with_default_command(args))
        },
        result => result,
    }
}

fn with_default_command(mut args: Vec<OsString>) -> Vec<OsString> {
    if args.is_empty() {
        args.push(env!("CARGO_PKG_NAME").into());
    }

    let is_ecr = Path::new(&args[0])
        .file_stem()
        .is_some_and(|name| name.to_string_lossy().ends_with("-ecr"));
    args.insert(1, if is_ecr { "ecr" } else { "push" }.into());
    args
}

fn init_logging(level: &str) {
    let (max_level, show_level) = match level.to_lowercase().as_str() {
        "trace" => (Level::TRACE, true),
        "debug" => (Level::DEBUG, true),
        "warn" | "warning" => (Level::WARN, false),
        "error" => (Level::ERROR, false),
        _ => (Level::INFO, false),
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(max_level)
        .with_level(show_level)
        .with_target(false)
        .without_time()
        .init();
}
