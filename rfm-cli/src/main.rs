// SPDX-License-Identifier: AGPL-3.0-or-later
//! RichFilemanager CLI
//!
//! Runs one file manager verb against the configured storage and prints the
//! JSON wire response.

mod commands;

use clap::{Parser, Subcommand};
use rfm_core::{Config, RfmError, RfmResult};
use rfm_manager::FileManager;
use rfm_providers::ProviderSet;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG: &str = "rfm.toml";

#[derive(Parser)]
#[command(name = "rfm")]
#[command(author, version, about = "RichFilemanager storage core", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (defaults to ./rfm.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose logging on stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the policy summary shared with clients
    Initiate,

    /// List a folder
    #[command(name = "getfolder", alias = "ls")]
    GetFolder {
        #[arg(default_value = "/")]
        path: String,

        /// Render a table instead of JSON
        #[arg(short, long)]
        table: bool,
    },

    /// Show one file
    #[command(name = "getfile")]
    GetFile { path: String },

    /// Show one file with its text content
    #[command(name = "editfile")]
    EditFile { path: String },

    /// Overwrite a file with the content of a local file
    #[command(name = "savefile")]
    SaveFile { path: String, from: PathBuf },

    /// Create a folder
    #[command(name = "addfolder", alias = "mkdir")]
    AddFolder { path: String, name: String },

    /// Rename in place
    Rename { old: String, new_name: String },

    /// Move into another folder
    #[command(alias = "mv")]
    Move { old: String, target: String },

    /// Copy into another folder
    #[command(alias = "cp")]
    Copy { source: String, target: String },

    /// Delete a file or folder
    #[command(alias = "rm")]
    Delete { path: String },

    /// Upload a local file into a folder
    Upload {
        folder: String,
        file: PathBuf,

        /// Stored name (defaults to the local file name)
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Replace an existing file with a local file
    Replace { path: String, file: PathBuf },

    /// Save a file, or a folder as ZIP, to the local disk
    Download {
        path: String,

        /// Output file (defaults to the stored name)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Save an image or its thumbnail to the local disk
    #[command(name = "getimage")]
    GetImage {
        path: String,

        #[arg(short, long)]
        thumbnail: bool,

        #[arg(short, long)]
        output: PathBuf,
    },

    /// Write file bytes to stdout
    #[command(name = "readfile", alias = "cat")]
    ReadFile {
        path: String,

        /// HTTP range, e.g. `bytes=0-99`
        #[arg(short, long)]
        range: Option<String>,
    },

    /// Total size and item counts below the root
    Summarize {
        /// Human-readable sizes instead of JSON
        #[arg(short = 'H', long)]
        human: bool,
    },

    /// Unpack a ZIP archive into a folder
    Extract { source: String, target: String },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => return commands::fail(&e),
    };
    init_logging(&config, cli.verbose);

    let result = match build_manager(config) {
        Ok(manager) => run(&manager, cli.command).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => commands::fail(&e),
    }
}

async fn run(manager: &FileManager, command: Commands) -> RfmResult<()> {
    match command {
        Commands::Initiate => commands::print_json(&manager.initiate()),
        Commands::GetFolder { path, table } => commands::get_folder(manager, &path, table).await,
        Commands::GetFile { path } => commands::print_json(&manager.get_file(&path).await?),
        Commands::EditFile { path } => commands::print_json(&manager.edit_file(&path).await?),
        Commands::SaveFile { path, from } => commands::save_file(manager, &path, &from).await,
        Commands::AddFolder { path, name } => {
            commands::print_json(&manager.add_folder(&path, &name).await?)
        }
        Commands::Rename { old, new_name } => {
            commands::print_json(&manager.rename(&old, &new_name).await?)
        }
        Commands::Move { old, target } => {
            commands::print_json(&manager.move_item(&old, &target).await?)
        }
        Commands::Copy { source, target } => {
            commands::print_json(&manager.copy(&source, &target).await?)
        }
        Commands::Delete { path } => commands::print_json(&manager.delete(&path).await?),
        Commands::Upload { folder, file, name } => {
            commands::upload(manager, &folder, &file, name.as_deref()).await
        }
        Commands::Replace { path, file } => commands::replace(manager, &path, &file).await,
        Commands::Download { path, output } => {
            commands::download(manager, &path, output.as_deref()).await
        }
        Commands::GetImage { path, thumbnail, output } => {
            commands::get_image(manager, &path, thumbnail, &output).await
        }
        Commands::ReadFile { path, range } => {
            commands::read_file(manager, &path, range.as_deref()).await
        }
        Commands::Summarize { human } => commands::summarize(manager, human).await,
        Commands::Extract { source, target } => {
            commands::print_json(&manager.extract(&source, &target).await?)
        }
    }
}

fn load_config(path: Option<&Path>) -> RfmResult<Config> {
    match path {
        Some(path) => Config::load(path),
        None if Path::new(DEFAULT_CONFIG).exists() => Config::load(Path::new(DEFAULT_CONFIG)),
        None => Ok(Config::default()),
    }
}

/// Log to stderr; `RUST_LOG` wins over the configured level.
fn init_logging(config: &Config, verbose: bool) {
    let level = if verbose { "debug" } else { config.logging.level.as_str() };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn build_manager(config: Config) -> RfmResult<FileManager> {
    let providers = ProviderSet::from_config(&config)?;
    if config.storage.backend == rfm_core::config::BackendKind::Local
        && !config.local.root.is_dir()
    {
        return Err(RfmError::Config(format!(
            "local.root {} is not a directory",
            config.local.root.display()
        )));
    }
    FileManager::new(config, providers)
}
