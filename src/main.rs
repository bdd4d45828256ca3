// SPDX-License-Identifier: GPL-3.0-only

use clap::{Args, Parser, Subcommand};
use scanner::backends::camera::CameraBackendType;
use scanner::backends::permission::PermissionProvider;
use scanner::config::Config;
use scanner::constants::exit_codes;
use scanner::i18n;
use scanner::launcher::{CameraSource, SessionFactory};
use scanner::scanner::SelectionPolicy;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Mutex;
use tracing::error;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

mod cli;

#[derive(Parser)]
#[command(name = "scanner")]
#[command(about = "Scan barcodes with the camera")]
#[command(version = env!("GIT_VERSION"))]
#[command(subcommand_required = false)]
struct Cli {
    #[command(flatten)]
    source: SourceArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Options that override the saved config for this run
#[derive(Args, Debug, Clone)]
struct SourceArgs {
    /// Replay image files instead of opening a camera (repeatable)
    #[arg(long = "image", global = true)]
    images: Vec<PathBuf>,

    /// Camera device path (from 'scanner list')
    #[arg(long, global = true)]
    camera: Option<String>,

    /// Camera backend
    #[arg(long, global = true, value_enum)]
    backend: Option<CameraBackendType>,

    /// Which barcode wins when a frame holds several
    #[arg(long, global = true, value_enum)]
    policy: Option<SelectionPolicy>,

    /// Camera permission provider
    #[arg(long, global = true, value_enum)]
    permission: Option<PermissionProvider>,
}

impl SourceArgs {
    fn apply(&self, config: &mut Config) {
        if let Some(camera) = &self.camera {
            config.camera_path = Some(camera.clone());
        }
        if let Some(backend) = self.backend {
            config.backend = backend;
        }
        if let Some(policy) = self.policy {
            config.selection_policy = policy;
        }
        if let Some(permission) = self.permission {
            config.permission = permission;
        }
    }
}

#[derive(Subcommand, Debug, Clone)]
enum Commands {
    /// Run the terminal launcher (default)
    Terminal,

    /// Run one scan and print the reply as JSON
    Scan,

    /// List available cameras
    List,

    /// Decode barcodes in image files
    Decode {
        /// Image files to decode
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Commands::Terminal);

    // RUST_LOG controls the level, e.g. RUST_LOG=scanner=debug
    init_logging(matches!(command, Commands::Terminal));

    let requested_languages = i18n_embed::DesktopLanguageRequester::requested_languages();
    i18n::init(&requested_languages);

    let mut config = Config::load_or_default();
    cli.source.apply(&mut config);
    let factory = SessionFactory::new(config, CameraSource::from_images(cli.source.images));

    let outcome = match command {
        Commands::Terminal => scanner::terminal::run(factory).map(|()| ExitCode::SUCCESS),
        Commands::Scan => cli::scan(factory),
        Commands::List => cli::list_cameras(&factory),
        Commands::Decode { paths } => cli::decode_images(&factory, &paths),
    };

    outcome.unwrap_or_else(|e| {
        error!(error = %e, "Command failed");
        eprintln!("Error: {}", e);
        ExitCode::from(exit_codes::ERROR)
    })
}

/// Log to stderr, or to a file while the terminal UI owns the screen
fn init_logging(terminal_ui: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let writer = if terminal_ui {
        match open_log_file() {
            Some(file) => BoxMakeWriter::new(Mutex::new(file)),
            None => BoxMakeWriter::new(std::io::sink),
        }
    } else {
        BoxMakeWriter::new(std::io::stderr)
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(!terminal_ui)
        .with_target(true)
        .with_level(true)
        .init();
}

fn open_log_file() -> Option<std::fs::File> {
    let dir = dirs::cache_dir()?.join("scanner");
    std::fs::create_dir_all(&dir).ok()?;
    std::fs::File::create(dir.join("terminal.log")).ok()
}
