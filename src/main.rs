use std::path::PathBuf;
use std::process::ExitCode;

use alcove::{BuildError, Builder};
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "alcove")]
#[command(about = "Build widget bundles and test pages", long_about = None)]
#[command(version)]
struct Cli {
    /// Project directory
    #[arg(short, long, global = true, default_value = ".")]
    dir: PathBuf,

    /// Increase output verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile widgets and write one bundle per locale
    Build {
        /// Minify and gzip every bundle
        #[arg(long)]
        finalize: bool,
        /// Only rebuild when sources are newer than the output
        #[arg(long)]
        if_stale: bool,
    },
    /// Remove and recreate the output directory
    Clean,
    /// Build and write the test pages of one widget
    Test {
        /// Dotted widget name, e.g. Example.HelloWorld
        widget: String,
    },
    /// Create a new project directory
    New { name: String },
    /// Report whether the output is up to date
    Status,
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .without_time()
        .with_target(false)
        .init();
}

fn run(cli: Cli) -> Result<(), BuildError> {
    let builder = Builder::load(&cli.dir)?;
    match cli.command {
        Commands::Build { finalize, if_stale } => {
            if if_stale {
                if !builder.rebuild_if_stale()? {
                    info!("output is up to date");
                }
            } else {
                builder.build(finalize)?;
            }
        }
        Commands::Clean => builder.clean()?,
        Commands::Test { widget } => {
            let dir = builder.build_test(&widget)?;
            info!("open {}", dir.join("index.html").display());
        }
        Commands::New { name } => {
            builder.new_app(&name)?;
        }
        Commands::Status => {
            if builder.is_up_to_date()? {
                info!("up to date");
            } else {
                info!("stale");
            }
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
