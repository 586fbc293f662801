use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use counter::{AppConfig, ObjectCountRepository};

#[derive(Parser)]
#[command(name = "counter")]
#[command(about = "Count objects detected in images and keep running totals")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Detect objects and add them to the running totals
    Count {
        #[command(flatten)]
        input: ImageArgs,
    },
    /// Detect objects without updating any totals
    Detect {
        #[command(flatten)]
        input: ImageArgs,
    },
    /// Print the running totals
    Totals {
        /// Only these classes (all classes when empty)
        #[arg(value_name = "CLASS")]
        classes: Vec<String>,
    },
}

#[derive(clap::Args)]
struct ImageArgs {
    /// Path to input image file
    #[arg(value_name = "IMAGE")]
    image_path: PathBuf,

    /// Minimum score for a prediction to be counted
    #[arg(short, long, default_value_t = 0.5)]
    threshold: f32,

    /// Save annotated debug images to this directory
    #[arg(long, value_name = "DIR")]
    debug_out: Option<PathBuf>,
}

fn init_logging(verbose: bool) {
    let default = if verbose { "counter=debug" } else { "counter=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn read_image(args: &ImageArgs, config: &mut AppConfig) -> anyhow::Result<Vec<u8>> {
    if let Some(dir) = &args.debug_out {
        config.enable_debug_artifacts = true;
        config.debug_out_dir = dir.clone();
    }
    std::fs::read(&args.image_path)
        .with_context(|| format!("Failed to read image {}", args.image_path.display()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();
    init_logging(args.verbose);

    let mut config = AppConfig::from_env().context("Invalid configuration")?;
    tracing::debug!(?config, "Loaded configuration");

    let output = match args.command {
        Command::Count { input } => {
            let image = read_image(&input, &mut config)?;
            let action = config.count_action().await?;
            let response = action.execute(&image, input.threshold).await?;
            serde_json::to_string_pretty(&response)?
        }
        Command::Detect { input } => {
            let image = read_image(&input, &mut config)?;
            let action = config.detection_action()?;
            let predictions = action.execute(&image, input.threshold).await?;
            serde_json::to_string_pretty(&predictions)?
        }
        Command::Totals { classes } => {
            let repo = config.build_repository().await?;
            let wanted = (!classes.is_empty()).then_some(classes.as_slice());
            let totals = repo.read_values(wanted).await?;
            serde_json::to_string_pretty(&totals)?
        }
    };

    println!("{}", output);
    Ok(())
}
