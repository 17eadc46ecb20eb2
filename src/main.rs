use clap::{Parser, Subcommand};
use ride_assets::config::{self, AppConfig};
use ride_assets::output;
use ride_assets::pipeline::{Pipeline, TriggerPayload};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

fn version_string() -> &'static str {
    let on_tag = env!("ON_RELEASE_TAG");
    if on_tag == "true" {
        env!("CARGO_PKG_VERSION")
    } else {
        let hash = env!("GIT_HASH");
        if hash.is_empty() {
            "dev@unknown"
        } else {
            // Leaked once at startup
            Box::leak(format!("dev@{hash}").into_boxed_str())
        }
    }
}

#[derive(Parser)]
#[command(name = "ride-assets")]
#[command(about = "Image pipeline for ride photos and group map markers")]
#[command(long_about = "\
Image pipeline for ride photos and group map markers

Turns a finished upload in the staging bucket into published assets:

  ride photo   → {city}/rides/{id}/{id}_{width}w.webp
                 {city}/rides/{id}/{id}_optimized.webp   (largest width)
  group marker → {city}/groups/{key}/marker.png
                 sprites/{city}/markers.png + markers.json

Uploads are found by UUID under any of the known image extensions.

Run 'ride-assets gen-config' to generate a documented config.toml.")]
#[command(version = version_string())]
struct Cli {
    /// Config file (missing file = stock defaults)
    #[arg(long, default_value = "config.toml", global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

/// Trigger fields, given individually or as the JSON body.
#[derive(clap::Args)]
struct TriggerArgs {
    /// Full trigger as JSON: {"imageUUID","cityCode","entityID","entityType"}
    #[arg(long, conflicts_with_all = ["image_uuid", "city", "entity_id", "entity_type"])]
    payload: Option<String>,

    #[arg(long)]
    image_uuid: Option<String>,

    #[arg(long)]
    city: Option<String>,

    #[arg(long)]
    entity_id: Option<String>,

    /// "ride" or "group"
    #[arg(long)]
    entity_type: Option<String>,
}

impl TriggerArgs {
    fn into_payload(self) -> Result<TriggerPayload, serde_json::Error> {
        match self.payload {
            Some(json) => serde_json::from_str(&json),
            None => Ok(TriggerPayload {
                image_uuid: self.image_uuid.unwrap_or_default(),
                city_code: self.city.unwrap_or_default(),
                entity_id: self.entity_id.unwrap_or_default(),
                entity_type: self.entity_type.unwrap_or_default(),
            }),
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Process one staged upload and print the JSON response
    Optimize(TriggerArgs),
    /// Rebuild a city's spritesheet from stored markers
    Rebuild {
        #[arg(long)]
        city: String,
    },
    /// Print a stock config.toml with all options documented
    GenConfig,
    /// Load and validate the config file
    CheckConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
        Command::CheckConfig => {
            let app_config = config::load_config(&cli.config)?;
            output::print_config_summary(&app_config);
        }
        Command::Optimize(args) => {
            let app_config = config::load_config(&cli.config)?;
            let payload = args.into_payload()?;
            let response = runtime(&app_config)?.block_on(async {
                let pipeline = Pipeline::connect(&app_config).await?;
                Ok::<_, Box<dyn std::error::Error>>(pipeline.handle(&payload).await)
            })?;
            output::print_response(&response);
            if !response.success {
                std::process::exit(1);
            }
        }
        Command::Rebuild { city } => {
            let app_config = config::load_config(&cli.config)?;
            let report = runtime(&app_config)?.block_on(async {
                let pipeline = Pipeline::connect(&app_config).await?;
                Ok::<_, Box<dyn std::error::Error>>(pipeline.sprites().rebuild(&city).await?)
            })?;
            output::print_sheet_report(&report);
        }
    }

    Ok(())
}

/// Log to stderr; `RUST_LOG` overrides the default `info` level.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Build the async runtime and size the rayon pool used for encodes.
///
/// Caps at the number of available CPU cores; the config can constrain down, not up.
fn runtime(app_config: &AppConfig) -> std::io::Result<tokio::runtime::Runtime> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(config::effective_threads(&app_config.processing))
        .build_global()
        .ok();
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
}
