use clap::{Parser, Subcommand};
use concierge::properties::{AirtableClient, Property, PropertyPatch};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "concierge")]
#[command(about = "Concierge CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Create the configuration directory and a template config with empty secrets.
    Init {
        /// Config file path (default: CONCIERGE_CONFIG_PATH or ~/.concierge/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Load and validate the configuration (file + environment) without starting anything.
    CheckConfig {
        /// Config file path (default: CONCIERGE_CONFIG_PATH or ~/.concierge/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Run the webhook relay.
    Serve {
        /// Config file path (default: CONCIERGE_CONFIG_PATH or ~/.concierge/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// HTTP port (default from config or 8787)
        #[arg(long, short)]
        port: Option<u16>,
    },

    /// Manage property records in the context store.
    Properties {
        /// Config file path (default: CONCIERGE_CONFIG_PATH or ~/.concierge/config.json)
        #[arg(long, short, value_name = "PATH", global = true)]
        config: Option<PathBuf>,

        #[command(subcommand)]
        action: PropertyAction,
    },
}

#[derive(Subcommand)]
enum PropertyAction {
    /// Print all properties as JSON.
    List,
    /// Create a property from a JSON file (camelCase fields, id ignored).
    Create {
        #[arg(long, value_name = "FILE")]
        file: PathBuf,
    },
    /// Update a property from a JSON patch file (only the fields present are changed).
    Update {
        id: String,
        #[arg(long, value_name = "FILE")]
        file: PathBuf,
    },
    /// Delete a property.
    Delete { id: String },
}

#[tokio::main]
async fn main() {
    let dotenv = dotenvy::dotenv();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    if let Some(problem) = dotenv_problem(&dotenv) {
        log::warn!("{}", problem);
    }

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("concierge {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Init { config }) => {
            if let Err(e) = run_init(config) {
                log::error!("init failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::CheckConfig { config }) => match concierge::config::load_settings(config) {
            Ok((settings, path)) => {
                println!(
                    "configuration ok ({}): webhook {}:{}{}, model {}, table {}",
                    path.display(),
                    settings.gateway.bind,
                    settings.gateway.port,
                    settings.gateway.path,
                    settings.openai.model,
                    settings.airtable.table
                );
            }
            Err(e) => {
                log::error!("{:#}", e);
                eprintln!("{:#}", e);
                std::process::exit(1);
            }
        },
        Some(Commands::Serve { config, port }) => {
            if let Err(e) = run_serve(config, port).await {
                log::error!("serve failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Properties { config, action }) => {
            if let Err(e) = run_properties(config, action).await {
                log::error!("properties failed: {:#}", e);
                eprintln!("{:#}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

/// A missing .env is fine; variables may come from the real environment. Anything else is
/// reported.
fn dotenv_problem(result: &Result<PathBuf, dotenvy::Error>) -> Option<String> {
    match result {
        Ok(_) => None,
        Err(dotenvy::Error::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => Some(format!("ignoring .env: {}", e)),
    }
}

fn run_init(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let path = config_path.unwrap_or_else(concierge::config::default_config_path);
    let dir = concierge::init::init_config_dir(&path)?;
    println!("initialized configuration at {}", dir.display());
    Ok(())
}

async fn run_serve(config_path: Option<PathBuf>, port: Option<u16>) -> anyhow::Result<()> {
    let (mut settings, _) = concierge::config::load_settings(config_path)?;
    if let Some(p) = port {
        settings.gateway.port = p;
    }
    log::info!(
        "starting relay on {}:{}",
        settings.gateway.bind,
        settings.gateway.port
    );
    concierge::gateway::run_gateway(settings).await
}

fn read_json<T: serde::de::DeserializeOwned>(file: &Path) -> anyhow::Result<T> {
    use anyhow::Context;
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("reading {}", file.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", file.display()))
}

async fn run_properties(config_path: Option<PathBuf>, action: PropertyAction) -> anyhow::Result<()> {
    let (settings, _) = concierge::config::load_airtable_settings(config_path)?;
    let store = AirtableClient::new(&settings)?;
    match action {
        PropertyAction::List => {
            let properties = store.list_properties().await?;
            println!("{}", serde_json::to_string_pretty(&properties)?);
        }
        PropertyAction::Create { file } => {
            let draft: Property = read_json(&file)?;
            let created = store.create_property(&draft).await?;
            println!("{}", serde_json::to_string_pretty(&created)?);
        }
        PropertyAction::Update { id, file } => {
            let patch: PropertyPatch = read_json(&file)?;
            let updated = store.update_property(&id, &patch).await?;
            println!("{}", serde_json::to_string_pretty(&updated)?);
        }
        PropertyAction::Delete { id } => {
            store.delete_property(&id).await?;
            println!("deleted {}", id);
        }
    }
    Ok(())
}
