/// Gateway provisioning
use std::path::Path;
use clap::{Args, Parser, Subcommand};
use log::{debug, error, info};
use thiserror::Error;
use crate::config::Instance;

mod bundle;
mod compose;
mod config;
mod deployment;
mod docker;
mod host;
mod preflight;
mod provision;
mod vendor;
mod version;

/// Build and start the agent gateway container for a vendor instance.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Directory for the downloaded bundle and the generated deployment files.
    #[arg(long, default_value = ".", global = true)]
    workdir: String,

    /// Path to a TOML file overriding the built-in settings.
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(flatten)]
    instance: InstanceArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct InstanceArgs {
    /// Vendor instance name, as in https://<INSTANCE>.vendor.example.
    #[arg(long, env = "GATEWAY_INSTANCE", default_value = config::PLACEHOLDER_INSTANCE, global = true)]
    instance: String,

    /// Name the gateway registers under on the instance.
    #[arg(long, env = "GATEWAY_DISPLAY_NAME", default_value = config::PLACEHOLDER_DISPLAY_NAME, global = true)]
    display_name: String,

    /// Container and compose service name. Derived from the display name when omitted.
    #[arg(long, env = "GATEWAY_DEPLOYMENT_NAME", global = true)]
    deployment_name: Option<String>,

    /// Instance user the gateway authenticates as.
    #[arg(long, env = "GATEWAY_USERNAME", default_value = config::PLACEHOLDER_USERNAME, global = true)]
    username: String,

    /// Password of the instance user.
    #[arg(long, env = "GATEWAY_PASSWORD", default_value = config::PLACEHOLDER_PASSWORD,
          hide_env_values = true, hide_default_value = true, global = true)]
    password: String,
}

impl From<InstanceArgs> for Instance {
    fn from(args: InstanceArgs) -> Self {
        Instance::new(args.instance, args.display_name, args.deployment_name, args.username, args.password)
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Resolve the agent version, build its image and start the gateway container.
    /// Any deployment left by a previous run is stopped first.
    Provision {
        /// Expected SHA-256 checksum of the downloaded bundle, hex encoded.
        #[arg(long)]
        sha256: Option<String>,
    },
    /// Print the agent version the instance asks for and the matching bundle URL.
    Resolve,
    /// Stop the gateway container started by a previous run.
    Down,
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration file: {0}")]
    ConfigParse(#[from] config::Error),

    #[error("http client: {0}")]
    Vendor(#[from] vendor::Error),

    #[error("{0}")]
    Provision(#[from] provision::Error),
}

/// Read configuration file from disk and merge it with the
/// `default.toml` [built-in config](../default.toml).
///
/// If a configuration file name is not set explicitly, this function will
/// detect whether a config file with the default file name exists in the
/// working directory. If it does, it is used implicitly.
fn read_config(args: &Cli) -> Result<config::File, Error> {
    const DEFAULT_CONFIG_FILE: &str = "gateway.toml";

    let config_path = Path::new(&args.workdir).join(DEFAULT_CONFIG_FILE);

    let config_file = match &args.config {
        None => {
            if config_path.is_file() {
                Some(config_path.display().to_string())
            } else {
                None
            }
        }
        Some(c) => Some(c.clone()),
    };

    let cfg = if let Some(config_file) = config_file {
        info!("Reading configuration from {config_file}");
        config::File::default_with_user_config_file(&config_file)?
    } else {
        config::File::default()
    };
    debug!("Settings: {}", cfg.description.as_deref().unwrap_or("no description"));
    Ok(cfg)
}

#[tokio::main]
async fn main() {
    match run().await {
        Ok(_) => std::process::exit(0),
        Err(err) => {
            error!("fatal: {}", err.to_string());
            std::process::exit(1)
        }
    }
}

async fn run() -> Result<(), Error> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Cli::parse();
    let settings = read_config(&args)?;
    let workdir = Path::new(&args.workdir).to_path_buf();
    let instance: Instance = args.instance.into();

    let mut opts = provision::Options {
        workdir: &workdir,
        settings: &settings,
        instance: &instance,
        sha256: None,
    };

    match &args.command {
        Commands::Provision { sha256 } => {
            opts.sha256 = sha256.as_deref();
            let vendor = vendor::Client::new(&settings, &instance)?;
            let report = provision::provision(&host::System, &vendor, &opts).await?;
            info!(
                "Gateway {} is starting with agent version {} (image {})",
                instance.deployment_name, report.version, report.image
            );
            info!("Manage it with `{} -f {}`", report.compose, report.compose_file.display());
            info!("Open a shell in the container with {}", report.console_script.display());
            if !report.warnings.is_empty() {
                info!("{} leftover path(s) could not be removed, see warnings above", report.warnings.len());
            }
            Ok(())
        }
        Commands::Resolve => {
            let vendor = vendor::Client::new(&settings, &instance)?;
            let (version, url) = provision::resolve(&vendor, &opts).await?;
            println!("{version}");
            println!("{url}");
            Ok(())
        }
        Commands::Down => {
            if provision::down(&host::System, &opts)? {
                info!("Deployment {} stopped", instance.deployment_name);
            } else {
                info!("No deployment found in {}", workdir.display());
            }
            Ok(())
        }
    }
}
