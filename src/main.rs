use args::{parse_args, Args};
use deploy_hook::{
    config::{Config, ConfigError},
    deploy::DeployCoordinator,
    remote::bitbucket::BitbucketConnector,
    start::{start, StartError},
    triggers::{http::HttpTrigger, once::OnceTrigger, signal::SignalTrigger, Trigger},
};
use log::{debug, info, warn};
use logger::init_logger;
use std::{env, path::PathBuf, process};
use thiserror::Error;

mod args;
mod logger;

/// The errors that stop the program before (or instead of) deploying.
#[derive(Debug, Error)]
pub enum MainError {
    #[error("Cannot load the configuration: {0}")]
    InvalidConfig(#[from] ConfigError),
    #[error("Cannot open log file {0}: {1}")]
    FailedLogFile(String, std::io::Error),
    #[error("Cannot set up logging: {0}")]
    FailedLogger(#[from] log::SetLoggerError),
    #[error("Cannot determine the local timezone for logging.")]
    FailedLoggerTimezones,
    #[error("Cannot determine the current directory: {0}")]
    NoCurrentDirectory(std::io::Error),
    #[error("{0}")]
    FailedStart(#[from] StartError),
}

fn load_config(args: &Args) -> Result<Config, MainError> {
    match Config::locate(args.config.as_deref()) {
        Some(path) => Ok(Config::load(&path)?),
        None => Ok(Config::default()),
    }
}

fn run(args: Args) -> Result<(), MainError> {
    let config = load_config(&args)?;
    init_logger(&args, config.debug || args.debug)?;
    if config.user.is_empty() {
        warn!("There are no credentials configured, only public repositories can be deployed.");
    }

    let base_dir = match &args.directory {
        Some(directory) => PathBuf::from(directory),
        None => env::current_dir().map_err(MainError::NoCurrentDirectory)?,
    };
    info!("Deploying branches into {}.", base_dir.display());

    // Setup triggers.
    let mut triggers: Vec<Box<dyn Trigger>> = vec![];
    if let Some(payload) = args.payload {
        triggers.push(Box::new(OnceTrigger::new(payload)));
    } else if let Some(http) = args.http {
        triggers.push(Box::new(HttpTrigger::new(http)));
        triggers.push(Box::new(SignalTrigger::new()));
    }

    let connector = BitbucketConnector::new(&config);
    let coordinator = DeployCoordinator::new(config, base_dir, Box::new(connector));

    debug!("Starting triggers.");
    start(triggers, &coordinator)?;

    Ok(())
}

fn main() {
    let args = parse_args();
    if args.version {
        println!("{}", env!("CARGO_PKG_VERSION"));
        return;
    }

    if let Err(err) = run(args) {
        eprintln!("{err}");
        process::exit(1);
    }
}
