use clap::{Parser, ValueEnum};
use log::{error, info};
use ruche::configuration::Config;
use ruche::controller::Controller;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for log::LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

#[derive(Parser)]
#[command(name = "ruche")]
#[command(version)]
#[command(about = "Low-interaction honeypot agent for SSH, Telnet, HTTP and VNC")]
struct Args {
    /// Agent configuration file
    #[arg(default_value = "ruche.toml")]
    config_file: PathBuf,

    /// Overrides RUST_LOG
    #[arg(long, value_enum, env = "RUCHE_LOG_LEVEL")]
    log_level: Option<LogLevel>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let mut logger = env_logger::Builder::from_default_env();
    logger.format_target(false);
    match args.log_level {
        Some(level) => logger.filter_level(level.into()),
        None if std::env::var_os("RUST_LOG").is_none() => logger.filter_level(log::LevelFilter::Info),
        None => &mut logger,
    };
    logger.init();

    println!(
        "
██████╗ ██╗   ██╗ ██████╗██╗  ██╗███████╗
██╔══██╗██║   ██║██╔════╝██║  ██║██╔════╝
██████╔╝██║   ██║██║     ███████║█████╗
██╔══██╗██║   ██║██║     ██╔══██║██╔══╝
██║  ██║╚██████╔╝╚██████╗██║  ██║███████╗
╚═╝  ╚═╝ ╚═════╝  ╚═════╝╚═╝  ╚═╝╚══════╝
=========================================
   Low-interaction honeypot agent v{}
=========================================
",
        env!("CARGO_PKG_VERSION")
    );

    info!("Importing configuration");
    let config = match Config::from_file(&args.config_file) {
        Ok(config) => config,
        Err(e) => {
            error!(
                "Unable to import configuration from {}: {}",
                args.config_file.display(),
                e
            );
            std::process::exit(1);
        }
    };
    info!("Configuration imported successfully");

    let mut controller = match Controller::new(config) {
        Ok(controller) => controller,
        Err(e) => {
            error!("Unable to create a controller instance: {}, exiting...", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = controller.run().await {
        error!("Error occurred in the controller process: {}, exiting...", e);
        std::process::exit(1);
    }
    info!("Bye");
}
