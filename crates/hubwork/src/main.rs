//! Hubwork - entry point
//!
//! Loads settings, compiles the hub found in the application home and serves
//! it until SIGTERM or SIGINT.

use std::path::PathBuf;

use anyhow::Context;

use hubwork::config::{ConfigLoader, ENV_PREFIX};
use hubwork::Application;

const DEFAULT_CONFIG_FILE: &str = "hubwork.toml";

/// Command-line arguments.
struct Args {
    home: Option<PathBuf>,
    config: Option<PathBuf>,
}

impl Args {
    fn parse() -> anyhow::Result<Self> {
        let mut args = std::env::args().skip(1);
        let mut home = None;
        let mut config = None;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--home" => {
                    home = Some(args.next().map(PathBuf::from).context("--home needs a directory")?);
                }
                "--config" | "-c" => {
                    config = Some(args.next().map(PathBuf::from).context("--config needs a file")?);
                }
                "--help" | "-h" => {
                    print_help();
                    std::process::exit(0);
                }
                "--version" | "-v" => {
                    println!("hubwork {}", hubwork::VERSION);
                    std::process::exit(0);
                }
                other => anyhow::bail!("unknown argument: {other} (use --help for usage)"),
            }
        }

        Ok(Self { home, config })
    }
}

fn print_help() {
    println!(
        r"Hubwork - declarative request hub

USAGE:
    hubwork [OPTIONS]

OPTIONS:
        --home <DIR>       Application home holding hub.yaml and aggregates/
    -c, --config <PATH>    Settings file (TOML or JSON), default ./hubwork.toml if present
    -h, --help             Print help information
    -v, --version          Print version information

ENVIRONMENT VARIABLES:
    HUBWORK__SERVER__PUBLIC_ADDR          Public listener (default: 0.0.0.0:3531)
    HUBWORK__SERVER__PRIVATE_ADDR         Private listener (default: 127.0.0.1:3532)
    HUBWORK__TELEMETRY__LOGGING__LEVEL    Log filter (RUST_LOG wins)
    HUBWORK__TELEMETRY__TRACING__ENABLED  Export spans over OTLP (default: false)
    HUBWORK__APPLICATION__HOME            Application home
"
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse()?;

    let loader = ConfigLoader::new().with_dotenv();
    let loader = match &args.config {
        Some(path) => loader
            .with_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => loader.with_optional_file(DEFAULT_CONFIG_FILE)?,
    };
    let config = loader.with_env_prefix(ENV_PREFIX).load()?;

    let mut builder = Application::builder(config.application.name.clone()).config(config);
    if let Some(home) = args.home {
        builder = builder.home(home);
    }
    let application = builder.build().context("failed to build the hub")?;

    application.run().await?;
    Ok(())
}
