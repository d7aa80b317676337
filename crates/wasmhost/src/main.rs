//! wasmhost - entry point

use std::path::PathBuf;

use tracing::{error, info};

use wasmhost::config::TelemetrySettings;
use wasmhost::logging::init_logging;
use wasmhost::{HostConfig, HostResult, HostServer};

/// Command-line arguments.
struct Args {
    /// Path to configuration file.
    config: Option<PathBuf>,
}

impl Args {
    fn parse() -> Self {
        let mut args = std::env::args().skip(1);
        let mut config = None;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" | "-c" => {
                    config = args.next().map(PathBuf::from);
                }
                "--help" | "-h" => {
                    print_help();
                    std::process::exit(0);
                }
                "--version" | "-v" => {
                    println!("wasmhost {}", wasmhost::VERSION);
                    std::process::exit(0);
                }
                other => {
                    eprintln!("Unknown argument: {other}");
                    eprintln!("Use --help for usage information");
                    std::process::exit(1);
                }
            }
        }

        Self { config }
    }
}

fn print_help() {
    println!(
        r"wasmhost - static host for WebAssembly game builds

USAGE:
    wasmhost [OPTIONS]

OPTIONS:
    -c, --config <PATH>    Path to configuration file (TOML or JSON)
    -h, --help             Print help information
    -v, --version          Print version information

ENVIRONMENT VARIABLES:
    PORT                              Listen port (default: 1234)
    WASMHOST_LISTEN_PORT              Listen port, wins over PORT
    WASMHOST_LISTEN_ADDR              Listen address (default: 0.0.0.0)
    WASMHOST_STATIC_ROOT              Directory to serve (default: public)
    WASMHOST_CORS                     Send Access-Control-Allow-Origin (default: true)
    WASMHOST_EXTENDED_CORS            Also send allowed methods/headers (default: false)
    WASMHOST_CROSS_ORIGIN_ISOLATION   Send COOP/COEP/CORP (default: true)
    WASMHOST_GEOIP_URL                Geo-IP base URL (default: https://ip-api.com/json)
    WASMHOST_GEOIP_TIMEOUT            Geo-IP timeout, e.g. 10s (default: 10s)
    WASMHOST_LOG_JSON                 Emit JSON log lines (default: false)
    RUST_LOG                          Log filter (default: wasmhost=info,warn)

EXAMPLES:
    # Serve ./public on port 1234
    wasmhost

    # Serve an Unreal export on port 8080
    PORT=8080 WASMHOST_STATIC_ROOT=./Binaries/HTML5 wasmhost
"
    );
}

fn load_config(path: Option<PathBuf>) -> HostResult<HostConfig> {
    let config = match path {
        Some(path) => HostConfig::from_file(&path)?,
        None => HostConfig::default(),
    };
    let config = config.with_env_overrides();
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let config = match load_config(args.config.clone()) {
        Ok(config) => config,
        Err(e) => {
            let _ = init_logging(&TelemetrySettings::default());
            error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = init_logging(&config.telemetry) {
        eprintln!("{e}");
        std::process::exit(1);
    }

    if let Some(path) = &args.config {
        info!("Loaded configuration from {:?}", path);
    }
    info!("Starting wasmhost v{}", wasmhost::VERSION);

    let server = match HostServer::new(config) {
        Ok(server) => server,
        Err(e) => {
            error!("Failed to create server: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = server.run().await {
        error!("Server error: {}", e);
        std::process::exit(1);
    }
}
