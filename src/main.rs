use clap::Parser;
use std::path::PathBuf;
use wa_gateway::engine::whatsapp::load_config;

#[derive(Parser, Debug)]
#[command(name = "wa-gateway")]
#[command(about = "Single-account WhatsApp HTTP gateway over Evolution API")]
#[command(version)]
struct Cli {
    /// TOML config file
    #[arg(long, env = "WA_GATEWAY_CONFIG")]
    config: Option<PathBuf>,

    /// HTTP port (overrides the config file)
    #[arg(long, env = "PORT")]
    port: Option<u16>,

    /// Evolution API base URL
    #[arg(long, env = "EVOLUTION_API_URL")]
    evolution_url: Option<String>,

    /// Evolution API global key
    #[arg(long, env = "EVOLUTION_API_KEY", hide_env_values = true)]
    evolution_key: Option<String>,

    /// Evolution instance name
    #[arg(long, env = "EVOLUTION_INSTANCE")]
    instance: Option<String>,

    /// Exit if the transport fails to initialize
    #[arg(long)]
    exit_on_init_failure: bool,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let mut config = match load_config(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            log::error!("[gateway] {}", e);
            std::process::exit(2);
        }
    };
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(url) = cli.evolution_url {
        config.evolution.api_url = url;
    }
    if let Some(key) = cli.evolution_key {
        config.evolution.api_key = key;
    }
    if let Some(instance) = cli.instance {
        config.evolution.instance_name = instance;
    }

    if let Err(e) = wa_gateway::run(config, cli.exit_on_init_failure).await {
        log::error!("[gateway] Fatal: {}", e);
        std::process::exit(1);
    }
}
