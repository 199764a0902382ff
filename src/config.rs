use anyhow::{Context, Result};
use clap::Parser;
use dialoguer::{Confirm, Input, Password};
use reqwest::Url;
use std::io::Write;
use std::path::PathBuf;

use crate::auth::Credentials;
use crate::cache::DEFAULT_AWAY_CACHE_TTL;
use crate::http_client::DEFAULT_API_URL;

/// Netatmo Away - away-mode switch bridge for Netatmo Energy
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Server host address
    #[arg(short = 'H', long, env = "SERVER_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Server port
    #[arg(short, long, env = "SERVER_PORT", default_value = "8000")]
    pub port: u16,

    /// API key protecting the bridge endpoints
    #[arg(short = 'k', long, env = "BRIDGE_API_KEY")]
    pub api_key: Option<String>,

    /// Netatmo app client id
    #[arg(long, env = "NETATMO_CLIENT_ID")]
    pub client_id: Option<String>,

    /// Netatmo app client secret
    #[arg(long, env = "NETATMO_CLIENT_SECRET")]
    pub client_secret: Option<String>,

    /// Netatmo refresh token
    #[arg(long, env = "NETATMO_REFRESH_TOKEN")]
    pub refresh_token: Option<String>,

    /// Netatmo home id
    #[arg(long, env = "NETATMO_HOME_ID")]
    pub home_id: Option<String>,

    /// File where rotated refresh tokens are stored
    #[arg(short = 't', long, env = "NETATMO_TOKEN_FILE")]
    pub token_file: Option<String>,

    /// Netatmo API base URL
    #[arg(long, env = "NETATMO_API_URL", default_value = DEFAULT_API_URL)]
    pub api_url: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log output format (text, json)
    #[arg(long, env = "LOG_FORMAT", default_value = "text")]
    pub log_format: String,

    /// Away-mode cache TTL in seconds
    #[arg(long, env = "AWAY_CACHE_TTL", default_value_t = DEFAULT_AWAY_CACHE_TTL)]
    pub cache_ttl: u64,

    /// HTTP request timeout in seconds
    #[arg(long, env = "HTTP_REQUEST_TIMEOUT", default_value = "30")]
    pub http_timeout: u64,
}

#[derive(Clone, Debug)]
pub struct Config {
    // Server settings
    pub server_host: String,
    pub server_port: u16,

    // Authentication
    pub bridge_api_key: String,

    // Netatmo
    pub credentials: Credentials,
    pub home_id: String,
    pub api_url: Url,
    pub token_file: Option<PathBuf>,

    // Cache
    pub away_cache_ttl: u64,

    // HTTP client
    pub http_connect_timeout: u64,
    pub http_request_timeout: u64,

    // Logging
    pub log_level: String,
    pub log_format: LogFormat,
}

#[derive(Clone, Debug, PartialEq)]
pub enum LogFormat {
    Text,
    Json,
}

impl Config {
    /// Load configuration from all sources with priority: CLI > ENV > defaults
    pub fn load() -> Result<Self> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        let args = CliArgs::parse();
        Self::from_args(args)
    }

    /// Build configuration from parsed arguments
    pub fn from_args(args: CliArgs) -> Result<Self> {
        let token_file = args.token_file.as_deref().map(expand_tilde);

        // A rotated token stored by a previous run wins over the configured one
        let stored_refresh_token = match token_file {
            Some(ref path) => crate::auth::load_refresh_token(path)?,
            None => None,
        };

        let refresh_token = stored_refresh_token
            .or(args.refresh_token)
            .context("NETATMO_REFRESH_TOKEN is required (use --refresh-token or set NETATMO_REFRESH_TOKEN env var)")?;

        let config = Config {
            server_host: args.host,
            server_port: args.port,

            bridge_api_key: args
                .api_key
                .context("BRIDGE_API_KEY is required (use -k or set BRIDGE_API_KEY env var)")?,

            credentials: Credentials::new(
                args.client_id
                    .context("NETATMO_CLIENT_ID is required (use --client-id or set NETATMO_CLIENT_ID env var)")?,
                args.client_secret
                    .context("NETATMO_CLIENT_SECRET is required (use --client-secret or set NETATMO_CLIENT_SECRET env var)")?,
                refresh_token,
            ),

            home_id: args
                .home_id
                .context("NETATMO_HOME_ID is required (use --home-id or set NETATMO_HOME_ID env var)")?,

            api_url: Url::parse(&args.api_url)
                .with_context(|| format!("Invalid NETATMO_API_URL: {}", args.api_url))?,

            token_file,

            away_cache_ttl: args.cache_ttl,

            http_connect_timeout: std::env::var("HTTP_CONNECT_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(30),

            http_request_timeout: args.http_timeout,

            log_level: args.log_level,

            log_format: parse_log_format(&args.log_format),
        };

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("BRIDGE_API_KEY", &self.bridge_api_key),
            ("NETATMO_CLIENT_ID", &self.credentials.client_id),
            ("NETATMO_CLIENT_SECRET", &self.credentials.client_secret),
            ("NETATMO_REFRESH_TOKEN", &self.credentials.refresh_token),
            ("NETATMO_HOME_ID", &self.home_id),
        ];

        for (name, value) in required {
            if value.trim().is_empty() {
                anyhow::bail!("{} must not be empty", name);
            }
        }

        if !matches!(self.api_url.scheme(), "http" | "https") {
            anyhow::bail!("NETATMO_API_URL must be an http(s) URL: {}", self.api_url);
        }

        Ok(())
    }
}

/// Expand tilde (~) in file paths to user's home directory
fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// Parse log format from string
fn parse_log_format(s: &str) -> LogFormat {
    match s.to_lowercase().as_str() {
        "json" => LogFormat::Json,
        _ => LogFormat::Text,
    }
}


// === Interactive Setup ===

/// Check if interactive setup is needed (no .env file and missing required values)
pub fn needs_interactive_setup() -> bool {
    let env_file_exists = std::path::Path::new(".env").exists();

    let required = [
        "BRIDGE_API_KEY",
        "NETATMO_CLIENT_ID",
        "NETATMO_CLIENT_SECRET",
        "NETATMO_REFRESH_TOKEN",
        "NETATMO_HOME_ID",
    ];
    let missing = required.iter().any(|name| std::env::var(name).is_err());

    !env_file_exists && missing
}

/// Run interactive setup to collect required configuration
pub fn run_interactive_setup() -> Result<InteractiveConfig> {
    println!();
    println!("Netatmo Away - first time setup");
    println!();
    println!("No configuration found. Create an app on https://dev.netatmo.com");
    println!("with the read_thermostat and write_thermostat scopes, then enter its values.");
    println!();

    let client_id: String = Input::new()
        .with_prompt("Netatmo client id (NETATMO_CLIENT_ID)")
        .interact_text()
        .context("Failed to read NETATMO_CLIENT_ID")?;

    let client_secret: String = Password::new()
        .with_prompt("Netatmo client secret (NETATMO_CLIENT_SECRET)")
        .interact()
        .context("Failed to read NETATMO_CLIENT_SECRET")?;

    let refresh_token: String = Password::new()
        .with_prompt("Netatmo refresh token (NETATMO_REFRESH_TOKEN)")
        .interact()
        .context("Failed to read NETATMO_REFRESH_TOKEN")?;

    let home_id: String = Input::new()
        .with_prompt("Netatmo home id (NETATMO_HOME_ID)")
        .interact_text()
        .context("Failed to read NETATMO_HOME_ID")?;

    let bridge_api_key: String = Password::new()
        .with_prompt("Enter a password to protect the bridge (BRIDGE_API_KEY)")
        .interact()
        .context("Failed to read BRIDGE_API_KEY")?;

    for (name, value) in [
        ("NETATMO_CLIENT_ID", &client_id),
        ("NETATMO_CLIENT_SECRET", &client_secret),
        ("NETATMO_REFRESH_TOKEN", &refresh_token),
        ("NETATMO_HOME_ID", &home_id),
        ("BRIDGE_API_KEY", &bridge_api_key),
    ] {
        if value.trim().is_empty() {
            anyhow::bail!("{} cannot be empty", name);
        }
    }

    println!();
    let server_port: String = Input::new()
        .with_prompt("Server port")
        .default("8000".to_string())
        .interact_text()
        .context("Failed to read server port")?;

    let config = InteractiveConfig {
        client_id,
        client_secret,
        refresh_token,
        home_id,
        bridge_api_key,
        server_port,
    };

    println!();
    let save_to_env = Confirm::new()
        .with_prompt("Save configuration to .env file?")
        .default(true)
        .interact()
        .context("Failed to read save confirmation")?;

    if save_to_env {
        save_env_file(&config)?;
        println!();
        println!("Configuration saved to .env file");
    }

    println!();
    println!("Setup complete! Starting bridge...");
    println!();

    Ok(config)
}

/// Configuration collected from interactive setup
#[derive(Debug, Clone)]
pub struct InteractiveConfig {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
    pub home_id: String,
    pub bridge_api_key: String,
    pub server_port: String,
}

/// Save configuration to .env file
fn save_env_file(config: &InteractiveConfig) -> Result<()> {
    let env_content = format!(
        r#"# Netatmo Away Configuration
# Generated by interactive setup

# Netatmo app credentials (required)
NETATMO_CLIENT_ID={}
NETATMO_CLIENT_SECRET={}
NETATMO_REFRESH_TOKEN={}

# Netatmo home to control (required)
NETATMO_HOME_ID={}

# Rotated refresh tokens are stored here
NETATMO_TOKEN_FILE=~/.config/netatmo-away/refresh_token

# Password to protect the bridge (required)
BRIDGE_API_KEY={}

# Server settings
SERVER_HOST=0.0.0.0
SERVER_PORT={}

# Logging (trace, debug, info, warn, error)
LOG_LEVEL=info
"#,
        config.client_id,
        config.client_secret,
        config.refresh_token,
        config.home_id,
        config.bridge_api_key,
        config.server_port,
    );

    let mut file = std::fs::File::create(".env").context("Failed to create .env file")?;
    file.write_all(env_content.as_bytes())
        .context("Failed to write .env file")?;

    Ok(())
}
