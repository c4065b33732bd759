//! CLI argument parsing, validation, and startup helpers.

use std::net::IpAddr;

use clap::Parser;
use tracing::{error, info};

use crate::ServerConfig;
use crate::db::Database;

const MIN_JWT_SECRET_LENGTH: usize = 32;

#[derive(clap::ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

/// Proxy header carrying the client address.
#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClientIpHeader {
    #[value(name = "x-forwarded-for")]
    XForwardedFor,
    #[value(name = "x-real-ip")]
    XRealIp,
    #[value(name = "cf-connecting-ip")]
    CfConnectingIp,
}

impl ClientIpHeader {
    fn header_name(self) -> &'static str {
        match self {
            Self::XForwardedFor => "x-forwarded-for",
            Self::XRealIp => "x-real-ip",
            Self::CfConnectingIp => "cf-connecting-ip",
        }
    }
}

/// Reads the client address from a proxy header instead of the socket.
#[derive(Clone, Debug)]
pub struct IpExtractor {
    pub header_name: &'static str,
}

impl IpExtractor {
    /// Parse a header value. Lists take their first (client-most) entry.
    pub fn extract(&self, header_value: &str) -> Result<String, &'static str> {
        let first = header_value
            .split(',')
            .next()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or("IP header is empty")?;

        first
            .parse::<IpAddr>()
            .map(|ip| ip.to_string())
            .map_err(|_| "IP header does not contain a valid address")
    }
}

impl From<ClientIpHeader> for IpExtractor {
    fn from(header: ClientIpHeader) -> Self {
        Self {
            header_name: header.header_name(),
        }
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "tokengate",
    about = "Password login with short-lived access tokens and refresh-token renewal"
)]
pub struct Args {
    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value = "8080")]
    pub port: u16,

    /// Path to SQLite database file
    #[arg(short, long, env = "DATABASE_PATH", default_value = "tokengate.db")]
    pub database: String,

    /// Path to file containing JWT secret. Prefer using JWT_SECRET env var instead
    #[arg(long)]
    pub jwt_secret_file: Option<String>,

    /// Set the Secure flag on session cookies (enable when served over HTTPS)
    #[arg(long)]
    pub secure_cookies: bool,

    /// Take the client address from this proxy header instead of the socket
    #[arg(long, value_enum)]
    pub ip_header: Option<ClientIpHeader>,

    /// Replace the refresh token every time it is used to renew a session
    #[arg(long)]
    pub rotate_refresh_tokens: bool,

    /// Log output format
    #[arg(short, long, default_value = "pretty")]
    pub log_format: LogFormat,
}

/// Initialize logging based on the specified format.
pub fn init_logging(format: &LogFormat) {
    match format {
        LogFormat::Pretty => tracing_subscriber::fmt::init(),
        LogFormat::Json => tracing_subscriber::fmt().json().init(),
        LogFormat::Compact => tracing_subscriber::fmt().compact().init(),
    }
}

/// Load JWT secret from environment variable or file.
/// Returns None and logs an error if the secret cannot be loaded.
pub fn load_jwt_secret(jwt_secret_file: Option<&str>) -> Option<String> {
    let secret = if let Ok(secret) = std::env::var("JWT_SECRET") {
        // SAFETY: called from main before the runtime spawns any other task,
        // and nothing else reads this variable.
        unsafe { std::env::remove_var("JWT_SECRET") };
        secret
    } else if let Some(path) = jwt_secret_file {
        match std::fs::read_to_string(path) {
            Ok(content) => content.trim().to_string(),
            Err(e) => {
                error!(path = %path, error = %e, "Failed to read JWT secret file");
                return None;
            }
        }
    } else {
        error!(
            "JWT secret is required. Set JWT_SECRET environment variable (recommended) or use --jwt-secret-file"
        );
        return None;
    };

    validate_jwt_secret(secret)
}

fn validate_jwt_secret(secret: String) -> Option<String> {
    if secret.len() < MIN_JWT_SECRET_LENGTH {
        error!(
            "JWT secret is shorter than {} characters. Use a longer secret",
            MIN_JWT_SECRET_LENGTH
        );
        return None;
    }

    Some(secret)
}

/// Build ServerConfig from validated arguments.
pub fn build_config(args: &Args, db: Database, jwt_secret: String) -> ServerConfig {
    ServerConfig {
        db,
        jwt_secret: jwt_secret.into_bytes(),
        secure_cookies: args.secure_cookies,
        ip_extractor: args.ip_header.map(IpExtractor::from),
        rotate_refresh_tokens: args.rotate_refresh_tokens,
    }
}

/// Open the database, logging errors if it fails.
pub async fn open_database(path: &str) -> Option<Database> {
    match Database::open(path).await {
        Ok(db) => {
            info!(path = %path, "Database opened");
            Some(db)
        }
        Err(e) => {
            error!(path = %path, error = %e, "Failed to open database");
            None
        }
    }
}
