//! Configuration types and constants for the chatterd server.

use std::path::PathBuf;

use clap::Parser;

/// How long an issued OTP stays valid (5 minutes).
pub(crate) const OTP_TTL_SECS: u64 = 300;
/// Lifetime of an issued bearer token (1 hour).
pub(crate) const TOKEN_TTL_SECS: u64 = 3600;

/// Chat backend server.
///
/// Provides OTP login, friend requests, direct messages over REST, and
/// real-time push over WebSocket. State is persisted in SQLite.
///
/// Configuration can be set via CLI arguments or environment variables.
/// CLI arguments take precedence over environment variables.
#[derive(Parser, Debug)]
#[command(name = "chatterd", version, about)]
pub struct Cli {
    /// HTTP server bind address [env: CHATTERD_BIND] [default: 127.0.0.1:3000]
    #[arg(long, short = 'b')]
    pub bind: Option<String>,

    /// Data directory for the database [env: CHATTERD_HOME] [default: ~/.chatterd]
    #[arg(long, short = 'd')]
    pub data_dir: Option<PathBuf>,

    /// Secret used to sign bearer tokens [env: CHATTERD_JWT_SECRET]
    #[arg(long)]
    pub jwt_secret: Option<String>,
}

pub struct Config {
    pub bind_addr: String,
    pub data_dir: PathBuf,
    pub jwt_secret: Option<String>,
}

impl Config {
    pub fn from_cli_and_env(cli: Cli) -> Self {
        let data_dir = cli
            .data_dir
            .or_else(|| std::env::var("CHATTERD_HOME").ok().map(PathBuf::from))
            .unwrap_or_else(|| {
                std::env::var("HOME")
                    .map(|h| PathBuf::from(h).join(".chatterd"))
                    .unwrap_or_else(|_| PathBuf::from(".chatterd"))
            });

        let bind_addr = cli
            .bind
            .or_else(|| std::env::var("CHATTERD_BIND").ok())
            .unwrap_or_else(|| "127.0.0.1:3000".to_string());

        let jwt_secret = cli
            .jwt_secret
            .or_else(|| std::env::var("CHATTERD_JWT_SECRET").ok());

        Self {
            bind_addr,
            data_dir,
            jwt_secret,
        }
    }
}
