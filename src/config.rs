use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use tracing::warn;
use uuid::Uuid;

use crate::ipc::AuthSettings;

const DEFAULT_TOKEN_TTL_SECS: u64 = 12 * 60 * 60;

#[derive(Debug, Parser)]
#[command(name = "attendd", version, about = "School attendance service")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    #[command(flatten)]
    pub auth: AuthArgs,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Serve the REST API over HTTP.
    Serve(ServeArgs),
}

#[derive(Debug, Clone, Args)]
pub struct AuthArgs {
    /// Key for signing bearer tokens. A random per-process key is used if unset.
    #[arg(long, env = "ATTENDD_TOKEN_SECRET", global = true, hide_env_values = true)]
    pub token_secret: Option<String>,

    #[arg(long, env = "ATTENDD_TOKEN_TTL_SECS", global = true, default_value_t = DEFAULT_TOKEN_TTL_SECS)]
    pub token_ttl_secs: u64,

    /// Reject calls without a valid token (health, register and login excepted).
    #[arg(long, env = "ATTENDD_REQUIRE_AUTH", global = true)]
    pub require_auth: bool,

    /// Workspace to open at startup. The sidecar can also pick one with `workspace.select`.
    #[arg(long, env = "ATTENDD_WORKSPACE", global = true)]
    pub workspace: Option<PathBuf>,
}

#[derive(Debug, Clone, Args)]
pub struct ServeArgs {
    #[arg(long, env = "ATTENDD_BIND", default_value = "0.0.0.0:8080")]
    pub bind: SocketAddr,
}

impl AuthArgs {
    pub fn settings(&self) -> AuthSettings {
        let secret = match self.token_secret.as_deref().filter(|s| !s.is_empty()) {
            Some(s) => s.as_bytes().to_vec(),
            None => {
                warn!("ATTENDD_TOKEN_SECRET not set, tokens will not survive a restart");
                random_secret()
            }
        };
        AuthSettings {
            secret,
            token_ttl_secs: self.token_ttl_secs,
            require_auth: self.require_auth,
        }
    }
}

fn random_secret() -> Vec<u8> {
    let mut secret = Uuid::new_v4().as_bytes().to_vec();
    secret.extend_from_slice(Uuid::new_v4().as_bytes());
    secret
}
