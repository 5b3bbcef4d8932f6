use std::io;

use anyhow::Context;
use attendd::config::{Cli, Command};
use attendd::ipc::{self, AppState};
use attendd::{http, sidecar};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

fn main() -> anyhow::Result<()> {
    // Stdout belongs to sidecar replies; logs go to stderr.
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let mut state = AppState::new(cli.auth.settings());
    if let Some(workspace) = cli.auth.workspace.clone() {
        ipc::select_workspace(&mut state, workspace.clone())
            .with_context(|| format!("opening workspace {}", workspace.display()))?;
    }

    match cli.command {
        None => {
            let stdin = io::stdin();
            sidecar::run(&mut state, stdin.lock(), io::stdout())
        }
        Some(Command::Serve(args)) => {
            if state.db.is_none() {
                anyhow::bail!("serve needs --workspace or ATTENDD_WORKSPACE");
            }
            info!(version = env!("CARGO_PKG_VERSION"), "starting attendd");
            tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?
                .block_on(http::serve(state, args.bind))
        }
    }
}
