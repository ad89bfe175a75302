use crate::cli::CliContext;
use crate::http::{self, AppState};
use anyhow::Result;
use clap::Args;
use tracing::info;

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Listen address (default: [http].bind from credvault.toml)
    #[arg(long, env = "CREDVAULT_BIND")]
    pub bind: Option<String>,
}

pub async fn run(ctx: &CliContext, args: ServeArgs) -> Result<()> {
    let services = ctx.open()?;
    let bind = args.bind.unwrap_or_else(|| services.config.http.bind.clone());
    info!(
        vault = %ctx.paths,
        servers = services.config.servers.len(),
        fingerprint = services.vault.key_fingerprint(),
        "starting admin api"
    );
    http::serve(AppState::new(services.admin), &bind).await
}
