use crate::cli::CliContext;
use crate::models::backend::BackendKind;
use anyhow::Result;
use clap::Args;

#[derive(Args, Debug)]
pub struct ResolveArgs {
    /// Backend kind (Kafka, Redis, RabbitMQ, AWS, Azure)
    #[arg(long)]
    pub kind: BackendKind,

    /// Server address as entered by the user
    pub address: String,

    /// Exit non-zero when no credential resolves
    #[arg(long)]
    pub require: bool,
}

/// Report which server and which credential fields an address resolves to.
pub async fn run(ctx: &CliContext, args: ResolveArgs) -> Result<()> {
    let services = ctx.open()?;

    let resolved = if args.require {
        Some(services.resolver.require(args.kind, &args.address).await?)
    } else {
        services.resolver.resolve(args.kind, &args.address).await?
    };

    let Some(resolved) = resolved else {
        println!(
            "No credential for {} address '{}'; the backend default authentication applies.",
            args.kind,
            args.address.trim()
        );
        return Ok(());
    };

    let secret = &resolved.secret;
    let present: Vec<&str> = [
        ("username", secret.username().is_some()),
        ("password", secret.password().is_some()),
        ("extraConfig", secret.extra_config().is_some()),
    ]
    .into_iter()
    .filter(|(_, present)| *present)
    .map(|(name, _)| name)
    .collect();

    let name = if resolved.server.name.is_empty() {
        "-"
    } else {
        resolved.server.name.as_str()
    };
    println!("server:     {} {} ({})", resolved.server.kind, resolved.server.id, name);
    println!("credential: {}", secret.id);
    println!("fields:     {}", present.join(", "));
    Ok(())
}
