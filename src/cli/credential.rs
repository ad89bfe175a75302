use crate::cli::CliContext;
use crate::constants;
use crate::core::admin::ConnectionTest;
use crate::models::backend::BackendKind;
use crate::models::secret::{CredentialMetadata, CredentialUpdate, NewCredential};
use anyhow::{bail, Result};
use chrono::{DateTime, Local, Utc};
use clap::{Args, Subcommand};
use comfy_table::{presets::UTF8_FULL, Attribute, Cell, Table};
use dialoguer::{Confirm, Input, Password};
use secrecy::SecretString;
use std::io::Read;
use zeroize::Zeroizing;

#[derive(Subcommand, Debug)]
pub enum CredentialCommand {
    /// Store a credential for a configured server
    Add(AddArgs),
    /// Show credential metadata (never the secret values)
    Show(ShowArgs),
    /// Replace some or all fields of a stored credential
    Update(UpdateArgs),
    /// Delete a stored credential
    Delete(DeleteArgs),
    /// Check connectivity to a server with its stored or a supplied credential
    Test(TestArgs),
}

#[derive(Args, Debug)]
pub struct ServerArgs {
    /// Server configuration id
    #[arg(long)]
    pub server_id: i64,

    /// Backend kind (Kafka, Redis, RabbitMQ, AWS, Azure)
    #[arg(long)]
    pub kind: BackendKind,
}

/// Where secret fields come from. Without a `--*-stdin` flag every field is prompted.
#[derive(Args, Debug, Default)]
pub struct SecretInput {
    /// Read the username from stdin
    #[arg(long, conflicts_with_all = ["password_stdin", "extra_config_stdin"])]
    pub username_stdin: bool,

    /// Read the password from stdin
    #[arg(long, conflicts_with = "extra_config_stdin")]
    pub password_stdin: bool,

    /// Read the extra configuration from stdin
    #[arg(long)]
    pub extra_config_stdin: bool,
}

#[derive(Args, Debug)]
pub struct AddArgs {
    #[command(flatten)]
    pub server: ServerArgs,

    #[command(flatten)]
    pub input: SecretInput,
}

#[derive(Args, Debug)]
pub struct ShowArgs {
    #[command(flatten)]
    pub server: ServerArgs,

    /// Output format: table|json
    #[arg(long, default_value = "table")]
    pub format: String,
}

#[derive(Args, Debug)]
pub struct UpdateArgs {
    /// Credential id
    #[arg(long)]
    pub id: i64,

    #[command(flatten)]
    pub input: SecretInput,
}

#[derive(Args, Debug)]
pub struct DeleteArgs {
    /// Credential id
    #[arg(long)]
    pub id: i64,

    /// Skip the confirmation prompt
    #[arg(long)]
    pub yes: bool,
}

#[derive(Args, Debug)]
pub struct TestArgs {
    #[command(flatten)]
    pub server: ServerArgs,

    /// Read a password to test with from stdin instead of using the stored one
    #[arg(long)]
    pub password_stdin: bool,
}

pub async fn run(ctx: &CliContext, cmd: CredentialCommand) -> Result<()> {
    match cmd {
        CredentialCommand::Add(args) => run_add(ctx, args).await,
        CredentialCommand::Show(args) => run_show(ctx, args).await,
        CredentialCommand::Update(args) => run_update(ctx, args).await,
        CredentialCommand::Delete(args) => run_delete(ctx, args).await,
        CredentialCommand::Test(args) => run_test(ctx, args).await,
    }
}

/// Plaintext fields gathered from stdin or prompts. Empty input means absent.
#[derive(Default)]
struct Fields {
    username: Option<SecretString>,
    password: Option<SecretString>,
    extra_config: Option<SecretString>,
}

impl Fields {
    fn is_empty(&self) -> bool {
        self.username.is_none() && self.password.is_none() && self.extra_config.is_none()
    }
}

fn gather(input: &SecretInput) -> Result<Fields> {
    if input.username_stdin {
        return Ok(Fields {
            username: non_empty(read_stdin("username")?),
            ..Fields::default()
        });
    }
    if input.password_stdin {
        return Ok(Fields {
            password: non_empty(read_stdin("password")?),
            ..Fields::default()
        });
    }
    if input.extra_config_stdin {
        return Ok(Fields {
            extra_config: non_empty(read_stdin("extra configuration")?),
            ..Fields::default()
        });
    }

    let username: String = Input::new()
        .with_prompt("Username (empty for none)")
        .allow_empty(true)
        .interact_text()?;
    let username = Zeroizing::new(username);
    check_size(&username, "username")?;
    let password = prompt_hidden("Password (empty for none)")?;
    let extra = prompt_hidden("Extra configuration (empty for none)")?;

    Ok(Fields {
        username: non_empty(username),
        password: non_empty(password),
        extra_config: non_empty(extra),
    })
}

fn read_stdin(what: &str) -> Result<Zeroizing<String>> {
    let mut buf = Zeroizing::new(String::new());
    std::io::stdin()
        .read_to_string(&mut buf)
        .map_err(|err| anyhow::anyhow!("read {} from stdin: {}", what, err))?;
    let value = Zeroizing::new(buf.trim_end_matches(['\r', '\n']).to_string());
    check_size(&value, what)?;
    Ok(value)
}

fn prompt_hidden(prompt: &str) -> Result<Zeroizing<String>> {
    let value = Zeroizing::new(
        Password::new()
            .with_prompt(prompt)
            .allow_empty_password(true)
            .interact()?,
    );
    check_size(&value, prompt)?;
    Ok(value)
}

fn check_size(value: &str, what: &str) -> Result<()> {
    if value.len() > constants::MAX_SECRET_SIZE {
        bail!(
            "{} exceeds maximum size ({} bytes, max {} bytes)",
            what,
            value.len(),
            constants::MAX_SECRET_SIZE
        );
    }
    Ok(())
}

fn non_empty(value: Zeroizing<String>) -> Option<SecretString> {
    if value.is_empty() {
        None
    } else {
        Some(SecretString::from(value.as_str().to_string()))
    }
}

async fn run_add(ctx: &CliContext, args: AddArgs) -> Result<()> {
    let services = ctx.open()?;
    let ServerArgs { server_id, kind } = args.server;
    if !services
        .config
        .servers
        .iter()
        .any(|s| s.id == server_id && s.kind == kind)
    {
        eprintln!(
            "warning: no [[servers]] entry for {} server {} in credvault.toml",
            kind, server_id
        );
    }

    let fields = gather(&args.input)?;
    if fields.is_empty() {
        bail!("nothing to store: username, password and extra configuration are all empty");
    }
    let credential = NewCredential {
        server_id,
        server_kind: kind,
        username: fields.username,
        password: fields.password,
        extra_config: fields.extra_config,
    };
    let id = services.admin.add(credential).await?;
    println!("credential {} stored for {} server {}", id, kind, server_id);
    Ok(())
}

async fn run_show(ctx: &CliContext, args: ShowArgs) -> Result<()> {
    let services = ctx.open()?;
    let Some(meta) = services
        .admin
        .metadata(args.server.server_id, args.server.kind)
        .await?
    else {
        println!(
            "No usable credential for {} server {}.",
            args.server.kind, args.server.server_id
        );
        return Ok(());
    };

    if args.format == "json" {
        println!("{}", serde_json::to_string_pretty(&meta)?);
        return Ok(());
    }
    println!("{}", metadata_table(&meta));
    Ok(())
}

fn local_time(at: DateTime<Utc>) -> String {
    let local: DateTime<Local> = at.into();
    local.format("%Y-%m-%d %H:%M:%S").to_string()
}

fn metadata_table(meta: &CredentialMetadata) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec![
        Cell::new("Id").add_attribute(Attribute::Bold),
        Cell::new("Server").add_attribute(Attribute::Bold),
        Cell::new("Kind").add_attribute(Attribute::Bold),
        Cell::new("Created").add_attribute(Attribute::Bold),
        Cell::new("Last used").add_attribute(Attribute::Bold),
    ]);
    table.add_row(vec![
        meta.id.to_string(),
        meta.server_id.to_string(),
        meta.server_kind.to_string(),
        local_time(meta.created_at),
        meta.last_used_at
            .map(local_time)
            .unwrap_or_else(|| "never".to_string()),
    ]);
    table
}

async fn run_update(ctx: &CliContext, args: UpdateArgs) -> Result<()> {
    let services = ctx.open()?;
    let fields = gather(&args.input)?;
    if fields.is_empty() {
        bail!("nothing to update: no field was supplied");
    }
    let update = CredentialUpdate {
        username: fields.username,
        password: fields.password,
        extra_config: fields.extra_config,
    };
    let changed = update.changed_fields().join(", ");
    if services.admin.update(args.id, update).await? {
        println!("credential {} updated ({})", args.id, changed);
        Ok(())
    } else {
        bail!("credential {} not found", args.id)
    }
}

async fn run_delete(ctx: &CliContext, args: DeleteArgs) -> Result<()> {
    let services = ctx.open()?;
    if !args.yes {
        let confirmed = Confirm::new()
            .with_prompt(format!("Delete credential {}?", args.id))
            .default(false)
            .interact()?;
        if !confirmed {
            println!("aborted");
            return Ok(());
        }
    }
    if services.admin.delete(args.id).await? {
        println!("credential {} deleted", args.id);
    } else {
        println!("credential {} did not exist (deletion attempt audited)", args.id);
    }
    Ok(())
}

async fn run_test(ctx: &CliContext, args: TestArgs) -> Result<()> {
    let services = ctx.open()?;
    let password = if args.password_stdin {
        non_empty(read_stdin("password")?)
    } else {
        None
    };
    let outcome = services
        .admin
        .test_connection(ConnectionTest {
            server_id: args.server.server_id,
            server_kind: args.server.kind,
            username: None,
            password,
        })
        .await?;

    if outcome.success {
        println!("  [PASS] {}", outcome.message);
        Ok(())
    } else {
        println!("  [FAIL] {}", outcome.message);
        std::process::exit(1);
    }
}
