use crate::cli::CliContext;
use crate::models::activity::{ActivityKind, MutationEffect};
use anyhow::Result;
use chrono::{DateTime, Local};
use clap::{Args, Subcommand};
use comfy_table::{presets::UTF8_FULL, Attribute, Cell, Table};

#[derive(Subcommand, Debug)]
pub enum AuditCommand {
    /// Display the audit trail
    Log(AuditLogArgs),
    /// Verify audit chain integrity
    Verify(AuditVerifyArgs),
    /// List the activity kinds that can appear in the trail
    Kinds,
}

#[derive(Args, Debug)]
pub struct AuditLogArgs {
    /// Maximum number of entries to display
    #[arg(long, default_value_t = 50)]
    pub limit: usize,

    /// Output format: table|json
    #[arg(long, default_value = "table")]
    pub format: String,
}

#[derive(Args, Debug)]
pub struct AuditVerifyArgs {}

pub fn run(ctx: &CliContext, cmd: AuditCommand) -> Result<()> {
    match cmd {
        AuditCommand::Log(args) => run_log(ctx, args),
        AuditCommand::Verify(_) => run_verify(ctx),
        AuditCommand::Kinds => run_kinds(),
    }
}

fn run_log(ctx: &CliContext, args: AuditLogArgs) -> Result<()> {
    let entries = ctx.audit_trail().read_log(Some(args.limit))?;

    if args.format == "json" {
        for entry in &entries {
            println!("{}", serde_json::to_string(entry)?);
        }
        return Ok(());
    }

    if entries.is_empty() {
        println!("No audit entries found.");
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec![
        Cell::new("Id").add_attribute(Attribute::Bold),
        Cell::new("Timestamp").add_attribute(Attribute::Bold),
        Cell::new("Activity").add_attribute(Attribute::Bold),
        Cell::new("Message").add_attribute(Attribute::Bold),
        Cell::new("Actor").add_attribute(Attribute::Bold),
    ]);

    for entry in &entries {
        let local: DateTime<Local> = entry.timestamp.into();
        table.add_row(vec![
            entry.id.to_string(),
            local.format("%Y-%m-%d %H:%M:%S").to_string(),
            entry.activity_kind.to_string(),
            entry.message.clone(),
            entry.actor.clone(),
        ]);
    }

    println!("{}", table);
    println!("\n{} entries shown.", entries.len());
    Ok(())
}

fn run_verify(ctx: &CliContext) -> Result<()> {
    let (total, errors) = ctx.audit_trail().verify_chain()?;

    if total == 0 {
        println!("No audit entries to verify.");
        return Ok(());
    }

    for err in &errors {
        println!("  [FAIL] {}", err);
    }

    println!();
    if errors.is_empty() {
        println!("Audit chain: {} entries verified, 0 errors", total);
    } else {
        println!("Audit chain: {} entries, {} errors", total, errors.len());
        std::process::exit(1);
    }
    Ok(())
}

fn run_kinds() -> Result<()> {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec![
        Cell::new("Id").add_attribute(Attribute::Bold),
        Cell::new("Name").add_attribute(Attribute::Bold),
        Cell::new("Description").add_attribute(Attribute::Bold),
        Cell::new("Audited").add_attribute(Attribute::Bold),
    ]);
    for info in ActivityKind::catalog() {
        let when = ActivityKind::from_id(info.id)
            .map(|kind| match kind.effect() {
                MutationEffect::Destructive => "before the change",
                MutationEffect::Constructive => "after success",
            })
            .unwrap_or("-");
        table.add_row(vec![
            info.id.to_string(),
            info.name.to_string(),
            info.description.to_string(),
            when.to_string(),
        ]);
    }
    println!("{}", table);
    Ok(())
}
