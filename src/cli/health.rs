use crate::cli::CliContext;
use crate::constants;
use crate::util::fs::mode_of;
use anyhow::Result;
use clap::Args;
use std::path::Path;

#[derive(Args, Debug)]
pub struct HealthArgs {
    /// Skip audit chain verification
    #[arg(long)]
    pub skip_audit: bool,
}

pub async fn run(ctx: &CliContext, args: HealthArgs) -> Result<()> {
    let paths = &ctx.paths;
    let mut passed = 0u32;
    let mut failed = 0u32;

    // 1. Vault directory and file permissions
    let checks: [(&Path, &[u32], &str); 4] = [
        (paths.root.as_path(), &[constants::VAULT_DIR_MODE], "vault root"),
        (paths.secrets_json.as_path(), &[constants::SECRETS_FILE_MODE], "secrets.json"),
        (
            paths.config_toml.as_path(),
            &[0o600, constants::CONFIG_FILE_MODE],
            "credvault.toml",
        ),
        (
            paths.audit_log.as_path(),
            &[0o600, constants::AUDIT_LOG_MODE],
            "audit.log",
        ),
    ];
    for (path, expected, label) in checks {
        if !path.exists() {
            println!("  [WARN] {} not found: {}", label, path.display());
            continue;
        }
        match mode_of(path) {
            Some(mode) if expected.contains(&mode) => {
                println!("  [PASS] {} permissions: {:04o}", label, mode);
                passed += 1;
            }
            Some(mode) => {
                println!(
                    "  [FAIL] {} permissions: {:04o} (expected {})",
                    label,
                    mode,
                    expected
                        .iter()
                        .map(|m| format!("{:04o}", m))
                        .collect::<Vec<_>>()
                        .join(" or ")
                );
                failed += 1;
            }
            None => {}
        }
    }

    // 2. Master key and record readability
    match ctx.open() {
        Ok(services) => {
            let fingerprint = services.vault.key_fingerprint().to_string();
            println!("  [PASS] Master key loaded (fingerprint {})", fingerprint);
            passed += 1;

            let report = services.vault.key_report().await?;
            println!("  [INFO] {} stored credential(s)", report.len());

            let stale: Vec<_> = report.iter().filter(|s| !s.current_key).collect();
            if stale.is_empty() {
                println!("  [PASS] All credentials stamped with the active key");
                passed += 1;
            } else {
                for s in &stale {
                    println!(
                        "  [WARN] Credential {} ({} server {}) stamped with key {}",
                        s.id, s.server_kind, s.server_id, s.key_fingerprint
                    );
                }
            }

            let unreadable: Vec<_> = report.iter().filter(|s| !s.readable).collect();
            if unreadable.is_empty() {
                println!("  [PASS] All credentials decrypt with the active key");
                passed += 1;
            } else {
                for s in &unreadable {
                    println!(
                        "  [FAIL] Credential {} ({} server {}) cannot be decrypted",
                        s.id, s.server_kind, s.server_id
                    );
                    failed += 1;
                }
            }

            let orphaned: Vec<_> = report
                .iter()
                .filter(|s| {
                    !services
                        .config
                        .servers
                        .iter()
                        .any(|srv| srv.id == s.server_id && srv.kind == s.server_kind)
                })
                .collect();
            for s in &orphaned {
                println!(
                    "  [WARN] Credential {} belongs to {} server {} which is not in credvault.toml",
                    s.id, s.server_kind, s.server_id
                );
            }
        }
        Err(e) => {
            println!("  [FAIL] Cannot open vault: {:#}", e);
            failed += 1;
        }
    }

    // 3. Audit chain
    if !args.skip_audit {
        let (total, errors) = ctx.audit_trail().verify_chain()?;
        if errors.is_empty() {
            println!("  [PASS] Audit chain: {} entries verified", total);
            passed += 1;
        } else {
            println!(
                "  [FAIL] Audit chain: {} entries, {} errors (run `credvault audit verify`)",
                total,
                errors.len()
            );
            failed += 1;
        }
    }

    println!();
    println!("Health check: {} passed, {} failed", passed, failed);
    if failed > 0 {
        std::process::exit(1);
    }
    Ok(())
}
