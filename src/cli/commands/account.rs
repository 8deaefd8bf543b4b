//! Account command handlers

use anyhow::Context;
use std::io::BufRead;

use crate::config::Config;
use crate::db::Store;
use crate::domain::{AccountId, Role, UsageKind};
use crate::models::account::{Account, AccountDraft, Field};
use crate::services::{AccountError, AccountService, SeaOrmAccountService};

async fn account_service(config: &Config) -> anyhow::Result<SeaOrmAccountService> {
    let store = Store::new(&config.general.database_path).await?;
    SeaOrmAccountService::from_config(store, config)
        .map_err(|e| anyhow::anyhow!("Failed to initialize password hasher: {e}"))
}

fn read_password_from_stdin() -> anyhow::Result<String> {
    println!("Password (read from stdin):");
    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read password from stdin")?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

fn print_account(account: &Account) {
    println!("{} [{}]", account.username, account.role);
    println!("  ID: {}", account.id);
    println!("  Email: {}", account.email);
    if let Some(profile) = &account.profile {
        let name = [profile.first_name.as_deref(), profile.last_name.as_deref()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" ");
        if !name.is_empty() {
            println!("  Name: {name}");
        }
        if let Some(org) = &profile.organization {
            println!("  Organization: {org}");
        }
    }
    println!(
        "  Usage: {} predictions, {} models trained",
        account.usage_stats.predictions_made, account.usage_stats.models_trained
    );
    if let Some(last_active) = account.usage_stats.last_active {
        println!("  Last active: {}", last_active.to_rfc3339());
    }
    println!("  Created: {}", account.created_at.to_rfc3339());
}

pub async fn cmd_create_account(
    config: &Config,
    username: &str,
    email: &str,
    password: Option<String>,
    role: Option<Role>,
) -> anyhow::Result<()> {
    let service = account_service(config).await?;

    let password = match password {
        Some(password) => password,
        None => read_password_from_stdin()?,
    };

    let mut draft = AccountDraft::new(username, email, password);
    draft.role = role.map(|r| Field::Value(r.as_str().to_string()));

    match service.create_account(draft).await {
        Ok(account) => {
            println!("Created account:");
            print_account(&account);
            Ok(())
        }
        Err(AccountError::Validation(errors)) => {
            println!("Account is invalid:");
            for error in &errors {
                println!("  - {error}");
            }
            anyhow::bail!("{} validation error(s)", errors.len())
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn cmd_show_account(config: &Config, username: &str) -> anyhow::Result<()> {
    let service = account_service(config).await?;

    match service.find_by_username(username).await {
        Ok(account) => {
            print_account(&account);
            Ok(())
        }
        Err(AccountError::NotFound) => {
            println!("No account named '{username}'.");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn cmd_record_usage(config: &Config, id: &str, kind: UsageKind) -> anyhow::Result<()> {
    let id: AccountId = id
        .parse()
        .with_context(|| format!("Invalid account ID: {id}"))?;

    let service = account_service(config).await?;
    service.record_usage(id, kind).await?;

    let account = service.get_account(id).await?;
    println!(
        "Recorded {kind} for {}: {} predictions, {} models trained",
        account.username,
        account.usage_stats.predictions_made,
        account.usage_stats.models_trained
    );
    Ok(())
}
