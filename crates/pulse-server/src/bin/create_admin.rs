//! Seed an admin account. Does nothing if the email is already registered.

use std::path::PathBuf;

use anyhow::{Context, bail};
use tracing::info;
use uuid::Uuid;

use pulse_db::Database;
use pulse_server::password::hash_password;
use pulse_types::models::Role;

fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    pulse_server::init_logging();

    let email = std::env::var("PULSE_ADMIN_EMAIL").unwrap_or_else(|_| "admin@example.com".into());
    let name = std::env::var("PULSE_ADMIN_NAME").unwrap_or_else(|_| "Admin User".into());
    let password = std::env::var("PULSE_ADMIN_PASSWORD").context("PULSE_ADMIN_PASSWORD must be set")?;
    if password.len() < 8 {
        bail!("PULSE_ADMIN_PASSWORD must be at least 8 characters");
    }
    let db_path: PathBuf = std::env::var("PULSE_DB_PATH").unwrap_or_else(|_| "pulse.db".into()).into();

    let db = Database::open(&db_path)?;

    if let Some(existing) = db.get_user_by_email(&email)? {
        info!("User {} already exists ({}, role {})", email, existing.id, existing.role.as_str());
        return Ok(());
    }

    let password_hash = hash_password(&password)?;

    let id = Uuid::new_v4();
    db.create_user(id, &name, &email, &password_hash, Role::Admin)?;
    info!("Admin user created: {} <{}>", id, email);

    Ok(())
}
