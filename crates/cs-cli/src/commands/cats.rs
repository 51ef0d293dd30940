//! Cats command for defining cats and their weights.

use std::io::Write;

use anyhow::{Context, Result};
use chrono::Utc;
use cs_core::CatName;
use cs_db::Database;
use rust_decimal::Decimal;

use super::util::{format_instant, parse_instant};

/// Records `weight` for `name`, effective from `at` (default: now).
///
/// Returns the effective timestamp in milliseconds.
pub fn set_weight(db: &mut Database, name: &str, weight: &str, at: Option<&str>) -> Result<i64> {
    let name = CatName::new(name).context("invalid cat name")?;
    let weight: Decimal = weight
        .trim()
        .parse()
        .with_context(|| format!("invalid weight: {weight}"))?;
    anyhow::ensure!(weight > Decimal::ZERO, "weight must be positive, got {weight}");

    let now = Utc::now();
    let timestamp = match at {
        Some(at) => parse_instant(at, now)?,
        None => now.timestamp_millis(),
    };
    db.define_cat_weight(&name, timestamp, weight)?;
    tracing::info!(cat = %name, %weight, timestamp, "defined cat weight");
    Ok(timestamp)
}

/// Lists every cat with its defined weights.
pub fn list<W: Write>(writer: &mut W, db: &Database, json: bool) -> Result<()> {
    let identities = db.load_identities()?;

    if json {
        let output =
            serde_json::to_string_pretty(&identities).context("failed to serialize cats")?;
        writeln!(writer, "{output}")?;
        return Ok(());
    }

    if identities.is_empty() {
        writeln!(writer, "No cats defined.")?;
        return Ok(());
    }
    for identity in &identities {
        writeln!(writer, "{}", identity.name)?;
        if identity.defined_weights.is_empty() {
            writeln!(writer, "  (no weights defined)")?;
        }
        for defined in &identity.defined_weights {
            writeln!(
                writer,
                "  {}  {}",
                format_instant(defined.timestamp),
                defined.weight
            )?;
        }
    }
    Ok(())
}
