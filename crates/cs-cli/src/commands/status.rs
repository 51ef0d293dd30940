//! Status command for showing what the store holds.

use std::io::Write;
use std::path::Path;

use anyhow::Result;
use cs_db::Database;

pub fn run<W: Write>(writer: &mut W, db: &Database, database_path: &Path) -> Result<()> {
    let status = db.status()?;

    writeln!(writer, "Cat scale status")?;
    writeln!(writer, "Database: {}", database_path.display())?;

    match &status.last_reading {
        Some(key) => writeln!(writer, "Readings: {} (last {key})", status.readings)?,
        None => writeln!(writer, "Readings: 0")?,
    }
    writeln!(
        writer,
        "Events:   {} ({} unlabeled)",
        status.events, status.unlabeled_events
    )?;
    writeln!(writer, "Cats:     {}", status.cats)?;
    if status.cats == 0 {
        writeln!(writer, "No cats defined; events cannot be labeled.")?;
    }

    Ok(())
}
