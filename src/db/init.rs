use anyhow::{Context, Result};
use rusqlite::Connection;
use std::path::Path;

pub fn open_db(db_path: &Path) -> Result<Connection> {
    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent).context("Failed to create database directory")?;
    }

    let conn = Connection::open(db_path).context("Failed to open database connection")?;

    migrate(&conn)?;

    Ok(conn)
}

pub fn migrate(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS transcripts (
            id TEXT PRIMARY KEY,
            external_booking_id TEXT NOT NULL UNIQUE,
            status TEXT NOT NULL DEFAULT 'pending',
            title TEXT,
            start_time TEXT,
            end_time TEXT,
            duration_minutes INTEGER,
            client_name TEXT,
            client_email TEXT,
            host_name TEXT,
            host_email TEXT,
            meeting_link TEXT,
            recording_url TEXT,
            transcript_text TEXT,
            transcript_structured TEXT,
            notes TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )
    .context("Failed to create transcripts table")?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_transcripts_created_at ON transcripts(created_at DESC)",
        [],
    )
    .context("Failed to create transcripts created_at index")?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_transcripts_status ON transcripts(status)",
        [],
    )
    .context("Failed to create transcripts status index")?;

    // Ledger of webhook deliveries and worker callbacks already applied
    conn.execute(
        "CREATE TABLE IF NOT EXISTS processed_events (
            event_key TEXT PRIMARY KEY,
            kind TEXT NOT NULL,
            processed_at TEXT NOT NULL
        )",
        [],
    )
    .context("Failed to create processed_events table")?;

    Ok(())
}
