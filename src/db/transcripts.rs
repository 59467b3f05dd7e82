//! Transcript record persistence.
//!
//! Raw SQL with rusqlite, no ORM. Every write stamps `updated_at`.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::transcript::{BookingUpsert, TranscriptRecord, TranscriptStatus, TranscriptUpdate};

const SELECT_COLUMNS: &str = "SELECT id, external_booking_id, status, title, start_time, end_time, \
     duration_minutes, client_name, client_email, host_name, host_email, meeting_link, \
     recording_url, transcript_text, transcript_structured, notes, created_at, updated_at \
     FROM transcripts";

impl ToSql for TranscriptStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for TranscriptStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        TranscriptStatus::parse(s)
            .ok_or_else(|| FromSqlError::Other(format!("unknown transcript status: {}", s).into()))
    }
}

fn map_row(row: &Row<'_>) -> rusqlite::Result<TranscriptRecord> {
    Ok(TranscriptRecord {
        id: row.get(0)?,
        external_booking_id: row.get(1)?,
        status: row.get(2)?,
        title: row.get(3)?,
        start_time: row.get(4)?,
        end_time: row.get(5)?,
        duration_minutes: row.get(6)?,
        client_name: row.get(7)?,
        client_email: row.get(8)?,
        host_name: row.get(9)?,
        host_email: row.get(10)?,
        meeting_link: row.get(11)?,
        recording_url: row.get(12)?,
        transcript_text: row.get(13)?,
        transcript_structured: row.get(14)?,
        notes: row.get(15)?,
        created_at: row.get(16)?,
        updated_at: row.get(17)?,
    })
}

/// Repository for transcript records and the processed-event ledger.
pub struct TranscriptRepository;

impl TranscriptRepository {
    /// Insert a booking or refresh its metadata. Status is only set on insert.
    /// Returns the stored record and whether it was newly created.
    pub fn upsert_booking(
        conn: &Connection,
        booking: &BookingUpsert,
    ) -> Result<(TranscriptRecord, bool)> {
        let new_id = Uuid::new_v4().to_string();
        let now = Utc::now();

        let id: String = conn
            .query_row(
                "INSERT INTO transcripts (id, external_booking_id, status, title, start_time, \
                 end_time, duration_minutes, client_name, client_email, host_name, host_email, \
                 meeting_link, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?13) \
                 ON CONFLICT(external_booking_id) DO UPDATE SET \
                 title = COALESCE(excluded.title, transcripts.title), \
                 start_time = COALESCE(excluded.start_time, transcripts.start_time), \
                 end_time = COALESCE(excluded.end_time, transcripts.end_time), \
                 duration_minutes = COALESCE(excluded.duration_minutes, transcripts.duration_minutes), \
                 client_name = COALESCE(excluded.client_name, transcripts.client_name), \
                 client_email = COALESCE(excluded.client_email, transcripts.client_email), \
                 host_name = COALESCE(excluded.host_name, transcripts.host_name), \
                 host_email = COALESCE(excluded.host_email, transcripts.host_email), \
                 meeting_link = COALESCE(excluded.meeting_link, transcripts.meeting_link), \
                 updated_at = excluded.updated_at \
                 RETURNING id",
                params![
                    new_id,
                    booking.external_booking_id,
                    TranscriptStatus::Pending,
                    booking.title,
                    booking.start_time,
                    booking.end_time,
                    booking.duration_minutes,
                    booking.client_name,
                    booking.client_email,
                    booking.host_name,
                    booking.host_email,
                    booking.meeting_link,
                    now,
                ],
                |row| row.get(0),
            )
            .context("Failed to upsert transcript")?;

        let record = Self::get(conn, &id)?
            .with_context(|| format!("Transcript {} vanished after upsert", id))?;

        Ok((record, id == new_id))
    }

    /// Get a transcript by internal id.
    pub fn get(conn: &Connection, id: &str) -> Result<Option<TranscriptRecord>> {
        conn.query_row(
            &format!("{} WHERE id = ?1", SELECT_COLUMNS),
            params![id],
            map_row,
        )
        .optional()
        .context("Failed to query transcript")
    }

    /// Get a transcript by the platform's booking uid.
    pub fn get_by_external_id(
        conn: &Connection,
        external_booking_id: &str,
    ) -> Result<Option<TranscriptRecord>> {
        conn.query_row(
            &format!("{} WHERE external_booking_id = ?1", SELECT_COLUMNS),
            params![external_booking_id],
            map_row,
        )
        .optional()
        .context("Failed to query transcript by booking id")
    }

    /// Apply a partial update. Returns `None` when no row matched, either
    /// because the id is unknown or the status guard no longer holds.
    pub fn update(
        conn: &Connection,
        id: &str,
        update: &TranscriptUpdate,
    ) -> Result<Option<TranscriptRecord>> {
        let mut sets = vec!["updated_at = ?"];
        let mut params: Vec<Box<dyn ToSql>> = vec![Box::new(Utc::now())];

        if let Some(status) = update.status {
            sets.push("status = ?");
            params.push(Box::new(status));
        }
        if let Some(end_time) = update.end_time {
            sets.push("end_time = ?");
            params.push(Box::new(end_time));
        }
        if let Some(url) = &update.recording_url {
            sets.push("recording_url = ?");
            params.push(Box::new(url.clone()));
        }
        if let Some(text) = &update.transcript_text {
            sets.push("transcript_text = ?");
            params.push(Box::new(text.clone()));
        }
        if let Some(structured) = &update.transcript_structured {
            sets.push("transcript_structured = ?");
            params.push(Box::new(structured.clone()));
        }
        if let Some(notes) = &update.notes {
            sets.push("notes = ?");
            params.push(Box::new(notes.clone()));
        }

        let mut sql = format!("UPDATE transcripts SET {} WHERE id = ?", sets.join(", "));
        params.push(Box::new(id.to_string()));

        if let Some(expected) = update.expected_status {
            sql.push_str(" AND status = ?");
            params.push(Box::new(expected));
        }

        let param_refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let changed = conn
            .execute(&sql, param_refs.as_slice())
            .context("Failed to update transcript")?;

        if changed == 0 {
            return Ok(None);
        }

        Self::get(conn, id)
    }

    /// List transcripts, newest first.
    pub fn list(conn: &Connection, limit: usize) -> Result<Vec<TranscriptRecord>> {
        let mut stmt = conn
            .prepare(&format!(
                "{} ORDER BY created_at DESC, rowid DESC LIMIT ?1",
                SELECT_COLUMNS
            ))
            .context("Failed to prepare transcripts list query")?;

        let records = stmt
            .query_map(params![limit as i64], map_row)
            .context("Failed to list transcripts")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("Failed to map transcripts")?;

        Ok(records)
    }

    /// Record an event key. Returns false when it was already present.
    pub fn claim_event(conn: &Connection, event_key: &str, kind: &str) -> Result<bool> {
        let inserted = conn
            .execute(
                "INSERT OR IGNORE INTO processed_events (event_key, kind, processed_at) \
                 VALUES (?1, ?2, ?3)",
                params![event_key, kind, Utc::now()],
            )
            .context("Failed to record processed event")?;

        Ok(inserted == 1)
    }

    /// Delete ledger entries processed before `cutoff`.
    pub fn prune_events(conn: &Connection, cutoff: DateTime<Utc>) -> Result<usize> {
        conn.execute(
            "DELETE FROM processed_events WHERE processed_at < ?1",
            params![cutoff],
        )
        .context("Failed to prune processed events")
    }

    pub fn release_event(conn: &Connection, event_key: &str) -> Result<()> {
        conn.execute(
            "DELETE FROM processed_events WHERE event_key = ?1",
            params![event_key],
        )
        .context("Failed to release processed event")?;
        Ok(())
    }
}
