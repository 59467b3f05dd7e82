use anyhow::{anyhow, Result};

use super::args::{TranscriptsCliArgs, TranscriptsCommand};
use crate::config::Config;
use crate::db::{SqliteTranscriptStore, TranscriptStore};
use crate::transcript::TranscriptRecord;

pub async fn handle_transcripts_command(args: TranscriptsCliArgs, config: &Config) -> Result<()> {
    let store = SqliteTranscriptStore::open(&config.database_path()?)?;

    match args.command {
        TranscriptsCommand::List { limit } => {
            let records = store.list(limit).await?;
            if records.is_empty() {
                println!("No transcripts recorded yet.");
                return Ok(());
            }

            println!("Found {} transcript(s):\n", records.len());
            for record in &records {
                print_summary(record);
                println!("---");
            }
            println!("\nTo see a full record, use: scribehook transcripts show <ID>");
        }
        TranscriptsCommand::Show { id } => {
            let record = store
                .find_by_id(&id)
                .await?
                .ok_or_else(|| anyhow!("Transcript {} not found", id))?;

            print_summary(&record);
            if let Some(link) = &record.meeting_link {
                println!("Meeting: {}", link);
            }
            if let Some(url) = &record.recording_url {
                println!("Recording: {}", url);
            }
            if let Some(notes) = &record.notes {
                println!("Notes:\n{}", notes);
            }
            match &record.transcript_text {
                Some(text) => println!("\n{}", text),
                None => println!("\n(no transcript yet)"),
            }
        }
    }

    Ok(())
}

fn print_summary(record: &TranscriptRecord) {
    println!("ID: {}", record.id);
    println!("Booking: {}", record.external_booking_id);
    println!("Status: {}", record.status);
    println!("Title: {}", record.title.as_deref().unwrap_or("Untitled"));
    if let Some(client) = record.client_email.as_deref().or(record.client_name.as_deref()) {
        println!("Client: {}", client);
    }
    println!("Created: {}", record.created_at.format("%Y-%m-%d %H:%M:%S UTC"));
}
