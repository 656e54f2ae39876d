// Broadcast log rendering: CSV export and slot descriptions

use crate::errors::BroadcastError;
use crate::models::{MessageLogEntry, Slot};
use chrono_tz::Tz;
use csv::WriterBuilder;

pub const CSV_HEADER: [&str; 8] = [
    "id",
    "callsign",
    "channel",
    "address",
    "status",
    "attempts",
    "error",
    "updated_at",
];

/// Render delivery log entries as CSV, header first
pub fn messages_csv(entries: &[MessageLogEntry]) -> Result<String, BroadcastError> {
    let mut buffer = Vec::new();
    {
        let mut writer = WriterBuilder::new().from_writer(&mut buffer);
        writer
            .write_record(CSV_HEADER)
            .map_err(|e| BroadcastError::Export(format!("Failed to write CSV header: {}", e)))?;

        for entry in entries {
            let message = &entry.message;
            writer
                .write_record([
                    message.id.to_string(),
                    entry.callsign.clone().unwrap_or_default(),
                    message.address_type.to_string(),
                    message.address.clone(),
                    message.status.to_string(),
                    message.attempts.to_string(),
                    message.error.clone().unwrap_or_default(),
                    message.updated_at.to_rfc3339(),
                ])
                .map_err(|e| {
                    BroadcastError::Export(format!("Failed to write CSV record: {}", e))
                })?;
        }

        writer
            .flush()
            .map_err(|e| BroadcastError::Export(format!("Failed to flush CSV: {}", e)))?;
    }

    String::from_utf8(buffer).map_err(|e| BroadcastError::Export(e.to_string()))
}

/// "<position> - <description> <Ddd Mon DD @ HH:MM>" in the event zone
pub fn describe_slot(slot: &Slot, position_title: &str, tz: Tz) -> String {
    let begins = slot.begins.with_timezone(&tz);
    format!(
        "{} - {} {}",
        position_title,
        slot.description,
        begins.format("%a %b %d @ %H:%M")
    )
}
