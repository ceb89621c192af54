//! Text and JSON rendering for the CLI

use crate::catalog::{Publisher, SubscriptionCallback, TimerCallback};
use crate::cli::OutputFormat;
use crate::records::Record;
use serde::Serialize;
use std::io::{self, Write};

/// One tab-separated line per entity in text mode
pub trait TextRow {
    fn text_row(&self) -> String;
}

impl<T: TextRow + ?Sized> TextRow for &T {
    fn text_row(&self) -> String {
        (**self).text_row()
    }
}

impl TextRow for String {
    fn text_row(&self) -> String {
        self.clone()
    }
}

impl TextRow for Publisher {
    fn text_row(&self) -> String {
        format!("{}\t{}\t{}", self.node_name, self.topic_name, self.queue_depth)
    }
}

impl TextRow for SubscriptionCallback {
    fn text_row(&self) -> String {
        format!(
            "{}\t{}\t{}\t{}",
            self.node_name,
            self.callback_name(),
            self.topic_name,
            self.symbol
        )
    }
}

impl TextRow for TimerCallback {
    fn text_row(&self) -> String {
        format!(
            "{}\t{}\t{}\t{}",
            self.node_name,
            self.callback_name(),
            self.period_ns,
            self.symbol
        )
    }
}

fn write_json<W: Write, T: Serialize + ?Sized>(out: &mut W, value: &T) -> io::Result<()> {
    serde_json::to_writer_pretty(&mut *out, value)?;
    writeln!(out)
}

/// Entities, one per line (text) or as a JSON array
pub fn write_entities<W, T>(out: &mut W, format: OutputFormat, entities: &[T]) -> io::Result<()>
where
    W: Write,
    T: TextRow + Serialize,
{
    match format {
        OutputFormat::Json => write_json(out, entities),
        OutputFormat::Text => {
            for entity in entities {
                writeln!(out, "{}", entity.text_row())?;
            }
            Ok(())
        }
    }
}

/// Records as a column table (text) or a JSON array
///
/// Text mode prints the column names of the first record as a header and
/// `-` for unobserved timestamps.
pub fn write_records<W: Write>(out: &mut W, format: OutputFormat, records: &[Record]) -> io::Result<()> {
    match format {
        OutputFormat::Json => write_json(out, records),
        OutputFormat::Text => {
            if let Some(first) = records.first() {
                let header: Vec<&str> = first.columns().into_iter().map(|(name, _)| name).collect();
                writeln!(out, "{}", header.join("\t"))?;
            }
            for record in records {
                let row: Vec<String> = record
                    .columns()
                    .into_iter()
                    .map(|(_, value)| value.map_or_else(|| "-".to_string(), |v| v.to_string()))
                    .collect();
                writeln!(out, "{}", row.join("\t"))?;
            }
            let complete = records.iter().filter(|r| r.is_complete()).count();
            writeln!(out, "# {} records, {} complete", records.len(), complete)
        }
    }
}
