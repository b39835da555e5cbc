//! CSV, HTML table and sticker exports of the log.

mod csv;
mod html;
mod sticker;
#[cfg(test)]
mod tests;

pub use self::csv::{csv_escape, csv_file_name, csv_header, render_csv};
pub use html::{escape_html, html_columns, render_html_document, render_table, select_entries};
pub use sticker::render_sticker;

use crate::config::{StickerConfig, UnitflowConfig};
use crate::entry::{LogEntry, LogVariant};
use crate::error::ExportError;
use crate::history::DisplayZone;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tracing::info;

/// Writes export documents into the configured directory
#[derive(Debug, Clone)]
pub struct Exporter {
    dir: PathBuf,
    variant: LogVariant,
    zone: DisplayZone,
    sticker: StickerConfig,
}

impl Exporter {
    pub fn new(dir: impl Into<PathBuf>, variant: LogVariant, zone: DisplayZone, sticker: StickerConfig) -> Self {
        Self {
            dir: dir.into(),
            variant,
            zone,
            sticker,
        }
    }

    pub fn from_config(config: &UnitflowConfig) -> Self {
        Self::new(
            &config.export.dir,
            config.form.variant,
            DisplayZone::from_config(&config.display),
            config.sticker.clone(),
        )
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Every entry as CSV, named after the export date
    pub async fn export_csv(&self, entries: &[LogEntry], now: DateTime<Utc>) -> Result<PathBuf, ExportError> {
        if entries.is_empty() {
            return Err(ExportError::Empty);
        }
        let name = csv_file_name(self.variant, now.date_naive());
        self.write(&name, &render_csv(self.variant, entries)).await
    }

    /// HTML table of all entries, or only the listed ids when given
    pub async fn export_html(
        &self,
        entries: &[LogEntry],
        ids: Option<&[String]>,
        now: DateTime<Utc>,
    ) -> Result<PathBuf, ExportError> {
        if entries.is_empty() {
            return Err(ExportError::Empty);
        }
        let rows = match ids {
            Some(ids) => select_entries(entries, ids)?,
            None => entries.to_vec(),
        };
        let name = format!(
            "{}_{}.html",
            self.variant.export_prefix(),
            now.date_naive().format("%Y-%m-%d")
        );
        self.write(&name, &render_html_document(self.variant, &rows, &self.zone, now))
            .await
    }

    pub async fn export_sticker(&self, entry: &LogEntry) -> Result<PathBuf, ExportError> {
        let document = render_sticker(entry, &self.sticker, &self.zone)?;
        let short_id: String = entry.id.chars().take(8).collect();
        self.write(&format!("sticker_{}.html", short_id), &document).await
    }

    async fn write(&self, name: &str, contents: &str) -> Result<PathBuf, ExportError> {
        let path = self.dir.join(name);
        let to_error = |e: std::io::Error| ExportError::Write {
            path: path.display().to_string(),
            details: e.to_string(),
        };

        tokio::fs::create_dir_all(&self.dir).await.map_err(to_error)?;
        tokio::fs::write(&path, contents).await.map_err(to_error)?;

        info!("Wrote export {} ({} bytes)", path.display(), contents.len());
        Ok(path)
    }
}
