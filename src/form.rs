use crate::config::{AutoLogMode, FormConfig};
use crate::entry::{EntryRecord, EntrySource, Field, LogEntry, LogVariant};
use crate::error::{Result, ValidationError};
use crate::events::OperatorStatus;
use crate::store::{LogStore, Preferences};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info, warn};

/// What happened to an accepted scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    /// Every required field was filled, so the scan was logged
    Logged(LogEntry),
    /// The value went into the form; `missing` lists what still blocks logging
    Captured { missing: Vec<Field> },
}

impl ScanOutcome {
    /// Status line for the operator
    pub fn status(&self) -> OperatorStatus {
        match self {
            ScanOutcome::Logged(entry) => OperatorStatus::info(format!(
                "Logged {} from scan",
                entry.record.primary_value()
            )),
            ScanOutcome::Captured { missing } if missing.is_empty() => {
                OperatorStatus::info("Value captured, press Enter to log")
            }
            ScanOutcome::Captured { missing } => {
                OperatorStatus::info("Value captured, complete remaining fields to log").with_hint(
                    format!(
                        "Missing: {}",
                        missing.iter().map(|f| f.label()).collect::<Vec<_>>().join(", ")
                    ),
                )
            }
        }
    }
}

/// Photo waiting to be saved with the next crash cart check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingPhoto {
    pub file_name: String,
    pub size: u64,
    pub data_url: String,
}

/// Values typed or scanned for the next entry
pub struct EntryForm {
    variant: LogVariant,
    values: BTreeMap<Field, String>,
    auto_log: AutoLogMode,
    photo: Option<PendingPhoto>,
    photo_max_bytes: u64,
    remember_tech: bool,
    preferences: Option<Preferences>,
}

impl EntryForm {
    pub fn new(variant: LogVariant, auto_log: AutoLogMode) -> Self {
        Self {
            variant,
            values: BTreeMap::new(),
            auto_log,
            photo: None,
            photo_max_bytes: 2 * 1024 * 1024,
            remember_tech: true,
            preferences: None,
        }
    }

    pub fn from_config(config: &FormConfig) -> Self {
        Self {
            photo_max_bytes: config.photo_max_bytes,
            remember_tech: config.remember_tech,
            ..Self::new(config.variant, config.auto_log)
        }
    }

    /// Remember the tech name between submissions in this store
    pub fn with_preferences(mut self, preferences: Preferences) -> Self {
        self.preferences = Some(preferences);
        self
    }

    /// Prefill the tech name saved by an earlier submission
    pub async fn load_remembered(&mut self) {
        if !self.tracks_tech_name() || !self.get(Field::TechName).is_empty() {
            return;
        }
        if let Some(prefs) = &self.preferences {
            if let Some(name) = prefs.tech_name().await {
                debug!("Prefilling tech name {}", name);
                self.values.insert(Field::TechName, name);
            }
        }
    }

    pub fn variant(&self) -> LogVariant {
        self.variant
    }

    pub fn auto_log(&self) -> AutoLogMode {
        self.auto_log
    }

    pub fn set_auto_log(&mut self, mode: AutoLogMode) {
        self.auto_log = mode;
    }

    pub fn set(&mut self, field: Field, value: impl Into<String>) -> Result<()> {
        if !self.variant.accepts(field) {
            return Err(ValidationError::UnknownField(field.key().to_string()).into());
        }
        self.values.insert(field, value.into());
        Ok(())
    }

    pub fn get(&self, field: Field) -> &str {
        self.values.get(&field).map(|v| v.as_str()).unwrap_or("")
    }

    /// Required fields still empty after trimming
    pub fn missing_fields(&self) -> Vec<Field> {
        self.record().missing_fields()
    }

    pub fn photo(&self) -> Option<&PendingPhoto> {
        self.photo.as_ref()
    }

    fn tracks_tech_name(&self) -> bool {
        self.remember_tech && self.variant == LogVariant::CrashCart
    }

    fn record(&self) -> EntryRecord {
        let mut record = EntryRecord::from_values(self.variant, &self.values);
        if let (EntryRecord::CrashCart(cart), Some(photo)) = (&mut record, &self.photo) {
            cart.photo_data_url = photo.data_url.clone();
        }
        record
    }

    /// Validate and log the current values as a manual entry
    pub async fn submit_manual(&mut self, store: &LogStore) -> Result<LogEntry> {
        let missing = self.missing_fields();
        if !missing.is_empty() {
            return Err(missing_error(&missing).into());
        }
        self.commit(store, EntrySource::Manual).await
    }

    /// Feed an accepted scan value into the form, logging it when allowed
    pub async fn on_scan_accepted(&mut self, value: &str, store: &LogStore) -> Result<ScanOutcome> {
        let value = value.trim();
        self.values.insert(self.variant.scan_field(), value.to_string());

        if self.auto_log == AutoLogMode::Off {
            debug!("Auto-log off, captured {}", value);
            return Ok(ScanOutcome::Captured {
                missing: Vec::new(),
            });
        }

        let missing = self.missing_fields();
        if !missing.is_empty() {
            debug!("Captured {}, still missing {:?}", value, missing);
            return Ok(ScanOutcome::Captured { missing });
        }

        let entry = self.commit(store, EntrySource::Scan).await?;
        Ok(ScanOutcome::Logged(entry))
    }

    async fn commit(&mut self, store: &LogStore, source: EntrySource) -> Result<LogEntry> {
        let entry = LogEntry::new(self.record(), source);
        store.append(entry.clone()).await?;
        info!(
            "Logged {} entry {} ({})",
            self.variant,
            entry.id,
            entry.record.primary_value()
        );

        if self.tracks_tech_name() {
            if let Some(prefs) = &self.preferences {
                // The entry is already saved; a lost preference is only a warning
                if let Err(e) = prefs.remember_tech_name(self.get(Field::TechName)).await {
                    warn!("Failed to remember tech name: {}", e);
                }
            }
        }

        self.reset_after_submit();
        Ok(entry)
    }

    /// Keep the location context for the next check, drop everything else
    fn reset_after_submit(&mut self) {
        let context = self.variant.context_fields();
        self.values.retain(|field, _| context.contains(field));
        self.photo = None;
    }

    /// Empty the form, keeping only a remembered tech name
    pub fn clear(&mut self) {
        let keep_tech = self.tracks_tech_name();
        self.values
            .retain(|field, _| keep_tech && *field == Field::TechName);
        self.photo = None;
    }

    /// Attach a photo file to the pending crash cart check
    pub async fn attach_photo(&mut self, path: &Path) -> Result<&PendingPhoto> {
        if self.variant != LogVariant::CrashCart {
            return Err(ValidationError::PhotoUnsupported.into());
        }

        let size = tokio::fs::metadata(path).await?.len();
        if size > self.photo_max_bytes {
            return Err(ValidationError::PhotoTooLarge {
                size,
                limit: self.photo_max_bytes,
            }
            .into());
        }

        let bytes = tokio::fs::read(path).await?;
        let data_url = format!("data:{};base64,{}", mime_for(path), BASE64.encode(&bytes));
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        info!("Attached photo {} ({} bytes)", file_name, size);
        Ok(self.photo.insert(PendingPhoto {
            file_name,
            size,
            data_url,
        }))
    }

    pub fn remove_photo(&mut self) {
        self.photo = None;
    }
}

fn missing_error(missing: &[Field]) -> ValidationError {
    ValidationError::MissingFields(missing.iter().map(|f| f.label().to_string()).collect())
}

fn mime_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "heic" => "image/heic",
        "bmp" => "image/bmp",
        _ => "application/octet-stream",
    }
}
