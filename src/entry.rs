use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::ValidationError;

/// Kind of check a device logs. Fixes the form layout, columns and storage key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogVariant {
    #[default]
    WoundVac,
    CrashCart,
}

/// Every input the entry form knows about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Field {
    Unit,
    Room,
    Bed,
    Serial,
    TechName,
    CartId,
    FirstExpire,
    ExpDate,
    LockNumber,
    Notes,
}

/// How an entry was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntrySource {
    Manual,
    Scan,
}

impl LogVariant {
    /// Versioned storage key holding this variant's log
    pub fn storage_key(&self) -> &'static str {
        match self {
            LogVariant::WoundVac => "unitflow_woundvac_logs_v1",
            LogVariant::CrashCart => "unitflow_crashcart_logs_v1",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            LogVariant::WoundVac => "Wound Vac Log",
            LogVariant::CrashCart => "Crash Cart Checks",
        }
    }

    /// Prefix for export file names
    pub fn export_prefix(&self) -> &'static str {
        match self {
            LogVariant::WoundVac => "wound_vac_logs",
            LogVariant::CrashCart => "crash_cart_checks",
        }
    }

    /// Fields the form shows, in display order
    pub fn fields(&self) -> &'static [Field] {
        match self {
            LogVariant::WoundVac => &[
                Field::Unit,
                Field::Room,
                Field::Bed,
                Field::Serial,
                Field::Notes,
            ],
            LogVariant::CrashCart => &[
                Field::TechName,
                Field::CartId,
                Field::FirstExpire,
                Field::ExpDate,
                Field::LockNumber,
                Field::Notes,
            ],
        }
    }

    pub fn required_fields(&self) -> &'static [Field] {
        match self {
            LogVariant::WoundVac => &[Field::Unit, Field::Room, Field::Bed, Field::Serial],
            LogVariant::CrashCart => &[
                Field::TechName,
                Field::CartId,
                Field::FirstExpire,
                Field::ExpDate,
                Field::LockNumber,
            ],
        }
    }

    /// Location fields kept after a successful submission
    pub fn context_fields(&self) -> &'static [Field] {
        match self {
            LogVariant::WoundVac => &[Field::Unit, Field::Room, Field::Bed],
            LogVariant::CrashCart => &[Field::TechName, Field::CartId],
        }
    }

    /// Field a decoded barcode is written into
    pub fn scan_field(&self) -> Field {
        match self {
            LogVariant::WoundVac => Field::Serial,
            LogVariant::CrashCart => Field::LockNumber,
        }
    }

    pub fn accepts(&self, field: Field) -> bool {
        self.fields().contains(&field)
    }
}

impl fmt::Display for LogVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogVariant::WoundVac => write!(f, "wound_vac"),
            LogVariant::CrashCart => write!(f, "crash_cart"),
        }
    }
}

impl Field {
    /// Machine name, matching the persisted JSON keys
    pub fn key(&self) -> &'static str {
        match self {
            Field::Unit => "unit",
            Field::Room => "room",
            Field::Bed => "bed",
            Field::Serial => "serial",
            Field::TechName => "techName",
            Field::CartId => "cartId",
            Field::FirstExpire => "firstExpire",
            Field::ExpDate => "expDate",
            Field::LockNumber => "lockNumber",
            Field::Notes => "notes",
        }
    }

    /// Operator-facing label
    pub fn label(&self) -> &'static str {
        match self {
            Field::Unit => "Unit",
            Field::Room => "Room",
            Field::Bed => "Bed",
            Field::Serial => "Serial",
            Field::TechName => "Your name",
            Field::CartId => "Cart",
            Field::FirstExpire => "First supply to expire",
            Field::ExpDate => "Expiration date",
            Field::LockNumber => "Lock #",
            Field::Notes => "Notes",
        }
    }
}

impl FromStr for Field {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "unit" => Ok(Field::Unit),
            "room" => Ok(Field::Room),
            "bed" => Ok(Field::Bed),
            "serial" => Ok(Field::Serial),
            "tech" | "techname" => Ok(Field::TechName),
            "cart" | "cartid" => Ok(Field::CartId),
            "firstexpire" => Ok(Field::FirstExpire),
            "expdate" => Ok(Field::ExpDate),
            "lock" | "locknumber" => Ok(Field::LockNumber),
            "notes" | "note" => Ok(Field::Notes),
            _ => Err(ValidationError::UnknownField(s.to_string())),
        }
    }
}

impl fmt::Display for EntrySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntrySource::Manual => write!(f, "manual"),
            EntrySource::Scan => write!(f, "scan"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WoundVacRecord {
    pub unit: String,
    pub room: String,
    pub bed: String,
    pub serial: String,
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrashCartRecord {
    pub tech_name: String,
    pub cart_id: String,
    pub first_expire: String,
    /// YYYY-MM-DD as entered
    pub exp_date: String,
    pub lock_number: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub photo_data_url: String,
}

/// Variant-specific payload, tagged by `kind` in JSON
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntryRecord {
    WoundVac(WoundVacRecord),
    CrashCart(CrashCartRecord),
}

impl EntryRecord {
    /// Build a record from trimmed form values. Missing fields become "".
    pub fn from_values(variant: LogVariant, values: &BTreeMap<Field, String>) -> Self {
        let get = |field: Field| values.get(&field).map(|v| v.trim().to_string()).unwrap_or_default();
        match variant {
            LogVariant::WoundVac => EntryRecord::WoundVac(WoundVacRecord {
                unit: get(Field::Unit),
                room: get(Field::Room),
                bed: get(Field::Bed),
                serial: get(Field::Serial),
                notes: get(Field::Notes),
            }),
            LogVariant::CrashCart => EntryRecord::CrashCart(CrashCartRecord {
                tech_name: get(Field::TechName),
                cart_id: get(Field::CartId),
                first_expire: get(Field::FirstExpire),
                exp_date: get(Field::ExpDate),
                lock_number: get(Field::LockNumber),
                notes: get(Field::Notes),
                photo_data_url: String::new(),
            }),
        }
    }

    pub fn variant(&self) -> LogVariant {
        match self {
            EntryRecord::WoundVac(_) => LogVariant::WoundVac,
            EntryRecord::CrashCart(_) => LogVariant::CrashCart,
        }
    }

    /// Value of a field, "" when the field does not belong to this variant
    pub fn value(&self, field: Field) -> &str {
        match (self, field) {
            (EntryRecord::WoundVac(r), Field::Unit) => &r.unit,
            (EntryRecord::WoundVac(r), Field::Room) => &r.room,
            (EntryRecord::WoundVac(r), Field::Bed) => &r.bed,
            (EntryRecord::WoundVac(r), Field::Serial) => &r.serial,
            (EntryRecord::WoundVac(r), Field::Notes) => &r.notes,
            (EntryRecord::CrashCart(r), Field::TechName) => &r.tech_name,
            (EntryRecord::CrashCart(r), Field::CartId) => &r.cart_id,
            (EntryRecord::CrashCart(r), Field::FirstExpire) => &r.first_expire,
            (EntryRecord::CrashCart(r), Field::ExpDate) => &r.exp_date,
            (EntryRecord::CrashCart(r), Field::LockNumber) => &r.lock_number,
            (EntryRecord::CrashCart(r), Field::Notes) => &r.notes,
            _ => "",
        }
    }

    /// Unit for wound vacs, cart id for crash carts
    pub fn location_id(&self) -> &str {
        match self {
            EntryRecord::WoundVac(r) => &r.unit,
            EntryRecord::CrashCart(r) => &r.cart_id,
        }
    }

    /// The serial / lock number the scanner targets
    pub fn primary_value(&self) -> &str {
        self.value(self.variant().scan_field())
    }

    pub fn photo_data_url(&self) -> Option<&str> {
        match self {
            EntryRecord::CrashCart(r) if !r.photo_data_url.is_empty() => Some(&r.photo_data_url),
            _ => None,
        }
    }

    /// Required fields that are empty
    pub fn missing_fields(&self) -> Vec<Field> {
        self.variant()
            .required_fields()
            .iter()
            .copied()
            .filter(|f| self.value(*f).trim().is_empty())
            .collect()
    }
}

/// One persisted record of a check or scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub source: EntrySource,
    #[serde(flatten)]
    pub record: EntryRecord,
}

impl LogEntry {
    /// Create an entry stamped now with a fresh id
    pub fn new(record: EntryRecord, source: EntrySource) -> Self {
        Self::with_timestamp(record, source, Utc::now())
    }

    pub fn with_timestamp(record: EntryRecord, source: EntrySource, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            created_at,
            source,
            record,
        }
    }

    pub fn variant(&self) -> LogVariant {
        self.record.variant()
    }

    /// Every required field is filled
    pub fn is_complete(&self) -> bool {
        self.record.missing_fields().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wound_vac() -> EntryRecord {
        EntryRecord::WoundVac(WoundVacRecord {
            unit: "3N".to_string(),
            room: "204".to_string(),
            bed: "A".to_string(),
            serial: "SN123".to_string(),
            notes: String::new(),
        })
    }

    #[test]
    fn test_entry_json_layout() {
        let entry = LogEntry::new(wound_vac(), EntrySource::Manual);
        let json = serde_json::to_value(&entry).unwrap();

        assert_eq!(json["kind"], "wound_vac");
        assert_eq!(json["source"], "manual");
        assert_eq!(json["unit"], "3N");
        assert!(json.get("createdAt").is_some());

        let back: LogEntry = serde_json::from_value(json).unwrap();
        assert_eq!(back, entry);
    }

    #[test]
    fn test_crash_cart_camel_case_keys() {
        let mut values = BTreeMap::new();
        values.insert(Field::TechName, " Dana ".to_string());
        values.insert(Field::CartId, "CC-7".to_string());
        let record = EntryRecord::from_values(LogVariant::CrashCart, &values);
        let json = serde_json::to_value(LogEntry::new(record, EntrySource::Scan)).unwrap();

        assert_eq!(json["kind"], "crash_cart");
        assert_eq!(json["techName"], "Dana");
        assert_eq!(json["cartId"], "CC-7");
        assert_eq!(json["photoDataUrl"], "");
    }

    #[test]
    fn test_missing_fields() {
        let mut values = BTreeMap::new();
        values.insert(Field::Unit, "3N".to_string());
        values.insert(Field::Room, "   ".to_string());
        let record = EntryRecord::from_values(LogVariant::WoundVac, &values);

        assert_eq!(
            record.missing_fields(),
            vec![Field::Room, Field::Bed, Field::Serial]
        );
        assert!(wound_vac().missing_fields().is_empty());
    }

    #[test]
    fn test_field_parsing() {
        assert_eq!("first-expire".parse::<Field>().unwrap(), Field::FirstExpire);
        assert_eq!("lockNumber".parse::<Field>().unwrap(), Field::LockNumber);
        assert_eq!("tech".parse::<Field>().unwrap(), Field::TechName);
        assert!("patient".parse::<Field>().is_err());
    }

    #[test]
    fn test_value_outside_variant_is_empty() {
        assert_eq!(wound_vac().value(Field::CartId), "");
        assert_eq!(wound_vac().primary_value(), "SN123");
        assert_eq!(wound_vac().location_id(), "3N");
    }
}
