use crate::entry::LogVariant;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct UnitflowConfig {
    pub store: StoreConfig,
    pub form: FormConfig,
    pub scanner: ScannerConfig,
    pub camera: CameraConfig,
    pub display: DisplayConfig,
    pub export: ExportConfig,
    pub sticker: StickerConfig,
    pub dashboard: DashboardConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StoreConfig {
    /// Directory holding one JSON file per storage key
    #[serde(default = "default_store_path")]
    pub path: String,

    /// Order entries are kept in on disk
    #[serde(default)]
    pub order: StoreOrder,

    /// Oldest entries beyond this count are dropped on save
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum StoreOrder {
    #[default]
    NewestFirst,
    AppendLast,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct FormConfig {
    /// Which kind of check this device logs
    #[serde(default)]
    pub variant: LogVariant,

    /// Whether an accepted scan writes an entry on its own
    #[serde(default)]
    pub auto_log: AutoLogMode,

    /// Largest photo accepted for crash cart checks
    #[serde(default = "default_photo_max_bytes")]
    pub photo_max_bytes: u64,

    /// Prefill the tech name from the previous submission
    #[serde(default = "default_remember_tech")]
    pub remember_tech: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum AutoLogMode {
    /// Scans only fill the serial field
    Off,
    /// Scans log immediately when every other required field is filled
    #[default]
    WhenComplete,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ScannerConfig {
    /// Decoder selection: auto, zbar, external or none
    #[serde(default)]
    pub engine: EngineChoice,

    /// Delay between decode samples
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Identical reads inside this window are dropped
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,

    /// Consecutive failed frames before the operator is warned
    #[serde(default = "default_warn_after_failed_frames")]
    pub warn_after_failed_frames: u32,

    /// Upper bound for a single decode call
    #[serde(default = "default_decode_timeout_ms")]
    pub decode_timeout_ms: u64,

    /// Program name of the native decoder
    #[serde(default = "default_zbar_program")]
    pub zbar_program: String,

    /// Fallback decoder program (one decoded value per output line)
    pub external_program: Option<String>,

    /// Arguments for the fallback program; `{input}` is replaced by the frame path
    #[serde(default)]
    pub external_args: Vec<String>,

    /// Where frames are written for the decoder; system temp dir when unset
    pub scratch_dir: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum EngineChoice {
    #[default]
    Auto,
    Zbar,
    External,
    None,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CameraConfig {
    /// Camera device index (e.g., 0 for /dev/video0)
    #[serde(default = "default_camera_index")]
    pub index: u32,

    /// Target resolution (width, height)
    #[serde(default = "default_camera_resolution")]
    pub resolution: (u32, u32),

    /// Frames per second requested from the device
    #[serde(default = "default_camera_fps")]
    pub fps: u32,

    /// Preferred sensor
    #[serde(default)]
    pub facing: Facing,

    /// Attempts to acquire the device, including the first one
    #[serde(default = "default_acquire_max_attempts")]
    pub acquire_max_attempts: u32,

    /// Fixed delay before a retry with relaxed constraints
    #[serde(default = "default_acquire_retry_delay_ms")]
    pub acquire_retry_delay_ms: u64,

    /// Upper bound for pulling one frame from the device
    #[serde(default = "default_frame_timeout_ms")]
    pub frame_timeout_ms: u64,

    /// Restart scanning when the session becomes visible again
    #[serde(default = "default_resume_on_visible")]
    pub resume_on_visible: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Facing {
    #[default]
    Rear,
    Front,
    Any,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct DisplayConfig {
    /// IANA timezone for timestamps and "today"; system local time when unset
    pub timezone: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ExportConfig {
    /// Directory export files are written to
    #[serde(default = "default_export_dir")]
    pub dir: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StickerConfig {
    #[serde(default = "default_sticker_facility")]
    pub facility: String,

    #[serde(default = "default_sticker_department")]
    pub department: String,

    #[serde(default)]
    pub phone: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DashboardConfig {
    /// IP address to bind to
    #[serde(default = "default_dashboard_ip")]
    pub ip: String,

    /// Port to listen on
    #[serde(default = "default_dashboard_port")]
    pub port: u16,
}

impl UnitflowConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("unitflow.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            .set_default("store.path", default_store_path())?
            .set_default("store.order", "newest_first")?
            .set_default("store.max_entries", default_max_entries() as i64)?
            .set_default("form.variant", "wound_vac")?
            .set_default("form.auto_log", "when_complete")?
            .set_default("form.photo_max_bytes", default_photo_max_bytes())?
            .set_default("form.remember_tech", default_remember_tech())?
            .set_default("scanner.engine", "auto")?
            .set_default("scanner.poll_interval_ms", default_poll_interval_ms())?
            .set_default("scanner.cooldown_ms", default_cooldown_ms())?
            .set_default(
                "scanner.warn_after_failed_frames",
                default_warn_after_failed_frames(),
            )?
            .set_default("scanner.decode_timeout_ms", default_decode_timeout_ms())?
            .set_default("scanner.zbar_program", default_zbar_program())?
            .set_default("camera.index", default_camera_index())?
            .set_default(
                "camera.resolution",
                vec![default_camera_resolution().0, default_camera_resolution().1],
            )?
            .set_default("camera.fps", default_camera_fps())?
            .set_default("camera.facing", "rear")?
            .set_default(
                "camera.acquire_max_attempts",
                default_acquire_max_attempts(),
            )?
            .set_default(
                "camera.acquire_retry_delay_ms",
                default_acquire_retry_delay_ms(),
            )?
            .set_default("camera.frame_timeout_ms", default_frame_timeout_ms())?
            .set_default("camera.resume_on_visible", default_resume_on_visible())?
            .set_default("export.dir", default_export_dir())?
            .set_default("sticker.facility", default_sticker_facility())?
            .set_default("sticker.department", default_sticker_department())?
            .set_default("sticker.phone", "")?
            .set_default("dashboard.ip", default_dashboard_ip())?
            .set_default("dashboard.port", default_dashboard_port())?
            // Add configuration file (optional)
            .add_source(File::with_name(&path_str).required(false))
            // UNITFLOW_STORE__MAX_ENTRIES=100 style overrides
            .add_source(
                Environment::with_prefix("UNITFLOW")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let config: UnitflowConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.store.path.trim().is_empty() {
            return Err(ConfigError::Message(
                "Store path must not be empty".to_string(),
            ));
        }

        if self.store.max_entries == 0 {
            return Err(ConfigError::Message(
                "Store max_entries must be greater than 0".to_string(),
            ));
        }

        if self.scanner.poll_interval_ms == 0 {
            return Err(ConfigError::Message(
                "Scanner poll_interval_ms must be greater than 0".to_string(),
            ));
        }

        if self.scanner.decode_timeout_ms == 0 {
            return Err(ConfigError::Message(
                "Scanner decode_timeout_ms must be greater than 0".to_string(),
            ));
        }

        if self.scanner.engine == EngineChoice::External && self.scanner.external_program.is_none()
        {
            return Err(ConfigError::Message(
                "Scanner engine 'external' requires scanner.external_program".to_string(),
            ));
        }

        if self.camera.resolution.0 == 0 || self.camera.resolution.1 == 0 {
            return Err(ConfigError::Message(
                "Camera resolution must be greater than 0".to_string(),
            ));
        }

        if self.camera.fps == 0 {
            return Err(ConfigError::Message(
                "Camera fps must be greater than 0".to_string(),
            ));
        }

        if self.camera.acquire_max_attempts == 0 {
            return Err(ConfigError::Message(
                "Camera acquire_max_attempts must be at least 1".to_string(),
            ));
        }

        if let Some(tz) = &self.display.timezone {
            if tz.parse::<chrono_tz::Tz>().is_err() {
                return Err(ConfigError::Message(format!(
                    "Unknown display timezone '{}'",
                    tz
                )));
            }
        }

        Ok(())
    }
}

impl ScannerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    pub fn decode_timeout(&self) -> Duration {
        Duration::from_millis(self.decode_timeout_ms)
    }

    pub fn scratch_path(&self) -> PathBuf {
        match &self.scratch_dir {
            Some(dir) => PathBuf::from(dir),
            None => std::env::temp_dir().join("unitflow"),
        }
    }
}

impl Default for UnitflowConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig {
                path: default_store_path(),
                order: StoreOrder::default(),
                max_entries: default_max_entries(),
            },
            form: FormConfig {
                variant: LogVariant::default(),
                auto_log: AutoLogMode::default(),
                photo_max_bytes: default_photo_max_bytes(),
                remember_tech: default_remember_tech(),
            },
            scanner: ScannerConfig {
                engine: EngineChoice::default(),
                poll_interval_ms: default_poll_interval_ms(),
                cooldown_ms: default_cooldown_ms(),
                warn_after_failed_frames: default_warn_after_failed_frames(),
                decode_timeout_ms: default_decode_timeout_ms(),
                zbar_program: default_zbar_program(),
                external_program: None,
                external_args: Vec::new(),
                scratch_dir: None,
            },
            camera: CameraConfig {
                index: default_camera_index(),
                resolution: default_camera_resolution(),
                fps: default_camera_fps(),
                facing: Facing::default(),
                acquire_max_attempts: default_acquire_max_attempts(),
                acquire_retry_delay_ms: default_acquire_retry_delay_ms(),
                frame_timeout_ms: default_frame_timeout_ms(),
                resume_on_visible: default_resume_on_visible(),
            },
            display: DisplayConfig::default(),
            export: ExportConfig {
                dir: default_export_dir(),
            },
            sticker: StickerConfig {
                facility: default_sticker_facility(),
                department: default_sticker_department(),
                phone: String::new(),
            },
            dashboard: DashboardConfig {
                ip: default_dashboard_ip(),
                port: default_dashboard_port(),
            },
        }
    }
}

// Default value functions
fn default_store_path() -> String {
    "./unitflow-data".to_string()
}
fn default_max_entries() -> usize {
    5000
}

fn default_photo_max_bytes() -> u64 {
    2 * 1024 * 1024
}
fn default_remember_tech() -> bool {
    true
}

fn default_poll_interval_ms() -> u64 {
    250
} // ~4 samples per second
fn default_cooldown_ms() -> u64 {
    2500
}
fn default_warn_after_failed_frames() -> u32 {
    40
}
fn default_decode_timeout_ms() -> u64 {
    2000
}
fn default_zbar_program() -> String {
    "zbarimg".to_string()
}

fn default_camera_index() -> u32 {
    0
}
fn default_camera_resolution() -> (u32, u32) {
    (1280, 720)
}
fn default_camera_fps() -> u32 {
    30
}
fn default_acquire_max_attempts() -> u32 {
    2
}
fn default_acquire_retry_delay_ms() -> u64 {
    300
}
fn default_frame_timeout_ms() -> u64 {
    1000
}
fn default_resume_on_visible() -> bool {
    true
}

fn default_export_dir() -> String {
    "./exports".to_string()
}

fn default_sticker_facility() -> String {
    "Central Supply".to_string()
}
fn default_sticker_department() -> String {
    "Central Department".to_string()
}

fn default_dashboard_ip() -> String {
    "127.0.0.1".to_string()
}
fn default_dashboard_port() -> u16 {
    8080
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = UnitflowConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.scanner.poll_interval(), Duration::from_millis(250));
        assert_eq!(config.camera.acquire_max_attempts, 2);
        assert_eq!(config.form.variant, LogVariant::WoundVac);
    }

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[store]
order = "append_last"
max_entries = 10

[form]
variant = "crash_cart"
auto_log = "off"

[scanner]
cooldown_ms = 3000
"#
        )
        .unwrap();

        let config = UnitflowConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.store.order, StoreOrder::AppendLast);
        assert_eq!(config.store.max_entries, 10);
        assert_eq!(config.form.variant, LogVariant::CrashCart);
        assert_eq!(config.form.auto_log, AutoLogMode::Off);
        assert_eq!(config.scanner.cooldown(), Duration::from_millis(3000));
        // Untouched sections keep their defaults
        assert_eq!(config.camera.fps, 30);
        assert_eq!(config.dashboard.port, 8080);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = UnitflowConfig::load_from_file("/nonexistent/unitflow.toml").unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.store.path, "./unitflow-data");
    }

    #[test]
    fn test_environment_overrides_nested_keys() {
        // Only sticker.phone is touched so parallel tests see their own values
        std::env::set_var("UNITFLOW_STICKER__PHONE", "555-0100");
        let config = UnitflowConfig::load_from_file("/nonexistent/unitflow.toml");
        std::env::remove_var("UNITFLOW_STICKER__PHONE");

        let config = config.unwrap();
        assert_eq!(config.sticker.phone, "555-0100");
        assert_eq!(config.sticker.facility, default_sticker_facility());
    }

    #[test]
    fn test_config_validation() {
        let mut config = UnitflowConfig::default();

        config.camera.resolution = (0, 0);
        assert!(config.validate().is_err());
        config.camera.resolution = (640, 480);
        assert!(config.validate().is_ok());

        config.scanner.engine = EngineChoice::External;
        assert!(config.validate().is_err());
        config.scanner.external_program = Some("zxing-cli".to_string());
        assert!(config.validate().is_ok());

        config.display.timezone = Some("Mars/Olympus".to_string());
        assert!(config.validate().is_err());
        config.display.timezone = Some("America/Los_Angeles".to_string());
        assert!(config.validate().is_ok());
    }
}
