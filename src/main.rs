use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{CommandFactory, Parser, Subcommand};
use crossterm::tty::IsTty;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;

use unitflow::app::{command_for_key, ScanCommand, ScanSession};
use unitflow::camera::{platform_device, CaptureDevice, MockCaptureDevice, UnavailableDevice};
use unitflow::config::{AutoLogMode, UnitflowConfig};
use unitflow::entry::{Field, LogEntry};
use unitflow::events::EventBus;
use unitflow::export::Exporter;
use unitflow::form::EntryForm;
use unitflow::history::{render_detail, search, summarize, DisplayZone};
use unitflow::scanner::{probe_decoder, probe_with_report};
use unitflow::store::{FileBackend, KeyValueBackend, LogStore, Preferences};

#[derive(Parser, Debug)]
#[command(name = "unitflow")]
#[command(about = "Equipment check logging with camera barcode intake")]
#[command(version)]
#[command(long_about = "Logs crash cart checks or wound vac placements to a local store. \
Entries come from a form or from barcodes read off the camera, and can be searched, \
summarized and exported as CSV, HTML tables or printable stickers.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "unitflow.toml", help = "Path to TOML configuration file")]
    config: String,

    /// Enable debug logging (most verbose)
    #[arg(short, long, help = "Enable debug level logging")]
    debug: bool,

    /// Enable verbose logging (info level)
    #[arg(short, long, help = "Enable verbose info level logging")]
    verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(short, long, help = "Enable quiet mode - only log errors")]
    quiet: bool,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration file and exit")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,

    /// Also write logs to a daily rolling file in this directory
    #[arg(long, value_name = "DIR")]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Log an entry from field values, e.g. `add -f unit=3N -f room=204`
    Add {
        #[arg(short = 'f', long = "field", value_name = "NAME=VALUE", value_parser = parse_field_value)]
        fields: Vec<(Field, String)>,

        /// Photo of the cart (crash cart checks only)
        #[arg(long)]
        photo: Option<PathBuf>,
    },
    /// List entries, newest first
    List {
        #[arg(short = 'Q', long)]
        query: Option<String>,
    },
    /// Show one entry in full
    Show { id: String },
    /// Total, today and distinct location counts
    Summary,
    /// Remove one entry
    Delete { id: String },
    /// Remove every entry of the configured log
    Wipe {
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
    /// Write every entry to a CSV file in the export directory
    ExportCsv,
    /// Write an HTML table, optionally of selected entries only
    ExportHtml {
        #[arg(long, value_delimiter = ',')]
        ids: Vec<String>,
    },
    /// Write a printable sticker for a crash cart check
    Sticker { id: String },
    /// Interactive camera session
    Scan {
        /// Context values kept between scans, e.g. `-f unit=3N`
        #[arg(short = 'f', long = "field", value_name = "NAME=VALUE", value_parser = parse_field_value)]
        fields: Vec<(Field, String)>,

        #[arg(long, conflicts_with = "no_auto_log")]
        auto_log: bool,

        #[arg(long)]
        no_auto_log: bool,

        /// Use a synthetic camera instead of the platform device
        #[arg(long)]
        mock_camera: bool,

        /// Serve this JPEG as every camera frame (implies --mock-camera)
        #[arg(long, value_name = "FILE")]
        mock_image: Option<PathBuf>,
    },
    /// Report which decoder and camera this host can use
    Probe,
    /// Run the HTTP dashboard
    Serve,
}

fn parse_field_value(raw: &str) -> std::result::Result<(Field, String), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got '{}'", raw))?;
    let field = name.parse::<Field>().map_err(|e| e.to_string())?;
    Ok((field, value.to_string()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        print_default_config();
        return Ok(());
    }

    let _log_guard = init_logging(&args)?;

    info!("Starting unitflow v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    let config = match UnitflowConfig::load_from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if args.validate_config {
        match config.validate() {
            Ok(()) => {
                println!("✓ Configuration is valid");
                return Ok(());
            }
            Err(e) => {
                eprintln!("✗ Configuration validation failed: {}", e);
                std::process::exit(1);
            }
        }
    }
    config.validate().context("invalid configuration")?;

    let Some(command) = args.command else {
        Args::command().print_help()?;
        return Ok(());
    };

    let backend: Arc<dyn KeyValueBackend> = Arc::new(FileBackend::new(&config.store.path));
    let store = Arc::new(LogStore::from_config(
        Arc::clone(&backend),
        config.form.variant.storage_key(),
        &config.store,
    ));
    let zone = DisplayZone::from_config(&config.display);
    let exporter = Exporter::from_config(&config);

    match command {
        Command::Add { fields, photo } => {
            let mut form = new_form(&config, &backend).await;
            for (field, value) in fields {
                form.set(field, value)?;
            }
            if let Some(path) = photo {
                let attached = form.attach_photo(&path).await?;
                info!("Attached {} ({} bytes)", attached.file_name, attached.size);
            }
            let entry = form.submit_manual(&store).await?;
            println!("Logged {} ({})", entry.id, entry.record.primary_value());
        }
        Command::List { query } => {
            let entries = store.load().await;
            let rows = search(&entries, query.as_deref().unwrap_or(""), &zone);
            for entry in &rows {
                println!("{}", list_line(entry, &zone));
            }
            println!("{} of {} shown", rows.len(), entries.len());
        }
        Command::Show { id } => match store.find(&id).await {
            Some(entry) => print!("{}", render_detail(&entry, &zone)),
            None => bail!("Entry {} not found", id),
        },
        Command::Summary => {
            let summary = summarize(&store.load().await, &zone, Utc::now());
            println!("{}", config.form.variant.title());
            println!("  total      {}", summary.total);
            println!("  today      {}", summary.today);
            println!("  locations  {}", summary.distinct_locations);
        }
        Command::Delete { id } => {
            if !store.remove(&id).await? {
                bail!("Entry {} not found", id);
            }
            println!("Deleted {}", id);
        }
        Command::Wipe { yes } => {
            let count = store.len().await;
            if !yes && !confirm_wipe(count)? {
                println!("Nothing deleted");
                return Ok(());
            }
            store.wipe_all().await?;
            println!("Deleted {} entries", count);
        }
        Command::ExportCsv => {
            let path = exporter.export_csv(&store.load().await, Utc::now()).await?;
            println!("{}", path.display());
        }
        Command::ExportHtml { ids } => {
            let selection = (!ids.is_empty()).then_some(ids.as_slice());
            let path = exporter
                .export_html(&store.load().await, selection, Utc::now())
                .await?;
            println!("{}", path.display());
        }
        Command::Sticker { id } => {
            let entry = store
                .find(&id)
                .await
                .with_context(|| format!("Entry {} not found", id))?;
            let path = exporter.export_sticker(&entry).await?;
            println!("{}", path.display());
        }
        Command::Scan {
            fields,
            auto_log,
            no_auto_log,
            mock_camera,
            mock_image,
        } => {
            let mut form = new_form(&config, &backend).await;
            if auto_log {
                form.set_auto_log(AutoLogMode::WhenComplete);
            } else if no_auto_log {
                form.set_auto_log(AutoLogMode::Off);
            }
            for (field, value) in fields {
                form.set(field, value)?;
            }

            let device = open_device(&config, mock_camera, mock_image).await?;
            let decoder = probe_decoder(&config.scanner).await;
            let mut session = ScanSession::new(
                &config,
                device,
                decoder,
                Arc::clone(&store),
                form,
                EventBus::with_debug_logging(256),
            );

            if std::io::stdin().is_tty() {
                session.set_keyboard_enabled(true);
            } else {
                spawn_line_commands(session.commands());
            }

            let exit_code = session.run(true).await.map_err(|e| {
                error!("Scan session failed: {}", e);
                e
            })?;
            info!("Scan session exited with code: {}", exit_code);
            std::process::exit(exit_code);
        }
        Command::Probe => {
            let (_, report) = probe_with_report(&config.scanner).await;
            let camera = match platform_device(&config.camera) {
                Ok(device) => serde_json::json!({ "available": true, "device": device.name() }),
                Err(e) => serde_json::json!({
                    "available": false,
                    "error": e.to_string(),
                    "hint": e.hint(),
                }),
            };
            let output = serde_json::json!({ "decoder": report, "camera": camera });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Command::Serve => serve(&config, store).await?,
    }

    Ok(())
}

async fn new_form(config: &UnitflowConfig, backend: &Arc<dyn KeyValueBackend>) -> EntryForm {
    let mut form =
        EntryForm::from_config(&config.form).with_preferences(Preferences::new(Arc::clone(backend)));
    form.load_remembered().await;
    form
}

async fn open_device(
    config: &UnitflowConfig,
    mock_camera: bool,
    mock_image: Option<PathBuf>,
) -> Result<Arc<dyn CaptureDevice>> {
    if let Some(path) = mock_image {
        let bytes = tokio::fs::read(&path)
            .await
            .with_context(|| format!("reading mock image {}", path.display()))?;
        return Ok(Arc::new(
            MockCaptureDevice::new(config.camera.resolution).with_frame_bytes(bytes),
        ));
    }
    if mock_camera {
        return Ok(Arc::new(MockCaptureDevice::new(config.camera.resolution)));
    }

    Ok(match platform_device(&config.camera) {
        Ok(device) => device,
        Err(e) => {
            // Manual entry still works without a camera
            warn!("Camera unavailable: {} ({})", e, e.hint());
            Arc::new(UnavailableDevice::new(e))
        }
    })
}

/// Drive the session from piped input: one key per line, blank line submits
fn spawn_line_commands(commands: mpsc::UnboundedSender<ScanCommand>) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let key = match line.trim().chars().next() {
                Some(c) => crossterm::event::KeyCode::Char(c),
                None => crossterm::event::KeyCode::Enter,
            };
            if let Some(command) = command_for_key(key) {
                if commands.send(command).is_err() {
                    return;
                }
            }
        }
        let _ = commands.send(ScanCommand::Quit);
    });
}

fn list_line(entry: &LogEntry, zone: &DisplayZone) -> String {
    format!(
        "{}  {}  {:<8}  {:<16}  {}",
        entry.id,
        zone.format_timestamp(entry.created_at),
        entry.record.location_id(),
        entry.record.primary_value(),
        entry.source
    )
}

fn confirm_wipe(count: usize) -> Result<bool> {
    use std::io::Write;

    print!(
        "This deletes all {} entries and cannot be undone. Type 'yes' to continue: ",
        count
    );
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().read_line(&mut answer)?;
    Ok(answer.trim().eq_ignore_ascii_case("yes"))
}

#[cfg(feature = "dashboard")]
async fn serve(config: &UnitflowConfig, store: Arc<LogStore>) -> Result<()> {
    use unitflow::dashboard::{DashboardServer, DashboardState};

    let state = DashboardState::new(store, EventBus::with_debug_logging(64), config);
    let server = DashboardServer::new(config.dashboard.clone(), state);
    println!("Dashboard on http://{}", server.address());

    server
        .serve(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Received SIGINT signal (Ctrl+C)");
        })
        .await?;
    Ok(())
}

#[cfg(not(feature = "dashboard"))]
async fn serve(_config: &UnitflowConfig, _store: Arc<LogStore>) -> Result<()> {
    bail!("this build has no dashboard; rebuild with --features dashboard")
}

fn init_logging(args: &Args) -> Result<Option<WorkerGuard>> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    let log_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else if args.quiet {
        "error"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("unitflow={}", log_level)));

    // Logs go to stderr; stdout carries command output
    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        Some("compact") => fmt::layer()
            .compact()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .boxed(),
        Some("pretty") | None => fmt::layer()
            .pretty()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(args.debug)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_ids(args.debug)
                .with_file(args.debug)
                .with_line_number(args.debug)
                .boxed()
        }
    };

    let (file_layer, guard) = match &args.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "unitflow.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(file_layer)
        .with(env_filter)
        .init();

    Ok(guard)
}

/// Print default configuration in TOML format
fn print_default_config() {
    println!("# UnitFlow Configuration File");
    println!("# This is the default configuration with all available options");
    println!("# Any key can be overridden from the environment, e.g. UNITFLOW_STORE__MAX_ENTRIES=100");
    println!();

    let default_config = r#"[store]
# Directory holding one JSON file per log
path = "./unitflow-data"
# "newest_first" or "append_last"
order = "newest_first"
# Oldest entries beyond this count are dropped
max_entries = 5000

[form]
# "wound_vac" or "crash_cart"
variant = "wound_vac"
# "when_complete" logs a scan once every other required field is filled; "off" only fills the form
auto_log = "when_complete"
# Largest photo accepted for crash cart checks
photo_max_bytes = 2097152
# Prefill the tech name from the previous submission
remember_tech = true

[scanner]
# "auto", "zbar", "external" or "none"
engine = "auto"
# Delay between decode samples
poll_interval_ms = 250
# Identical reads inside this window are dropped
cooldown_ms = 2500
# Consecutive failed frames before the operator is warned
warn_after_failed_frames = 40
# Upper bound for a single decode call
decode_timeout_ms = 2000
zbar_program = "zbarimg"
# Fallback program printing one decoded value per line; {input} is the frame path
# external_program = "my-decoder"
# external_args = ["--file", "{input}"]
# scratch_dir = "/tmp"

[camera]
# Camera device index (e.g., 0 for /dev/video0)
index = 0
resolution = [1280, 720]
fps = 30
# "rear", "front" or "any"
facing = "rear"
# Attempts per start, the retry uses relaxed constraints
acquire_max_attempts = 2
acquire_retry_delay_ms = 300
frame_timeout_ms = 1000
# Resume scanning when the view becomes visible again
resume_on_visible = true

[display]
# IANA timezone for timestamps and "today"; system local time when unset
# timezone = "America/Chicago"

[export]
dir = "./exports"

[sticker]
facility = "Central Supply"
department = "Central Department"
phone = ""

[dashboard]
ip = "127.0.0.1"
port = 8080
"#;

    println!("{}", default_config);
}
