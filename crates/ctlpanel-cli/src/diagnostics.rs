use std::backtrace::Backtrace;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, Once, OnceLock};

use anyhow::{Context, Result, anyhow};
use ctlpanel_app::ControlPanel;
use ctlpanel_core::ControlId;
use ctlpanel_core::available::FetchStatus;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// One entry of the diagnostics trail, written as `kind key=value ...`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trail {
    Opened { file: PathBuf, edits: usize },
    Edit { path: String, raw: String },
    Shape {
        steps: usize,
        rendered: usize,
        duplicates: Vec<String>,
    },
    FetchFailed { control: String, message: String },
    Invalid { control: String, exception: String },
    CommandFailed(String),
}

impl fmt::Display for Trail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Opened { file, edits } => {
                write!(f, "opened file={} edits={edits}", file.display())
            }
            Self::Edit { path, raw } => write!(f, "edit control={path} value={raw:?}"),
            Self::Shape {
                steps,
                rendered,
                duplicates,
            } => {
                write!(f, "shape steps={steps} rendered={rendered}")?;
                if !duplicates.is_empty() {
                    write!(f, " duplicates={}", duplicates.join(","))?;
                }
                Ok(())
            }
            Self::FetchFailed { control, message } => {
                write!(f, "fetch_failed control={control} message={message:?}")
            }
            Self::Invalid { control, exception } => {
                write!(f, "invalid control={control} exception={exception:?}")
            }
            Self::CommandFailed(error) => write!(f, "command_failed error={error:?}"),
        }
    }
}

/// What a freshly opened panel looks like: the file, the `--set` edits, the
/// partition shape and every availability query that failed.
pub fn panel_trail(file: &Path, edits: &[(String, String)], panel: &ControlPanel) -> Vec<Trail> {
    let store = panel.store();
    let partition = panel.partition();
    let rendered = store
        .iter()
        .filter(|control| partition.contains(control.id))
        .count();

    let mut trail = vec![Trail::Opened {
        file: file.to_path_buf(),
        edits: edits.len(),
    }];
    trail.extend(edits.iter().map(|(path, raw)| Trail::Edit {
        path: path.clone(),
        raw: raw.clone(),
    }));
    trail.push(Trail::Shape {
        steps: partition.steps.len(),
        rendered,
        duplicates: partition.duplicate_keys.clone(),
    });
    trail.extend(store.iter().filter_map(|control| match &control.fetch_state.status {
        FetchStatus::Failed { message } => Some(Trail::FetchFailed {
            control: store.path_of(control.id).unwrap_or_else(|| control.key.clone()),
            message: message.clone(),
        }),
        _ => None,
    }));
    trail
}

pub fn failure_trail(panel: &ControlPanel, failures: &[ControlId]) -> Vec<Trail> {
    let store = panel.store();
    failures
        .iter()
        .filter_map(|id| store.get(*id))
        .map(|control| Trail::Invalid {
            control: store.path_of(control.id).unwrap_or_else(|| control.key.clone()),
            exception: control.exception.clone().unwrap_or_default(),
        })
        .collect()
}

#[derive(Default)]
struct DiagnosticsLog {
    path: Option<PathBuf>,
    file: Option<File>,
    control_data: Option<PathBuf>,
}

static HOOK_ONCE: Once = Once::new();
static LOG: OnceLock<Mutex<DiagnosticsLog>> = OnceLock::new();

fn with_log<T>(action: impl FnOnce(&mut DiagnosticsLog) -> T) -> T {
    let mut log = LOG
        .get_or_init(|| Mutex::new(DiagnosticsLog::default()))
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    action(&mut log)
}

/// Owns the optional `--diagnostics` log. The panic hook is installed either
/// way and names the control data being processed.
pub struct DiagnosticsSession {
    path: Option<PathBuf>,
}

impl DiagnosticsSession {
    pub fn initialize(enabled: bool) -> Result<Self> {
        install_panic_hook();
        if !enabled {
            with_log(|log| *log = DiagnosticsLog::default());
            return Ok(Self { path: None });
        }

        let path = create_log_path()?;
        let mut file = OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&path)
            .with_context(|| format!("failed to create diagnostics log at {}", path.display()))?;
        writeln!(
            file,
            "ctlpanel diagnostics start\nversion={}\nstarted_at={}\npid={}\nargv={:?}",
            env!("CARGO_PKG_VERSION"),
            timestamp(),
            std::process::id(),
            std::env::args().collect::<Vec<String>>()
        )
        .with_context(|| format!("failed to write diagnostics header to {}", path.display()))?;

        with_log(|log| {
            log.path = Some(path.clone());
            log.file = Some(file);
        });
        Ok(Self { path: Some(path) })
    }

    pub fn path(&self) -> Option<&PathBuf> {
        self.path.as_ref()
    }

    pub fn record(&self, entry: &Trail) {
        if let Trail::Opened { file, .. } = entry {
            with_log(|log| log.control_data = Some(file.clone()));
        }
        append_line(entry.to_string());
    }

    pub fn record_all(&self, entries: &[Trail]) {
        for entry in entries {
            self.record(entry);
        }
    }
}

fn install_panic_hook() {
    HOOK_ONCE.call_once(|| {
        std::panic::set_hook(Box::new(|panic_info| {
            let payload = panic_payload(panic_info);
            let location = panic_info
                .location()
                .map(|value| format!("{}:{}:{}", value.file(), value.line(), value.column()))
                .unwrap_or_else(|| "unknown".to_string());

            append_line(format!("panic message={payload:?} location={location}"));
            append_line(format!("panic backtrace={:?}", Backtrace::force_capture()));

            let (path, control_data) = with_log(|log| (log.path.clone(), log.control_data.clone()));
            match control_data {
                Some(file) => eprintln!(
                    "Fatal internal error in ctlpanel while processing {}: {payload}",
                    file.display()
                ),
                None => eprintln!("Fatal internal error in ctlpanel: {payload}"),
            }
            match path {
                Some(path) => eprintln!("Diagnostics written to {}", path.display()),
                None => eprintln!("Run `ctlpanel --diagnostics` to capture a diagnostics log."),
            }
        }));
    });
}

fn panic_payload(panic_info: &std::panic::PanicHookInfo<'_>) -> String {
    if let Some(payload) = panic_info.payload().downcast_ref::<&str>() {
        return (*payload).to_string();
    }
    if let Some(payload) = panic_info.payload().downcast_ref::<String>() {
        return payload.clone();
    }
    "unknown panic payload".to_string()
}

fn append_line(line: String) {
    with_log(|log| {
        let Some(file) = log.file.as_mut() else {
            return;
        };
        let _ = writeln!(file, "[{}] {line}", timestamp());
        let _ = file.flush();
    });
}

fn timestamp() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "unknown".to_string())
}

fn create_log_path() -> Result<PathBuf> {
    let config_path = ctlpanel_core::config::resolve_config_path()
        .context("failed to resolve ctlpanel config path for diagnostics")?;
    let config_dir = config_path.parent().ok_or_else(|| {
        anyhow!(
            "failed to resolve diagnostics directory from config path {}",
            config_path.display()
        )
    })?;

    let diagnostics_dir = config_dir.join("diagnostics");
    fs::create_dir_all(&diagnostics_dir).with_context(|| {
        format!(
            "failed to create diagnostics directory {}",
            diagnostics_dir.display()
        )
    })?;

    let millis = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
    Ok(diagnostics_dir.join(format!("{millis}.log")))
}
