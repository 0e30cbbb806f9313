use anyhow::Result;
use chrono::Utc;
use governor_core::EventEnvelope;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Runtime state directory for a given workspace root, mirroring the
/// teacher's `.codingbuddy/` convention under a task-appropriate name.
#[must_use]
pub fn runtime_dir(workspace: &Path) -> PathBuf {
    workspace.join(".repair-governor")
}

/// Appends structured events and free-form log lines to a per-workspace log
/// file. Telemetry upload (the teacher's `TelemetrySink`/HTTP-POST path) has
/// no counterpart here — there is no outward-facing collector for this
/// engine — so only the log-file side of `codingbuddy-observe::Observer`
/// survives the transform.
pub struct Observer {
    log_path: PathBuf,
    verbose: bool,
}

impl Observer {
    pub fn new(workspace: &Path) -> Result<Self> {
        let dir = runtime_dir(workspace);
        fs::create_dir_all(&dir)?;
        Ok(Self {
            log_path: dir.join("governor.log"),
            verbose: false,
        })
    }

    pub fn record_event(&self, event: &EventEnvelope) -> Result<()> {
        self.append_log_line(&format!(
            "{} EVENT {}",
            Utc::now().to_rfc3339(),
            serde_json::to_string(event)?
        ))
    }

    /// Enable or disable verbose logging to stderr.
    pub fn set_verbose(&mut self, verbose: bool) {
        self.verbose = verbose;
    }

    /// Returns whether verbose mode is enabled.
    #[must_use]
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    /// Log a message to stderr with a `[governor]` prefix when verbose mode
    /// is on.
    pub fn verbose_log(&self, msg: &str) {
        if self.verbose {
            eprintln!("[governor] {msg}");
        }
    }

    /// Log a warning — always written to the log file, and to stderr.
    pub fn warn_log(&self, msg: &str) {
        eprintln!("[governor WARN] {msg}");
        let _ = self.append_log_line(&format!("{} WARN {msg}", Utc::now().to_rfc3339()));
    }

    fn append_log_line(&self, line: &str) -> Result<()> {
        let mut f = OpenOptions::new().create(true).append(true).open(&self.log_path)?;
        writeln!(f, "{line}")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use governor_core::EventKind;
    use uuid::Uuid;

    fn sample_event() -> EventEnvelope {
        EventEnvelope {
            seq_no: 1,
            at: Utc::now(),
            task_id: Uuid::now_v7(),
            kind: EventKind::ToolAllowed { tool: "read_file".to_string() },
        }
    }

    fn scratch_workspace(tag: &str) -> PathBuf {
        let workspace = std::env::temp_dir().join(format!("governor-observe-test-{tag}-{}", Uuid::now_v7()));
        fs::create_dir_all(&workspace).expect("create workspace");
        workspace
    }

    #[test]
    fn record_event_writes_to_log_file() {
        let workspace = scratch_workspace("log");
        let observer = Observer::new(&workspace).expect("observer");
        observer.record_event(&sample_event()).expect("record");

        let log_content = fs::read_to_string(&observer.log_path).expect("read log");
        assert!(log_content.contains("EVENT"));
        assert!(log_content.contains("ToolAllowed"));
    }

    #[test]
    fn multiple_events_append_to_log() {
        let workspace = scratch_workspace("multi");
        let observer = Observer::new(&workspace).expect("observer");
        observer.record_event(&sample_event()).expect("record 1");
        observer.record_event(&sample_event()).expect("record 2");

        let log_content = fs::read_to_string(&observer.log_path).expect("read log");
        let event_lines: Vec<&str> = log_content.lines().filter(|l| l.contains("EVENT")).collect();
        assert_eq!(event_lines.len(), 2);
    }

    #[test]
    fn verbose_mode_defaults_to_off() {
        let workspace = scratch_workspace("verbose");
        let observer = Observer::new(&workspace).expect("observer");
        assert!(!observer.is_verbose());
    }

    #[test]
    fn set_verbose_toggles_mode() {
        let workspace = scratch_workspace("toggle");
        let mut observer = Observer::new(&workspace).expect("observer");
        observer.set_verbose(true);
        assert!(observer.is_verbose());
        observer.set_verbose(false);
        assert!(!observer.is_verbose());
    }

    #[test]
    fn warn_log_writes_to_log_file() {
        let workspace = scratch_workspace("warn");
        let observer = Observer::new(&workspace).expect("observer");
        observer.warn_log("something went wrong");

        let log_content = fs::read_to_string(&observer.log_path).expect("read log");
        assert!(log_content.contains("WARN"));
        assert!(log_content.contains("something went wrong"));
    }

    #[test]
    fn event_serializes_with_task_id() {
        let event = sample_event();
        let json = serde_json::to_string(&event).expect("serialize");
        assert!(json.contains(&event.task_id.to_string()));
    }
}
