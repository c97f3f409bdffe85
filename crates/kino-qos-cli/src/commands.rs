//! CLI command implementations

use crate::output::{self, OutputFormat};
use anyhow::Context;
use kino_qos::analytics::{ErrorReport, SessionReport, TelemetryRecord};
use kino_qos::attribution::ExitAttributionEngine;
use kino_qos::classify::{ErrorClassifier, ErrorRecord, RawError, RawErrorKind};
use kino_qos::player::{ModalPayload, SharedPlayerSnapshot};
use kino_qos::{
    attach, Clock, Collaborators, Emitter, FileStore, KeyValueStore, ManualClock, MemorySink, MemoryStore,
    ModalPresenter, ModalType, PlaybackController, PlayerEvent, PlayerSnapshot, QosConfig, RecoveryPolicy,
    SessionManager, SharedSessionManager, StartOptions,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Load configuration overrides, or the defaults
pub fn load_config(path: Option<&Path>) -> anyhow::Result<QosConfig> {
    match path {
        Some(path) => QosConfig::from_json_file(path)
            .with_context(|| format!("loading config from {}", path.display())),
        None => Ok(QosConfig::default()),
    }
}

// =============================================================================
// Replay
// =============================================================================

/// Session control embedded in an event log
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReplayCommand {
    Start(StartOptions),
    End,
    Discard,
    Reset,
    SampleNetwork,
}

/// One line of an event log
#[derive(Debug, Clone, Deserialize)]
pub struct ReplayLine {
    /// Timestamp (ms)
    pub at: i64,
    /// Player state from this point on
    #[serde(default)]
    pub player: Option<PlayerSnapshot>,
    #[serde(default)]
    pub command: Option<ReplayCommand>,
    #[serde(default)]
    pub event: Option<PlayerEvent>,
}

/// Parse a JSON-lines log; blank lines and `#` comments are skipped
pub fn parse_log(raw: &str) -> anyhow::Result<Vec<ReplayLine>> {
    raw.lines()
        .enumerate()
        .filter(|(_, line)| {
            let line = line.trim();
            !line.is_empty() && !line.starts_with('#')
        })
        .map(|(n, line)| serde_json::from_str(line).with_context(|| format!("line {}", n + 1)))
        .collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct ModalRecord {
    pub modal: ModalType,
    pub error_code: String,
    pub position: f64,
}

/// Controller that only records what it was asked to do
#[derive(Clone, Default)]
struct ReplayController {
    calls: Arc<Mutex<Vec<String>>>,
    fallback: bool,
}

impl ReplayController {
    fn log(&self, call: String) {
        info!(call = %call, "Controller call");
        self.calls.lock().push(call);
    }
}

impl PlaybackController for ReplayController {
    fn pause(&mut self) -> kino_qos::Result<()> {
        self.log("pause".into());
        Ok(())
    }

    fn refetch_content(&mut self, resume_position: f64) -> kino_qos::Result<()> {
        self.log(format!("refetch_content({resume_position})"));
        Ok(())
    }

    fn has_fallback(&self) -> bool {
        self.fallback
    }

    fn load_fallback(&mut self) -> kino_qos::Result<()> {
        self.log("load_fallback".into());
        // A single alternate resource
        self.fallback = false;
        Ok(())
    }

    fn reload(&mut self, position: f64) -> kino_qos::Result<()> {
        self.log(format!("reload({position})"));
        Ok(())
    }

    fn try_engine_recovery(&mut self, error: &ErrorRecord) -> bool {
        self.log(format!("try_engine_recovery({})", error.code));
        false
    }
}

#[derive(Clone, Default)]
struct ReplayModals(Arc<Mutex<Vec<ModalRecord>>>);

impl ModalPresenter for ReplayModals {
    fn show_modal(&mut self, modal: ModalType, payload: ModalPayload) {
        self.0.lock().push(ModalRecord {
            modal,
            error_code: payload.error_code,
            position: payload.position,
        });
    }
}

/// Everything a replay produced
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReplaySummary {
    pub lines: usize,
    pub sessions: Vec<SessionReport>,
    pub errors: Vec<ErrorReport>,
    pub modals: Vec<ModalRecord>,
    pub controller_calls: Vec<String>,
}

/// Run parsed lines through a fresh session manager
pub fn run_replay(
    lines: &[ReplayLine],
    config: QosConfig,
    store: Box<dyn KeyValueStore>,
    fallback: bool,
) -> anyhow::Result<ReplaySummary> {
    let clock = ManualClock::new(lines.first().map(|l| l.at).unwrap_or_default());
    let player: SharedPlayerSnapshot = Arc::new(Mutex::new(PlayerSnapshot::default()));
    let controller = ReplayController {
        fallback,
        ..Default::default()
    };
    let modals = ReplayModals::default();
    let sink = MemorySink::new();

    let manager: SharedSessionManager = SessionManager::new(
        config,
        Collaborators {
            clock: Arc::new(clock.clone()),
            player: Arc::new(player.clone()),
            controller: Box::new(controller.clone()),
            modals: Box::new(modals.clone()),
            store,
            sink: Box::new(sink.clone()),
        },
    )?
    .shared();

    let feed: Emitter<PlayerEvent> = Emitter::new();
    let subscription = attach(&manager, &feed);

    for line in lines {
        if line.at < clock.now_ms() {
            warn!(at = line.at, "Timestamp went backwards, keeping clock");
        } else {
            clock.set(line.at);
        }
        if let Some(snapshot) = &line.player {
            *player.lock() = snapshot.clone();
        }
        if let Some(command) = &line.command {
            run_command(&manager, command)?;
        }
        if let Some(event) = &line.event {
            if manager.lock().session().is_none() {
                debug!("Implicit session start");
                manager.lock().start_playback(StartOptions::default())?;
            }
            feed.emit(event);
        }
    }

    // Sessions still open at the end of the log
    manager.lock().end_playback();
    subscription.dispose();

    let mut summary = ReplaySummary {
        lines: lines.len(),
        controller_calls: controller.calls.lock().clone(),
        modals: modals.0.lock().clone(),
        ..Default::default()
    };
    for envelope in sink.records() {
        match envelope.record {
            TelemetryRecord::Session(report) => summary.sessions.push(report),
            TelemetryRecord::Error(report) => summary.errors.push(report),
        }
    }
    Ok(summary)
}

fn run_command(manager: &SharedSessionManager, command: &ReplayCommand) -> anyhow::Result<()> {
    let mut manager = manager.lock();
    match command {
        ReplayCommand::Start(options) => {
            manager.end_playback();
            let outcome = manager.start_playback(options.clone())?;
            debug!(outcome = ?outcome, "Start command");
        }
        ReplayCommand::End => {
            manager.end_playback();
        }
        ReplayCommand::Discard => manager.discard(),
        ReplayCommand::Reset => manager.reset_playback_info(),
        ReplayCommand::SampleNetwork => {
            manager.sample_network();
        }
    }
    Ok(())
}

/// Replay an event log file
pub async fn replay(
    events: &Path,
    config: QosConfig,
    store: Option<&Path>,
    fallback: bool,
    format: &str,
) -> anyhow::Result<()> {
    let raw = tokio::fs::read_to_string(events)
        .await
        .with_context(|| format!("reading {}", events.display()))?;
    let lines = parse_log(&raw)?;
    let store: Box<dyn KeyValueStore> = match store {
        Some(path) => Box::new(FileStore::open(path)?),
        None => Box::new(MemoryStore::new()),
    };
    let summary = run_replay(&lines, config, store, fallback)?;

    match OutputFormat::from(format) {
        OutputFormat::Json => output::print_json(&summary)?,
        OutputFormat::Text => print_summary(&summary),
    }
    Ok(())
}

const SUMMARY_FIELDS: &[&str] = &[
    "stage",
    "exit_cause",
    "exit_sub_cause",
    "join_time",
    "content_first_frame_duration",
    "buffering_count",
    "buffering_duration",
    "buffering_ratio",
    "seek_count",
    "reload_count",
    "fallback_count",
    "token_expired_retry_count",
    "last_error_code",
    "buffering_group",
];

fn print_summary(summary: &ReplaySummary) {
    println!("Replayed {} lines", summary.lines);
    for report in &summary.sessions {
        let id = report.get("session_id").and_then(|v| v.as_str()).unwrap_or("?");
        output::heading(&format!("Session {id}"));
        for key in SUMMARY_FIELDS {
            if let Some(value) = report.get(key) {
                output::field(key, value);
            }
        }
    }
    if !summary.errors.is_empty() {
        output::heading("Errors");
        for e in &summary.errors {
            println!(
                "  {} {} [{}] -> {} ({})",
                e.error.error_type,
                e.error.code,
                e.stage,
                e.action.name(),
                e.rule.as_deref().unwrap_or("-")
            );
        }
    }
    if !summary.modals.is_empty() {
        output::heading("Modals");
        for m in &summary.modals {
            println!("  {} {} @ {:.1}s", m.modal, m.error_code, m.position);
        }
    }
    if !summary.controller_calls.is_empty() {
        output::heading("Controller");
        for call in &summary.controller_calls {
            println!("  {call}");
        }
    }
}

// =============================================================================
// Inspection
// =============================================================================

#[derive(Debug, Serialize)]
struct Classification {
    error_type: String,
    code: String,
    benign: bool,
}

/// Classify a raw error given on the command line
pub fn classify(
    details: &str,
    kind: &str,
    native_code: Option<u16>,
    name: Option<String>,
    fatal: bool,
    format: &str,
) -> anyhow::Result<()> {
    let kind: RawErrorKind = serde_json::from_value(serde_json::Value::String(kind.to_string()))
        .with_context(|| format!("unknown error kind '{kind}'"))?;
    let mut raw = RawError::new(kind, details);
    raw.native_code = native_code;
    raw.name = name;
    raw.fatal = fatal;

    let classifier = ErrorClassifier::new();
    let (error_type, code) = classifier.classify(&raw);
    let result = Classification {
        error_type: error_type.to_string(),
        code: code.to_string(),
        benign: classifier.is_benign(&raw),
    };

    match OutputFormat::from(format) {
        OutputFormat::Json => output::print_json(&result)?,
        OutputFormat::Text => {
            output::field("type", &result.error_type);
            output::field("code", &result.code);
            output::field("benign", result.benign);
        }
    }
    Ok(())
}

/// Print the effective configuration
pub fn show_config(config: &QosConfig, format: &str) -> anyhow::Result<()> {
    match OutputFormat::from(format) {
        OutputFormat::Json => output::print_json(config)?,
        OutputFormat::Text => {
            let value = serde_json::to_value(config)?;
            if let Some(map) = value.as_object() {
                for (key, value) in map {
                    output::field(key, value);
                }
            }
        }
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct RuleOrder {
    recovery: Vec<&'static str>,
    attribution: Vec<&'static str>,
}

/// Print recovery and attribution rules in evaluation order
pub fn rules(format: &str) -> anyhow::Result<()> {
    let order = RuleOrder {
        recovery: RecoveryPolicy::new().rule_names().collect(),
        attribution: ExitAttributionEngine::rule_names().collect(),
    };
    match OutputFormat::from(format) {
        OutputFormat::Json => output::print_json(&order)?,
        OutputFormat::Text => {
            output::heading("Recovery rules");
            for (i, name) in order.recovery.iter().enumerate() {
                println!("  {}. {name}", i + 1);
            }
            output::heading("Attribution rules");
            for (i, name) in order.attribution.iter().enumerate() {
                println!("  {}. {name}", i + 1);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const LOG: &str = r#"
# preroll skipped, content plays, then a decode error
{"at": 0, "command": {"type": "start", "content_id": "movie-1"}}
{"at": 0, "event": {"event": "enter_page"}}
{"at": 10, "event": {"event": "start_load", "track": "content"}}
{"at": 600, "event": {"event": "first_frame_viewed", "track": "content"}}
{"at": 700, "event": {"event": "current_time_progressed", "track": "content"}}
{"at": 5000, "player": {"position": 4.3, "buffered": [{"start": 0.0, "end": 9.0}]}, "event": {"event": "error", "error": {"kind": "media", "details": "decodeError", "fatal": true}}}
{"at": 9000, "command": {"type": "end"}}
"#;

    #[test]
    fn test_parse_log_skips_comments() {
        let lines = parse_log(LOG).unwrap();
        assert_eq!(lines.len(), 7);
        assert!(matches!(lines[0].command, Some(ReplayCommand::Start(_))));
        assert!(lines[5].player.is_some());
    }

    #[test]
    fn test_parse_log_reports_bad_line() {
        let err = parse_log("{\"at\": 1}\nnot json").unwrap_err();
        assert!(format!("{err:#}").contains("line 2"));
    }

    #[test]
    fn test_replay_reload_then_report() {
        let lines = parse_log(LOG).unwrap();
        let summary = run_replay(&lines, QosConfig::default(), Box::new(MemoryStore::new()), false).unwrap();

        assert_eq!(summary.sessions.len(), 1);
        assert_eq!(summary.errors.len(), 1);
        assert_eq!(summary.errors[0].rule.as_deref(), Some("reload"));
        assert_eq!(summary.controller_calls, vec!["reload(4.3)".to_string()]);

        let report = &summary.sessions[0];
        assert_eq!(report.get("content_first_frame_duration").and_then(|v| v.as_i64()), Some(590));
        assert_eq!(report.get("reload_count").and_then(|v| v.as_u64()), Some(1));
        assert_eq!(report.get("stage").and_then(|v| v.as_str()), Some("RELOAD"));
    }

    #[test]
    fn test_replay_prefers_fallback() {
        let lines = parse_log(LOG).unwrap();
        let summary = run_replay(&lines, QosConfig::default(), Box::new(MemoryStore::new()), true).unwrap();
        assert_eq!(summary.controller_calls, vec!["load_fallback".to_string()]);
    }

    #[test]
    fn test_replay_persists_store() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"{}").unwrap();
        let lines = parse_log(LOG).unwrap();
        let store = FileStore::open(file.path()).unwrap();
        run_replay(&lines, QosConfig::default(), Box::new(store), false).unwrap();

        let reopened = FileStore::open(file.path()).unwrap();
        assert!(reopened
            .get(kino_qos::store::BUFFERING_PROFILE_KEY)
            .unwrap()
            .is_some());
    }
}
