use std::{collections::HashMap, fs, path::Path, time::Duration};

use anyhow::{bail, Context};
use client_core::legacy_http::DEFAULT_POLL_INTERVAL;
use shared::domain::{ChipId, DEFAULT_CHIP_IDS};

pub const DEFAULT_CONFIG_FILE: &str = "dashboard.toml";

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub ws_url: String,
    pub http_url: String,
    /// `None` disables the stale sweep.
    pub command_timeout: Option<Duration>,
    pub poll_interval: Duration,
    pub chip_ids: Vec<ChipId>,
    pub log_filter: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            ws_url: "ws://127.0.0.1:5000/socket".into(),
            http_url: "http://127.0.0.1:5000".into(),
            command_timeout: Some(Duration::from_secs(30)),
            poll_interval: DEFAULT_POLL_INTERVAL,
            chip_ids: DEFAULT_CHIP_IDS.to_vec(),
            log_filter: "info".into(),
        }
    }
}

/// Defaults, then the toml file if it exists, then the process environment.
pub fn load_settings(path: &Path) -> Settings {
    let mut settings = Settings::default();
    if let Ok(raw) = fs::read_to_string(path) {
        match toml::from_str::<HashMap<String, String>>(&raw) {
            Ok(file_cfg) => apply_file(&mut settings, &file_cfg),
            Err(err) => {
                tracing::warn!(path = %path.display(), %err, "ignoring unreadable config file");
            }
        }
    }
    apply_env(&mut settings, |key| std::env::var(key).ok());
    settings
}

fn apply_file(settings: &mut Settings, file_cfg: &HashMap<String, String>) {
    if let Some(v) = file_cfg.get("ws_url") {
        settings.ws_url = v.clone();
    }
    if let Some(v) = file_cfg.get("http_url") {
        settings.http_url = v.clone();
    }
    if let Some(v) = file_cfg.get("command_timeout_secs") {
        set_timeout(settings, v);
    }
    if let Some(v) = file_cfg.get("poll_interval_ms") {
        set_poll_interval(settings, v);
    }
    if let Some(v) = file_cfg.get("chip_ids") {
        set_chip_ids(settings, v);
    }
    if let Some(v) = file_cfg.get("log_filter") {
        settings.log_filter = v.clone();
    }
}

fn apply_env(settings: &mut Settings, var: impl Fn(&str) -> Option<String>) {
    if let Some(v) = var("DASHBOARD_WS_URL") {
        settings.ws_url = v;
    }
    if let Some(v) = var("APP__WS_URL") {
        settings.ws_url = v;
    }

    if let Some(v) = var("DASHBOARD_HTTP_URL") {
        settings.http_url = v;
    }
    if let Some(v) = var("APP__HTTP_URL") {
        settings.http_url = v;
    }

    if let Some(v) = var("APP__COMMAND_TIMEOUT_SECS") {
        set_timeout(settings, &v);
    }
    if let Some(v) = var("APP__POLL_INTERVAL_MS") {
        set_poll_interval(settings, &v);
    }
    if let Some(v) = var("APP__CHIP_IDS") {
        set_chip_ids(settings, &v);
    }
    if let Some(v) = var("APP__LOG_FILTER") {
        settings.log_filter = v;
    }
}

fn set_timeout(settings: &mut Settings, raw: &str) {
    if let Ok(secs) = raw.trim().parse::<u64>() {
        settings.command_timeout = (secs > 0).then(|| Duration::from_secs(secs));
    }
}

fn set_poll_interval(settings: &mut Settings, raw: &str) {
    match raw.trim().parse::<u64>() {
        Ok(ms) if ms > 0 => settings.poll_interval = Duration::from_millis(ms),
        _ => {}
    }
}

fn set_chip_ids(settings: &mut Settings, raw: &str) {
    match parse_chip_ids(raw) {
        Ok(ids) => settings.chip_ids = ids,
        Err(err) => tracing::warn!(%err, "keeping previous chip ids"),
    }
}

/// Comma separated list, e.g. `246,245,252,243`.
pub fn parse_chip_ids(raw: &str) -> anyhow::Result<Vec<ChipId>> {
    let mut ids = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|part| !part.is_empty()) {
        let id = part
            .parse::<u32>()
            .with_context(|| format!("invalid chip id {part:?}"))?;
        ids.push(ChipId(id));
    }
    if ids.is_empty() {
        bail!("chip id list is empty");
    }
    Ok(ids)
}
