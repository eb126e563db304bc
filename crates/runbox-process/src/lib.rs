use chrono::{DateTime, Utc};

const RUN_ID_LEN: usize = 8;
const RUN_ID_MAX_LEN: usize = 64;

/// Short random token identifying one launched execution of a stored script.
///
/// The token is also the stem of every per-run file (log, manifest, run record),
/// so it must stay a safe single path segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct RunId(pub String);

impl RunId {
    pub fn new() -> Self {
        let raw = uuid::Uuid::new_v4().simple().to_string();
        Self(raw[..RUN_ID_LEN].to_string())
    }

    /// Accepts ids coming from URLs and file names. Anything that could escape
    /// the process directory is rejected.
    pub fn parse(raw: &str) -> Option<Self> {
        if raw.is_empty() || raw.len() > RUN_ID_MAX_LEN {
            return None;
        }
        if !raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return None;
        }
        Some(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Running,
    Stopped,
}

/// How a run was launched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecMode {
    /// Believed to bind a port and keep serving; gets a port and a startup delay.
    Server,
    Batch,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RunStatus {
    pub id: RunId,
    pub filename: String,
    pub port: Option<u16>,
    pub start_time: DateTime<Utc>,
    pub running: bool,
    pub mode: ExecMode,
    pub pid: Option<u32>,
}

impl RunStatus {
    pub fn state(&self) -> RunState {
        if self.running {
            RunState::Running
        } else {
            RunState::Stopped
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ScriptInfo {
    pub name: String,
    pub size: u64,
    pub modified: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    Stopped,
    NotFound,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_id_is_short_hex_token() {
        let id = RunId::new();
        assert_eq!(id.0.len(), RUN_ID_LEN);
        assert!(id.0.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn run_ids_differ() {
        assert_ne!(RunId::new(), RunId::new());
    }

    #[test]
    fn parse_rejects_path_like_ids() {
        assert!(RunId::parse("").is_none());
        assert!(RunId::parse("../etc").is_none());
        assert!(RunId::parse("a/b").is_none());
        assert!(RunId::parse(&"a".repeat(RUN_ID_MAX_LEN + 1)).is_none());
        assert_eq!(RunId::parse("ab12_cd-3").unwrap().as_str(), "ab12_cd-3");
    }

    #[test]
    fn status_serializes_null_port_and_iso_time() {
        let status = RunStatus {
            id: RunId("deadbeef".to_string()),
            filename: "hello.py".to_string(),
            port: None,
            start_time: DateTime::parse_from_rfc3339("2024-05-01T10:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
            running: true,
            mode: ExecMode::Batch,
            pid: Some(42),
        };

        let v = serde_json::to_value(&status).unwrap();
        assert_eq!(v["id"], "deadbeef");
        assert!(v["port"].is_null());
        assert_eq!(v["running"], true);
        assert_eq!(v["mode"], "batch");
        assert!(v["start_time"].as_str().unwrap().starts_with("2024-05-01T10:00:00"));
        assert_eq!(status.state(), RunState::Running);
    }
}
