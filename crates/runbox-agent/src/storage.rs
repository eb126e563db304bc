use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Utc};
use runbox_process::{RunId, ScriptInfo};
use tokio::io::AsyncWriteExt;

pub const SCRIPT_EXTENSION: &str = ".py";

/// Prefix for lines the supervisor itself writes into a run's log.
pub const LOG_PREFIX: &str = "[runbox]";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptNameError {
    Empty,
    NotAScript,
    Invalid,
}

impl std::fmt::Display for ScriptNameError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let msg = match self {
            ScriptNameError::Empty => "no file selected",
            ScriptNameError::NotAScript => "only Python files (.py) are allowed",
            ScriptNameError::Invalid => "invalid file name",
        };
        f.write_str(msg)
    }
}

impl std::error::Error for ScriptNameError {}

/// Reduces an arbitrary client-supplied name to a single safe path segment.
///
/// Non-ASCII characters are dropped, path separators become whitespace,
/// whitespace runs become `_`, anything outside `[A-Za-z0-9_.-]` is removed,
/// and leading/trailing dots and underscores are trimmed.
///
/// There is no Unicode decomposition step: accented letters are removed, not
/// folded to their base letter (`héllo.py` is stored as `hllo.py`).
pub fn sanitize_filename(raw: &str) -> String {
    let spaced: String = raw
        .chars()
        .filter(char::is_ascii)
        .map(|c| if c == '/' || c == '\\' { ' ' } else { c })
        .collect();
    let joined = spaced.split_whitespace().collect::<Vec<_>>().join("_");
    let kept: String = joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        .collect();
    kept.trim_matches(|c| c == '.' || c == '_').to_string()
}

pub fn is_script_name(name: &str) -> bool {
    name.len() > SCRIPT_EXTENSION.len() && name.ends_with(SCRIPT_EXTENSION)
}

/// Validates an upload's original file name and returns the name it is stored under.
pub fn accept_upload_name(raw: &str) -> Result<String, ScriptNameError> {
    if raw.trim().is_empty() {
        return Err(ScriptNameError::Empty);
    }
    if !raw.ends_with(SCRIPT_EXTENSION) {
        return Err(ScriptNameError::NotAScript);
    }
    let name = sanitize_filename(raw);
    if !is_script_name(&name) {
        return Err(ScriptNameError::Invalid);
    }
    Ok(name)
}

async fn write_then_rename(tmp: &Path, path: &Path, data: &[u8]) -> anyhow::Result<()> {
    let mut f = tokio::fs::File::create(tmp)
        .await
        .with_context(|| format!("create {}", tmp.display()))?;
    f.write_all(data).await.context("write upload")?;
    f.flush().await.context("flush upload")?;
    f.sync_all().await.context("sync upload")?;
    drop(f);
    tokio::fs::rename(tmp, path)
        .await
        .with_context(|| format!("persist {}", path.display()))
}

/// Uploaded scripts, one flat directory, keyed by sanitized file name.
#[derive(Debug, Clone)]
pub struct ScriptStore {
    dir: PathBuf,
}

impl ScriptStore {
    pub async fn open(dir: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("create upload dir {}", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Names arriving from URLs must already be in stored (sanitized) form.
    pub fn path_of(&self, name: &str) -> Result<PathBuf, ScriptNameError> {
        if name.is_empty() {
            return Err(ScriptNameError::Empty);
        }
        if sanitize_filename(name) != name {
            return Err(ScriptNameError::Invalid);
        }
        Ok(self.dir.join(name))
    }

    pub async fn exists(&self, name: &str) -> bool {
        let Ok(path) = self.path_of(name) else {
            return false;
        };
        tokio::fs::metadata(&path)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false)
    }

    /// Overwrites any previous script with the same name. Each save writes its
    /// own temp file, so concurrent saves of one name leave exactly one of the
    /// bodies in place.
    pub async fn save(&self, name: &str, data: &[u8]) -> anyhow::Result<PathBuf> {
        let path = self.path_of(name)?;
        let tmp = self
            .dir
            .join(format!(".{name}.{}.upload", uuid::Uuid::new_v4().simple()));
        if let Err(err) = write_then_rename(&tmp, &path, data).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(err);
        }
        Ok(path)
    }

    pub async fn read(&self, name: &str) -> anyhow::Result<Option<Vec<u8>>> {
        let Ok(path) = self.path_of(name) else {
            return Ok(None);
        };
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("read {}", path.display())),
        }
    }

    /// Returns false when there was nothing to delete.
    pub async fn delete(&self, name: &str) -> anyhow::Result<bool> {
        let Ok(path) = self.path_of(name) else {
            return Ok(false);
        };
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e).with_context(|| format!("delete {}", path.display())),
        }
    }

    pub async fn list(&self) -> anyhow::Result<Vec<ScriptInfo>> {
        let mut out = Vec::new();
        let mut rd = match tokio::fs::read_dir(&self.dir).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(out),
            Err(e) => return Err(e).context("list upload dir"),
        };

        while let Some(entry) = rd.next_entry().await.context("list upload dir")? {
            let name = entry.file_name().to_string_lossy().to_string();
            if !is_script_name(&name) || name.starts_with('.') {
                continue;
            }
            let Ok(meta) = entry.metadata().await else {
                continue;
            };
            if !meta.is_file() {
                continue;
            }
            let modified = meta
                .modified()
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| Utc::now());
            out.push(ScriptInfo {
                name,
                size: meta.len(),
                modified,
            });
        }

        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }
}

/// Per-run files, all named after the run id so they outlive the process handle.
#[derive(Debug, Clone)]
pub struct RunFiles {
    dir: PathBuf,
}

impl RunFiles {
    pub async fn open(dir: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("create process dir {}", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn log_path(&self, id: &RunId) -> PathBuf {
        self.dir.join(format!("{id}.log"))
    }

    pub fn manifest_path(&self, id: &RunId) -> PathBuf {
        self.dir.join(format!("{id}_requirements.txt"))
    }

    pub fn record_path(&self, id: &RunId) -> PathBuf {
        self.dir.join(format!("{id}.run.json"))
    }

    /// Log handle for a child's stdout/stderr. Append mode; never truncated.
    pub fn open_child_log(&self, id: &RunId) -> std::io::Result<std::fs::File> {
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.log_path(id))
    }

    pub async fn append_log(&self, id: &RunId, line: &str) -> std::io::Result<()> {
        let mut line = format!("{LOG_PREFIX} {line}");
        if !line.ends_with('\n') {
            line.push('\n');
        }
        let mut f = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.log_path(id))
            .await?;
        f.write_all(line.as_bytes()).await?;
        f.flush().await
    }

    pub async fn read_log(&self, id: &RunId) -> anyhow::Result<Option<String>> {
        let path = self.log_path(id);
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Some(String::from_utf8_lossy(&data).into_owned())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("read {}", path.display())),
        }
    }
}
