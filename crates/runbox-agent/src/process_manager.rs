use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    process::Stdio,
    sync::Arc,
};

use anyhow::Context;
use chrono::{DateTime, Utc};
use runbox_process::{ExecMode, RunId, RunState, RunStatus, StopOutcome};
use serde::{Deserialize, Serialize};
use tokio::{io::AsyncWriteExt, process::Command, sync::Mutex};

use crate::config::AgentConfig;
use crate::installer;
use crate::port_alloc::PortAllocator;
use crate::process_handle::{ProcessHandle, Termination};
use crate::process_manager_support::{format_error_chain, unix_now_ms};
use crate::sniffer;
use crate::storage::{RunFiles, ScriptStore};

/// What was launched for a run; persisted next to its log so runs can be
/// found again after the control process restarts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct RunRecord {
    pub(crate) run_id: String,
    pub(crate) filename: String,
    pub(crate) started_at_unix_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) pid: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) pgid: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) port: Option<u16>,
    pub(crate) mode: ExecMode,
    pub(crate) exec: String,
    pub(crate) args: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) cwd: Option<String>,
}

async fn write_run_record(path: &Path, record: &RunRecord) -> anyhow::Result<()> {
    let tmp = path.with_extension("json.tmp");
    let data = serde_json::to_vec_pretty(record).context("serialize run record")?;
    let mut f = tokio::fs::File::create(&tmp)
        .await
        .context("create run record tmp")?;
    f.write_all(&data).await.context("write run record tmp")?;
    f.flush().await.context("flush run record tmp")?;
    drop(f);
    tokio::fs::rename(&tmp, path)
        .await
        .context("persist run record")?;
    Ok(())
}

#[derive(Debug)]
struct LaunchPlan {
    exec: String,
    args: Vec<String>,
    cwd: Option<PathBuf>,
    env: Vec<(String, String)>,
}

#[derive(Debug)]
struct RunEntry {
    filename: String,
    port: Option<u16>,
    started_at: DateTime<Utc>,
    mode: ExecMode,
    pid: Option<u32>,
    // Present only while the process is believed alive; taken by stop.
    handle: Option<ProcessHandle>,
}

impl RunEntry {
    fn status(&mut self, id: &str) -> RunStatus {
        let running = self.handle.as_mut().is_some_and(|h| h.is_running());
        RunStatus {
            id: RunId(id.to_string()),
            filename: self.filename.clone(),
            port: self.port,
            start_time: self.started_at,
            running,
            mode: self.mode,
            pid: self.pid,
        }
    }
}

/// An id handed out by `new_run_id` whose spawn has not finished yet.
#[derive(Debug, Default)]
struct Reservation {
    filename: Option<String>,
    // Set when the script is deleted while the spawn is queued or installing.
    cancelled: bool,
}

#[derive(Debug, Default)]
struct Registry {
    runs: HashMap<String, RunEntry>,
    reserved: HashMap<String, Reservation>,
}

impl Registry {
    fn is_cancelled(&self, run_id: &str) -> bool {
        self.reserved.get(run_id).is_some_and(|r| r.cancelled)
    }
}

/// Starts, tracks and tears down script runs.
///
/// The registry is in memory only; every read and write goes through one async
/// mutex. Process teardown happens outside the lock.
#[derive(Clone, Debug)]
pub struct ProcessManager {
    inner: Arc<Mutex<Registry>>,
    config: Arc<AgentConfig>,
    scripts: ScriptStore,
    files: RunFiles,
    ports: Arc<PortAllocator>,
}

impl ProcessManager {
    /// Creates the upload and process directories if needed.
    pub async fn new(config: AgentConfig) -> anyhow::Result<Self> {
        let scripts = ScriptStore::open(&config.upload_dir).await?;
        let files = RunFiles::open(&config.process_dir).await?;
        let ports = Arc::new(PortAllocator::new(config.base_port, config.port_span));
        Ok(Self {
            inner: Arc::new(Mutex::new(Registry::default())),
            config: Arc::new(config),
            scripts,
            files,
            ports,
        })
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn scripts(&self) -> &ScriptStore {
        &self.scripts
    }

    pub fn files(&self) -> &RunFiles {
        &self.files
    }

    /// A fresh id, reserved until the matching `spawn` finishes.
    pub async fn new_run_id(&self) -> RunId {
        self.reserve_run_id(None).await
    }

    /// Like `new_run_id`, but the pending spawn is already tied to `filename`,
    /// so deleting the script cancels it even before it starts.
    pub async fn new_run_id_for(&self, filename: &str) -> RunId {
        self.reserve_run_id(Some(filename.to_string())).await
    }

    async fn reserve_run_id(&self, filename: Option<String>) -> RunId {
        let mut reg = self.inner.lock().await;
        loop {
            let id = RunId::new();
            if reg.runs.contains_key(id.as_str()) || reg.reserved.contains_key(id.as_str()) {
                continue;
            }
            reg.reserved.insert(
                id.0.clone(),
                Reservation {
                    filename,
                    cancelled: false,
                },
            );
            return id;
        }
    }

    async fn ensure_not_cancelled(&self, run_id: &RunId, filename: &str) -> anyhow::Result<()> {
        if self.inner.lock().await.is_cancelled(run_id.as_str()) {
            anyhow::bail!("script {filename} was deleted before the run started");
        }
        Ok(())
    }

    /// Installs the script's dependencies, launches it and registers the run.
    ///
    /// On failure nothing is registered and the error text is appended to the
    /// run's log file.
    pub async fn spawn(&self, filename: &str, run_id: &RunId) -> anyhow::Result<RunStatus> {
        let result = self.spawn_inner(filename, run_id).await;
        self.inner.lock().await.reserved.remove(run_id.as_str());

        if let Err(err) = &result {
            let msg = format_error_chain(err);
            tracing::warn!(run_id = %run_id, filename, error = %msg, "run failed to start");
            if let Err(e) = self.files.append_log(run_id, &format!("Error: {msg}")).await {
                tracing::warn!(run_id = %run_id, error = %e, "failed to write run log");
            }
        }
        result
    }

    async fn spawn_inner(&self, filename: &str, run_id: &RunId) -> anyhow::Result<RunStatus> {
        {
            let mut reg = self.inner.lock().await;
            if reg.runs.contains_key(run_id.as_str()) {
                anyhow::bail!("run id already registered: {run_id}");
            }
            let reservation = reg.reserved.entry(run_id.0.clone()).or_default();
            if reservation.filename.is_none() {
                reservation.filename = Some(filename.to_string());
            }
        }
        self.ensure_not_cancelled(run_id, filename).await?;

        let script_path = self.scripts.path_of(filename)?;
        let source = tokio::fs::read(&script_path)
            .await
            .with_context(|| format!("read script {}", script_path.display()))?;
        let source = String::from_utf8_lossy(&source).into_owned();

        let deps = sniffer::sniff(&source);
        installer::install(&self.config, &self.files, run_id, &deps)
            .await
            .context("dependency installation failed")?;
        self.ensure_not_cancelled(run_id, filename).await?;

        let mode = sniffer::detect_mode(&deps, &source);
        let port = match mode {
            ExecMode::Server => Some(self.ports.lease().context("allocate port")?),
            ExecMode::Batch => None,
        };

        let plan = self.plan_launch(filename, &script_path, mode, port, &source);
        let handle = match self.launch(run_id, &plan) {
            Ok(h) => h,
            Err(err) => {
                if let Some(port) = port {
                    self.ports.release(port);
                }
                return Err(err);
            }
        };

        let started_at = Utc::now();
        let pid = handle.pid();
        let record = RunRecord {
            run_id: run_id.0.clone(),
            filename: filename.to_string(),
            started_at_unix_ms: unix_now_ms(),
            pid,
            pgid: handle.pgid(),
            port,
            mode,
            exec: plan.exec.clone(),
            args: plan.args.clone(),
            cwd: plan.cwd.as_ref().map(|p| p.display().to_string()),
        };

        let mut reg = self.inner.lock().await;
        if reg.is_cancelled(run_id.as_str()) {
            drop(reg);
            handle.terminate(self.config.stop_grace).await;
            if let Some(port) = port {
                self.ports.release(port);
            }
            anyhow::bail!("script {filename} was deleted while the run was starting");
        }
        let mut entry = RunEntry {
            filename: filename.to_string(),
            port,
            started_at,
            mode,
            pid,
            handle: Some(handle),
        };
        let mut status = entry.status(run_id.as_str());
        reg.runs.insert(run_id.0.clone(), entry);
        drop(reg);

        if let Err(err) = write_run_record(&self.files.record_path(run_id), &record).await {
            tracing::warn!(run_id = %run_id, error = %format_error_chain(&err), "failed to write run record");
        }

        tracing::info!(
            run_id = %run_id,
            filename,
            ?mode,
            port,
            pid,
            packages = ?deps.packages(),
            "run started"
        );

        if mode == ExecMode::Server {
            // Crude readiness: give the server a moment to bind before returning.
            tokio::time::sleep(self.config.server_ready_delay).await;
            if let Some(current) = self.get(run_id.as_str()).await {
                status = current;
            } else {
                status.running = false;
            }
        }

        Ok(status)
    }

    fn plan_launch(
        &self,
        filename: &str,
        script_path: &Path,
        mode: ExecMode,
        port: Option<u16>,
        source: &str,
    ) -> LaunchPlan {
        match mode {
            ExecMode::Server => {
                let mut env = Vec::new();
                if let Some(port) = port
                    && !sniffer::binds_explicit_port(source)
                {
                    env.push(("PORT".to_string(), port.to_string()));
                }
                LaunchPlan {
                    exec: self.config.interpreter.clone(),
                    args: vec![filename.to_string()],
                    cwd: Some(self.scripts.dir().to_path_buf()),
                    env,
                }
            }
            ExecMode::Batch => LaunchPlan {
                exec: self.config.interpreter.clone(),
                args: vec![script_path.display().to_string()],
                cwd: None,
                env: Vec::new(),
            },
        }
    }

    fn launch(&self, run_id: &RunId, plan: &LaunchPlan) -> anyhow::Result<ProcessHandle> {
        let log = self.files.open_child_log(run_id).context("open run log")?;
        let log_err = log.try_clone().context("clone run log handle")?;

        let mut cmd = Command::new(&plan.exec);
        cmd.args(&plan.args)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err));
        if let Some(cwd) = &plan.cwd {
            cmd.current_dir(cwd);
        }
        for (k, v) in &plan.env {
            cmd.env(k, v);
        }

        #[cfg(unix)]
        {
            unsafe {
                cmd.pre_exec(|| {
                    crate::process_manager_support::set_parent_death_signal()?;
                    if libc::setsid() == -1 {
                        return Err(std::io::Error::last_os_error());
                    }
                    Ok(())
                });
            }
        }

        let child = cmd
            .spawn()
            .with_context(|| format!("spawn `{} {}`", plan.exec, plan.args.join(" ")))?;
        Ok(ProcessHandle::new(child))
    }

    pub async fn status(&self, run_id: &str) -> Option<RunState> {
        self.get(run_id).await.map(|s| s.state())
    }

    pub async fn get(&self, run_id: &str) -> Option<RunStatus> {
        let mut reg = self.inner.lock().await;
        reg.runs.get_mut(run_id).map(|e| e.status(run_id))
    }

    /// Oldest first.
    pub async fn list_runs(&self) -> Vec<RunStatus> {
        let mut reg = self.inner.lock().await;
        let mut out: Vec<RunStatus> = reg
            .runs
            .iter_mut()
            .map(|(id, e)| e.status(id))
            .collect();
        out.sort_by(|a, b| a.start_time.cmp(&b.start_time).then_with(|| a.id.cmp(&b.id)));
        out
    }

    pub async fn run_count(&self) -> usize {
        self.inner.lock().await.runs.len()
    }

    /// Best-effort termination followed by deregistration. Only an unknown id
    /// is reported; signal and wait failures are swallowed.
    pub async fn stop(&self, run_id: &str) -> StopOutcome {
        let handle = {
            let mut reg = self.inner.lock().await;
            let Some(e) = reg.runs.get_mut(run_id) else {
                return StopOutcome::NotFound;
            };
            e.handle.take()
        };

        let termination = match handle {
            Some(h) => Some(h.terminate(self.config.stop_grace).await),
            None => None,
        };

        let removed = self.inner.lock().await.runs.remove(run_id);
        if let Some(port) = removed.as_ref().and_then(|e| e.port) {
            self.ports.release(port);
        }

        let id = RunId(run_id.to_string());
        let _ = tokio::fs::remove_file(self.files.record_path(&id)).await;
        let note = match termination {
            Some(Termination::Exited(code)) => format!("stopped (exit code {code:?})"),
            Some(Termination::Killed) => "stopped (killed after timeout)".to_string(),
            Some(Termination::Unknown) => "stopped (outcome unknown)".to_string(),
            None => "stopped".to_string(),
        };
        if let Err(e) = self.files.append_log(&id, &note).await {
            tracing::debug!(run_id, error = %e, "failed to write run log");
        }

        tracing::info!(run_id, ?termination, "run stopped");
        StopOutcome::Stopped
    }

    /// Stops every run launched from `filename` and cancels spawns of it that
    /// are still queued or installing. Returns the ids of the stopped runs.
    pub async fn stop_by_filename(&self, filename: &str) -> Vec<RunId> {
        let ids: Vec<String> = {
            let mut reg = self.inner.lock().await;
            let mut cancelled = 0usize;
            for r in reg.reserved.values_mut() {
                if r.filename.as_deref() == Some(filename) && !r.cancelled {
                    r.cancelled = true;
                    cancelled += 1;
                }
            }
            if cancelled > 0 {
                tracing::info!(filename, cancelled, "pending spawns cancelled");
            }
            reg.runs
                .iter()
                .filter(|(_, e)| e.filename == filename)
                .map(|(id, _)| id.clone())
                .collect()
        };
        self.stop_many(ids).await
    }

    pub async fn stop_all(&self) -> Vec<RunId> {
        let ids: Vec<String> = self.inner.lock().await.runs.keys().cloned().collect();
        self.stop_many(ids).await
    }

    async fn stop_many(&self, ids: Vec<String>) -> Vec<RunId> {
        let stops = ids.iter().map(|id| self.stop(id));
        let outcomes = futures_util::future::join_all(stops).await;
        ids.into_iter()
            .zip(outcomes)
            .filter(|(_, o)| *o == StopOutcome::Stopped)
            .map(|(id, _)| RunId(id))
            .collect()
    }

    pub async fn read_log(&self, run_id: &RunId) -> anyhow::Result<Option<String>> {
        self.files.read_log(run_id).await
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::time::Duration;

    struct Fixture {
        _tmp: tempfile::TempDir,
        manager: ProcessManager,
    }

    /// `/bin/sh` stands in for the interpreter, `true`/`false` for the installer.
    async fn fixture(installer: &str) -> Fixture {
        let tmp = tempfile::tempdir().unwrap();
        let mut cfg = AgentConfig::with_dirs(tmp.path().join("uploads"), tmp.path().join("processes"));
        cfg.interpreter = "/bin/sh".to_string();
        cfg.install_program = installer.to_string();
        cfg.install_args = Vec::new();
        cfg.server_ready_delay = Duration::from_millis(200);
        cfg.stop_grace = Duration::from_secs(2);
        // High, unlikely-to-be-busy range.
        cfg.base_port = 47000;
        cfg.port_span = 500;
        let manager = ProcessManager::new(cfg).await.unwrap();
        Fixture { _tmp: tmp, manager }
    }

    async fn upload(m: &ProcessManager, name: &str, body: &str) {
        m.scripts().save(name, body.as_bytes()).await.unwrap();
    }

    async fn wait_until_stopped(m: &ProcessManager, id: &str) -> bool {
        for _ in 0..50 {
            if m.status(id).await == Some(RunState::Stopped) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        false
    }

    #[tokio::test]
    async fn batch_run_is_registered_and_finishes() {
        let f = fixture("true").await;
        upload(&f.manager, "hello.py", "echo hi\n").await;

        let id = f.manager.new_run_id().await;
        let status = f.manager.spawn("hello.py", &id).await.unwrap();
        assert_eq!(status.mode, ExecMode::Batch);
        assert_eq!(status.port, None);
        assert_eq!(status.filename, "hello.py");

        assert!(wait_until_stopped(&f.manager, id.as_str()).await);
        assert_eq!(f.manager.run_count().await, 1);

        let log = f.manager.read_log(&id).await.unwrap().unwrap();
        assert!(log.contains("hi"), "{log}");

        let manifest = tokio::fs::read_to_string(f.manager.files().manifest_path(&id))
            .await
            .unwrap();
        assert_eq!(manifest, "flask\n");
    }

    #[tokio::test]
    async fn failing_installer_registers_nothing_and_logs_error() {
        let f = fixture("false").await;
        upload(&f.manager, "hello.py", "echo hi\n").await;

        let id = f.manager.new_run_id().await;
        assert!(f.manager.spawn("hello.py", &id).await.is_err());
        assert_eq!(f.manager.run_count().await, 0);
        assert!(f.manager.get(id.as_str()).await.is_none());

        let log = f.manager.read_log(&id).await.unwrap().unwrap();
        assert!(!log.trim().is_empty());
        assert!(log.contains("dependency installation failed"), "{log}");
    }

    #[tokio::test]
    async fn missing_script_fails_without_registering() {
        let f = fixture("true").await;
        let id = f.manager.new_run_id().await;
        assert!(f.manager.spawn("ghost.py", &id).await.is_err());
        assert_eq!(f.manager.run_count().await, 0);
        let log = f.manager.read_log(&id).await.unwrap().unwrap();
        assert!(log.contains("Error:"), "{log}");
    }

    #[tokio::test]
    async fn launch_failure_registers_nothing() {
        let f = fixture("true").await;
        let mut cfg = f.manager.config().clone();
        cfg.interpreter = "/nonexistent/interpreter".to_string();
        let manager = ProcessManager::new(cfg).await.unwrap();
        upload(&manager, "hello.py", "echo hi\n").await;

        let id = manager.new_run_id().await;
        let err = manager.spawn("hello.py", &id).await.unwrap_err();
        assert!(format_error_chain(&err).contains("spawn"));
        assert_eq!(manager.run_count().await, 0);
        assert!(manager.ports.leased().is_empty());
    }

    #[tokio::test]
    async fn server_run_gets_port_in_env() {
        let f = fixture("true").await;
        let script = "import flask\necho \"listening on $PORT\"\nsleep 30\n";
        upload(&f.manager, "server.py", script).await;

        let id = f.manager.new_run_id().await;
        let status = f.manager.spawn("server.py", &id).await.unwrap();
        assert_eq!(status.mode, ExecMode::Server);
        let port = status.port.expect("server run has a port");
        assert!(status.running);

        let log = f.manager.read_log(&id).await.unwrap().unwrap();
        assert!(log.contains(&format!("listening on {port}")), "{log}");

        let listed = f.manager.list_runs().await;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].port, Some(port));

        assert!(f.manager.files().record_path(&id).exists());
        assert_eq!(f.manager.stop(id.as_str()).await, StopOutcome::Stopped);
        assert!(!f.manager.files().record_path(&id).exists());
        assert!(f.manager.ports.leased().is_empty());
    }

    #[tokio::test]
    async fn explicit_port_in_source_skips_env() {
        let f = fixture("true").await;
        let script = "# app.run(port=8080)\necho \"env=[$PORT]\"\n";
        upload(&f.manager, "fixed.py", script).await;

        let id = f.manager.new_run_id().await;
        let status = f.manager.spawn("fixed.py", &id).await.unwrap();
        assert_eq!(status.mode, ExecMode::Server);
        assert!(status.port.is_some());

        assert!(wait_until_stopped(&f.manager, id.as_str()).await);
        let log = f.manager.read_log(&id).await.unwrap().unwrap();
        assert!(log.contains("env=[]"), "{log}");
    }

    #[tokio::test]
    async fn concurrent_server_runs_get_distinct_ports() {
        let f = fixture("true").await;
        upload(&f.manager, "server.py", "import flask\nsleep 30\n").await;

        let a = f.manager.new_run_id().await;
        let b = f.manager.new_run_id().await;
        let (ra, rb) = tokio::join!(
            f.manager.spawn("server.py", &a),
            f.manager.spawn("server.py", &b)
        );
        assert_ne!(ra.unwrap().port, rb.unwrap().port);

        assert_eq!(f.manager.stop_all().await.len(), 2);
        assert_eq!(f.manager.run_count().await, 0);
    }

    #[tokio::test]
    async fn stop_unknown_is_not_found_and_leaves_registry() {
        let f = fixture("true").await;
        upload(&f.manager, "long.py", "sleep 30\n").await;
        let id = f.manager.new_run_id().await;
        f.manager.spawn("long.py", &id).await.unwrap();

        assert_eq!(f.manager.stop("nope").await, StopOutcome::NotFound);
        assert_eq!(f.manager.run_count().await, 1);

        f.manager.stop_all().await;
    }

    #[tokio::test]
    async fn stop_removes_run_even_if_process_already_exited() {
        let f = fixture("true").await;
        upload(&f.manager, "quick.py", "exit 0\n").await;
        let id = f.manager.new_run_id().await;
        f.manager.spawn("quick.py", &id).await.unwrap();
        assert!(wait_until_stopped(&f.manager, id.as_str()).await);

        assert_eq!(f.manager.stop(id.as_str()).await, StopOutcome::Stopped);
        assert!(f.manager.get(id.as_str()).await.is_none());
        assert_eq!(f.manager.stop(id.as_str()).await, StopOutcome::NotFound);
    }

    #[tokio::test]
    async fn stop_running_batch_process() {
        let f = fixture("true").await;
        upload(&f.manager, "long.py", "sleep 30\n").await;
        let id = f.manager.new_run_id().await;
        f.manager.spawn("long.py", &id).await.unwrap();
        assert_eq!(f.manager.status(id.as_str()).await, Some(RunState::Running));

        assert_eq!(f.manager.stop(id.as_str()).await, StopOutcome::Stopped);
        assert_eq!(f.manager.status(id.as_str()).await, None);
        let log = f.manager.read_log(&id).await.unwrap().unwrap();
        assert!(log.contains("[runbox] stopped"), "{log}");
    }

    #[tokio::test]
    async fn stop_by_filename_only_hits_matching_runs() {
        let f = fixture("true").await;
        upload(&f.manager, "a.py", "sleep 30\n").await;
        upload(&f.manager, "b.py", "sleep 30\n").await;

        let a1 = f.manager.new_run_id().await;
        let a2 = f.manager.new_run_id().await;
        let b1 = f.manager.new_run_id().await;
        f.manager.spawn("a.py", &a1).await.unwrap();
        f.manager.spawn("a.py", &a2).await.unwrap();
        f.manager.spawn("b.py", &b1).await.unwrap();

        let mut stopped = f.manager.stop_by_filename("a.py").await;
        stopped.sort();
        let mut expected = vec![a1, a2];
        expected.sort();
        assert_eq!(stopped, expected);
        assert_eq!(f.manager.run_count().await, 1);
        assert!(f.manager.get(b1.as_str()).await.is_some());

        f.manager.stop_all().await;
    }

    #[tokio::test]
    async fn new_run_ids_are_reserved() {
        let f = fixture("true").await;
        let mut seen = HashSet::new();
        for _ in 0..100 {
            assert!(seen.insert(f.manager.new_run_id().await));
        }
        assert_eq!(f.manager.inner.lock().await.reserved.len(), 100);
    }

    #[tokio::test]
    async fn deleting_script_mid_install_cancels_the_spawn() {
        let f = fixture("true").await;
        let mut cfg = f.manager.config().clone();
        cfg.install_program = "/bin/sh".to_string();
        cfg.install_args = vec!["-c".into(), "sleep 0.5".into(), "sh".into()];
        let manager = ProcessManager::new(cfg).await.unwrap();
        upload(&manager, "job.py", "sleep 30\n").await;

        let id = manager.new_run_id_for("job.py").await;
        let spawning = {
            let m = manager.clone();
            let id = id.clone();
            tokio::spawn(async move { m.spawn("job.py", &id).await })
        };
        tokio::time::sleep(Duration::from_millis(150)).await;

        assert!(manager.stop_by_filename("job.py").await.is_empty());
        assert!(manager.scripts().delete("job.py").await.unwrap());

        let err = spawning.await.unwrap().unwrap_err();
        assert!(format_error_chain(&err).contains("deleted"), "{err:#}");
        assert_eq!(manager.run_count().await, 0);
        assert!(manager.get(id.as_str()).await.is_none());
        assert!(manager.inner.lock().await.reserved.is_empty());
    }

    #[tokio::test]
    async fn cancellation_is_scoped_to_the_deleted_script() {
        let f = fixture("true").await;
        upload(&f.manager, "keep.py", "sleep 30\n").await;

        let kept = f.manager.new_run_id_for("keep.py").await;
        let _other = f.manager.new_run_id_for("gone.py").await;
        f.manager.stop_by_filename("gone.py").await;

        f.manager.spawn("keep.py", &kept).await.unwrap();
        assert_eq!(f.manager.status(kept.as_str()).await, Some(RunState::Running));
        f.manager.stop_all().await;
    }
}
