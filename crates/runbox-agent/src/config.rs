use std::{path::PathBuf, time::Duration};

use crate::process_manager_support::{env_bool, env_string, env_u16, env_u64, env_usize};

const DEFAULT_INTERPRETER: &str = "python3";
const DEFAULT_BASE_PORT: u16 = 5000;
const DEFAULT_PORT_SPAN: u16 = 1000;
const DEFAULT_SERVER_READY_DELAY_MS: u64 = 3000;
const DEFAULT_STOP_GRACE_SEC: u64 = 5;
const DEFAULT_MAX_CONCURRENT_SPAWNS: usize = 4;

/// Supervisor settings.
///
/// | Env Var                        | Default                            |
/// |--------------------------------|------------------------------------|
/// | `RUNBOX_UPLOAD_DIR`            | `uploads`                          |
/// | `RUNBOX_PROCESS_DIR`           | `processes`                        |
/// | `RUNBOX_INTERPRETER`           | `python3`                          |
/// | `RUNBOX_INSTALL_CMD`           | `<interpreter> -m pip install -r`  |
/// | `RUNBOX_BASE_PORT`             | `5000`                             |
/// | `RUNBOX_PORT_SPAN`             | `1000`                             |
/// | `RUNBOX_SERVER_READY_DELAY_MS` | `3000`                             |
/// | `RUNBOX_STOP_GRACE_SEC`        | `5`                                |
/// | `RUNBOX_MAX_CONCURRENT_SPAWNS` | `4`                                |
/// | `RUNBOX_REAP_ORPHANS`          | `true`                             |
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub upload_dir: PathBuf,
    pub process_dir: PathBuf,
    /// Program that runs a script: `<interpreter> <script>`.
    pub interpreter: String,
    /// Installer program; `install_args` and then the manifest path follow it.
    pub install_program: String,
    pub install_args: Vec<String>,
    pub base_port: u16,
    pub port_span: u16,
    pub server_ready_delay: Duration,
    pub stop_grace: Duration,
    pub max_concurrent_spawns: usize,
    pub reap_orphans: bool,
}

impl AgentConfig {
    /// Defaults rooted at the given directories; nothing is read from the environment.
    pub fn with_dirs(upload_dir: impl Into<PathBuf>, process_dir: impl Into<PathBuf>) -> Self {
        let interpreter = DEFAULT_INTERPRETER.to_string();
        Self {
            upload_dir: upload_dir.into(),
            process_dir: process_dir.into(),
            install_program: interpreter.clone(),
            install_args: default_install_args(),
            interpreter,
            base_port: DEFAULT_BASE_PORT,
            port_span: DEFAULT_PORT_SPAN,
            server_ready_delay: Duration::from_millis(DEFAULT_SERVER_READY_DELAY_MS),
            stop_grace: Duration::from_secs(DEFAULT_STOP_GRACE_SEC),
            max_concurrent_spawns: DEFAULT_MAX_CONCURRENT_SPAWNS,
            reap_orphans: true,
        }
    }

    pub fn from_env() -> Self {
        let upload_dir = env_string("RUNBOX_UPLOAD_DIR").unwrap_or_else(|| "uploads".to_string());
        let process_dir =
            env_string("RUNBOX_PROCESS_DIR").unwrap_or_else(|| "processes".to_string());
        let mut cfg = Self::with_dirs(upload_dir, process_dir);

        if let Some(interpreter) = env_string("RUNBOX_INTERPRETER") {
            cfg.install_program = interpreter.clone();
            cfg.interpreter = interpreter;
        }

        if let Some(raw) = env_string("RUNBOX_INSTALL_CMD") {
            let mut parts = raw.split_whitespace().map(str::to_string);
            if let Some(program) = parts.next() {
                cfg.install_program = program;
                cfg.install_args = parts.collect();
            }
        }

        cfg.base_port = env_u16("RUNBOX_BASE_PORT")
            .map(|v| v.max(1024))
            .unwrap_or(DEFAULT_BASE_PORT);
        let room = (u16::MAX - cfg.base_port).max(1);
        cfg.port_span = env_u16("RUNBOX_PORT_SPAN")
            .map(|v| v.clamp(1, room))
            .unwrap_or(DEFAULT_PORT_SPAN.min(room));
        cfg.server_ready_delay = Duration::from_millis(
            env_u64("RUNBOX_SERVER_READY_DELAY_MS")
                .map(|v| v.clamp(0, 60_000))
                .unwrap_or(DEFAULT_SERVER_READY_DELAY_MS),
        );
        cfg.stop_grace = Duration::from_secs(
            env_u64("RUNBOX_STOP_GRACE_SEC")
                .map(|v| v.clamp(1, 60))
                .unwrap_or(DEFAULT_STOP_GRACE_SEC),
        );
        cfg.max_concurrent_spawns = env_usize("RUNBOX_MAX_CONCURRENT_SPAWNS")
            .map(|v| v.clamp(1, 64))
            .unwrap_or(DEFAULT_MAX_CONCURRENT_SPAWNS);
        cfg.reap_orphans = env_bool("RUNBOX_REAP_ORPHANS").unwrap_or(true);

        cfg
    }

    pub fn install_command_line(&self) -> String {
        let mut parts = vec![self.install_program.clone()];
        parts.extend(self.install_args.iter().cloned());
        parts.join(" ")
    }
}

fn default_install_args() -> Vec<String> {
    ["-m", "pip", "install", "-r"]
        .into_iter()
        .map(str::to_string)
        .collect()
}
