use std::{net::SocketAddr, path::PathBuf};

use anyhow::Context;

const DEFAULT_PORT: u16 = 10000;
const DEFAULT_MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;

/// HTTP server settings loaded from environment variables.
///
/// | Env Var                   | Default   |
/// |---------------------------|-----------|
/// | `HOST`                    | `0.0.0.0` |
/// | `PORT`                    | `10000`   |
/// | `RUNBOX_MAX_UPLOAD_BYTES` | 16 MiB    |
/// | `RUNBOX_LOG_DIR`          | unset     |
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Request bodies above this size are rejected with 413.
    pub max_upload_bytes: usize,
    /// When set, service logs are also written to a daily rolling file here.
    pub log_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            log_dir: None,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let mut cfg = Self::default();

        if let Ok(host) = std::env::var("HOST")
            && !host.trim().is_empty()
        {
            cfg.host = host.trim().to_string();
        }

        if let Ok(port) = std::env::var("PORT") {
            cfg.port = port
                .trim()
                .parse()
                .with_context(|| format!("PORT must be a valid port number, got {port:?}"))?;
        }

        cfg.max_upload_bytes = std::env::var("RUNBOX_MAX_UPLOAD_BYTES")
            .ok()
            .and_then(|v| v.trim().parse::<usize>().ok())
            .map(|v| v.clamp(1024, 1024 * 1024 * 1024))
            .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES);

        cfg.log_dir = std::env::var("RUNBOX_LOG_DIR")
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);

        Ok(cfg)
    }

    pub fn bind_addr(&self) -> anyhow::Result<SocketAddr> {
        let ip = self
            .host
            .parse()
            .with_context(|| format!("HOST must be an IP address, got {:?}", self.host))?;
        Ok(SocketAddr::new(ip, self.port))
    }

    pub fn max_upload_label(&self) -> String {
        const MIB: usize = 1024 * 1024;
        if self.max_upload_bytes >= MIB && self.max_upload_bytes % MIB == 0 {
            format!("{}MB", self.max_upload_bytes / MIB)
        } else {
            format!("{} bytes", self.max_upload_bytes)
        }
    }
}
