//! Startup cleanup for runs left behind by a previous control process.
//!
//! The registry is never persisted, so after a restart any still-running
//! child is untracked. Each launch leaves a `<id>.run.json` record; here those
//! records are used to terminate the leftovers and clear them out.

use std::time::Duration;

use anyhow::Context;
use runbox_process::RunId;

use crate::process_handle::{Signal, process_running, signal_group, signal_pid};
use crate::process_manager::RunRecord;
use crate::storage::RunFiles;

const RECORD_SUFFIX: &str = ".run.json";
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Returns how many live orphaned runs were terminated. Every record found is
/// removed afterwards, whether or not its process was still around.
pub async fn reap_orphans(files: &RunFiles, grace: Duration) -> anyhow::Result<usize> {
    let mut rd = tokio::fs::read_dir(files.dir())
        .await
        .context("read process dir")?;

    let mut reaped = 0;
    while let Some(entry) = rd.next_entry().await.context("read process dir")? {
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().to_string();
        if !name.ends_with(RECORD_SUFFIX) {
            continue;
        }

        let record = match tokio::fs::read(&path)
            .await
            .ok()
            .and_then(|data| serde_json::from_slice::<RunRecord>(&data).ok())
        {
            Some(r) => r,
            None => {
                tracing::warn!(path = %path.display(), "dropping unreadable run record");
                let _ = tokio::fs::remove_file(&path).await;
                continue;
            }
        };

        if let Some(pid) = record.pid
            && process_running(pid)
            && cmdline_mentions(pid, &record.filename)
        {
            tracing::warn!(
                run_id = %record.run_id,
                pid,
                filename = %record.filename,
                "terminating orphaned run"
            );
            terminate_orphan(pid, record.pgid, grace).await;
            reaped += 1;
            if let Some(id) = RunId::parse(&record.run_id) {
                let _ = files
                    .append_log(&id, "stopped (orphaned by a control restart)")
                    .await;
            }
        }

        let _ = tokio::fs::remove_file(&path).await;
    }

    Ok(reaped)
}

async fn terminate_orphan(pid: u32, pgid: Option<i32>, grace: Duration) {
    let pgid = pgid.unwrap_or(pid as i32);
    signal_group(pgid, Signal::Term);
    signal_pid(pid, Signal::Term);

    let deadline = tokio::time::Instant::now() + grace;
    while tokio::time::Instant::now() < deadline {
        if !process_running(pid) {
            return;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }

    signal_group(pgid, Signal::Kill);
    signal_pid(pid, Signal::Kill);
}

/// Guards against pid reuse: only a process still running the script is touched.
#[cfg(target_os = "linux")]
fn cmdline_mentions(pid: u32, filename: &str) -> bool {
    let Ok(raw) = std::fs::read(format!("/proc/{pid}/cmdline")) else {
        return false;
    };
    raw.split(|b| *b == 0)
        .map(String::from_utf8_lossy)
        .any(|arg| arg == filename || arg.ends_with(&format!("/{filename}")))
}

#[cfg(not(target_os = "linux"))]
fn cmdline_mentions(_pid: u32, _filename: &str) -> bool {
    false
}
