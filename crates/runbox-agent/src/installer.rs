use anyhow::Context;
use runbox_process::RunId;

use crate::config::AgentConfig;
use crate::process_manager_support::truncate_utf8_tail;
use crate::sniffer::Dependencies;
use crate::storage::RunFiles;

const MAX_STDERR_BYTES: usize = 4 * 1024;

/// Writes the run's manifest (one package per line) and runs the installer
/// against it, waiting for it to finish. Any failure is fatal for the run.
///
/// There is no timeout: a hanging installer blocks the calling worker.
pub async fn install(
    config: &AgentConfig,
    files: &RunFiles,
    run_id: &RunId,
    deps: &Dependencies,
) -> anyhow::Result<()> {
    if deps.is_empty() {
        return Ok(());
    }

    let manifest = files.manifest_path(run_id);
    let mut body = String::new();
    for package in deps.packages() {
        body.push_str(package);
        body.push('\n');
    }
    tokio::fs::write(&manifest, body)
        .await
        .with_context(|| format!("write manifest {}", manifest.display()))?;

    tracing::info!(
        run_id = %run_id,
        packages = ?deps.packages(),
        command = %config.install_command_line(),
        "installing dependencies"
    );

    let out = tokio::process::Command::new(&config.install_program)
        .args(&config.install_args)
        .arg(&manifest)
        .stdin(std::process::Stdio::null())
        .output()
        .await
        .with_context(|| format!("run installer `{}`", config.install_command_line()))?;

    if !out.status.success() {
        let stderr = String::from_utf8_lossy(&out.stderr);
        let stderr = truncate_utf8_tail(stderr.trim(), MAX_STDERR_BYTES);
        let code = out
            .status
            .code()
            .map(|c| c.to_string())
            .unwrap_or_else(|| "signal".to_string());
        if stderr.is_empty() {
            anyhow::bail!(
                "installer `{} {}` exited with {code}",
                config.install_command_line(),
                manifest.display()
            );
        }
        anyhow::bail!(
            "installer `{} {}` exited with {code}: {stderr}",
            config.install_command_line(),
            manifest.display()
        );
    }

    Ok(())
}
