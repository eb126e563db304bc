pub(crate) fn env_usize(name: &str) -> Option<usize> {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<usize>().ok())
}

pub(crate) fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
}

pub(crate) fn env_u16(name: &str) -> Option<u16> {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<u16>().ok())
}

pub(crate) fn env_bool(name: &str) -> Option<bool> {
    let v = std::env::var(name).ok()?;
    match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

pub(crate) fn env_string(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn format_error_chain(err: &anyhow::Error) -> String {
    let mut parts = Vec::<String>::new();
    for cause in err.chain() {
        let s = cause.to_string();
        if s.is_empty() {
            continue;
        }
        if parts.last() == Some(&s) {
            continue;
        }
        parts.push(s);
    }
    if parts.is_empty() {
        "unknown error".to_string()
    } else {
        parts.join(": ")
    }
}

/// Keeps the *end* of `s` (where installers print the actual failure),
/// cut on a char boundary.
pub(crate) fn truncate_utf8_tail(s: &str, max_bytes: usize) -> String {
    if s.len() <= max_bytes {
        return s.to_string();
    }

    let prefix = "(truncated)…";
    let keep = max_bytes.saturating_sub(prefix.len()).max(1);
    let mut start = s.len().saturating_sub(keep);
    while start < s.len() && !s.is_char_boundary(start) {
        start += 1;
    }
    format!("{prefix}{}", &s[start..])
}

pub(crate) fn unix_now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(target_os = "linux")]
pub(crate) fn set_parent_death_signal() -> std::io::Result<()> {
    // If the control process dies (crash/kill), ensure the child is terminated.
    let rc = unsafe { libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGTERM) };
    if rc == -1 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(all(unix, not(target_os = "linux")))]
pub(crate) fn set_parent_death_signal() -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_chain_skips_duplicates() {
        let err = anyhow::anyhow!("root cause")
            .context("root cause")
            .context("install failed");
        assert_eq!(format_error_chain(&err), "install failed: root cause");
    }

    #[test]
    fn truncate_keeps_tail() {
        let s = format!("{}ERROR: no matching distribution", "x".repeat(4096));
        let t = truncate_utf8_tail(&s, 64);
        assert!(t.len() <= 64);
        assert!(t.starts_with("(truncated)"));
        assert!(t.ends_with("no matching distribution"));
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        let s = "é".repeat(100);
        let t = truncate_utf8_tail(&s, 31);
        assert!(t.ends_with('é'));
    }

    #[test]
    fn short_text_is_untouched() {
        assert_eq!(truncate_utf8_tail("ok", 10), "ok");
    }
}
