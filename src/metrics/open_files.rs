//! Open-file listing for a PID.
//!
//! Primary path reads `/proc/<pid>/fd` link targets directly; where that is
//! unavailable (non-Linux, permission denied) we fall back to parsing `lsof`
//! output by column position. The fallback is a compatibility path only:
//! column parsing breaks on exotic NAME fields, which is acceptable because
//! the consumer applies a lossy path filter anyway.

use std::fs;
use std::process::Command;

/// Raw listing lines for one PID. Each line is either a link target
/// (`/proc` path) or an `lsof` NAME field. An unreadable process yields an
/// empty list rather than an error; the caller treats missing data as "no
/// open files visible".
pub fn list_raw(pid: u32) -> Vec<String> {
    match proc_fd_targets(pid) {
        Some(lines) => lines,
        None => lsof_names(pid),
    }
}

/// Extract a filesystem path from one raw listing line.
///
/// Sockets, pipes, anonymous mappings and the like have no path and are
/// dropped here on purpose; callers get filesystem paths only.
pub fn parse_path(line: &str) -> Option<String> {
    let line = line.trim();
    if !line.starts_with('/') {
        return None;
    }
    // readlink reports deleted targets with a suffix; the path part is
    // still useful.
    Some(
        line.strip_suffix(" (deleted)")
            .unwrap_or(line)
            .to_string(),
    )
}

fn proc_fd_targets(pid: u32) -> Option<Vec<String>> {
    let dir = format!("/proc/{pid}/fd");
    let entries = fs::read_dir(&dir).ok()?;
    let mut out = Vec::new();
    for entry in entries.flatten() {
        if let Ok(target) = fs::read_link(entry.path()) {
            out.push(target.to_string_lossy().to_string());
        }
    }
    Some(out)
}

fn lsof_names(pid: u32) -> Vec<String> {
    let output = match Command::new("lsof")
        .arg("-p")
        .arg(pid.to_string())
        .output()
    {
        Ok(out) if out.status.success() => out,
        _ => return Vec::new(),
    };
    let stdout = String::from_utf8_lossy(&output.stdout);
    let mut lines = stdout.lines();
    // First line is the header; NAME is the ninth column and may itself
    // contain whitespace, so rejoin everything from that column on.
    let _header = lines.next();
    lines
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 9 {
                return None;
            }
            Some(fields[8..].join(" "))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_keeps_filesystem_paths() {
        assert_eq!(
            parse_path("/var/log/syslog"),
            Some("/var/log/syslog".to_string())
        );
        assert_eq!(
            parse_path("/tmp/with space/file.txt"),
            Some("/tmp/with space/file.txt".to_string())
        );
    }

    #[test]
    fn parse_drops_non_path_descriptors() {
        assert_eq!(parse_path("socket:[123456]"), None);
        assert_eq!(parse_path("pipe:[789]"), None);
        assert_eq!(parse_path("anon_inode:[eventfd]"), None);
        assert_eq!(parse_path(""), None);
    }

    #[test]
    fn parse_strips_deleted_marker() {
        assert_eq!(
            parse_path("/tmp/gone.log (deleted)"),
            Some("/tmp/gone.log".to_string())
        );
    }

    #[test]
    fn own_process_listing_does_not_panic() {
        let _ = list_raw(std::process::id());
    }
}
