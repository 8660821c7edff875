//! Trust anchor file format.
//!
//! A file holds one trust point: point-level timers as `;;name: value`
//! directives, then one presentation-format DNSKEY per line with its
//! RFC 5011 bookkeeping appended as `;;` annotations, and a `;;end:`
//! trailer carrying the key count. Unknown directives are skipped so
//! newer files stay readable; a missing trailer means the file was cut
//! short and the whole file is rejected.

use chrono::DateTime;
use std::collections::HashSet;
use std::fmt::Write as _;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, error, trace};

use super::key::{KeyRecord, KeyState};
use super::point::TrustPoint;
use crate::config::AutotrustConfig;
use crate::dnssec::{Dnskey, canonical_name};
use crate::error::{AutotrustError, Result};

const HEADER: &str = "; autotrust trust anchor file";

/// Render a trust point to its file representation.
pub fn render_point(point: &TrustPoint) -> String {
    let mut out = String::with_capacity(256 + point.keys.len() * 512);

    let _ = writeln!(out, "{}", HEADER);
    let _ = writeln!(out, ";;id: {} 1", point.zone);
    let _ = writeln!(out, ";;last_queried: {} ;;{}", point.last_queried, human_time(point.last_queried));
    let _ = writeln!(out, ";;last_success: {} ;;{}", point.last_success, human_time(point.last_success));
    let _ = writeln!(
        out,
        ";;next_probe_time: {} ;;{}",
        point.next_probe_time,
        human_time(point.next_probe_time)
    );
    let _ = writeln!(out, ";;query_failed: {}", point.query_failed);
    let _ = writeln!(out, ";;query_interval: {}", point.query_interval);
    let _ = writeln!(out, ";;retry_time: {}", point.retry_time);

    for record in &point.keys {
        let _ = writeln!(
            out,
            "{}\t;{{id = {} ({}), size = {}b}} ;;state={} [ {} ] ;;count={} ;;fetched={} ;;revoked={} ;;lastchange={} ;;{}",
            record.key,
            record.key_tag(),
            if record.key.is_sep() { "ksk" } else { "zsk" },
            record.key.key_size(),
            record.state.to_u8(),
            record.state.token(),
            record.pending_count,
            u8::from(record.fetched),
            u8::from(record.revoked),
            record.last_change,
            human_time(record.last_change)
        );
    }

    let _ = writeln!(out, ";;end: {}", point.keys.len());
    out
}

/// Atomically replace the point's file with its current state.
///
/// The content goes to a temporary file next to the target which is
/// synced and then renamed over it, so readers see either the old or
/// the new file in full.
pub fn write_point(point: &TrustPoint) -> Result<()> {
    let content = render_point(point);
    let target = point.file();
    let tmp = temp_path(target);

    let result = write_synced(&tmp, content.as_bytes()).and_then(|()| {
        fs::rename(&tmp, target).map_err(|e| AutotrustError::io(target, e))
    });

    if let Err(e) = &result {
        error!("Could not write trust anchor file {}: {}", target.display(), e);
        let _ = fs::remove_file(&tmp);
        return result;
    }

    sync_parent_dir(target);
    debug!("Wrote trust anchor file {} ({} keys)", target.display(), point.keys.len());
    Ok(())
}

fn write_synced(path: &Path, content: &[u8]) -> Result<()> {
    let mut file = fs::File::create(path).map_err(|e| AutotrustError::io(path, e))?;
    file.write_all(content).map_err(|e| AutotrustError::io(path, e))?;
    file.sync_all().map_err(|e| AutotrustError::io(path, e))
}

fn temp_path(target: &Path) -> PathBuf {
    let mut name = target.as_os_str().to_owned();
    name.push(format!(".{}.tmp", std::process::id()));
    PathBuf::from(name)
}

#[cfg(unix)]
fn sync_parent_dir(target: &Path) {
    let parent = match target.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    if let Ok(dir) = fs::File::open(parent) {
        let _ = dir.sync_all();
    }
}

#[cfg(not(unix))]
fn sync_parent_dir(_target: &Path) {}

/// Read a trust point file. A missing file is not an error and yields
/// `Ok(None)`; anything else that does not parse completely is.
pub fn read_point(path: &Path, config: &AutotrustConfig) -> Result<Option<TrustPoint>> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!("No trust anchor file at {} yet", path.display());
            return Ok(None);
        }
        Err(e) => return Err(AutotrustError::io(path, e)),
    };

    parse_point(&text, path, config).map(Some)
}

#[derive(Default)]
struct Timers {
    last_queried: Option<i64>,
    last_success: Option<i64>,
    next_probe_time: Option<i64>,
    query_failed: Option<u8>,
    query_interval: Option<u32>,
    retry_time: Option<u32>,
}

/// Parse the content of a trust anchor file that lives at `path`.
pub fn parse_point(text: &str, path: &Path, config: &AutotrustConfig) -> Result<TrustPoint> {
    let mut zone: Option<String> = None;
    let mut timers = Timers::default();
    let mut keys: Vec<KeyRecord> = Vec::new();
    let mut seen_rdata = HashSet::new();
    let mut end: Option<usize> = None;

    for (idx, raw) in text.lines().enumerate() {
        let lineno = idx + 1;
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }

        if end.is_some() && !line.starts_with(';') {
            return Err(AutotrustError::parse(path, lineno, "data after end of file marker"));
        }

        if let Some(directive) = line.strip_prefix(";;") {
            let Some((name, rest)) = directive.split_once(':') else {
                continue;
            };
            let name = name.trim();
            if name.contains(char::is_whitespace) {
                // Free text comment that happens to contain a colon
                continue;
            }
            let value = rest.split(";;").next().unwrap_or("").trim();
            let bad = |what: &str| AutotrustError::parse(path, lineno, format!("bad {}: {}", what, value));

            match name {
                "id" => {
                    let name = value.split_whitespace().next().ok_or_else(|| bad("id"))?;
                    set_once(&mut zone, canonical_name(name), path, lineno, "id")?;
                }
                "last_queried" => {
                    set_once(&mut timers.last_queried, value.parse().map_err(|_| bad(name))?, path, lineno, name)?
                }
                "last_success" => {
                    set_once(&mut timers.last_success, value.parse().map_err(|_| bad(name))?, path, lineno, name)?
                }
                "next_probe_time" => {
                    set_once(&mut timers.next_probe_time, value.parse().map_err(|_| bad(name))?, path, lineno, name)?
                }
                "query_failed" => {
                    set_once(&mut timers.query_failed, value.parse().map_err(|_| bad(name))?, path, lineno, name)?
                }
                "query_interval" => {
                    set_once(&mut timers.query_interval, value.parse().map_err(|_| bad(name))?, path, lineno, name)?
                }
                "retry_time" => {
                    set_once(&mut timers.retry_time, value.parse().map_err(|_| bad(name))?, path, lineno, name)?
                }
                "end" => set_once(&mut end, value.parse().map_err(|_| bad(name))?, path, lineno, name)?,
                other => trace!("{}:{}: skipping unknown directive {}", path.display(), lineno, other),
            }
            continue;
        }

        if line.starts_with(';') {
            continue;
        }

        let Some(zone) = zone.as_deref() else {
            return Err(AutotrustError::parse(path, lineno, "key before ;;id directive"));
        };
        let record = parse_key_line(line, path, lineno)?;
        if record.key.owner != zone {
            return Err(AutotrustError::parse(
                path,
                lineno,
                format!("key owner {} outside trust point {}", record.key.owner, zone),
            ));
        }
        if !seen_rdata.insert(record.key.with_revoke_bit().rdata()) {
            return Err(AutotrustError::parse(path, lineno, "duplicate key"));
        }
        keys.push(record);
    }

    match end {
        Some(count) if count == keys.len() => {}
        Some(count) => {
            return Err(AutotrustError::parse(
                path,
                0,
                format!("end marker counts {} keys, file has {}", count, keys.len()),
            ));
        }
        None => return Err(AutotrustError::Truncated(path.to_path_buf())),
    }

    let zone = zone.ok_or_else(|| AutotrustError::parse(path, 0, "missing ;;id directive"))?;
    let missing = |what: &str| AutotrustError::parse(path, 0, format!("missing ;;{} directive", what));

    let mut point = TrustPoint::new(&zone, path, config);
    point.keys = keys;
    point.last_queried = timers.last_queried.ok_or_else(|| missing("last_queried"))?;
    point.last_success = timers.last_success.ok_or_else(|| missing("last_success"))?;
    point.next_probe_time = timers.next_probe_time.ok_or_else(|| missing("next_probe_time"))?;
    point.query_failed = timers.query_failed.ok_or_else(|| missing("query_failed"))?;
    point.query_interval = timers.query_interval.ok_or_else(|| missing("query_interval"))?;
    point.retry_time = timers.retry_time.ok_or_else(|| missing("retry_time"))?;
    Ok(point)
}

fn parse_key_line(line: &str, path: &Path, lineno: usize) -> Result<KeyRecord> {
    let (record_text, annotations) = line.split_once(';').unwrap_or((line, ""));
    let key = Dnskey::parse(record_text).map_err(|e| AutotrustError::parse(path, lineno, e.to_string()))?;

    let mut state = None;
    let mut last_change = None;
    let mut pending_count = None;
    let mut fetched = None;
    let mut revoked = None;

    for piece in annotations.split(";;").skip(1) {
        let piece = piece.trim();
        let Some((name, rest)) = piece.split_once('=') else {
            continue;
        };
        let name = name.trim();
        let value = rest.split_whitespace().next().unwrap_or("");
        let bad = || AutotrustError::parse(path, lineno, format!("bad {}: {}", name, value));

        match name {
            "state" => {
                let n = value.parse::<u8>().map_err(|_| bad())?;
                let parsed = KeyState::from_u8(n).ok_or_else(bad)?;
                if let Some(token) = state_token(rest) {
                    if token.parse::<KeyState>().ok() != Some(parsed) {
                        return Err(AutotrustError::parse(
                            path,
                            lineno,
                            format!("state {} does not match [ {} ]", n, token),
                        ));
                    }
                }
                set_once(&mut state, parsed, path, lineno, name)?;
            }
            "count" => set_once(&mut pending_count, value.parse().map_err(|_| bad())?, path, lineno, name)?,
            "fetched" => set_once(&mut fetched, parse_flag(value).ok_or_else(bad)?, path, lineno, name)?,
            "revoked" => set_once(&mut revoked, parse_flag(value).ok_or_else(bad)?, path, lineno, name)?,
            "lastchange" => {
                set_once(&mut last_change, value.parse::<i64>().map_err(|_| bad())?, path, lineno, name)?
            }
            _ => {}
        }
    }

    let state = state.ok_or_else(|| AutotrustError::parse(path, lineno, "key without ;;state"))?;
    let last_change =
        last_change.ok_or_else(|| AutotrustError::parse(path, lineno, "key without ;;lastchange"))?;
    let pending_count = pending_count.unwrap_or(0);
    let fetched = fetched.unwrap_or(false);
    let revoked = revoked.unwrap_or(false);

    Ok(KeyRecord {
        key,
        last_change,
        state,
        pending_count,
        fetched,
        revoked,
    })
}

/// Store a directive or annotation value, refusing a second occurrence.
fn set_once<T>(slot: &mut Option<T>, value: T, path: &Path, lineno: usize, name: &str) -> Result<()> {
    if slot.is_some() {
        return Err(AutotrustError::parse(path, lineno, format!("duplicate {}", name)));
    }
    *slot = Some(value);
    Ok(())
}

/// The `[ TOKEN ]` following a numeric state, if present
fn state_token(rest: &str) -> Option<&str> {
    let open = rest.find('[')?;
    let close = rest[open..].find(']')? + open;
    Some(rest[open + 1..close].trim())
}

fn parse_flag(value: &str) -> Option<bool> {
    match value {
        "0" => Some(false),
        "1" => Some(true),
        _ => None,
    }
}

fn human_time(ts: i64) -> String {
    DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%a %b %e %H:%M:%S %Y").to_string())
        .unwrap_or_else(|| "-".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_point() -> TrustPoint {
        let config = AutotrustConfig::default();
        let mut point = TrustPoint::new("example.", "/nonexistent/example.key", &config);
        point.last_queried = 1_700_000_000;
        point.last_success = 1_699_990_000;
        point.next_probe_time = 1_700_003_600;
        point.query_failed = 1;
        point.query_interval = 43200;
        point.retry_time = 3600;

        let mut valid = KeyRecord::trusted(Dnskey::new("example.", 3600, 257, 15, vec![1; 32]), 1_600_000_000);
        valid.fetched = true;
        let mut pending = KeyRecord::new(Dnskey::new("example.", 3600, 257, 15, vec![2; 32]), 1_690_000_000);
        pending.state = KeyState::AddPend;
        pending.pending_count = 1;
        let mut revoked = KeyRecord::new(
            Dnskey::new("example.", 3600, 257, 15, vec![3; 32]).with_revoke_bit(),
            1_680_000_000,
        );
        revoked.state = KeyState::Revoked;
        revoked.revoked = true;

        point.keys = vec![valid, pending, revoked];
        point
    }

    #[test]
    fn test_render_then_parse_is_identity() {
        let point = sample_point();
        let text = render_point(&point);
        let parsed = parse_point(&text, point.file(), &AutotrustConfig::default()).unwrap();
        assert_eq!(parsed, point);
    }

    #[test]
    fn test_render_layout() {
        let text = render_point(&sample_point());
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some(HEADER));
        assert_eq!(lines.next(), Some(";;id: example. 1"));
        assert!(text.contains(";;state=1 [ ADDPEND ] ;;count=1"));
        assert!(text.contains(";;revoked=1"));
        assert!(text.trim_end().ends_with(";;end: 3"));
    }

    #[test]
    fn test_unknown_directives_are_skipped() {
        let point = sample_point();
        let text = render_point(&point).replace(
            ";;query_failed: 1",
            ";;query_failed: 1\n;;future_field: 42\n;; Saved by a newer release: yes",
        );
        let parsed = parse_point(&text, point.file(), &AutotrustConfig::default()).unwrap();
        assert_eq!(parsed, point);
    }

    #[test]
    fn test_truncation_is_detected_at_every_line() {
        let point = sample_point();
        let text = render_point(&point);
        let lines: Vec<&str> = text.lines().collect();

        for cut in 0..lines.len() - 1 {
            let partial = lines[..=cut].join("\n");
            assert!(
                parse_point(&partial, point.file(), &AutotrustConfig::default()).is_err(),
                "accepted file cut after line {}",
                cut + 1
            );
        }
    }

    #[test]
    fn test_truncation_inside_key_line() {
        let point = sample_point();
        let text = render_point(&point);
        let cut = text.find(";;fetched=").unwrap();
        assert!(parse_point(&text[..cut], point.file(), &AutotrustConfig::default()).is_err());
    }

    #[test]
    fn test_rejects_bad_state_and_foreign_keys() {
        let point = sample_point();
        let config = AutotrustConfig::default();
        let text = render_point(&point);

        let bad_state = text.replace(";;state=2 [ VALID ]", ";;state=9 [ VALID ]");
        assert!(parse_point(&bad_state, point.file(), &config).is_err());

        let foreign = text.replacen("example.\t3600\tIN\tDNSKEY", "other.\t3600\tIN\tDNSKEY", 1);
        assert!(parse_point(&foreign, point.file(), &config).is_err());

        let no_id = text.replace(";;id: example. 1\n", "");
        assert!(parse_point(&no_id, point.file(), &config).is_err());
    }

    #[test]
    fn test_repeated_directives_are_rejected() {
        let point = sample_point();
        let config = AutotrustConfig::default();
        let text = render_point(&point);

        for extra in [
            ";;next_probe_time: 1",
            ";;query_failed: 200",
            ";;last_success: 5",
            ";;retry_time: 60",
            ";;id: example. 1",
        ] {
            let doubled = text.replace(";;query_interval:", &format!("{}\n;;query_interval:", extra));
            assert!(
                matches!(parse_point(&doubled, point.file(), &config), Err(AutotrustError::Parse { .. })),
                "accepted second {}",
                extra
            );
        }

        let two_trailers = format!("{};;end: 3\n", text);
        assert!(parse_point(&two_trailers, point.file(), &config).is_err());
    }

    #[test]
    fn test_repeated_key_annotations_are_rejected() {
        let point = sample_point();
        let config = AutotrustConfig::default();
        let text = render_point(&point);

        for (from, to) in [
            (";;count=1", ";;count=1 ;;count=9"),
            (";;lastchange=1690000000", ";;lastchange=1690000000 ;;lastchange=1"),
            (";;revoked=1", ";;revoked=1 ;;revoked=0"),
            (";;state=1 [ ADDPEND ]", ";;state=1 [ ADDPEND ] ;;state=4 [ REVOKED ]"),
        ] {
            let doubled = text.replacen(from, to, 1);
            assert_ne!(doubled, text);
            assert!(parse_point(&doubled, point.file(), &config).is_err(), "accepted {}", to);
        }
    }

    #[test]
    fn test_state_token_must_match_number() {
        let point = sample_point();
        let config = AutotrustConfig::default();
        let text = render_point(&point);

        let mismatched = text.replace(";;state=2 [ VALID ]", ";;state=2 [ REVOKED ]");
        assert!(matches!(
            parse_point(&mismatched, point.file(), &config),
            Err(AutotrustError::Parse { .. })
        ));

        let bogus_token = text.replace(";;state=2 [ VALID ]", ";;state=2 [ TRUSTED ]");
        assert!(parse_point(&bogus_token, point.file(), &config).is_err());

        // The token is informational and may be left out
        let bare = text.replace(";;state=2 [ VALID ]", ";;state=2");
        let parsed = parse_point(&bare, point.file(), &config).unwrap();
        assert_eq!(parsed.keys[0].state, KeyState::Valid);
    }

    #[test]
    fn test_older_files_without_flags_default_to_zero() {
        let point = sample_point();
        let text = render_point(&point)
            .replace(" ;;fetched=1", "")
            .replace(" ;;fetched=0", "")
            .replace(" ;;revoked=1", "")
            .replace(" ;;revoked=0", "");
        let parsed = parse_point(&text, point.file(), &AutotrustConfig::default()).unwrap();
        assert!(parsed.keys.iter().all(|k| !k.fetched && !k.revoked));
        assert_eq!(parsed.keys[2].state, KeyState::Revoked);
    }

    #[test]
    fn test_missing_file_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.key");
        assert!(read_point(&path, &AutotrustConfig::default()).unwrap().is_none());
    }

    #[test]
    fn test_write_replaces_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let mut point = sample_point();
        point.file = dir.path().join("example.key");

        write_point(&point).unwrap();
        point.query_failed = 0;
        write_point(&point).unwrap();

        let read = read_point(&point.file, &AutotrustConfig::default()).unwrap().unwrap();
        assert_eq!(read, point);

        // No temporary files are left behind
        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_write_failure_reports_error() {
        let mut point = sample_point();
        point.file = PathBuf::from("/nonexistent-dir/for/anchors/example.key");
        assert!(matches!(write_point(&point), Err(AutotrustError::Io { .. })));
    }
}
