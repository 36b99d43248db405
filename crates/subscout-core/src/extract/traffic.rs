//! Best-effort traffic metadata from response headers and body text.

use chrono::{DateTime, NaiveDate};
use regex::Regex;
use std::sync::OnceLock;
use subscout_types::TrafficInfo;

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

#[derive(Debug, Clone, Copy)]
enum Field {
    Total,
    Used,
    Remaining,
}

static AMOUNT_PATTERNS: OnceLock<Vec<(Regex, Field)>> = OnceLock::new();
static EXPIRY_REGEX: OnceLock<Regex> = OnceLock::new();

fn amount_patterns() -> &'static [(Regex, Field)] {
    AMOUNT_PATTERNS.get_or_init(|| {
        [
            (r"总(?:流量|量)\s*[:：]\s*([0-9.]+)\s*(TB|GB|MB)?", Field::Total),
            (r"剩余(?:流量)?\s*[:：]\s*([0-9.]+)\s*(TB|GB|MB)?", Field::Remaining),
            (r"已用(?:流量)?\s*[:：]\s*([0-9.]+)\s*(TB|GB|MB)?", Field::Used),
            (r"\btotal\s*:?\s*([0-9.]+)\s*(TB|GB|MB)?", Field::Total),
            (r"\bremaining\s*:?\s*([0-9.]+)\s*(TB|GB|MB)?", Field::Remaining),
            (r"\bused\s*:?\s*([0-9.]+)\s*(TB|GB|MB)?", Field::Used),
        ]
        .into_iter()
        .map(|(pattern, field)| {
            (Regex::new(&format!("(?i){pattern}")).expect("Traffic regex is valid"), field)
        })
        .collect()
    })
}

fn expiry_regex() -> &'static Regex {
    EXPIRY_REGEX.get_or_init(|| {
        Regex::new(
            r"(?i)(?:到期(?:时间)?|过期时间|expire[sd]?(?:\s*date)?)\s*[:：]?\s*(\d{4})[-/.](\d{1,2})[-/.](\d{1,2})",
        )
        .expect("Expiry regex is valid")
    })
}

fn to_gb(value: f64, unit: &str) -> f64 {
    let gb = match unit.to_ascii_uppercase().as_str() {
        "TB" => value * 1024.0,
        "MB" => value / 1024.0,
        _ => value,
    };
    (gb * 100.0).round() / 100.0
}

fn set(info: &mut TrafficInfo, field: Field, value: f64) {
    let slot = match field {
        Field::Total => &mut info.total_gb,
        Field::Used => &mut info.used_gb,
        Field::Remaining => &mut info.remaining_gb,
    };
    if slot.is_none() {
        *slot = Some(value);
    }
}

/// Parse a `subscription-userinfo` header
/// (`upload=…; download=…; total=…; expire=…`, byte counts and epoch seconds).
pub fn from_userinfo_header(header: &str) -> TrafficInfo {
    let mut info = TrafficInfo::default();
    let mut upload = None;
    let mut download = None;
    for pair in header.split(';') {
        let Some((key, value)) = pair.split_once('=') else { continue };
        let Ok(value) = value.trim().parse::<f64>() else { continue };
        match key.trim().to_ascii_lowercase().as_str() {
            "upload" => upload = Some(value),
            "download" => download = Some(value),
            "total" => info.total_gb = Some(to_gb(value / BYTES_PER_GB, "GB")),
            "expire" if value > 0.0 => {
                info.expire_date =
                    DateTime::from_timestamp(value as i64, 0).map(|t| t.date_naive());
            }
            _ => {}
        }
    }
    if upload.is_some() || download.is_some() {
        let used = upload.unwrap_or(0.0) + download.unwrap_or(0.0);
        info.used_gb = Some(to_gb(used / BYTES_PER_GB, "GB"));
    }
    info
}

/// Scan free text (body or node names) for traffic amounts and an expiry date.
pub fn scan_text(text: &str) -> TrafficInfo {
    let mut info = TrafficInfo::default();
    for (regex, field) in amount_patterns() {
        let Some(caps) = regex.captures(text) else { continue };
        let Ok(value) = caps[1].parse::<f64>() else { continue };
        let unit = caps.get(2).map_or("GB", |m| m.as_str());
        set(&mut info, *field, to_gb(value, unit));
    }
    if let Some(caps) = expiry_regex().captures(text) {
        let (y, m, d) = (caps[1].parse().ok(), caps[2].parse().ok(), caps[3].parse().ok());
        if let (Some(y), Some(m), Some(d)) = (y, m, d) {
            info.expire_date = NaiveDate::from_ymd_opt(y, m, d);
        }
    }
    info
}

/// Fill gaps in `primary` from `fallback`, then derive the missing amount.
pub fn combine(mut primary: TrafficInfo, fallback: TrafficInfo) -> TrafficInfo {
    primary.total_gb = primary.total_gb.or(fallback.total_gb);
    primary.used_gb = primary.used_gb.or(fallback.used_gb);
    primary.remaining_gb = primary.remaining_gb.or(fallback.remaining_gb);
    primary.expire_date = primary.expire_date.or(fallback.expire_date);
    primary.fill_missing();
    primary
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_userinfo_header() {
        let info = from_userinfo_header(
            "upload=1073741824; download=2147483648; total=10737418240; expire=1700000000",
        );
        assert_eq!(info.used_gb, Some(3.0));
        assert_eq!(info.total_gb, Some(10.0));
        assert_eq!(info.expire_date, NaiveDate::from_ymd_opt(2023, 11, 14));
    }

    #[test]
    fn test_scan_chinese_and_english() {
        let info = scan_text("剩余流量：512 MB\n总流量:2TB\n到期时间: 2026-01-31");
        assert_eq!(info.remaining_gb, Some(0.5));
        assert_eq!(info.total_gb, Some(2048.0));
        assert_eq!(info.expire_date, NaiveDate::from_ymd_opt(2026, 1, 31));

        let info = scan_text("Used: 12.5 GB / Total: 100GB, Expire date: 2026/3/1");
        assert_eq!(info.used_gb, Some(12.5));
        assert_eq!(info.total_gb, Some(100.0));
        assert_eq!(info.expire_date, NaiveDate::from_ymd_opt(2026, 3, 1));
    }

    #[test]
    fn test_combine_derives_missing() {
        let header = TrafficInfo { total_gb: Some(100.0), ..Default::default() };
        let body = TrafficInfo { used_gb: Some(40.0), total_gb: Some(1.0), ..Default::default() };
        let merged = combine(header, body);
        assert_eq!(merged.total_gb, Some(100.0));
        assert_eq!(merged.remaining_gb, Some(60.0));
        assert!(scan_text("nothing here").is_empty());
    }
}
