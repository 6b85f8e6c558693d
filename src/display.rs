use chrono::{DateTime, FixedOffset, Local, NaiveDateTime, TimeZone};
use std::fmt::Display;

const DISPLAY_FORMAT: &str = "%b %d, %Y at %I:%M %p";
const EXIF_FORMAT: &str = "%Y:%m:%d %H:%M:%S";

/// Which clock a timestamp is rendered in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Zone {
    /// Keep the wall time the timestamp was recorded with.
    AsRecorded,
    /// Convert to the server's local timezone and append its UTC offset.
    Local,
}

/// Renders ISO 8601 and EXIF timestamps as `Feb 04, 2026 at 11:19 AM`.
///
/// Empty input or the literal `Unknown` yield `Unknown`. Anything that does not
/// parse is returned unchanged.
pub fn format_datetime_full(value: &str, zone: Zone) -> String {
    if value.is_empty() || value == "Unknown" {
        return "Unknown".to_string();
    }

    if value.contains('T') {
        if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
            return match zone {
                Zone::AsRecorded => dt.format(DISPLAY_FORMAT).to_string(),
                Zone::Local => format_in_zone(dt, &Local),
            };
        }
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f") {
            return naive.format(DISPLAY_FORMAT).to_string();
        }
        log::debug!("Unparseable ISO timestamp: {}", value);
        return value.to_string();
    }

    if value.contains(':') && value.contains(' ') {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, EXIF_FORMAT) {
            return naive.format(DISPLAY_FORMAT).to_string();
        }
        log::debug!("Unparseable EXIF timestamp: {}", value);
    }

    value.to_string()
}

/// Appends the numeric offset (`+05:30`). chrono's `Local` carries no zone
/// names, so abbreviations such as `IST` are never produced.
fn format_in_zone<Tz: TimeZone>(dt: DateTime<FixedOffset>, tz: &Tz) -> String
where
    Tz::Offset: Display,
{
    let converted = dt.with_timezone(tz);
    format!("{} {}", converted.format(DISPLAY_FORMAT), converted.format("%:z"))
}

/// `lightroom_classic/15.1.1` becomes `Lightroom Classic 15.1.1`.
pub fn format_claim_generator(generator: &str) -> String {
    if generator.is_empty() {
        return "Unknown".to_string();
    }
    if !generator.contains('/') {
        return generator.to_string();
    }

    let mut parts = generator.split('/');
    let software = title_case(&parts.next().unwrap_or_default().replace('_', " "));
    match parts.next() {
        Some(version) if !version.is_empty() => format!("{} {}", software, version),
        _ => software,
    }
}

/// Uppercases every letter that follows a non-letter and lowercases the rest.
fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut word_start = true;
    for c in s.chars() {
        if c.is_alphabetic() {
            if word_start {
                out.extend(c.to_uppercase());
            } else {
                out.extend(c.to_lowercase());
            }
            word_start = false;
        } else {
            out.push(c);
            word_start = true;
        }
    }
    out
}
