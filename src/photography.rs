use crate::display::{format_datetime_full, Zone};
use crate::metadata::{ExifFields, ExifValue, Photography};

const UNKNOWN: &str = "Unknown";

pub fn format_photography(exif: &ExifFields, color_profile: Option<&str>) -> Photography {
    let text = |name: &str| exif.text(name).unwrap_or(UNKNOWN).to_string();

    Photography {
        camera_make: text("Make"),
        camera_model: text("Model"),
        lens_model: text("LensModel"),
        aperture: exif.number("FNumber").map(format_aperture).unwrap_or_else(|| UNKNOWN.into()),
        shutter_speed: exif
            .number("ExposureTime")
            .map(format_shutter_speed)
            .unwrap_or_else(|| UNKNOWN.into()),
        iso: exif.get("ISOSpeedRatings").and_then(format_iso).unwrap_or_else(|| UNKNOWN.into()),
        focal_length: exif
            .number("FocalLength")
            .map(format_focal_length)
            .unwrap_or_else(|| UNKNOWN.into()),
        date_original: format_datetime_full(exif.text("DateTimeOriginal").unwrap_or(UNKNOWN), Zone::AsRecorded),
        date_digitized: format_datetime_full(exif.text("DateTimeDigitized").unwrap_or(UNKNOWN), Zone::AsRecorded),
        artist: text("Artist"),
        description: exif
            .text("ImageDescription")
            .unwrap_or("No description available")
            .to_string(),
        color_space: format_color_space(exif.number("ColorSpace")).to_string(),
        color_profile: color_profile.unwrap_or(UNKNOWN).to_string(),
    }
}

pub fn format_aperture(f_number: f64) -> String {
    format!("f/{:.1}", f_number)
}

/// Fractions below one second, fixed point from one second up.
pub fn format_shutter_speed(exposure: f64) -> String {
    if exposure <= 0.0 || !exposure.is_finite() {
        UNKNOWN.to_string()
    } else if exposure < 1.0 {
        format!("1/{}s", (1.0 / exposure).round() as u64)
    } else {
        format!("{:.2}s", exposure)
    }
}

pub fn format_focal_length(mm: f64) -> String {
    let fixed = format!("{:.2}", mm);
    let trimmed = fixed.trim_end_matches('0').trim_end_matches('.');
    format!("{}mm", trimmed)
}

fn format_iso(value: &ExifValue) -> Option<String> {
    match value {
        ExifValue::Integer(i) => Some(i.to_string()),
        ExifValue::Float(f) if f.is_finite() => Some((*f as i64).to_string()),
        ExifValue::List(values) => values.first().and_then(format_iso),
        ExifValue::Text(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

pub fn format_color_space(value: Option<f64>) -> &'static str {
    match value.map(|v| v as i64) {
        Some(1) => "sRGB",
        Some(65535) => "Uncalibrated",
        _ => UNKNOWN,
    }
}
