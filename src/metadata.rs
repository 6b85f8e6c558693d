// src/metadata.rs

use crate::provenance::ProvenanceItem;
use serde::Serialize;
use std::collections::BTreeMap;

/// A single converted EXIF value as it appears in the `exif` JSON object.
#[derive(Debug, Serialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum ExifValue {
    Integer(i64),
    Float(f64),
    Text(String),
    List(Vec<ExifValue>),
}

impl ExifValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ExifValue::Integer(i) => Some(*i as f64),
            ExifValue::Float(f) => Some(*f),
            ExifValue::List(values) => values.first().and_then(ExifValue::as_f64),
            ExifValue::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ExifValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// Named EXIF fields, tag name to value.
#[derive(Debug, Serialize, Clone, Default, PartialEq)]
#[serde(transparent)]
pub struct ExifFields(pub BTreeMap<String, ExifValue>);

impl ExifFields {
    pub fn get(&self, name: &str) -> Option<&ExifValue> {
        self.0.get(name)
    }

    pub fn number(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(ExifValue::as_f64)
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(ExifValue::as_text)
    }

    pub fn insert(&mut self, name: &str, value: ExifValue) {
        self.0.insert(name.to_string(), value);
    }
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct Photography {
    pub camera_make: String,
    pub camera_model: String,
    pub lens_model: String,
    pub aperture: String,
    pub shutter_speed: String,
    pub iso: String,
    pub focal_length: String,
    pub date_original: String,
    pub date_digitized: String,
    pub artist: String,
    pub description: String,
    pub color_space: String,
    pub color_profile: String,
}

#[derive(Debug, Serialize, Clone, Copy, Default, PartialEq)]
pub struct GpsInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
}

#[derive(Debug, Serialize, Clone, Default, PartialEq)]
pub struct IptcInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keywords: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub copyright: Option<String>,
}

/// Base64 encoded C2PA thumbnails. Absent thumbnails are omitted.
#[derive(Debug, Serialize, Clone, Default, PartialEq)]
pub struct Thumbnails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claim_thumbnail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ingredient_thumbnail: Option<String>,
}

/// What the image decoder and the file system know about a file.
#[derive(Debug, Clone, Default)]
pub struct ImageInfo {
    pub format: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub file_size_bytes: Option<u64>,
    pub color_profile: Option<String>,
}

#[derive(Debug, Serialize, Clone)]
pub struct ImageReport {
    pub filename: String,
    pub format: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub file_size_bytes: Option<u64>,
    pub file_size_mb: Option<f64>,
    pub photography: Photography,
    pub exif: ExifFields,
    pub gps: GpsInfo,
    pub iptc: IptcInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnails: Option<Thumbnails>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provenance: Option<Vec<ProvenanceItem>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_data: Option<String>,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct MiniResponse {
    pub creator: Option<String>,
    pub issued_by: Option<String>,
    pub issued_on: Option<String>,
    pub status: String,
    pub more: String,
}

pub fn bytes_to_mb(bytes: u64) -> f64 {
    (bytes as f64 / (1024.0 * 1024.0) * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mb_is_rounded_to_two_places() {
        assert_eq!(bytes_to_mb(1024 * 1024), 1.0);
        assert_eq!(bytes_to_mb(1_500_000), 1.43);
        assert_eq!(bytes_to_mb(0), 0.0);
    }

    #[test]
    fn list_values_read_as_first_number() {
        let v = ExifValue::List(vec![ExifValue::Integer(200), ExifValue::Integer(400)]);
        assert_eq!(v.as_f64(), Some(200.0));
        assert_eq!(ExifValue::Text("abc".into()).as_f64(), None);
    }

    #[test]
    fn empty_gps_serializes_as_empty_object() {
        let json = serde_json::to_value(GpsInfo::default()).unwrap();
        assert_eq!(json, serde_json::json!({}));
    }
}
