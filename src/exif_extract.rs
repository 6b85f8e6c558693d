use crate::icc;
use crate::iptc;
use crate::metadata::{bytes_to_mb, ExifFields, ExifValue, GpsInfo, ImageInfo, ImageReport, IptcInfo};
use crate::photography::format_photography;
use exif::{Exif, In, Reader, Tag, Value};
use image::{ImageDecoder, ImageFormat, ImageReader};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// EXIF tags surfaced in the `exif` object, with the names the viewer expects.
const EXIF_TAGS: &[(Tag, &str)] = &[
    (Tag::ImageDescription, "ImageDescription"),       // 270
    (Tag::Make, "Make"),                               // 271
    (Tag::Model, "Model"),                             // 272
    (Tag::XResolution, "XResolution"),                 // 282
    (Tag::YResolution, "YResolution"),                 // 283
    (Tag::Software, "Software"),                       // 305
    (Tag::DateTime, "DateTime"),                       // 306
    (Tag::Artist, "Artist"),                           // 315
    (Tag::Copyright, "Copyright"),                     // 33432
    (Tag::ExposureTime, "ExposureTime"),               // 33434
    (Tag::FNumber, "FNumber"),                         // 33437
    (Tag::PhotographicSensitivity, "ISOSpeedRatings"), // 34855
    (Tag::DateTimeOriginal, "DateTimeOriginal"),       // 36867
    (Tag::DateTimeDigitized, "DateTimeDigitized"),     // 36868
    (Tag::ApertureValue, "ApertureValue"),             // 37378
    (Tag::MeteringMode, "MeteringMode"),               // 37383
    (Tag::Flash, "Flash"),                             // 37385
    (Tag::FocalLength, "FocalLength"),                 // 37386
    (Tag::ColorSpace, "ColorSpace"),                   // 40961
    (Tag::SensingMethod, "SensingMethod"),             // 41495
    (Tag::ExposureMode, "ExposureMode"),               // 41986
    (Tag::WhiteBalance, "WhiteBalance"),               // 41987
    (Tag::LensModel, "LensModel"),                     // 42036
];

/// Everything read from the file itself, before display formatting.
#[derive(Debug, Clone, Default)]
pub struct ExtractedMetadata {
    pub info: ImageInfo,
    pub exif: ExifFields,
    pub gps: GpsInfo,
    pub iptc: IptcInfo,
}

impl ExtractedMetadata {
    pub fn into_report(self, display_name: &str) -> ImageReport {
        let photography = format_photography(&self.exif, self.info.color_profile.as_deref());
        ImageReport {
            filename: display_name.to_string(),
            format: self.info.format.unwrap_or_else(|| "JPEG".to_string()),
            width: self.info.width,
            height: self.info.height,
            file_size_bytes: self.info.file_size_bytes,
            file_size_mb: self.info.file_size_bytes.map(bytes_to_mb),
            photography,
            exif: self.exif,
            gps: self.gps,
            iptc: self.iptc,
            thumbnails: None,
            provenance: None,
            image_data: None,
        }
    }
}

/// Reads image info, EXIF, GPS and IPTC. Each part degrades to empty on failure.
pub fn extract_metadata(path: &Path) -> ExtractedMetadata {
    log::trace!("Extracting metadata for image: {:?}", path);

    let mut info = read_image_info(path);
    info.file_size_bytes = std::fs::metadata(path).map(|m| m.len()).ok();

    let exif = match read_exif(path) {
        Ok(exif) => Some(exif),
        Err(exif::Error::NotFound(_)) => {
            log::debug!("No EXIF data found for {:?}", path);
            None
        }
        Err(e) => {
            log::warn!("Could not read EXIF for {:?}: {}", path, e);
            None
        }
    };

    let (fields, gps) = match &exif {
        Some(exif) => (exif_fields(exif), gps_coordinates(exif)),
        None => (ExifFields::default(), GpsInfo::default()),
    };
    log::trace!("EXIF fields for {:?}: {:?}", path, fields);

    let iptc = match std::fs::read(path) {
        Ok(data) => iptc::read_iptc(&data),
        Err(e) => {
            log::warn!("Could not read {:?} for IPTC: {}", path, e);
            IptcInfo::default()
        }
    };

    ExtractedMetadata { info, exif: fields, gps, iptc }
}

fn read_exif(path: &Path) -> Result<Exif, exif::Error> {
    let file = File::open(path)?;
    let mut buf_reader = BufReader::new(file);
    Reader::new().read_from_container(&mut buf_reader)
}

fn read_image_info(path: &Path) -> ImageInfo {
    let mut info = ImageInfo::default();

    let reader = match ImageReader::open(path).and_then(|r| r.with_guessed_format()) {
        Ok(reader) => reader,
        Err(e) => {
            log::warn!("Could not open image {:?}: {}", path, e);
            return info;
        }
    };
    info.format = reader.format().map(format_name);

    let mut decoder = match reader.into_decoder() {
        Ok(decoder) => decoder,
        Err(e) => {
            log::warn!("Could not decode image header {:?}: {}", path, e);
            return info;
        }
    };
    let (width, height) = decoder.dimensions();
    log::debug!("Dimensions for {:?}: {}x{}", path, width, height);
    info.width = Some(width);
    info.height = Some(height);

    match decoder.icc_profile() {
        Ok(Some(profile)) => info.color_profile = icc::profile_description(&profile),
        Ok(None) => {}
        Err(e) => log::warn!("Could not read ICC profile for {:?}: {}", path, e),
    }
    info
}

pub fn format_name(format: ImageFormat) -> String {
    match format {
        ImageFormat::Jpeg => "JPEG".to_string(),
        ImageFormat::Png => "PNG".to_string(),
        ImageFormat::Gif => "GIF".to_string(),
        ImageFormat::WebP => "WEBP".to_string(),
        ImageFormat::Tiff => "TIFF".to_string(),
        other => format!("{:?}", other).to_uppercase(),
    }
}

fn exif_fields(exif: &Exif) -> ExifFields {
    let mut fields = ExifFields::default();
    for (tag, name) in EXIF_TAGS {
        if let Some(field) = exif.get_field(*tag, In::PRIMARY) {
            if let Some(value) = convert_value(&field.value) {
                fields.insert(name, value);
            }
        }
    }
    fields
}

/// Rationals become floats, single values unwrap, text is decoded leniently.
pub fn convert_value(value: &Value) -> Option<ExifValue> {
    match value {
        Value::Ascii(strings) => {
            let parts: Vec<String> = strings.iter().map(|s| decode_text(s)).collect();
            Some(ExifValue::Text(parts.join(" ")))
        }
        Value::Undefined(bytes, _) => Some(ExifValue::Text(decode_text(bytes))),
        Value::Byte(v) => collapse(v.iter().map(|&x| ExifValue::Integer(x as i64)).collect()),
        Value::Short(v) => collapse(v.iter().map(|&x| ExifValue::Integer(x as i64)).collect()),
        Value::Long(v) => collapse(v.iter().map(|&x| ExifValue::Integer(x as i64)).collect()),
        Value::SByte(v) => collapse(v.iter().map(|&x| ExifValue::Integer(x as i64)).collect()),
        Value::SShort(v) => collapse(v.iter().map(|&x| ExifValue::Integer(x as i64)).collect()),
        Value::SLong(v) => collapse(v.iter().map(|&x| ExifValue::Integer(x as i64)).collect()),
        Value::Rational(v) => collapse(
            v.iter()
                .filter(|r| r.denom != 0)
                .map(|r| ExifValue::Float(r.to_f64()))
                .collect(),
        ),
        Value::SRational(v) => collapse(
            v.iter()
                .filter(|r| r.denom != 0)
                .map(|r| ExifValue::Float(r.to_f64()))
                .collect(),
        ),
        Value::Float(v) => collapse(v.iter().map(|&x| ExifValue::Float(x as f64)).collect()),
        Value::Double(v) => collapse(v.iter().map(|&x| ExifValue::Float(x)).collect()),
        _ => None,
    }
}

fn collapse(mut values: Vec<ExifValue>) -> Option<ExifValue> {
    match values.len() {
        0 => None,
        1 => values.pop(),
        _ => Some(ExifValue::List(values)),
    }
}

fn decode_text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).trim_end_matches('\0').to_string()
}

fn gps_coordinates(exif: &Exif) -> GpsInfo {
    let latitude = gps_axis(exif, Tag::GPSLatitude, Tag::GPSLatitudeRef);
    let longitude = gps_axis(exif, Tag::GPSLongitude, Tag::GPSLongitudeRef);
    match (latitude, longitude) {
        (Some(lat), Some(lon)) => GpsInfo {
            latitude: Some(lat),
            longitude: Some(lon),
        },
        _ => GpsInfo::default(),
    }
}

fn gps_axis(exif: &Exif, value_tag: Tag, ref_tag: Tag) -> Option<f64> {
    let field = exif.get_field(value_tag, In::PRIMARY)?;
    let dms = match &field.value {
        Value::Rational(parts) if parts.len() >= 3 && parts.iter().all(|r| r.denom != 0) => {
            [parts[0].to_f64(), parts[1].to_f64(), parts[2].to_f64()]
        }
        _ => return None,
    };
    let reference = exif
        .get_field(ref_tag, In::PRIMARY)
        .and_then(|f| match &f.value {
            Value::Ascii(strings) => strings.first().map(|s| decode_text(s)),
            _ => None,
        });
    Some(dms_to_decimal(dms, reference.as_deref()))
}

/// Degrees/minutes/seconds to signed decimal degrees; `S` and `W` are negative.
pub fn dms_to_decimal(dms: [f64; 3], reference: Option<&str>) -> f64 {
    let value = dms[0] + dms[1] / 60.0 + dms[2] / 3600.0;
    match reference.map(str::trim) {
        Some("S") | Some("W") => -value,
        _ => value,
    }
}
