//! IPTC-IIM fields from the Photoshop resource block of a JPEG's APP13 segment.

use crate::metadata::IptcInfo;

const PHOTOSHOP_SIGNATURE: &[u8] = b"Photoshop 3.0\0";
const IPTC_RESOURCE_ID: u16 = 0x0404;

/// Best effort: anything that is not a well formed JPEG with an IPTC block
/// yields empty fields.
pub fn read_iptc(data: &[u8]) -> IptcInfo {
    let mut info = IptcInfo::default();
    let Some(block) = find_app13(data).and_then(find_iptc_resource) else {
        return info;
    };

    let mut keywords = Vec::new();
    for (dataset, value) in iim_records(block) {
        let text = decode_text(value);
        match dataset {
            5 => info.title = Some(text),
            25 => keywords.push(text),
            80 => info.author = Some(text),
            90 => info.city = Some(text),
            92 => info.location = Some(text),
            116 => info.copyright = Some(text),
            120 => info.description = Some(text),
            _ => {}
        }
    }
    if !keywords.is_empty() {
        info.keywords = Some(keywords.join(", "));
    }
    info
}

/// Walks the JPEG marker segments up to start-of-scan.
fn find_app13(data: &[u8]) -> Option<&[u8]> {
    if data.len() < 4 || data[..2] != [0xFF, 0xD8] {
        return None;
    }

    let mut offset = 2;
    while offset + 4 <= data.len() {
        if data[offset] != 0xFF {
            return None;
        }
        let marker = data[offset + 1];
        match marker {
            // fill bytes and standalone markers
            0xFF => {
                offset += 1;
                continue;
            }
            0x01 | 0xD0..=0xD7 => {
                offset += 2;
                continue;
            }
            0xD9 | 0xDA => return None,
            _ => {}
        }

        let len = u16::from_be_bytes([data[offset + 2], data[offset + 3]]) as usize;
        if len < 2 || offset + 2 + len > data.len() {
            return None;
        }
        let payload = &data[offset + 4..offset + 2 + len];
        if marker == 0xED && payload.starts_with(PHOTOSHOP_SIGNATURE) {
            return Some(&payload[PHOTOSHOP_SIGNATURE.len()..]);
        }
        offset += 2 + len;
    }
    None
}

/// Finds the IPTC-NAA resource among the `8BIM` image resource blocks.
fn find_iptc_resource(mut irb: &[u8]) -> Option<&[u8]> {
    while irb.len() >= 12 && &irb[..4] == b"8BIM" {
        let id = u16::from_be_bytes([irb[4], irb[5]]);
        // pascal string name, padded so length byte plus name is even
        let name_len = irb[6] as usize;
        let name_total = (1 + name_len + 1) & !1;
        let size_at = 6 + name_total;
        if size_at + 4 > irb.len() {
            return None;
        }
        let size = u32::from_be_bytes([irb[size_at], irb[size_at + 1], irb[size_at + 2], irb[size_at + 3]]) as usize;
        let data_at = size_at + 4;
        if data_at + size > irb.len() {
            return None;
        }
        if id == IPTC_RESOURCE_ID {
            return Some(&irb[data_at..data_at + size]);
        }
        let padded = (size + 1) & !1;
        irb = irb.get(data_at + padded..)?;
    }
    None
}

/// Yields `(dataset, value)` for every record 2 dataset.
fn iim_records(block: &[u8]) -> Vec<(u8, &[u8])> {
    let mut records = Vec::new();
    let mut offset = 0;
    while offset + 5 <= block.len() && block[offset] == 0x1C {
        let record = block[offset + 1];
        let dataset = block[offset + 2];
        let len = u16::from_be_bytes([block[offset + 3], block[offset + 4]]) as usize;
        // extended length datasets never carry the text fields read here
        if len & 0x8000 != 0 {
            break;
        }
        let start = offset + 5;
        if start + len > block.len() {
            break;
        }
        if record == 2 {
            records.push((dataset, &block[start..start + len]));
        }
        offset = start + len;
    }
    records
}

fn decode_text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .trim_end_matches('\0')
        .trim()
        .to_string()
}
