//! Profile description (`desc` tag) of an embedded ICC color profile.

const HEADER_LEN: usize = 128;

fn be_u32(data: &[u8], at: usize) -> Option<u32> {
    let bytes = data.get(at..at + 4)?;
    Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

pub fn profile_description(profile: &[u8]) -> Option<String> {
    let tag_count = be_u32(profile, HEADER_LEN)? as usize;
    for i in 0..tag_count {
        let entry = HEADER_LEN + 4 + i * 12;
        if profile.get(entry..entry + 4)? != b"desc" {
            continue;
        }
        let offset = be_u32(profile, entry + 4)? as usize;
        let size = be_u32(profile, entry + 8)? as usize;
        let tag = profile.get(offset..offset.checked_add(size)?)?;
        return match tag.get(..4)? {
            b"desc" => text_description(tag),
            b"mluc" => multi_localized(tag),
            _ => None,
        };
    }
    None
}

/// ICC v2 `textDescriptionType`: ASCII count followed by NUL terminated ASCII.
fn text_description(tag: &[u8]) -> Option<String> {
    let count = be_u32(tag, 8)? as usize;
    let ascii = tag.get(12..12usize.checked_add(count)?)?;
    let text = String::from_utf8_lossy(ascii).trim_end_matches('\0').trim().to_string();
    (!text.is_empty()).then_some(text)
}

/// ICC v4 `multiLocalizedUnicodeType`, first record, UTF-16BE.
fn multi_localized(tag: &[u8]) -> Option<String> {
    if be_u32(tag, 8)? == 0 {
        return None;
    }
    let len = be_u32(tag, 20)? as usize;
    let offset = be_u32(tag, 24)? as usize;
    let raw = tag.get(offset..offset.checked_add(len)?)?;
    let units: Vec<u16> = raw
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect();
    let text = String::from_utf16_lossy(&units).trim_end_matches('\0').trim().to_string();
    (!text.is_empty()).then_some(text)
}
