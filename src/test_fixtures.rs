//! Images built in memory for tests.

use exif::experimental::Writer;
use exif::{Field, In, Rational, Tag, Value};
use image::{DynamicImage, ImageFormat};
use serde_json::json;
use std::io::Cursor;

/// ES256 signer issued by a throwaway test CA (`O=C2PA Viewer Tests`).
const SIGNING_CHAIN: &[u8] = include_bytes!("../fixtures/es256_chain.pem");
const SIGNING_KEY: &[u8] = include_bytes!("../fixtures/es256_private.pem");
pub const SIGNING_ORG: &str = "C2PA Viewer Tests";

fn encode(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
    let image = DynamicImage::new_rgb8(width, height);
    let mut out = Cursor::new(Vec::new());
    image.write_to(&mut out, format).unwrap();
    out.into_inner()
}

pub fn jpeg(width: u32, height: u32) -> Vec<u8> {
    encode(width, height, ImageFormat::Jpeg)
}

pub fn png(width: u32, height: u32) -> Vec<u8> {
    encode(width, height, ImageFormat::Png)
}

fn ascii(tag: Tag, text: &str) -> Field {
    Field {
        tag,
        ifd_num: In::PRIMARY,
        value: Value::Ascii(vec![text.as_bytes().to_vec()]),
    }
}

fn rationals(tag: Tag, parts: &[(u32, u32)]) -> Field {
    Field {
        tag,
        ifd_num: In::PRIMARY,
        value: Value::Rational(parts.iter().map(|&(num, denom)| Rational { num, denom }).collect()),
    }
}

/// A JPEG carrying camera settings and a GPS position of 40°26'46"N 79°58'56"W.
pub fn jpeg_with_exif(width: u32, height: u32) -> Vec<u8> {
    let fields = vec![
        ascii(Tag::Make, "Canon"),
        ascii(Tag::Model, "EOS R5"),
        rationals(Tag::FNumber, &[(28, 10)]),
        rationals(Tag::ExposureTime, &[(1, 2000)]),
        Field {
            tag: Tag::PhotographicSensitivity,
            ifd_num: In::PRIMARY,
            value: Value::Short(vec![400]),
        },
        ascii(Tag::GPSLatitudeRef, "N"),
        rationals(Tag::GPSLatitude, &[(40, 1), (26, 1), (46, 1)]),
        ascii(Tag::GPSLongitudeRef, "W"),
        rationals(Tag::GPSLongitude, &[(79, 1), (58, 1), (56, 1)]),
    ];

    let mut writer = Writer::new();
    for field in &fields {
        writer.push_field(field);
    }
    let mut tiff = Cursor::new(Vec::new());
    writer.write(&mut tiff, false).unwrap();
    let tiff = tiff.into_inner();

    insert_segment(&jpeg(width, height), 0xE1, &[b"Exif\0\0".as_slice(), tiff.as_slice()].concat())
}

/// Places a marker segment right after SOI.
pub fn insert_segment(jpeg: &[u8], marker: u8, payload: &[u8]) -> Vec<u8> {
    let mut out = vec![0xFF, 0xD8, 0xFF, marker];
    out.extend_from_slice(&((payload.len() + 2) as u16).to_be_bytes());
    out.extend_from_slice(payload);
    out.extend_from_slice(&jpeg[2..]);
    out
}

/// A JPEG signed with a manifest carrying a CreativeWork by Jane Doe, one
/// `c2pa.created` action, a claim thumbnail and one parent ingredient with its
/// own thumbnail.
pub fn signed_jpeg() -> Vec<u8> {
    let definition = json!({
        "title": "signed.jpg",
        "format": "image/jpeg",
        "claim_generator_info": [{"name": "viewer_tests", "version": "0.1"}],
        "thumbnail": {"format": "image/jpeg", "identifier": "claim_thumbnail.jpg"},
        "ingredients": [{
            "title": "parent.jpg",
            "format": "image/jpeg",
            "instance_id": "xmp:iid:parent",
            "relationship": "parentOf",
            "thumbnail": {"format": "image/jpeg", "identifier": "ingredient_thumbnail.jpg"}
        }],
        "assertions": [
            {
                "label": "stds.schema-org.CreativeWork",
                "data": {
                    "@context": "https://schema.org",
                    "@type": "CreativeWork",
                    "author": [{"@type": "Person", "name": "Jane Doe"}]
                }
            },
            {
                "label": "c2pa.actions.v2",
                "data": {"actions": [{
                    "action": "c2pa.created",
                    "digitalSourceType": "http://cv.iptc.org/newscodes/digitalsourcetype/digitalCapture"
                }]}
            }
        ]
    });

    let mut builder = c2pa::Builder::from_json(&definition.to_string()).unwrap();
    builder
        .add_resource("claim_thumbnail.jpg", Cursor::new(jpeg(4, 4)))
        .unwrap()
        .add_resource("ingredient_thumbnail.jpg", Cursor::new(jpeg(2, 2)))
        .unwrap();

    let signer =
        c2pa::create_signer::from_keys(SIGNING_CHAIN, SIGNING_KEY, c2pa::SigningAlg::Es256, None).unwrap();
    let mut source = Cursor::new(jpeg(16, 16));
    let mut dest = Cursor::new(Vec::new());
    builder
        .sign(signer.as_ref(), "image/jpeg", &mut source, &mut dest)
        .unwrap();
    dest.into_inner()
}
