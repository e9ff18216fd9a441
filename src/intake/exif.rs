use crate::media::model::{GpsCoordinate, MediaFile};
use std::io::Cursor;

/// Hemisphere references that make a coordinate negative.
const NEGATIVE_REFS: &[char] = &['S', 'W'];

/// Convert a degrees/minutes/seconds triplet to decimal degrees.
/// `S` and `W` references negate the result.
pub fn dms_to_decimal(degrees: f64, minutes: f64, seconds: f64, reference: char) -> f64 {
    let magnitude = degrees + minutes / 60.0 + seconds / 3600.0;
    if NEGATIVE_REFS.contains(&reference.to_ascii_uppercase()) {
        -magnitude
    } else {
        magnitude
    }
}

/// Read the file and extract its EXIF GPS position.
/// Never fails; any read, parse or range problem yields None.
pub async fn extract_gps(file: &MediaFile) -> Option<GpsCoordinate> {
    let bytes = match file.read().await {
        Ok(b) => b,
        Err(e) => {
            tracing::debug!("gps: cannot read {:?}: {}", file.name, e);
            return None;
        }
    };
    let gps = parse_gps(&bytes);
    if gps.is_none() {
        tracing::debug!("gps: no usable position in {:?}", file.name);
    }
    gps
}

/// Parse a GPS position out of an in-memory image container.
/// Never panics; returns None on any error.
pub fn parse_gps(bytes: &[u8]) -> Option<GpsCoordinate> {
    match std::panic::catch_unwind(|| parse_gps_inner(bytes)) {
        Ok(gps) => gps,
        Err(_) => {
            tracing::warn!("panic in parse_gps ({} bytes)", bytes.len());
            None
        }
    }
}

fn parse_gps_inner(bytes: &[u8]) -> Option<GpsCoordinate> {
    let mut cursor = Cursor::new(bytes);
    let exif = match exif::Reader::new().read_from_container(&mut cursor) {
        Ok(e) => e,
        Err(e) => {
            tracing::debug!("gps: no EXIF: {}", e);
            return None;
        }
    };

    let lat = read_dms(&exif, exif::Tag::GPSLatitude)?;
    let lat_ref = read_ref(&exif, exif::Tag::GPSLatitudeRef)?;
    let lng = read_dms(&exif, exif::Tag::GPSLongitude)?;
    let lng_ref = read_ref(&exif, exif::Tag::GPSLongitudeRef)?;

    let latitude = dms_to_decimal(lat[0], lat[1], lat[2], lat_ref);
    let longitude = dms_to_decimal(lng[0], lng[1], lng[2], lng_ref);
    let gps = GpsCoordinate::new(latitude, longitude);
    if gps.is_none() {
        tracing::debug!("gps: out of range ({}, {})", latitude, longitude);
    }
    gps
}

fn read_dms(exif: &exif::Exif, tag: exif::Tag) -> Option<[f64; 3]> {
    let field = exif.get_field(tag, exif::In::PRIMARY)?;
    match &field.value {
        exif::Value::Rational(v) if v.len() >= 3 => {
            Some([v[0].to_f64(), v[1].to_f64(), v[2].to_f64()])
        }
        _ => None,
    }
}

fn read_ref(exif: &exif::Exif, tag: exif::Tag) -> Option<char> {
    let field = exif.get_field(tag, exif::In::PRIMARY)?;
    match &field.value {
        exif::Value::Ascii(vecs) => vecs
            .first()
            .and_then(|v| v.first())
            .map(|b| (*b as char).to_ascii_uppercase())
            .filter(|c| c.is_ascii_alphabetic()),
        _ => None,
    }
}
