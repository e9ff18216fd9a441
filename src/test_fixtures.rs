//! Byte-level fixtures shared by unit and integration tests.
use std::io::Cursor;

pub type Rational = (u32, u32);

/// GPS IFD contents; `None` leaves the tag out.
pub struct GpsFields {
    pub lat_ref: Option<u8>,
    pub lat: Option<[Rational; 3]>,
    pub lng_ref: Option<u8>,
    pub lng: Option<[Rational; 3]>,
}

fn to_dms(value: f64) -> [Rational; 3] {
    let abs = value.abs();
    let degrees = abs.floor();
    let minutes_full = (abs - degrees) * 60.0;
    let minutes = minutes_full.floor();
    let seconds = (minutes_full - minutes) * 60.0;
    [
        (degrees as u32, 1),
        (minutes as u32, 1),
        ((seconds * 10_000.0).round() as u32, 10_000),
    ]
}

impl GpsFields {
    pub fn from_decimal(lat: f64, lng: f64) -> Self {
        GpsFields {
            lat_ref: Some(if lat < 0.0 { b'S' } else { b'N' }),
            lat: Some(to_dms(lat)),
            lng_ref: Some(if lng < 0.0 { b'W' } else { b'E' }),
            lng: Some(to_dms(lng)),
        }
    }
}

/// A JPEG whose only segment is an EXIF APP1 block with a GPS IFD.
///
/// TIFF layout (little-endian, offsets from the "II" header):
///   0-7:    header, IFD0 at 8
///   8-25:   IFD0 with one GPSInfo (0x8825) pointer to 26, next_ifd=0
///   26-..:  GPS IFD, then rational payloads
pub fn jpeg_with_gps_fields(fields: &GpsFields) -> Vec<u8> {
    const GPS_IFD: u32 = 26;

    let n = [
        fields.lat_ref.is_some(),
        fields.lat.is_some(),
        fields.lng_ref.is_some(),
        fields.lng.is_some(),
    ]
    .iter()
    .filter(|p| **p)
    .count() as u32;
    let data_start = GPS_IFD + 2 + 12 * n + 4;

    let mut tiff: Vec<u8> = Vec::new();
    tiff.extend_from_slice(b"II");
    tiff.extend_from_slice(&[0x2A, 0x00]);
    tiff.extend_from_slice(&8u32.to_le_bytes());

    tiff.extend_from_slice(&1u16.to_le_bytes());
    tiff.extend_from_slice(&0x8825u16.to_le_bytes());
    tiff.extend_from_slice(&4u16.to_le_bytes());
    tiff.extend_from_slice(&1u32.to_le_bytes());
    tiff.extend_from_slice(&GPS_IFD.to_le_bytes());
    tiff.extend_from_slice(&0u32.to_le_bytes());
    assert_eq!(tiff.len() as u32, GPS_IFD);

    let mut payload: Vec<u8> = Vec::new();
    tiff.extend_from_slice(&(n as u16).to_le_bytes());

    let ascii_entry = |tiff: &mut Vec<u8>, tag: u16, c: u8| {
        tiff.extend_from_slice(&tag.to_le_bytes());
        tiff.extend_from_slice(&2u16.to_le_bytes());
        tiff.extend_from_slice(&2u32.to_le_bytes());
        tiff.extend_from_slice(&[c, 0, 0, 0]);
    };
    let rational_entry = |tiff: &mut Vec<u8>, payload: &mut Vec<u8>, tag: u16, v: &[Rational; 3]| {
        let offset = data_start + payload.len() as u32;
        tiff.extend_from_slice(&tag.to_le_bytes());
        tiff.extend_from_slice(&5u16.to_le_bytes());
        tiff.extend_from_slice(&3u32.to_le_bytes());
        tiff.extend_from_slice(&offset.to_le_bytes());
        for (num, denom) in v {
            payload.extend_from_slice(&num.to_le_bytes());
            payload.extend_from_slice(&denom.to_le_bytes());
        }
    };

    if let Some(c) = fields.lat_ref {
        ascii_entry(&mut tiff, 0x0001, c);
    }
    if let Some(v) = &fields.lat {
        rational_entry(&mut tiff, &mut payload, 0x0002, v);
    }
    if let Some(c) = fields.lng_ref {
        ascii_entry(&mut tiff, 0x0003, c);
    }
    if let Some(v) = &fields.lng {
        rational_entry(&mut tiff, &mut payload, 0x0004, v);
    }
    tiff.extend_from_slice(&0u32.to_le_bytes());
    assert_eq!(tiff.len() as u32, data_start);
    tiff.extend_from_slice(&payload);

    let mut app1_data: Vec<u8> = b"Exif\x00\x00".to_vec();
    app1_data.extend_from_slice(&tiff);
    let app1_len = (app1_data.len() + 2) as u16;

    let mut jpeg: Vec<u8> = Vec::new();
    jpeg.extend_from_slice(&[0xFF, 0xD8]);
    jpeg.extend_from_slice(&[0xFF, 0xE1]);
    jpeg.extend_from_slice(&app1_len.to_be_bytes());
    jpeg.extend_from_slice(&app1_data);
    jpeg.extend_from_slice(&[0xFF, 0xD9]);
    jpeg
}

pub fn jpeg_with_gps(lat: f64, lng: f64) -> Vec<u8> {
    jpeg_with_gps_fields(&GpsFields::from_decimal(lat, lng))
}

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = image::DynamicImage::new_rgb8(width, height);
    let mut out = Vec::new();
    img.write_to(&mut Cursor::new(&mut out), image::ImageFormat::Png)
        .unwrap();
    out
}

/// Bytes that only pretend to be HEIC; conversion always goes through a fake.
pub fn fake_heic_bytes() -> Vec<u8> {
    let mut b = vec![0, 0, 0, 0x18];
    b.extend_from_slice(b"ftypheic");
    b.extend_from_slice(&[0; 12]);
    b
}
