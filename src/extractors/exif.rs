use img_parts::jpeg::Jpeg;
use img_parts::webp::WebP;
use img_parts::{Bytes, ImageEXIF};
use nom_exif::*;
use serde_json::Value;
use std::io::Cursor;

use super::{ContainerFormat, DecodedImage};
use crate::data::{Generator, MetadataMap};
use crate::error::{Error, Result};

const EXIF_PREFIX: &[u8] = b"Exif\0\0";
const CHARSET_LEN: usize = 8;
/// nom-exif needs a few hundred bytes to recognise a bare TIFF stream.
const MIN_TIFF_LEN: usize = 4096;

/// The EXIF `UserComment`, as `{"parameters": comment}`.
///
/// Only the AUTOMATIC1111 and Fooocus grammars read their data from this tag.
pub fn user_comment(image: &DecodedImage, generator: Generator) -> Result<Option<MetadataMap>> {
    if !matches!(generator, Generator::Automatic1111 | Generator::Fooocus) {
        return Ok(None);
    }

    let Some(tiff) = exif_block(image)? else {
        return Ok(None);
    };

    let mut parser = MediaParser::new();
    let ms = MediaSource::seekable(Cursor::new(padded(tiff)))
        .map_err(|e| Error::metadata(format!("unable to open EXIF data: {e}")))?;
    let iter: ExifIter = parser
        .parse(ms)
        .map_err(|e| Error::metadata(format!("corrupt EXIF data: {e}")))?;
    let exif: Exif = iter.into();

    let Some(comment) = exif.get(ExifTag::UserComment).and_then(entry_to_string) else {
        return Ok(None);
    };

    let mut bag = MetadataMap::new();
    bag.insert("parameters".into(), Value::String(comment));
    Ok(Some(bag))
}

/// The raw TIFF data of the JPEG `APP1` segment or the WebP `EXIF` chunk.
fn exif_block(image: &DecodedImage) -> Result<Option<Bytes>> {
    let data = match image.format() {
        Some(ContainerFormat::Jpeg) => Jpeg::from_bytes(image.shared_bytes())
            .map_err(|e| Error::metadata(format!("unable to read JPEG segments: {e}")))?
            .exif(),
        Some(ContainerFormat::WebP) => WebP::from_bytes(image.shared_bytes())
            .map_err(|e| Error::metadata(format!("unable to read WebP chunks: {e}")))?
            .exif(),
        _ => None,
    };
    Ok(data.map(|data| {
        if data.starts_with(EXIF_PREFIX) {
            data.slice(EXIF_PREFIX.len()..)
        } else {
            data
        }
    }))
}

fn padded(tiff: Bytes) -> Bytes {
    if tiff.len() >= MIN_TIFF_LEN {
        return tiff;
    }
    let mut buf = tiff.to_vec();
    buf.resize(MIN_TIFF_LEN, 0);
    Bytes::from(buf)
}

fn entry_to_string(val: &EntryValue) -> Option<String> {
    let s = match val {
        EntryValue::Undefined(bytes) => decode_user_comment(bytes),
        other => other.to_string(),
    };
    let s = s.trim_matches(|c: char| c == '\0' || c.is_whitespace());
    if s.is_empty() { None } else { Some(s.to_string()) }
}

/// Decode a `UserComment` honoring its 8 byte character code prefix.
fn decode_user_comment(bytes: &[u8]) -> String {
    if bytes.len() < CHARSET_LEN {
        return String::from_utf8_lossy(bytes).into_owned();
    }
    let (charset, body) = bytes.split_at(CHARSET_LEN);
    match charset {
        b"UNICODE\0" => decode_utf16(body),
        b"ASCII\0\0\0" | b"JIS\0\0\0\0\0" | [0, 0, 0, 0, 0, 0, 0, 0] => {
            String::from_utf8_lossy(body).into_owned()
        }
        _ => String::from_utf8_lossy(bytes).into_owned(),
    }
}

/// UTF-16 with a byte order mark, or endianness guessed from where the zero
/// bytes of ASCII range characters fall.
fn decode_utf16(body: &[u8]) -> String {
    let (big_endian, body) = match body {
        [0xFE, 0xFF, rest @ ..] => (true, rest),
        [0xFF, 0xFE, rest @ ..] => (false, rest),
        _ => {
            let zeros_at = |offset: usize| body.iter().skip(offset).step_by(2).filter(|b| **b == 0).count();
            (zeros_at(0) >= zeros_at(1), body)
        }
    };
    let units: Vec<u16> = body
        .chunks_exact(2)
        .map(|pair| {
            let pair = [pair[0], pair[1]];
            if big_endian { u16::from_be_bytes(pair) } else { u16::from_le_bytes(pair) }
        })
        .collect();
    String::from_utf16_lossy(&units)
}
