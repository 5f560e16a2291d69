use img_parts::png::Png;
use serde_json::{Value, json};

use super::DecodedImage;
use crate::data::{Generator, MetadataMap};
use crate::error::{Error, Result};

const TEXT: [u8; 4] = *b"tEXt";
const COMPRESSED_TEXT: [u8; 4] = *b"zTXt";
const INTERNATIONAL_TEXT: [u8; 4] = *b"iTXt";
const PHYSICAL_DIMENSIONS: [u8; 4] = *b"pHYs";
const INCHES_PER_METRE: f64 = 0.0254;

fn chunks(image: &DecodedImage) -> Result<Png> {
    Png::from_bytes(image.shared_bytes())
        .map_err(|e| Error::metadata(format!("unable to read PNG chunks: {e}")))
}

/// Width, height and (when a `pHYs` chunk is present) resolution in DPI.
pub fn image_info(image: &DecodedImage, _generator: Generator) -> Result<Option<MetadataMap>> {
    let (width, height) = image
        .dimensions()
        .map_err(|e| Error::metadata(format!("unable to read image dimensions: {e}")))?;

    let mut info = MetadataMap::new();
    info.insert("width".into(), json!(width));
    info.insert("height".into(), json!(height));
    if let Some((x, y)) = chunks(image).ok().as_ref().and_then(dpi) {
        info.insert("dpi".into(), json!([x, y]));
    }
    Ok(Some(info))
}

fn dpi(png: &Png) -> Option<(u32, u32)> {
    let chunk = png.chunk_by_type(PHYSICAL_DIMENSIONS)?;
    let data = chunk.contents();
    if data.len() < 9 || data[8] != 1 {
        return None;
    }
    let x = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
    let y = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
    let to_dpi = |ppm: u32| (f64::from(ppm) * INCHES_PER_METRE).round() as u32;
    Some((to_dpi(x), to_dpi(y)))
}

/// Keyword/text pairs of every `tEXt` chunk.
///
/// Compressed (`zTXt`) and international (`iTXt`) chunks are not decoded.
pub fn image_text(image: &DecodedImage, _generator: Generator) -> Result<Option<MetadataMap>> {
    let png = chunks(image)?;

    let mut texts = MetadataMap::new();
    for chunk in png.chunks() {
        match chunk.kind() {
            TEXT => {
                let (keyword, text) = decode_text(chunk.contents())?;
                log::trace!("tEXt {keyword}: {} bytes", text.len());
                if keyword.eq_ignore_ascii_case("parameters") && keyword != "parameters" {
                    texts.insert("parameters".into(), Value::String(text.clone()));
                }
                texts.insert(keyword, Value::String(text));
            }
            COMPRESSED_TEXT | INTERNATIONAL_TEXT => {
                log::debug!(
                    "Skipping {} chunk",
                    String::from_utf8_lossy(&chunk.kind())
                );
            }
            _ => {}
        }
    }

    Ok((!texts.is_empty()).then_some(texts))
}

/// `keyword\0text`, both Latin-1.
fn decode_text(data: &[u8]) -> Result<(String, String)> {
    let nul = data
        .iter()
        .position(|b| *b == 0)
        .ok_or_else(|| Error::metadata("tEXt chunk without keyword separator"))?;
    let keyword = latin1(&data[..nul]);
    if keyword.is_empty() {
        return Err(Error::metadata("tEXt chunk with empty keyword"));
    }
    Ok((keyword, latin1(&data[nul + 1..])))
}

fn latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

/// Prompt data hidden in the alpha channel is not supported yet.
pub fn steganographic_alpha(_image: &DecodedImage, _generator: Generator) -> Result<Option<MetadataMap>> {
    log::debug!("Steganographic alpha extraction is not implemented");
    Ok(None)
}
