//! Images built in memory for tests.

use image::{DynamicImage, ImageFormat, RgbImage};
use img_parts::jpeg::Jpeg;
use img_parts::png::{Png, PngChunk};
use img_parts::webp::WebP;
use img_parts::{Bytes, ImageEXIF};
use std::io::Cursor;

fn encode(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
    let mut buf = Vec::new();
    DynamicImage::ImageRgb8(RgbImage::new(width, height))
        .write_to(&mut Cursor::new(&mut buf), format)
        .unwrap();
    buf
}

/// A PNG with the given raw chunks inserted before `IEND`.
pub fn png_with_chunks(width: u32, height: u32, chunks: Vec<([u8; 4], Vec<u8>)>) -> Vec<u8> {
    let mut png = Png::from_bytes(encode(width, height, ImageFormat::Png).into()).unwrap();
    for (kind, contents) in chunks {
        let end = png.chunks().len() - 1;
        png.chunks_mut().insert(end, PngChunk::new(kind, Bytes::from(contents)));
    }
    png.encoder().bytes().to_vec()
}

/// A PNG with one `tEXt` chunk per `(keyword, text)` pair.
pub fn png(width: u32, height: u32, texts: &[(&str, &str)]) -> Vec<u8> {
    let chunks = texts
        .iter()
        .map(|(keyword, text)| (*b"tEXt", text_chunk(keyword, text)))
        .collect();
    png_with_chunks(width, height, chunks)
}

pub fn text_chunk(keyword: &str, text: &str) -> Vec<u8> {
    let mut data = keyword.as_bytes().to_vec();
    data.push(0);
    data.extend(text.chars().map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?')));
    data
}

/// A JPEG, optionally carrying an EXIF `UserComment` with the raw bytes given.
pub fn jpeg(user_comment: Option<&[u8]>) -> Vec<u8> {
    match user_comment {
        Some(comment) => jpeg_with_exif(&tiff_with_user_comment(comment)),
        None => encode(8, 8, ImageFormat::Jpeg),
    }
}

/// A JPEG whose `APP1` segment holds `tiff` verbatim.
pub fn jpeg_with_exif(tiff: &[u8]) -> Vec<u8> {
    let mut jpeg = Jpeg::from_bytes(encode(8, 8, ImageFormat::Jpeg).into()).unwrap();
    jpeg.set_exif(Some(Bytes::from(tiff.to_vec())));
    jpeg.encoder().bytes().to_vec()
}

/// A lossless WebP, optionally carrying an `EXIF` chunk with a `UserComment`.
pub fn webp(user_comment: Option<&[u8]>) -> Vec<u8> {
    let bytes = encode(8, 8, ImageFormat::WebP);
    let Some(comment) = user_comment else {
        return bytes;
    };
    let mut webp = WebP::from_bytes(bytes.into()).unwrap();
    webp.set_exif(Some(Bytes::from(tiff_with_user_comment(comment))));
    webp.encoder().bytes().to_vec()
}

/// Little-endian TIFF: IFD0 → Exif IFD → UserComment (UNDEFINED).
pub fn tiff_with_user_comment(comment: &[u8]) -> Vec<u8> {
    const EXIF_IFD_OFFSET: u32 = 26;
    const DATA_OFFSET: u32 = 44;

    let mut tiff = Vec::new();
    tiff.extend_from_slice(b"II");
    tiff.extend_from_slice(&42u16.to_le_bytes());
    tiff.extend_from_slice(&8u32.to_le_bytes());

    // IFD0: ExifIFDPointer
    tiff.extend_from_slice(&1u16.to_le_bytes());
    tiff.extend_from_slice(&0x8769u16.to_le_bytes());
    tiff.extend_from_slice(&4u16.to_le_bytes());
    tiff.extend_from_slice(&1u32.to_le_bytes());
    tiff.extend_from_slice(&EXIF_IFD_OFFSET.to_le_bytes());
    tiff.extend_from_slice(&0u32.to_le_bytes());

    // Exif IFD: UserComment
    tiff.extend_from_slice(&1u16.to_le_bytes());
    tiff.extend_from_slice(&0x9286u16.to_le_bytes());
    tiff.extend_from_slice(&7u16.to_le_bytes());
    tiff.extend_from_slice(&(comment.len() as u32).to_le_bytes());
    tiff.extend_from_slice(&DATA_OFFSET.to_le_bytes());
    tiff.extend_from_slice(&0u32.to_le_bytes());

    debug_assert_eq!(tiff.len(), DATA_OFFSET as usize);
    tiff.extend_from_slice(comment);
    tiff
}

/// `UNICODE` prefixed big-endian UTF-16, as written by AUTOMATIC1111.
pub fn unicode_comment(text: &str) -> Vec<u8> {
    let mut data = b"UNICODE\0".to_vec();
    for unit in text.encode_utf16() {
        data.extend_from_slice(&unit.to_be_bytes());
    }
    data
}
