//! Image type detection and tall-image splitting.

use crate::error::{Error, Result};
use crate::utils::{SPLIT_SEPARATOR, TMP_FILE_EXTENSION};
use image::{DynamicImage, ImageFormat, ImageReader};
use std::path::{Path, PathBuf};

/// Extension used when nothing else identifies an image
pub const FALLBACK_EXTENSION: &str = "jpg";

/// Number of leading bytes [`ImageType::sniff`] needs
pub const SNIFF_LEN: usize = 32;

/// Image formats a chapter page may be stored in
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ImageType {
    /// JPEG
    Jpeg,
    /// PNG
    Png,
    /// GIF
    Gif,
    /// WebP
    Webp,
    /// AVIF
    Avif,
    /// HEIF / HEIC
    Heif,
    /// JPEG XL
    Jxl,
}

impl ImageType {
    /// MIME type
    pub fn mime(&self) -> &'static str {
        match self {
            ImageType::Jpeg => "image/jpeg",
            ImageType::Png => "image/png",
            ImageType::Gif => "image/gif",
            ImageType::Webp => "image/webp",
            ImageType::Avif => "image/avif",
            ImageType::Heif => "image/heif",
            ImageType::Jxl => "image/jxl",
        }
    }

    /// File extension, without the dot
    pub fn extension(&self) -> &'static str {
        match self {
            ImageType::Jpeg => "jpg",
            ImageType::Png => "png",
            ImageType::Gif => "gif",
            ImageType::Webp => "webp",
            ImageType::Avif => "avif",
            ImageType::Heif => "heif",
            ImageType::Jxl => "jxl",
        }
    }

    /// Identify an image from a MIME type such as `image/png; charset=binary`
    pub fn from_mime(mime: &str) -> Option<Self> {
        let essence = mime.split(';').next()?.trim().to_ascii_lowercase();
        match essence.as_str() {
            "image/jpeg" | "image/jpg" | "image/pjpeg" => Some(ImageType::Jpeg),
            "image/png" | "image/apng" => Some(ImageType::Png),
            "image/gif" => Some(ImageType::Gif),
            "image/webp" => Some(ImageType::Webp),
            "image/avif" => Some(ImageType::Avif),
            "image/heif" | "image/heic" => Some(ImageType::Heif),
            "image/jxl" => Some(ImageType::Jxl),
            _ => None,
        }
    }

    /// Identify an image from a file extension
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" | "jpe" | "jfif" => Some(ImageType::Jpeg),
            "png" => Some(ImageType::Png),
            "gif" => Some(ImageType::Gif),
            "webp" => Some(ImageType::Webp),
            "avif" => Some(ImageType::Avif),
            "heif" | "heic" => Some(ImageType::Heif),
            "jxl" => Some(ImageType::Jxl),
            _ => None,
        }
    }

    /// Identify an image from its magic number
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
            return Some(ImageType::Jpeg);
        }
        if bytes.starts_with(&[0x89, b'P', b'N', b'G']) {
            return Some(ImageType::Png);
        }
        if bytes.starts_with(b"GIF8") {
            return Some(ImageType::Gif);
        }
        if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
            return Some(ImageType::Webp);
        }
        if bytes.len() >= 12 && &bytes[4..8] == b"ftyp" {
            match &bytes[8..12] {
                b"avif" | b"avis" => return Some(ImageType::Avif),
                b"heic" | b"heix" | b"hevc" | b"hevx" | b"mif1" | b"msf1" => {
                    return Some(ImageType::Heif);
                }
                _ => {}
            }
        }
        if bytes.starts_with(&[0xFF, 0x0A])
            || bytes.starts_with(&[
                0x00, 0x00, 0x00, 0x0C, b'J', b'X', b'L', b' ', 0x0D, 0x0A, 0x87, 0x0A,
            ])
        {
            return Some(ImageType::Jxl);
        }
        None
    }
}

/// Pick the extension for a fetched image
///
/// Preference order: a declared `image/*` content type, the extension of the
/// URL path, the file's magic number, and finally [`FALLBACK_EXTENSION`].
pub fn extension_for(content_type: Option<&str>, url: &str, leading_bytes: &[u8]) -> &'static str {
    content_type
        .filter(|ct| ct.trim_start().to_ascii_lowercase().starts_with("image/"))
        .and_then(ImageType::from_mime)
        .or_else(|| extension_from_url(url).and_then(ImageType::from_extension))
        .or_else(|| ImageType::sniff(leading_bytes))
        .map_or(FALLBACK_EXTENSION, |t| t.extension())
}

fn extension_from_url(url: &str) -> Option<&str> {
    let path = url.split(['?', '#']).next()?;
    let last = path.rsplit('/').next()?;
    let (stem, ext) = last.rsplit_once('.')?;
    (!stem.is_empty() && !ext.is_empty()).then_some(ext)
}

/// Read up to [`SNIFF_LEN`] leading bytes of a file
pub fn read_leading_bytes(path: &Path) -> std::io::Result<Vec<u8>> {
    use std::io::Read;

    let mut buf = Vec::with_capacity(SNIFF_LEN);
    std::fs::File::open(path)?
        .take(SNIFF_LEN as u64)
        .read_to_end(&mut buf)?;
    Ok(buf)
}

/// What [`split_tall_image`] did
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SplitOutcome {
    /// The file is already a split fragment
    AlreadySplit,
    /// The image is not tall enough
    NotTall,
    /// The image was replaced by these fragments, in order
    Split(Vec<PathBuf>),
}

/// Split a page taller than `ratio` (height / width) into `split_height` strips
///
/// Fragments are written as `<stem>__001.jpg`, `<stem>__002.jpg`, ... next to
/// the original, which is deleted afterwards. Blocking; run it off the async
/// workers.
pub fn split_tall_image(
    file: &Path,
    stem: &str,
    ratio: f32,
    split_height: u32,
) -> Result<SplitOutcome> {
    let file_name = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    if file_name.starts_with(&format!("{stem}{SPLIT_SEPARATOR}")) {
        return Ok(SplitOutcome::AlreadySplit);
    }

    // Sniff rather than trust the extension a server's content type produced
    let (width, height) = ImageReader::open(file)?
        .with_guessed_format()?
        .into_dimensions()?;
    if width == 0 || (height as f32 / width as f32) <= ratio || height <= split_height {
        return Ok(SplitOutcome::NotTall);
    }

    let dir = file.parent().unwrap_or_else(|| Path::new("."));
    let img = ImageReader::open(file)?.with_guessed_format()?.decode()?;
    let parts = height.div_ceil(split_height);
    let mut fragments = Vec::with_capacity(parts as usize);

    // A half-split page must not sit next to its original
    let written = write_fragments(&img, dir, stem, split_height, &mut fragments)
        .and_then(|()| std::fs::remove_file(file).map_err(Error::from));
    if let Err(e) = written {
        discard_fragments(dir, stem, parts, &fragments);
        return Err(e);
    }

    tracing::debug!(
        file = %file.display(),
        width,
        height,
        parts,
        "Split tall image"
    );

    Ok(SplitOutcome::Split(fragments))
}

fn fragment_name(stem: &str, part: u32) -> String {
    format!("{stem}{SPLIT_SEPARATOR}{:03}.jpg", part + 1)
}

/// Write every strip of `img`, pushing each finished fragment onto `fragments`
fn write_fragments(
    img: &DynamicImage,
    dir: &Path,
    stem: &str,
    split_height: u32,
    fragments: &mut Vec<PathBuf>,
) -> Result<()> {
    let (width, height) = (img.width(), img.height());
    for part in 0..height.div_ceil(split_height) {
        let y = part * split_height;
        let strip_height = split_height.min(height - y);
        let rgb = img.crop_imm(0, y, width, strip_height).to_rgb8();

        let name = fragment_name(stem, part);
        let tmp = dir.join(format!("{name}.{TMP_FILE_EXTENSION}"));
        let dest = dir.join(&name);
        rgb.save_with_format(&tmp, ImageFormat::Jpeg)?;
        std::fs::rename(&tmp, &dest)?;
        fragments.push(dest);
    }
    Ok(())
}

/// Remove the fragments and partial strips of an abandoned split
fn discard_fragments(dir: &Path, stem: &str, parts: u32, fragments: &[PathBuf]) {
    for fragment in fragments {
        if let Err(e) = std::fs::remove_file(fragment) {
            tracing::warn!(file = %fragment.display(), error = %e, "Failed to remove split fragment");
        }
    }
    for part in 0..parts {
        let tmp = dir.join(format!("{}.{TMP_FILE_EXTENSION}", fragment_name(stem, part)));
        if tmp.is_file() {
            std::fs::remove_file(&tmp).ok();
        }
    }
}
