//! Manga, chapter and image fixtures

use chapter_dl::{Chapter, ChapterId, Config, DownloadProvider, Manga, MangaId, Source, SourceId};
use std::io::Cursor;
use std::path::PathBuf;

pub fn manga(source: i64) -> Manga {
    Manga {
        id: MangaId(source * 1000),
        source: SourceId(source),
        title: format!("Series {source}"),
    }
}

/// Chapter `number` of `manga`, with an id unique across sources
pub fn chapter(manga: &Manga, number: i64) -> Chapter {
    Chapter {
        id: ChapterId(manga.source.0 * 1000 + number),
        manga_id: manga.id,
        name: format!("Chapter {number}"),
        scanlator: None,
        url: format!("/chapters/{}/{number}", manga.source.0),
        source_order: number,
    }
}

/// Chapters 1..=count of `manga`
pub fn chapters(manga: &Manga, count: i64) -> Vec<Chapter> {
    (1..=count).map(|n| chapter(manga, n)).collect()
}

/// A small valid PNG whose pixels depend on `seed`
pub fn png_image(seed: u8) -> Vec<u8> {
    let img = image::RgbImage::from_pixel(4, 6, image::Rgb([seed, 255 - seed, seed / 2]));
    let mut buf = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut buf, image::ImageFormat::Png)
        .expect("Failed to encode PNG fixture");
    buf.into_inner()
}

/// Where a chapter directory ends up (append `.cbz` for archives)
pub fn chapter_dir(config: &Config, source: &dyn Source, manga: &Manga, chapter: &Chapter) -> PathBuf {
    let source_dir = DownloadProvider::source_dir_name(source.name(), source.lang());
    DownloadProvider::new(config.download.download_dir.clone())
        .manga_dir(&source_dir, manga)
        .join(DownloadProvider::chapter_dir_name(chapter))
}
