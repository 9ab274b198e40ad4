use crate::db::*;
use crate::types::{ChapterId, MangaId, SourceId};
use std::path::Path;
use tempfile::NamedTempFile;

#[tokio::test]
async fn test_insert_and_get_downloaded_chapter() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();

    db.insert_downloaded_chapter(
        SourceId(1),
        MangaId(2),
        ChapterId(3),
        "Ch. 3",
        Path::new("/downloads/Src (EN)/Title/Ch. 3"),
    )
    .await
    .unwrap();

    let row = db.get_downloaded_chapter(ChapterId(3)).await.unwrap().unwrap();
    assert_eq!(row.manga_id, MangaId(2));
    assert_eq!(row.source_id, SourceId(1));
    assert_eq!(row.dir_name, "Ch. 3");
    assert!(row.path.ends_with("Ch. 3"));

    assert!(db.get_downloaded_chapter(ChapterId(99)).await.unwrap().is_none());

    db.close().await;
}

#[tokio::test]
async fn test_reinsert_replaces_path() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();

    db.insert_downloaded_chapter(SourceId(1), MangaId(1), ChapterId(1), "Ch", Path::new("/a/Ch"))
        .await
        .unwrap();
    db.insert_downloaded_chapter(
        SourceId(1),
        MangaId(1),
        ChapterId(1),
        "Ch.cbz",
        Path::new("/a/Ch.cbz"),
    )
    .await
    .unwrap();

    let rows = db.list_downloaded_chapters().await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].dir_name, "Ch.cbz");

    db.close().await;
}

#[tokio::test]
async fn test_delete_chapter_and_manga() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();

    for (manga, chapter) in [(1, 10), (1, 11), (2, 20)] {
        db.insert_downloaded_chapter(
            SourceId(1),
            MangaId(manga),
            ChapterId(chapter),
            "dir",
            Path::new("/dir"),
        )
        .await
        .unwrap();
    }

    assert!(db.delete_downloaded_chapter(ChapterId(20)).await.unwrap());
    assert!(!db.delete_downloaded_chapter(ChapterId(20)).await.unwrap());

    let mut removed = db.delete_downloaded_manga(MangaId(1)).await.unwrap();
    removed.sort();
    assert_eq!(removed, vec![ChapterId(10), ChapterId(11)]);
    assert!(db.list_downloaded_chapters().await.unwrap().is_empty());

    db.close().await;
}
