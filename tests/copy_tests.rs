//! End-to-end tests for the flat `copy` command

use badger::config::{CopyOpts, MediaFilter};
use badger::db::MetadataStore;
use badger::services::{run_copy, Prompter};
use image::{GrayImage, Luma};
use std::path::Path;
use tempfile::TempDir;

struct AcceptAll;
impl Prompter for AcceptAll {
    fn confirm(&self, _summary: &str) -> badger::Result<bool> {
        Ok(true)
    }
}

fn write_png(dir: &Path, name: &str) {
    let img = GrayImage::from_fn(8, 8, |x, y| Luma([((x * 13 + y) % 256) as u8]));
    img.save(dir.join(name)).unwrap();
}

fn opts(src: &TempDir, dest: &Path) -> CopyOpts {
    let mut opts = CopyOpts::new(format!("{}/*", src.path().display()), dest);
    opts.assume_yes = true;
    opts.show_progress = false;
    opts
}

#[tokio::test]
async fn test_copy_all_lands_flat_with_sequence_names() {
    let src = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let dest = out.path().join("dest");

    write_png(src.path(), "a.png");
    std::fs::write(src.path().join("b.mp4"), b"video").unwrap();
    std::fs::write(src.path().join("c.rw2"), b"raw").unwrap();

    let report = run_copy(&opts(&src, &dest), &AcceptAll).await.unwrap();
    assert_eq!(report.copied_files, 3);

    // No burst folders, no score prefixes; enumeration order names.
    assert!(dest.join("0.png").exists());
    assert!(dest.join("1.mp4").exists());
    assert!(dest.join("2.rw2").exists());
}

#[tokio::test]
async fn test_copy_records_rows_with_sentinel_cluster_id() {
    let src = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let dest = out.path().join("dest");

    std::fs::write(src.path().join("a.mp4"), b"one").unwrap();
    std::fs::write(src.path().join("b.mp4"), b"two").unwrap();

    run_copy(&opts(&src, &dest), &AcceptAll).await.unwrap();

    let store = MetadataStore::open(&dest).await.unwrap();
    let row = store
        .lookup(&src.path().join("a.mp4").to_string_lossy())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.cluster_id, -1);
    assert_eq!(row.blur, None);
    assert_eq!(row.media_type, "video");
    store.close().await;
}

#[tokio::test]
async fn test_copy_rerun_is_idempotent() {
    let src = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let dest = out.path().join("dest");

    std::fs::write(src.path().join("a.mp4"), b"one").unwrap();
    std::fs::write(src.path().join("b.mp4"), b"two").unwrap();

    let opts = opts(&src, &dest);
    let first = run_copy(&opts, &AcceptAll).await.unwrap();
    assert_eq!(first.copied_files, 2);

    let second = run_copy(&opts, &AcceptAll).await.unwrap();
    assert_eq!(second.copied_files, 0);
    assert_eq!(second.already_copied, 2);
}

#[tokio::test]
async fn test_iso_bound_excludes_media_without_exif() {
    let src = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let dest = out.path().join("dest");

    // Generated PNGs carry no EXIF block, so an ISO bound excludes them.
    write_png(src.path(), "a.png");
    write_png(src.path(), "b.png");

    let mut opts = opts(&src, &dest);
    opts.media = MediaFilter::Photo;
    opts.max_iso = Some(800);

    let report = run_copy(&opts, &AcceptAll).await.unwrap();
    assert_eq!(report.copied_files, 0);
}

#[tokio::test]
async fn test_kind_filter_combines_with_shutter_bound() {
    let src = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let dest = out.path().join("dest");

    write_png(src.path(), "a.png");
    std::fs::write(src.path().join("b.mp4"), b"video").unwrap();

    // Videos carry no shutter speed; with a bound set nothing survives.
    let mut opts = opts(&src, &dest);
    opts.media = MediaFilter::Video;
    opts.min_shutter_speed = Some("1/250".to_string());

    let report = run_copy(&opts, &AcceptAll).await.unwrap();
    assert_eq!(report.copied_files, 0);
}
