use anyhow::{Context, Result};
use image::{DynamicImage, ImageFormat, ImageReader};
use log::info;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::common::{CpuPool, TARGET_EXTENSION};
use crate::pipeline::workspace::Workspace;
use crate::utils::PathExt;

/// List the regular files sitting directly in the workspace.
///
/// Order follows the directory enumeration and is not stable.
pub async fn scan_workspace(workspace: &Workspace) -> Result<Vec<PathBuf>> {
    let mut entries = Vec::new();
    let mut read_dir = tokio::fs::read_dir(workspace.path())
        .await
        .context(format!("failed to read workspace {:?}", workspace.path()))?;

    while let Some(entry) = read_dir
        .next_entry()
        .await
        .context("failed to read workspace entry")?
    {
        let file_type = entry
            .file_type()
            .await
            .context(format!("failed to stat {:?}", entry.path()))?;
        if file_type.is_file() {
            entries.push(entry.path());
        }
    }
    Ok(entries)
}

/// Convert every jpg/jpeg/png entry into a WebP sibling.
///
/// Files are converted one after another; the first failure aborts the whole
/// stage. Returns the output paths, each listed once.
pub async fn convert_entries(entries: Vec<PathBuf>, pool: &CpuPool) -> Result<Vec<PathBuf>> {
    let start_time = Instant::now();
    let mut outputs: Vec<PathBuf> = Vec::new();

    for source in entries.into_iter().filter(|path| path.is_source_image()) {
        let file_start = Instant::now();
        let source_for_job = source.clone();
        let output = pool
            .run(move || convert_to_webp(&source_for_job))
            .await
            .context(format!("failed to convert {:?} to WebP", source))?;

        info!(duration = &*format!("{:?}", file_start.elapsed());
            "Image converted to WebP: {:?} -> {:?}",
            source,
            output
        );

        // a.png and a.jpg both land on a.webp
        if !outputs.contains(&output) {
            outputs.push(output);
        }
    }

    info!(duration = &*format!("{:?}", start_time.elapsed());
        "All images converted to WebP ({} outputs)",
        outputs.len()
    );
    Ok(outputs)
}

/// Scan then convert.
pub async fn convert_workspace(workspace: &Workspace, pool: &CpuPool) -> Result<Vec<PathBuf>> {
    let entries = scan_workspace(workspace).await?;
    convert_entries(entries, pool).await
}

/// Decode `source` (format sniffed from content, falling back to extension)
/// and write a lossless WebP beside it.
pub fn convert_to_webp(source: &Path) -> Result<PathBuf> {
    let output = source.with_extension(TARGET_EXTENSION);

    let dynamic_image = ImageReader::open(source)
        .context(format!("failed to open image {:?}", source))?
        .with_guessed_format()
        .context(format!("failed to guess format of {:?}", source))?
        .decode()
        .context(format!("failed to decode image {:?}", source))?;

    // The WebP encoder accepts 8-bit RGB and RGBA only
    let encodable = if dynamic_image.color().has_alpha() {
        DynamicImage::ImageRgba8(dynamic_image.to_rgba8())
    } else {
        DynamicImage::ImageRgb8(dynamic_image.to_rgb8())
    };

    encodable
        .save_with_format(&output, ImageFormat::WebP)
        .context(format!("failed to save WebP image to {:?}", output))?;

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::workspace::allocate;
    use image::{Rgb, RgbImage, Rgba, RgbaImage};
    use std::collections::HashSet;

    fn write_png(path: &Path) {
        RgbaImage::from_pixel(8, 6, Rgba([10, 200, 30, 128]))
            .save_with_format(path, ImageFormat::Png)
            .unwrap();
    }

    fn write_jpeg(path: &Path) {
        RgbImage::from_pixel(5, 5, Rgb([250, 0, 0]))
            .save_with_format(path, ImageFormat::Jpeg)
            .unwrap();
    }

    #[tokio::test]
    async fn converts_only_source_extensions() {
        let root = tempfile::tempdir().unwrap();
        let workspace = allocate(root.path()).await.unwrap();
        write_png(&workspace.path().join("a.png"));
        write_jpeg(&workspace.path().join("b.JPG"));
        std::fs::write(workspace.path().join("notes.txt"), b"keep me").unwrap();
        std::fs::create_dir(workspace.path().join("nested.png")).unwrap();

        let pool = CpuPool::new(2).unwrap();
        let outputs = convert_workspace(&workspace, &pool).await.unwrap();

        let outputs: HashSet<PathBuf> = outputs.into_iter().collect();
        let expected: HashSet<PathBuf> = [
            workspace.path().join("a.webp"),
            workspace.path().join("b.webp"),
        ]
        .into_iter()
        .collect();
        assert_eq!(outputs, expected);

        // sources stay, the text file is untouched
        assert!(workspace.path().join("a.png").exists());
        assert!(workspace.path().join("b.JPG").exists());
        assert_eq!(
            std::fs::read(workspace.path().join("notes.txt")).unwrap(),
            b"keep me"
        );
    }

    #[tokio::test]
    async fn output_is_decodable_webp() {
        let root = tempfile::tempdir().unwrap();
        let source = root.path().join("photo.png");
        write_png(&source);

        let output = convert_to_webp(&source).unwrap();

        assert_eq!(output, root.path().join("photo.webp"));
        let reader = ImageReader::open(&output)
            .unwrap()
            .with_guessed_format()
            .unwrap();
        assert_eq!(reader.format(), Some(ImageFormat::WebP));
        let decoded = reader.decode().unwrap();
        assert_eq!((decoded.width(), decoded.height()), (8, 6));
    }

    #[tokio::test]
    async fn one_corrupt_image_fails_the_stage() {
        let root = tempfile::tempdir().unwrap();
        let workspace = allocate(root.path()).await.unwrap();
        for name in ["one.png", "two.png", "four.jpg", "five.jpeg"] {
            write_png(&workspace.path().join(name));
        }
        std::fs::write(workspace.path().join("three.png"), b"definitely not a png").unwrap();

        let pool = CpuPool::new(1).unwrap();
        let err = convert_workspace(&workspace, &pool).await.unwrap_err();

        assert!(format!("{:#}", err).contains("three.png"));
    }

    #[tokio::test]
    async fn colliding_stems_are_listed_once() {
        let root = tempfile::tempdir().unwrap();
        let workspace = allocate(root.path()).await.unwrap();
        write_png(&workspace.path().join("same.png"));
        write_jpeg(&workspace.path().join("same.jpg"));

        let pool = CpuPool::new(1).unwrap();
        let outputs = convert_workspace(&workspace, &pool).await.unwrap();

        assert_eq!(outputs, vec![workspace.path().join("same.webp")]);
    }

    #[tokio::test]
    async fn empty_workspace_converts_nothing() {
        let root = tempfile::tempdir().unwrap();
        let workspace = allocate(root.path()).await.unwrap();
        let pool = CpuPool::new(1).unwrap();

        assert!(convert_workspace(&workspace, &pool).await.unwrap().is_empty());
    }
}
