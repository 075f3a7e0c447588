//! src/services/image_service.rs
//!
//! ImageService: every operation that mutates image files under the
//! content root (upload, delete, batch delete, rotate) plus read-side helpers
//! for serving bytes and thumbnails. Each accepted mutation invalidates the
//! shared [`ImageIndex`] before returning so the next random pick sees it.

use crate::services::{
    image_index::ImageIndex,
    paths::{self, UPLOADS_URL_PREFIX},
};
use bytes::Bytes;
use chrono::Utc;
use futures::{Stream, StreamExt, pin_mut};
use image::{
    DynamicImage, ImageDecoder, ImageFormat, ImageReader, codecs::jpeg::JpegEncoder,
    imageops::FilterType,
};
use md5::Context;
use serde::Serialize;
use std::{
    io::{self, BufWriter, Write},
    path::{Path, PathBuf},
    sync::Arc,
};
use thiserror::Error;
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
    task,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Extensions accepted for upload (lowercase).
pub const UPLOAD_EXTENSIONS: [&str; 6] = ["jpeg", "jpg", "png", "gif", "webp", "bmp"];

pub const THUMBNAIL_SIZE: u32 = 200;
const THUMBNAIL_QUALITY: u8 = 80;

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("Image not found")]
    NotFound(String),
    #[error("Invalid image path")]
    InvalidPath,
    #[error("Invalid file type `{0}`: images only")]
    UnsupportedType(String),
    #[error("File size too large. Maximum size is {}MB.", .limit_bytes / (1024 * 1024))]
    TooLarge { limit_bytes: u64 },
    #[error("Angle must be a multiple of 90 degrees")]
    InvalidAngle(i32),
    #[error("Invalid paths provided")]
    EmptyBatch,
    #[error("could not process image: {0}")]
    Decode(#[from] image::ImageError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type ImageResult<T> = Result<T, ImageError>;

#[derive(Debug, Clone)]
pub struct ImageSettings {
    pub root: PathBuf,
    pub upload_folder: String,
    pub jpeg_quality: u8,
    pub max_upload_bytes: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedImage {
    pub id: String,
    pub filename: String,
    pub originalname: String,
    pub path: String,
    pub size: u64,
    pub etag: String,
}

#[derive(Debug, Default, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchDeleteResult {
    pub deleted_count: usize,
    pub failed_count: usize,
    pub errors: Vec<String>,
}

#[derive(Clone)]
pub struct ImageService {
    settings: Arc<ImageSettings>,
    index: Arc<ImageIndex>,
}

impl ImageService {
    pub fn new(settings: ImageSettings, index: Arc<ImageIndex>) -> Self {
        Self {
            settings: Arc::new(settings),
            index,
        }
    }

    /// Resolve a client reference to an existing image file.
    async fn locate(&self, reference: &str) -> ImageResult<(String, PathBuf)> {
        let id = paths::normalize_reference(reference);
        if id.is_empty() {
            return Err(ImageError::InvalidPath);
        }
        let path = paths::resolve(&self.settings.root, id).ok_or(ImageError::InvalidPath)?;
        match fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok((id.to_string(), path)),
            Ok(_) => Err(ImageError::NotFound(id.to_string())),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                Err(ImageError::NotFound(id.to_string()))
            }
            Err(err) => Err(ImageError::Io(err)),
        }
    }

    /// Stream an upload to disk, then normalize it into the upload folder.
    ///
    /// - Streams to a hidden temp file, computing size and MD5.
    /// - Enforces the per-file size limit while streaming.
    /// - Decodes, applies EXIF orientation and re-encodes as JPEG.
    /// - Renames the result into place and invalidates the index.
    ///
    /// Temp files are removed on every error path.
    pub async fn upload_stream<S>(&self, original_name: &str, stream: S) -> ImageResult<UploadedImage>
    where
        S: Stream<Item = io::Result<Bytes>>,
    {
        ensure_upload_extension(original_name)?;

        let target_dir = paths::resolve(&self.settings.root, &self.settings.upload_folder)
            .ok_or(ImageError::InvalidPath)?;
        fs::create_dir_all(&target_dir).await?;
        let tmp_path = target_dir.join(format!(".tmp-{}", Uuid::new_v4()));
        let mut file = File::create(&tmp_path).await?;

        let mut size: u64 = 0;
        let mut digest = Context::new();
        pin_mut!(stream);
        while let Some(chunk_res) = stream.next().await {
            let chunk = match chunk_res {
                Ok(chunk) => chunk,
                Err(err) => {
                    let _ = fs::remove_file(&tmp_path).await;
                    return Err(ImageError::Io(err));
                }
            };
            size += chunk.len() as u64;
            if size > self.settings.max_upload_bytes {
                drop(file);
                let _ = fs::remove_file(&tmp_path).await;
                return Err(ImageError::TooLarge {
                    limit_bytes: self.settings.max_upload_bytes,
                });
            }
            digest.consume(&chunk);
            if let Err(err) = file.write_all(&chunk).await {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(ImageError::Io(err));
            }
        }
        if let Err(err) = file.flush().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(ImageError::Io(err));
        }
        drop(file);

        let etag = format!("{:x}", digest.compute());
        let filename = format!(
            "images-{}-{}.jpg",
            Utc::now().timestamp_millis(),
            &etag[..8]
        );
        let final_path = target_dir.join(&filename);

        let (src, dst, quality) = (tmp_path.clone(), final_path.clone(), self.settings.jpeg_quality);
        let outcome = task::spawn_blocking(move || reencode_upload(&src, &dst, quality)).await;
        let _ = fs::remove_file(&tmp_path).await;
        outcome.map_err(io::Error::other)??;

        self.index.invalidate();

        let id = format!("{}/{}", self.settings.upload_folder.trim_matches('/'), filename);
        info!(id = %id, original = %original_name, size, "stored upload");
        Ok(UploadedImage {
            path: format!("{}{}", UPLOADS_URL_PREFIX, id),
            id,
            filename,
            originalname: original_name.to_string(),
            size,
            etag,
        })
    }

    async fn remove(&self, reference: &str) -> ImageResult<String> {
        let (id, path) = self.locate(reference).await?;
        fs::remove_file(&path).await?;
        debug!("removed image file {}", path.display());
        Ok(id)
    }

    pub async fn delete(&self, reference: &str) -> ImageResult<String> {
        let id = self.remove(reference).await?;
        self.index.invalidate();
        info!(id = %id, "deleted image");
        Ok(id)
    }

    /// Delete every referenced image, collecting per-item failures instead
    /// of stopping at the first one.
    pub async fn batch_delete(&self, references: &[String]) -> ImageResult<BatchDeleteResult> {
        if references.is_empty() {
            return Err(ImageError::EmptyBatch);
        }

        let mut result = BatchDeleteResult::default();
        for reference in references {
            match self.remove(reference).await {
                Ok(_) => result.deleted_count += 1,
                Err(ImageError::NotFound(_)) => {
                    result.failed_count += 1;
                    result.errors.push(format!("Image not found: {}", reference));
                }
                Err(err) => {
                    warn!("failed to delete {}: {}", reference, err);
                    result.failed_count += 1;
                    result.errors.push(format!("Failed to delete: {}", reference));
                }
            }
        }

        self.index.invalidate();
        info!(
            deleted = result.deleted_count,
            failed = result.failed_count,
            "batch delete finished"
        );
        Ok(result)
    }

    /// Rotate an image in place by a multiple of 90 degrees (negative is
    /// counter-clockwise).
    pub async fn rotate(&self, reference: &str, angle: i32) -> ImageResult<String> {
        if angle % 90 != 0 {
            return Err(ImageError::InvalidAngle(angle));
        }
        let (id, path) = self.locate(reference).await?;
        let quality = self.settings.jpeg_quality;
        task::spawn_blocking(move || rotate_file(&path, angle, quality))
            .await
            .map_err(io::Error::other)??;

        self.index.invalidate();
        info!(id = %id, angle, "rotated image");
        Ok(id)
    }

    /// 200x200 cover-cropped JPEG preview of an image.
    pub async fn thumbnail(&self, reference: &str) -> ImageResult<Vec<u8>> {
        let (_, path) = self.locate(reference).await?;
        task::spawn_blocking(move || render_thumbnail(&path))
            .await
            .map_err(io::Error::other)?
    }

    /// Open an image for streaming. Returns the file, its length and the
    /// content type derived from the extension.
    pub async fn open(&self, reference: &str) -> ImageResult<(File, u64, &'static str)> {
        let (id, path) = self.locate(reference).await?;
        let file = File::open(&path).await?;
        let len = file.metadata().await?.len();
        Ok((file, len, content_type_for(&id)))
    }
}

fn ensure_upload_extension(name: &str) -> ImageResult<()> {
    let ext = Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or_default();
    if UPLOAD_EXTENSIONS
        .iter()
        .any(|candidate| candidate.eq_ignore_ascii_case(ext))
    {
        Ok(())
    } else {
        Err(ImageError::UnsupportedType(name.to_string()))
    }
}

/// MIME type for an image file name; unknown extensions are served as bytes.
pub fn content_type_for(name: &str) -> &'static str {
    match ImageFormat::from_path(name) {
        Ok(ImageFormat::Jpeg) => "image/jpeg",
        Ok(ImageFormat::Png) => "image/png",
        Ok(ImageFormat::Gif) => "image/gif",
        Ok(ImageFormat::WebP) => "image/webp",
        Ok(ImageFormat::Bmp) => "image/bmp",
        _ => "application/octet-stream",
    }
}

fn reencode_upload(src: &Path, dst: &Path, quality: u8) -> ImageResult<()> {
    let mut decoder = ImageReader::open(src)?
        .with_guessed_format()?
        .into_decoder()?;
    let orientation = decoder.orientation()?;
    let mut img = DynamicImage::from_decoder(decoder)?;
    img.apply_orientation(orientation);
    write_jpeg_atomic(&img, dst, quality)
}

fn rotate_file(path: &Path, angle: i32, quality: u8) -> ImageResult<()> {
    let img = ImageReader::open(path)?.with_guessed_format()?.decode()?;
    let rotated = match angle.rem_euclid(360) {
        90 => img.rotate90(),
        180 => img.rotate180(),
        270 => img.rotate270(),
        _ => img,
    };
    match ImageFormat::from_path(path) {
        Ok(ImageFormat::Jpeg) | Err(_) => write_jpeg_atomic(&rotated, path, quality),
        Ok(format) => {
            let tmp = sibling_tmp_path(path);
            if let Err(err) = rotated.save_with_format(&tmp, format) {
                let _ = std::fs::remove_file(&tmp);
                return Err(err.into());
            }
            rename_into_place(&tmp, path)
        }
    }
}

/// Decode an image file and render the square thumbnail.
pub fn render_thumbnail(path: &Path) -> ImageResult<Vec<u8>> {
    let img = ImageReader::open(path)?.with_guessed_format()?.decode()?;
    let thumb = img.resize_to_fill(THUMBNAIL_SIZE, THUMBNAIL_SIZE, FilterType::Lanczos3);
    let mut buf = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buf, THUMBNAIL_QUALITY);
    DynamicImage::ImageRgb8(thumb.to_rgb8()).write_with_encoder(encoder)?;
    Ok(buf)
}

fn sibling_tmp_path(path: &Path) -> PathBuf {
    path.with_file_name(format!(".tmp-{}", Uuid::new_v4()))
}

fn write_jpeg_atomic(img: &DynamicImage, dst: &Path, quality: u8) -> ImageResult<()> {
    let tmp = sibling_tmp_path(dst);
    let written = (|| -> ImageResult<()> {
        let mut writer = BufWriter::new(std::fs::File::create(&tmp)?);
        let encoder = JpegEncoder::new_with_quality(&mut writer, quality);
        DynamicImage::ImageRgb8(img.to_rgb8()).write_with_encoder(encoder)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
        Ok(())
    })();
    if let Err(err) = written {
        let _ = std::fs::remove_file(&tmp);
        return Err(err);
    }
    rename_into_place(&tmp, dst)
}

fn rename_into_place(tmp: &Path, dst: &Path) -> ImageResult<()> {
    if let Err(err) = std::fs::rename(tmp, dst) {
        let _ = std::fs::remove_file(tmp);
        return Err(ImageError::Io(err));
    }
    Ok(())
}
