use std::path::{Path, PathBuf};

use axum::extract::Multipart;
use bytes::Bytes;
use chrono::Utc;
use futures_util::future::try_join_all;
use image::{codecs::jpeg::JpegEncoder, imageops::FilterType, DynamicImage};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    services::metrics::IMAGE_UPLOADS_COUNTER,
};

pub const USER_PHOTO_SIZE: (u32, u32) = (500, 500);
pub const NURSERY_IMAGE_SIZE: (u32, u32) = (2000, 1333);
const JPEG_QUALITY: u8 = 90;

/// One uploaded file from a multipart body.
#[derive(Debug, Clone)]
pub struct Upload {
    pub field: String,
    pub content_type: String,
    pub bytes: Bytes,
}

/// Multipart body split into uploaded files and the remaining text fields.
#[derive(Debug, Default)]
pub struct MultipartForm {
    pub files: Vec<Upload>,
    pub fields: Map<String, Value>,
}

impl MultipartForm {
    /// Drains the multipart stream. Text values that parse as JSON numbers,
    /// booleans, arrays or objects are kept typed; everything else stays a string.
    pub async fn read(mut multipart: Multipart) -> AppResult<Self> {
        let mut form = MultipartForm::default();

        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or("").to_string();
            if field.file_name().is_some() {
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let bytes = field.bytes().await?;
                form.files.push(Upload { field: name, content_type, bytes });
            } else {
                let text = field.text().await?;
                form.fields.insert(name, typed_value(text));
            }
        }

        Ok(form)
    }

    pub fn take_file(&mut self, field: &str) -> Option<Upload> {
        let idx = self.files.iter().position(|f| f.field == field)?;
        Some(self.files.remove(idx))
    }

    pub fn take_files(&mut self, field: &str) -> Vec<Upload> {
        let (taken, kept): (Vec<Upload>, Vec<Upload>) = std::mem::take(&mut self.files)
            .into_iter()
            .partition(|f| f.field == field);
        self.files = kept;
        taken
    }

    /// Deserializes the text fields into a request DTO.
    pub fn parse_fields<T: serde::de::DeserializeOwned>(&self) -> AppResult<T> {
        serde_json::from_value(Value::Object(self.fields.clone()))
            .map_err(|e| AppError::Validation(format!("Invalid input data. {e}")))
    }
}

fn typed_value(text: String) -> Value {
    match serde_json::from_str::<Value>(&text) {
        Ok(v @ (Value::Number(_) | Value::Bool(_) | Value::Array(_) | Value::Object(_))) => v,
        _ => Value::String(text),
    }
}

pub fn check_image(upload: &Upload) -> AppResult<()> {
    let is_image = upload
        .content_type
        .parse::<mime::Mime>()
        .is_ok_and(|m| m.type_() == mime::IMAGE);
    if is_image {
        Ok(())
    } else {
        Err(AppError::Validation(
            "Not an image! Please upload only images.".to_string(),
        ))
    }
}

/// Decodes, crops to fill `size` and re-encodes as JPEG.
pub fn resize_to_jpeg(bytes: &[u8], (width, height): (u32, u32)) -> anyhow::Result<Vec<u8>> {
    let img = image::load_from_memory(bytes)?;
    let resized = img.resize_to_fill(width, height, FilterType::Lanczos3);
    let rgb = DynamicImage::ImageRgb8(resized.to_rgb8());

    let mut out = Vec::new();
    rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY))?;
    Ok(out)
}

async fn process_and_store(upload: Upload, size: (u32, u32), path: PathBuf) -> AppResult<()> {
    check_image(&upload)?;
    let encoded = tokio::task::spawn_blocking(move || resize_to_jpeg(&upload.bytes, size))
        .await
        .map_err(anyhow::Error::from)?
        .map_err(|e| AppError::Validation(format!("Could not process image: {e}")))?;

    tokio::fs::write(&path, encoded)
        .await
        .map_err(anyhow::Error::from)?;
    Ok(())
}

pub struct ImageService;

impl ImageService {
    /// Stores a 500x500 profile photo and returns its file name.
    pub async fn save_user_photo(dir: &Path, user_id: Uuid, upload: Upload) -> AppResult<String> {
        tokio::fs::create_dir_all(dir).await.map_err(anyhow::Error::from)?;
        let filename = format!("user-{}-{}.jpeg", user_id, Utc::now().timestamp_millis());
        process_and_store(upload, USER_PHOTO_SIZE, dir.join(&filename)).await?;
        IMAGE_UPLOADS_COUNTER.with_label_values(&["user"]).inc();
        Ok(filename)
    }

    /// Stores the cover and gallery images concurrently. Returns the cover
    /// file name (if one was uploaded) and the gallery file names in upload order.
    pub async fn save_nursery_images(
        dir: &Path,
        nursery_id: Uuid,
        cover: Option<Upload>,
        images: Vec<Upload>,
    ) -> AppResult<(Option<String>, Vec<String>)> {
        tokio::fs::create_dir_all(dir).await.map_err(anyhow::Error::from)?;
        let stamp = Utc::now().timestamp_millis();

        let cover_name = cover
            .as_ref()
            .map(|_| format!("nursery-{nursery_id}-{stamp}-cover.jpeg"));
        let image_names: Vec<String> = (1..=images.len())
            .map(|n| format!("nursery-{nursery_id}-{stamp}-{n}.jpeg"))
            .collect();

        let mut jobs = Vec::with_capacity(images.len() + 1);
        if let (Some(upload), Some(name)) = (cover, cover_name.as_ref()) {
            jobs.push(process_and_store(upload, NURSERY_IMAGE_SIZE, dir.join(name)));
        }
        for (upload, name) in images.into_iter().zip(&image_names) {
            jobs.push(process_and_store(upload, NURSERY_IMAGE_SIZE, dir.join(name)));
        }

        let count = jobs.len();
        try_join_all(jobs).await?;
        IMAGE_UPLOADS_COUNTER
            .with_label_values(&["nursery"])
            .inc_by(count as f64);

        Ok((cover_name, image_names))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, ImageFormat, RgbImage};

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img =
            DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, image::Rgb([200, 80, 40])));
        let mut out = std::io::Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    fn upload(field: &str, content_type: &str, bytes: Vec<u8>) -> Upload {
        Upload {
            field: field.into(),
            content_type: content_type.into(),
            bytes: Bytes::from(bytes),
        }
    }

    #[test]
    fn resized_output_is_a_jpeg_of_the_requested_size() {
        let jpeg = resize_to_jpeg(&png_bytes(640, 480), USER_PHOTO_SIZE).unwrap();
        assert_eq!(image::guess_format(&jpeg).unwrap(), ImageFormat::Jpeg);
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!(decoded.dimensions(), (500, 500));
    }

    #[test]
    fn non_images_are_rejected() {
        assert!(check_image(&upload("photo", "application/pdf", vec![1, 2, 3])).is_err());
        assert!(check_image(&upload("photo", "image/png", vec![])).is_ok());
    }

    #[test]
    fn multipart_text_values_keep_their_type() {
        assert_eq!(typed_value("500".into()), Value::from(500));
        assert_eq!(typed_value("Little Stars".into()), Value::from("Little Stars"));
        // Leading zero is not a JSON number, so phone numbers stay strings.
        assert_eq!(typed_value("01012345678".into()), Value::from("01012345678"));
    }

    #[test]
    fn take_files_splits_by_field() {
        let mut form = MultipartForm::default();
        form.files.push(upload("images", "image/png", vec![]));
        form.files.push(upload("imageCover", "image/png", vec![]));
        form.files.push(upload("images", "image/png", vec![]));

        assert_eq!(form.take_files("images").len(), 2);
        assert!(form.take_file("imageCover").is_some());
        assert!(form.files.is_empty());
    }

    #[tokio::test]
    async fn nursery_images_are_named_in_upload_order() {
        let dir = std::env::temp_dir().join(format!("nursery-images-{}", Uuid::new_v4()));
        let id = Uuid::new_v4();
        let (cover, gallery) = ImageService::save_nursery_images(
            &dir,
            id,
            Some(upload("imageCover", "image/png", png_bytes(64, 64))),
            vec![
                upload("images", "image/png", png_bytes(32, 32)),
                upload("images", "image/png", png_bytes(32, 32)),
            ],
        )
        .await
        .unwrap();

        let cover = cover.unwrap();
        assert!(cover.starts_with(&format!("nursery-{id}-")) && cover.ends_with("-cover.jpeg"));
        assert_eq!(gallery.len(), 2);
        assert!(gallery[0].ends_with("-1.jpeg") && gallery[1].ends_with("-2.jpeg"));
        assert!(dir.join(&gallery[1]).exists());

        let stored = image::open(dir.join(&cover)).unwrap();
        assert_eq!(stored.dimensions(), NURSERY_IMAGE_SIZE);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
