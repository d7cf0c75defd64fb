//! Image encoder
//!
//! Produces a native 76-dim appearance vector per image: an 8x8 luminance
//! thumbnail (mean-centered) followed by a 4-bin histogram per RGB channel.
//! The native space is not aligned with text, so the engine always wraps
//! this encoder in a [`ProjectedEncoder`](super::embeddings::ProjectedEncoder).

use std::path::Path;
use std::time::Duration;

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};
use reqwest::blocking::Client;

use crate::error::{EncodingError, EncodingFailure};
use crate::search::embeddings::{Encoder, Modality, normalize};

const THUMB_SIDE: u32 = 8;
const HIST_BINS: usize = 4;

/// Native dimension of [`ImageEncoder`] output
pub const IMAGE_FEATURE_DIMS: usize = (THUMB_SIDE * THUMB_SIDE) as usize + 3 * HIST_BINS;

/// Upper bound on fetched/read image size
const MAX_IMAGE_BYTES: u64 = 32 * 1024 * 1024;

pub struct ImageEncoder {
    client: Option<Client>,
}

impl ImageEncoder {
    /// `timeout` bounds remote fetches for `http(s)://` references.
    pub fn new(timeout: Duration) -> Self {
        // Without an HTTP client only local paths resolve.
        let client = Client::builder().timeout(timeout).build().ok();
        Self { client }
    }

    fn load_bytes(&self, image_ref: &str) -> Result<Vec<u8>, EncodingError> {
        if image_ref.starts_with("http://") || image_ref.starts_with("https://") {
            return self.fetch(image_ref);
        }

        let path = Path::new(image_ref);
        let metadata = std::fs::metadata(path).map_err(|err| {
            EncodingError::new(
                Modality::Image,
                EncodingFailure::Unreachable,
                format!("{}: {err}", path.display()),
            )
        })?;
        if metadata.len() > MAX_IMAGE_BYTES {
            return Err(EncodingError::new(
                Modality::Image,
                EncodingFailure::UnsupportedFormat,
                format!("{} exceeds {MAX_IMAGE_BYTES} bytes", path.display()),
            ));
        }
        std::fs::read(path).map_err(|err| {
            EncodingError::new(
                Modality::Image,
                EncodingFailure::Unreachable,
                format!("{}: {err}", path.display()),
            )
        })
    }

    fn fetch(&self, url: &str) -> Result<Vec<u8>, EncodingError> {
        let client = self.client.as_ref().ok_or_else(|| {
            EncodingError::new(
                Modality::Image,
                EncodingFailure::NetworkUnavailable,
                "HTTP client unavailable",
            )
        })?;
        let response = client.get(url).send().map_err(|err| network_error(url, &err))?;
        let status = response.status();
        if !status.is_success() {
            return Err(EncodingError::new(
                Modality::Image,
                EncodingFailure::NetworkUnavailable,
                format!("GET {url} returned {status}"),
            ));
        }
        let bytes = response.bytes().map_err(|err| network_error(url, &err))?;
        if bytes.len() as u64 > MAX_IMAGE_BYTES {
            return Err(EncodingError::new(
                Modality::Image,
                EncodingFailure::UnsupportedFormat,
                format!("{url} exceeds {MAX_IMAGE_BYTES} bytes"),
            ));
        }
        Ok(bytes.to_vec())
    }
}

fn network_error(url: &str, err: &reqwest::Error) -> EncodingError {
    let kind = if err.is_timeout() {
        EncodingFailure::Timeout
    } else {
        EncodingFailure::NetworkUnavailable
    };
    EncodingError::new(Modality::Image, kind, format!("GET {url}: {err}"))
}

/// Decode bytes, rejecting anything that is not a supported raster format
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage, EncodingError> {
    if bytes.is_empty() {
        return Err(EncodingError::empty_input(Modality::Image));
    }
    let format = image::guess_format(bytes).map_err(|err| {
        EncodingError::new(Modality::Image, EncodingFailure::UnsupportedFormat, err.to_string())
    })?;
    image::load_from_memory_with_format(bytes, format).map_err(|err| {
        EncodingError::new(Modality::Image, EncodingFailure::UnsupportedFormat, err.to_string())
    })
}

/// Native appearance features of a decoded image
pub fn image_features(img: &DynamicImage) -> Vec<f32> {
    let mut features = Vec::with_capacity(IMAGE_FEATURE_DIMS);

    let thumb = img
        .resize_exact(THUMB_SIDE, THUMB_SIDE, FilterType::Triangle)
        .to_luma8();
    let luma: Vec<f32> = thumb.pixels().map(|p| f32::from(p.0[0]) / 255.0).collect();
    let mean = luma.iter().sum::<f32>() / luma.len() as f32;
    features.extend(luma.iter().map(|v| v - mean));

    let mut hist = [[0u32; HIST_BINS]; 3];
    let mut total = 0u32;
    for (_, _, pixel) in img.pixels() {
        for (channel, bins) in hist.iter_mut().enumerate() {
            let bin = usize::from(pixel.0[channel]) * HIST_BINS / 256;
            bins[bin] += 1;
        }
        total += 1;
    }
    let total = total.max(1) as f32;
    for bins in &hist {
        features.extend(bins.iter().map(|count| *count as f32 / total));
    }
    features
}

impl Encoder for ImageEncoder {
    fn modality(&self) -> Modality {
        Modality::Image
    }

    fn dims(&self) -> usize {
        IMAGE_FEATURE_DIMS
    }

    fn name(&self) -> &str {
        "image-thumbnail"
    }

    fn encode(&self, input: &str) -> Result<Vec<f32>, EncodingError> {
        let image_ref = input.trim();
        if image_ref.is_empty() {
            return Err(EncodingError::empty_input(Modality::Image));
        }
        let bytes = self.load_bytes(image_ref)?;
        let img = decode_image(&bytes)?;
        normalize(&image_features(&img)).ok_or_else(|| {
            EncodingError::new(Modality::Image, EncodingFailure::Backend, "image has no features")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;

    fn png_bytes(img: &RgbImage) -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img.clone())
            .write_to(&mut out, ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    #[test]
    fn test_feature_dims() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(16, 16, Rgb([10, 200, 30])));
        assert_eq!(image_features(&img).len(), IMAGE_FEATURE_DIMS);
    }

    #[test]
    fn test_flat_image_still_encodes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flat.png");
        std::fs::write(&path, png_bytes(&RgbImage::from_pixel(4, 4, Rgb([0, 0, 0])))).unwrap();
        let encoder = ImageEncoder::new(Duration::from_secs(1));
        let v = encoder.encode(path.to_str().unwrap()).unwrap();
        assert_eq!(v.len(), IMAGE_FEATURE_DIMS);
    }

    #[test]
    fn test_missing_file_is_unreachable() {
        let encoder = ImageEncoder::new(Duration::from_secs(1));
        let err = encoder.encode("/definitely/not/here.png").unwrap_err();
        assert_eq!(err.kind, EncodingFailure::Unreachable);
        assert_eq!(err.modality, Modality::Image);
    }

    #[test]
    fn test_non_image_is_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.png");
        std::fs::write(&path, b"just some text, not pixels").unwrap();
        let encoder = ImageEncoder::new(Duration::from_secs(1));
        let err = encoder.encode(path.to_str().unwrap()).unwrap_err();
        assert_eq!(err.kind, EncodingFailure::UnsupportedFormat);
    }

    #[test]
    fn test_blank_ref_is_empty_input() {
        let encoder = ImageEncoder::new(Duration::from_secs(1));
        assert_eq!(encoder.encode("  ").unwrap_err().kind, EncodingFailure::EmptyInput);
    }

    #[test]
    fn test_different_images_differ() {
        let dir = tempfile::tempdir().unwrap();
        let mut gradient = RgbImage::new(16, 16);
        for (x, y, px) in gradient.enumerate_pixels_mut() {
            *px = Rgb([(x * 16) as u8, (y * 16) as u8, 128]);
        }
        let a = dir.path().join("a.png");
        let b = dir.path().join("b.png");
        std::fs::write(&a, png_bytes(&gradient)).unwrap();
        std::fs::write(&b, png_bytes(&RgbImage::from_pixel(16, 16, Rgb([250, 5, 5])))).unwrap();
        let encoder = ImageEncoder::new(Duration::from_secs(1));
        assert_ne!(
            encoder.encode(a.to_str().unwrap()).unwrap(),
            encoder.encode(b.to_str().unwrap()).unwrap()
        );
    }
}
