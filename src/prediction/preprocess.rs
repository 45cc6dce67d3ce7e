//! 画像の前処理
//!
//! アップロードされた画像バイト列を、学習時と同じ正規化でモデル入力に変換します。
//! 出力は NHWC 順（バッチ1）で平坦化された `f32` 配列です。

use std::path::Path;

use anyhow::Context;
use image::imageops::FilterType;

use crate::error::PredictError;

/// モデル入力の既定サイズ（学習時の img_size と一致させる）
pub const DEFAULT_IMAGE_SIZE: usize = 224;

/// チャネル数（RGB）
pub const CHANNELS: usize = 3;

/// 前処理済みの単一画像バッチ
///
/// 形状は `[1, size, size, 3]`、値は `[0, 1]` の範囲です。
#[derive(Debug, Clone, PartialEq)]
pub struct PreprocessedImage {
    data: Vec<f32>,
    size: usize,
}

impl PreprocessedImage {
    /// バッチ次元込みの形状 `[1, H, W, C]`
    pub fn shape(&self) -> [usize; 4] {
        [1, self.size, self.size, CHANNELS]
    }

    /// NHWC 順の画素値
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// 一辺のサイズ
    pub fn image_size(&self) -> usize {
        self.size
    }
}

/// 画像バイト列を前処理
///
/// 1. デコードしてRGBに変換（アルファ・グレースケールの差異を吸収）
/// 2. `size x size` にリサイズ（アスペクト比は保持しない）
/// 3. 画素値を 255 で割って `[0, 1]` に変換
pub fn preprocess_image_bytes(bytes: &[u8], size: usize) -> Result<PreprocessedImage, PredictError> {
    if size == 0 {
        return Err(PredictError::shape_mismatch("image size must be positive"));
    }

    let img = image::load_from_memory(bytes).map_err(PredictError::Decode)?;
    Ok(normalize(img, size))
}

/// ファイルから読み込んで前処理
pub fn preprocess_image_file(path: &Path, size: usize) -> anyhow::Result<PreprocessedImage> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read image file: {}", path.display()))?;
    preprocess_image_bytes(&bytes, size)
        .with_context(|| format!("Failed to preprocess image: {}", path.display()))
}

/// デコード済み画像をリサイズして正規化
pub(crate) fn normalize(img: image::DynamicImage, size: usize) -> PreprocessedImage {
    let side = size as u32;
    let rgb = img.resize_exact(side, side, FilterType::Triangle).to_rgb8();

    let data = rgb
        .into_raw()
        .into_iter()
        .map(|v| v as f32 / 255.0)
        .collect();

    PreprocessedImage { data, size }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};
    use std::io::Cursor;

    fn encode(img: DynamicImage, format: ImageFormat) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, format).unwrap();
        buf.into_inner()
    }

    #[test]
    fn test_output_shape_and_range() {
        let img = RgbImage::from_fn(640, 480, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, 200]));
        let bytes = encode(DynamicImage::ImageRgb8(img), ImageFormat::Png);

        let out = preprocess_image_bytes(&bytes, DEFAULT_IMAGE_SIZE).unwrap();

        assert_eq!(out.shape(), [1, 224, 224, 3]);
        assert_eq!(out.data().len(), 224 * 224 * 3);
        assert!(out.data().iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn test_alpha_channel_is_dropped() {
        let img = RgbaImage::from_pixel(10, 10, Rgba([255, 0, 0, 255]));
        let bytes = encode(DynamicImage::ImageRgba8(img), ImageFormat::Png);

        let out = preprocess_image_bytes(&bytes, 4).unwrap();

        assert_eq!(out.shape(), [1, 4, 4, 3]);
        assert_eq!(&out.data()[..3], &[1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_grayscale_expands_to_rgb() {
        let img = image::GrayImage::from_pixel(8, 8, image::Luma([51]));
        let bytes = encode(DynamicImage::ImageLuma8(img), ImageFormat::Png);

        let out = preprocess_image_bytes(&bytes, 8).unwrap();

        assert_eq!(out.data().len(), 8 * 8 * 3);
        assert!(out.data().iter().all(|v| (*v - 0.2).abs() < 1e-6));
    }

    #[test]
    fn test_corrupt_bytes_are_decode_errors() {
        let err = preprocess_image_bytes(b"definitely not an image", 224).unwrap_err();
        assert!(matches!(err, PredictError::Decode(_)));
    }

    #[test]
    fn test_zero_size_is_rejected() {
        let img = RgbImage::from_pixel(2, 2, Rgb([0, 0, 0]));
        let bytes = encode(DynamicImage::ImageRgb8(img), ImageFormat::Png);
        assert!(matches!(
            preprocess_image_bytes(&bytes, 0),
            Err(PredictError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_preprocess_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sky.jpg");
        RgbImage::from_pixel(32, 32, Rgb([120, 160, 220])).save(&path).unwrap();

        let out = preprocess_image_file(&path, 16).unwrap();
        assert_eq!(out.shape(), [1, 16, 16, 3]);
        assert!(preprocess_image_file(&dir.path().join("missing.png"), 16).is_err());
    }
}
