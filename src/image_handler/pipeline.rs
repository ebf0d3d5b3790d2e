//! # 解码与变换流水线模块
//!
//! ## 设计思路
//!
//! 将“字节 → 位图 → 缩放 → 目标格式字节”的过程集中管理，并在关键节点增加资源上限控制。
//! 优先做尺寸检查，再进行完整解码，降低恶意输入触发高内存开销的风险。
//!
//! ## 实现思路
//!
//! 1. 读取 header 尺寸，按像素 / 内存上限快速拒绝
//! 2. 完整解码
//! 3. 两段式计算目标尺寸（先宽后高），只缩小不放大
//! 4. `fast_image_resize` 高质量缩放，失败时回退 `image::resize_exact`
//! 5. 按目标格式与质量编码

use std::io::Cursor;

use fast_image_resize as fr;
use image::codecs::avif::AvifEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType as PngFilterType, PngEncoder};
use image::codecs::webp::WebPEncoder;
use image::{DynamicImage, GenericImageView, ImageBuffer, Rgba};

use super::source::ProcessedAsset;
use super::{ImageConfig, ImageError, TargetFormat, TranscodeOptions, Transcoder};

/// AVIF 编码速度（1 最慢最好，10 最快）。
const AVIF_SPEED: u8 = 8;
/// PNG 质量不低于该值时使用最高压缩等级。
const PNG_BEST_COMPRESSION_QUALITY: u8 = 90;

/// 计算缩放后的尺寸。
///
/// 最大宽高均为 0 时保持原尺寸；否则只缩小不放大，保持宽高比：
/// 先按 `max_width` 收紧宽度并等比计算高度，再对结果按 `max_height` 收紧高度并等比计算宽度。
/// 两段式的结果可能与“取最小比例一次缩放”不同，这是有意保留的行为。
///
/// # 示例
/// ```rust
/// use paste_upload::image_handler::calculate_dimensions;
///
/// assert_eq!(calculate_dimensions(4000, 3000, 1920, 1080), (1440, 1080));
/// assert_eq!(calculate_dimensions(800, 600, 0, 0), (800, 600));
/// ```
pub fn calculate_dimensions(width: u32, height: u32, max_width: u32, max_height: u32) -> (u32, u32) {
    if max_width == 0 && max_height == 0 {
        return (width, height);
    }

    let (mut w, mut h) = (width, height);

    if max_width > 0 && w > max_width {
        h = scale_side(h, max_width, w);
        w = max_width;
    }

    if max_height > 0 && h > max_height {
        w = scale_side(w, max_height, h);
        h = max_height;
    }

    (w, h)
}

/// `round(side * numerator / denominator)`，结果至少为 1。
fn scale_side(side: u32, numerator: u32, denominator: u32) -> u32 {
    if denominator == 0 {
        return side.max(1);
    }
    let scaled = (side as f64 * numerator as f64 / denominator as f64).round();
    (scaled as u32).max(1)
}

impl Transcoder {
    /// 解码、缩放并重新编码。
    pub fn process(&self, bytes: &[u8], options: &TranscodeOptions) -> Result<ProcessedAsset, ImageError> {
        let (header_width, header_height) = Self::inspect_dimensions_from_memory(bytes)?;
        Self::validate_pixel_limits(&self.config, header_width, header_height)?;
        Self::validate_decoded_memory_limits(&self.config, header_width, header_height)?;

        let decoded = image::load_from_memory(bytes)
            .map_err(|e| ImageError::Decode(format!("图片解码失败：{}", e)))?;

        let (raw_width, raw_height) = decoded.dimensions();
        Self::validate_pixel_limits(&self.config, raw_width, raw_height)?;

        let (width, height) =
            calculate_dimensions(raw_width, raw_height, options.max_width, options.max_height);

        let surface = if (width, height) == (raw_width, raw_height) {
            decoded
        } else {
            log::info!(
                "🧩 缩放：{}x{} -> {}x{}（filter={:?}）",
                raw_width,
                raw_height,
                width,
                height,
                self.config.resize_filter
            );
            Self::resize(decoded, width, height, self.config.resize_filter)
        };

        let encoded = Self::encode(&surface, options.format, options.quality)?;
        let size = encoded.len();

        Ok(ProcessedAsset {
            bytes: encoded,
            format: options.format,
            width,
            height,
            size,
        })
    }

    /// 仅通过图片头信息读取宽高。
    fn inspect_dimensions_from_memory(bytes: &[u8]) -> Result<(u32, u32), ImageError> {
        let reader = image::ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| ImageError::Decode(format!("无法识别图片格式：{}", e)))?;

        if reader.format().is_none() {
            return Err(ImageError::Decode("无法识别图片格式".to_string()));
        }

        reader
            .into_dimensions()
            .map_err(|e| ImageError::Decode(format!("无法读取图片尺寸：{}", e)))
    }

    fn validate_pixel_limits(config: &ImageConfig, width: u32, height: u32) -> Result<(), ImageError> {
        let pixels = (width as u64)
            .checked_mul(height as u64)
            .ok_or_else(|| ImageError::ResourceLimit("图片像素数溢出".to_string()))?;

        if pixels > config.max_decoded_pixels {
            return Err(ImageError::ResourceLimit(format!(
                "图片像素过大：{} 像素（限制：{} 像素）",
                pixels, config.max_decoded_pixels
            )));
        }

        Ok(())
    }

    fn validate_decoded_memory_limits(
        config: &ImageConfig,
        width: u32,
        height: u32,
    ) -> Result<(), ImageError> {
        let estimated = (width as u64)
            .checked_mul(height as u64)
            .and_then(|pixels| pixels.checked_mul(4))
            .ok_or_else(|| ImageError::ResourceLimit("图片解码内存估算溢出".to_string()))?;

        if estimated > config.max_decoded_bytes {
            return Err(ImageError::ResourceLimit(format!(
                "图片解码预计内存过大：{:.2} MB（限制：{:.2} MB）",
                estimated as f64 / 1024.0 / 1024.0,
                config.max_decoded_bytes as f64 / 1024.0 / 1024.0
            )));
        }

        Ok(())
    }

    fn resize(image: DynamicImage, width: u32, height: u32, filter: fr::FilterType) -> DynamicImage {
        match Self::resize_with_fast_image_resize(&image, width, height, filter) {
            Ok(resized) => resized,
            Err(err) => {
                log::warn!("⚠️ fast_image_resize 缩放失败，回退 image::resize_exact：{}", err);
                image.resize_exact(width, height, image::imageops::FilterType::Lanczos3)
            }
        }
    }

    fn resize_with_fast_image_resize(
        image: &DynamicImage,
        target_width: u32,
        target_height: u32,
        filter: fr::FilterType,
    ) -> Result<DynamicImage, ImageError> {
        let src = image.to_rgba8();
        let (src_width, src_height) = src.dimensions();

        let src_image =
            fr::images::Image::from_vec_u8(src_width, src_height, src.into_raw(), fr::PixelType::U8x4)
                .map_err(|e| ImageError::Decode(format!("构建源图像缓冲失败：{}", e)))?;

        let mut dst_image = fr::images::Image::new(target_width, target_height, fr::PixelType::U8x4);

        let mut resizer = fr::Resizer::new();
        let options = fr::ResizeOptions::new().resize_alg(fr::ResizeAlg::Convolution(filter));

        resizer
            .resize(&src_image, &mut dst_image, Some(&options))
            .map_err(|e| ImageError::Decode(format!("fast_image_resize 执行失败：{}", e)))?;

        let rgba = ImageBuffer::<Rgba<u8>, Vec<u8>>::from_raw(
            target_width,
            target_height,
            dst_image.into_vec(),
        )
        .ok_or_else(|| ImageError::Decode("fast_image_resize 输出缓冲长度异常".to_string()))?;

        Ok(DynamicImage::ImageRgba8(rgba))
    }

    /// 按目标格式编码，质量 1~100。
    ///
    /// - JPEG / AVIF：直接使用质量参数
    /// - PNG：无损，质量只决定压缩等级
    /// - WebP：`image` 只提供无损编码器，质量不生效
    fn encode(image: &DynamicImage, format: TargetFormat, quality: u8) -> Result<Vec<u8>, ImageError> {
        let quality = quality.clamp(1, 100);
        let mut buffer = Vec::new();

        let result = match format {
            TargetFormat::Jpeg => DynamicImage::ImageRgb8(image.to_rgb8())
                .write_with_encoder(JpegEncoder::new_with_quality(&mut buffer, quality)),
            TargetFormat::Png => {
                let compression = if quality >= PNG_BEST_COMPRESSION_QUALITY {
                    CompressionType::Best
                } else {
                    CompressionType::Default
                };
                image.write_with_encoder(PngEncoder::new_with_quality(
                    &mut buffer,
                    compression,
                    PngFilterType::Adaptive,
                ))
            }
            TargetFormat::Webp => DynamicImage::ImageRgba8(image.to_rgba8())
                .write_with_encoder(WebPEncoder::new_lossless(&mut buffer)),
            TargetFormat::Avif => DynamicImage::ImageRgba8(image.to_rgba8()).write_with_encoder(
                AvifEncoder::new_with_speed_quality(&mut buffer, AVIF_SPEED, quality),
            ),
        };

        result.map_err(|e| {
            ImageError::Encode(format!("无法编码为 {}：{}", format.as_str(), e))
        })?;

        if buffer.is_empty() {
            return Err(ImageError::Encode(format!("{} 编码输出为空", format.as_str())));
        }

        Ok(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::ImageFormat;
    use proptest::prelude::*;

    fn create_png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = ImageBuffer::from_fn(width, height, |x, y| {
            let r = (x % 255) as u8;
            let g = (y % 255) as u8;
            let b = ((x + y) % 255) as u8;
            Rgba([r, g, b, 255])
        });

        let dyn_img = DynamicImage::ImageRgba8(img);
        let mut cursor = Cursor::new(Vec::new());
        dyn_img
            .write_to(&mut cursor, ImageFormat::Png)
            .expect("failed to encode test image");
        cursor.into_inner()
    }

    fn options(format: TargetFormat, max_width: u32, max_height: u32) -> TranscodeOptions {
        TranscodeOptions {
            format,
            quality: 80,
            max_width,
            max_height,
        }
    }

    #[test]
    fn two_pass_clamp_matches_expected_scenario() {
        // 4000x3000 -> 宽度收紧到 1920x1440 -> 高度收紧到 1440x1080
        assert_eq!(calculate_dimensions(4000, 3000, 1920, 1080), (1440, 1080));
    }

    #[test]
    fn single_axis_limits() {
        assert_eq!(calculate_dimensions(3001, 1000, 1000, 500), (1000, 333));
        assert_eq!(calculate_dimensions(1000, 3000, 0, 1500), (500, 1500));
    }

    #[test]
    fn never_upscales() {
        assert_eq!(calculate_dimensions(640, 480, 1920, 1080), (640, 480));
    }

    #[test]
    fn tiny_results_never_hit_zero() {
        assert_eq!(calculate_dimensions(10_000, 1, 100, 0), (100, 1));
    }

    #[test]
    fn process_resizes_and_encodes_every_format() {
        let transcoder = Transcoder::new(ImageConfig::default());
        let png = create_png_bytes(400, 300);

        for format in TargetFormat::ALL {
            let asset = transcoder
                .process(&png, &options(format, 200, 0))
                .expect("transcode should succeed");

            assert_eq!((asset.width, asset.height), (200, 150));
            assert_eq!(asset.format, format);
            assert_eq!(asset.size, asset.bytes.len());

            let decoded_format = image::guess_format(&asset.bytes).expect("output is an image");
            let expected = match format {
                TargetFormat::Png => ImageFormat::Png,
                TargetFormat::Jpeg => ImageFormat::Jpeg,
                TargetFormat::Webp => ImageFormat::WebP,
                TargetFormat::Avif => ImageFormat::Avif,
            };
            assert_eq!(decoded_format, expected);
        }
    }

    #[test]
    fn process_keeps_dimensions_without_limits() {
        let transcoder = Transcoder::new(ImageConfig::default());
        let png = create_png_bytes(64, 32);

        let asset = transcoder
            .process(&png, &options(TargetFormat::Png, 0, 0))
            .expect("transcode should succeed");

        let decoded = image::load_from_memory(&asset.bytes).expect("decode output");
        assert_eq!(decoded.dimensions(), (64, 32));
    }

    #[test]
    fn process_rejects_non_image_bytes() {
        let transcoder = Transcoder::new(ImageConfig::default());
        let result = transcoder.process(b"definitely not an image", &TranscodeOptions::default());
        assert!(matches!(result, Err(ImageError::Decode(_))));
    }

    #[test]
    fn process_rejects_too_many_pixels() {
        let config = ImageConfig {
            max_decoded_pixels: 1_000,
            ..ImageConfig::default()
        };
        let transcoder = Transcoder::new(config);
        let png = create_png_bytes(100, 100);

        let result = transcoder.process(&png, &TranscodeOptions::default());
        assert!(matches!(result, Err(ImageError::ResourceLimit(_))));
    }

    proptest! {
        #[test]
        fn zero_limits_keep_original(w in 1u32..20_000, h in 1u32..20_000) {
            prop_assert_eq!(calculate_dimensions(w, h, 0, 0), (w, h));
        }

        #[test]
        fn width_clamp_preserves_aspect(w in 2u32..20_000, h in 1u32..20_000, max_w in 1u32..20_000) {
            prop_assume!(w > max_w);
            let expected_h = ((h as f64 * max_w as f64 / w as f64).round() as u32).max(1);
            prop_assert_eq!(calculate_dimensions(w, h, max_w, 0), (max_w, expected_h));
        }

        #[test]
        fn result_fits_in_box(w in 1u32..20_000, h in 1u32..20_000, max_w in 1u32..5_000, max_h in 1u32..5_000) {
            let (rw, rh) = calculate_dimensions(w, h, max_w, max_h);
            prop_assert!(rw <= max_w && rh <= max_h);
            prop_assert!(rw <= w && rh <= h);
        }
    }
}
