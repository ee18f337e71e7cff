//! Image to tensor preprocessing.

use image::{DynamicImage, GenericImageView};
use mlpipe_runtime::{RuntimeContext, Tensor};
use tracing::debug;

use crate::error::{PipelineError, Result};
use crate::models::PreprocessingConfig;

/// Turns decoded images into normalized `[1, H, W, C]` float tensors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImagePreprocessor {
    height: usize,
    width: usize,
    channels: usize,
}

impl ImagePreprocessor {
    /// Create a preprocessor producing `[1, height, width, channels]`.
    ///
    /// # Errors
    /// `channels` must be 1, 3 or 4 and the target must be non-empty.
    pub fn new(height: usize, width: usize, channels: usize) -> Result<Self> {
        if height == 0 || width == 0 {
            return Err(PipelineError::Config(format!(
                "target size must be positive, got {}x{}",
                height, width
            )));
        }
        if !matches!(channels, 1 | 3 | 4) {
            return Err(PipelineError::Config(format!(
                "unsupported channel count {}",
                channels
            )));
        }
        Ok(Self {
            height,
            width,
            channels,
        })
    }

    pub fn from_config(config: &PreprocessingConfig) -> Result<Self> {
        Self::new(config.height, config.width, config.channels)
    }

    /// Output shape including the batch axis.
    pub fn output_shape(&self) -> [usize; 4] {
        [1, self.height, self.width, self.channels]
    }

    /// Decode an encoded image (PNG, JPEG, ...) and preprocess it.
    pub fn preprocess_bytes(&self, ctx: &mut RuntimeContext, bytes: &[u8]) -> Result<Tensor> {
        if bytes.is_empty() {
            return Err(PipelineError::UnsupportedImageFormat(
                "empty payload".to_string(),
            ));
        }
        let image = image::load_from_memory(bytes)
            .map_err(|e| PipelineError::UnsupportedImageFormat(e.to_string()))?;
        self.preprocess(ctx, &image)
    }

    /// Preprocess a decoded image.
    ///
    /// Every step produces a new tensor and releases its input, so only the
    /// returned tensor is live afterwards. Pixel values are assumed to be
    /// 8-bit; wider images are narrowed when the pixel grid is extracted.
    pub fn preprocess(&self, ctx: &mut RuntimeContext, image: &DynamicImage) -> Result<Tensor> {
        let (w, h) = image.dimensions();
        if w == 0 || h == 0 {
            return Err(PipelineError::UnsupportedImageFormat(format!(
                "image has zero size ({}x{})",
                w, h
            )));
        }
        debug!(
            "Preprocessing {}x{} image to {:?}",
            w,
            h,
            self.output_shape()
        );

        let pixels = match self.channels {
            1 => image.to_luma8().into_raw(),
            3 => image.to_rgb8().into_raw(),
            _ => image.to_rgba8().into_raw(),
        };

        let mut scope = ctx.scope();
        let raw = scope.from_u8(pixels, &[h as usize, w as usize, self.channels])?;

        let resized = scope.resize_bilinear(&raw, self.height, self.width)?;
        scope.release(raw)?;

        let float = scope.cast_f32(&resized)?;
        scope.release(resized)?;

        let scaled = scope.scale(&float, 1.0 / 255.0)?;
        scope.release(float)?;

        let batched = scope.expand_dims(&scaled, 0)?;
        scope.release(scaled)?;

        Ok(scope.keep(batched))
    }
}

impl Default for ImagePreprocessor {
    fn default() -> Self {
        Self {
            height: 224,
            width: 224,
            channels: 3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, Rgb, RgbImage};
    use mlpipe_runtime::{CpuBackend, DType};
    use pretty_assertions::assert_eq;

    fn ctx() -> RuntimeContext {
        RuntimeContext::with_backend(Box::new(CpuBackend)).unwrap()
    }

    #[test]
    fn test_output_shape_for_any_input_size() {
        let mut ctx = ctx();
        let pre = ImagePreprocessor::new(8, 6, 3).unwrap();

        for (w, h) in [(1, 1), (3, 17), (40, 9), (6, 8)] {
            let image = DynamicImage::ImageRgb8(RgbImage::new(w, h));
            let tensor = pre.preprocess(&mut ctx, &image).unwrap();
            assert_eq!(tensor.shape(), &[1, 8, 6, 3]);
            assert_eq!(tensor.dtype(), DType::Float32);
            ctx.release(tensor).unwrap();
        }
        assert_eq!(ctx.stats().live, 0);
    }

    #[test]
    fn test_values_in_unit_range() {
        let mut ctx = ctx();
        let pre = ImagePreprocessor::new(4, 4, 3).unwrap();
        let image = DynamicImage::ImageRgb8(RgbImage::from_fn(5, 3, |x, y| {
            Rgb([(x * 60) as u8, (y * 120) as u8, 255])
        }));

        let tensor = pre.preprocess(&mut ctx, &image).unwrap();
        let values = ctx.scope().read_f32(&tensor).unwrap();
        assert!(values.iter().all(|v| *v >= 0.0 && *v <= 1.0 + 1e-6));
        assert!(values.iter().any(|v| *v > 0.999));
        ctx.release(tensor).unwrap();
    }

    #[test]
    fn test_only_output_stays_live() {
        let mut ctx = ctx();
        let pre = ImagePreprocessor::default();
        let image = DynamicImage::ImageRgb8(RgbImage::new(32, 32));

        let tensor = pre.preprocess(&mut ctx, &image).unwrap();
        let stats = ctx.stats();
        assert_eq!(stats.live, 1);
        assert_eq!(stats.allocated, 5);
        ctx.release(tensor).unwrap();
    }

    #[test]
    fn test_grayscale_to_rgb() {
        let mut ctx = ctx();
        let pre = ImagePreprocessor::new(2, 2, 3).unwrap();
        let image = DynamicImage::ImageLuma8(GrayImage::from_pixel(2, 2, Luma([51])));

        let tensor = pre.preprocess(&mut ctx, &image).unwrap();
        let values = ctx.scope().read_f32(&tensor).unwrap();
        assert_eq!(values.len(), 12);
        assert!(values.iter().all(|v| (v - 0.2).abs() < 1e-6));
        ctx.release(tensor).unwrap();
    }

    #[test]
    fn test_rejects_bad_channels() {
        assert!(ImagePreprocessor::new(4, 4, 2).is_err());
        assert!(ImagePreprocessor::new(0, 4, 3).is_err());
    }

    #[test]
    fn test_corrupt_and_empty_payloads() {
        let mut ctx = ctx();
        let pre = ImagePreprocessor::default();

        assert!(matches!(
            pre.preprocess_bytes(&mut ctx, &[]),
            Err(PipelineError::UnsupportedImageFormat(_))
        ));
        assert!(matches!(
            pre.preprocess_bytes(&mut ctx, b"definitely not an image"),
            Err(PipelineError::UnsupportedImageFormat(_))
        ));
        assert_eq!(ctx.stats().allocated, 0);
    }

    #[test]
    fn test_zero_sized_image() {
        let mut ctx = ctx();
        let pre = ImagePreprocessor::default();
        let image = DynamicImage::ImageRgb8(RgbImage::new(0, 5));
        assert!(matches!(
            pre.preprocess(&mut ctx, &image),
            Err(PipelineError::UnsupportedImageFormat(_))
        ));
    }
}
