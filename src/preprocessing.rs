// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Image preprocessing for YOLO inference.
//!
//! This module handles all image preprocessing operations needed before
//! running YOLO model inference: letterbox resizing, padding, and conversion
//! of pixels into a normalized NCHW tensor.

#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]

use fast_image_resize::images::Image;
use fast_image_resize::{FilterType, PixelType, ResizeAlg, ResizeOptions, Resizer};
use image::{DynamicImage, GenericImageView, Rgb, RgbImage, RgbaImage};
use ndarray::Array4;
use rayon::prelude::*;

use crate::error::{InferenceError, Result};
use crate::results::BoundingBox;
use crate::utils::clamp;

/// Default letterbox padding color (gray).
pub const LETTERBOX_COLOR: [u8; 3] = [114, 114, 114];

// ================================================================================================
// Letterbox
// ================================================================================================

/// Mapping between original-image pixels and letterboxed model-input pixels.
///
/// A single `ratio` scales both axes; `pad_x`/`pad_y` are the whole-pixel
/// offsets at which the scaled image sits on the canvas. An odd margin puts
/// the extra pixel on the right or bottom.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LetterboxTransform {
    /// Uniform scale from original to letterboxed space.
    pub ratio: f32,
    /// Left margin in letterboxed pixels, `floor((target_w - scaled_w) / 2)`.
    pub pad_x: f32,
    /// Top margin in letterboxed pixels, `floor((target_h - scaled_h) / 2)`.
    pub pad_y: f32,
    /// Original image width.
    pub orig_width: u32,
    /// Original image height.
    pub orig_height: u32,
    /// Scaled image width inside the canvas.
    pub scaled_width: u32,
    /// Scaled image height inside the canvas.
    pub scaled_height: u32,
}

impl LetterboxTransform {
    /// Compute letterbox parameters for an image of `orig` size `(width, height)`
    /// placed into a `target` canvas `(width, height)`.
    ///
    /// # Errors
    ///
    /// Returns [`InferenceError::ImageError`] if either size has a zero side.
    pub fn compute(orig: (u32, u32), target: (u32, u32)) -> Result<Self> {
        let (orig_w, orig_h) = orig;
        let (target_w, target_h) = target;

        if orig_w == 0 || orig_h == 0 || target_w == 0 || target_h == 0 {
            return Err(InferenceError::ImageError(format!(
                "cannot letterbox {orig_w}x{orig_h} into {target_w}x{target_h}"
            )));
        }

        if orig == target {
            return Ok(Self::identity(orig_w, orig_h));
        }

        let ratio = (target_w as f32 / orig_w as f32).min(target_h as f32 / orig_h as f32);

        let scaled_width = ((orig_w as f32 * ratio).round() as u32).clamp(1, target_w);
        let scaled_height = ((orig_h as f32 * ratio).round() as u32).clamp(1, target_h);

        Ok(Self {
            ratio,
            pad_x: ((target_w - scaled_width) / 2) as f32,
            pad_y: ((target_h - scaled_height) / 2) as f32,
            orig_width: orig_w,
            orig_height: orig_h,
            scaled_width,
            scaled_height,
        })
    }

    /// Transform for an image that already matches the model input.
    #[must_use]
    pub const fn identity(width: u32, height: u32) -> Self {
        Self {
            ratio: 1.0,
            pad_x: 0.0,
            pad_y: 0.0,
            orig_width: width,
            orig_height: height,
            scaled_width: width,
            scaled_height: height,
        }
    }

    /// Map an `[x1, y1, x2, y2]` box from letterboxed space back onto the
    /// original image.
    ///
    /// Minimum corners are clamped into `[0, dim]`, maximum corners into
    /// `[0, dim - 1]`.
    #[must_use]
    pub fn unpad_box(&self, xyxy: [f32; 4]) -> BoundingBox {
        let (w, h) = (self.orig_width as f32, self.orig_height as f32);

        let x_min = (xyxy[0] - self.pad_x) / self.ratio;
        let y_min = (xyxy[1] - self.pad_y) / self.ratio;
        let x_max = (xyxy[2] - self.pad_x) / self.ratio;
        let y_max = (xyxy[3] - self.pad_y) / self.ratio;

        BoundingBox::new(
            clamp(x_min, 0.0, w),
            clamp(y_min, 0.0, h),
            clamp(x_max, 0.0, w - 1.0),
            clamp(y_max, 0.0, h - 1.0),
        )
    }

    /// Map an `[x1, y1, x2, y2]` box from original pixels into letterboxed space.
    #[must_use]
    pub fn project_box(&self, xyxy: [f32; 4]) -> [f32; 4] {
        [
            xyxy[0].mul_add(self.ratio, self.pad_x),
            xyxy[1].mul_add(self.ratio, self.pad_y),
            xyxy[2].mul_add(self.ratio, self.pad_x),
            xyxy[3].mul_add(self.ratio, self.pad_y),
        ]
    }
}

/// A letterboxed canvas and the transform that produced it.
#[derive(Debug, Clone)]
pub struct LetterboxResult {
    /// Canvas of exactly the model input size.
    pub image: RgbImage,
    /// Parameters for mapping boxes back onto the original image.
    pub transform: LetterboxTransform,
}

/// Letterbox an image into a `target` canvas `(width, height)`.
///
/// The image is scaled by a single ratio with bilinear filtering and drawn
/// centered; the margin is filled with [`LETTERBOX_COLOR`]. Images that
/// already match the target are copied without resampling.
///
/// # Errors
///
/// Returns [`InferenceError::ImageError`] for zero-size inputs or if the
/// resizer rejects the buffers.
pub fn letterbox(image: &DynamicImage, target: (u32, u32)) -> Result<LetterboxResult> {
    let transform = LetterboxTransform::compute(image.dimensions(), target)?;

    if image.dimensions() == target {
        return Ok(LetterboxResult {
            image: image.to_rgb8(),
            transform,
        });
    }

    let resized = resize_rgb(
        image.to_rgb8(),
        transform.scaled_width,
        transform.scaled_height,
    )?;

    let mut canvas = RgbImage::from_pixel(target.0, target.1, Rgb(LETTERBOX_COLOR));
    image::imageops::replace(
        &mut canvas,
        &resized,
        i64::from(transform.pad_x as u32),
        i64::from(transform.pad_y as u32),
    );

    Ok(LetterboxResult {
        image: canvas,
        transform,
    })
}

/// Bilinear convolution resize of an RGB buffer.
fn resize_rgb(src: RgbImage, new_width: u32, new_height: u32) -> Result<RgbImage> {
    let (src_w, src_h) = src.dimensions();

    let src_image = Image::from_vec_u8(src_w, src_h, src.into_raw(), PixelType::U8x3)
        .map_err(|e| InferenceError::ImageError(format!("Failed to create source image: {e}")))?;
    let mut dst_image = Image::new(new_width, new_height, PixelType::U8x3);

    let mut resizer = Resizer::new();
    let options = ResizeOptions::new().resize_alg(ResizeAlg::Convolution(FilterType::Bilinear));
    resizer
        .resize(&src_image, &mut dst_image, Some(&options))
        .map_err(|e| InferenceError::ImageError(format!("Failed to resize image: {e}")))?;

    RgbImage::from_raw(new_width, new_height, dst_image.into_vec())
        .ok_or_else(|| InferenceError::ImageError("Failed to create resized buffer".to_string()))
}

// ================================================================================================
// Tensor extraction
// ================================================================================================

/// Borrowed, bounds-checked view over a row-major interleaved pixel buffer.
///
/// Channels are RGB or RGBA; a fourth channel is carried but never read
/// into the tensor.
#[derive(Debug, Clone, Copy)]
pub struct PixelView<'a> {
    data: &'a [u8],
    width: usize,
    height: usize,
    channels: usize,
}

impl<'a> PixelView<'a> {
    /// Wrap a raw buffer.
    ///
    /// # Errors
    ///
    /// Returns [`InferenceError::ImageError`] if the size is zero, the channel
    /// count is not 3 or 4, or the buffer is shorter than `width * height * channels`.
    pub fn new(data: &'a [u8], width: usize, height: usize, channels: usize) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(InferenceError::ImageError(format!(
                "pixel view must be non-empty, got {width}x{height}"
            )));
        }
        if channels != 3 && channels != 4 {
            return Err(InferenceError::ImageError(format!(
                "expected 3 or 4 channels, got {channels}"
            )));
        }
        let needed = width * height * channels;
        if data.len() < needed {
            return Err(InferenceError::ImageError(format!(
                "pixel buffer holds {} bytes, {width}x{height}x{channels} needs {needed}",
                data.len()
            )));
        }

        Ok(Self {
            data,
            width,
            height,
            channels,
        })
    }

    /// View an RGB image.
    ///
    /// # Errors
    ///
    /// Returns [`InferenceError::ImageError`] for an empty image.
    pub fn from_rgb(image: &'a RgbImage) -> Result<Self> {
        Self::new(image.as_raw(), image.width() as usize, image.height() as usize, 3)
    }

    /// View an RGBA image.
    ///
    /// # Errors
    ///
    /// Returns [`InferenceError::ImageError`] for an empty image.
    pub fn from_rgba(image: &'a RgbaImage) -> Result<Self> {
        Self::new(image.as_raw(), image.width() as usize, image.height() as usize, 4)
    }

    /// Width in pixels.
    #[must_use]
    pub const fn width(&self) -> usize {
        self.width
    }

    /// Height in pixels.
    #[must_use]
    pub const fn height(&self) -> usize {
        self.height
    }

    /// Bytes per pixel.
    #[must_use]
    pub const fn channels(&self) -> usize {
        self.channels
    }

    /// Interleaved bytes of row `y`, or `None` past the last row.
    #[must_use]
    pub fn row(&self, y: usize) -> Option<&'a [u8]> {
        if y >= self.height {
            return None;
        }
        let stride = self.width * self.channels;
        self.data.get(y * stride..(y + 1) * stride)
    }

    /// Channel bytes of pixel `(x, y)`, or `None` out of bounds.
    #[must_use]
    pub fn pixel(&self, x: usize, y: usize) -> Option<&'a [u8]> {
        if x >= self.width {
            return None;
        }
        self.row(y)
            .and_then(|row| row.get(x * self.channels..(x + 1) * self.channels))
    }
}

/// Convert pixels into a normalized NCHW tensor.
///
/// Output shape is `(1, 3, H, W)` with planes R, G, B and values
/// `byte / 255.0`. Rows are filled in parallel.
///
/// # Errors
///
/// Returns [`InferenceError::ImageError`] if the tensor storage is not contiguous.
pub fn image_to_tensor(view: &PixelView<'_>) -> Result<Array4<f32>> {
    let (w, h) = (view.width(), view.height());
    let plane = w * h;
    let channels = view.channels();

    let mut tensor = Array4::<f32>::zeros((1, 3, h, w));
    let data = tensor
        .as_slice_mut()
        .ok_or_else(|| InferenceError::ImageError("tensor is not contiguous".to_string()))?;

    let (r_plane, rest) = data.split_at_mut(plane);
    let (g_plane, b_plane) = rest.split_at_mut(plane);

    r_plane
        .par_chunks_mut(w)
        .zip(g_plane.par_chunks_mut(w))
        .zip(b_plane.par_chunks_mut(w))
        .enumerate()
        .for_each(|(y, ((r_row, g_row), b_row))| {
            let Some(src) = view.row(y) else { return };
            for (x, px) in src.chunks_exact(channels).enumerate() {
                r_row[x] = f32::from(px[0]) / 255.0;
                g_row[x] = f32::from(px[1]) / 255.0;
                b_row[x] = f32::from(px[2]) / 255.0;
            }
        });

    Ok(tensor)
}

/// Result of preprocessing an image, containing the tensor and transform info.
#[derive(Debug, Clone)]
pub struct PreprocessResult {
    /// Preprocessed image tensor in NCHW format, normalized to [0, 1].
    pub tensor: Array4<f32>,
    /// Letterbox transform for mapping boxes back.
    pub transform: LetterboxTransform,
}

/// Preprocess an image for YOLO inference.
///
/// Letterboxes to `target` `(width, height)` and extracts the input tensor.
///
/// # Errors
///
/// Propagates letterbox and extraction errors.
pub fn preprocess_image(image: &DynamicImage, target: (u32, u32)) -> Result<PreprocessResult> {
    let letterboxed = letterbox(image, target)?;
    let view = PixelView::from_rgb(&letterboxed.image)?;
    let tensor = image_to_tensor(&view)?;

    Ok(PreprocessResult {
        tensor,
        transform: letterboxed.transform,
    })
}
