use image::imageops::{self, FilterType};
use image::{DynamicImage, RgbImage};
use ndarray::Array4;

use super::error::GraderError;

/// Square input resolution the knee classifier was trained on.
pub const DEFAULT_INPUT_SIZE: u32 = 224;

/// Per-channel ImageNet means in BGR order, as subtracted by VGG16 "caffe" preprocessing.
pub const VGG16_BGR_MEAN: [f32; 3] = [103.939, 116.779, 123.68];

/// Turns encoded image bytes into the `[1, height, width, 3]` tensor the model consumes.
///
/// Pipeline, in order:
/// 1. Decode the bytes (format is sniffed from the content)
/// 2. Force an 8-bit RGB representation (alpha and 16-bit depth are dropped)
/// 3. Resize to exactly `width × height`, ignoring aspect ratio
/// 4. Reorder channels to BGR and subtract [`VGG16_BGR_MEAN`] (no scaling)
/// 5. Lay the values out as NHWC with a leading batch dimension of 1
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImagePreprocessor {
    width: u32,
    height: u32,
    filter: FilterType,
}

impl Default for ImagePreprocessor {
    fn default() -> Self {
        Self::new(DEFAULT_INPUT_SIZE, DEFAULT_INPUT_SIZE)
    }
}

impl ImagePreprocessor {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            filter: FilterType::CatmullRom,
        }
    }

    /// Overrides the resampling filter used when resizing
    pub fn with_filter(mut self, filter: FilterType) -> Self {
        self.filter = filter;
        self
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Shape of the tensor produced by [`preprocess`](Self::preprocess)
    pub fn input_shape(&self) -> [usize; 4] {
        [1, self.height as usize, self.width as usize, 3]
    }

    /// Decodes raw bytes into an image.
    ///
    /// # Errors
    /// - `ValidationError` if `bytes` is empty
    /// - `ImageError` if the format is unknown or the data is corrupt
    pub fn decode(&self, bytes: &[u8]) -> Result<DynamicImage, GraderError> {
        if bytes.is_empty() {
            return Err(GraderError::ValidationError("Image data cannot be empty".into()));
        }
        Ok(image::load_from_memory(bytes)?)
    }

    /// Converts to RGB and resizes to the target resolution
    pub fn resize(&self, image: &DynamicImage) -> RgbImage {
        let rgb = image.to_rgb8();
        if rgb.dimensions() == (self.width, self.height) {
            return rgb;
        }
        imageops::resize(&rgb, self.width, self.height, self.filter)
    }

    /// Runs steps 2-5 of the pipeline on an already decoded image
    pub fn preprocess_image(&self, image: &DynamicImage) -> Array4<f32> {
        let resized = self.resize(image);
        let [_, height, width, channels] = self.input_shape();

        Array4::from_shape_fn((1, height, width, channels), |(_, y, x, c)| {
            normalize_pixel(resized.get_pixel(x as u32, y as u32).0)[c]
        })
    }

    /// Full pipeline from encoded bytes to model input
    pub fn preprocess(&self, bytes: &[u8]) -> Result<Array4<f32>, GraderError> {
        let image = self.decode(bytes)?;
        Ok(self.preprocess_image(&image))
    }
}

/// Normalizes one RGB pixel into the BGR, mean-centred values fed to the model
pub fn normalize_pixel(rgb: [u8; 3]) -> [f32; 3] {
    [
        rgb[2] as f32 - VGG16_BGR_MEAN[0],
        rgb[1] as f32 - VGG16_BGR_MEAN[1],
        rgb[0] as f32 - VGG16_BGR_MEAN[2],
    ]
}
