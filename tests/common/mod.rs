#![allow(dead_code)]

use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use kneegrade::{GradeModel, Grader, GraderError};
use ndarray::Array4;

pub const BOUNDARY: &str = "kneegrade-test-boundary";

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Fixed-output model that records how often it was invoked
#[derive(Debug)]
pub struct StubModel {
    pub probabilities: Vec<f32>,
    pub calls: AtomicUsize,
}

impl StubModel {
    pub fn new(probabilities: Vec<f32>) -> Arc<Self> {
        Arc::new(Self {
            probabilities,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl GradeModel for StubModel {
    fn input_shape(&self) -> [usize; 4] {
        [1, 224, 224, 3]
    }

    fn num_classes(&self) -> usize {
        5
    }

    fn infer(&self, input: Array4<f32>) -> Result<Vec<f32>, GraderError> {
        assert_eq!(input.shape(), &[1, 224, 224, 3]);
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.probabilities.clone())
    }
}

pub fn grader_with(model: Arc<StubModel>) -> Grader {
    Grader::builder()
        .with_model(model)
        .expect("stub model is valid")
        .build()
        .expect("grader builds")
}

pub fn encode(image: RgbImage, format: ImageFormat) -> Vec<u8> {
    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(image)
        .write_to(&mut Cursor::new(&mut bytes), format)
        .expect("encode test image");
    bytes
}

/// A 512x512 gradient, roughly the size of a real radiograph thumbnail
pub fn sample_jpeg() -> Vec<u8> {
    let image = RgbImage::from_fn(512, 512, |x, y| {
        let v = ((x + y) / 4) as u8;
        Rgb([v, v, v])
    });
    encode(image, ImageFormat::Jpeg)
}

pub struct Part<'a> {
    pub name: &'a str,
    pub filename: Option<&'a str>,
    pub content_type: Option<&'a str>,
    pub data: &'a [u8],
}

pub fn file_part<'a>(name: &'a str, filename: &'a str, data: &'a [u8]) -> Part<'a> {
    Part {
        name,
        filename: Some(filename),
        content_type: Some("image/jpeg"),
        data,
    }
}

pub fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        let mut disposition = format!("Content-Disposition: form-data; name=\"{}\"", part.name);
        if let Some(filename) = part.filename {
            disposition.push_str(&format!("; filename=\"{}\"", filename));
        }
        body.extend_from_slice(disposition.as_bytes());
        body.extend_from_slice(b"\r\n");
        if let Some(content_type) = part.content_type {
            body.extend_from_slice(format!("Content-Type: {}\r\n", content_type).as_bytes());
        }
        body.extend_from_slice(b"\r\n");
        body.extend_from_slice(part.data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

pub fn multipart_content_type() -> String {
    format!("multipart/form-data; boundary={}", BOUNDARY)
}
