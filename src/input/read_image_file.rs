// 该文件是 Detect My Setup 项目的一部分。
// src/input/read_image_file.rs - 图像文件输入
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::path::Path;

use image::{ImageFormat, ImageReader, RgbImage};
use thiserror::Error;
use tracing::{debug, error};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme};

/// 允许的输入格式：png / jpg / jpeg
const SUPPORTED_FORMATS: [ImageFormat; 2] = [ImageFormat::Png, ImageFormat::Jpeg];

#[derive(Error, Debug)]
pub enum ImageFileInputError {
  #[error("URI schema mismatch: expected '{expected}', found '{found}'")]
  SchemaMismatch { expected: String, found: String },
  #[error("I/O error: {0}")]
  IoError(#[from] std::io::Error),
  #[error("Image loading error: {0}")]
  ImageLoadError(#[from] image::ImageError),
  #[error("Unsupported image format: {0}")]
  UnsupportedFormat(String),
}

fn check_format(format: Option<ImageFormat>, source: &str) -> Result<(), ImageFileInputError> {
  match format {
    Some(format) if SUPPORTED_FORMATS.contains(&format) => Ok(()),
    _ => {
      error!("不支持的图像格式: {}", source);
      Err(ImageFileInputError::UnsupportedFormat(source.to_string()))
    }
  }
}

/// 单张图像输入，解码后统一转换为 RGB
pub struct ImageFileInput {
  image: Option<RgbImage>,
}

impl FromUrlWithScheme for ImageFileInput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageFileInput {
  type Error = ImageFileInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ImageFileInputError::SchemaMismatch {
        expected: Self::SCHEME.to_string(),
        found: url.scheme().to_string(),
      });
    }

    Self::open(url.path())
  }
}

impl ImageFileInput {
  pub fn open(path: impl AsRef<Path>) -> Result<Self, ImageFileInputError> {
    let path = path.as_ref();
    check_format(
      ImageFormat::from_path(path).ok(),
      &path.display().to_string(),
    )?;

    let image = ImageReader::open(path)?.decode()?.to_rgb8();
    debug!(
      "读取图像 {}: {}x{}",
      path.display(),
      image.width(),
      image.height()
    );

    Ok(Self { image: Some(image) })
  }

  /// 解码内存中的上传内容
  pub fn from_bytes(bytes: &[u8]) -> Result<Self, ImageFileInputError> {
    check_format(image::guess_format(bytes).ok(), "<uploaded bytes>")?;
    let image = image::load_from_memory(bytes)?.to_rgb8();
    debug!("解码上传图像: {}x{}", image.width(), image.height());
    Ok(Self { image: Some(image) })
  }

  pub fn image(&self) -> Option<&RgbImage> {
    self.image.as_ref()
  }

  pub fn into_frames(self) -> ImageFileFrames {
    ImageFileFrames { inner: self }
  }
}

pub struct ImageFileFrames {
  inner: ImageFileInput,
}

impl Iterator for ImageFileFrames {
  type Item = RgbImage;

  fn next(&mut self) -> Option<Self::Item> {
    self.inner.image.take()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::{Rgb, Rgba, RgbaImage};
  use std::io::Cursor;

  fn encoded(format: ImageFormat) -> Vec<u8> {
    let image = RgbImage::from_pixel(4, 3, Rgb([200, 100, 50]));
    let mut bytes = Vec::new();
    image.write_to(&mut Cursor::new(&mut bytes), format).unwrap();
    bytes
  }

  #[test]
  fn reads_png_from_url_once() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("setup.png");
    std::fs::write(&path, encoded(ImageFormat::Png)).unwrap();

    let url = Url::parse(&format!("image://{}", path.display())).unwrap();
    let mut frames = ImageFileInput::from_url(&url).unwrap().into_frames();
    let frame = frames.next().unwrap();
    assert_eq!(frame.dimensions(), (4, 3));
    assert_eq!(*frame.get_pixel(0, 0), Rgb([200, 100, 50]));
    assert!(frames.next().is_none());
  }

  #[test]
  fn wrong_scheme_is_rejected() {
    let url = Url::parse("folder:///tmp/out").unwrap();
    assert!(matches!(
      ImageFileInput::from_url(&url),
      Err(ImageFileInputError::SchemaMismatch { .. })
    ));
  }

  #[test]
  fn unsupported_extension_is_rejected() {
    assert!(matches!(
      ImageFileInput::open("/tmp/setup.bmp"),
      Err(ImageFileInputError::UnsupportedFormat(_))
    ));
  }

  #[test]
  fn uploaded_bytes_are_converted_to_rgb() {
    let rgba = RgbaImage::from_pixel(2, 2, Rgba([10, 20, 30, 40]));
    let mut bytes = Vec::new();
    rgba.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png).unwrap();

    let input = ImageFileInput::from_bytes(&bytes).unwrap();
    let image = input.image().unwrap();
    assert_eq!(*image.get_pixel(1, 1), Rgb([10, 20, 30]));

    assert!(ImageFileInput::from_bytes(&encoded(ImageFormat::Jpeg)).is_ok());
  }

  #[test]
  fn uploaded_bytes_in_other_formats_are_rejected() {
    assert!(matches!(
      ImageFileInput::from_bytes(&encoded(ImageFormat::Bmp)),
      Err(ImageFileInputError::UnsupportedFormat(_))
    ));
    assert!(matches!(
      ImageFileInput::from_bytes(b"not an image"),
      Err(ImageFileInputError::UnsupportedFormat(_))
    ));
  }
}
