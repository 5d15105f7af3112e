// 该文件是 Detect My Setup 项目的一部分。
// src/output/visualizer.rs - 检测结果可视化
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

use std::path::PathBuf;
use std::sync::LazyLock;

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage, imageops::FilterType};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use thiserror::Error;
use tracing::{debug, info};

use crate::{
  config::VisualizerConfig,
  label::LabelTable,
  model::{DetectItem, DetectResult},
};

const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
const DEFAULT_FONT_DATA: &[u8] = include_bytes!("../../assets/DejaVuSans.ttf");
const LABEL_TEXT_VERTICAL_PADDING: i32 = 2;

#[derive(Error, Debug)]
pub enum VisualizerError {
  #[error("无法读取字体文件 {path}: {source}")]
  FontIo {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("字体文件无效: {0}")]
  InvalidFont(String),
}

/// 可视化工具
pub struct Visualizer {
  /// 输出图像相对原图的缩放比例
  scale: f32,
  /// 边框线宽
  line_width: u32,
  font: FontArc,
  font_scale: PxScale,
}

static DEFAULT_FONT: LazyLock<FontArc> =
  LazyLock::new(|| FontArc::try_from_slice(DEFAULT_FONT_DATA).expect("无法加载内置字体"));

impl Default for Visualizer {
  fn default() -> Self {
    Self::new(VisualizerConfig::default().scale)
  }
}

impl Visualizer {
  pub fn new(scale: f32) -> Self {
    let defaults = VisualizerConfig::default();
    Self {
      scale,
      line_width: defaults.line_width,
      font: DEFAULT_FONT.clone(),
      font_scale: PxScale::from(defaults.font_size),
    }
  }

  pub fn from_config(config: &VisualizerConfig) -> Result<Self, VisualizerError> {
    let mut visualizer = Self::new(config.scale)
      .with_line_width(config.line_width)
      .with_font_size(config.font_size);

    // 未配置字体时使用内置的 DejaVu Sans
    if let Some(path) = &config.font {
      info!("加载标签字体: {}", path.display());
      let data = std::fs::read(path).map_err(|source| VisualizerError::FontIo {
        path: path.clone(),
        source,
      })?;
      let font =
        FontArc::try_from_vec(data).map_err(|e| VisualizerError::InvalidFont(e.to_string()))?;
      visualizer = visualizer.with_font(font);
    }

    Ok(visualizer)
  }

  pub fn with_font(mut self, font: FontArc) -> Self {
    self.font = font;
    self
  }

  pub fn with_font_size(mut self, size: f32) -> Self {
    self.font_scale = PxScale::from(size);
    self
  }

  pub fn with_line_width(mut self, width: u32) -> Self {
    self.line_width = width.max(1);
    self
  }

  /// 按比例缩放后的原图副本
  pub fn scale_image(&self, image: &RgbImage) -> RgbImage {
    let (width, height) = image.dimensions();
    let new_w = ((width as f32 * self.scale).round() as u32).max(1);
    let new_h = ((height as f32 * self.scale).round() as u32).max(1);
    if (new_w, new_h) == (width, height) {
      return image.clone();
    }
    image::imageops::resize(image, new_w, new_h, FilterType::Triangle)
  }

  /// 在缩放后的原图副本上绘制全部实例
  pub fn draw_instance_predictions(
    &self,
    image: &RgbImage,
    result: &DetectResult,
    labels: &LabelTable,
  ) -> RgbImage {
    let mut canvas = self.scale_image(image);
    debug!(
      "绘制 {} 个实例，画布 {}x{}",
      result.len(),
      canvas.width(),
      canvas.height()
    );
    for item in result.items.iter() {
      let label = format!("{} {:.0}%", labels.label(item.class_id), item.score * 100.0);
      self.draw_bbox_with_label(&mut canvas, item, &label);
    }
    canvas
  }

  fn draw_bbox_with_label(&self, image: &mut RgbImage, item: &DetectItem, label: &str) {
    let color = class_color(item.class_id);
    let (w, h) = (image.width() as i32, image.height() as i32);

    let x_min = ((item.bbox[0] * self.scale).floor() as i32).clamp(0, w - 1);
    let y_min = ((item.bbox[1] * self.scale).floor() as i32).clamp(0, h - 1);
    let x_max = ((item.bbox[2] * self.scale).ceil() as i32).clamp(0, w - 1);
    let y_max = ((item.bbox[3] * self.scale).ceil() as i32).clamp(0, h - 1);

    if x_min >= x_max || y_min >= y_max {
      return;
    }

    // 逐层向内绘制以加粗边框
    for inset in 0..self.line_width as i32 {
      let width = x_max - x_min + 1 - 2 * inset;
      let height = y_max - y_min + 1 - 2 * inset;
      if width <= 0 || height <= 0 {
        break;
      }
      let rect = Rect::at(x_min + inset, y_min + inset).of_size(width as u32, height as u32);
      draw_hollow_rect_mut(image, rect, color);
    }

    let font = &self.font;
    let (text_w, text_h) = text_size(self.font_scale, font, label);
    let label_h = text_h as i32 + 2 * LABEL_TEXT_VERTICAL_PADDING;
    let label_x = x_min;
    let label_y = (y_min - label_h).max(0);
    let label_w = (text_w as i32).min(w - label_x);

    if label_w > 0 && label_h > 0 {
      let rect = Rect::at(label_x, label_y).of_size(label_w as u32, label_h as u32);
      draw_filled_rect_mut(image, rect, color);
      draw_text_mut(
        image,
        TEXT_COLOR,
        label_x,
        label_y + LABEL_TEXT_VERTICAL_PADDING,
        self.font_scale,
        font,
        label,
      );
    }
  }
}

/// 每个类别固定一种颜色，色相按黄金角分布
fn class_color(class_id: u32) -> Rgb<u8> {
  let hue = (class_id as f32 * 137.508) % 360.0;
  hsv_to_rgb(hue, 0.8, 0.9)
}

fn hsv_to_rgb(h: f32, s: f32, v: f32) -> Rgb<u8> {
  let c = v * s;
  let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
  let m = v - c;

  let (r, g, b) = if h < 60.0 {
    (c, x, 0.0)
  } else if h < 120.0 {
    (x, c, 0.0)
  } else if h < 180.0 {
    (0.0, c, x)
  } else if h < 240.0 {
    (0.0, x, c)
  } else if h < 300.0 {
    (x, 0.0, c)
  } else {
    (c, 0.0, x)
  };

  Rgb([
    ((r + m) * 255.0) as u8,
    ((g + m) * 255.0) as u8,
    ((b + m) * 255.0) as u8,
  ])
}
