// 该文件是 Detect My Setup 项目的一部分。
// src/output/directory_record.rs - 按日期目录记录结果
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

use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use chrono::{Datelike, Utc};
use image::RgbImage;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::{FromUrl, FromUrlWithScheme, inference::Inference, output::Render};

#[derive(Error, Debug)]
pub enum DirectoryRecordOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("未知的记录格式: {0}")]
  UnknownRecordFormat(String),
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 错误: {0}")]
  JsonError(#[from] serde_json::Error),
}

/// 记录文件格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordFormat {
  /// 每行 `名称, 置信度, x_min, y_min, x_max, y_max`
  Name,
  /// 同上，但第一列为类别索引
  Id,
  Json,
}

impl RecordFormat {
  fn parse(value: &str) -> Result<Self, DirectoryRecordOutputError> {
    match value {
      "name" => Ok(RecordFormat::Name),
      "id" => Ok(RecordFormat::Id),
      "json" => Ok(RecordFormat::Json),
      other => Err(DirectoryRecordOutputError::UnknownRecordFormat(
        other.to_string(),
      )),
    }
  }

  fn write(&self, inference: &Inference, path: &Path) -> Result<(), DirectoryRecordOutputError> {
    let items = inference.instances.items.iter().zip(&inference.labels);
    match self {
      RecordFormat::Name | RecordFormat::Id => {
        let lines: Vec<String> = items
          .map(|(item, label)| {
            let name = match self {
              RecordFormat::Id => item.class_id.to_string(),
              _ => label.clone(),
            };
            format!(
              "{}, {:.4}, {:.4}, {:.4}, {:.4}, {:.4}",
              name, item.score, item.bbox[0], item.bbox[1], item.bbox[2], item.bbox[3]
            )
          })
          .collect();
        std::fs::write(path.with_extension("txt"), lines.join("\n"))?;
      }
      RecordFormat::Json => {
        let entries: Vec<RecordEntry> = items
          .map(|(item, label)| RecordEntry {
            label,
            class_id: item.class_id,
            score: item.score,
            bbox: item.bbox,
          })
          .collect();
        let json = serde_json::to_string_pretty(&entries)?;
        std::fs::write(path.with_extension("json"), json)?;
      }
    }
    Ok(())
  }
}

#[derive(Serialize)]
struct RecordEntry<'a> {
  label: &'a str,
  class_id: u32,
  score: f32,
  bbox: [f32; 4],
}

/// 将结果写入 `目录/年/月/日/时-分-秒-序号.png`
///
/// 未指定 `record` 时保存绘制后的图像；指定时保存原始帧和记录文件。
/// 默认只记录检测到物体的帧，`always` 参数会记录所有帧。
pub struct DirectoryRecordOutput {
  directory: PathBuf,
  record: Option<RecordFormat>,
  frame_counter: Mutex<u16>,
  always: bool,
}

impl FromUrlWithScheme for DirectoryRecordOutput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(DirectoryRecordOutputError::SchemeMismatch);
    }

    let record = uri
      .query_pairs()
      .find(|(k, _)| k == "record")
      .map(|(_, v)| RecordFormat::parse(&v))
      .transpose()?;
    let always = uri.query_pairs().any(|(k, _)| k == "always");

    Ok(DirectoryRecordOutput {
      directory: PathBuf::from(uri.path()),
      record,
      frame_counter: Mutex::new(0),
      always,
    })
  }
}

impl DirectoryRecordOutput {
  pub fn record_format(&self) -> Option<RecordFormat> {
    self.record
  }

  fn frame_id(&self) -> u16 {
    let mut counter = self
      .frame_counter
      .lock()
      .unwrap_or_else(PoisonError::into_inner);
    *counter = counter.wrapping_add(1);
    *counter
  }

  fn frame_path(&self) -> Result<PathBuf, DirectoryRecordOutputError> {
    let now = Utc::now();
    let directory = self
      .directory
      .join(now.year().to_string())
      .join(format!("{:02}", now.month()))
      .join(format!("{:02}", now.day()));
    std::fs::create_dir_all(&directory)?;

    Ok(directory.join(format!(
      "{}-{:04X}.png",
      now.format("%H-%M-%S"),
      self.frame_id()
    )))
  }
}

impl Render<RgbImage, Inference> for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn render_result(&self, frame: &RgbImage, result: &Inference) -> Result<(), Self::Error> {
    if !self.always && result.instances.is_empty() {
      debug!("未检测到物体，跳过记录");
      return Ok(());
    }

    let path = self.frame_path()?;
    match self.record {
      None => result.annotated.save(&path)?,
      Some(format) => {
        frame.save(&path)?;
        format.write(result, &path)?;
      }
    }
    info!("记录结果到: {}", path.display());
    Ok(())
  }
}
