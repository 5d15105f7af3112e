// 该文件是 Detect My Setup 项目的一部分。
// src/label.rs - 类别标签表
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
use std::sync::Arc;

use serde::Deserialize;
use tracing::{info, warn};

use crate::config::ConfigError;

/// 桌面设备类别（已按字母排序）
pub const DESK_SETUP_CLASSES: [&str; 6] = [
  "Computer keyboard",
  "Computer monitor",
  "Computer mouse",
  "Lamp",
  "Laptop",
  "Microphone",
];

/// 类别索引到名称的映射
///
/// 名称在构造时按字母排序，模型输出的类别索引按位置查表。
/// 若模型训练时使用了不同的类别顺序，索引与名称会静默错位。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelTable {
  names: Arc<[String]>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct LabelFile {
  names: Vec<String>,
}

impl Default for LabelTable {
  fn default() -> Self {
    Self::desk_setup()
  }
}

impl LabelTable {
  pub fn new<I, S>(names: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    let mut names: Vec<String> = names.into_iter().map(Into::into).collect();
    names.sort();
    Self {
      names: names.into(),
    }
  }

  pub fn desk_setup() -> Self {
    Self::new(DESK_SETUP_CLASSES)
  }

  /// 从 TOML 文件读取，格式为 `names = ["..", ..]`
  pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
    let path = path.as_ref();
    info!("加载标签表: {}", path.display());
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
      path: path.to_path_buf(),
      source,
    })?;
    let file: LabelFile = toml::from_str(&text)?;
    if file.names.is_empty() {
      return Err(ConfigError::Invalid(format!(
        "标签表为空: {}",
        path.display()
      )));
    }
    Ok(Self::new(file.names))
  }

  pub fn len(&self) -> usize {
    self.names.len()
  }

  pub fn is_empty(&self) -> bool {
    self.names.is_empty()
  }

  pub fn names(&self) -> &[String] {
    &self.names
  }

  pub fn get(&self, class_id: u32) -> Option<&str> {
    self.names.get(class_id as usize).map(String::as_str)
  }

  /// 查表得到可显示的名称，越界索引显示为 `class <id>`
  pub fn label(&self, class_id: u32) -> String {
    match self.get(class_id) {
      Some(name) => name.to_string(),
      None => {
        warn!(
          "类别索引 {} 超出标签表范围 (共 {} 个类别)",
          class_id,
          self.names.len()
        );
        format!("class {}", class_id)
      }
    }
  }
}
