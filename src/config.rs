// 该文件是 Detect My Setup 项目的一部分。
// src/config.rs - 模型配置
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

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info};

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("无法读取文件 {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("配置文件格式错误: {0}")]
  Parse(#[from] toml::de::Error),
  #[error("置信度阈值必须位于 [0, 1] 区间内, 实际为 {0}")]
  InvalidThreshold(f32),
  #[error("配置无效: {0}")]
  Invalid(String),
}

/// 推理设备
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
  /// 创建时根据可用性选择
  #[default]
  Auto,
  Cpu,
  Cuda,
}

impl Device {
  /// 将 `Auto` 解析为当前可用的设备，其余保持不变
  pub fn resolve(self) -> Device {
    match self {
      Device::Auto => {
        if cuda_available() {
          Device::Cuda
        } else {
          Device::Cpu
        }
      }
      other => other,
    }
  }
}

#[cfg(feature = "cuda")]
fn cuda_available() -> bool {
  use ort::ep::{CUDA, ExecutionProvider};

  CUDA::is_available().unwrap_or(false)
}

#[cfg(not(feature = "cuda"))]
fn cuda_available() -> bool {
  false
}

/// 输入张量的通道顺序
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelOrder {
  #[default]
  Bgr,
  Rgb,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InputConfig {
  pub name: String,
  pub channel_order: ChannelOrder,
  /// 缩放后短边长度
  pub min_size: u32,
  /// 缩放后长边上限
  pub max_size: u32,
}

impl Default for InputConfig {
  fn default() -> Self {
    Self {
      name: "image".to_string(),
      channel_order: ChannelOrder::Bgr,
      min_size: 800,
      max_size: 1333,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
  pub boxes: String,
  pub classes: String,
  pub scores: String,
}

impl Default for OutputConfig {
  fn default() -> Self {
    Self {
      boxes: "boxes".to_string(),
      classes: "classes".to_string(),
      scores: "scores".to_string(),
    }
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
  pub device: Device,
  pub intra_threads: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VisualizerConfig {
  /// 绘制前对原图的缩放比例
  pub scale: f32,
  /// 标签字体，未设置时使用内置的 DejaVu Sans
  pub font: Option<PathBuf>,
  pub font_size: f32,
  pub line_width: u32,
}

impl Default for VisualizerConfig {
  fn default() -> Self {
    Self {
      scale: 0.3,
      font: None,
      font_size: 16.0,
      line_width: 2,
    }
  }
}

/// 模型配置
///
/// 文件中未出现的字段取默认值。`weights`、`score_threshold` 与
/// `runtime.device` 会在创建推理器时被覆盖为实际使用的值。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModelConfig {
  pub weights: PathBuf,
  pub score_threshold: f32,
  pub input: InputConfig,
  pub output: OutputConfig,
  pub runtime: RuntimeConfig,
  pub visualizer: VisualizerConfig,
}

impl Default for ModelConfig {
  fn default() -> Self {
    Self {
      weights: PathBuf::new(),
      score_threshold: 0.5,
      input: InputConfig::default(),
      output: OutputConfig::default(),
      runtime: RuntimeConfig::default(),
      visualizer: VisualizerConfig::default(),
    }
  }
}

pub fn validate_threshold(threshold: f32) -> Result<f32, ConfigError> {
  if threshold.is_finite() && (0.0..=1.0).contains(&threshold) {
    Ok(threshold)
  } else {
    error!("置信度阈值无效: {}", threshold);
    Err(ConfigError::InvalidThreshold(threshold))
  }
}

impl ModelConfig {
  /// 读取配置文件并与默认值合并
  pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
    let path = path.as_ref();
    info!("加载模型配置: {}", path.display());
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
      path: path.to_path_buf(),
      source,
    })?;
    Self::from_toml_str(&text)
  }

  pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
    let config: ModelConfig = toml::from_str(text)?;
    config.validate()?;
    debug!("模型配置: {:?}", config);
    Ok(config)
  }

  pub fn with_weights(mut self, weights: impl Into<PathBuf>) -> Self {
    self.weights = weights.into();
    self
  }

  pub fn with_score_threshold(mut self, threshold: f32) -> Result<Self, ConfigError> {
    self.score_threshold = validate_threshold(threshold)?;
    Ok(self)
  }

  pub fn with_device(mut self, device: Device) -> Self {
    self.runtime.device = device;
    self
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    validate_threshold(self.score_threshold)?;

    if self.input.min_size == 0 {
      return Err(ConfigError::Invalid("input.min_size 必须大于 0".to_string()));
    }
    if self.input.max_size < self.input.min_size {
      return Err(ConfigError::Invalid(format!(
        "input.max_size ({}) 不能小于 input.min_size ({})",
        self.input.max_size, self.input.min_size
      )));
    }
    let scale = self.visualizer.scale;
    if !(scale.is_finite() && scale > 0.0 && scale <= 1.0) {
      return Err(ConfigError::Invalid(format!(
        "visualizer.scale 必须位于 (0, 1] 区间内, 实际为 {}",
        scale
      )));
    }
    if !(self.visualizer.font_size > 0.0) {
      return Err(ConfigError::Invalid("visualizer.font_size 必须大于 0".to_string()));
    }
    Ok(())
  }
}
