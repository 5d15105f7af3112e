// 该文件是 Detect My Setup 项目的一部分。
// src/inference.rs - 单张图像推理与绘制
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

use image::RgbImage;
use thiserror::Error;
use tracing::{debug, info};

use crate::{
  label::LabelTable,
  model::{DetectResult, Model, OnnxError, create_predictor},
  output::{Visualizer, VisualizerError},
};

pub const DEFAULT_THRESHOLD: f32 = 0.5;
pub const DEFAULT_TOP_N: usize = 5;

#[derive(Error, Debug)]
pub enum InferenceError {
  #[error("绘制实例数量必须为正整数")]
  InvalidCount,
  #[error("推理器创建失败: {0}")]
  Predictor(#[from] OnnxError),
  #[error("可视化工具创建失败: {0}")]
  Visualizer(#[from] VisualizerError),
  #[error("模型推理失败: {0}")]
  Model(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// 推理结果
#[derive(Debug, Clone)]
pub struct Inference {
  /// 绘制了前 n 个实例的缩放图像
  pub annotated: RgbImage,
  /// 前 n 个实例，顺序与检测器输出一致
  pub instances: DetectResult,
  /// 与 `instances` 一一对应的类别名称
  pub labels: Vec<String>,
}

/// 运行一次检测，截取前 `n` 个实例并绘制
pub fn annotate<M>(
  model: &M,
  image: &RgbImage,
  n: usize,
  labels: &LabelTable,
  visualizer: &Visualizer,
) -> Result<Inference, InferenceError>
where
  M: Model<Input = RgbImage, Output = DetectResult>,
  M::Error: std::error::Error + Send + Sync + 'static,
{
  if n == 0 {
    return Err(InferenceError::InvalidCount);
  }

  let detections = model
    .infer(image)
    .map_err(|e| InferenceError::Model(Box::new(e)))?;
  let instances = detections.top_n(n);
  debug!(
    "检测到 {} 个实例，绘制前 {} 个",
    detections.len(),
    instances.len()
  );

  let annotated = visualizer.draw_instance_predictions(image, &instances, labels);
  let names = instances
    .items
    .iter()
    .map(|item| labels.label(item.class_id))
    .collect();

  Ok(Inference {
    annotated,
    instances,
    labels: names,
  })
}

/// 使用缓存的推理器处理一张图像
///
/// 推理器按 (config, weights, threshold) 缓存，缩放比例与字体取自生效配置。
pub fn make_inference(
  image: &RgbImage,
  config: impl AsRef<Path>,
  weights: impl AsRef<Path>,
  threshold: f32,
  n: usize,
  labels: &LabelTable,
) -> Result<Inference, InferenceError> {
  // 提前检查，避免为无效参数加载权重
  if n == 0 {
    return Err(InferenceError::InvalidCount);
  }

  let (config, predictor) = create_predictor(config, weights, threshold)?;
  let visualizer = Visualizer::from_config(&config.visualizer)?;
  annotate(predictor.as_ref(), image, n, labels, &visualizer)
}

/// 固定参数的推理入口，可直接交给任务执行
#[derive(Debug, Clone)]
pub struct InferenceAdapter {
  config: PathBuf,
  weights: PathBuf,
  threshold: f32,
  n: usize,
  labels: LabelTable,
}

impl InferenceAdapter {
  pub fn new(config: impl Into<PathBuf>, weights: impl Into<PathBuf>) -> Self {
    Self {
      config: config.into(),
      weights: weights.into(),
      threshold: DEFAULT_THRESHOLD,
      n: DEFAULT_TOP_N,
      labels: LabelTable::default(),
    }
  }

  pub fn with_threshold(mut self, threshold: f32) -> Self {
    self.threshold = threshold;
    self
  }

  pub fn with_top_n(mut self, n: usize) -> Self {
    self.n = n;
    self
  }

  pub fn with_labels(mut self, labels: LabelTable) -> Self {
    self.labels = labels;
    self
  }
}

impl Model for InferenceAdapter {
  type Input = RgbImage;
  type Output = Inference;
  type Error = InferenceError;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    let inference = make_inference(
      input,
      &self.config,
      &self.weights,
      self.threshold,
      self.n,
      &self.labels,
    )?;
    info!("检测结果: {:?}", inference.labels);
    Ok(inference)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::DetectItem;

  #[derive(Debug, Error)]
  #[error("boom")]
  struct Boom;

  struct Failing;

  impl Model for Failing {
    type Input = RgbImage;
    type Output = DetectResult;
    type Error = Boom;

    fn infer(&self, _input: &Self::Input) -> Result<Self::Output, Self::Error> {
      Err(Boom)
    }
  }

  struct Fixed(Vec<DetectItem>);

  impl Model for Fixed {
    type Input = RgbImage;
    type Output = DetectResult;
    type Error = Boom;

    fn infer(&self, _input: &Self::Input) -> Result<Self::Output, Self::Error> {
      Ok(DetectResult::from(self.0.clone()))
    }
  }

  #[test]
  fn zero_count_is_rejected() {
    let err = annotate(
      &Fixed(vec![]),
      &RgbImage::new(10, 10),
      0,
      &LabelTable::default(),
      &Visualizer::default(),
    )
    .unwrap_err();
    assert!(matches!(err, InferenceError::InvalidCount));

    let err = make_inference(
      &RgbImage::new(10, 10),
      "model/config.toml",
      "model/model_final.onnx",
      0.5,
      0,
      &LabelTable::default(),
    )
    .unwrap_err();
    assert!(matches!(err, InferenceError::InvalidCount));
  }

  #[test]
  fn model_failure_propagates() {
    let err = annotate(
      &Failing,
      &RgbImage::new(10, 10),
      5,
      &LabelTable::default(),
      &Visualizer::default(),
    )
    .unwrap_err();
    assert!(matches!(err, InferenceError::Model(_)));
    assert_eq!(err.to_string(), "模型推理失败: boom");
  }

  #[test]
  fn labels_follow_instances() {
    let model = Fixed(vec![
      DetectItem {
        class_id: 4,
        score: 0.95,
        bbox: [0.0, 0.0, 5.0, 5.0],
      },
      DetectItem {
        class_id: 1,
        score: 0.85,
        bbox: [1.0, 1.0, 8.0, 8.0],
      },
    ]);
    let inference = annotate(
      &model,
      &RgbImage::new(10, 10),
      5,
      &LabelTable::desk_setup(),
      &Visualizer::new(1.0),
    )
    .unwrap();
    assert_eq!(inference.labels, ["Laptop", "Computer monitor"]);
    assert_eq!(inference.instances.class_ids(), vec![4, 1]);
  }

  #[test]
  fn factory_errors_surface_through_the_adapter() {
    let adapter = InferenceAdapter::new("/nonexistent/config.toml", "/nonexistent/model.onnx");
    let err = adapter.infer(&RgbImage::new(4, 4)).unwrap_err();
    assert!(matches!(err, InferenceError::Predictor(_)));

    let adapter = adapter.with_threshold(7.0);
    assert!(matches!(
      adapter.infer(&RgbImage::new(4, 4)),
      Err(InferenceError::Predictor(OnnxError::Config(_)))
    ));
  }
}
