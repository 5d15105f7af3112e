// 该文件是 Detect My Setup 项目的一部分。
// src/model/onnx.rs - ONNX Runtime 检测模型
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
use std::sync::{Arc, LazyLock, Mutex, PoisonError};

use image::{RgbImage, imageops::FilterType};
use ndarray::Array3;
use ort::{
  environment::Environment,
  session::{
    Session,
    builder::{GraphOptimizationLevel, SessionBuilder},
  },
  value::TensorRef,
};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::{
  config::{ChannelOrder, ConfigError, Device, ModelConfig, validate_threshold},
  model::{DetectItem, DetectResult, Model, PredictorCache, PredictorKey},
};

#[derive(Error, Debug)]
pub enum OnnxError {
  #[error("配置错误: {0}")]
  Config(#[from] ConfigError),
  #[error("权重文件不存在: {0}")]
  WeightsNotFound(PathBuf),
  #[error("ONNX Runtime 错误: {0}")]
  Runtime(#[from] ort::Error),
  #[error("模型缺少输出: {0}")]
  MissingOutput(String),
  #[error("模型输出形状不匹配: {0}")]
  ShapeMismatch(String),
  #[error("当前构建未启用 cuda 特性")]
  CudaUnavailable,
  #[error("输入图像为空")]
  EmptyImage,
}

static ENVIRONMENT: Mutex<Option<Environment>> = Mutex::new(None);

/// 进程内唯一的 ONNX Runtime 环境，首次创建推理器时初始化
fn environment() -> Result<Environment, OnnxError> {
  let mut slot = ENVIRONMENT.lock().unwrap_or_else(PoisonError::into_inner);
  if let Some(env) = slot.as_ref() {
    return Ok(env.clone());
  }
  info!("初始化 ONNX Runtime 环境");
  let env = ort::init().with_name("detect-my-setup").build()?;
  *slot = Some(env.clone());
  Ok(env)
}

/// 绑定了设备、权重与阈值的检测器
pub struct OnnxPredictor {
  config: ModelConfig,
  session: Mutex<Session>,
}

impl OnnxPredictor {
  /// `config.runtime.device` 应已解析为具体设备
  pub fn new(config: ModelConfig) -> Result<Self, OnnxError> {
    config.validate()?;

    let weights = &config.weights;
    if !weights.is_file() {
      error!("权重文件不存在: {}", weights.display());
      return Err(OnnxError::WeightsNotFound(weights.clone()));
    }

    info!("加载模型权重: {}", weights.display());
    let env = environment()?;
    let mut builder = Session::builder(&env)?
      .with_optimization_level(GraphOptimizationLevel::Level3)
      .map_err(ort::Error::from)?;
    if let Some(threads) = config.runtime.intra_threads {
      builder = builder
        .with_intra_threads(threads)
        .map_err(ort::Error::from)?;
    }
    builder = register_device(builder, config.runtime.device)?;

    let session = builder.commit_from_file(weights)?;
    info!("模型加载完成");

    Ok(Self {
      config,
      session: Mutex::new(session),
    })
  }

  /// 生效的配置
  pub fn config(&self) -> &ModelConfig {
    &self.config
  }
}

impl std::fmt::Debug for OnnxPredictor {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("OnnxPredictor")
      .field("config", &self.config)
      .finish_non_exhaustive()
  }
}

fn register_device(builder: SessionBuilder, device: Device) -> Result<SessionBuilder, OnnxError> {
  match device {
    Device::Cuda => register_cuda(builder),
    Device::Cpu | Device::Auto => {
      info!("使用 CPU 执行推理");
      Ok(builder)
    }
  }
}

#[cfg(feature = "cuda")]
fn register_cuda(builder: SessionBuilder) -> Result<SessionBuilder, OnnxError> {
  info!("使用 CUDA 执行推理");
  let builder = builder
    .with_execution_providers([ort::ep::CUDA::default()
      .with_device_id(0)
      .build()
      .error_on_failure()])
    .map_err(ort::Error::from)?;
  Ok(builder)
}

#[cfg(not(feature = "cuda"))]
fn register_cuda(_builder: SessionBuilder) -> Result<SessionBuilder, OnnxError> {
  error!("配置要求 CUDA 设备，但当前构建未启用 cuda 特性");
  Err(OnnxError::CudaUnavailable)
}

/// 短边缩放到 `min_size`，长边不超过 `max_size`
pub(crate) fn resized_shape(width: u32, height: u32, min_size: u32, max_size: u32) -> (u32, u32) {
  let (w, h) = (width as f32, height as f32);
  let mut scale = min_size as f32 / w.min(h);
  if w.max(h) * scale > max_size as f32 {
    scale = max_size as f32 / w.max(h);
  }
  let new_w = (w * scale + 0.5).floor().max(1.0) as u32;
  let new_h = (h * scale + 0.5).floor().max(1.0) as u32;
  (new_w, new_h)
}

/// HWC 的 RGB 图像转为 CHW 浮点张量
pub(crate) fn to_tensor(image: &RgbImage, order: ChannelOrder) -> Array3<f32> {
  let (width, height) = image.dimensions();
  Array3::from_shape_fn((3, height as usize, width as usize), |(c, y, x)| {
    let channel = match order {
      ChannelOrder::Rgb => c,
      ChannelOrder::Bgr => 2 - c,
    };
    image.get_pixel(x as u32, y as u32)[channel] as f32
  })
}

/// 模型原始输出到检测结果
///
/// 边框从缩放后的坐标映射回原图，低于阈值的实例被丢弃，结果按置信度降序排列。
pub(crate) fn postprocess(
  boxes: &[f32],
  classes: &[i64],
  scores: &[f32],
  resized: (u32, u32),
  original: (u32, u32),
  threshold: f32,
) -> Result<DetectResult, OnnxError> {
  let count = scores.len();
  if classes.len() != count || boxes.len() != count * 4 {
    error!(
      "输出长度不一致: boxes={}, classes={}, scores={}",
      boxes.len(),
      classes.len(),
      count
    );
    return Err(OnnxError::ShapeMismatch(format!(
      "boxes={}, classes={}, scores={}",
      boxes.len(),
      classes.len(),
      count
    )));
  }

  let (orig_w, orig_h) = (original.0 as f32, original.1 as f32);
  let scale_x = orig_w / resized.0 as f32;
  let scale_y = orig_h / resized.1 as f32;

  let mut items = Vec::with_capacity(count);
  for (i, (&score, &class)) in scores.iter().zip(classes).enumerate() {
    if score < threshold {
      continue;
    }
    let Ok(class_id) = u32::try_from(class) else {
      warn!("忽略无效的类别索引: {}", class);
      continue;
    };
    let b = &boxes[i * 4..i * 4 + 4];
    items.push(DetectItem {
      class_id,
      score,
      bbox: [
        (b[0] * scale_x).clamp(0.0, orig_w),
        (b[1] * scale_y).clamp(0.0, orig_h),
        (b[2] * scale_x).clamp(0.0, orig_w),
        (b[3] * scale_y).clamp(0.0, orig_h),
      ],
    });
  }

  items.sort_by(|a, b| b.score.total_cmp(&a.score));
  debug!("检测到 {} 个物体 (共 {} 个候选)", items.len(), count);
  Ok(DetectResult::from(items))
}

impl Model for OnnxPredictor {
  type Input = RgbImage;
  type Output = DetectResult;
  type Error = OnnxError;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    let original = input.dimensions();
    if original.0 == 0 || original.1 == 0 {
      return Err(OnnxError::EmptyImage);
    }

    let input_config = &self.config.input;
    let resized_dims = resized_shape(
      original.0,
      original.1,
      input_config.min_size,
      input_config.max_size,
    );
    debug!(
      "输入尺寸 {}x{} 缩放至 {}x{}",
      original.0, original.1, resized_dims.0, resized_dims.1
    );
    let resized = image::imageops::resize(input, resized_dims.0, resized_dims.1, FilterType::Triangle);
    let tensor = to_tensor(&resized, input_config.channel_order);

    let (boxes, classes, scores) = {
      let input_tensor = TensorRef::from_array_view(tensor.view())?;
      let mut session = self.session.lock().unwrap_or_else(PoisonError::into_inner);

      debug!("执行模型推理");
      let outputs = session
        .run(ort::inputs![input_config.name.as_str() => input_tensor])?;

      let names = &self.config.output;
      let output = |name: &str| {
        outputs
          .get(name)
          .ok_or_else(|| OnnxError::MissingOutput(name.to_string()))
      };
      let (_, boxes) = output(&names.boxes)?.try_extract_tensor::<f32>()?;
      let (_, classes) = output(&names.classes)?.try_extract_tensor::<i64>()?;
      let (_, scores) = output(&names.scores)?.try_extract_tensor::<f32>()?;
      (boxes.to_vec(), classes.to_vec(), scores.to_vec())
    };

    postprocess(
      &boxes,
      &classes,
      &scores,
      resized_dims,
      original,
      self.config.score_threshold,
    )
  }
}

static PREDICTORS: LazyLock<PredictorCache<OnnxPredictor>> = LazyLock::new(PredictorCache::new);

fn load_predictor(key: &PredictorKey) -> Result<OnnxPredictor, OnnxError> {
  let config = ModelConfig::from_file(key.config())?
    .with_weights(key.weights())
    .with_score_threshold(key.threshold())?;
  let device = config.runtime.device.resolve();
  debug!("推理设备: {:?} -> {:?}", config.runtime.device, device);
  OnnxPredictor::new(config.with_device(device))
}

/// 获取 (生效配置, 推理器)
///
/// 相同的 (配置, 权重, 阈值) 返回同一个缓存实例，权重只加载一次。
pub fn create_predictor(
  config: impl AsRef<Path>,
  weights: impl AsRef<Path>,
  threshold: f32,
) -> Result<(ModelConfig, Arc<OnnxPredictor>), OnnxError> {
  let threshold = validate_threshold(threshold)?;
  let key = PredictorKey::new(config, weights, threshold);
  let predictor = PREDICTORS.get_or_try_insert_with(key, load_predictor)?;
  Ok((predictor.config().clone(), predictor))
}
