// 该文件是 Detect My Setup 项目的一部分。
// src/model.rs - 模型
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

use serde::Serialize;

pub trait Model {
  type Input;
  type Output;
  type Error;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error>;
}

impl<T: Model + ?Sized> Model for &T {
  type Input = T::Input;
  type Output = T::Output;
  type Error = T::Error;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    (**self).infer(input)
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectItem {
  pub class_id: u32,
  pub score: f32,
  pub bbox: [f32; 4], // [x_min, y_min, x_max, y_max]，原图像素坐标
}

/// 一次检测的全部结果，按置信度降序排列
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DetectResult {
  pub items: Box<[DetectItem]>,
}

impl DetectResult {
  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  /// 保留前 n 个实例，不重新排序
  pub fn top_n(&self, n: usize) -> DetectResult {
    let end = n.min(self.items.len());
    DetectResult {
      items: self.items[..end].into(),
    }
  }

  pub fn class_ids(&self) -> Vec<u32> {
    self.items.iter().map(|item| item.class_id).collect()
  }
}

impl From<Vec<DetectItem>> for DetectResult {
  fn from(items: Vec<DetectItem>) -> Self {
    Self {
      items: items.into_boxed_slice(),
    }
  }
}

mod cache;
mod onnx;
pub use self::cache::{PredictorCache, PredictorKey};
pub use self::onnx::{OnnxError, OnnxPredictor, create_predictor};

#[cfg(test)]
mod tests {
  use super::*;

  fn item(class_id: u32, score: f32) -> DetectItem {
    DetectItem {
      class_id,
      score,
      bbox: [0.0, 0.0, 1.0, 1.0],
    }
  }

  #[test]
  fn top_n_is_a_prefix() {
    let result = DetectResult::from(vec![item(4, 0.9), item(1, 0.8), item(0, 0.6)]);

    let top = result.top_n(2);
    assert_eq!(top.items.as_ref(), &result.items[..2]);
    assert_eq!(top.class_ids(), vec![4, 1]);

    assert_eq!(result.top_n(10), result);
    assert!(DetectResult::default().top_n(5).is_empty());
  }
}
