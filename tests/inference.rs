// 该文件是 Detect My Setup 项目的一部分。
// tests/inference.rs - 推理与绘制的整体行为
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

use std::convert::Infallible;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use image::{Rgb, RgbImage};

use detect_my_setup::{
  DetectItem, DetectResult, LabelTable, Model,
  inference::annotate,
  model::{PredictorCache, PredictorKey},
  output::Visualizer,
};

/// 按阈值过滤固定检测结果的假检测器
struct FakePredictor {
  detections: Vec<DetectItem>,
  threshold: f32,
}

impl FakePredictor {
  fn new(scores: &[f32], threshold: f32) -> Self {
    let detections = scores
      .iter()
      .enumerate()
      .map(|(i, &score)| DetectItem {
        class_id: (i % 6) as u32,
        score,
        bbox: [
          10.0 * i as f32,
          10.0 * i as f32,
          10.0 * i as f32 + 30.0,
          10.0 * i as f32 + 30.0,
        ],
      })
      .collect();
    Self {
      detections,
      threshold,
    }
  }

  fn passing(&self) -> Vec<DetectItem> {
    self
      .detections
      .iter()
      .filter(|item| item.score >= self.threshold)
      .cloned()
      .collect()
  }
}

impl Model for FakePredictor {
  type Input = RgbImage;
  type Output = DetectResult;
  type Error = Infallible;

  fn infer(&self, _input: &RgbImage) -> Result<DetectResult, Infallible> {
    Ok(DetectResult::from(self.passing()))
  }
}

fn desk_photo() -> RgbImage {
  RgbImage::from_fn(320, 240, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, 90]))
}

#[test]
fn returned_count_is_min_of_n_and_passing() {
  let image = desk_photo();
  let labels = LabelTable::desk_setup();
  let visualizer = Visualizer::default();
  let scores = [0.99, 0.95, 0.9, 0.8, 0.7, 0.65, 0.6, 0.55, 0.52, 0.51, 0.5, 0.4, 0.2];

  for passing in [0usize, 1, 3, 5, 11] {
    let model = FakePredictor::new(&scores[..passing.min(scores.len())], 0.5);
    let expected_passing = model.passing().len();
    for n in 1..=10 {
      let inference = annotate(&model, &image, n, &labels, &visualizer).unwrap();
      assert_eq!(inference.instances.len(), n.min(expected_passing));
      assert_eq!(inference.labels.len(), inference.instances.len());
    }
  }
}

#[test]
fn instances_are_a_prefix_in_detector_order() {
  // 故意不按置信度排序，验证不会重新排序
  let model = FakePredictor {
    detections: vec![
      DetectItem {
        class_id: 2,
        score: 0.6,
        bbox: [0.0, 0.0, 10.0, 10.0],
      },
      DetectItem {
        class_id: 0,
        score: 0.9,
        bbox: [5.0, 5.0, 20.0, 20.0],
      },
      DetectItem {
        class_id: 5,
        score: 0.7,
        bbox: [8.0, 8.0, 30.0, 30.0],
      },
    ],
    threshold: 0.5,
  };
  let full = model.infer(&desk_photo()).unwrap();

  let inference = annotate(
    &model,
    &desk_photo(),
    2,
    &LabelTable::desk_setup(),
    &Visualizer::default(),
  )
  .unwrap();
  assert_eq!(inference.instances.items.as_ref(), &full.items[..2]);
  assert_eq!(inference.labels, ["Computer mouse", "Computer keyboard"]);
}

#[test]
fn no_detections_yield_the_scaled_input() {
  let image = desk_photo();
  let model = FakePredictor::new(&[0.3, 0.2], 0.5);
  let visualizer = Visualizer::default();

  let inference = annotate(&model, &image, 5, &LabelTable::desk_setup(), &visualizer).unwrap();

  assert!(inference.instances.is_empty());
  assert!(inference.labels.is_empty());
  assert_eq!(inference.annotated, visualizer.scale_image(&image));
  assert_eq!(inference.annotated.dimensions(), (96, 72));
}

#[test]
fn three_qualifying_detections_with_n_five() {
  let model = FakePredictor::new(&[0.92, 0.81, 0.5, 0.49, 0.1], 0.5);

  let inference = annotate(
    &model,
    &desk_photo(),
    5,
    &LabelTable::desk_setup(),
    &Visualizer::default(),
  )
  .unwrap();

  assert_eq!(inference.instances.len(), 3);
  assert!(inference.instances.items.iter().all(|item| item.score >= 0.5));
  assert_ne!(inference.annotated, Visualizer::default().scale_image(&desk_photo()));
}

#[test]
fn known_class_index_maps_to_expected_label() {
  // 模型的类别 4 应为 Laptop，标签表顺序变化会导致此测试失败
  let model = FakePredictor {
    detections: vec![DetectItem {
      class_id: 4,
      score: 0.97,
      bbox: [40.0, 40.0, 200.0, 160.0],
    }],
    threshold: 0.5,
  };

  let inference = annotate(
    &model,
    &desk_photo(),
    1,
    &LabelTable::desk_setup(),
    &Visualizer::default(),
  )
  .unwrap();
  assert_eq!(inference.labels, ["Laptop"]);
}

#[test]
fn cached_predictor_is_reused() {
  let cache = PredictorCache::new();
  let loads = AtomicUsize::new(0);
  let load = |key: &PredictorKey| {
    loads.fetch_add(1, Ordering::SeqCst);
    Ok::<_, Infallible>(FakePredictor::new(&[0.9, 0.8], key.threshold()))
  };

  let first = cache
    .get_or_try_insert_with(PredictorKey::new("model/config.toml", "model/model_final.onnx", 0.5), load)
    .unwrap();
  let second = cache
    .get_or_try_insert_with(PredictorKey::new("model/config.toml", "model/model_final.onnx", 0.5), load)
    .unwrap();

  assert!(Arc::ptr_eq(&first, &second));
  assert_eq!(loads.load(Ordering::SeqCst), 1);

  let image = desk_photo();
  let inference = annotate(
    first.as_ref(),
    &image,
    5,
    &LabelTable::desk_setup(),
    &Visualizer::default(),
  )
  .unwrap();
  assert_eq!(inference.instances.len(), 2);
}
