// 该文件是 Detect My Setup 项目的一部分。
// src/model/cache.rs - 推理器缓存
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

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info};

/// 缓存键：(配置, 权重, 阈值)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PredictorKey {
  config: PathBuf,
  weights: PathBuf,
  threshold_bits: u32,
}

impl PredictorKey {
  pub fn new(config: impl AsRef<Path>, weights: impl AsRef<Path>, threshold: f32) -> Self {
    Self {
      config: config.as_ref().to_path_buf(),
      weights: weights.as_ref().to_path_buf(),
      threshold_bits: threshold.to_bits(),
    }
  }

  pub fn config(&self) -> &Path {
    &self.config
  }

  pub fn weights(&self) -> &Path {
    &self.weights
  }

  pub fn threshold(&self) -> f32 {
    f32::from_bits(self.threshold_bits)
  }
}

/// 以 [`PredictorKey`] 为键的推理器表，首次访问某个键时才加载
///
/// 加载在锁外进行。同一个键的并发首次请求可能各自加载一次，
/// 但只有先插入的实例会被保留并返回给所有调用者。
pub struct PredictorCache<P> {
  entries: Mutex<HashMap<PredictorKey, Arc<P>>>,
}

impl<P> Default for PredictorCache<P> {
  fn default() -> Self {
    Self::new()
  }
}

impl<P> PredictorCache<P> {
  pub fn new() -> Self {
    Self {
      entries: Mutex::new(HashMap::new()),
    }
  }

  fn lock(&self) -> MutexGuard<'_, HashMap<PredictorKey, Arc<P>>> {
    // 表中只有已构造完成的实例，中毒后仍可继续使用
    self.entries.lock().unwrap_or_else(PoisonError::into_inner)
  }

  pub fn get(&self, key: &PredictorKey) -> Option<Arc<P>> {
    self.lock().get(key).cloned()
  }

  pub fn get_or_try_insert_with<E, F>(&self, key: PredictorKey, load: F) -> Result<Arc<P>, E>
  where
    F: FnOnce(&PredictorKey) -> Result<P, E>,
  {
    if let Some(hit) = self.get(&key) {
      debug!("推理器缓存命中: {:?}", key);
      return Ok(hit);
    }

    info!("推理器缓存未命中，开始加载: {:?}", key);
    let loaded = Arc::new(load(&key)?);
    let mut entries = self.lock();
    Ok(entries.entry(key).or_insert(loaded).clone())
  }

  pub fn len(&self) -> usize {
    self.lock().len()
  }

  pub fn is_empty(&self) -> bool {
    self.lock().is_empty()
  }
}
