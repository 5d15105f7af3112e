// 该文件是 Detect My Setup 项目的一部分。
// src/bin/benchmark_repeatshot.rs - 重复推理耗时测试
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

use anyhow::Result;
use clap::Parser;
use url::Url;

use detect_my_setup::{
  DEFAULT_THRESHOLD, DEFAULT_TOP_N, FromUrl, InferenceAdapter,
  input::ImageFileInput,
  output::OutputWrapper,
  task::{RepeatShotTask, Task},
};
use tracing::info;

/// 重复推理测试参数
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型配置文件路径
  #[arg(long, value_name = "FILE", default_value = "model/config.toml")]
  pub config: PathBuf,
  /// 模型权重文件路径
  #[arg(long, value_name = "FILE", default_value = "model/model_final.onnx")]
  pub weights: PathBuf,
  /// 输入来源
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出路径
  #[arg(long, value_name = "OUTPUT")]
  pub output: Url,
  /// 重复次数
  #[arg(long, value_name = "TIMES", default_value_t = 100)]
  pub times: usize,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("模型配置: {}", args.config.display());
  info!("模型权重: {}", args.weights.display());
  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);

  let input_image = ImageFileInput::from_url(&args.input)?;
  let model = InferenceAdapter::new(args.config, args.weights)
    .with_threshold(DEFAULT_THRESHOLD)
    .with_top_n(DEFAULT_TOP_N);
  let output = OutputWrapper::from_url(&args.output)?;

  // 首次调用加载权重，其后每次都命中推理器缓存
  RepeatShotTask::with_times(args.times).run_task(input_image.into_frames(), model, output)?;

  Ok(())
}
