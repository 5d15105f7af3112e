// 该文件是 Detect My Setup 项目的一部分。
// src/main.rs - 项目主程序
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

mod args;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};

use detect_my_setup::{
  FromUrl, InferenceAdapter, LabelTable,
  input::ImageFileInput,
  output::OutputWrapper,
  task::{OneShotTask, Task},
};

fn run(args: args::Args) -> Result<()> {
  info!("模型配置: {}", args.config.display());
  info!("模型权重: {}", args.weights.display());
  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);
  info!("置信度阈值: {}", args.threshold);
  info!("绘制数量: {}", args.count);

  let labels = match &args.labels {
    Some(path) => LabelTable::from_toml_file(path)?,
    None => LabelTable::desk_setup(),
  };

  let input = ImageFileInput::from_url(&args.input)?;
  let model = InferenceAdapter::new(&args.config, &args.weights)
    .with_threshold(args.threshold)
    .with_top_n(args.count as usize)
    .with_labels(labels);
  let output = OutputWrapper::from_url(&args.output)?;

  let inference = OneShotTask.run_task(input.into_frames(), model, output)?;

  println!("Objects detected:");
  if inference.labels.is_empty() {
    println!("  (none)");
  }
  for (label, item) in inference.labels.iter().zip(inference.instances.items.iter()) {
    println!("  - {} ({:.2}%)", label, item.score * 100.0);
  }

  Ok(())
}

fn main() {
  tracing_subscriber::fmt::init();

  let args = args::Args::parse();

  if let Err(err) = run(args) {
    error!("推理失败: {:#}", err);
    eprintln!("无法完成预测: {:#}", err);
    std::process::exit(1);
  }
}
