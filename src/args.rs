// 该文件是 Detect My Setup 项目的一部分。
// src/args.rs - 项目参数配置
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

use clap::Parser;
use url::Url;

/// Detect My Setup：找出桌面照片中的键盘、显示器、鼠标、台灯、笔记本与麦克风
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型配置文件路径 (TOML)
  #[arg(long, value_name = "FILE", default_value = "model/config.toml")]
  pub config: PathBuf,

  /// 模型权重文件路径 (ONNX)
  #[arg(long, value_name = "FILE", default_value = "model/model_final.onnx")]
  pub weights: PathBuf,

  /// 类别标签表 (TOML)，默认使用内置的六个类别
  #[arg(long, value_name = "FILE")]
  pub labels: Option<PathBuf>,

  /// 输入图像，例如 image:///path/to/setup.jpg（支持 png / jpg / jpeg）
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,

  /// 输出位置，例如 image:///tmp/prediction.png 或 folder:///tmp/records?record=json
  #[arg(long, value_name = "OUTPUT")]
  pub output: Url,

  /// 置信度阈值 (0.0 - 1.0)
  #[arg(long, default_value = "0.5", value_name = "THRESHOLD")]
  pub threshold: f32,

  /// 绘制的物体数量 (1 - 10)
  #[arg(
    short = 'n',
    long,
    default_value = "1",
    value_name = "COUNT",
    value_parser = clap::value_parser!(u8).range(1..=10)
  )]
  pub count: u8,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn defaults_follow_the_demo_page() {
    let args = Args::try_parse_from([
      "detect-my-setup",
      "--input",
      "image:///tmp/setup.jpg",
      "--output",
      "image:///tmp/prediction.png",
    ])
    .unwrap();
    assert_eq!(args.config, PathBuf::from("model/config.toml"));
    assert_eq!(args.weights, PathBuf::from("model/model_final.onnx"));
    assert_eq!(args.threshold, 0.5);
    assert_eq!(args.count, 1);
    assert!(args.labels.is_none());
  }

  #[test]
  fn count_is_bounded() {
    let parse = |count: &str| {
      Args::try_parse_from([
        "detect-my-setup",
        "--input",
        "image:///tmp/setup.jpg",
        "--output",
        "image:///tmp/prediction.png",
        "-n",
        count,
      ])
    };
    assert_eq!(parse("10").unwrap().count, 10);
    assert!(parse("0").is_err());
    assert!(parse("11").is_err());
  }
}
