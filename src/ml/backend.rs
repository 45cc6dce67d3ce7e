//! 計算バックエンドの選択
//!
//! 設定の `DeviceType` に応じて NdArray (CPU) か WGPU を使い分けます。

use anyhow::Result;
use std::path::Path;

use burn::backend::Wgpu;
use burn_autodiff::Autodiff;
use burn_ndarray::{NdArray, NdArrayDevice};
use burn_wgpu::WgpuDevice;

use crate::ml::{train_model, InferenceEngine, TrainOptions, TrainingSummary};
use crate::model::DeviceType;
use crate::prediction::Classifier;

/// CPUバックエンド
pub type CpuBackend = NdArray<f32>;

/// GPUバックエンド
pub type GpuBackend = Wgpu;

/// モデルアーカイブを読み込んで分類器を作成
pub fn load_classifier(device_type: DeviceType, model_path: &Path) -> Result<Box<dyn Classifier>> {
    tracing::info!("使用デバイス: {}", device_type);
    match device_type {
        DeviceType::Cpu => {
            let engine = InferenceEngine::<CpuBackend>::load(model_path, NdArrayDevice::Cpu)?;
            Ok(Box::new(engine))
        }
        DeviceType::Wgpu => {
            let engine = InferenceEngine::<GpuBackend>::load(model_path, WgpuDevice::default())?;
            Ok(Box::new(engine))
        }
    }
}

/// 設定されたバックエンドで学習を実行
pub fn run_training(device_type: DeviceType, options: &TrainOptions) -> Result<TrainingSummary> {
    tracing::info!("{} モードで学習を開始します", device_type);
    match device_type {
        DeviceType::Cpu => train_model::<Autodiff<CpuBackend>>(options, NdArrayDevice::Cpu),
        DeviceType::Wgpu => train_model::<Autodiff<GpuBackend>>(options, WgpuDevice::default()),
    }
}
