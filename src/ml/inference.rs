//! モデル推論機能

use anyhow::Result;
use std::path::Path;
use burn::{
    module::Module,
    record::{BinBytesRecorder, FullPrecisionSettings, Recorder},
    tensor::backend::Backend,
};

use crate::error::PredictError;
use crate::ml::{nhwc_to_tensor, CloudClassifier, ModelConfig};
use crate::model::{load_model_with_metadata, ModelMetadata};
use crate::prediction::{Classifier, PreprocessedImage};

/// 推論エンジン
///
/// モデルアーカイブから重みを復元したCNNを保持し、`Classifier` として振る舞います。
pub struct InferenceEngine<B: Backend> {
    model: CloudClassifier<B>,
    metadata: ModelMetadata,
    device: B::Device,
}

impl<B: Backend> InferenceEngine<B> {
    /// モデルアーカイブを読み込んで推論エンジンを初期化
    pub fn load<P: AsRef<Path>>(model_path: P, device: B::Device) -> Result<Self> {
        let (metadata, model_binary) = load_model_with_metadata(model_path.as_ref())?;

        // 推論時はドロップアウトなし
        let model_config = ModelConfig::new(metadata.num_classes)
            .with_dropout(0.0)
            .with_image_size(metadata.image_size);
        let model = model_config.init::<B>(&device)?;

        // モデルの重みを復元
        let recorder = BinBytesRecorder::<FullPrecisionSettings>::default();
        let record = recorder
            .load(model_binary, &device)
            .map_err(|e| anyhow::anyhow!("モデル重みの読み込みエラー: {:?}", e))?;
        let model = model.load_record(record);

        tracing::info!(
            path = %model_path.as_ref().display(),
            num_classes = model.num_classes(),
            image_size = metadata.image_size,
            "モデルを読み込みました"
        );

        Ok(Self::from_parts(model, metadata, device))
    }

    /// 構築済みモデルから推論エンジンを作成
    pub fn from_parts(model: CloudClassifier<B>, metadata: ModelMetadata, device: B::Device) -> Self {
        Self {
            model,
            metadata,
            device,
        }
    }
}

impl<B: Backend> Classifier for InferenceEngine<B>
where
    B::Device: Send,
    CloudClassifier<B>: Send,
{
    fn num_classes(&self) -> usize {
        self.model.num_classes()
    }

    fn input_size(&self) -> usize {
        self.metadata.image_size
    }

    fn predict_probabilities(&self, input: &PreprocessedImage) -> Result<Vec<f32>, PredictError> {
        let size = input.image_size();
        if size != self.metadata.image_size {
            return Err(PredictError::shape_mismatch(format!(
                "input is {}x{} but the model expects {}x{}",
                size, size, self.metadata.image_size, self.metadata.image_size
            )));
        }

        let images = nhwc_to_tensor::<B>(input.data(), 1, size, &self.device);
        let probabilities = self.model.forward_probabilities(images);

        probabilities
            .into_data()
            .to_vec::<f32>()
            .map_err(|e| PredictError::inference(format!("推論結果の取得エラー: {:?}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::save_model_with_metadata;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_round_trip_through_archive() {
        let device = Default::default();
        let classes = vec!["cirrus".to_string(), "cumulus".to_string(), "stratus".to_string()];
        let model = ModelConfig::new(3)
            .with_image_size(24)
            .init::<TestBackend>(&device)
            .unwrap();

        let binary = BinBytesRecorder::<FullPrecisionSettings>::default()
            .record(model.into_record(), ())
            .unwrap();
        let metadata = ModelMetadata::new(classes, 24, 1, 4, 1e-3);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cloud_model.tar.gz");
        save_model_with_metadata(&path, &metadata, &binary).unwrap();

        let engine = InferenceEngine::<TestBackend>::load(&path, device).unwrap();
        assert_eq!(engine.num_classes(), 3);
        assert_eq!(engine.input_size(), 24);

        let input = crate::prediction::preprocess::normalize(
            image::DynamicImage::ImageRgb8(image::RgbImage::new(40, 40)),
            24,
        );
        let probs = engine.predict_probabilities(&input).unwrap();
        assert_eq!(probs.len(), 3);
        assert!((probs.iter().sum::<f32>() - 1.0).abs() < 1e-4);

        let wrong = crate::prediction::preprocess::normalize(
            image::DynamicImage::ImageRgb8(image::RgbImage::new(40, 40)),
            32,
        );
        assert!(matches!(
            engine.predict_probabilities(&wrong),
            Err(PredictError::ShapeMismatch { .. })
        ));
    }
}
