//! 機械学習モデルの共通定義
//!
//! 雲画像分類用のCNNモデルと関連する設定を提供します。

use burn::{
    config::Config,
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        loss::CrossEntropyLossConfig,
        pool::{MaxPool2d, MaxPool2dConfig},
        Dropout, DropoutConfig, Linear, LinearConfig, Relu,
    },
    tensor::{activation::softmax, backend::Backend, Int, Tensor},
    train::ClassificationOutput,
};

/// 全結合隠れ層のユニット数
pub const HIDDEN_UNITS: usize = 128;

/// 最終畳み込み層のチャネル数
const LAST_CHANNELS: usize = 128;

/// モデル設定
#[derive(Config, Debug)]
pub struct ModelConfig {
    /// 分類クラス数
    pub num_classes: usize,
    /// ドロップアウト率
    #[config(default = 0.5)]
    pub dropout: f64,
    /// 入力画像サイズ（正方形）
    #[config(default = 224)]
    pub image_size: usize,
}

impl ModelConfig {
    /// 最終プーリング後の特徴マップの一辺
    ///
    /// Conv (3x3, no padding): size -> size - 2
    /// Pool (2x2): size -> size / 2（切り捨て）
    /// を3ブロック繰り返します。
    pub fn feature_map_size(&self) -> usize {
        (0..3).fold(self.image_size, |size, _| size.saturating_sub(2) / 2)
    }

    /// Flatten後の特徴次元
    pub fn feature_dim(&self) -> usize {
        let s = self.feature_map_size();
        LAST_CHANNELS * s * s
    }

    /// モデルを初期化
    pub fn init<B: Backend>(&self, device: &B::Device) -> anyhow::Result<CloudClassifier<B>> {
        if self.num_classes == 0 {
            anyhow::bail!("クラス数は1以上が必要です");
        }
        if self.feature_map_size() == 0 {
            anyhow::bail!("入力サイズが小さすぎます: {} (最小22x22が必要)", self.image_size);
        }

        let d = self.feature_dim();
        tracing::debug!(
            image_size = self.image_size,
            feature_map = self.feature_map_size(),
            feature_dim = d,
            num_classes = self.num_classes,
            "CNNを初期化します"
        );

        Ok(CloudClassifier {
            conv1: Conv2dConfig::new([3, 32], [3, 3]).init(device),
            conv2: Conv2dConfig::new([32, 64], [3, 3]).init(device),
            conv3: Conv2dConfig::new([64, LAST_CHANNELS], [3, 3]).init(device),
            pool: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
            fc1: LinearConfig::new(d, HIDDEN_UNITS).init(device),
            dropout: DropoutConfig::new(self.dropout).init(),
            fc2: LinearConfig::new(HIDDEN_UNITS, self.num_classes).init(device),
            activation: Relu::new(),
        })
    }
}

/// 雲画像分類用CNNモデル
///
/// # アーキテクチャ
/// - {Conv 3x3 + ReLU + MaxPool 2x2} x 3層 (32, 64, 128 チャネル)
/// - Flatten
/// - FC: d -> 128 + ReLU
/// - Dropout
/// - FC: 128 -> num_classes
/// - Softmax (分類時)
#[derive(Module, Debug)]
pub struct CloudClassifier<B: Backend> {
    conv1: Conv2d<B>,
    conv2: Conv2d<B>,
    conv3: Conv2d<B>,
    pool: MaxPool2d,
    fc1: Linear<B>,
    dropout: Dropout,
    fc2: Linear<B>,
    activation: Relu,
}

impl<B: Backend> CloudClassifier<B> {
    /// 順伝播
    ///
    /// - `images`: バッチ画像 [batch_size, 3, size, size]
    /// - 戻り値: クラスごとのロジット [batch_size, num_classes]
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let [batch_size, _, _, _] = images.dims();

        let x = self.pool.forward(self.activation.forward(self.conv1.forward(images)));
        let x = self.pool.forward(self.activation.forward(self.conv2.forward(x)));
        let x = self.pool.forward(self.activation.forward(self.conv3.forward(x)));

        let [_, c, h, w] = x.dims();
        let x = x.reshape([batch_size, c * h * w]);

        let x = self.activation.forward(self.fc1.forward(x));
        let x = self.dropout.forward(x);
        self.fc2.forward(x)
    }

    /// クラス確率を計算
    pub fn forward_probabilities(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        softmax(self.forward(images), 1)
    }

    /// 出力クラス数（最終全結合層の出力次元）
    pub fn num_classes(&self) -> usize {
        self.fc2.weight.val().dims()[1]
    }

    /// 順伝播と損失計算（学習用）
    pub fn forward_classification(
        &self,
        images: Tensor<B, 4>,
        targets: Tensor<B, 1, Int>,
    ) -> ClassificationOutput<B> {
        let output = self.forward(images);
        let loss = CrossEntropyLossConfig::new()
            .init(&output.device())
            .forward(output.clone(), targets.clone());

        ClassificationOutput::new(loss, output, targets)
    }
}

/// NHWC 順の平坦化画素をモデル入力 [batch, 3, size, size] に変換
pub fn nhwc_to_tensor<B: Backend>(
    pixels: &[f32],
    batch_size: usize,
    size: usize,
    device: &B::Device,
) -> Tensor<B, 4> {
    Tensor::<B, 1>::from_floats(pixels, device)
        .reshape([batch_size, size, size, 3])
        .permute([0, 3, 1, 2])
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_feature_dim_for_224() {
        let config = ModelConfig::new(11);
        // 224 -> 111 -> 54 -> 26
        assert_eq!(config.feature_map_size(), 26);
        assert_eq!(config.feature_dim(), 128 * 26 * 26);
    }

    #[test]
    fn test_too_small_input_is_rejected() {
        let device = Default::default();
        let config = ModelConfig::new(3).with_image_size(16);
        assert!(config.init::<TestBackend>(&device).is_err());
        assert!(ModelConfig::new(0).init::<TestBackend>(&device).is_err());
    }

    #[test]
    fn test_forward_shape_and_probabilities() {
        let device = Default::default();
        let config = ModelConfig::new(3).with_image_size(32);
        let model = config.init::<TestBackend>(&device).unwrap();
        assert_eq!(model.num_classes(), 3);

        let pixels = vec![0.5f32; 2 * 32 * 32 * 3];
        let images = nhwc_to_tensor::<TestBackend>(&pixels, 2, 32, &device);
        assert_eq!(images.dims(), [2, 3, 32, 32]);

        let probs = model.forward_probabilities(images);
        assert_eq!(probs.dims(), [2, 3]);

        let values = probs.into_data().to_vec::<f32>().unwrap();
        let first_row: f32 = values[..3].iter().sum();
        assert!((first_row - 1.0).abs() < 1e-4);
    }
}
