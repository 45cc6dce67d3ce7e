//! モデル学習機能
//!
//! `<data_dir>/<クラス名>/*.png|jpg|jpeg` 形式のディレクトリから学習データを読み込み、
//! CNNを学習してモデルアーカイブとクラス名リストを保存します。

use anyhow::{Context, Result};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use burn::{
    data::dataloader::batcher::Batcher,
    data::dataset::Dataset,
    module::{AutodiffModule, Module},
    record::{BinBytesRecorder, FullPrecisionSettings, Recorder},
    tensor::{
        backend::{AutodiffBackend, Backend},
        ElementConversion, Int, Tensor,
    },
    train::{ClassificationOutput, TrainOutput, TrainStep, ValidStep},
};

use crate::ml::{nhwc_to_tensor, CloudClassifier, ModelConfig};
use crate::model::{save_class_names, save_model_with_metadata, AppConfig, ModelMetadata};

const IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

fn is_image_file(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .map(|ext| {
                let ext = ext.to_string_lossy().to_lowercase();
                IMAGE_EXTENSIONS.contains(&ext.as_str())
            })
            .unwrap_or(false)
}

/// 学習データセット（パスのリストのみ保持）
#[derive(Clone)]
pub struct CloudDataset {
    samples: Vec<(PathBuf, usize)>, // (画像パス, クラスID)
    class_names: Vec<String>,
}

impl CloudDataset {
    /// ディレクトリから学習データを読み込む
    ///
    /// クラスIDはサブディレクトリ名のソート順で割り当てます。
    pub fn from_directory(data_dir: &Path) -> Result<Self> {
        let mut class_names = Vec::new();
        for entry in std::fs::read_dir(data_dir)
            .with_context(|| format!("Failed to read data directory: {}", data_dir.display()))?
        {
            let path = entry?.path();
            if path.is_dir() {
                let class_name = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .ok_or_else(|| anyhow::anyhow!("Invalid directory name: {:?}", path))?
                    .to_string();
                class_names.push(class_name);
            }
        }
        class_names.sort();

        Self::from_directory_with_order(data_dir, &class_names)
    }

    /// 指定された順序でディレクトリから学習データを読み込む
    pub fn from_directory_with_order(data_dir: &Path, class_order: &[String]) -> Result<Self> {
        if class_order.is_empty() {
            anyhow::bail!("No class directories found in {}", data_dir.display());
        }

        let mut samples = Vec::new();
        let mut empty_classes = Vec::new();

        for (class_id, class_name) in class_order.iter().enumerate() {
            let class_dir = data_dir.join(class_name);
            let mut paths: Vec<PathBuf> = std::fs::read_dir(&class_dir)
                .with_context(|| format!("Failed to read class directory: {}", class_dir.display()))?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|path| is_image_file(path))
                .collect();
            paths.sort();

            if paths.is_empty() {
                empty_classes.push(class_name.clone());
            }
            tracing::info!("  クラス {}: {} ({} 枚)", class_id, class_name, paths.len());
            samples.extend(paths.into_iter().map(|p| (p, class_id)));
        }

        if !empty_classes.is_empty() {
            anyhow::bail!(
                "以下のクラスディレクトリに画像が1枚もありません: {}",
                empty_classes.join(", ")
            );
        }

        tracing::info!("Loaded {} samples from {} classes", samples.len(), class_order.len());

        Ok(Self {
            samples,
            class_names: class_order.to_vec(),
        })
    }

    pub fn class_names(&self) -> &[String] {
        &self.class_names
    }

    pub fn num_classes(&self) -> usize {
        self.class_names.len()
    }

    /// データセットを学習用と検証用に分割
    ///
    /// シード付きでシャッフルしてから `train_ratio` で分割します。
    pub fn split(self, train_ratio: f32, seed: u64) -> (Self, Self) {
        use rand::seq::SliceRandom;
        use rand::SeedableRng;

        let mut samples = self.samples;
        let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
        samples.shuffle(&mut rng);

        let ratio = train_ratio.clamp(0.0, 1.0);
        let train_len = (samples.len() as f32 * ratio) as usize;
        let val_samples = samples.split_off(train_len);

        (
            Self {
                samples,
                class_names: self.class_names.clone(),
            },
            Self {
                samples: val_samples,
                class_names: self.class_names,
            },
        )
    }
}

/// データセットアイテム（画像パスのみ保持）
#[derive(Clone, Debug)]
pub struct CloudItem {
    pub path: PathBuf,
    pub label: usize,
}

impl Dataset<CloudItem> for CloudDataset {
    fn get(&self, index: usize) -> Option<CloudItem> {
        let (path, label) = self.samples.get(index)?;
        Some(CloudItem {
            path: path.clone(),
            label: *label,
        })
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}

/// バッチャー
///
/// 推論時と同じ前処理（リサイズ + 1/255）で画像を読み込みます。
#[derive(Clone)]
pub struct CloudBatcher<B: Backend> {
    image_size: usize,
    _backend: PhantomData<B>,
}

impl<B: Backend> CloudBatcher<B> {
    pub fn new(image_size: usize) -> Self {
        Self {
            image_size,
            _backend: PhantomData,
        }
    }
}

/// バッチデータ
#[derive(Clone, Debug)]
pub struct CloudBatch<B: Backend> {
    pub images: Tensor<B, 4>,
    pub targets: Tensor<B, 1, Int>,
}

impl<B: Backend> Batcher<B, CloudItem, CloudBatch<B>> for CloudBatcher<B> {
    fn batch(&self, items: Vec<CloudItem>, device: &B::Device) -> CloudBatch<B> {
        let batch_size = items.len();
        let size = self.image_size;
        let mut all_pixels = Vec::with_capacity(batch_size * size * size * 3);
        let mut targets = Vec::with_capacity(batch_size);

        for item in items {
            match image::open(&item.path) {
                Ok(img) => {
                    let input = crate::prediction::preprocess::normalize(img, size);
                    all_pixels.extend_from_slice(input.data());
                }
                Err(e) => {
                    // 読み込めない画像はゼロで埋める
                    tracing::warn!("画像読み込み失敗 {}: {}", item.path.display(), e);
                    all_pixels.extend(std::iter::repeat(0.0f32).take(size * size * 3));
                }
            }
            targets.push(item.label as i64);
        }

        let images = nhwc_to_tensor::<B>(&all_pixels, batch_size, size, device);
        let targets = Tensor::<B, 1, Int>::from_ints(targets.as_slice(), device);

        CloudBatch { images, targets }
    }
}

/// TrainStep実装 (学習時の順伝播 + 逆伝播)
impl<B: AutodiffBackend> TrainStep<CloudBatch<B>, ClassificationOutput<B>> for CloudClassifier<B> {
    fn step(&self, batch: CloudBatch<B>) -> TrainOutput<ClassificationOutput<B>> {
        let item = self.forward_classification(batch.images, batch.targets);
        let grads = item.loss.backward();
        TrainOutput::new(self, grads, item)
    }
}

/// ValidStep実装 (検証時の順伝播のみ)
impl<B: Backend> ValidStep<CloudBatch<B>, ClassificationOutput<B>> for CloudClassifier<B> {
    fn step(&self, batch: CloudBatch<B>) -> ClassificationOutput<B> {
        self.forward_classification(batch.images, batch.targets)
    }
}

/// 学習オプション
#[derive(Debug, Clone)]
pub struct TrainOptions {
    pub data_dir: PathBuf,
    pub model_path: PathBuf,
    pub class_names_path: PathBuf,
    pub image_size: usize,
    pub dropout: f64,
    pub num_epochs: usize,
    pub batch_size: usize,
    pub num_workers: usize,
    pub learning_rate: f64,
    pub seed: u64,
    pub train_ratio: f32,
}

impl TrainOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            data_dir: PathBuf::from(&config.training.data_dir),
            model_path: PathBuf::from(&config.model.model_path),
            class_names_path: PathBuf::from(&config.model.class_names_path),
            image_size: config.model.image_size,
            dropout: config.model.dropout,
            num_epochs: config.training.num_epochs,
            batch_size: config.training.batch_size,
            num_workers: config.training.num_workers,
            learning_rate: config.training.learning_rate,
            seed: config.training.seed,
            train_ratio: config.training.train_ratio,
        }
    }
}

/// 学習結果の概要
#[derive(Debug, Clone)]
pub struct TrainingSummary {
    pub class_names: Vec<String>,
    pub train_samples: usize,
    pub val_samples: usize,
    /// 検証データがない場合は None
    pub val_accuracy: Option<f64>,
    pub model_path: PathBuf,
    pub class_names_path: PathBuf,
}

/// データセット全体に対する正解率を計算
pub fn evaluate_accuracy<B: Backend>(
    model: &CloudClassifier<B>,
    dataset: &CloudDataset,
    image_size: usize,
    batch_size: usize,
    device: &B::Device,
) -> Option<f64> {
    let total = dataset.len();
    if total == 0 {
        return None;
    }

    let batcher = CloudBatcher::<B>::new(image_size);
    let batch_size = batch_size.max(1);
    let mut correct = 0usize;

    for start in (0..total).step_by(batch_size) {
        let items: Vec<CloudItem> = (start..(start + batch_size).min(total))
            .filter_map(|i| dataset.get(i))
            .collect();
        let batch = batcher.batch(items, device);

        let predicted = model.forward(batch.images).argmax(1).flatten::<1>(0, 1);
        let hits: i64 = predicted.equal(batch.targets).int().sum().into_scalar().elem();
        correct += hits as usize;
    }

    Some(correct as f64 / total as f64)
}

/// Burn の学習成果物（チェックポイント・ログ）用の一時ディレクトリ
///
/// 実行ごとに別のディレクトリを作り、破棄時に削除されます。
fn training_artifact_dir() -> Result<tempfile::TempDir> {
    tempfile::Builder::new()
        .prefix("cloud_classifier_training_")
        .tempdir()
        .context("Failed to create training artifact directory")
}

/// モデル学習を実行
///
/// 学習後、モデルアーカイブ（metadata.json + model.bin）と class_names.json を保存します。
pub fn train_model<B: AutodiffBackend>(options: &TrainOptions, device: B::Device) -> Result<TrainingSummary> {
    use burn::{
        data::dataloader::DataLoaderBuilder,
        optim::AdamConfig,
        train::{
            metric::{AccuracyMetric, LossMetric},
            LearnerBuilder, LearningStrategy,
        },
    };

    tracing::info!("学習データの検証を開始します: {}", options.data_dir.display());
    let dataset = CloudDataset::from_directory(&options.data_dir)?;
    let class_names = dataset.class_names().to_vec();
    tracing::info!("Detected classes: {}", class_names.join(", "));

    let (dataset_train, dataset_val) = dataset.split(options.train_ratio, options.seed);
    let train_samples = dataset_train.len();
    let val_samples = dataset_val.len();
    if train_samples == 0 {
        anyhow::bail!("学習データが見つかりません");
    }
    tracing::info!("学習データ: {} 枚 / 検証データ: {} 枚", train_samples, val_samples);

    let model_config = ModelConfig::new(class_names.len())
        .with_dropout(options.dropout)
        .with_image_size(options.image_size);
    let model = model_config.init::<B>(&device)?;
    tracing::info!(
        "モデル設定: {} クラス, 入力サイズ: {}x{}, dropout={}, パラメータ数: {}",
        class_names.len(),
        options.image_size,
        options.image_size,
        options.dropout,
        model.num_params()
    );

    let dataloader_train = DataLoaderBuilder::new(CloudBatcher::<B>::new(options.image_size))
        .batch_size(options.batch_size)
        .shuffle(options.seed)
        .num_workers(options.num_workers)
        .build(dataset_train);

    // 精度計算で再利用する
    let dataset_val_eval = dataset_val.clone();
    let dataloader_val = DataLoaderBuilder::new(CloudBatcher::<B::InnerBackend>::new(options.image_size))
        .batch_size(options.batch_size)
        .num_workers(options.num_workers)
        .build(dataset_val);

    let artifact_dir = training_artifact_dir()?;
    let artifact_dir_str = artifact_dir.path().to_string_lossy().to_string();

    tracing::info!(
        "学習を開始します: エポック数 {}, バッチサイズ {}, 学習率 {}",
        options.num_epochs,
        options.batch_size,
        options.learning_rate
    );

    let learner = LearnerBuilder::new(&artifact_dir_str)
        .metric_train_numeric(AccuracyMetric::new())
        .metric_valid_numeric(AccuracyMetric::new())
        .metric_train_numeric(LossMetric::new())
        .metric_valid_numeric(LossMetric::new())
        .learning_strategy(LearningStrategy::SingleDevice(device.clone()))
        .num_epochs(options.num_epochs)
        .summary()
        .build(model, AdamConfig::new().init(), options.learning_rate);

    let model_trained = learner.fit(dataloader_train, dataloader_val);
    let trained_model = model_trained.model;
    tracing::info!("学習が完了しました");

    let val_accuracy = evaluate_accuracy(
        &trained_model,
        &dataset_val_eval,
        options.image_size,
        options.batch_size,
        &device,
    );
    match val_accuracy {
        Some(acc) => tracing::info!("Validation accuracy: {:.2}", acc),
        None => tracing::warn!("検証データがないため正解率を計算しません"),
    }

    let model_binary = BinBytesRecorder::<FullPrecisionSettings>::default()
        .record(trained_model.into_record(), ())
        .map_err(|e| anyhow::anyhow!("モデルのシリアライズに失敗しました: {:?}", e))?;
    tracing::info!(
        "モデルバイナリサイズ: {} バイト ({:.2} MB)",
        model_binary.len(),
        model_binary.len() as f64 / 1024.0 / 1024.0
    );

    let metadata = ModelMetadata::new(
        class_names.clone(),
        options.image_size,
        options.num_epochs,
        options.batch_size,
        options.learning_rate,
    );
    save_model_with_metadata(&options.model_path, &metadata, &model_binary)?;
    save_class_names(&options.class_names_path, &class_names)?;
    tracing::info!(
        "モデルを保存しました: {} / {}",
        options.model_path.display(),
        options.class_names_path.display()
    );

    Ok(TrainingSummary {
        class_names,
        train_samples,
        val_samples,
        val_accuracy,
        model_path: options.model_path.clone(),
        class_names_path: options.class_names_path.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;
    use image::{Rgb, RgbImage};

    type TestBackend = NdArray<f32>;

    fn write_dataset(root: &Path, classes: &[(&str, usize)]) {
        for (name, count) in classes {
            let dir = root.join(name);
            std::fs::create_dir_all(&dir).unwrap();
            for i in 0..*count {
                RgbImage::from_pixel(30, 20, Rgb([i as u8 * 10, 100, 200]))
                    .save(dir.join(format!("{}.png", i)))
                    .unwrap();
            }
            std::fs::write(dir.join("notes.txt"), "not an image").unwrap();
        }
    }

    #[test]
    fn test_from_directory_sorted_classes() {
        let dir = tempfile::tempdir().unwrap();
        write_dataset(dir.path(), &[("stratus", 2), ("cirrus", 3), ("cumulus", 1)]);

        let dataset = CloudDataset::from_directory(dir.path()).unwrap();
        assert_eq!(dataset.class_names(), &["cirrus", "cumulus", "stratus"]);
        assert_eq!(dataset.num_classes(), 3);
        assert_eq!(dataset.len(), 6);
        assert_eq!(dataset.get(0).unwrap().label, 0);
        assert_eq!(dataset.get(5).unwrap().label, 2);
        assert!(dataset.get(6).is_none());
    }

    #[test]
    fn test_empty_class_is_error() {
        let dir = tempfile::tempdir().unwrap();
        write_dataset(dir.path(), &[("cirrus", 2), ("stratus", 0)]);
        let err = CloudDataset::from_directory(dir.path()).err().unwrap();
        assert!(err.to_string().contains("stratus"));
    }

    #[test]
    fn test_no_classes_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(CloudDataset::from_directory(dir.path()).is_err());
    }

    #[test]
    fn test_split_is_seeded() {
        let dir = tempfile::tempdir().unwrap();
        write_dataset(dir.path(), &[("a", 5), ("b", 5)]);

        let (train, val) = CloudDataset::from_directory(dir.path()).unwrap().split(0.8, 42);
        assert_eq!(train.len(), 8);
        assert_eq!(val.len(), 2);
        assert_eq!(val.class_names(), &["a", "b"]);

        let (train2, _) = CloudDataset::from_directory(dir.path()).unwrap().split(0.8, 42);
        let paths: Vec<_> = (0..8).map(|i| train.get(i).unwrap().path).collect();
        let paths2: Vec<_> = (0..8).map(|i| train2.get(i).unwrap().path).collect();
        assert_eq!(paths, paths2);
    }

    #[test]
    fn test_batcher_shapes() {
        let dir = tempfile::tempdir().unwrap();
        write_dataset(dir.path(), &[("a", 2), ("b", 1)]);
        let dataset = CloudDataset::from_directory(dir.path()).unwrap();

        let items: Vec<CloudItem> = (0..3).filter_map(|i| dataset.get(i)).collect();
        let mut items = items;
        items.push(CloudItem {
            path: dir.path().join("missing.png"),
            label: 1,
        });

        let device = Default::default();
        let batch = CloudBatcher::<TestBackend>::new(24).batch(items, &device);
        assert_eq!(batch.images.dims(), [4, 3, 24, 24]);
        assert_eq!(batch.targets.dims(), [4]);
    }

    #[test]
    fn test_artifact_dirs_are_unique_and_removed() {
        let first = training_artifact_dir().unwrap();
        let second = training_artifact_dir().unwrap();
        assert_ne!(first.path(), second.path());

        let path = first.path().to_path_buf();
        std::fs::write(path.join("checkpoint.bin"), b"weights").unwrap();
        assert!(path.exists());
        drop(first);
        assert!(!path.exists());
    }

    #[test]
    fn test_evaluate_accuracy_range() {
        let dir = tempfile::tempdir().unwrap();
        write_dataset(dir.path(), &[("a", 2), ("b", 3)]);
        let dataset = CloudDataset::from_directory(dir.path()).unwrap();

        let device = Default::default();
        let model = ModelConfig::new(2)
            .with_image_size(24)
            .init::<TestBackend>(&device)
            .unwrap();

        let acc = evaluate_accuracy(&model, &dataset, 24, 2, &device).unwrap();
        assert!((0.0..=1.0).contains(&acc));

        let (_, empty) = CloudDataset::from_directory(dir.path()).unwrap().split(1.0, 1);
        assert!(evaluate_accuracy(&model, &empty, 24, 2, &device).is_none());
    }
}
