//! サービスコンテキスト
//!
//! 起動時に一度だけ構築され、リクエストハンドラへ `State` として渡される読み取り専用の状態です。
//!
//! ライフサイクル:
//! 1. `ServiceContext::load`（またはテスト用に `from_classifier`）でモデルとクラス名を読み込み、
//!    クラス名をアーカイブ内の記録と、クラス数をモデル出力次元と照合する
//! 2. `Arc` で共有し、サーバ稼働中は変更しない
//! 3. サーバ終了後、最後の `Arc` が破棄された時点でモデルも解放される

use std::path::Path;
use std::sync::Arc;

use crate::error::{PredictError, StartupError};
use crate::model::{load_class_names, AppConfig};
#[cfg(feature = "ml")]
use crate::model::load_metadata;
use crate::prediction::{preprocess_image_bytes, Classifier, Prediction, Predictor, RetryPolicy};

pub type SharedContext = Arc<ServiceContext>;

/// クラス名リストとアーカイブ内のクラス名を照合
///
/// 順序も含めて一致しない場合、ラベルの対応がずれるため起動を拒否します。
pub fn verify_class_names(list: &[String], archive: &[String]) -> Result<(), StartupError> {
    if list == archive {
        return Ok(());
    }
    Err(StartupError::ClassNameMismatch {
        list: list.to_vec(),
        archive: archive.to_vec(),
    })
}

pub struct ServiceContext {
    predictor: Predictor,
}

impl ServiceContext {
    /// 分類器とクラス名からコンテキストを構築
    pub fn from_classifier(
        classifier: Box<dyn Classifier>,
        class_names: Vec<String>,
        policy: RetryPolicy,
    ) -> Result<Self, StartupError> {
        let predictor = Predictor::new(classifier, class_names, policy)?;
        Ok(Self { predictor })
    }

    /// 設定に従ってモデルアーカイブとクラス名リストを読み込む
    #[cfg(feature = "ml")]
    pub fn load(config: &AppConfig) -> Result<Self, StartupError> {
        let model_path = Path::new(&config.model.model_path);
        let class_names = load_class_names(Path::new(&config.model.class_names_path))?;
        let metadata = load_metadata(model_path)?;
        verify_class_names(&class_names, &metadata.class_names)?;

        let classifier = crate::ml::load_classifier(config.device_type, model_path)?;

        let context = Self::from_classifier(classifier, class_names, config.prediction)?;
        tracing::info!(
            "クラス名 ({}個): {}",
            context.class_names().len(),
            context.class_names().join(", ")
        );
        Ok(context)
    }

    /// 機械学習機能なしのビルドではモデルを読み込めない
    #[cfg(not(feature = "ml"))]
    pub fn load(config: &AppConfig) -> Result<Self, StartupError> {
        // クラス名ファイルの検証だけは行う
        load_class_names(Path::new(&config.model.class_names_path))?;
        Err(StartupError::Artifact(anyhow::anyhow!(
            "機械学習機能が有効化されていません ({})",
            config.model.model_path
        )))
    }

    pub fn into_shared(self) -> SharedContext {
        Arc::new(self)
    }

    pub fn class_names(&self) -> &[String] {
        self.predictor.class_names()
    }

    /// 画像バイト列を前処理して分類
    pub fn predict_bytes(&self, bytes: &[u8]) -> Result<Prediction, PredictError> {
        let input = preprocess_image_bytes(bytes, self.predictor.input_size())?;
        self.predictor.predict(&input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_verify_class_names_accepts_identical_lists() {
        let list = names(&["cirrus", "cumulus", "stratus"]);
        assert!(verify_class_names(&list, &list.clone()).is_ok());
    }

    #[test]
    fn test_verify_class_names_rejects_reordered_list() {
        let list = names(&["cumulus", "cirrus", "stratus"]);
        let archive = names(&["cirrus", "cumulus", "stratus"]);
        match verify_class_names(&list, &archive) {
            Err(StartupError::ClassNameMismatch { list: l, archive: a }) => {
                assert_eq!(l, list);
                assert_eq!(a, archive);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_verify_class_names_rejects_renamed_class() {
        let list = names(&["cirrus", "cumulus", "nimbus"]);
        let archive = names(&["cirrus", "cumulus", "stratus"]);
        assert!(verify_class_names(&list, &archive).is_err());
    }
}
