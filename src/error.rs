//! 推論パイプラインのエラー定義
//!
//! 予測処理とサービス起動時に発生するエラーを閉じた列挙型で表します。
//! HTTPステータスへの対応付けは `server::error` で行います。

use thiserror::Error;

/// 予測処理（前処理・推論・ラベル選択）のエラー
#[derive(Error, Debug)]
pub enum PredictError {
    /// 画像のデコードに失敗した
    #[error("image decode failed")]
    Decode(#[source] image::ImageError),

    /// 入力テンソルまたは出力ベクトルの形状がモデルと一致しない
    #[error("shape mismatch: {message}")]
    ShapeMismatch {
        /// 不一致の内容
        message: String,
    },

    /// 推論バックエンドでのエラー
    #[error("inference failed: {message}")]
    Inference {
        /// バックエンドから返されたメッセージ
        message: String,
    },
}

impl PredictError {
    pub fn shape_mismatch(message: impl Into<String>) -> Self {
        Self::ShapeMismatch {
            message: message.into(),
        }
    }

    pub fn inference(message: impl Into<String>) -> Self {
        Self::Inference {
            message: message.into(),
        }
    }
}

/// サービス起動時のエラー
#[derive(Error, Debug)]
pub enum StartupError {
    /// クラス名リストの長さとモデル出力次元が一致しない
    #[error("class name list has {class_names} entries but the model outputs {model_outputs} classes")]
    ClassCountMismatch {
        class_names: usize,
        model_outputs: usize,
    },

    /// クラス名リストがモデルアーカイブに記録されたクラス名と一致しない
    #[error("class name list [{}] does not match the model archive [{}]", .list.join(", "), .archive.join(", "))]
    ClassNameMismatch {
        list: Vec<String>,
        archive: Vec<String>,
    },

    /// モデルまたはクラス名ファイルの読み込みに失敗した
    #[error("failed to load artifact: {0}")]
    Artifact(#[from] anyhow::Error),
}
