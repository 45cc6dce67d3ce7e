//! モデルメタデータの定義
//!
//! tar.gz形式のモデルアーカイブに同梱される学習時情報です。

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// モデルメタデータ
///
/// tar.gz形式で保存される情報：
/// - metadata.json: このメタデータ（JSON形式）
/// - model.bin: モデルの重み（バイナリ）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    /// 学習時のクラス名（インデックス順）
    pub class_names: Vec<String>,

    /// 出力クラス数
    pub num_classes: usize,

    /// モデル入力サイズ（正方形の一辺、通常224）
    pub image_size: usize,

    /// 学習エポック数
    pub num_epochs: usize,

    /// バッチサイズ
    #[serde(default)]
    pub batch_size: usize,

    /// 学習率
    #[serde(default)]
    pub learning_rate: f64,

    /// モデルの学習時刻（ISO8601形式）
    pub trained_at: String,
}

impl ModelMetadata {
    /// 新しいメタデータを作成
    pub fn new(
        class_names: Vec<String>,
        image_size: usize,
        num_epochs: usize,
        batch_size: usize,
        learning_rate: f64,
    ) -> Self {
        let trained_at = chrono::Local::now().to_rfc3339();
        let num_classes = class_names.len();

        Self {
            class_names,
            num_classes,
            image_size,
            num_epochs,
            batch_size,
            learning_rate,
            trained_at,
        }
    }

    /// メタデータをJSON文字列に変換
    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize metadata to JSON")
    }

    /// JSON文字列からメタデータを生成
    pub fn from_json_string(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to deserialize metadata from JSON")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_counts_classes() {
        let metadata = ModelMetadata::new(
            vec!["cirrus".into(), "cumulus".into(), "stratus".into()],
            224,
            5,
            32,
            1e-3,
        );
        assert_eq!(metadata.num_classes, 3);
        assert!(chrono::DateTime::parse_from_rfc3339(&metadata.trained_at).is_ok());
    }

    #[test]
    fn test_missing_optional_fields() {
        let json = r#"{
            "class_names": ["a", "b"],
            "num_classes": 2,
            "image_size": 64,
            "num_epochs": 1,
            "trained_at": "2024-01-01T00:00:00+00:00"
        }"#;
        let metadata = ModelMetadata::from_json_string(json).unwrap();
        assert_eq!(metadata.batch_size, 0);
        assert_eq!(metadata.image_size, 64);
    }

    #[test]
    fn test_invalid_json() {
        assert!(ModelMetadata::from_json_string("[]").is_err());
    }
}
