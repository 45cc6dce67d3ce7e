//! 推論と信頼度ゲーティング
//!
//! 分類器の出力確率からトップクラスを選び、信頼度が閾値以下の場合は
//! 上限付きで推論をやり直します。

use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};

use crate::error::{PredictError, StartupError};
use crate::prediction::preprocess::PreprocessedImage;

/// 確率分布を返す分類器
///
/// 出力は `num_classes()` 要素の確率ベクトル（合計1）。
pub trait Classifier: Send {
    /// 出力クラス数（モデルの出力次元）
    fn num_classes(&self) -> usize;

    /// 期待する入力画像サイズ（正方形の一辺）
    fn input_size(&self) -> usize;

    /// 単一画像バッチに対して順伝播を実行
    fn predict_probabilities(&self, input: &PreprocessedImage) -> Result<Vec<f32>, PredictError>;
}

/// 予測結果
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub class_index: usize,
    pub label: String,
    pub confidence: f32,
    /// 推論を実行した回数（リトライ込み）
    pub attempts: usize,
}

/// 信頼度リトライポリシー
///
/// `enabled` の場合、信頼度が `threshold` 以下なら同じ入力で再推論します。
/// 総試行回数は `max_attempts` で打ち切ります。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub enabled: bool,
    pub threshold: f32,
    pub max_attempts: usize,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: 0.57,
            max_attempts: 5,
        }
    }
}

impl RetryPolicy {
    /// リトライなし（1回だけ推論）
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    fn attempt_limit(&self) -> usize {
        if self.enabled {
            self.max_attempts.max(1)
        } else {
            1
        }
    }

    fn is_confident(&self, confidence: f32) -> bool {
        !self.enabled || confidence > self.threshold
    }
}

/// 確率ベクトルからトップクラスを選択
///
/// 同値の場合は先に現れたインデックスを採用します。
pub fn select_top(probabilities: &[f32], class_names: &[String]) -> Result<Prediction, PredictError> {
    let mut best: Option<(usize, f32)> = None;
    for (index, &p) in probabilities.iter().enumerate() {
        match best {
            Some((_, best_p)) if p <= best_p => {}
            _ => best = Some((index, p)),
        }
    }

    let (class_index, confidence) =
        best.ok_or_else(|| PredictError::shape_mismatch("model returned an empty probability vector"))?;

    let label = class_names.get(class_index).cloned().ok_or_else(|| {
        PredictError::shape_mismatch(format!(
            "class index {} is out of range for {} class names",
            class_index,
            class_names.len()
        ))
    })?;

    Ok(Prediction {
        class_index,
        label,
        confidence,
        attempts: 1,
    })
}

/// 分類器・クラス名・リトライポリシーをまとめた予測器
pub struct Predictor {
    classifier: Mutex<Box<dyn Classifier>>,
    class_names: Vec<String>,
    policy: RetryPolicy,
    input_size: usize,
}

impl Predictor {
    /// クラス数とモデル出力次元を照合して予測器を構築
    pub fn new(
        classifier: Box<dyn Classifier>,
        class_names: Vec<String>,
        policy: RetryPolicy,
    ) -> Result<Self, StartupError> {
        let model_outputs = classifier.num_classes();
        if class_names.len() != model_outputs {
            return Err(StartupError::ClassCountMismatch {
                class_names: class_names.len(),
                model_outputs,
            });
        }

        let input_size = classifier.input_size();
        Ok(Self {
            classifier: Mutex::new(classifier),
            class_names,
            policy,
            input_size,
        })
    }

    pub fn class_names(&self) -> &[String] {
        &self.class_names
    }

    pub fn input_size(&self) -> usize {
        self.input_size
    }

    /// 前処理済み画像を分類
    pub fn predict(&self, input: &PreprocessedImage) -> Result<Prediction, PredictError> {
        if input.image_size() != self.input_size {
            return Err(PredictError::shape_mismatch(format!(
                "input is {}x{} but the model expects {}x{}",
                input.image_size(),
                input.image_size(),
                self.input_size,
                self.input_size
            )));
        }

        // 分類器は読み取り専用なので、推論中の panic で汚染されたロックもそのまま使う
        let classifier = self.classifier.lock().unwrap_or_else(PoisonError::into_inner);

        let limit = self.policy.attempt_limit();
        let mut best: Option<Prediction> = None;

        for attempt in 1..=limit {
            let probabilities = classifier.predict_probabilities(input)?;
            if probabilities.len() != self.class_names.len() {
                return Err(PredictError::shape_mismatch(format!(
                    "model returned {} probabilities for {} classes",
                    probabilities.len(),
                    self.class_names.len()
                )));
            }

            let mut prediction = select_top(&probabilities, &self.class_names)?;
            prediction.attempts = attempt;

            if self.policy.is_confident(prediction.confidence) {
                return Ok(prediction);
            }

            tracing::debug!(
                attempt,
                confidence = prediction.confidence,
                threshold = self.policy.threshold,
                "confidence below threshold"
            );

            best = match best {
                Some(b) if b.confidence >= prediction.confidence => Some(Prediction { attempts: attempt, ..b }),
                _ => Some(prediction),
            };
        }

        let best = best.ok_or_else(|| PredictError::inference("no inference attempt was made"))?;
        tracing::warn!(
            attempts = best.attempts,
            label = %best.label,
            confidence = best.confidence,
            "retry limit reached without exceeding the confidence threshold"
        );
        Ok(best)
    }
}
