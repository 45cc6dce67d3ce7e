//! 雲の種類を判別する画像分類器
//!
//! - `prediction` : 画像の前処理と確信度リトライ付きの推論
//! - `model`      : 設定ファイル、モデルアーカイブ、クラス名リスト
//! - `ml`         : Burn による CNN の定義・学習・推論（`ml` feature）
//! - `server`     : `POST /predict` を提供する HTTP サーバ
//! - `cli`        : `serve` / `train` / `predict` サブコマンド

#![recursion_limit = "256"]

pub mod cli;
pub mod error;
pub mod model;
pub mod prediction;
pub mod server;

#[cfg(feature = "ml")]
pub mod ml;

pub use error::{PredictError, StartupError};
