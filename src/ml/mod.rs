pub mod ml_model;
pub mod training;
pub mod inference;
pub mod backend;

pub use ml_model::{CloudClassifier, ModelConfig, HIDDEN_UNITS, nhwc_to_tensor};
pub use training::{CloudDataset, CloudBatcher, TrainOptions, TrainingSummary, train_model, evaluate_accuracy};
pub use inference::InferenceEngine;
pub use backend::{load_classifier, run_training};
