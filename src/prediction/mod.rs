pub mod preprocess;
pub mod predictor;

pub use preprocess::{preprocess_image_bytes, preprocess_image_file, PreprocessedImage, DEFAULT_IMAGE_SIZE};
pub use predictor::{select_top, Classifier, Prediction, Predictor, RetryPolicy};
