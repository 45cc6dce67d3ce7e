pub mod model_metadata;
pub mod model_storage;
pub mod class_names;
pub mod config;

pub use model_metadata::ModelMetadata;
pub use model_storage::{save_model_with_metadata, load_metadata, load_model_binary, load_model_with_metadata, format_metadata_info};
pub use class_names::{save_class_names, load_class_names, validate_class_names};
pub use config::{AppConfig, DeviceType, ModelSettings, TrainingSettings, ServerSettings};
