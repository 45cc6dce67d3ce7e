//! サブコマンドと引数の定義

use clap::{Args, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::model::{AppConfig, DeviceType};

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Load the model and serve POST /predict
    Serve(ServeArgs),

    /// Train the classifier on a directory of labeled images
    Train(TrainArgs),

    /// Classify a single local image
    Predict(PredictArgs),

    /// Write the default configuration file
    InitConfig(InitConfigArgs),
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq)]
pub enum DeviceArg {
    Cpu,
    Wgpu,
}

impl From<DeviceArg> for DeviceType {
    fn from(arg: DeviceArg) -> Self {
        match arg {
            DeviceArg::Cpu => DeviceType::Cpu,
            DeviceArg::Wgpu => DeviceType::Wgpu,
        }
    }
}

/// モデル関連の共通オプション
#[derive(Args, Debug, Default)]
pub struct ModelArgs {
    /// Model archive (tar.gz)
    #[arg(long)]
    pub model: Option<PathBuf>,

    /// Class name list (JSON array)
    #[arg(long)]
    pub class_names: Option<PathBuf>,

    /// Compute backend
    #[arg(long, value_enum)]
    pub device: Option<DeviceArg>,
}

impl ModelArgs {
    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(path) = &self.model {
            config.model.model_path = path.to_string_lossy().to_string();
        }
        if let Some(path) = &self.class_names {
            config.model.class_names_path = path.to_string_lossy().to_string();
        }
        if let Some(device) = self.device {
            config.device_type = device.into();
        }
    }
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    #[command(flatten)]
    pub model: ModelArgs,

    /// Address to bind
    #[arg(long)]
    pub host: Option<String>,

    /// Port to listen on
    #[arg(long)]
    pub port: Option<u16>,
}

impl ServeArgs {
    pub fn apply(&self, config: &mut AppConfig) {
        self.model.apply(config);
        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
    }
}

#[derive(Args, Debug)]
pub struct TrainArgs {
    #[command(flatten)]
    pub model: ModelArgs,

    /// Directory with one sub-directory of images per class
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Number of passes over the training data
    #[arg(long)]
    pub epochs: Option<usize>,

    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Adam learning rate
    #[arg(long)]
    pub lr: Option<f64>,
}

impl TrainArgs {
    pub fn apply(&self, config: &mut AppConfig) {
        self.model.apply(config);
        if let Some(dir) = &self.data_dir {
            config.training.data_dir = dir.to_string_lossy().to_string();
        }
        if let Some(epochs) = self.epochs {
            config.training.num_epochs = epochs;
        }
        if let Some(batch_size) = self.batch_size {
            config.training.batch_size = batch_size;
        }
        if let Some(lr) = self.lr {
            config.training.learning_rate = lr;
        }
    }
}

#[derive(Args, Debug)]
pub struct PredictArgs {
    #[command(flatten)]
    pub model: ModelArgs,

    /// Image to classify
    pub image: PathBuf,
}

#[derive(Args, Debug)]
pub struct InitConfigArgs {
    /// Overwrite an existing file
    #[arg(long)]
    pub force: bool,
}
