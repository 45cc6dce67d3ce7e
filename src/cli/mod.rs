//! コマンドラインインターフェース
//!
//! 処理本体は `ml` / `server` / `prediction` に委譲し、ここでは設定の組み立てと振り分けのみ行います。

pub mod commands;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};

use crate::model::AppConfig;
use crate::server::{self, ServiceContext};
use commands::{Commands, InitConfigArgs, PredictArgs, ServeArgs, TrainArgs};

#[derive(Parser, Debug)]
#[command(
    name = "cloud_classifier",
    version,
    about = "Train a cloud-type image classifier and serve predictions over HTTP."
)]
pub struct Cli {
    /// Configuration file (defaults are used when it does not exist)
    #[arg(long, global = true, default_value = "config.json")]
    pub config: PathBuf,

    /// Defaults to `serve`
    #[command(subcommand)]
    pub command: Option<Commands>,
}

impl Cli {
    pub fn run(self) -> Result<()> {
        match self.command {
            None => run_serve(&self.config, &ServeArgs {
                model: Default::default(),
                host: None,
                port: None,
            }),
            Some(Commands::Serve(ref args)) => run_serve(&self.config, args),
            Some(Commands::Train(ref args)) => run_train(&self.config, args),
            Some(Commands::Predict(ref args)) => run_predict(&self.config, args),
            Some(Commands::InitConfig(ref args)) => run_init_config(&self.config, args),
        }
    }
}

fn run_serve(config_path: &Path, args: &ServeArgs) -> Result<()> {
    let mut config = AppConfig::load_or_default(config_path)?;
    args.apply(&mut config);
    config.log_summary();

    let context = ServiceContext::load(&config).context("サービスの初期化に失敗しました")?;
    let ctx = context.into_shared();

    let runtime = tokio::runtime::Runtime::new().context("Failed to start tokio runtime")?;
    runtime.block_on(async move {
        let addr = config.server.bind_address();
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind {}", addr))?;
        server::serve(listener, ctx, config.server.body_limit_bytes, server::shutdown_signal())
            .await
            .context("HTTP server error")
    })?;

    tracing::info!("server stopped");
    Ok(())
}

#[cfg(feature = "ml")]
fn run_train(config_path: &Path, args: &TrainArgs) -> Result<()> {
    use crate::ml::{run_training, TrainOptions};

    let mut config = AppConfig::load_or_default(config_path)?;
    args.apply(&mut config);

    let options = TrainOptions::from_config(&config);
    let summary = run_training(config.device_type, &options)?;

    println!("Detected classes: {}", summary.class_names.join(", "));
    println!(
        "Training samples: {}, validation samples: {}",
        summary.train_samples, summary.val_samples
    );
    if let Some(acc) = summary.val_accuracy {
        println!("Validation accuracy: {:.2}", acc);
    }
    println!(
        "Model saved as {} (class names: {})",
        summary.model_path.display(),
        summary.class_names_path.display()
    );
    Ok(())
}

#[cfg(not(feature = "ml"))]
fn run_train(_config_path: &Path, _args: &TrainArgs) -> Result<()> {
    anyhow::bail!("機械学習機能が有効化されていません")
}

fn run_predict(config_path: &Path, args: &PredictArgs) -> Result<()> {
    let mut config = AppConfig::load_or_default(config_path)?;
    args.model.apply(&mut config);

    let context = ServiceContext::load(&config).context("モデルの読み込みに失敗しました")?;
    let bytes = std::fs::read(&args.image)
        .with_context(|| format!("Failed to read image: {}", args.image.display()))?;
    let prediction = context
        .predict_bytes(&bytes)
        .with_context(|| format!("Prediction failed for {}", args.image.display()))?;

    println!(
        "Prediction: {} (Confidence: {:.2})",
        prediction.label, prediction.confidence
    );
    Ok(())
}

fn run_init_config(config_path: &Path, args: &InitConfigArgs) -> Result<()> {
    if config_path.exists() && !args.force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            config_path.display()
        );
    }
    AppConfig::default().save(config_path)?;
    println!("設定ファイルを保存しました: {}", config_path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_defaults_to_serve() {
        let cli = Cli::try_parse_from(["cloud_classifier"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.config, PathBuf::from("config.json"));
    }

    #[test]
    fn test_parse_train() {
        let cli = Cli::try_parse_from([
            "cloud_classifier",
            "train",
            "--data-dir",
            "data/train",
            "--epochs",
            "3",
            "--device",
            "cpu",
        ])
        .unwrap();
        match cli.command {
            Some(Commands::Train(args)) => {
                assert_eq!(args.epochs, Some(3));
                assert_eq!(args.model.device, Some(commands::DeviceArg::Cpu));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_init_config_refuses_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        run_init_config(&path, &InitConfigArgs { force: false }).unwrap();
        assert!(AppConfig::load(&path).is_ok());
        assert!(run_init_config(&path, &InitConfigArgs { force: false }).is_err());
        assert!(run_init_config(&path, &InitConfigArgs { force: true }).is_ok());
    }
}
