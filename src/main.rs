use clap::Parser;
use cloud_classifier_lib::cli::Cli;
use tracing_subscriber::EnvFilter;

fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("cloud_classifier=info,cloud_classifier_lib=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    if let Err(e) = Cli::parse().run() {
        tracing::error!("{:#}", e);
        std::process::exit(1);
    }
}
