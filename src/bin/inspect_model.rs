//! モデルアーカイブのメタデータを表示する

use cloud_classifier_lib::model::{format_metadata_info, load_class_names, load_metadata};
use cloud_classifier_lib::server::verify_class_names;
use std::path::PathBuf;

fn main() {
    let args: Vec<String> = std::env::args().collect();
    let model_path = args
        .get(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("cloud_model.tar.gz"));
    let class_names_path = args
        .get(2)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("class_names.json"));

    println!("=== {} ===", model_path.display());
    let metadata = match load_metadata(&model_path) {
        Ok(metadata) => metadata,
        Err(e) => {
            eprintln!("✗ エラー: {:#}", e);
            std::process::exit(1);
        }
    };
    for line in format_metadata_info(&metadata) {
        println!("  {}", line);
    }

    // 配布されたクラス名リストとアーカイブ内のクラス名の照合
    match load_class_names(&class_names_path) {
        Ok(names) => match verify_class_names(&names, &metadata.class_names) {
            Ok(()) => println!("✓ {} と一致", class_names_path.display()),
            Err(e) => println!("✗ {}: {}", class_names_path.display(), e),
        },
        Err(e) => {
            println!("- {} は読み込めません: {:#}", class_names_path.display(), e);
        }
    }
}
