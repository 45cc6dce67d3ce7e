//! クラス名リストの保存・読み込み
//!
//! `class_names.json` はクラス名のJSON配列で、インデックスがモデル出力の順序と対応します。

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::path::Path;

/// クラス名リストを検証
///
/// 空リストと重複は受け付けません。
pub fn validate_class_names(names: &[String]) -> Result<()> {
    if names.is_empty() {
        anyhow::bail!("class name list is empty");
    }

    let mut seen = HashSet::new();
    for name in names {
        if name.trim().is_empty() {
            anyhow::bail!("class name list contains an empty name");
        }
        if !seen.insert(name.as_str()) {
            anyhow::bail!("duplicate class name: {}", name);
        }
    }

    Ok(())
}

/// クラス名リストをJSONで保存
pub fn save_class_names(path: &Path, names: &[String]) -> Result<()> {
    validate_class_names(names)?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create parent directory: {:?}", parent))?;
    }

    let json = serde_json::to_string_pretty(names).context("Failed to serialize class names")?;
    std::fs::write(path, json).with_context(|| format!("Failed to write class names: {:?}", path))?;
    Ok(())
}

/// クラス名リストをJSONから読み込む
pub fn load_class_names(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read class names: {:?}", path))?;
    let names: Vec<String> = serde_json::from_str(&content)
        .with_context(|| format!("Class names file is not a JSON array of strings: {:?}", path))?;
    validate_class_names(&names)?;
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("class_names.json");
        let list = names(&["cirrus", "cumulus", "stratus"]);

        save_class_names(&path, &list).unwrap();
        assert_eq!(load_class_names(&path).unwrap(), list);
    }

    #[test]
    fn test_reads_plain_json_array() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("class_names.json");
        std::fs::write(&path, r#"["Ac","As","Cb","Cc","Ci","Cs","Ct","Cu","Ns","Sc","St"]"#).unwrap();

        let loaded = load_class_names(&path).unwrap();
        assert_eq!(loaded.len(), 11);
        assert_eq!(loaded[0], "Ac");
    }

    #[test]
    fn test_rejects_invalid_lists() {
        assert!(validate_class_names(&[]).is_err());
        assert!(validate_class_names(&names(&["a", "b", "a"])).is_err());
        assert!(validate_class_names(&names(&["a", " "])).is_err());
        assert!(validate_class_names(&names(&["a", "b"])).is_ok());
    }

    #[test]
    fn test_rejects_non_string_array() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("class_names.json");
        std::fs::write(&path, "[1, 2, 3]").unwrap();
        assert!(load_class_names(&path).is_err());
    }
}
