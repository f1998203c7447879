//! File helpers.

use serde::Serialize;
use std::path::Path;
use tokio::fs;

use crate::core::Result;

/// Write `content` atomically: to a sibling temporary file first, then renamed
/// over `path`. Parent directories are created as needed.
pub async fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await?;
    }
    let temp_path = path.with_extension("tmp");
    fs::write(&temp_path, content).await?;
    if let Err(e) = fs::rename(&temp_path, path).await {
        let _ = fs::remove_file(&temp_path).await;
        return Err(e.into());
    }
    Ok(())
}

/// Serialize `value` as pretty JSON and write it atomically.
pub async fn write_json(path: &Path, value: &impl Serialize) -> Result<()> {
    let mut content = serde_json::to_vec_pretty(value)?;
    content.push(b'\n');
    atomic_write(path, &content).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_write_json_creates_parents_and_leaves_no_temp() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("out").join("doc.json");
        write_json(&path, &json!({"b": 1, "a": 2})).await.unwrap();

        let content = fs::read_to_string(&path).await.unwrap();
        assert!(content.find("\"b\"").unwrap() < content.find("\"a\"").unwrap());
        assert!(!path.with_extension("tmp").exists());
    }
}
