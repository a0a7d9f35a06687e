use std::path::Path;

use crate::errors::VulnfixError;

/// Write `content` next to `path` and rename it into place, so readers never
/// see a half-written file.
pub async fn atomic_write(path: &Path, content: &str) -> Result<(), VulnfixError> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = std::path::PathBuf::from(tmp);
    tokio::fs::write(&tmp, content).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_atomic_write_replaces_content_and_leaves_no_temp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.json");
        atomic_write(&path, "{\"a\":1}").await.unwrap();
        atomic_write(&path, "{\"a\":2}").await.unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{\"a\":2}");
        assert!(!dir.path().join("run.json.tmp").exists());
    }
}
