use std::path::Path;

use tracing::{debug, info};

use crate::errors::VulnfixError;

/// Make sure `dir` is ignored by the repository at `repo_root` when it lives
/// inside it. The entry goes into `exclude_file` (the repository's
/// `info/exclude`), which is never committed and survives hard resets.
/// Returns true when the file was changed.
pub fn ensure_ignored(exclude_file: &Path, repo_root: &Path, dir: &Path) -> Result<bool, VulnfixError> {
    let absolute = if dir.is_absolute() { dir.to_path_buf() } else { repo_root.join(dir) };
    let Ok(relative) = absolute.strip_prefix(repo_root) else {
        debug!(dir = %dir.display(), "Output directory is outside the repository");
        return Ok(false);
    };
    let relative = relative.to_string_lossy().replace('\\', "/");
    let relative = relative.trim_matches('/');
    if relative.is_empty() {
        return Err(VulnfixError::Config("Output directory must not be the repository root".into()));
    }

    let entry = format!("/{}/", relative);
    let existing = if exclude_file.exists() {
        std::fs::read_to_string(exclude_file)?
    } else {
        String::new()
    };

    let already = existing.lines().map(str::trim).any(|line| {
        line.trim_start_matches('/').trim_end_matches('/') == relative
    });
    if already {
        return Ok(false);
    }

    let mut updated = existing;
    if !updated.is_empty() && !updated.ends_with('\n') {
        updated.push('\n');
    }
    updated.push_str(&entry);
    updated.push('\n');
    if let Some(parent) = exclude_file.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(exclude_file, updated)?;

    info!(entry = %entry, file = %exclude_file.display(), "Excluded output directory from git");
    Ok(true)
}
