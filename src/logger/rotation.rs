//! Size-triggered rotation with age and count retention

use crate::logger::compression::gzip_file;
use crate::logger::config::RetentionConfig;
use jiff::Zoned;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

pub struct RotationManager {
    config: RetentionConfig,
}

impl RotationManager {
    pub fn new(config: RetentionConfig) -> Self {
        Self { config }
    }

    pub fn should_rotate(&self, current_file_size: u64) -> bool {
        current_file_size >= self.config.max_size
    }

    /// Rename the active file aside, compress it if configured, then apply retention.
    pub fn rotate(&mut self, current_path: &Path) -> anyhow::Result<()> {
        if current_path.exists() {
            let rotated_path = rotated_path_for(current_path);
            fs::rename(current_path, &rotated_path)?;
            if self.config.compress {
                gzip_file(&rotated_path)?;
            }
        }
        self.apply_retention(current_path)
    }

    /// Remove rotated files past `max_age_days`, then the oldest beyond `max_files`.
    pub fn apply_retention(&self, base_path: &Path) -> anyhow::Result<()> {
        let mut rotated = rotated_files(base_path)?;

        if self.config.max_age_days > 0 {
            let max_age = Duration::from_secs(u64::from(self.config.max_age_days) * 86_400);
            let now = SystemTime::now();
            let mut kept = Vec::with_capacity(rotated.len());
            for (path, modified) in rotated {
                let expired = now
                    .duration_since(modified)
                    .map(|age| age > max_age)
                    .unwrap_or(false);
                if expired {
                    fs::remove_file(&path)?;
                } else {
                    kept.push((path, modified));
                }
            }
            rotated = kept;
        }

        rotated.sort_by_key(|(_, modified)| *modified);
        let excess = rotated.len().saturating_sub(self.config.max_files);
        for (path, _) in rotated.iter().take(excess) {
            fs::remove_file(path)?;
        }
        Ok(())
    }
}

fn rotated_path_for(base_path: &Path) -> PathBuf {
    let timestamp = Zoned::now().strftime("%Y%m%d_%H%M%S");
    let stem = base_path.file_stem().unwrap_or_default().to_string_lossy();
    let ext = base_path.extension().unwrap_or_default().to_string_lossy();

    let new_name = if ext.is_empty() {
        format!("{}.{}", stem, timestamp)
    } else {
        format!("{}.{}.{}", stem, timestamp, ext)
    };
    base_path.with_file_name(new_name)
}

/// Rotated siblings of `base_path` with their modification times.
fn rotated_files(base_path: &Path) -> anyhow::Result<Vec<(PathBuf, SystemTime)>> {
    let parent = match base_path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let prefix = format!(
        "{}.",
        base_path.file_stem().unwrap_or_default().to_string_lossy()
    );

    let mut files = Vec::new();
    for entry in fs::read_dir(parent)? {
        let path = entry?.path();
        let name = path.file_name().unwrap_or_default().to_string_lossy().to_string();
        if path == base_path || !name.starts_with(&prefix) {
            continue;
        }
        let modified = fs::metadata(&path)?.modified()?;
        files.push((path, modified));
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tempfile::tempdir;

    fn retention(max_size: u64, max_age_days: u32, max_files: usize) -> RetentionConfig {
        RetentionConfig {
            max_size,
            max_age_days,
            max_files,
            compress: false,
        }
    }

    fn age_file(path: &Path, secs_ago: u64) {
        let now = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap()
            .as_secs();
        let time = filetime::FileTime::from_unix_time((now - secs_ago) as i64, 0);
        filetime::set_file_mtime(path, time).unwrap();
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn property_rotation_triggers_at_max_size(
            current_size in 0u64..10_000_000u64,
            max_size in 1u64..10_000_000u64
        ) {
            let manager = RotationManager::new(retention(max_size, 0, 5));
            prop_assert_eq!(manager.should_rotate(current_size), current_size >= max_size);
        }
    }

    #[test]
    fn test_rotate_renames_active_file() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("cronhive.log");
        fs::write(&base, "line\n").unwrap();

        let mut manager = RotationManager::new(retention(1, 0, 5));
        manager.rotate(&base).unwrap();

        assert!(!base.exists());
        let rotated = rotated_files(&base).unwrap();
        assert_eq!(rotated.len(), 1);
        let name = rotated[0].0.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("cronhive.") && name.ends_with(".log"));
    }

    #[test]
    fn test_retention_drops_expired_files() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("cronhive.log");
        let old = dir.path().join("cronhive.20200101_000000.log");
        let fresh = dir.path().join("cronhive.20260101_000000.log");
        fs::write(&old, "old").unwrap();
        fs::write(&fresh, "fresh").unwrap();
        age_file(&old, 10 * 86_400);
        age_file(&fresh, 60);

        let manager = RotationManager::new(retention(1, 7, 10));
        manager.apply_retention(&base).unwrap();

        assert!(!old.exists());
        assert!(fresh.exists());
    }

    #[test]
    fn test_retention_keeps_newest_files_within_count() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("cronhive.log");
        let mut paths = Vec::new();
        for i in 0..5u64 {
            let path = dir.path().join(format!("cronhive.{:04}.log", i));
            fs::write(&path, "x").unwrap();
            age_file(&path, (5 - i) * 60);
            paths.push(path);
        }

        let manager = RotationManager::new(retention(1, 0, 2));
        manager.apply_retention(&base).unwrap();

        assert!(!paths[0].exists());
        assert!(!paths[2].exists());
        assert!(paths[3].exists());
        assert!(paths[4].exists());
    }

    #[test]
    fn test_retention_ignores_other_log_families() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("cronhive.log");
        let cluster = dir.path().join("cluster.0001.log");
        fs::write(&cluster, "raft").unwrap();

        let manager = RotationManager::new(retention(1, 0, 1));
        manager.apply_retention(&base).unwrap();

        assert!(cluster.exists());
    }
}
