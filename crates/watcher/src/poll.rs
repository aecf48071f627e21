//! Modification-time polling detector
//!
//! Rescans every registered root on a fixed interval and reports files
//! that appeared, disappeared, or whose mtime moved since the last scan.
//! Works everywhere, including network filesystems where OS notifications
//! are unreliable.

use crate::ignore::IgnoreRules;
use dashmap::DashMap;
use regen_trigger::{Regenerate, SourceDetector, SourceId};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, SystemTime};
use tracing::{debug, info};
use walkdir::WalkDir;

/// File path -> last seen modification time
type Snapshot = HashMap<PathBuf, SystemTime>;

/// Polling source detector
pub struct PollingDetector {
    /// Sleep before each rescan
    interval: Duration,

    /// Rules applied while walking
    rules: IgnoreRules,

    /// Registered root -> snapshot from the previous scan
    roots: DashMap<PathBuf, Snapshot>,
}

impl PollingDetector {
    /// Create a detector rescanning every `interval`
    pub fn new(interval: Duration, rules: IgnoreRules) -> Self {
        Self {
            interval,
            rules,
            roots: DashMap::new(),
        }
    }

    /// Files currently tracked across all roots
    pub fn tracked_files(&self) -> usize {
        self.roots.iter().map(|root| root.value().len()).sum()
    }

    /// Rescan every root once and return what changed, without sleeping
    pub fn scan_once(&self) -> HashSet<SourceId> {
        let mut changed = HashSet::new();

        for mut root in self.roots.iter_mut() {
            let current = self.scan(root.key());
            for path in diff(root.value(), &current) {
                changed.insert(path.display().to_string());
            }
            *root.value_mut() = current;
        }

        changed
    }

    /// Walk `root` and record the mtime of every non-ignored file
    fn scan(&self, root: &Path) -> Snapshot {
        let mut snapshot = Snapshot::new();
        if !root.exists() {
            return snapshot;
        }

        for entry in WalkDir::new(root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !self.rules.should_ignore_under(e.path(), root))
        {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    debug!("Skipping unreadable entry: {}", e);
                    continue;
                }
            };

            // Only check files
            if !entry.file_type().is_file() {
                continue;
            }

            let modified = entry
                .metadata()
                .map_err(std::io::Error::from)
                .and_then(|metadata| metadata.modified());
            match modified {
                Ok(mtime) => {
                    snapshot.insert(entry.into_path(), mtime);
                }
                Err(e) => debug!("Skipping {}: {}", entry.path().display(), e),
            }
        }

        snapshot
    }
}

impl SourceDetector for PollingDetector {
    fn register_source(&self, source: &str) -> anyhow::Result<()> {
        let root = PathBuf::from(source);
        if self.roots.contains_key(&root) {
            debug!("Already polling {}", root.display());
            return Ok(());
        }

        // Baseline so existing files don't count as changes
        let baseline = self.scan(&root);
        info!("Polling {} ({} files)", root.display(), baseline.len());
        self.roots.insert(root, baseline);
        Ok(())
    }

    fn poll_changed_sources(&self) -> anyhow::Result<HashSet<SourceId>> {
        thread::sleep(self.interval);
        Ok(self.scan_once())
    }

    fn on_stop(&self, _regenerate: &dyn Regenerate) -> anyhow::Result<()> {
        debug!("Releasing {} polled roots", self.roots.len());
        self.roots.clear();
        Ok(())
    }
}

/// Paths created, modified, or deleted between two snapshots
fn diff(old: &Snapshot, new: &Snapshot) -> Vec<PathBuf> {
    let mut changed: Vec<PathBuf> = new
        .iter()
        .filter(|(path, mtime)| old.get(*path) != Some(*mtime))
        .map(|(path, _)| path.clone())
        .collect();

    changed.extend(old.keys().filter(|path| !new.contains_key(*path)).cloned());
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use filetime::{set_file_mtime, FileTime};
    use std::fs;
    use tempfile::TempDir;

    fn detector(root: &Path) -> PollingDetector {
        PollingDetector::new(Duration::from_millis(10), IgnoreRules::builtin(root))
    }

    fn id(path: &Path) -> SourceId {
        path.display().to_string()
    }

    fn ids(paths: &[&PathBuf]) -> HashSet<SourceId> {
        paths.iter().map(|path| id(path)).collect()
    }

    fn bump_mtime(path: &Path) {
        let later = SystemTime::now() + Duration::from_secs(60);
        set_file_mtime(path, FileTime::from_system_time(later)).unwrap();
    }

    #[test]
    fn test_existing_files_are_baseline() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("a.txt"), b"a").unwrap();
        fs::write(temp_dir.path().join("b.txt"), b"b").unwrap();

        let detector = detector(temp_dir.path());
        detector.register_source(&id(temp_dir.path())).unwrap();

        assert_eq!(detector.tracked_files(), 2);
        assert!(detector.poll_changed_sources().unwrap().is_empty());
    }

    #[test]
    fn test_detects_modify_create_delete() {
        let temp_dir = TempDir::new().unwrap();
        let modified = temp_dir.path().join("modified.txt");
        let deleted = temp_dir.path().join("deleted.txt");
        fs::write(&modified, b"v1").unwrap();
        fs::write(&deleted, b"bye").unwrap();

        let detector = detector(temp_dir.path());
        detector.register_source(&id(temp_dir.path())).unwrap();

        bump_mtime(&modified);
        fs::remove_file(&deleted).unwrap();
        let created = temp_dir.path().join("nested/created.txt");
        fs::create_dir_all(created.parent().unwrap()).unwrap();
        fs::write(&created, b"hi").unwrap();

        let changed = detector.poll_changed_sources().unwrap();
        assert_eq!(changed, ids(&[&modified, &deleted, &created]));

        // Reported once only
        assert!(detector.poll_changed_sources().unwrap().is_empty());
    }

    #[test]
    fn test_single_file_root() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("config.toml");
        fs::write(&file, b"x = 1").unwrap();

        let detector = detector(temp_dir.path());
        detector.register_source(&id(&file)).unwrap();
        bump_mtime(&file);

        let changed = detector.poll_changed_sources().unwrap();
        assert_eq!(changed, ids(&[&file]));
    }

    #[test]
    fn test_missing_root_reports_creation() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("later.txt");

        let detector = detector(temp_dir.path());
        detector.register_source(&id(&file)).unwrap();
        assert_eq!(detector.tracked_files(), 0);

        fs::write(&file, b"now").unwrap();
        assert_eq!(detector.scan_once(), ids(&[&file]));
    }

    #[test]
    fn test_ignored_files_are_skipped() {
        let temp_dir = TempDir::new().unwrap();
        let detector = detector(temp_dir.path());
        detector.register_source(&id(temp_dir.path())).unwrap();

        fs::create_dir_all(temp_dir.path().join(".git")).unwrap();
        fs::write(temp_dir.path().join(".git/index"), b"idx").unwrap();
        fs::write(temp_dir.path().join(".main.rs.swp"), b"swap").unwrap();
        fs::write(temp_dir.path().join("main.rs"), b"fn main() {}").unwrap();

        let changed = detector.scan_once();
        assert_eq!(changed, ids(&[&temp_dir.path().join("main.rs")]));
    }

    #[test]
    fn test_root_inside_builtin_dir_is_reported() {
        let temp_dir = TempDir::new().unwrap();
        let site = temp_dir.path().join("target/site");
        fs::create_dir_all(&site).unwrap();

        let detector = detector(temp_dir.path());
        detector.register_source(&id(&site)).unwrap();

        let page = site.join("index.html");
        fs::write(&page, b"<h1>hi</h1>").unwrap();
        fs::write(site.join("index.html~"), b"backup").unwrap();

        assert_eq!(detector.scan_once(), ids(&[&page]));
    }

    #[test]
    fn test_root_outside_rules_root_ignores_ancestors() {
        let rules_dir = TempDir::new().unwrap();
        let other_dir = TempDir::new().unwrap();
        let docs = other_dir.path().join("target/docs");
        fs::create_dir_all(&docs).unwrap();

        let detector = detector(rules_dir.path());
        detector.register_source(&id(&docs)).unwrap();

        let page = docs.join("page.md");
        fs::write(&page, b"# page").unwrap();
        fs::create_dir_all(docs.join(".git")).unwrap();
        fs::write(docs.join(".git/HEAD"), b"ref").unwrap();

        assert_eq!(detector.scan_once(), ids(&[&page]));
    }

    #[test]
    fn test_duplicate_registration_keeps_baseline() {
        let temp_dir = TempDir::new().unwrap();
        let detector = detector(temp_dir.path());
        detector.register_source(&id(temp_dir.path())).unwrap();

        fs::write(temp_dir.path().join("new.txt"), b"new").unwrap();
        detector.register_source(&id(temp_dir.path())).unwrap();

        // Second registration did not swallow the change
        assert_eq!(detector.scan_once().len(), 1);
    }

    #[test]
    fn test_on_stop_forgets_roots() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("a.txt"), b"a").unwrap();

        let detector = detector(temp_dir.path());
        detector.register_source(&id(temp_dir.path())).unwrap();
        detector.on_stop(&|_: HashSet<SourceId>| {}).unwrap();

        assert_eq!(detector.tracked_files(), 0);
        fs::write(temp_dir.path().join("b.txt"), b"b").unwrap();
        assert!(detector.scan_once().is_empty());
    }
}
