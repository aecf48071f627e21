//! Ignore rules for watched sources
//!
//! Sources matching any of these never reach the trigger:
//! 1. Built-in rules (VCS dirs, build dirs, editor temporaries - always active)
//! 2. .regenignore patterns (optional, enabled by default)
//! 3. .gitignore patterns (optional, enabled by default)
//! 4. Config-based patterns (gitignore syntax)

use anyhow::{Context, Result};
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};

/// Directories whose contents never trigger regeneration
const BUILTIN_DIRS: &[&str] = &[
    ".git",
    ".jj",
    ".hg",
    ".svn",
    "target",
    "node_modules",
    "__pycache__",
];

/// Ignore rule set rooted at one directory
pub struct IgnoreRules {
    /// Directory patterns are relative to
    root: PathBuf,

    /// Root .gitignore (optional)
    gitignore: Option<Gitignore>,

    /// Root .regenignore (optional)
    regenignore: Option<Gitignore>,

    /// Compiled `additional_patterns`
    additional: Option<Gitignore>,

    config: IgnoreConfig,
}

impl IgnoreRules {
    /// Load ignore rules rooted at `root`
    ///
    /// An existing root is canonicalized so it lines up with the canonical
    /// paths OS notifications carry.
    pub fn load(root: &Path, config: IgnoreConfig) -> Result<Self> {
        let mut rules = Self {
            root: canonical_root(root),
            gitignore: None,
            regenignore: None,
            additional: None,
            config,
        };

        rules.reload()?;
        Ok(rules)
    }

    /// Built-in rules only
    pub fn builtin(root: &Path) -> Self {
        Self {
            root: canonical_root(root),
            gitignore: None,
            regenignore: None,
            additional: None,
            config: IgnoreConfig {
                use_gitignore: false,
                use_regenignore: false,
                additional_patterns: vec![],
            },
        }
    }

    /// Re-read ignore files and recompile config patterns
    pub fn reload(&mut self) -> Result<()> {
        self.gitignore = if self.config.use_gitignore {
            self.load_file(".gitignore")?
        } else {
            None
        };

        self.regenignore = if self.config.use_regenignore {
            self.load_file(".regenignore")?
        } else {
            None
        };

        self.additional = if self.config.additional_patterns.is_empty() {
            None
        } else {
            let mut builder = GitignoreBuilder::new(&self.root);
            for pattern in &self.config.additional_patterns {
                builder
                    .add_line(None, pattern)
                    .with_context(|| format!("Invalid ignore pattern '{}'", pattern))?;
            }
            Some(builder.build()?)
        };

        Ok(())
    }

    fn load_file(&self, name: &str) -> Result<Option<Gitignore>> {
        let path = self.root.join(name);
        if !path.is_file() {
            return Ok(None);
        }

        let mut builder = GitignoreBuilder::new(&self.root);
        if let Some(e) = builder.add(&path) {
            return Err(e).with_context(|| format!("Failed to parse {}", path.display()));
        }
        Ok(Some(builder.build()?))
    }

    /// Check if a changed path should be dropped
    ///
    /// Paths under the rules root are judged from the root down; anything
    /// else is judged on every component.
    pub fn should_ignore(&self, path: &Path) -> bool {
        let base = if path.starts_with(&self.root) {
            self.root.as_path()
        } else {
            Path::new("")
        };
        self.should_ignore_under(path, base)
    }

    /// Check if a path found below `watch_root` should be dropped
    ///
    /// Only components below `watch_root` are matched, so a root the user
    /// asked for (`target/site`, `/srv/node_modules/pkg`) is never hidden by
    /// its own name or its ancestors. A path outside `watch_root` is judged
    /// by its file name only.
    pub fn should_ignore_under(&self, path: &Path, watch_root: &Path) -> bool {
        let below = match path.strip_prefix(watch_root) {
            Ok(below) => below,
            Err(_) => path.file_name().map(Path::new).unwrap_or(path),
        };
        if is_builtin_ignored(below) {
            return true;
        }

        // Pattern files see each level between the path and the watch root
        if path.starts_with(watch_root) {
            path.ancestors()
                .take_while(|ancestor| *ancestor != watch_root)
                .any(|ancestor| self.matches_patterns(ancestor, ancestor != path))
        } else {
            self.matches_patterns(path, false)
        }
    }

    /// Match one path against the pattern files, never the built-ins
    fn matches_patterns(&self, path: &Path, is_parent: bool) -> bool {
        // Pattern files only apply beneath the root
        let relative = if path.is_absolute() {
            match path.strip_prefix(&self.root) {
                Ok(rel) => rel,
                Err(_) => return false,
            }
        } else {
            path
        };
        if relative.as_os_str().is_empty() {
            return false;
        }

        let is_dir = is_parent || self.root.join(relative).is_dir();
        [&self.regenignore, &self.gitignore, &self.additional]
            .into_iter()
            .flatten()
            .any(|rules| rules.matched(relative, is_dir).is_ignore())
    }

    /// Number of active rule sources, built-ins included
    pub fn active_sources(&self) -> usize {
        1 + [&self.gitignore, &self.regenignore, &self.additional]
            .into_iter()
            .filter(|rules| rules.is_some())
            .count()
    }

    /// Directory the rules are rooted at
    pub fn root(&self) -> &Path {
        &self.root
    }
}

fn canonical_root(root: &Path) -> PathBuf {
    std::fs::canonicalize(root).unwrap_or_else(|_| root.to_path_buf())
}

/// A built-in directory among the components, or an editor temp file name
fn is_builtin_ignored(path: &Path) -> bool {
    let in_builtin_dir = path.components().any(|c| match c {
        Component::Normal(name) => name
            .to_str()
            .map(|name| BUILTIN_DIRS.contains(&name))
            .unwrap_or(false),
        _ => false,
    });
    if in_builtin_dir {
        return true;
    }

    path.file_name()
        .and_then(|name| name.to_str())
        .map(is_editor_temp)
        .unwrap_or(false)
}

/// Files editors write around a save
fn is_editor_temp(filename: &str) -> bool {
    // Vim swap files and the write-probe file
    if filename.ends_with(".swp")
        || filename.ends_with(".swo")
        || filename.ends_with(".swx")
        || filename == "4913"
    {
        return true;
    }

    // Backups (~), Emacs auto-save (#foo#) and lock files (.#foo)
    if filename.ends_with('~')
        || (filename.len() > 1 && filename.starts_with('#') && filename.ends_with('#'))
        || filename.starts_with(".#")
    {
        return true;
    }

    // OS metadata
    filename == ".DS_Store"
        || filename.starts_with("._")
        || filename == "Thumbs.db"
        || filename == "desktop.ini"
}

/// Ignore configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IgnoreConfig {
    /// Use .gitignore patterns (default: true)
    #[serde(default = "default_true")]
    pub use_gitignore: bool,

    /// Use .regenignore patterns (default: true)
    #[serde(default = "default_true")]
    pub use_regenignore: bool,

    /// Extra gitignore-syntax lines
    #[serde(default)]
    pub additional_patterns: Vec<String>,
}

impl Default for IgnoreConfig {
    fn default() -> Self {
        Self {
            use_gitignore: true,
            use_regenignore: true,
            additional_patterns: vec![],
        }
    }
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn no_files() -> IgnoreConfig {
        IgnoreConfig {
            use_gitignore: false,
            use_regenignore: false,
            additional_patterns: vec![],
        }
    }

    #[test]
    fn test_builtin_dirs_always_ignored() {
        let temp_dir = TempDir::new().unwrap();
        let rules = IgnoreRules::load(temp_dir.path(), IgnoreConfig::default()).unwrap();

        assert!(rules.should_ignore(Path::new(".git/objects/ab/cd")));
        assert!(rules.should_ignore(Path::new("sub/.git/config")));
        assert!(rules.should_ignore(Path::new(".jj/op_store/data")));
        assert!(rules.should_ignore(Path::new("target/debug/app")));
        assert!(rules.should_ignore(Path::new("web/node_modules/pkg/index.js")));

        assert!(!rules.should_ignore(Path::new("src/main.rs")));
        assert!(!rules.should_ignore(Path::new("docs/targets.md")));
    }

    #[test]
    fn test_editor_temporaries_ignored() {
        let rules = IgnoreRules::builtin(Path::new("/repo"));

        assert!(rules.should_ignore(Path::new("src/.main.rs.swp")));
        assert!(rules.should_ignore(Path::new("src/4913")));
        assert!(rules.should_ignore(Path::new("notes.txt~")));
        assert!(rules.should_ignore(Path::new("#notes.txt#")));
        assert!(rules.should_ignore(Path::new(".#notes.txt")));
        assert!(rules.should_ignore(Path::new("assets/.DS_Store")));

        assert!(!rules.should_ignore(Path::new("#")));
        assert!(!rules.should_ignore(Path::new("notes.txt")));
    }

    #[test]
    fn test_gitignore_applies_to_nested_paths() -> Result<()> {
        let temp_dir = TempDir::new()?;
        fs::write(temp_dir.path().join(".gitignore"), "*.log\nbuild/\n")?;
        fs::create_dir_all(temp_dir.path().join("build"))?;

        let config = IgnoreConfig {
            use_regenignore: false,
            ..IgnoreConfig::default()
        };
        let rules = IgnoreRules::load(temp_dir.path(), config)?;

        assert!(rules.should_ignore(Path::new("debug.log")));
        assert!(rules.should_ignore(Path::new("build")));
        assert!(rules.should_ignore(Path::new("build/out.txt")));
        assert!(rules.should_ignore(&rules.root().join("logs/app.log")));
        assert!(!rules.should_ignore(Path::new("src/lib.rs")));

        Ok(())
    }

    #[test]
    fn test_regenignore_loaded() -> Result<()> {
        let temp_dir = TempDir::new()?;
        fs::write(temp_dir.path().join(".regenignore"), "generated/\n*.bak\n")?;
        fs::create_dir_all(temp_dir.path().join("generated"))?;

        let rules = IgnoreRules::load(temp_dir.path(), IgnoreConfig::default())?;

        assert!(rules.should_ignore(Path::new("generated/index.html")));
        assert!(rules.should_ignore(Path::new("old.bak")));
        assert_eq!(rules.active_sources(), 2);

        Ok(())
    }

    #[test]
    fn test_gitignore_disabled() -> Result<()> {
        let temp_dir = TempDir::new()?;
        fs::write(temp_dir.path().join(".gitignore"), "*.log\n")?;

        let rules = IgnoreRules::load(temp_dir.path(), no_files())?;

        assert!(!rules.should_ignore(Path::new("test.log")));
        assert!(rules.should_ignore(Path::new(".git/HEAD")));

        Ok(())
    }

    #[test]
    fn test_additional_patterns() {
        let temp_dir = TempDir::new().unwrap();
        let config = IgnoreConfig {
            additional_patterns: vec!["*.tmp".to_string(), "cache/".to_string()],
            ..no_files()
        };
        fs::create_dir_all(temp_dir.path().join("cache")).unwrap();

        let rules = IgnoreRules::load(temp_dir.path(), config).unwrap();

        assert!(rules.should_ignore(Path::new("file.tmp")));
        assert!(rules.should_ignore(Path::new("cache/entry.json")));
        assert!(!rules.should_ignore(Path::new("src/main.rs")));
        assert_eq!(rules.active_sources(), 2);
    }

    #[test]
    fn test_paths_outside_root_only_use_builtins() {
        let temp_dir = TempDir::new().unwrap();
        let config = IgnoreConfig {
            additional_patterns: vec!["*.tmp".to_string()],
            ..no_files()
        };
        let rules = IgnoreRules::load(temp_dir.path(), config).unwrap();

        assert!(!rules.should_ignore(Path::new("/elsewhere/file.tmp")));
        assert!(rules.should_ignore(Path::new("/elsewhere/.git/HEAD")));
    }

    #[test]
    fn test_watch_root_name_is_not_ignored() {
        let rules = IgnoreRules::builtin(Path::new("/repo"));
        let root = Path::new("/repo/target/site");

        assert!(!rules.should_ignore_under(&root.join("index.html"), root));
        assert!(!rules.should_ignore_under(&root.join("css/main.css"), root));
        assert!(!rules.should_ignore_under(root, root));

        // Built-ins still apply below the watch root
        assert!(rules.should_ignore_under(&root.join(".git/HEAD"), root));
        assert!(rules.should_ignore_under(&root.join("node_modules/x.js"), root));
        assert!(rules.should_ignore_under(&root.join("page.md~"), root));
    }

    #[test]
    fn test_ancestors_outside_root_are_not_ignored() {
        let rules = IgnoreRules::builtin(Path::new("/repo"));
        let root = Path::new("/srv/target/docs");

        assert!(!rules.should_ignore_under(&root.join("page.md"), root));
        assert!(rules.should_ignore_under(&root.join("target/out.html"), root));
    }

    #[test]
    fn test_patterns_stop_at_watch_root() -> Result<()> {
        let temp_dir = TempDir::new()?;
        fs::write(temp_dir.path().join(".gitignore"), "build/\n*.log\n")?;
        fs::create_dir_all(temp_dir.path().join("build/html"))?;

        let rules = IgnoreRules::load(temp_dir.path(), IgnoreConfig::default())?;
        let build = rules.root().join("build");

        // Watching the ignored directory itself still reports its files
        assert!(!rules.should_ignore_under(&build.join("html/index.html"), &build));
        assert!(rules.should_ignore_under(&build.join("html/debug.log"), &build));

        // Watching from the rules root keeps the directory ignored
        assert!(rules.should_ignore_under(&build.join("html/index.html"), rules.root()));

        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_root_is_canonicalized() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let real = temp_dir.path().join("real");
        let link = temp_dir.path().join("link");
        fs::create_dir_all(&real)?;
        std::os::unix::fs::symlink(&real, &link)?;

        let config = IgnoreConfig {
            additional_patterns: vec!["*.tmp".to_string()],
            ..no_files()
        };
        let rules = IgnoreRules::load(&link, config)?;

        assert_eq!(rules.root(), fs::canonicalize(&real)?);
        assert!(rules.should_ignore(&fs::canonicalize(&real)?.join("scratch.tmp")));

        Ok(())
    }

    #[test]
    fn test_reload_picks_up_new_file() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let mut rules = IgnoreRules::load(temp_dir.path(), IgnoreConfig::default())?;
        assert!(!rules.should_ignore(Path::new("test.log")));

        fs::write(temp_dir.path().join(".gitignore"), "*.log\n")?;
        rules.reload()?;

        assert!(rules.should_ignore(Path::new("test.log")));
        Ok(())
    }

    #[test]
    fn test_config_defaults_from_toml() {
        let config: IgnoreConfig = toml::from_str("additional_patterns = [\"*.o\"]").unwrap();
        assert!(config.use_gitignore);
        assert!(config.use_regenignore);
        assert_eq!(config.additional_patterns, vec!["*.o"]);
    }
}
