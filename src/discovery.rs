//! Discovery Module
//!
//! Scans the project tree for widget directories, loose scripts and locale
//! tables. Every listing is sorted so that builds are reproducible.

use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::BuildError;

// ═══════════════════════════════════════════════════════════════════════════════
// METADATA TYPES
// ═══════════════════════════════════════════════════════════════════════════════

/// File that marks a directory as a widget.
pub const WIDGET_SOURCE: &str = "source.js";
/// Optional static code spliced into the widget's definition scope.
pub const WIDGET_STATIC: &str = "static.js";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WidgetSource {
    /// Dotted name derived from the directory path, `Example.HelloWorld`.
    pub name: String,
    pub dir: PathBuf,
}

impl WidgetSource {
    pub fn source_file(&self) -> PathBuf {
        self.dir.join(WIDGET_SOURCE)
    }

    pub fn static_file(&self) -> PathBuf {
        self.dir.join(WIDGET_STATIC)
    }
}

/// Loose scripts split by load order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptPartition {
    /// Loaded before the runtime engine.
    pub library: Vec<PathBuf>,
    /// Loaded after the locale table.
    pub application: Vec<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocaleSource {
    pub name: String,
    pub path: PathBuf,
}

// ═══════════════════════════════════════════════════════════════════════════════
// WIDGET DISCOVERY
// ═══════════════════════════════════════════════════════════════════════════════

/// Every directory under `widgets_dir` holding a `source.js`, ordered by directory path.
pub fn discover_widgets(widgets_dir: &Path) -> Result<Vec<WidgetSource>, BuildError> {
    let mut widgets: Vec<WidgetSource> = files_recursive(widgets_dir, &["js"])?
        .into_iter()
        .filter(|path| path.file_name().map(|n| n == WIDGET_SOURCE).unwrap_or(false))
        .filter_map(|path| {
            let dir = path.parent()?.to_path_buf();
            let name = widget_name(widgets_dir, &dir)?;
            Some(WidgetSource { name, dir })
        })
        .collect();
    widgets.sort_by(|a, b| a.dir.cmp(&b.dir));
    Ok(widgets)
}

/// `widgets/Example/HelloWorld` -> `Example.HelloWorld`
pub fn widget_name(widgets_dir: &Path, dir: &Path) -> Option<String> {
    let relative = dir.strip_prefix(widgets_dir).ok()?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("."))
    }
}

/// Directory of a dotted widget name below `root`.
pub fn widget_dir(root: &Path, name: &str) -> PathBuf {
    name.split('.').fold(root.to_path_buf(), |dir, part| dir.join(part))
}

// ═══════════════════════════════════════════════════════════════════════════════
// SCRIPTS AND LOCALES
// ═══════════════════════════════════════════════════════════════════════════════

/// Scripts whose file name starts with a non-upper-case character are library
/// code; the rest are application code. Each group keeps full-path order.
pub fn partition_scripts(js_dir: &Path) -> Result<ScriptPartition, BuildError> {
    let (library, application) = files_recursive(js_dir, &["js"])?
        .into_iter()
        .partition(|path| is_library_script(path));
    Ok(ScriptPartition {
        library,
        application,
    })
}

pub fn is_library_script(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .and_then(|n| n.chars().next())
        .map(|c| !c.is_uppercase())
        .unwrap_or(true)
}

/// One locale per `*.js`/`*.json` file in `locale_dir`, named by file stem.
pub fn discover_locales(locale_dir: &Path) -> Result<Vec<LocaleSource>, BuildError> {
    let mut locales: Vec<LocaleSource> = files_with_extensions(locale_dir, &["js", "json"])?
        .into_iter()
        .filter_map(|path| {
            let name = path.file_stem()?.to_str()?.to_string();
            Some(LocaleSource { name, path })
        })
        .collect();
    locales.sort_by(|a, b| a.name.cmp(&b.name));
    locales.dedup_by(|a, b| a.name == b.name);
    Ok(locales)
}

// ═══════════════════════════════════════════════════════════════════════════════
// FILE LISTING
// ═══════════════════════════════════════════════════════════════════════════════

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| extensions.contains(&e))
        .unwrap_or(false)
}

/// Files directly inside `dir` with one of `extensions`, sorted. A missing
/// directory yields an empty list.
pub fn files_with_extensions(dir: &Path, extensions: &[&str]) -> Result<Vec<PathBuf>, BuildError> {
    list_files(dir, Some(1), extensions)
}

/// Files anywhere below `dir` with one of `extensions`, sorted by full path.
pub fn files_recursive(dir: &Path, extensions: &[&str]) -> Result<Vec<PathBuf>, BuildError> {
    list_files(dir, None, extensions)
}

/// Every file below `dir`, any extension.
pub fn all_files(dir: &Path) -> Result<Vec<PathBuf>, BuildError> {
    list_files(dir, None, &[])
}

fn list_files(
    dir: &Path,
    max_depth: Option<usize>,
    extensions: &[&str],
) -> Result<Vec<PathBuf>, BuildError> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut walker = WalkDir::new(dir).follow_links(true).sort_by_file_name();
    if let Some(depth) = max_depth {
        walker = walker.max_depth(depth);
    }

    let mut files = Vec::new();
    for entry in walker {
        let entry = entry.map_err(|e| {
            let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| dir.to_path_buf());
            BuildError::io(path, e.into())
        })?;
        let path = entry.path();
        if path.is_file() && (extensions.is_empty() || has_extension(path, extensions)) {
            files.push(path.to_path_buf());
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "").unwrap();
    }

    #[test]
    fn test_discover_widgets_dotted_names() {
        let dir = tempfile::tempdir().unwrap();
        let widgets = dir.path().join("widgets");
        touch(&widgets.join("Example/HelloWorld/source.js"));
        touch(&widgets.join("Example/HelloWorld/main.html"));
        touch(&widgets.join("Basic/source.js"));
        touch(&widgets.join("Empty/readme.txt"));

        let found = discover_widgets(&widgets).unwrap();
        let names: Vec<&str> = found.iter().map(|w| w.name.as_str()).collect();
        assert_eq!(names, vec!["Basic", "Example.HelloWorld"]);
        assert_eq!(found[1].dir, widgets.join("Example/HelloWorld"));
    }

    #[test]
    fn test_partition_by_first_letter() {
        let dir = tempfile::tempdir().unwrap();
        let js = dir.path().join("js");
        for name in ["jquery.js", "B.js", "a.js", "sub/App.js", "sub/util.js", "_x.js"] {
            touch(&js.join(name));
        }
        let parts = partition_scripts(&js).unwrap();
        let file_names = |v: &[PathBuf]| -> Vec<String> {
            v.iter()
                .map(|p| p.strip_prefix(&js).unwrap().to_string_lossy().to_string())
                .collect()
        };
        assert_eq!(
            file_names(&parts.library),
            vec!["_x.js", "a.js", "jquery.js", "sub/util.js"]
        );
        assert_eq!(file_names(&parts.application), vec!["B.js", "sub/App.js"]);
    }

    #[test]
    fn test_discover_locales() {
        let dir = tempfile::tempdir().unwrap();
        let locale = dir.path().join("locale");
        touch(&locale.join("fr.js"));
        touch(&locale.join("en.json"));
        touch(&locale.join("notes.txt"));
        let names: Vec<String> = discover_locales(&locale)
            .unwrap()
            .into_iter()
            .map(|l| l.name)
            .collect();
        assert_eq!(names, vec!["en", "fr"]);
    }

    #[test]
    fn test_missing_dirs_are_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(discover_widgets(&dir.path().join("nope")).unwrap().is_empty());
        assert!(discover_locales(&dir.path().join("nope")).unwrap().is_empty());
    }

    #[test]
    fn test_widget_dir_roundtrip() {
        let root = Path::new("/w");
        let dir = widget_dir(root, "Example.HelloWorld");
        assert_eq!(dir, Path::new("/w/Example/HelloWorld"));
        assert_eq!(widget_name(root, &dir).as_deref(), Some("Example.HelloWorld"));
    }
}
