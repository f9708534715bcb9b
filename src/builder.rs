//! Project builder.
//!
//! Drives a full build of one project directory: static assets, one bundle per
//! locale, then top-level stylesheets. Also owns the staleness check used to
//! decide whether a rebuild is due.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tracing::{debug, info};

use crate::assemble::AssembleContext;
use crate::bundle;
use crate::cache::IncrementalCache;
use crate::config::{BuildConfig, CONFIG_FILE, SCAFFOLD_ENGINE};
use crate::discovery;
use crate::error::BuildError;
use crate::style::{self, StyleOptions};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildReport {
    pub widgets: usize,
    pub bundles: Vec<PathBuf>,
    pub compressed: Vec<PathBuf>,
    pub stylesheets: Vec<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct Builder {
    base_dir: PathBuf,
    config: BuildConfig,
    use_cache: bool,
}

impl Builder {
    pub fn new(base_dir: impl Into<PathBuf>, config: BuildConfig) -> Self {
        Self {
            base_dir: base_dir.into(),
            config,
            use_cache: true,
        }
    }

    /// Builder for `base_dir`, configured from its `alcove.toml` when present.
    pub fn load(base_dir: impl Into<PathBuf>) -> Result<Self, BuildError> {
        let base_dir = base_dir.into();
        let config = BuildConfig::load(&base_dir)?;
        Ok(Self::new(base_dir, config))
    }

    pub fn without_cache(mut self) -> Self {
        self.use_cache = false;
        self
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    /// A configured path resolved against the base directory.
    pub fn dir(&self, relative: &Path) -> PathBuf {
        self.base_dir.join(relative)
    }

    pub fn output_dir(&self) -> PathBuf {
        self.dir(&self.config.output)
    }

    /// The configured engine script, if any.
    pub fn engine_path(&self) -> Option<PathBuf> {
        self.config.engine.as_deref().map(|p| self.dir(p))
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // BUILD
    // ═══════════════════════════════════════════════════════════════════════════

    /// Remove and recreate the output directory.
    pub fn clean(&self) -> Result<(), BuildError> {
        let output = self.output_dir();
        if output.exists() {
            fs::remove_dir_all(&output).map_err(|e| BuildError::io(&output, e))?;
        }
        fs::create_dir_all(&output).map_err(|e| BuildError::io(&output, e))?;
        debug!("cleaned {}", output.display());
        Ok(())
    }

    pub fn build(&self, finalize: bool) -> Result<BuildReport, BuildError> {
        let output = self.output_dir();
        fs::create_dir_all(&output).map_err(|e| BuildError::io(&output, e))?;

        self.copy_static()?;
        let mut report = self.build_scripts(finalize)?;
        report.stylesheets = self.build_stylesheets(finalize)?;
        info!(
            "built {} widgets into {} bundles",
            report.widgets,
            report.bundles.len()
        );
        Ok(report)
    }

    fn build_scripts(&self, finalize: bool) -> Result<BuildReport, BuildError> {
        let compiler = style::compiler_for(&self.config);
        let common = style::load_common(&self.dir(&self.config.common_less))?;
        let style_dir = self.dir(&self.config.style);
        let output = self.output_dir();
        let ctx = AssembleContext {
            compiler: compiler.as_ref(),
            common: &common,
            style_dir: &style_dir,
            output_dir: &output,
        };

        let widgets = discovery::discover_widgets(&self.dir(&self.config.widgets))?;
        let cache = self
            .use_cache
            .then(|| IncrementalCache::new(&self.dir(&self.config.cache)));
        let definitions = bundle::assemble_all(&ctx, &widgets, cache.as_ref())?;

        let parts = bundle::load_parts(
            &self.dir(&self.config.js),
            self.engine_path().as_deref(),
            &definitions,
        )?;
        let locales = discovery::discover_locales(&self.dir(&self.config.locale))?;
        let bundles = bundle::write_bundles(&parts, &locales, &self.config.text_global, &output)?;

        let mut compressed = Vec::new();
        if finalize {
            for path in &bundles {
                compressed.push(bundle::finalize_bundle(path)?);
            }
        }

        Ok(BuildReport {
            widgets: definitions.len(),
            bundles,
            compressed,
            stylesheets: Vec::new(),
        })
    }

    /// Compile each top-level `style/*.css|*.less` into `output/<stem>.css`.
    fn build_stylesheets(&self, finalize: bool) -> Result<Vec<PathBuf>, BuildError> {
        let compiler = style::compiler_for(&self.config);
        let common = style::load_common(&self.dir(&self.config.common_less))?;
        let style_dir = self.dir(&self.config.style);
        let output = self.output_dir();
        let options = StyleOptions {
            compress: finalize,
            include_paths: vec![style_dir.clone()],
        };

        let mut written = Vec::new();
        for file in style::style_files(&style_dir)? {
            let content =
                common.clone() + &fs::read_to_string(&file).map_err(|e| BuildError::io(&file, e))?;
            let css = style::compile_or_persist(
                compiler.as_ref(),
                &content,
                &options,
                &file,
                &output.join(style::DIAGNOSTIC_FILE),
            )?;
            let stem = file
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default();
            let target = output.join(format!("{}.css", stem));
            fs::write(&target, format!("{}\n", css)).map_err(|e| BuildError::io(&target, e))?;
            written.push(target);
        }
        Ok(written)
    }

    /// Copy everything under the static directory into the output directory.
    fn copy_static(&self) -> Result<(), BuildError> {
        let static_dir = self.dir(&self.config.static_dir);
        let output = self.output_dir();
        for file in discovery::all_files(&static_dir)? {
            let Ok(relative) = file.strip_prefix(&static_dir) else {
                continue;
            };
            let target = output.join(relative);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).map_err(|e| BuildError::io(parent, e))?;
            }
            fs::copy(&file, &target).map_err(|e| BuildError::io(&file, e))?;
        }
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // STALENESS
    // ═══════════════════════════════════════════════════════════════════════════

    /// True when the oldest output file is at least as new as the newest source
    /// file, compared in whole seconds. No outputs means stale.
    pub fn is_up_to_date(&self) -> Result<bool, BuildError> {
        let mut newest_source = 0;
        for dir in self.config.source_dirs(&self.base_dir) {
            for file in discovery::all_files(&dir)? {
                newest_source = newest_source.max(mtime_secs(&file)?);
            }
        }
        if let Some(engine) = self.engine_path().filter(|p| p.is_file()) {
            newest_source = newest_source.max(mtime_secs(&engine)?);
        }

        let mut oldest_output: Option<u64> = None;
        for file in discovery::all_files(&self.output_dir())? {
            let modified = mtime_secs(&file)?;
            oldest_output = Some(oldest_output.map_or(modified, |o| o.min(modified)));
        }

        Ok(oldest_output.map_or(false, |oldest| oldest >= newest_source))
    }

    /// Clean and rebuild when stale. Returns whether a rebuild ran.
    pub fn rebuild_if_stale(&self) -> Result<bool, BuildError> {
        if self.is_up_to_date()? {
            return Ok(false);
        }
        info!("Rebuilding");
        self.clean()?;
        self.build(false)?;
        Ok(true)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // SCAFFOLDING
    // ═══════════════════════════════════════════════════════════════════════════

    /// Create `<base>/<name>` with every configured directory inside it, a
    /// copy of the bundled engine, and an `alcove.toml` pointing at that copy.
    pub fn new_app(&self, name: &str) -> Result<PathBuf, BuildError> {
        let app_dir = self.base_dir.join(name);
        fs::create_dir_all(&app_dir).map_err(|e| BuildError::io(&app_dir, e))?;
        for dir in self.config.all_dirs() {
            let dir = app_dir.join(dir);
            fs::create_dir_all(&dir).map_err(|e| BuildError::io(&dir, e))?;
        }

        let engine = self
            .config
            .engine
            .clone()
            .unwrap_or_else(|| PathBuf::from(SCAFFOLD_ENGINE));
        let engine_file = app_dir.join(&engine);
        if let Some(parent) = engine_file.parent() {
            fs::create_dir_all(parent).map_err(|e| BuildError::io(parent, e))?;
        }
        if !engine_file.exists() {
            fs::write(&engine_file, bundle::DEFAULT_ENGINE)
                .map_err(|e| BuildError::io(&engine_file, e))?;
        }

        let config_file = app_dir.join(CONFIG_FILE);
        if !config_file.exists() {
            let config = BuildConfig {
                engine: Some(engine),
                ..self.config.clone()
            };
            let text = toml::to_string(&config).map_err(|e| BuildError::Config {
                path: config_file.clone(),
                message: e.to_string(),
            })?;
            fs::write(&config_file, text).map_err(|e| BuildError::io(&config_file, e))?;
        }
        info!("created {}", app_dir.display());
        Ok(app_dir)
    }
}

fn mtime_secs(path: &Path) -> Result<u64, BuildError> {
    let modified = fs::metadata(path)
        .and_then(|m| m.modified())
        .map_err(|e| BuildError::io(path, e))?;
    Ok(modified
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs())
}
