//! Bundle Orchestrator
//!
//! One bundle per locale, concatenated in a fixed order: library scripts, the
//! runtime engine, the locale table assignment, application scripts, then every
//! widget module ordered by widget directory. Bundles are rewritten in full on
//! every build.

use flate2::write::GzEncoder;
use flate2::Compression;
use oxc_allocator::Allocator;
use oxc_codegen::{Codegen, CodegenOptions};
use oxc_parser::Parser;
use oxc_span::SourceType;
use rayon::prelude::*;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::assemble::{assemble_widget, cache_key_material, AssembleContext, WidgetDefinition};
use crate::cache::IncrementalCache;
use crate::discovery::{self, LocaleSource, WidgetSource};
use crate::error::BuildError;

/// Client engine used when the project does not configure its own.
pub const DEFAULT_ENGINE: &str = include_str!("runtime/engine.js");

/// Locale-independent pieces of every bundle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BundleParts {
    pub library: String,
    pub engine: String,
    pub application: String,
    pub modules: String,
}

impl BundleParts {
    /// The bundle text for one locale table.
    pub fn compose(&self, text_global: &str, locale_text: &str) -> String {
        let mut out = String::new();
        puts(&mut out, &self.library);
        puts(&mut out, &self.engine);
        puts(&mut out, &format!("{} = {};", text_global, locale_text.trim_end()));
        puts(&mut out, &self.application);
        puts(&mut out, &self.modules);
        out
    }
}

/// Append `text` as a line: a newline is added unless it already ends in one.
fn puts(out: &mut String, text: &str) {
    out.push_str(text);
    if !text.ends_with('\n') {
        out.push('\n');
    }
}

pub fn bundle_file_name(locale: &str) -> String {
    format!("compiled.{}.js", locale)
}

/// Contents of `paths` joined by newlines.
pub fn read_joined(paths: &[PathBuf]) -> Result<String, BuildError> {
    let mut parts = Vec::with_capacity(paths.len());
    for path in paths {
        parts.push(fs::read_to_string(path).map_err(|e| BuildError::io(path, e))?);
    }
    Ok(parts.join("\n"))
}

// ═══════════════════════════════════════════════════════════════════════════════
// WIDGETS
// ═══════════════════════════════════════════════════════════════════════════════

/// Assemble every widget in parallel. The result keeps the order of `widgets`.
pub fn assemble_all(
    ctx: &AssembleContext<'_>,
    widgets: &[WidgetSource],
    cache: Option<&IncrementalCache>,
) -> Result<Vec<WidgetDefinition>, BuildError> {
    widgets
        .par_iter()
        .map(|widget| {
            let Some(cache) = cache else {
                return assemble_widget(ctx, widget);
            };
            let material = cache_key_material(widget, ctx.common, ctx.compiler)?;
            let hash = IncrementalCache::compute_hash(&material);
            if let Some(cached) = cache.get(&widget.name, &hash) {
                return Ok(cached);
            }
            let definition = assemble_widget(ctx, widget)?;
            cache.set(&hash, &definition);
            Ok(definition)
        })
        .collect()
}

pub fn modules_text(definitions: &[WidgetDefinition]) -> String {
    definitions
        .iter()
        .map(WidgetDefinition::to_module)
        .collect::<Vec<_>>()
        .join("\n")
}

// ═══════════════════════════════════════════════════════════════════════════════
// LOCALES
// ═══════════════════════════════════════════════════════════════════════════════

/// Raw locale table text. Tables that are not valid JSON are still embedded.
pub fn read_locale(locale: &LocaleSource) -> Result<String, BuildError> {
    let text = fs::read_to_string(&locale.path).map_err(|e| BuildError::io(&locale.path, e))?;
    if let Err(e) = serde_json::from_str::<serde_json::Value>(&text) {
        warn!("locale {} is not plain JSON ({}), embedding as-is", locale.name, e);
    }
    Ok(text)
}

/// Write `compiled.<locale>.js` for every locale. Returns the written paths.
pub fn write_bundles(
    parts: &BundleParts,
    locales: &[LocaleSource],
    text_global: &str,
    output_dir: &Path,
) -> Result<Vec<PathBuf>, BuildError> {
    fs::create_dir_all(output_dir).map_err(|e| BuildError::io(output_dir, e))?;
    let mut written = Vec::with_capacity(locales.len());
    for locale in locales {
        let target = output_dir.join(bundle_file_name(&locale.name));
        let text = parts.compose(text_global, &read_locale(locale)?);
        fs::write(&target, text).map_err(|e| BuildError::io(&target, e))?;
        info!("wrote {}", target.display());
        written.push(target);
    }
    if locales.is_empty() {
        warn!("no locales found, no bundles written");
    }
    Ok(written)
}

/// Script and engine pieces read from the project tree. Without a configured
/// engine file the bundled [`DEFAULT_ENGINE`] is used.
pub fn load_parts(
    js_dir: &Path,
    engine: Option<&Path>,
    definitions: &[WidgetDefinition],
) -> Result<BundleParts, BuildError> {
    let scripts = discovery::partition_scripts(js_dir)?;
    debug!(
        "{} library scripts, {} application scripts",
        scripts.library.len(),
        scripts.application.len()
    );
    let engine = match engine {
        Some(path) if !path.is_file() => {
            return Err(BuildError::MissingEngine(path.to_path_buf()));
        }
        Some(path) => fs::read_to_string(path).map_err(|e| BuildError::io(path, e))?,
        None => DEFAULT_ENGINE.to_string(),
    };
    Ok(BundleParts {
        library: read_joined(&scripts.library)?,
        engine,
        application: read_joined(&scripts.application)?,
        modules: modules_text(definitions),
    })
}

// ═══════════════════════════════════════════════════════════════════════════════
// FINALIZE
// ═══════════════════════════════════════════════════════════════════════════════

/// Minified form of a script, or `None` when it does not parse.
pub fn minify(source: &str) -> Option<String> {
    let allocator = Allocator::default();
    let source_type = SourceType::default().with_module(false);
    let ret = Parser::new(&allocator, source, source_type).parse();
    if !ret.errors.is_empty() || ret.panicked {
        return None;
    }
    Some(
        Codegen::new()
            .with_options(CodegenOptions::minify())
            .build(&ret.program)
            .code,
    )
}

/// Minify a bundle in place and write its gzip sibling `<bundle>.gz`.
pub fn finalize_bundle(path: &Path) -> Result<PathBuf, BuildError> {
    let text = fs::read_to_string(path).map_err(|e| BuildError::io(path, e))?;
    let text = match minify(&text) {
        Some(minified) => {
            fs::write(path, &minified).map_err(|e| BuildError::io(path, e))?;
            minified
        }
        None => {
            warn!("{} does not parse, leaving it unminified", path.display());
            text
        }
    };

    let mut gz_name = path.as_os_str().to_os_string();
    gz_name.push(".gz");
    let gz_path = PathBuf::from(gz_name);

    let mut encoder = GzEncoder::new(Vec::new(), Compression::best());
    encoder
        .write_all(text.as_bytes())
        .map_err(|e| BuildError::io(&gz_path, e))?;
    let compressed = encoder.finish().map_err(|e| BuildError::io(&gz_path, e))?;
    fs::write(&gz_path, compressed).map_err(|e| BuildError::io(&gz_path, e))?;
    info!("finalized {}", gz_path.display());
    Ok(gz_path)
}
