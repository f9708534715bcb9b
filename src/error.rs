//! Error types for the build pipeline and the runtime engine.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

// ═══════════════════════════════════════════════════════════════════════════════
// TEMPLATE LANGUAGE
// ═══════════════════════════════════════════════════════════════════════════════

/// Syntax error in a markup template, located by byte offset into the normalized source.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} (at offset {offset})")]
pub struct TemplateError {
    pub message: String,
    pub offset: usize,
}

impl TemplateError {
    pub fn new(message: impl Into<String>, offset: usize) -> Self {
        Self {
            message: message.into(),
            offset,
        }
    }
}

/// Failure while evaluating a parsed template against a context.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    #[error("missing helper: {0}")]
    MissingHelper(String),
    #[error("helper {helper} failed: {message}")]
    Helper { helper: String, message: String },
}

// ═══════════════════════════════════════════════════════════════════════════════
// STYLE COMPILER
// ═══════════════════════════════════════════════════════════════════════════════

/// Failure reported by a [`crate::style::StyleCompiler`]. The message is the compiler's own.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct StyleError {
    pub message: String,
    pub line: Option<usize>,
}

impl StyleError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            line: None,
        }
    }

    pub fn at_line(message: impl Into<String>, line: usize) -> Self {
        Self {
            message: format!("{} on line {}", message.into(), line),
            line: Some(line),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// BUILD
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid configuration in {path}: {message}")]
    Config { path: PathBuf, message: String },

    #[error("widget {widget}: {message}")]
    Signature { widget: String, message: String },

    #[error("widget {widget}, template {template}: {source}")]
    Template {
        widget: String,
        template: String,
        #[source]
        source: TemplateError,
    },

    #[error("Style exception processing {file} - content saved to {saved}\n{source}")]
    Style {
        file: PathBuf,
        saved: PathBuf,
        #[source]
        source: StyleError,
    },

    #[error("runtime engine source not found at {0}")]
    MissingEngine(PathBuf),

    #[error("Unknown widget {0}")]
    UnknownWidget(String),

    #[error("Widget test dir {0} does not exist")]
    MissingTestDir(PathBuf),

    #[error("Widget has no test files in {0}")]
    NoTestFiles(PathBuf),
}

impl BuildError {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        BuildError::Io {
            path: path.into(),
            source,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// RUNTIME
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    #[error("Object must not already exist for a widget to be defined: {0}")]
    DefinitionConflict(String),

    #[error("Invalid widget class {0}")]
    UnknownWidget(String),

    #[error("widget {widget} has no public method {method}")]
    UnknownMethod { widget: String, method: String },

    #[error("template syntax error: {0}")]
    Template(#[from] TemplateError),

    #[error("render failed: {0}")]
    Render(#[from] RenderError),

    #[error("invalid locale table: {0}")]
    Locale(String),

    #[error("{0}")]
    Widget(String),
}
