//! # Alcove
//!
//! Widgets are directories holding a `source.js` body, markup templates and
//! style rules. This crate has two halves:
//!
//! 1. **Build pipeline**: [`Builder`] discovers widgets, rewrites each
//!    widget signature, compiles its templates and scoped styles, assembles a
//!    self-registering module and writes one bundle per locale in a fixed order
//!    (library scripts, runtime engine, locale table, application scripts,
//!    widget modules).
//!
//! 2. **Runtime engine**: [`Runtime`] defines widget classes, renders
//!    templates into live node trees, resolves `node`/`widget`/`template`
//!    placeholders through id-keyed tables and rerenders a [`RenderHandle`] in
//!    place so anything holding the handle keeps seeing live content.

pub mod assemble;
pub mod builder;
pub mod bundle;
pub mod cache;
pub mod config;
pub mod discovery;
pub mod error;
pub mod harness;
pub mod renderer;
pub mod runtime;
pub mod signature;
pub mod style;
pub mod template;


pub use assemble::WidgetDefinition;
pub use builder::{BuildReport, Builder};
pub use config::BuildConfig;
pub use error::{BuildError, RenderError, RuntimeError, StyleError, TemplateError};
pub use runtime::{
    LocaleTable, Methods, RenderHandle, Runtime, WidgetInstance, WidgetScope, WidgetSpec,
};
pub use template::{Template, TemplateTable};
