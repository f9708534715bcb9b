//! Widget Module Assembler
//!
//! Merges the rewritten body, the template table, the scoped stylesheet and the
//! dotted name of one widget into a self-registering module by substituting
//! `$$NAME$$`-style placeholders into a fixed wrapper.

use lazy_static::lazy_static;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::discovery::{self, WidgetSource};
use crate::error::BuildError;
use crate::signature::rewrite_signature;
use crate::style::{self, StyleCompiler};
use crate::template::{json_string, module_literal, TemplateTable};

// ═══════════════════════════════════════════════════════════════════════════════
// MODULE WRAPPER
// ═══════════════════════════════════════════════════════════════════════════════

/// Registration wrapper every widget module is built from. The runtime engine
/// provides `Alcove.define` and `Alcove.container`.
pub const MODULE_WRAPPER: &str = r#"Alcove.define("$$NAME$$", function($$cls) {
    $$STATIC$$

    this({
        templates  : $$TEMPLATES$$,
        css        : $$CSS$$,
        initialize : function($$widget, methods, args) {
            var $$container = Alcove.container("$$CLASS$$");
            var $$display   = function(nodes) { $$container.display(nodes); };
            var $$template  = methods.template;
            var $$text      = methods.text;
            $$BODY$$
            return $$container;
        }
    });

});
"#;

lazy_static! {
    static ref PLACEHOLDER_RE: Regex = Regex::new(r"\$\$[A-Z]*?\$\$").unwrap();
}

/// Replace every `$$KEY$$` token in a single pass. Keys are given without the
/// dollar signs; unknown keys become empty. Substituted text is never rescanned.
pub fn fill_placeholders(template: &str, values: &HashMap<&str, String>) -> String {
    PLACEHOLDER_RE
        .replace_all(template, |caps: &Captures| {
            let token = &caps[0];
            let key = &token[2..token.len() - 2];
            values.get(key).cloned().unwrap_or_default()
        })
        .into_owned()
}

// ═══════════════════════════════════════════════════════════════════════════════
// WIDGET DEFINITION
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetDefinition {
    pub name: String,
    /// Body with parameters already bound from `args`.
    pub body: String,
    pub params: Vec<String>,
    pub static_code: Option<String>,
    /// Normalized markup by template name.
    pub templates: BTreeMap<String, String>,
    /// Compiled, class-scoped stylesheet. Empty when the widget has no styles.
    pub css: String,
}

impl WidgetDefinition {
    pub fn class_name(&self) -> String {
        style::class_name(&self.name)
    }

    /// Module text for the bundle. Same definition, same bytes.
    pub fn to_module(&self) -> String {
        let mut values = HashMap::new();
        values.insert("BODY", self.body.clone());
        values.insert("CLASS", self.class_name());
        values.insert("CSS", json_string(&self.css));
        values.insert("NAME", self.name.clone());
        values.insert("STATIC", self.static_code.clone().unwrap_or_default());
        values.insert("TEMPLATES", module_literal(&self.templates));
        fill_placeholders(MODULE_WRAPPER, &values)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ASSEMBLY
// ═══════════════════════════════════════════════════════════════════════════════

/// Build-wide inputs shared by every widget.
pub struct AssembleContext<'a> {
    pub compiler: &'a dyn StyleCompiler,
    /// Shared style rules prepended to every widget stylesheet.
    pub common: &'a str,
    /// Extra include path handed to the style compiler.
    pub style_dir: &'a Path,
    /// Where failing style source is persisted.
    pub output_dir: &'a Path,
}

pub fn assemble_widget(
    ctx: &AssembleContext<'_>,
    widget: &WidgetSource,
) -> Result<WidgetDefinition, BuildError> {
    debug!("assembling widget {}", widget.name);

    let source_file = widget.source_file();
    let source = fs::read_to_string(&source_file).map_err(|e| BuildError::io(&source_file, e))?;
    let rewritten =
        rewrite_signature(source.trim()).map_err(|message| BuildError::Signature {
            widget: widget.name.clone(),
            message,
        })?;

    let static_file = widget.static_file();
    let static_code = if static_file.is_file() {
        Some(fs::read_to_string(&static_file).map_err(|e| BuildError::io(&static_file, e))?)
    } else {
        None
    };

    let templates = TemplateTable::load_dir(&widget.dir, &widget.name)?.sources();

    let css = style::scope_widget_styles(
        ctx.compiler,
        &widget.dir,
        &widget.name,
        ctx.common,
        ctx.style_dir,
        ctx.output_dir,
    )?;

    Ok(WidgetDefinition {
        name: widget.name.clone(),
        body: rewritten.body,
        params: rewritten.params,
        static_code,
        templates,
        css,
    })
}

/// Files whose content determines a widget's module, in a stable order.
pub fn widget_inputs(widget: &WidgetSource) -> Result<Vec<PathBuf>, BuildError> {
    let mut inputs = vec![widget.source_file()];
    if widget.static_file().is_file() {
        inputs.push(widget.static_file());
    }
    inputs.extend(discovery::files_with_extensions(&widget.dir, &["html"])?);
    inputs.extend(style::style_files(&widget.dir)?);
    Ok(inputs)
}

/// Text that changes whenever any input of the widget's module changes,
/// including the style compiler that produced its CSS.
pub fn cache_key_material(
    widget: &WidgetSource,
    common: &str,
    compiler: &dyn StyleCompiler,
) -> Result<String, BuildError> {
    let mut material = format!("{}\0{}\0{}\0", widget.name, compiler.identity(), common);
    for path in widget_inputs(widget)? {
        let content = fs::read_to_string(&path).map_err(|e| BuildError::io(&path, e))?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        material.push_str(&file_name);
        material.push('\0');
        material.push_str(&content);
        material.push('\0');
    }
    Ok(material)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::style::{BuiltinStyleCompiler, LesscStyleCompiler};

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn hello_world(root: &Path) -> WidgetSource {
        let dir = root.join("widgets/Example/HelloWorld");
        write(
            &dir.join("source.js"),
            "return function(message_key) {\n    var main = $$template('main', { msg: $$text(message_key) });\n    $$display(main);\n};\n",
        );
        write(&dir.join("main.html"), "<div>\n  <a href=\"#\">{{msg}}</a>\n</div>\n");
        write(&dir.join("style.less"), "a { color: red; }");
        WidgetSource {
            name: "Example.HelloWorld".to_string(),
            dir,
        }
    }

    #[test]
    fn test_fill_placeholders_single_pass() {
        let mut values = HashMap::new();
        values.insert("NAME", "$$BODY$$".to_string());
        values.insert("BODY", "body".to_string());
        let out = fill_placeholders("[$$NAME$$][$$BODY$$][$$MISSING$$][$$container]", &values);
        assert_eq!(out, "[$$BODY$$][body][][$$container]");
    }

    #[test]
    fn test_assemble_hello_world() {
        let dir = tempfile::tempdir().unwrap();
        let widget = hello_world(dir.path());
        let ctx = AssembleContext {
            compiler: &BuiltinStyleCompiler,
            common: "\n",
            style_dir: &dir.path().join("style"),
            output_dir: &dir.path().join("output"),
        };
        let def = assemble_widget(&ctx, &widget).unwrap();
        assert_eq!(def.params, vec!["message_key"]);
        assert_eq!(def.class_name(), "Example_HelloWorld");
        assert_eq!(def.css, ".Example_HelloWorld a{color:red}");
        assert_eq!(
            def.templates.get("main").map(String::as_str),
            Some("<div><a href=\"#\">{{msg}}</a></div>")
        );
        assert!(def.static_code.is_none());

        let module = def.to_module();
        assert!(module.starts_with("Alcove.define(\"Example.HelloWorld\", function($$cls) {"));
        assert!(module.contains("Alcove.container(\"Example_HelloWorld\")"));
        assert!(module.contains("css        : \".Example_HelloWorld a{color:red}\""));
        assert!(module.contains("var message_key = args[0];"));
        assert!(module.contains("var $$callbacks = args[1] || {};"));
        assert!(module.contains("\"main\":Alcove.compile("));
        assert!(!module.contains("$$NAME$$"));
        assert!(!module.contains("$$STATIC$$"));
    }

    #[test]
    fn test_module_text_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let widget = hello_world(dir.path());
        write(&widget.dir.join("static.js"), "var shared = 1;\n");
        let ctx = AssembleContext {
            compiler: &BuiltinStyleCompiler,
            common: "@c: blue;\n",
            style_dir: &dir.path().join("style"),
            output_dir: &dir.path().join("output"),
        };
        let first = assemble_widget(&ctx, &widget).unwrap();
        let second = assemble_widget(&ctx, &widget).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.to_module(), second.to_module());
        assert!(first.to_module().contains("var shared = 1;"));
    }

    #[test]
    fn test_bad_signature_names_widget() {
        let dir = tempfile::tempdir().unwrap();
        let widget = hello_world(dir.path());
        write(&widget.source_file(), "var nope = 1;");
        let ctx = AssembleContext {
            compiler: &BuiltinStyleCompiler,
            common: "\n",
            style_dir: &dir.path().join("style"),
            output_dir: &dir.path().join("output"),
        };
        match assemble_widget(&ctx, &widget) {
            Err(BuildError::Signature { widget, .. }) => assert_eq!(widget, "Example.HelloWorld"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_cache_key_tracks_inputs() {
        let dir = tempfile::tempdir().unwrap();
        let widget = hello_world(dir.path());
        let compiler = BuiltinStyleCompiler;
        let before = cache_key_material(&widget, "\n", &compiler).unwrap();
        assert_eq!(before, cache_key_material(&widget, "\n", &compiler).unwrap());
        write(&widget.dir.join("main.html"), "<p>changed</p>");
        assert_ne!(before, cache_key_material(&widget, "\n", &compiler).unwrap());
        assert_ne!(before, cache_key_material(&widget, "@x: 1;\n", &compiler).unwrap());
    }

    #[test]
    fn test_cache_key_tracks_style_compiler() {
        let dir = tempfile::tempdir().unwrap();
        let widget = hello_world(dir.path());
        let builtin = cache_key_material(&widget, "\n", &BuiltinStyleCompiler).unwrap();
        let lessc = cache_key_material(&widget, "\n", &LesscStyleCompiler::new("lessc")).unwrap();
        let pinned = LesscStyleCompiler::new("/opt/less/bin/lessc");
        let other = cache_key_material(&widget, "\n", &pinned).unwrap();
        assert_ne!(builtin, lessc);
        assert_ne!(lessc, other);
    }
}
