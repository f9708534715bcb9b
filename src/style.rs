//! Style Scoper
//!
//! Widget style rules are wrapped in a block scoped to the widget class name,
//! prefixed with the shared rules and handed to a [`StyleCompiler`]. Compiler
//! failures persist the pre-compilation source to `output/__temp.less` and abort.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::debug;

use crate::config::{BuildConfig, StyleCompilerKind};
use crate::discovery;
use crate::error::{BuildError, StyleError};

/// Where failing top-level stylesheet source is saved, relative to the output
/// directory.
pub const DIAGNOSTIC_FILE: &str = "__temp.less";

/// Diagnostic file for one widget's styles. Widgets compile in parallel, so
/// each failure gets its own file.
pub fn widget_diagnostic_file(widget_name: &str) -> String {
    format!("__temp.{}.less", widget_name)
}

#[derive(Debug, Clone, Default)]
pub struct StyleOptions {
    pub compress: bool,
    pub include_paths: Vec<PathBuf>,
}

/// Cascading-style preprocessor. Implementations must be shareable across the
/// per-widget worker threads.
pub trait StyleCompiler: Send + Sync {
    fn compile(&self, source: &str, options: &StyleOptions) -> Result<String, StyleError>;

    /// Names the compiler and its setup. Part of the widget cache key, so
    /// switching compilers never serves CSS produced by the other one.
    fn identity(&self) -> String;
}

pub fn compiler_for(config: &BuildConfig) -> Box<dyn StyleCompiler> {
    match config.style_compiler {
        StyleCompilerKind::Builtin => Box::new(BuiltinStyleCompiler),
        StyleCompilerKind::Lessc => Box::new(LesscStyleCompiler::new(config.lessc.clone())),
    }
}

/// `Example.HelloWorld` -> `Example_HelloWorld`
pub fn class_name(widget_name: &str) -> String {
    widget_name.replace('.', "_")
}

/// Concatenated shared rules (`common_less/**/*.less`), trimmed, newline-terminated.
pub fn load_common(common_dir: &Path) -> Result<String, BuildError> {
    let mut parts = Vec::new();
    for path in discovery::files_recursive(common_dir, &["less"])? {
        parts.push(fs::read_to_string(&path).map_err(|e| BuildError::io(&path, e))?);
    }
    Ok(format!("{}\n", parts.join("\n").trim()))
}

/// Compile every `*.css`/`*.less` file of one widget, scoped to its class.
/// Returns an empty string for a widget without style files.
pub fn scope_widget_styles(
    compiler: &dyn StyleCompiler,
    widget_dir: &Path,
    widget_name: &str,
    common: &str,
    include_dir: &Path,
    diagnostic_dir: &Path,
) -> Result<String, BuildError> {
    let cls = class_name(widget_name);
    let mut compiled = String::new();

    for file in style_files(widget_dir)? {
        let rules = fs::read_to_string(&file).map_err(|e| BuildError::io(&file, e))?;
        let content = format!("{}.{} {{ {} }}", common, cls, rules);
        let options = StyleOptions {
            compress: true,
            include_paths: vec![widget_dir.to_path_buf(), include_dir.to_path_buf()],
        };
        debug!("compiling style {}", file.display());
        compiled.push_str(&compile_or_persist(
            compiler,
            &content,
            &options,
            &file,
            &diagnostic_dir.join(widget_diagnostic_file(widget_name)),
        )?);
    }

    Ok(compiled)
}

/// `*.css` files first, then `*.less`, each group sorted.
pub fn style_files(dir: &Path) -> Result<Vec<PathBuf>, BuildError> {
    let mut files = discovery::files_with_extensions(dir, &["css"])?;
    files.extend(discovery::files_with_extensions(dir, &["less"])?);
    Ok(files)
}

pub fn compile_or_persist(
    compiler: &dyn StyleCompiler,
    content: &str,
    options: &StyleOptions,
    file: &Path,
    saved: &Path,
) -> Result<String, BuildError> {
    compiler.compile(content, options).map_err(|source| {
        let written = match saved.parent() {
            Some(dir) => fs::create_dir_all(dir),
            None => Ok(()),
        }
        .and_then(|_| fs::write(saved, format!("{}\n", content)));
        if let Err(e) = written {
            return BuildError::io(saved, e);
        }
        BuildError::Style {
            file: file.to_path_buf(),
            saved: saved.to_path_buf(),
            source,
        }
    })
}

// ═══════════════════════════════════════════════════════════════════════════════
// EXTERNAL COMPILER
// ═══════════════════════════════════════════════════════════════════════════════

/// Runs the `lessc` program, reading the source from stdin.
#[derive(Debug, Clone)]
pub struct LesscStyleCompiler {
    program: String,
}

impl LesscStyleCompiler {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl StyleCompiler for LesscStyleCompiler {
    fn identity(&self) -> String {
        format!("lessc:{}", self.program)
    }

    fn compile(&self, source: &str, options: &StyleOptions) -> Result<String, StyleError> {
        let mut command = Command::new(&self.program);
        if options.compress {
            command.arg("--compress");
        }
        if !options.include_paths.is_empty() {
            let joined = std::env::join_paths(&options.include_paths)
                .map_err(|e| StyleError::new(e.to_string()))?;
            command.arg(format!("--include-path={}", joined.to_string_lossy()));
        }
        command
            .arg("-")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = command
            .spawn()
            .map_err(|e| StyleError::new(format!("failed to run {}: {}", self.program, e)))?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(source.as_bytes())
                .map_err(|e| StyleError::new(e.to_string()))?;
        }
        let output = child
            .wait_with_output()
            .map_err(|e| StyleError::new(e.to_string()))?;
        if !output.status.success() {
            return Err(StyleError::new(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// BUILT-IN COMPILER
// ═══════════════════════════════════════════════════════════════════════════════

/// LESS subset: nested rules, `&`, `@variables`, comments, nested `@media`.
/// `@keyframes` and `@font-face` bodies pass through untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinStyleCompiler;

#[derive(Debug)]
enum Item {
    Declaration(String),
    Rule {
        prelude: String,
        items: Vec<Item>,
        line: usize,
    },
}

impl StyleCompiler for BuiltinStyleCompiler {
    fn identity(&self) -> String {
        "builtin".to_string()
    }

    fn compile(&self, source: &str, options: &StyleOptions) -> Result<String, StyleError> {
        let stripped = strip_comments(source);
        let items = parse_block(&mut Cursor::new(&stripped), false)?;
        let mut variables = HashMap::new();
        let mut out = Vec::new();
        emit(&items, &[], &mut variables, &mut out, options.compress)?;
        let joined = if options.compress {
            out.concat()
        } else {
            out.join("\n")
        };
        Ok(joined)
    }
}

struct Cursor {
    chars: Vec<char>,
    pos: usize,
    line: usize,
}

impl Cursor {
    fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
        }
    }

    fn next(&mut self) -> Option<char> {
        let c = self.chars.get(self.pos).copied()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
        }
        Some(c)
    }
}

fn strip_comments(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let chars: Vec<char> = source.chars().collect();
    let mut i = 0;
    let mut quote: Option<char> = None;
    while i < chars.len() {
        let c = chars[i];
        if let Some(q) = quote {
            out.push(c);
            if c == q {
                quote = None;
            }
            i += 1;
            continue;
        }
        if c == '"' || c == '\'' {
            quote = Some(c);
            out.push(c);
            i += 1;
            continue;
        }
        if c == '/' && chars.get(i + 1) == Some(&'*') {
            i += 2;
            while i < chars.len() && !(chars[i] == '*' && chars.get(i + 1) == Some(&'/')) {
                // Keep line numbering intact for error messages.
                if chars[i] == '\n' {
                    out.push('\n');
                }
                i += 1;
            }
            i += 2;
            continue;
        }
        // `//` starts a line comment unless it is part of a url like `http://`.
        if c == '/' && chars.get(i + 1) == Some(&'/') && (i == 0 || chars[i - 1] != ':') {
            while i < chars.len() && chars[i] != '\n' {
                i += 1;
            }
            continue;
        }
        out.push(c);
        i += 1;
    }
    out
}

fn parse_block(cursor: &mut Cursor, nested: bool) -> Result<Vec<Item>, StyleError> {
    let mut items = Vec::new();
    let mut buffer = String::new();
    let mut paren_depth = 0usize;

    while let Some(c) = cursor.next() {
        match c {
            '(' => {
                paren_depth += 1;
                buffer.push(c);
            }
            ')' => {
                paren_depth = paren_depth.saturating_sub(1);
                buffer.push(c);
            }
            ';' if paren_depth == 0 => {
                let decl = buffer.trim();
                if !decl.is_empty() {
                    items.push(Item::Declaration(decl.to_string()));
                }
                buffer.clear();
            }
            '{' if paren_depth == 0 => {
                let prelude = buffer.trim().to_string();
                buffer.clear();
                let line = cursor.line;
                if prelude.is_empty() {
                    return Err(StyleError::at_line("block without a selector", line));
                }
                let items_inner = parse_block(cursor, true)?;
                items.push(Item::Rule {
                    prelude,
                    items: items_inner,
                    line,
                });
            }
            '}' if paren_depth == 0 => {
                if !nested {
                    return Err(StyleError::at_line("unmatched `}`", cursor.line));
                }
                let decl = buffer.trim();
                if !decl.is_empty() {
                    items.push(Item::Declaration(decl.to_string()));
                }
                return Ok(items);
            }
            _ => buffer.push(c),
        }
    }

    if nested {
        return Err(StyleError::at_line("missing closing `}`", cursor.line));
    }
    if !buffer.trim().is_empty() {
        return Err(StyleError::at_line(
            format!("unterminated declaration `{}`", buffer.trim()),
            cursor.line,
        ));
    }
    Ok(items)
}

fn emit(
    items: &[Item],
    parents: &[String],
    variables: &mut HashMap<String, String>,
    out: &mut Vec<String>,
    compress: bool,
) -> Result<(), StyleError> {
    let mut own = Vec::new();
    let mut nested = Vec::new();
    let mut scope = variables.clone();

    for item in items {
        match item {
            Item::Declaration(decl) => {
                if let Some((name, value)) = parse_variable(decl) {
                    let value = substitute_variables(value, &scope, 0, false)?;
                    scope.insert(name.to_string(), value);
                    continue;
                }
                own.push(substitute_variables(decl, &scope, 0, false)?);
            }
            Item::Rule { .. } => nested.push(item),
        }
    }

    if parents.is_empty() {
        // Top-level variables are visible to every later rule.
        *variables = scope.clone();
        if !own.is_empty() {
            return Err(StyleError::new(format!(
                "declaration outside of a rule: `{}`",
                own[0]
            )));
        }
    } else if !own.is_empty() {
        out.push(format_rule(&parents.join(","), &own, compress));
    }

    for item in nested {
        let Item::Rule {
            prelude,
            items,
            line,
        } = item
        else {
            continue;
        };
        let prelude = substitute_variables(prelude, &scope, *line, true)?;
        if prelude.starts_with("@keyframes")
            || prelude.starts_with("@-webkit-keyframes")
            || prelude.starts_with("@font-face")
        {
            out.push(format_verbatim(&prelude, items, compress));
        } else if prelude.starts_with("@media") || prelude.starts_with("@supports") {
            let mut inner = Vec::new();
            emit(items, parents, &mut scope.clone(), &mut inner, compress)?;
            if !inner.is_empty() {
                let body = if compress {
                    inner.concat()
                } else {
                    inner.join("\n")
                };
                out.push(if compress {
                    format!("{}{{{}}}", compact(&prelude), body)
                } else {
                    format!("{} {{\n{}\n}}", prelude, body)
                });
            }
        } else if prelude.starts_with('@') {
            return Err(StyleError::at_line(
                format!("unsupported at-rule `{}`", prelude),
                *line,
            ));
        } else {
            let selectors = combine_selectors(parents, &prelude);
            emit(items, &selectors, &mut scope.clone(), out, compress)?;
        }
    }
    Ok(())
}

fn parse_variable(decl: &str) -> Option<(&str, &str)> {
    let rest = decl.strip_prefix('@')?;
    let (name, value) = rest.split_once(':')?;
    let name = name.trim();
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_alphanumeric() || c == '-' || c == '_');
    valid.then(|| (name, value.trim()))
}

fn substitute_variables(
    text: &str,
    scope: &HashMap<String, String>,
    line: usize,
    in_prelude: bool,
) -> Result<String, StyleError> {
    let mut out = String::with_capacity(text.len());
    let chars: Vec<char> = text.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        let starts_name = chars
            .get(i + 1)
            .map(|n| n.is_alphanumeric() || *n == '-' || *n == '_')
            .unwrap_or(false);
        // `@media`, `@keyframes`, ... at the start of a prelude are not variables.
        if c == '@' && starts_name && !(in_prelude && i == 0) {
            let mut j = i + 1;
            while j < chars.len() && (chars[j].is_alphanumeric() || chars[j] == '-' || chars[j] == '_') {
                j += 1;
            }
            let name: String = chars[i + 1..j].iter().collect();
            match scope.get(&name) {
                Some(value) => out.push_str(value),
                None => {
                    let message = format!("variable @{} is undefined", name);
                    return Err(if line > 0 {
                        StyleError::at_line(message, line)
                    } else {
                        StyleError::new(message)
                    });
                }
            }
            i = j;
            continue;
        }
        out.push(c);
        i += 1;
    }
    Ok(out)
}

fn combine_selectors(parents: &[String], prelude: &str) -> Vec<String> {
    let own: Vec<&str> = prelude.split(',').map(str::trim).filter(|s| !s.is_empty()).collect();
    if parents.is_empty() {
        return own.iter().map(|s| compact(s)).collect();
    }
    let mut combined = Vec::new();
    for parent in parents {
        for selector in &own {
            if selector.contains('&') {
                combined.push(compact(&selector.replace('&', parent)));
            } else {
                combined.push(compact(&format!("{} {}", parent, selector)));
            }
        }
    }
    combined
}

fn compact(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn format_rule(selector: &str, declarations: &[String], compress: bool) -> String {
    if compress {
        let body: Vec<String> = declarations.iter().map(|d| compact_declaration(d)).collect();
        format!("{}{{{}}}", selector, body.join(";"))
    } else {
        let body: Vec<String> = declarations.iter().map(|d| format!("  {};", d)).collect();
        format!("{} {{\n{}\n}}", selector.replace(',', ",\n"), body.join("\n"))
    }
}

fn compact_declaration(decl: &str) -> String {
    match decl.split_once(':') {
        Some((name, value)) => format!("{}:{}", name.trim(), compact(value)),
        None => compact(decl),
    }
}

fn format_verbatim(prelude: &str, items: &[Item], compress: bool) -> String {
    fn body(items: &[Item], compress: bool) -> String {
        let parts: Vec<String> = items
            .iter()
            .map(|item| match item {
                Item::Declaration(d) => {
                    if compress {
                        compact_declaration(d)
                    } else {
                        format!("{};", d)
                    }
                }
                Item::Rule { prelude, items, .. } => {
                    if compress {
                        format!("{}{{{}}}", compact(prelude), body(items, compress))
                    } else {
                        format!("{} {{ {} }}", prelude, body(items, compress))
                    }
                }
            })
            .collect();
        if compress {
            parts.join(";").replace(";}", "}").replace("};", "}")
        } else {
            parts.join(" ")
        }
    }
    if compress {
        format!("{}{{{}}}", compact(prelude), body(items, compress))
    } else {
        format!("{} {{ {} }}", prelude, body(items, compress))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile(source: &str) -> Result<String, StyleError> {
        BuiltinStyleCompiler.compile(
            source,
            &StyleOptions {
                compress: true,
                include_paths: vec![],
            },
        )
    }

    #[test]
    fn test_class_name() {
        assert_eq!(class_name("Example.HelloWorld"), "Example_HelloWorld");
        assert_eq!(class_name("Solo"), "Solo");
    }

    #[test]
    fn test_scoped_nesting() {
        let css = compile(".Example_Hello { p { color: red; } a { &:hover { color : blue ; } } }").unwrap();
        assert_eq!(css, ".Example_Hello p{color:red}.Example_Hello a:hover{color:blue}");
    }

    #[test]
    fn test_variables_and_comments() {
        let css = compile(
            "// shared\n@accent: #f00;\n/* block\ncomment */\n.W { b { color: @accent; border: 1px solid @accent; } }",
        )
        .unwrap();
        assert_eq!(css, ".W b{color:#f00;border:1px solid #f00}");
    }

    #[test]
    fn test_media_and_keyframes() {
        let css = compile(
            ".W { @media (max-width: 10px) { p { margin: 0; } } @keyframes spin { from { top: 0; } to { top: 1px; } } }",
        )
        .unwrap();
        assert_eq!(
            css,
            "@media (max-width: 10px){.W p{margin:0}}@keyframes spin{from{top:0}to{top:1px}}"
        );
    }

    #[test]
    fn test_urls_are_not_comments() {
        let css = compile(".W { b { background: url(http://x/y.png); } }").unwrap();
        assert_eq!(css, ".W b{background:url(http://x/y.png)}");
    }

    #[test]
    fn test_errors() {
        assert!(compile(".W { p { color: red; }").is_err());
        assert!(compile(".W { color: @missing; }").is_err());
        assert!(compile("} .W {}").is_err());
        assert!(compile("color: red;").is_err());
    }

    #[test]
    fn test_failure_persists_source() {
        let dir = tempfile::tempdir().unwrap();
        let err = compile_or_persist(
            &BuiltinStyleCompiler,
            ".W { p { }",
            &StyleOptions::default(),
            Path::new("widgets/W/style.less"),
            &dir.path().join(DIAGNOSTIC_FILE),
        )
        .unwrap_err();
        match err {
            BuildError::Style { saved, source, .. } => {
                assert_eq!(saved, dir.path().join(DIAGNOSTIC_FILE));
                assert!(source.message.contains("missing closing"));
                assert_eq!(fs::read_to_string(saved).unwrap(), ".W { p { }\n");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_widget_failures_keep_separate_diagnostics() {
        let dir = tempfile::tempdir().unwrap();
        let widgets = dir.path().join("widgets");
        for (name, rules) in [("A", "a { color: red;"), ("B", "b { color: blue;")] {
            let widget_dir = widgets.join(name);
            fs::create_dir_all(&widget_dir).unwrap();
            fs::write(widget_dir.join("style.less"), rules).unwrap();
        }
        let output = dir.path().join("output");

        let saved: Vec<PathBuf> = ["A", "B"]
            .iter()
            .map(|name| {
                let err = scope_widget_styles(
                    &BuiltinStyleCompiler,
                    &widgets.join(name),
                    &format!("Example.{}", name),
                    "",
                    dir.path(),
                    &output,
                )
                .unwrap_err();
                match err {
                    BuildError::Style { saved, .. } => saved,
                    other => panic!("unexpected {:?}", other),
                }
            })
            .collect();

        assert_eq!(saved[0], output.join("__temp.Example.A.less"));
        assert_eq!(saved[1], output.join("__temp.Example.B.less"));
        assert!(fs::read_to_string(&saved[0]).unwrap().contains("color: red;"));
        assert!(fs::read_to_string(&saved[1]).unwrap().contains("color: blue;"));
    }
}
