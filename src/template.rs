//! Template Table Compiler
//!
//! Markup templates use a Handlebars-compatible subset. At build time every
//! `*.html` file in a widget directory is whitespace-normalized, parsed (so a
//! syntax error aborts the build) and serialized into the widget module. The
//! runtime parses the same normalized source into a [`Template`] and evaluates
//! it with [`crate::renderer`].

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Number;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::rc::Rc;

use crate::error::{BuildError, TemplateError};

/// Expression the bundle uses to turn normalized markup into a renderer.
pub const COMPILE_EXPR: &str = "Alcove.compile";

// ═══════════════════════════════════════════════════════════════════════════════
// WHITESPACE NORMALIZATION
// ═══════════════════════════════════════════════════════════════════════════════

lazy_static! {
    static ref TAG_GAP_RE: Regex = Regex::new(r">\s+<").unwrap();
    static ref TAG_OPEN_EXPR_RE: Regex = Regex::new(r">\s+\{\{").unwrap();
    static ref EXPR_TAG_CLOSE_RE: Regex = Regex::new(r"\}\}\s+<").unwrap();
    static ref EXPR_GAP_RE: Regex = Regex::new(r"\}\}\s+\{\{").unwrap();
}

/// Drop newlines and the whitespace between tag boundaries and `{{ }}` delimiters.
///
/// Only whitespace that touches a `>`/`<`/`{{`/`}}` pair on both sides is
/// removed, so normalizing twice yields the same text.
pub fn normalize_whitespace(markup: &str) -> String {
    let flat: String = markup.chars().filter(|c| *c != '\n' && *c != '\r').collect();
    let flat = TAG_GAP_RE.replace_all(&flat, "><");
    let flat = TAG_OPEN_EXPR_RE.replace_all(&flat, ">{{");
    let flat = EXPR_TAG_CLOSE_RE.replace_all(&flat, "}}<");
    EXPR_GAP_RE.replace_all(&flat, "}}{{").into_owned()
}

// ═══════════════════════════════════════════════════════════════════════════════
// TEMPLATE AST
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Path(PathExpr),
    Str(String),
    Number(Number),
    Bool(bool),
    Null,
}

/// `../../a.b`, `this`, `@index`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PathExpr {
    pub parents: usize,
    pub segments: Vec<String>,
    /// `@index`, `@key`, `@first`, `@last`
    pub data: bool,
}

impl PathExpr {
    /// Single bare identifier, the only shape that can name a helper.
    pub fn as_helper_name(&self) -> Option<&str> {
        if self.parents == 0 && !self.data && self.segments.len() == 1 {
            Some(&self.segments[0])
        } else {
            None
        }
    }
}

/// `head param param key=value`
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub head: Operand,
    pub params: Vec<Operand>,
    pub hash: Vec<(String, Operand)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    If,
    Unless,
    Each,
    With,
}

impl BlockKind {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "if" => Some(BlockKind::If),
            "unless" => Some(BlockKind::Unless),
            "each" => Some(BlockKind::Each),
            "with" => Some(BlockKind::With),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            BlockKind::If => "if",
            BlockKind::Unless => "unless",
            BlockKind::Each => "each",
            BlockKind::With => "with",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Text(String),
    Output { call: Call, escape: bool },
    Block {
        kind: BlockKind,
        target: Operand,
        body: Vec<Segment>,
        inverse: Vec<Segment>,
    },
}

/// A parsed template.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    pub segments: Vec<Segment>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// PARSER
// ═══════════════════════════════════════════════════════════════════════════════

enum Tag {
    Output(Call, bool),
    Open(BlockKind, Operand),
    Else,
    Close(BlockKind),
}

struct OpenBlock {
    kind: BlockKind,
    target: Operand,
    body: Vec<Segment>,
    inverse: Option<Vec<Segment>>,
    offset: usize,
}

impl Template {
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        let mut root: Vec<Segment> = Vec::new();
        let mut stack: Vec<OpenBlock> = Vec::new();
        let mut pos = 0;

        fn sink<'s>(root: &'s mut Vec<Segment>, stack: &'s mut [OpenBlock]) -> &'s mut Vec<Segment> {
            match stack.last_mut() {
                Some(open) => open.inverse.as_mut().unwrap_or(&mut open.body),
                None => root,
            }
        }

        while pos < source.len() {
            let Some(rel) = source[pos..].find("{{") else {
                sink(&mut root, &mut stack).push(Segment::Text(source[pos..].to_string()));
                break;
            };
            let start = pos + rel;
            if start > pos {
                sink(&mut root, &mut stack).push(Segment::Text(source[pos..start].to_string()));
            }

            // Comments
            if source[start..].starts_with("{{!--") {
                let end = source[start..]
                    .find("--}}")
                    .ok_or_else(|| TemplateError::new("unterminated comment", start))?;
                pos = start + end + 4;
                continue;
            }
            if source[start..].starts_with("{{!") {
                let end = source[start..]
                    .find("}}")
                    .ok_or_else(|| TemplateError::new("unterminated comment", start))?;
                pos = start + end + 2;
                continue;
            }

            let (raw, inner_start, close) = if source[start..].starts_with("{{{") {
                (true, start + 3, "}}}")
            } else {
                (false, start + 2, "}}")
            };
            let inner_end = find_tag_end(source, inner_start, close)
                .ok_or_else(|| TemplateError::new("unterminated mustache", start))?;
            let inner = source[inner_start..inner_end].trim();
            pos = inner_end + close.len();

            match parse_tag(inner, raw, start)? {
                Tag::Output(call, escape) => {
                    sink(&mut root, &mut stack).push(Segment::Output { call, escape });
                }
                Tag::Open(kind, target) => stack.push(OpenBlock {
                    kind,
                    target,
                    body: Vec::new(),
                    inverse: None,
                    offset: start,
                }),
                Tag::Else => {
                    let open = stack
                        .last_mut()
                        .ok_or_else(|| TemplateError::new("{{else}} outside of a block", start))?;
                    if open.inverse.is_some() {
                        return Err(TemplateError::new("duplicate {{else}}", start));
                    }
                    open.inverse = Some(Vec::new());
                }
                Tag::Close(kind) => {
                    let open = stack.pop().ok_or_else(|| {
                        TemplateError::new(format!("unexpected {{{{/{}}}}}", kind.name()), start)
                    })?;
                    if open.kind != kind {
                        return Err(TemplateError::new(
                            format!(
                                "{{{{#{}}}}} closed by {{{{/{}}}}}",
                                open.kind.name(),
                                kind.name()
                            ),
                            start,
                        ));
                    }
                    let block = Segment::Block {
                        kind: open.kind,
                        target: open.target,
                        body: open.body,
                        inverse: open.inverse.unwrap_or_default(),
                    };
                    sink(&mut root, &mut stack).push(block);
                }
            }
        }

        if let Some(open) = stack.pop() {
            return Err(TemplateError::new(
                format!("unclosed {{{{#{}}}}}", open.kind.name()),
                open.offset,
            ));
        }

        Ok(Template { segments: root })
    }
}

/// Find the closing delimiter, skipping over quoted string literals.
fn find_tag_end(source: &str, from: usize, close: &str) -> Option<usize> {
    let bytes = source.as_bytes();
    let mut quote: Option<u8> = None;
    let mut i = from;
    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(q) => {
                if b == b'\\' {
                    i += 2;
                    continue;
                }
                if b == q {
                    quote = None;
                }
            }
            None => {
                if b == b'"' || b == b'\'' {
                    quote = Some(b);
                } else if bytes[i..].starts_with(close.as_bytes()) {
                    return Some(i);
                }
            }
        }
        i += 1;
    }
    None
}

fn parse_tag(inner: &str, raw: bool, offset: usize) -> Result<Tag, TemplateError> {
    if inner.is_empty() {
        return Err(TemplateError::new("empty mustache", offset));
    }
    if !raw {
        if inner == "else" {
            return Ok(Tag::Else);
        }
        if let Some(rest) = inner.strip_prefix('#') {
            let tokens = tokenize(rest, offset)?;
            let (name, args) = tokens
                .split_first()
                .ok_or_else(|| TemplateError::new("block without a helper", offset))?;
            let kind = BlockKind::from_name(name)
                .ok_or_else(|| TemplateError::new(format!("unknown block helper {}", name), offset))?;
            if args.len() != 1 {
                return Err(TemplateError::new(
                    format!("{{{{#{}}}}} takes exactly one argument", name),
                    offset,
                ));
            }
            return Ok(Tag::Open(kind, parse_operand(&args[0], offset)?));
        }
        if let Some(rest) = inner.strip_prefix('/') {
            let name = rest.trim();
            let kind = BlockKind::from_name(name)
                .ok_or_else(|| TemplateError::new(format!("unknown block helper {}", name), offset))?;
            return Ok(Tag::Close(kind));
        }
    }

    let tokens = tokenize(inner, offset)?;
    let (head, rest) = tokens
        .split_first()
        .ok_or_else(|| TemplateError::new("empty mustache", offset))?;
    let mut call = Call {
        head: parse_operand(head, offset)?,
        params: Vec::new(),
        hash: Vec::new(),
    };
    for token in rest {
        match split_hash_pair(token) {
            Some((key, value)) => call.hash.push((key.to_string(), parse_operand(value, offset)?)),
            None => {
                if !call.hash.is_empty() {
                    return Err(TemplateError::new(
                        "positional argument after key=value argument",
                        offset,
                    ));
                }
                call.params.push(parse_operand(token, offset)?);
            }
        }
    }
    Ok(Tag::Output(call, !raw))
}

/// Split on whitespace outside quotes. Quoted tokens keep their quotes.
fn tokenize(inner: &str, offset: usize) -> Result<Vec<String>, TemplateError> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut chars = inner.chars();

    while let Some(c) = chars.next() {
        match quote {
            Some(q) => {
                current.push(c);
                if c == '\\' {
                    if let Some(next) = chars.next() {
                        current.push(next);
                    }
                } else if c == q {
                    quote = None;
                }
            }
            None if c.is_whitespace() => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            None => {
                if c == '"' || c == '\'' {
                    quote = Some(c);
                }
                current.push(c);
            }
        }
    }
    if quote.is_some() {
        return Err(TemplateError::new("unterminated string literal", offset));
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    Ok(tokens)
}

fn split_hash_pair(token: &str) -> Option<(&str, &str)> {
    if token.starts_with('"') || token.starts_with('\'') {
        return None;
    }
    let (key, value) = token.split_once('=')?;
    let valid_key = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '-');
    valid_key.then_some((key, value))
}

fn parse_operand(token: &str, offset: usize) -> Result<Operand, TemplateError> {
    if let Some(quote) = token.chars().next().filter(|c| *c == '"' || *c == '\'') {
        let body = token
            .strip_prefix(quote)
            .and_then(|t| t.strip_suffix(quote))
            .ok_or_else(|| TemplateError::new("malformed string literal", offset))?;
        return Ok(Operand::Str(unescape(body)));
    }
    match token {
        "true" => return Ok(Operand::Bool(true)),
        "false" => return Ok(Operand::Bool(false)),
        "null" | "undefined" => return Ok(Operand::Null),
        _ => {}
    }
    if token.starts_with(|c: char| c.is_ascii_digit() || c == '-') {
        if let Ok(Some(number)) = serde_json::from_str::<serde_json::Value>(token)
            .map(|v| v.as_number().cloned())
        {
            return Ok(Operand::Number(number));
        }
    }
    parse_path(token, offset).map(Operand::Path)
}

fn parse_path(token: &str, offset: usize) -> Result<PathExpr, TemplateError> {
    let mut path = PathExpr::default();
    let mut rest = token;
    if let Some(stripped) = rest.strip_prefix('@') {
        path.data = true;
        rest = stripped;
    }
    while let Some(stripped) = rest.strip_prefix("../") {
        path.parents += 1;
        rest = stripped;
    }
    if rest == "." || rest == "this" {
        return Ok(path);
    }
    let rest = rest.strip_prefix("this.").or_else(|| rest.strip_prefix("./")).unwrap_or(rest);
    for segment in rest.split(['.', '/']) {
        if segment.is_empty() || segment.contains(['{', '}', '=', '"', '\'']) {
            return Err(TemplateError::new(format!("invalid path {}", token), offset));
        }
        path.segments.push(segment.to_string());
    }
    Ok(path)
}

fn unescape(body: &str) -> String {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

// ═══════════════════════════════════════════════════════════════════════════════
// TEMPLATE TABLE
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub struct CompiledTemplate {
    /// Normalized markup, the exact text serialized into the bundle.
    pub source: String,
    pub template: Rc<Template>,
}

/// Templates of one widget keyed by file base name. Ordered so serialization
/// is byte-stable.
#[derive(Debug, Clone, Default)]
pub struct TemplateTable {
    entries: BTreeMap<String, CompiledTemplate>,
}

impl TemplateTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalize and compile `(name, markup)` pairs.
    pub fn from_sources<I, N, S>(sources: I) -> Result<Self, (String, TemplateError)>
    where
        I: IntoIterator<Item = (N, S)>,
        N: Into<String>,
        S: AsRef<str>,
    {
        let mut table = Self::new();
        for (name, markup) in sources {
            let name = name.into();
            if let Err(e) = table.insert(&name, markup.as_ref()) {
                return Err((name, e));
            }
        }
        Ok(table)
    }

    pub fn insert(&mut self, name: &str, markup: &str) -> Result<(), TemplateError> {
        let source = normalize_whitespace(markup);
        let template = Template::parse(&source)?;
        self.entries.insert(
            name.to_string(),
            CompiledTemplate {
                source,
                template: Rc::new(template),
            },
        );
        Ok(())
    }

    /// Compile every `*.html` file directly inside a widget directory.
    pub fn load_dir(dir: &Path, widget: &str) -> Result<Self, BuildError> {
        let mut table = Self::new();
        for path in crate::discovery::files_with_extensions(dir, &["html"])? {
            let name = path
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default();
            let markup = fs::read_to_string(&path).map_err(|e| BuildError::io(&path, e))?;
            table
                .insert(&name, &markup)
                .map_err(|source| BuildError::Template {
                    widget: widget.to_string(),
                    template: name.clone(),
                    source,
                })?;
        }
        Ok(table)
    }

    pub fn get(&self, name: &str) -> Option<&CompiledTemplate> {
        self.entries.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Normalized markup by template name.
    pub fn sources(&self) -> BTreeMap<String, String> {
        self.entries
            .iter()
            .map(|(name, compiled)| (name.clone(), compiled.source.clone()))
            .collect()
    }

    pub fn to_module_literal(&self) -> String {
        module_literal(&self.sources())
    }
}

/// `{"main":Alcove.compile("..."),...}` for the widget module.
pub fn module_literal(sources: &BTreeMap<String, String>) -> String {
    let entries: Vec<String> = sources
        .iter()
        .map(|(name, source)| {
            format!(
                "{}:{}({})",
                json_string(name),
                COMPILE_EXPR,
                json_string(source)
            )
        })
        .collect();
    format!("{{{}}}", entries.join(","))
}

pub(crate) fn json_string(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_whitespace() {
        let markup = "<div>\n    <p> {{msg}} </p>\n    {{a}} {{b}}\n</div>\n";
        assert_eq!(normalize_whitespace(markup), "<div><p>{{msg}}</p>{{a}}{{b}}</div>");
    }

    #[test]
    fn test_normalize_preserves_inner_text() {
        let markup = "<p>hello   world</p><a title=\"x  y\">{{ text \"a b\" }}</a>";
        assert_eq!(normalize_whitespace(markup), markup);
    }

    #[test]
    fn test_normalize_idempotent() {
        let samples = [
            "<ul>\n  <li> {{#each items}} {{this}} {{/each}} </li>\n</ul>",
            "> <> < }} {{ }} <x> {{y}}",
            "plain text\r\n with\tlines",
        ];
        for sample in samples {
            let once = normalize_whitespace(sample);
            assert_eq!(normalize_whitespace(&once), once);
        }
    }

    #[test]
    fn test_parse_output_and_helpers() {
        let t = Template::parse("<b>{{name}}</b>{{{raw}}}{{text \"greet\" user.name}}").unwrap();
        assert_eq!(t.segments.len(), 5);
        match &t.segments[3] {
            Segment::Output { call, escape } => {
                assert!(!escape);
                assert!(matches!(&call.head, Operand::Path(p) if p.segments == ["raw"]));
            }
            other => panic!("unexpected {:?}", other),
        }
        match &t.segments[4] {
            Segment::Output { call, .. } => {
                assert_eq!(call.params.len(), 2);
                assert_eq!(call.params[0], Operand::Str("greet".to_string()));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_blocks_and_hash() {
        let t = Template::parse(
            "{{#if show}}{{#each items}}{{@index}}{{else}}none{{/each}}{{/if}}{{template \"row\" item label=\"x\"}}",
        )
        .unwrap();
        assert_eq!(t.segments.len(), 2);
        match &t.segments[0] {
            Segment::Block { kind, body, inverse, .. } => {
                assert_eq!(*kind, BlockKind::If);
                assert!(inverse.is_empty());
                assert!(matches!(&body[0], Segment::Block { kind: BlockKind::Each, inverse, .. } if inverse.len() == 1));
            }
            other => panic!("unexpected {:?}", other),
        }
        match &t.segments[1] {
            Segment::Output { call, .. } => {
                assert_eq!(call.hash, vec![("label".to_string(), Operand::Str("x".to_string()))]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_paths() {
        let t = Template::parse("{{../title}}{{this.a.b}}{{.}}").unwrap();
        let paths: Vec<PathExpr> = t
            .segments
            .iter()
            .filter_map(|s| match s {
                Segment::Output { call: Call { head: Operand::Path(p), .. }, .. } => Some(p.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(paths[0].parents, 1);
        assert_eq!(paths[1].segments, vec!["a", "b"]);
        assert!(paths[2].segments.is_empty());
    }

    #[test]
    fn test_parse_non_ascii_paths_and_text() {
        let t = Template::parse("<p>{{ café }}</p>{{text \"été\" naïve.ü}}ß").unwrap();
        match &t.segments[1] {
            Segment::Output { call, .. } => {
                assert!(matches!(&call.head, Operand::Path(p) if p.segments == ["café"]));
            }
            other => panic!("unexpected {:?}", other),
        }
        match &t.segments[3] {
            Segment::Output { call, .. } => {
                assert_eq!(call.params[0], Operand::Str("été".to_string()));
                assert!(matches!(&call.params[1], Operand::Path(p) if p.segments == ["naïve", "ü"]));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(&t.segments[4], Segment::Text(s) if s == "ß"));
        assert!(Template::parse("{{ café ").is_err());
    }

    #[test]
    fn test_comments_are_dropped() {
        let t = Template::parse("a{{! note }}b{{!-- {{x}} --}}c").unwrap();
        let text: String = t
            .segments
            .iter()
            .map(|s| match s {
                Segment::Text(t) => t.as_str(),
                _ => "",
            })
            .collect();
        assert_eq!(text, "abc");
    }

    #[test]
    fn test_parse_errors() {
        assert!(Template::parse("{{#if a}}x").is_err());
        assert!(Template::parse("{{#if a}}x{{/each}}").is_err());
        assert!(Template::parse("{{name").is_err());
        assert!(Template::parse("{{/if}}").is_err());
        assert!(Template::parse("{{#loop a}}{{/loop}}").is_err());
        let err = Template::parse("ok {{#each}}{{/each}}").unwrap_err();
        assert_eq!(err.offset, 3);
    }

    #[test]
    fn test_module_literal_is_stable() {
        let table = TemplateTable::from_sources([
            ("row", "<li>{{this}}</li>"),
            ("main", "<ul>\n  {{#each items}}{{template \"row\" this}}{{/each}}\n</ul>"),
        ])
        .unwrap();
        let literal = table.to_module_literal();
        assert_eq!(
            literal,
            "{\"main\":Alcove.compile(\"<ul>{{#each items}}{{template \\\"row\\\" this}}{{/each}}</ul>\"),\"row\":Alcove.compile(\"<li>{{this}}</li>\")}"
        );
        assert_eq!(literal, table.to_module_literal());
    }
}
