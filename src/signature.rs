//! Signature Rewriter
//!
//! A widget's `source.js` is a single `return function(a, b, ...) { ... };`
//! statement. The rewriter turns it into a plain body that binds each declared
//! parameter from the positional `args` array, plus `$$callbacks` for the
//! trailing options argument.

use oxc_allocator::Allocator;
use oxc_ast::ast::{BindingPattern, Expression, Function, Statement};
use oxc_parser::{ParseOptions, Parser};
use oxc_span::SourceType;

/// Name the wrapper gives to the positional argument array.
pub const ARGS_IDENT: &str = "args";
/// Binding exposing the implicit trailing callbacks argument.
pub const CALLBACKS_IDENT: &str = "$$callbacks";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewrittenSource {
    pub params: Vec<String>,
    pub body: String,
}

/// Rewrite a widget source body. Errors describe why the source does not have
/// the single exported function shape.
pub fn rewrite_signature(source: &str) -> Result<RewrittenSource, String> {
    let source = source.trim();
    let allocator = Allocator::default();
    let source_type = SourceType::default().with_module(false);
    let options = ParseOptions {
        allow_return_outside_function: true,
        ..ParseOptions::default()
    };
    let ret = Parser::new(&allocator, source, source_type)
        .with_options(options)
        .parse();

    if let Some(err) = ret.errors.first() {
        return Err(format!("source.js does not parse: {}", err));
    }

    let mut statements = ret.program.body.iter();
    let func = match (statements.next(), statements.next()) {
        (Some(Statement::ReturnStatement(ret_stmt)), None) => ret_stmt
            .argument
            .as_ref()
            .and_then(exported_function)
            .ok_or_else(|| "source.js must return a function expression".to_string())?,
        _ => {
            return Err(
                "source.js must consist of a single `return function(...) {...};`".to_string(),
            )
        }
    };

    if func.params.rest.is_some() {
        return Err("rest parameters are not supported in widget signatures".to_string());
    }

    let mut params = Vec::new();
    for param in &func.params.items {
        match &param.pattern {
            BindingPattern::BindingIdentifier(id) => params.push(id.name.to_string()),
            _ => {
                return Err(
                    "widget parameters must be plain identifiers (no destructuring or defaults)"
                        .to_string(),
                )
            }
        }
    }

    let inner = func
        .body
        .as_ref()
        .map(|body| {
            let raw = &source[body.span.start as usize..body.span.end as usize];
            strip_braces(raw).to_string()
        })
        .unwrap_or_default();

    Ok(RewrittenSource {
        body: format!("{}{}", bind_params(&params), inner),
        params,
    })
}

fn exported_function<'a>(expr: &'a Expression<'a>) -> Option<&'a Function<'a>> {
    match expr {
        Expression::FunctionExpression(func) => Some(func),
        Expression::ParenthesizedExpression(paren) => exported_function(&paren.expression),
        _ => None,
    }
}

fn strip_braces(raw: &str) -> &str {
    let raw = raw.strip_prefix('{').unwrap_or(raw);
    raw.strip_suffix('}').unwrap_or(raw)
}

/// `var a = args[0];` for every parameter, then the callbacks binding.
fn bind_params(params: &[String]) -> String {
    let mut lines: Vec<String> = params
        .iter()
        .enumerate()
        .map(|(idx, name)| format!("var {} = {}[{}];", name, ARGS_IDENT, idx))
        .collect();
    lines.push(format!(
        "var {} = {}[{}] || {{}};",
        CALLBACKS_IDENT,
        ARGS_IDENT,
        params.len()
    ));
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rewrites_named_params() {
        let src = "return function(message_key, count) {\n    var x = 1;\n};";
        let out = rewrite_signature(src).unwrap();
        assert_eq!(out.params, vec!["message_key", "count"]);
        assert!(out.body.starts_with(
            "var message_key = args[0];\nvar count = args[1];\nvar $$callbacks = args[2] || {};"
        ));
        assert!(out.body.contains("var x = 1;"));
        assert!(!out.body.contains("return function"));
    }

    #[test]
    fn test_zero_params() {
        let out = rewrite_signature("return function() { go(); };").unwrap();
        assert!(out.params.is_empty());
        assert!(out.body.starts_with("var $$callbacks = args[0] || {};"));
        assert!(out.body.contains("go();"));
    }

    #[test]
    fn test_keeps_nested_functions() {
        let src = "return function(a) {\n    function inner() { return a; }\n    $$widget.go = inner;\n};";
        let out = rewrite_signature(src).unwrap();
        assert!(out.body.contains("function inner() { return a; }"));
        assert!(out.body.contains("$$widget.go = inner;"));
    }

    #[test]
    fn test_rejects_other_shapes() {
        assert!(rewrite_signature("var x = 1;").is_err());
        assert!(rewrite_signature("return 42;").is_err());
        assert!(rewrite_signature("return function(a) {}; var y;").is_err());
        assert!(rewrite_signature("return function({ a }) {};").is_err());
    }

    #[test]
    fn test_deterministic() {
        let src = "return function(a, b) { a(b); };";
        assert_eq!(rewrite_signature(src), rewrite_signature(src));
    }
}
