//! Template evaluation against a JSON context.
//!
//! Helpers are supplied by the caller through [`Helpers`]; the runtime uses this
//! seam to emit placeholder markers while a template renders.

use serde_json::{Map, Value};

use crate::error::RenderError;
use crate::template::{BlockKind, Call, Operand, PathExpr, Segment, Template};

/// Helper functions callable from templates. Helper output is inserted raw.
pub trait Helpers {
    fn has_helper(&self, name: &str) -> bool;

    fn call_helper(
        &self,
        name: &str,
        params: &[Value],
        hash: &Map<String, Value>,
    ) -> Result<String, RenderError>;
}

/// Helper set with nothing registered.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHelpers;

impl Helpers for NoHelpers {
    fn has_helper(&self, _name: &str) -> bool {
        false
    }

    fn call_helper(
        &self,
        name: &str,
        _params: &[Value],
        _hash: &Map<String, Value>,
    ) -> Result<String, RenderError> {
        Err(RenderError::MissingHelper(name.to_string()))
    }
}

#[derive(Clone)]
struct Frame<'a> {
    this: &'a Value,
    index: Option<usize>,
    key: Option<&'a str>,
    len: usize,
}

impl<'a> Frame<'a> {
    fn root(this: &'a Value) -> Self {
        Self {
            this,
            index: None,
            key: None,
            len: 0,
        }
    }

    fn data(&self, name: &str) -> Value {
        match name {
            "index" => self.index.map(Value::from).unwrap_or(Value::Null),
            "key" => self.key.map(Value::from).unwrap_or(Value::Null),
            "first" => Value::Bool(self.index == Some(0)),
            "last" => Value::Bool(self.index.is_some() && self.index == self.len.checked_sub(1)),
            _ => Value::Null,
        }
    }
}

pub fn render(
    template: &Template,
    context: &Value,
    helpers: &dyn Helpers,
) -> Result<String, RenderError> {
    let mut out = String::new();
    let mut stack = vec![Frame::root(context)];
    render_segments(&template.segments, &mut stack, helpers, &mut out)?;
    Ok(out)
}

fn render_segments<'a>(
    segments: &'a [Segment],
    stack: &mut Vec<Frame<'a>>,
    helpers: &dyn Helpers,
    out: &mut String,
) -> Result<(), RenderError> {
    for segment in segments {
        match segment {
            Segment::Text(text) => out.push_str(text),
            Segment::Output { call, escape } => {
                match evaluate_call(call, stack, helpers)? {
                    Evaluated::Markup(markup) => out.push_str(&markup),
                    Evaluated::Value(value) if *escape => {
                        out.push_str(&escape_html(&stringify(&value)))
                    }
                    Evaluated::Value(value) => out.push_str(&stringify(&value)),
                }
            }
            Segment::Block {
                kind,
                target,
                body,
                inverse,
            } => render_block(*kind, target, body, inverse, stack, helpers, out)?,
        }
    }
    Ok(())
}

enum Evaluated {
    Markup(String),
    Value(Value),
}

fn evaluate_call(
    call: &Call,
    stack: &[Frame<'_>],
    helpers: &dyn Helpers,
) -> Result<Evaluated, RenderError> {
    let helper_name = match &call.head {
        Operand::Path(path) => path.as_helper_name(),
        _ => None,
    };
    let has_args = !call.params.is_empty() || !call.hash.is_empty();

    if let Some(name) = helper_name {
        if helpers.has_helper(name) {
            let params: Vec<Value> = call.params.iter().map(|p| operand_value(p, stack)).collect();
            let hash: Map<String, Value> = call
                .hash
                .iter()
                .map(|(k, v)| (k.clone(), operand_value(v, stack)))
                .collect();
            return helpers
                .call_helper(name, &params, &hash)
                .map(Evaluated::Markup);
        }
        if has_args {
            return Err(RenderError::MissingHelper(name.to_string()));
        }
    } else if has_args {
        return Err(RenderError::MissingHelper(format!("{:?}", call.head)));
    }

    Ok(Evaluated::Value(operand_value(&call.head, stack)))
}

fn render_block<'a>(
    kind: BlockKind,
    target: &Operand,
    body: &'a [Segment],
    inverse: &'a [Segment],
    stack: &mut Vec<Frame<'a>>,
    helpers: &dyn Helpers,
    out: &mut String,
) -> Result<(), RenderError> {
    // Literals and @data can gate a branch but never become a frame.
    let Some(value) = operand_ref(target, stack) else {
        let truthy = is_truthy(&operand_value(target, stack)) ^ (kind == BlockKind::Unless);
        return render_segments(if truthy { body } else { inverse }, stack, helpers, out);
    };

    match kind {
        BlockKind::If | BlockKind::Unless => {
            let truthy = is_truthy(value) ^ (kind == BlockKind::Unless);
            render_segments(if truthy { body } else { inverse }, stack, helpers, out)
        }
        BlockKind::With => {
            if !is_truthy(value) {
                return render_segments(inverse, stack, helpers, out);
            }
            stack.push(Frame::root(value));
            let result = render_segments(body, stack, helpers, out);
            stack.pop();
            result
        }
        BlockKind::Each => {
            let mut rendered_any = false;
            match value {
                Value::Array(items) => {
                    for (index, item) in items.iter().enumerate() {
                        rendered_any = true;
                        stack.push(Frame {
                            this: item,
                            index: Some(index),
                            key: None,
                            len: items.len(),
                        });
                        let result = render_segments(body, stack, helpers, out);
                        stack.pop();
                        result?;
                    }
                }
                Value::Object(entries) => {
                    let len = entries.len();
                    for (index, (key, item)) in entries.iter().enumerate() {
                        rendered_any = true;
                        stack.push(Frame {
                            this: item,
                            index: Some(index),
                            key: Some(key.as_str()),
                            len,
                        });
                        let result = render_segments(body, stack, helpers, out);
                        stack.pop();
                        result?;
                    }
                }
                _ => {}
            }
            if !rendered_any {
                render_segments(inverse, stack, helpers, out)?;
            }
            Ok(())
        }
    }
}

fn frame_for<'s, 'a>(path: &PathExpr, stack: &'s [Frame<'a>]) -> Option<&'s Frame<'a>> {
    stack.len().checked_sub(1 + path.parents).map(|i| &stack[i])
}

/// Reference into the context for plain paths.
fn operand_ref<'a>(operand: &Operand, stack: &[Frame<'a>]) -> Option<&'a Value> {
    let Operand::Path(path) = operand else {
        return None;
    };
    if path.data {
        return None;
    }
    let frame = frame_for(path, stack)?;
    let mut current: &'a Value = frame.this;
    for segment in &path.segments {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

fn operand_value(operand: &Operand, stack: &[Frame<'_>]) -> Value {
    match operand {
        Operand::Str(s) => Value::String(s.clone()),
        Operand::Number(n) => Value::Number(n.clone()),
        Operand::Bool(b) => Value::Bool(*b),
        Operand::Null => Value::Null,
        Operand::Path(path) if path.data => frame_for(path, stack)
            .zip(path.segments.first())
            .map(|(frame, name)| frame.data(name))
            .unwrap_or(Value::Null),
        Operand::Path(_) => operand_ref(operand, stack).cloned().unwrap_or(Value::Null),
    }
}

/// Handlebars falsiness: `false`, `null`, `""`, `0` and `[]`.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(_) => true,
    }
}

/// Text form of a context value, as it appears in rendered markup.
pub fn stringify(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => items.iter().map(stringify).collect::<Vec<_>>().join(","),
        Value::Object(_) => "[object Object]".to_string(),
    }
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            '`' => out.push_str("&#x60;"),
            '=' => out.push_str("&#x3D;"),
            _ => out.push(c),
        }
    }
    out
}
