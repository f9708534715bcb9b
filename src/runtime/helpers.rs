//! Helpers available to every template rendered by the runtime.

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::error;

use super::dom;
use super::placeholder::{marker, PendingTemplate, PlaceholderKind};
use super::Runtime;
use crate::error::RenderError;
use crate::renderer::{stringify, Helpers};

lazy_static! {
    static ref EMPHASIS_RE: Regex = Regex::new(r"\*(.*?)\*").unwrap();
}

pub const HELPER_NAMES: [&str; 6] = ["node", "widget", "template", "text", "render", "render_text"];

/// `\n` -> `<br/>`, `*x*` -> `<b>x</b>`.
pub fn render_text_markup(text: &str) -> String {
    let text = text.replace('\n', "<br/>");
    EMPHASIS_RE.replace_all(&text, "<b>$1</b>").into_owned()
}

pub(crate) struct RuntimeHelpers<'a> {
    rt: &'a Runtime,
}

impl<'a> RuntimeHelpers<'a> {
    pub(crate) fn new(rt: &'a Runtime) -> Self {
        Self { rt }
    }

    /// Park a value as raw nodes. Text without any element is wrapped in a `<span>`.
    fn node(&self, value: &Value) -> String {
        let markup = stringify(value);
        let mut nodes = dom::parse_nodes(&markup);
        if !nodes.iter().any(dom::is_element) {
            nodes = dom::parse_nodes(&format!("<span>{}</span>", markup));
        }
        let id = self.rt.next_id();
        self.rt.placeholders().put_nodes(id, nodes);
        marker(PlaceholderKind::Node, id)
    }

    /// Instantiate a widget and park the instance. A class that cannot be
    /// instantiated renders as an empty block.
    fn widget(&self, params: &[Value]) -> Result<String, RenderError> {
        let class = params
            .first()
            .map(stringify)
            .ok_or_else(|| helper_error("widget", "missing widget class"))?;
        match self.rt.instantiate(&class, params[1..].to_vec()) {
            Ok(instance) => {
                let id = self.rt.next_id();
                self.rt.placeholders().put_widget(id, instance);
                Ok(marker(PlaceholderKind::Widget, id))
            }
            Err(e) => {
                error!("could not create widget {}: {}", class, e);
                Ok("<div></div>".to_string())
            }
        }
    }

    /// Defer a nested template. An explicit context object wins over hash keys.
    fn template(&self, params: &[Value], hash: &Map<String, Value>) -> Result<String, RenderError> {
        let name = params
            .first()
            .map(stringify)
            .ok_or_else(|| helper_error("template", "missing template name"))?;
        let context = match params.get(1) {
            None => Value::Object(hash.clone()),
            Some(Value::Object(explicit)) => {
                let mut merged = hash.clone();
                for (key, value) in explicit {
                    merged.insert(key.clone(), value.clone());
                }
                Value::Object(merged)
            }
            Some(other) => other.clone(),
        };
        let id = self.rt.next_id();
        self.rt
            .placeholders()
            .put_template(id, PendingTemplate { name, context });
        Ok(marker(PlaceholderKind::Template, id))
    }

    fn text(&self, params: &[Value]) -> Result<String, RenderError> {
        let key = params
            .first()
            .map(stringify)
            .ok_or_else(|| helper_error("text", "missing text key"))?;
        let args: Vec<String> = params[1..].iter().map(stringify).collect();
        Ok(self.rt.text(&key, &args))
    }
}

fn helper_error(helper: &str, message: &str) -> RenderError {
    RenderError::Helper {
        helper: helper.to_string(),
        message: message.to_string(),
    }
}

impl Helpers for RuntimeHelpers<'_> {
    fn has_helper(&self, name: &str) -> bool {
        HELPER_NAMES.contains(&name)
    }

    fn call_helper(
        &self,
        name: &str,
        params: &[Value],
        hash: &Map<String, Value>,
    ) -> Result<String, RenderError> {
        match name {
            "node" => Ok(self.node(params.first().unwrap_or(&Value::Null))),
            "widget" => self.widget(params),
            "template" => self.template(params, hash),
            "text" => self.text(params),
            "render" => Ok(render_text_markup(
                &params.first().map(stringify).unwrap_or_default(),
            )),
            "render_text" => Ok(render_text_markup(&self.text(params)?)),
            _ => Err(RenderError::MissingHelper(name.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_text_markup() {
        assert_eq!(
            render_text_markup("one\n*two* and *three*"),
            "one<br/><b>two</b> and <b>three</b>"
        );
    }

    #[test]
    fn test_node_wraps_plain_text() {
        let rt = Runtime::new();
        let helpers = RuntimeHelpers::new(&rt);
        let out = helpers
            .call_helper("node", &[Value::from("plain")], &Map::new())
            .unwrap();
        assert_eq!(out, marker(PlaceholderKind::Node, 1));
        let nodes = rt.placeholders().take_nodes(1).unwrap();
        assert_eq!(dom::nodes_to_html(&nodes), "<span>plain</span>");

        helpers
            .call_helper("node", &[Value::from("<i>x</i>")], &Map::new())
            .unwrap();
        let nodes = rt.placeholders().take_nodes(2).unwrap();
        assert_eq!(dom::nodes_to_html(&nodes), "<i>x</i>");
    }

    #[test]
    fn test_template_context_wins_over_hash() {
        let rt = Runtime::new();
        let helpers = RuntimeHelpers::new(&rt);
        let mut hash = Map::new();
        hash.insert("a".to_string(), Value::from(1));
        hash.insert("b".to_string(), Value::from(2));
        helpers
            .call_helper(
                "template",
                &[Value::from("row"), serde_json::json!({ "b": 3 })],
                &hash,
            )
            .unwrap();
        let pending = rt.placeholders().take_template(1).unwrap();
        assert_eq!(pending.name, "row");
        assert_eq!(pending.context, serde_json::json!({ "a": 1, "b": 3 }));
    }

    #[test]
    fn test_unknown_widget_is_empty_block() {
        let rt = Runtime::new();
        let helpers = RuntimeHelpers::new(&rt);
        let out = helpers
            .call_helper("widget", &[Value::from("No.Such")], &Map::new())
            .unwrap();
        assert_eq!(out, "<div></div>");
        assert!(helpers.call_helper("widget", &[], &Map::new()).is_err());
    }
}
