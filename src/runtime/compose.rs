//! Composition Resolver
//!
//! Renders a template, parses the markup, then swaps every placeholder marker
//! for the value parked under its id: raw nodes, mounted widget roots, and
//! recursively resolved templates. A marker whose id is gone becomes an empty
//! `<div>` without touching its siblings.

use markup5ever_rcdom::Handle;
use serde_json::Value;
use tracing::{error, warn};

use super::dom;
use super::helpers::RuntimeHelpers;
use super::placeholder::{marker_id, PlaceholderKind};
use super::Runtime;
use crate::error::RuntimeError;
use crate::renderer::render;
use crate::template::TemplateTable;

const EMPTY_BLOCK: &str = "<div></div>";

/// Markup for `name`; an unknown template name renders as an empty block.
pub fn render_markup(
    rt: &Runtime,
    table: &TemplateTable,
    name: &str,
    context: &Value,
) -> Result<String, RuntimeError> {
    match table.get(name) {
        Some(compiled) => Ok(render(&compiled.template, context, &RuntimeHelpers::new(rt))?),
        None => {
            warn!("unknown template {}", name);
            Ok(EMPTY_BLOCK.to_string())
        }
    }
}

/// Fully resolved top-level nodes of `name` rendered with `context`.
pub fn resolve(
    rt: &Runtime,
    table: &TemplateTable,
    name: &str,
    context: &Value,
) -> Result<Vec<Handle>, RuntimeError> {
    let markup = render_markup(rt, table, name, context)?;
    let rendered = dom::parse_wrapped(&markup);

    for (marker, id) in markers(&rendered, PlaceholderKind::Node) {
        match rt.placeholders().take_nodes(id) {
            Some(nodes) => {
                dom::replace_with(&marker, &nodes);
            }
            None => {
                warn!("node placeholder {} not found", id);
                dom::replace_with(&marker, &dom::parse_nodes(EMPTY_BLOCK));
            }
        }
    }

    for (marker, id) in markers(&rendered, PlaceholderKind::Widget) {
        match rt.placeholders().widget(id) {
            Some(instance) => {
                dom::replace_with(&marker, &[instance.root().clone()]);
            }
            None => {
                error!("widget placeholder {} not found", id);
                dom::replace_with(&marker, &dom::parse_nodes(EMPTY_BLOCK));
            }
        }
    }

    for (marker, id) in markers(&rendered, PlaceholderKind::Template) {
        let nested = match rt.placeholders().take_template(id) {
            Some(pending) => resolve(rt, table, &pending.name, &pending.context)
                .unwrap_or_else(|e| {
                    warn!("nested template {} failed: {}", pending.name, e);
                    dom::parse_nodes(EMPTY_BLOCK)
                }),
            None => {
                warn!("template placeholder {} not found", id);
                dom::parse_nodes(EMPTY_BLOCK)
            }
        };
        dom::replace_with(&marker, &nested);
    }

    Ok(dom::take_children(&rendered))
}

fn markers(root: &Handle, kind: PlaceholderKind) -> Vec<(Handle, u64)> {
    dom::find_all(root, &|node| marker_id(node, kind).is_some())
        .into_iter()
        .filter_map(|node| marker_id(&node, kind).map(|id| (node, id)))
        .collect()
}
