//! Placeholder indirection tables.
//!
//! Templates render to text, so values that are not text (live nodes, widget
//! instances, deferred template calls) are parked in a table under a fresh id
//! and a marker element carrying `(kind, id)` is rendered in their place. The
//! composition pass swaps each marker for the parked value.

use markup5ever_rcdom::Handle;
use serde_json::Value;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use super::dom;
use super::registry::WidgetInstance;

pub const KIND_ATTR: &str = "data-placeholder";
pub const ID_ATTR: &str = "data-id";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlaceholderKind {
    Node,
    Widget,
    Template,
}

impl PlaceholderKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PlaceholderKind::Node => "node",
            PlaceholderKind::Widget => "widget",
            PlaceholderKind::Template => "template",
        }
    }
}

/// Marker markup for one pending value.
pub fn marker(kind: PlaceholderKind, id: u64) -> String {
    format!(
        "<span {}=\"{}\" {}=\"{}\"></span>",
        KIND_ATTR,
        kind.as_str(),
        ID_ATTR,
        id
    )
}

/// The id carried by `node` when it is a marker of `kind`.
pub fn marker_id(node: &Handle, kind: PlaceholderKind) -> Option<u64> {
    if dom::attr(node, KIND_ATTR).as_deref() != Some(kind.as_str()) {
        return None;
    }
    dom::attr(node, ID_ATTR)?.parse().ok()
}

#[derive(Debug, Clone, PartialEq)]
pub struct PendingTemplate {
    pub name: String,
    pub context: Value,
}

/// The three tables. `nodes` and `templates` entries are removed when first
/// resolved; `widgets` entries stay so a widget can be re-mounted when its
/// parent rerenders.
#[derive(Default)]
pub struct PlaceholderTables {
    nodes: RefCell<HashMap<u64, Vec<Handle>>>,
    widgets: RefCell<HashMap<u64, Rc<WidgetInstance>>>,
    templates: RefCell<HashMap<u64, PendingTemplate>>,
}

impl PlaceholderTables {
    pub fn put_nodes(&self, id: u64, nodes: Vec<Handle>) {
        self.nodes.borrow_mut().insert(id, nodes);
    }

    pub fn take_nodes(&self, id: u64) -> Option<Vec<Handle>> {
        self.nodes.borrow_mut().remove(&id)
    }

    pub fn put_widget(&self, id: u64, instance: Rc<WidgetInstance>) {
        self.widgets.borrow_mut().insert(id, instance);
    }

    pub fn widget(&self, id: u64) -> Option<Rc<WidgetInstance>> {
        self.widgets.borrow().get(&id).cloned()
    }

    pub fn put_template(&self, id: u64, pending: PendingTemplate) {
        self.templates.borrow_mut().insert(id, pending);
    }

    pub fn take_template(&self, id: u64) -> Option<PendingTemplate> {
        self.templates.borrow_mut().remove(&id)
    }

    /// Pending `(nodes, widgets, templates)` entry counts.
    pub fn counts(&self) -> (usize, usize, usize) {
        (
            self.nodes.borrow().len(),
            self.widgets.borrow().len(),
            self.templates.borrow().len(),
        )
    }

    pub fn clear(&self) {
        self.nodes.borrow_mut().clear();
        self.widgets.borrow_mut().clear();
        self.templates.borrow_mut().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_roundtrip() {
        let nodes = dom::parse_nodes(&marker(PlaceholderKind::Template, 42));
        assert_eq!(nodes.len(), 1);
        assert_eq!(marker_id(&nodes[0], PlaceholderKind::Template), Some(42));
        assert_eq!(marker_id(&nodes[0], PlaceholderKind::Node), None);
    }

    #[test]
    fn test_nodes_and_templates_are_taken_once() {
        let tables = PlaceholderTables::default();
        tables.put_nodes(1, dom::parse_nodes("<b>x</b>"));
        tables.put_template(
            2,
            PendingTemplate {
                name: "row".to_string(),
                context: Value::Null,
            },
        );
        assert_eq!(tables.counts(), (1, 0, 1));
        assert!(tables.take_nodes(1).is_some());
        assert!(tables.take_nodes(1).is_none());
        assert!(tables.take_template(2).is_some());
        assert!(tables.take_template(2).is_none());
        assert_eq!(tables.counts(), (0, 0, 0));
    }
}
