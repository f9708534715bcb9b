//! Tree operations over `markup5ever_rcdom` nodes.
//!
//! Rendered markup is parsed as a `<body>` fragment. Nodes are shared
//! `Rc` handles, so moving a node keeps every outside reference to it valid.

use html5ever::serialize::{serialize, SerializeOpts, TraversalScope};
use html5ever::tendril::{StrTendril, TendrilSink};
use html5ever::{local_name, namespace_url, ns, parse_fragment, ParseOpts, QualName};
use markup5ever_rcdom::{Handle, Node, NodeData, RcDom, SerializableHandle};
use std::rc::Rc;

// ═══════════════════════════════════════════════════════════════════════════════
// PARSING
// ═══════════════════════════════════════════════════════════════════════════════

/// Parse `markup` and return the element wrapping the fragment's nodes.
pub fn parse_wrapped(markup: &str) -> Handle {
    let dom = parse_fragment(
        RcDom::default(),
        ParseOpts::default(),
        QualName::new(None, ns!(html), local_name!("body")),
        vec![],
    )
    .one(markup);

    let wrapper = dom.document.children.borrow().first().cloned();
    match wrapper {
        Some(wrapper) => {
            detach(&wrapper);
            wrapper
        }
        None => dom.document.clone(),
    }
}

/// Detached top-level nodes of a markup fragment.
pub fn parse_nodes(markup: &str) -> Vec<Handle> {
    take_children(&parse_wrapped(markup))
}

/// Empty detached comment node, used to mark a splice position.
pub fn anchor() -> Handle {
    Node::new(NodeData::Comment {
        contents: StrTendril::new(),
    })
}

/// A single element parsed from markup, detached.
pub fn parse_element(markup: &str) -> Option<Handle> {
    parse_nodes(markup).into_iter().find(is_element)
}

// ═══════════════════════════════════════════════════════════════════════════════
// INSPECTION
// ═══════════════════════════════════════════════════════════════════════════════

pub fn is_element(node: &Handle) -> bool {
    matches!(node.data, NodeData::Element { .. })
}

pub fn attr(node: &Handle, name: &str) -> Option<String> {
    match &node.data {
        NodeData::Element { attrs, .. } => attrs
            .borrow()
            .iter()
            .find(|a| &*a.name.local == name)
            .map(|a| a.value.to_string()),
        _ => None,
    }
}

pub fn tag_name(node: &Handle) -> Option<String> {
    match &node.data {
        NodeData::Element { name, .. } => Some(name.local.to_string()),
        _ => None,
    }
}

pub fn parent(node: &Handle) -> Option<Handle> {
    let weak = node.parent.take();
    let parent = weak.as_ref().and_then(|w| w.upgrade());
    node.parent.set(weak);
    parent
}

pub fn children(node: &Handle) -> Vec<Handle> {
    node.children.borrow().clone()
}

/// Descendants of `root` (excluding `root`) matching `pred`, in document order.
pub fn find_all(root: &Handle, pred: &dyn Fn(&Handle) -> bool) -> Vec<Handle> {
    let mut found = Vec::new();
    let mut stack: Vec<Handle> = children(root).into_iter().rev().collect();
    while let Some(node) = stack.pop() {
        if pred(&node) {
            found.push(node.clone());
        }
        stack.extend(children(&node).into_iter().rev());
    }
    found
}

/// Concatenated text of `node` and its descendants.
pub fn text_content(node: &Handle) -> String {
    let mut out = String::new();
    if let NodeData::Text { contents } = &node.data {
        out.push_str(&contents.borrow());
    }
    for child in children(node) {
        out.push_str(&text_content(&child));
    }
    out
}

pub fn to_html(node: &Handle) -> String {
    let mut bytes = Vec::new();
    let opts = SerializeOpts {
        traversal_scope: TraversalScope::IncludeNode,
        ..Default::default()
    };
    if serialize(&mut bytes, &SerializableHandle::from(node.clone()), opts).is_err() {
        return String::new();
    }
    String::from_utf8_lossy(&bytes).into_owned()
}

pub fn nodes_to_html(nodes: &[Handle]) -> String {
    nodes.iter().map(to_html).collect()
}

// ═══════════════════════════════════════════════════════════════════════════════
// MUTATION
// ═══════════════════════════════════════════════════════════════════════════════

fn index_in_parent(node: &Handle) -> Option<(Handle, usize)> {
    let parent = parent(node)?;
    let index = parent
        .children
        .borrow()
        .iter()
        .position(|child| Rc::ptr_eq(child, node))?;
    Some((parent, index))
}

/// Remove `node` from its parent, if any.
pub fn detach(node: &Handle) {
    if let Some((parent, index)) = index_in_parent(node) {
        parent.children.borrow_mut().remove(index);
    }
    node.parent.set(None);
}

/// Detach and return every child of `node`.
pub fn take_children(node: &Handle) -> Vec<Handle> {
    let taken = std::mem::take(&mut *node.children.borrow_mut());
    for child in &taken {
        child.parent.set(None);
    }
    taken
}

fn insert_at(parent: &Handle, mut index: usize, nodes: &[Handle]) {
    for node in nodes {
        if let Some((old_parent, old_index)) = index_in_parent(node) {
            old_parent.children.borrow_mut().remove(old_index);
            if Rc::ptr_eq(&old_parent, parent) && old_index < index {
                index -= 1;
            }
        }
        node.parent.set(Some(Rc::downgrade(parent)));
        parent.children.borrow_mut().insert(index, node.clone());
        index += 1;
    }
}

pub fn append_children(parent: &Handle, nodes: &[Handle]) {
    let end = parent.children.borrow().len();
    insert_at(parent, end, nodes);
}

/// Put `nodes` where `target` is and detach `target`. Returns false when
/// `target` has no parent, in which case nothing moves.
pub fn replace_with(target: &Handle, nodes: &[Handle]) -> bool {
    let Some((parent, index)) = index_in_parent(target) else {
        return false;
    };
    parent.children.borrow_mut().remove(index);
    target.parent.set(None);
    insert_at(&parent, index, nodes);
    true
}

/// Insert `nodes` right before `anchor`. Returns false when `anchor` has no parent.
pub fn insert_before(anchor: &Handle, nodes: &[Handle]) -> bool {
    let Some((parent, index)) = index_in_parent(anchor) else {
        return false;
    };
    insert_at(&parent, index, nodes);
    true
}

/// Insert `nodes` right after `anchor`. Returns false when `anchor` has no parent.
pub fn insert_after(anchor: &Handle, nodes: &[Handle]) -> bool {
    let Some((parent, index)) = index_in_parent(anchor) else {
        return false;
    };
    insert_at(&parent, index + 1, nodes);
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_nodes_are_detached() {
        let nodes = parse_nodes("<p>a</p>text<b>c</b>");
        assert_eq!(nodes.len(), 3);
        assert!(nodes.iter().all(|n| parent(n).is_none()));
        assert_eq!(nodes_to_html(&nodes), "<p>a</p>text<b>c</b>");
    }

    #[test]
    fn test_attr_and_find_all() {
        let root = parse_wrapped("<div><span data-id=\"1\"></span><p><span data-id=\"2\"></span></p></div>");
        let spans = find_all(&root, &|n| tag_name(n).as_deref() == Some("span"));
        let ids: Vec<String> = spans.iter().filter_map(|n| attr(n, "data-id")).collect();
        assert_eq!(ids, vec!["1", "2"]);
    }

    #[test]
    fn test_replace_with_moves_nodes() {
        let host = parse_element("<div><i>old</i><u>keep</u></div>").unwrap();
        let target = children(&host)[0].clone();
        let fresh = parse_nodes("<b>1</b><b>2</b>");
        assert!(replace_with(&target, &fresh));
        assert_eq!(to_html(&host), "<div><b>1</b><b>2</b><u>keep</u></div>");
        assert!(parent(&target).is_none());
        assert!(Rc::ptr_eq(&parent(&fresh[1]).unwrap(), &host));
    }

    #[test]
    fn test_moving_between_parents() {
        let a = parse_element("<div><em>x</em></div>").unwrap();
        let b = parse_element("<section></section>").unwrap();
        let em = children(&a)[0].clone();
        append_children(&b, &[em.clone()]);
        assert_eq!(to_html(&a), "<div></div>");
        assert_eq!(to_html(&b), "<section><em>x</em></section>");
        assert!(insert_after(&em, &parse_nodes("<i>y</i>")));
        assert_eq!(to_html(&b), "<section><em>x</em><i>y</i></section>");
        detach(&em);
        assert_eq!(text_content(&b), "y");
    }

    #[test]
    fn test_anchor_marks_position() {
        let host = parse_element("<div><i>a</i><u>b</u></div>").unwrap();
        let u = children(&host)[1].clone();
        let mark = anchor();
        assert!(insert_before(&u, &[mark.clone()]));
        assert_eq!(to_html(&host), "<div><i>a</i><!----><u>b</u></div>");
        assert!(replace_with(&mark, &parse_nodes("<b>x</b>")));
        assert_eq!(to_html(&host), "<div><i>a</i><b>x</b><u>b</u></div>");
        assert!(!insert_before(&mark, &parse_nodes("<b>y</b>")));
    }
}
