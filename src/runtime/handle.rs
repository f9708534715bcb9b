//! Render handles.
//!
//! A [`RenderHandle`] is the live result of rendering one template against one
//! context. Holders keep the same handle for its whole life; `rerender` swaps
//! the nodes it covers in place and never replaces the handle itself.

use markup5ever_rcdom::{Handle, WeakHandle};
use serde_json::Value;
use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::rc::Rc;
use tracing::debug;

use super::compose;
use super::dom;
use super::Runtime;
use crate::error::RuntimeError;
use crate::template::TemplateTable;

struct RenderState {
    template: String,
    table: Rc<TemplateTable>,
    context: RefCell<Value>,
    nodes: RefCell<Vec<Handle>>,
    /// Parent to insert into when the handle currently covers no nodes.
    host: RefCell<Option<WeakHandle>>,
}

#[derive(Clone)]
pub struct RenderHandle(Rc<RenderState>);

impl RenderHandle {
    pub(crate) fn new(
        template: &str,
        table: Rc<TemplateTable>,
        context: Value,
        nodes: Vec<Handle>,
    ) -> Self {
        RenderHandle(Rc::new(RenderState {
            template: template.to_string(),
            table,
            context: RefCell::new(context),
            nodes: RefCell::new(nodes),
            host: RefCell::new(None),
        }))
    }

    pub fn template_name(&self) -> &str {
        &self.0.template
    }

    /// The context bound at render time.
    pub fn context(&self) -> Ref<'_, Value> {
        self.0.context.borrow()
    }

    /// Mutable access to the bound context; changes show up on the next rerender.
    pub fn context_mut(&self) -> RefMut<'_, Value> {
        self.0.context.borrow_mut()
    }

    /// Current top-level nodes.
    pub fn nodes(&self) -> Vec<Handle> {
        self.0.nodes.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.0.nodes.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.nodes.borrow().is_empty()
    }

    pub fn ptr_eq(&self, other: &RenderHandle) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn to_html(&self) -> String {
        dom::nodes_to_html(&self.0.nodes.borrow())
    }

    pub(crate) fn set_host(&self, host: &Handle) {
        *self.0.host.borrow_mut() = Some(Rc::downgrade(host));
    }

    fn host(&self) -> Option<Handle> {
        self.0.host.borrow().as_ref().and_then(|w| w.upgrade())
    }

    /// Render again with the bound context and put the fresh nodes where the
    /// current ones are.
    ///
    /// An anchor is placed before the first current node ahead of composing,
    /// since composing may move a current node (a mounted widget root) into the
    /// fresh sequence.
    pub fn rerender(&self, rt: &Runtime) -> Result<(), RuntimeError> {
        let old = self.nodes();
        let mark = dom::anchor();
        let placed = match old.first() {
            Some(first) => {
                if let Some(parent) = dom::parent(first) {
                    self.set_host(&parent);
                }
                dom::insert_before(first, std::slice::from_ref(&mark))
            }
            None => match self.host() {
                Some(host) => {
                    dom::append_children(&host, std::slice::from_ref(&mark));
                    true
                }
                None => false,
            },
        };

        let context = self.0.context.borrow().clone();
        let fresh = match compose::resolve(rt, &self.0.table, &self.0.template, &context) {
            Ok(fresh) => fresh,
            Err(e) => {
                dom::detach(&mark);
                return Err(e);
            }
        };

        for node in &old {
            dom::detach(node);
        }
        if placed {
            dom::replace_with(&mark, &fresh);
        }

        debug!(
            "rerendered {} ({} -> {} nodes)",
            self.0.template,
            old.len(),
            fresh.len()
        );
        *self.0.nodes.borrow_mut() = fresh;
        Ok(())
    }
}

impl fmt::Debug for RenderHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderHandle")
            .field("template", &self.0.template)
            .field("nodes", &self.len())
            .finish()
    }
}
