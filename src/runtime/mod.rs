//! Runtime composition engine.
//!
//! [`Runtime`] is the explicit, single-threaded state every widget operation
//! goes through: the id counter, the three placeholder tables, the widget
//! namespace, the instance index, the loaded locale table and the stylesheet
//! accumulated from definitions. All methods take `&self` so widget code can
//! call back into the runtime while a render is in progress.

pub mod compose;
pub mod dom;
pub mod handle;
pub mod helpers;
pub mod placeholder;
pub mod registry;
pub mod text;

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use tracing::debug;

pub use handle::RenderHandle;
pub use placeholder::{PendingTemplate, PlaceholderKind, PlaceholderTables};
pub use registry::{ExportedMethod, Methods, WidgetInstance, WidgetScope, WidgetSpec};
pub use text::LocaleTable;

use registry::NamespaceNode;

#[derive(Default)]
pub struct Runtime {
    next_id: Cell<u64>,
    placeholders: PlaceholderTables,
    namespace: RefCell<NamespaceNode>,
    instances: RefCell<HashMap<u64, Rc<WidgetInstance>>>,
    locale_name: RefCell<Option<String>>,
    locale: RefCell<LocaleTable>,
    styles: RefCell<Vec<String>>,
}

impl Runtime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every definition, instance, pending placeholder, the locale table
    /// and the stylesheet, and restart ids from 1.
    pub fn reset(&self) {
        self.next_id.set(0);
        self.placeholders.clear();
        *self.namespace.borrow_mut() = NamespaceNode::default();
        self.instances.borrow_mut().clear();
        *self.locale_name.borrow_mut() = None;
        *self.locale.borrow_mut() = LocaleTable::default();
        self.styles.borrow_mut().clear();
        debug!("runtime reset");
    }

    /// Next id from the counter shared by placeholders and widget instances.
    pub fn next_id(&self) -> u64 {
        let id = self.next_id.get() + 1;
        self.next_id.set(id);
        id
    }

    pub fn placeholders(&self) -> &PlaceholderTables {
        &self.placeholders
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // TEXT
    // ═══════════════════════════════════════════════════════════════════════════

    pub fn load_locale(&self, name: &str, table: LocaleTable) {
        debug!("loaded locale {} ({} keys)", name, table.len());
        *self.locale_name.borrow_mut() = Some(name.to_string());
        *self.locale.borrow_mut() = table;
    }

    pub fn locale_name(&self) -> Option<String> {
        self.locale_name.borrow().clone()
    }

    /// Localized text for `key` with `$1..$N` replaced by `args`.
    pub fn text(&self, key: &str, args: &[String]) -> String {
        self.locale.borrow().text(key, args)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // STYLES
    // ═══════════════════════════════════════════════════════════════════════════

    pub(crate) fn apply_css(&self, css: &str) {
        if !css.is_empty() {
            self.styles.borrow_mut().push(css.to_string());
        }
    }

    /// CSS of every definition, in definition order.
    pub fn stylesheet(&self) -> String {
        self.styles.borrow().concat()
    }

    pub(crate) fn record_instance(&self, instance: Rc<WidgetInstance>) {
        self.instances.borrow_mut().insert(instance.id(), instance);
    }

    pub(crate) fn instance(&self, id: u64) -> Option<Rc<WidgetInstance>> {
        self.instances.borrow().get(&id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_shared_and_monotonic() {
        let rt = Runtime::new();
        assert_eq!(rt.next_id(), 1);
        assert_eq!(rt.next_id(), 2);
        rt.reset();
        assert_eq!(rt.next_id(), 1);
    }

    #[test]
    fn test_locale_and_styles_reset() {
        let rt = Runtime::new();
        let mut table = LocaleTable::new();
        table.insert("hi", "Hello $1");
        rt.load_locale("en", table);
        rt.apply_css(".A{color:red}");
        rt.apply_css("");
        rt.apply_css(".B{color:blue}");
        assert_eq!(rt.text("hi", &["Bo".to_string()]), "Hello Bo");
        assert_eq!(rt.stylesheet(), ".A{color:red}.B{color:blue}");
        assert_eq!(rt.locale_name().as_deref(), Some("en"));

        rt.reset();
        assert_eq!(rt.text("hi", &[]), "");
        assert_eq!(rt.stylesheet(), "");
        assert!(rt.locale_name().is_none());
    }
}
