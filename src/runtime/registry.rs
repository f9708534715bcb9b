//! Widget Registry & Definition
//!
//! `define` registers a widget class under a dotted name. Instantiating a class
//! builds the instance's [`Methods`], runs its `initialize` hook to get the view
//! handle, mounts the view in a tagged container and records the instance so
//! the container can be mapped back to it with `from_node`.

use markup5ever_rcdom::Handle;
use serde_json::Value;
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::rc::Rc;
use tracing::debug;

use super::compose;
use super::dom;
use super::handle::RenderHandle;
use super::placeholder::{marker, PendingTemplate, PlaceholderKind};
use super::Runtime;
use crate::assemble::WidgetDefinition;
use crate::error::RuntimeError;
use crate::style::class_name;
use crate::template::TemplateTable;

/// Attribute tagging a widget container with its instance id.
pub const WIDGET_ID_ATTR: &str = "data-widget-id";
/// Marker class on every widget container.
pub const WIDGET_CLASS: &str = "__widget__";

pub type Initialize = Rc<dyn Fn(&Runtime, &WidgetScope) -> Result<RenderHandle, RuntimeError>>;
pub type ExportedMethod = Rc<dyn Fn(&Runtime, &[Value]) -> Result<Value, RuntimeError>>;

// ═══════════════════════════════════════════════════════════════════════════════
// DEFINITION
// ═══════════════════════════════════════════════════════════════════════════════

/// What a definition's setup hands back: templates, stylesheet and the
/// `initialize` hook run for every instance.
pub struct WidgetSpec {
    pub templates: BTreeMap<String, String>,
    pub css: String,
    pub initialize: Initialize,
}

impl WidgetSpec {
    pub fn new<F>(initialize: F) -> Self
    where
        F: Fn(&Runtime, &WidgetScope) -> Result<RenderHandle, RuntimeError> + 'static,
    {
        Self {
            templates: BTreeMap::new(),
            css: String::new(),
            initialize: Rc::new(initialize),
        }
    }

    /// Spec carrying the templates and stylesheet of an assembled widget.
    pub fn from_definition<F>(definition: &WidgetDefinition, initialize: F) -> Self
    where
        F: Fn(&Runtime, &WidgetScope) -> Result<RenderHandle, RuntimeError> + 'static,
    {
        Self {
            templates: definition.templates.clone(),
            css: definition.css.clone(),
            initialize: Rc::new(initialize),
        }
    }

    pub fn template(mut self, name: &str, markup: &str) -> Self {
        self.templates.insert(name.to_string(), markup.to_string());
        self
    }

    pub fn css(mut self, css: &str) -> Self {
        self.css = css.to_string();
        self
    }
}

pub(crate) struct WidgetClass {
    name: String,
    class_name: String,
    templates: Rc<TemplateTable>,
    initialize: Initialize,
}

/// One segment of the dotted widget namespace.
#[derive(Default)]
pub(crate) struct NamespaceNode {
    class: Option<Rc<WidgetClass>>,
    children: BTreeMap<String, NamespaceNode>,
}

impl NamespaceNode {
    fn lookup(&self, name: &str) -> Option<Rc<WidgetClass>> {
        let mut node = self;
        for part in name.split('.') {
            node = node.children.get(part)?;
        }
        node.class.clone()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// METHODS
// ═══════════════════════════════════════════════════════════════════════════════

/// Capabilities every instance receives, bound to its class's template table.
#[derive(Clone)]
pub struct Methods {
    templates: Rc<TemplateTable>,
}

impl Methods {
    /// Render and compose `name` with `context`, returning a handle bound to it.
    pub fn template(
        &self,
        rt: &Runtime,
        name: &str,
        context: Value,
    ) -> Result<RenderHandle, RuntimeError> {
        let context = if context.is_null() {
            Value::Object(Default::default())
        } else {
            context
        };
        let nodes = compose::resolve(rt, &self.templates, name, &context)?;
        Ok(RenderHandle::new(name, self.templates.clone(), context, nodes))
    }

    pub fn text(&self, rt: &Runtime, key: &str, args: &[&str]) -> String {
        let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        rt.text(key, &args)
    }

    /// Park live nodes; place the returned marker in a `{{{ }}}` slot.
    pub fn node(&self, rt: &Runtime, nodes: Vec<Handle>) -> String {
        let id = rt.next_id();
        rt.placeholders().put_nodes(id, nodes);
        marker(PlaceholderKind::Node, id)
    }

    /// Park an existing instance. The marker stays valid across rerenders.
    pub fn embed(&self, rt: &Runtime, instance: &Rc<WidgetInstance>) -> String {
        let id = rt.next_id();
        rt.placeholders().put_widget(id, instance.clone());
        marker(PlaceholderKind::Widget, id)
    }

    /// Defer a template of this widget until composition.
    pub fn defer(&self, rt: &Runtime, name: &str, context: Value) -> String {
        let id = rt.next_id();
        rt.placeholders().put_template(
            id,
            PendingTemplate {
                name: name.to_string(),
                context,
            },
        );
        marker(PlaceholderKind::Template, id)
    }
}

/// What `initialize` sees: the methods, the constructor arguments, and a place
/// to export public methods.
pub struct WidgetScope {
    pub methods: Methods,
    pub args: Vec<Value>,
    exports: RefCell<HashMap<String, ExportedMethod>>,
}

impl WidgetScope {
    pub fn arg(&self, index: usize) -> Value {
        self.args.get(index).cloned().unwrap_or(Value::Null)
    }

    /// Trailing callbacks argument following `declared` positional ones.
    pub fn callbacks(&self, declared: usize) -> Value {
        match self.args.get(declared) {
            Some(Value::Null) | None => Value::Object(Default::default()),
            Some(value) => value.clone(),
        }
    }

    pub fn export<F>(&self, name: &str, method: F)
    where
        F: Fn(&Runtime, &[Value]) -> Result<Value, RuntimeError> + 'static,
    {
        self.exports
            .borrow_mut()
            .insert(name.to_string(), Rc::new(method));
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// INSTANCES
// ═══════════════════════════════════════════════════════════════════════════════

pub struct WidgetInstance {
    id: u64,
    class: String,
    root: Handle,
    view: RenderHandle,
    exports: HashMap<String, ExportedMethod>,
}

impl WidgetInstance {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Dotted class name.
    pub fn class(&self) -> &str {
        &self.class
    }

    /// The tagged container holding the view.
    pub fn root(&self) -> &Handle {
        &self.root
    }

    pub fn view(&self) -> &RenderHandle {
        &self.view
    }

    pub fn has_method(&self, name: &str) -> bool {
        self.exports.contains_key(name)
    }

    /// Invoke a method exported by `initialize`.
    pub fn call(&self, rt: &Runtime, name: &str, args: &[Value]) -> Result<Value, RuntimeError> {
        let method = self
            .exports
            .get(name)
            .ok_or_else(|| RuntimeError::UnknownMethod {
                widget: self.class.clone(),
                method: name.to_string(),
            })?;
        method(rt, args)
    }

    pub fn to_html(&self) -> String {
        dom::to_html(&self.root)
    }
}

impl fmt::Debug for WidgetInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WidgetInstance")
            .field("id", &self.id)
            .field("class", &self.class)
            .finish()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// REGISTRY
// ═══════════════════════════════════════════════════════════════════════════════

impl Runtime {
    /// Register a widget class. Fails when anything already lives at `name`.
    pub fn define<F>(&self, name: &str, setup: F) -> Result<(), RuntimeError>
    where
        F: FnOnce() -> WidgetSpec,
    {
        let parts: Vec<&str> = name.split('.').collect();
        if name.is_empty() || parts.iter().any(|p| p.is_empty()) {
            return Err(RuntimeError::Widget(format!("invalid widget name {:?}", name)));
        }
        if self.is_name_taken(&parts) {
            return Err(RuntimeError::DefinitionConflict(name.to_string()));
        }

        let spec = setup();
        let templates = TemplateTable::from_sources(spec.templates.iter())
            .map_err(|(_, e)| RuntimeError::Template(e))?;
        self.apply_css(&spec.css);

        let class = Rc::new(WidgetClass {
            name: name.to_string(),
            class_name: class_name(name),
            templates: Rc::new(templates),
            initialize: spec.initialize,
        });

        let mut namespace = self.namespace.borrow_mut();
        let mut node = &mut *namespace;
        for part in parts {
            node = node.children.entry(part.to_string()).or_default();
        }
        node.class = Some(class);
        debug!("defined widget {}", name);
        Ok(())
    }

    fn is_name_taken(&self, parts: &[&str]) -> bool {
        let namespace = self.namespace.borrow();
        let mut node = &*namespace;
        for part in parts {
            match node.children.get(*part) {
                Some(child) => node = child,
                None => return false,
            }
        }
        true
    }

    pub fn is_defined(&self, name: &str) -> bool {
        self.namespace.borrow().lookup(name).is_some()
    }

    /// Create an instance of a defined class.
    pub fn instantiate(
        &self,
        name: &str,
        args: Vec<Value>,
    ) -> Result<Rc<WidgetInstance>, RuntimeError> {
        let class = self
            .namespace
            .borrow()
            .lookup(name)
            .ok_or_else(|| RuntimeError::UnknownWidget(name.to_string()))?;

        let scope = WidgetScope {
            methods: Methods {
                templates: class.templates.clone(),
            },
            args,
            exports: RefCell::new(HashMap::new()),
        };
        let view = (class.initialize)(self, &scope)?;

        let id = self.next_id();
        let container = dom::parse_element(&format!(
            "<div class=\"{} {}\" {}=\"{}\"></div>",
            class.class_name, WIDGET_CLASS, WIDGET_ID_ATTR, id
        ))
        .ok_or_else(|| RuntimeError::Widget(format!("could not create container for {}", name)))?;
        dom::append_children(&container, &view.nodes());
        view.set_host(&container);

        let instance = Rc::new(WidgetInstance {
            id,
            class: class.name.clone(),
            root: container,
            view,
            exports: scope.exports.into_inner(),
        });
        self.record_instance(instance.clone());
        debug!("created {} #{}", name, id);
        Ok(instance)
    }

    /// The instance whose container is `node`, if it is one.
    pub fn from_node(&self, node: &Handle) -> Option<Rc<WidgetInstance>> {
        let id = dom::attr(node, WIDGET_ID_ATTR)?.parse().ok()?;
        self.instance(id)
    }
}
