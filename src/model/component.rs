//! Component declarations.
//!
//! A component bundles a sub-model with its behavior:
//! - `init` builds the initial state
//! - `reducers` are pure state transitions
//! - `methods` are side-effecting entry points
//! - `signal_names` + `signal_setup` declare and wire event channels
//! - lifecycle hooks and `render` are driven by the runtime
//!
//! # Example
//!
//! ```ignore
//! let counter = Component::builder("Counter")
//!     .init(|_| Value::from(json!({ "count": 0 })))
//!     .reducer("increment", |args| {
//!         let count = args.state.field("count").as_i64().unwrap_or(0);
//!         args.state.with_field("count", Value::from(count + 1))
//!     })
//!     .signals(["increment"])
//!     .signal_setup(|setup| {
//!         setup.signal("increment")?.connect(setup.reducer("increment")?);
//!         Ok(())
//!     })
//!     .build()?;
//! ```

use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use super::Model;
use crate::error::{Error, Result};
use crate::runtime::{HookArgs, Rendered, StateCallers};
use crate::signal::SignalSetup;
use crate::tree::{Tree, Value};

// =============================================================================
// Callback Types
// =============================================================================

/// Builds the initial state from a mapping of init arguments.
pub type InitFn = Rc<dyn Fn(&Value) -> Value>;

/// Pure state transition.
pub type ReducerFn = Rc<dyn Fn(&ReducerArgs) -> Value>;

/// Side-effecting entry point bound to a component instance.
pub type MethodFn = Rc<dyn Fn(&StateCallers, &Value) -> Result<()>>;

/// Wires signal channels when an instance is created.
pub type SignalSetupFn = Rc<dyn Fn(&SignalSetup) -> Result<()>>;

/// Lifecycle hook (`will_mount`, `did_mount`, ...).
pub type HookFn = Rc<dyn Fn(&HookArgs) -> Result<()>>;

/// Decides whether an UPDATE re-renders: `(state, last_state)`.
pub type ShouldUpdateFn = Rc<dyn Fn(&Value, &Value) -> bool>;

/// Produces bindings or a view for the renderer.
pub type RenderFn = Rc<dyn Fn(&HookArgs) -> Result<Rendered>>;

/// Arguments of a reducer: the current state plus the named payload fields.
#[derive(Clone, Debug)]
pub struct ReducerArgs {
    pub state: Value,
    pub payload: Value,
}

impl ReducerArgs {
    /// Payload field or `Null`.
    pub fn get(&self, name: &str) -> Value {
        self.payload.field(name)
    }
}

/// Normalize a zero-or-one mapping argument: `Null` becomes an empty mapping.
pub(crate) fn expect_mapping(context: &str, argument: &Value) -> Result<Value> {
    match argument {
        Tree::Null => Ok(Value::empty_object()),
        Tree::Object(_) => Ok(argument.clone()),
        _ => Err(Error::argument(
            context,
            "only accepts a single object as argument",
        )),
    }
}

/// Optional lifecycle hooks.
#[derive(Clone, Default)]
pub struct Lifecycle {
    pub will_mount: Option<HookFn>,
    pub did_mount: Option<HookFn>,
    pub should_update: Option<ShouldUpdateFn>,
    pub will_update: Option<HookFn>,
    pub did_update: Option<HookFn>,
    pub will_unmount: Option<HookFn>,
}

// =============================================================================
// Component
// =============================================================================

/// A named unit of model, state transitions, signals and lifecycle.
pub struct Component {
    display_name: String,
    model: Model,
    init: Option<InitFn>,
    reducers: IndexMap<String, ReducerFn>,
    methods: IndexMap<String, MethodFn>,
    signal_names: Vec<String>,
    signal_setup: Option<SignalSetupFn>,
    lifecycle: Lifecycle,
    render: Option<RenderFn>,
}

impl Component {
    pub fn builder(display_name: impl Into<String>) -> ComponentBuilder {
        ComponentBuilder {
            component: Component {
                display_name: display_name.into(),
                model: Model::empty(),
                init: None,
                reducers: IndexMap::new(),
                methods: IndexMap::new(),
                signal_names: Vec::new(),
                signal_setup: None,
                lifecycle: Lifecycle::default(),
                render: None,
            },
        }
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn signal_names(&self) -> &[String] {
        &self.signal_names
    }

    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    pub(crate) fn signal_setup(&self) -> Option<&SignalSetupFn> {
        self.signal_setup.as_ref()
    }

    pub(crate) fn render_fn(&self) -> Option<&RenderFn> {
        self.render.as_ref()
    }

    pub fn reducer_names(&self) -> impl Iterator<Item = &str> {
        self.reducers.keys().map(String::as_str)
    }

    pub fn method_names(&self) -> impl Iterator<Item = &str> {
        self.methods.keys().map(String::as_str)
    }

    /// Initial state. Accepts no argument (`Null`) or one mapping.
    ///
    /// Without an `init` the state is an empty mapping.
    pub fn init(&self, args: &Value) -> Result<Value> {
        let args = expect_mapping(&format!("{}.init", self.display_name), args)?;
        Ok(match &self.init {
            Some(init) => init(&args),
            None => Value::empty_object(),
        })
    }

    /// Run a reducer directly. `args` must be a mapping holding a `state`
    /// key; the other fields become the payload.
    pub fn apply_reducer(&self, name: &str, args: &Value) -> Result<Value> {
        let reducer = self
            .reducers
            .get(name)
            .ok_or_else(|| Error::unknown("reducer", name))?;
        let context = format!("{}.{name}", self.display_name);
        let Tree::Object(map) = args else {
            return Err(Error::argument(context, "only accepts a single object as argument"));
        };
        let mut payload = map.borrow().clone();
        let Some(state) = payload.shift_remove("state") else {
            return Err(Error::argument(context, "argument must include the current state"));
        };
        Ok(reducer(&ReducerArgs {
            state,
            payload: Tree::object(payload),
        }))
    }

    pub(crate) fn method(&self, name: &str) -> Result<&MethodFn> {
        self.methods
            .get(name)
            .ok_or_else(|| Error::unknown("method", name))
    }

    pub(crate) fn has_reducer(&self, name: &str) -> bool {
        self.reducers.contains_key(name)
    }

    /// `should_update(state, last_state)`; true when not declared.
    pub fn should_update(&self, state: &Value, last_state: &Value) -> bool {
        self.lifecycle
            .should_update
            .as_ref()
            .is_none_or(|should_update| should_update(state, last_state))
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Component")
            .field("display_name", &self.display_name)
            .field("model", &self.model)
            .field("signal_names", &self.signal_names)
            .field("reducers", &self.reducers.keys().collect::<Vec<_>>())
            .field("methods", &self.methods.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Builder for [`Component`]; [`ComponentBuilder::build`] validates the model.
pub struct ComponentBuilder {
    component: Component,
}

impl ComponentBuilder {
    pub fn model(mut self, model: Model) -> Self {
        self.component.model = model;
        self
    }

    pub fn init(mut self, init: impl Fn(&Value) -> Value + 'static) -> Self {
        self.component.init = Some(Rc::new(init));
        self
    }

    pub fn reducer(
        mut self,
        name: impl Into<String>,
        reducer: impl Fn(&ReducerArgs) -> Value + 'static,
    ) -> Self {
        self.component.reducers.insert(name.into(), Rc::new(reducer));
        self
    }

    pub fn method(
        mut self,
        name: impl Into<String>,
        method: impl Fn(&StateCallers, &Value) -> Result<()> + 'static,
    ) -> Self {
        self.component.methods.insert(name.into(), Rc::new(method));
        self
    }

    pub fn signals<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.component.signal_names = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn signal_setup(mut self, setup: impl Fn(&SignalSetup) -> Result<()> + 'static) -> Self {
        self.component.signal_setup = Some(Rc::new(setup));
        self
    }

    pub fn will_mount(mut self, hook: impl Fn(&HookArgs) -> Result<()> + 'static) -> Self {
        self.component.lifecycle.will_mount = Some(Rc::new(hook));
        self
    }

    pub fn did_mount(mut self, hook: impl Fn(&HookArgs) -> Result<()> + 'static) -> Self {
        self.component.lifecycle.did_mount = Some(Rc::new(hook));
        self
    }

    pub fn should_update(mut self, hook: impl Fn(&Value, &Value) -> bool + 'static) -> Self {
        self.component.lifecycle.should_update = Some(Rc::new(hook));
        self
    }

    pub fn will_update(mut self, hook: impl Fn(&HookArgs) -> Result<()> + 'static) -> Self {
        self.component.lifecycle.will_update = Some(Rc::new(hook));
        self
    }

    pub fn did_update(mut self, hook: impl Fn(&HookArgs) -> Result<()> + 'static) -> Self {
        self.component.lifecycle.did_update = Some(Rc::new(hook));
        self
    }

    pub fn will_unmount(mut self, hook: impl Fn(&HookArgs) -> Result<()> + 'static) -> Self {
        self.component.lifecycle.will_unmount = Some(Rc::new(hook));
        self
    }

    pub fn render(mut self, render: impl Fn(&HookArgs) -> Result<Rendered> + 'static) -> Self {
        self.component.render = Some(Rc::new(render));
        self
    }

    /// Finish the declaration.
    ///
    /// Fails when the model is itself a bare component: nest it in an
    /// object, array or collection instead.
    pub fn build(self) -> Result<Rc<Component>> {
        if let Model::Component(inner) = &self.component.model {
            return Err(Error::Declaration(format!(
                "The model of {} cannot be another Component ({}); wrap it in an object, array, array_of or object_of",
                self.component.display_name,
                inner.display_name(),
            )));
        }
        Ok(Rc::new(self.component))
    }
}
