//! Component runtime - state, signals and render passes of one running app.
//!
//! Every accepted state change runs one synchronous cycle:
//!
//! ```text
//! check_state → replace state → diff → merge signals → bump revision → render pass
//! ```
//!
//! State lives in an immutable [`TreeStore`] (old snapshots are diffed
//! against), signals in a mutable one (channel identity must survive).
//! Nested calls from hooks run their own full cycle before returning. No
//! `RefCell` borrow is held while user code runs. A cycle whose signal merge
//! fails leaves state, signals and revision as they were.
//!
//! # Example
//!
//! ```ignore
//! let runtime = run(&app, Mount::new(root), RunOptions::default())?;
//! runtime.signal("increment")?.call(&Value::empty_object())?;
//! assert_eq!(runtime.get_state().field("count").as_i64(), Some(1));
//! ```

mod bindings;
mod renderer;

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

use spark_signals::{Signal, signal};
use tracing::{debug, info, trace};

pub use bindings::{BindingTarget, Bindings, Mount, Rendered, View, make_binding_key, process_bindings};
pub use renderer::{NullRenderer, Renderer, UpdateElOutput, update_el};

use crate::diff::{Changes, DiffTag, DiffTree, diff_with_model_min};
use crate::error::{Error, Result};
use crate::model::{Component, Model, check_state_at, expect_mapping};
use crate::signal::{Handler, ParentLink, SignalChannel, SignalData, SignalTree, merge_scoped};
use crate::tree::{Address, Scalar, TreeStore, Value, get};

// =============================================================================
// Options
// =============================================================================

/// Options of [`run`].
pub struct RunOptions {
    /// Log every committed state at `info` level.
    pub verbose: bool,
    /// Argument of the root component's `init`.
    pub init_args: Value,
    /// Output collaborator; [`NullRenderer`] when absent.
    pub renderer: Option<Box<dyn Renderer>>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            verbose: false,
            init_args: Value::Null,
            renderer: None,
        }
    }
}

// =============================================================================
// Hook arguments and state callers
// =============================================================================

/// Arguments of lifecycle hooks and render.
#[derive(Clone)]
pub struct HookArgs {
    pub state: Value,
    pub last_state: Value,
    pub mount: Option<Mount>,
    pub callers: StateCallers,
}

/// State access bound to one component instance.
#[derive(Clone)]
pub struct StateCallers {
    core: Weak<Core>,
    address: Address,
    component: Rc<Component>,
}

impl StateCallers {
    /// Callers not attached to any runtime: methods and signal wiring work,
    /// state access fails with [`Error::Detached`].
    pub fn detached(component: &Rc<Component>) -> Self {
        Self {
            core: Weak::new(),
            address: Address::root(),
            component: component.clone(),
        }
    }

    /// Callers for another instance of the same runtime.
    pub(crate) fn at(&self, address: &Address, component: &Rc<Component>) -> Self {
        Self {
            core: self.core.clone(),
            address: address.clone(),
            component: component.clone(),
        }
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn component(&self) -> &Rc<Component> {
        &self.component
    }

    fn core(&self) -> Result<Rc<Core>> {
        self.core.upgrade().ok_or(Error::Detached)
    }

    pub fn get_state(&self) -> Result<Value> {
        Ok(self.core()?.state.borrow().get(&self.address))
    }

    pub fn set_state(&self, state: Value) -> Result<()> {
        self.core()?.commit(&self.component, &self.address, state)
    }

    /// Validate and replace the state without diffing or rendering.
    pub fn set_state_no_render(&self, state: Value) -> Result<()> {
        self.core()?.replace(&self.component, &self.address, state).map(|_| ())
    }

    /// Run a reducer against the current state and commit the result.
    pub fn reduce(&self, name: &str, payload: &Value) -> Result<()> {
        if !self.component.has_reducer(name) {
            return Err(Error::unknown("reducer", name));
        }
        let context = format!("{}.{name}", self.component.display_name());
        let payload = expect_mapping(&context, payload)?;
        let state = self.get_state()?;
        let next = self.component.apply_reducer(name, &payload.with_field("state", state))?;
        self.set_state(next)
    }

    pub fn call_method(&self, name: &str, payload: &Value) -> Result<()> {
        let method = self.component.method(name)?.clone();
        let context = format!("{}.{name}", self.component.display_name());
        let payload = expect_mapping(&context, payload)?;
        method(self, &payload)
    }

    /// One of this instance's own signals.
    pub fn signal(&self, name: &str) -> Result<Rc<SignalChannel>> {
        let data = self
            .core()?
            .signals
            .borrow()
            .get(&self.address)
            .node_data()
            .flatten()
            .ok_or_else(|| Error::unknown("signal", name))?;
        data.signals.get(name)
    }

    /// Handler running the named reducer.
    pub fn reducer(&self, name: &str) -> Result<Handler> {
        if !self.component.has_reducer(name) {
            return Err(Error::unknown("reducer", name));
        }
        let callers = self.clone();
        let name = name.to_string();
        Ok(Rc::new(move |payload: &Value| callers.reduce(&name, payload)))
    }

    /// Handler running the named method.
    pub fn method(&self, name: &str) -> Result<Handler> {
        self.component.method(name)?;
        let callers = self.clone();
        let name = name.to_string();
        Ok(Rc::new(move |payload: &Value| callers.call_method(&name, payload)))
    }
}

impl fmt::Debug for StateCallers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateCallers")
            .field("address", &self.address)
            .field("component", &self.component.display_name())
            .field("attached", &(self.core.strong_count() > 0))
            .finish()
    }
}

// =============================================================================
// Core
// =============================================================================

struct Core {
    root: Rc<Component>,
    target: Mount,
    state: RefCell<TreeStore<Scalar>>,
    signals: RefCell<TreeStore<Option<Rc<SignalData>>>>,
    /// Mounts of child instances, by absolute address.
    bindings: RefCell<HashMap<Address, Mount>>,
    renderer: RefCell<Box<dyn Renderer>>,
    verbose: bool,
    revision: Signal<u64>,
}

impl Core {
    fn callers(self: &Rc<Self>, address: &Address, component: &Rc<Component>) -> StateCallers {
        StateCallers {
            core: Rc::downgrade(self),
            address: address.clone(),
            component: component.clone(),
        }
    }

    fn mount_at(&self, address: &Address) -> Option<Mount> {
        if address.is_empty() {
            return Some(self.target.clone());
        }
        self.bindings.borrow().get(address).cloned()
    }

    /// Nearest live component instance strictly above `address`.
    fn parent_link(&self, address: &Address) -> Option<ParentLink> {
        let root = Model::Component(self.root.clone());
        let signals = self.signals.borrow();
        (0..address.len()).rev().find_map(|len| {
            let base = address.prefix(len);
            if !matches!(root.at(&base), Some(Model::Component(_))) {
                return None;
            }
            let data = signals.get(&base).node_data().flatten()?;
            Some(ParentLink { data, base })
        })
    }

    fn replace(&self, component: &Rc<Component>, address: &Address, state: Value) -> Result<Value> {
        check_state_at(&Model::Component(component.clone()), &state, address)?;
        let last = self.state.borrow().get(address);
        self.state.borrow_mut().set(address, state);
        Ok(last)
    }

    fn commit(self: &Rc<Self>, component: &Rc<Component>, address: &Address, state: Value) -> Result<()> {
        let previous = self.state.borrow().root().clone();
        let last = self.replace(component, address, state.clone())?;
        if self.verbose {
            info!(%address, component = component.display_name(), state = %state.to_json(), "state changed");
        }

        let model = Model::Component(component.clone());
        let out = diff_with_model_min(&model, &state, &last, address, address);

        let old_signals = self.signals.borrow().get(address);
        promote_unwired(&out.min_signals.diff, &state, &old_signals);
        let parent = self.parent_link(address);
        let callers = self.callers(address, component);
        let merged = match merge_scoped(&model, address, &out.min_signals.diff, &old_signals, &callers, parent.as_ref()) {
            Ok(merged) => merged,
            Err(err) => {
                debug!(%address, %err, "merge failed, state restored");
                *self.state.borrow_mut() = TreeStore::immutable(previous);
                return Err(err);
            }
        };
        self.signals.borrow_mut().set(address, merged);

        let revision = self.revision.get() + 1;
        self.revision.set(revision);

        let changes = Changes::of(&out.min_update.diff);
        debug!(%address, ?changes, revision, "committed");
        if changes.is_empty() {
            return Ok(());
        }
        let mount = self.mount_at(address);
        self.render_node(component, address, &out.min_update.diff, &state, &last, mount)
    }

    fn render_node(
        self: &Rc<Self>,
        component: &Rc<Component>,
        address: &Address,
        diff: &DiffTree,
        state: &Value,
        last_state: &Value,
        mount: Option<Mount>,
    ) -> Result<()> {
        let tag = diff.node_data().flatten();
        let args = HookArgs {
            state: state.clone(),
            last_state: last_state.clone(),
            mount,
            callers: self.callers(address, component),
        };
        if tag == Some(DiffTag::Destroy) {
            return self.unmount(component, address, diff, &args);
        }

        let out = update_el(address, component, tag, &args, &self.renderer)?;

        for (relative, child_diff) in diff.child_nodes() {
            let Some(Model::Component(child)) = component.model().at(&relative) else {
                continue;
            };
            let child_address = address.join(&relative);
            let bound = out
                .render_result
                .as_ref()
                .and_then(|result| result.get(&bindings::address_key(&relative)).cloned());
            if let Some(mount) = &bound {
                self.bindings.borrow_mut().insert(child_address.clone(), mount.clone());
            }
            let child_mount = bound.or_else(|| self.mount_at(&child_address));
            let child_tag = child_diff.node_data().flatten();
            if child_mount.is_none() && child_tag != Some(DiffTag::Destroy) {
                trace!(address = %child_address, "no mount, skipped");
                continue;
            }
            self.render_node(
                &child,
                &child_address,
                &child_diff,
                &get(state, &relative),
                &get(last_state, &relative),
                child_mount,
            )?;
        }

        if out.render_result.is_some() {
            let lifecycle = component.lifecycle();
            let hook = match tag {
                Some(DiffTag::Create) => lifecycle.did_mount.clone(),
                Some(DiffTag::Update) => lifecycle.did_update.clone(),
                _ => None,
            };
            if let Some(hook) = hook {
                hook(&args)?;
            }
        }
        Ok(())
    }

    fn unmount(
        self: &Rc<Self>,
        component: &Rc<Component>,
        address: &Address,
        diff: &DiffTree,
        args: &HookArgs,
    ) -> Result<()> {
        update_el(address, component, Some(DiffTag::Destroy), args, &self.renderer)?;

        for (relative, child_diff) in diff.child_nodes() {
            let Some(Model::Component(child)) = component.model().at(&relative) else {
                continue;
            };
            if child_diff.node_data().flatten() != Some(DiffTag::Destroy) {
                continue;
            }
            let child_address = address.join(&relative);
            let child_mount = self.mount_at(&child_address);
            self.render_node(
                &child,
                &child_address,
                &child_diff,
                &Value::Null,
                &get(&args.last_state, &relative),
                child_mount,
            )?;
        }

        if let Some(mount) = &args.mount {
            self.renderer.borrow_mut().remove(mount);
        }
        self.bindings.borrow_mut().retain(|bound, _| !bound.starts_with(address));
        trace!(%address, component = component.display_name(), "unmounted");
        Ok(())
    }
}

/// Tag UPDATE every present slot that has no signal data yet.
///
/// Such slots were installed by `set_state_no_render` and would otherwise
/// tag none when the next cycle reuses the same snapshot.
fn promote_unwired(diff: &DiffTree, state: &Value, signals: &SignalTree) {
    if diff.node_data().flatten().is_none() && state.is_present() && signals.node_data().flatten().is_none() {
        diff.set_node_data(Some(DiffTag::Update));
    }
    for (relative, child) in diff.child_nodes() {
        promote_unwired(&child, &get(state, &relative), &get(signals, &relative));
    }
}

// =============================================================================
// Runtime
// =============================================================================

/// A running component tree.
///
/// Dropping the runtime frees every channel and hook; callers captured by
/// handlers then fail with [`Error::Detached`].
pub struct Runtime {
    core: Rc<Core>,
    callers: StateCallers,
}

/// Start `component` rendering into `target`.
pub fn run(component: &Rc<Component>, target: Mount, options: RunOptions) -> Result<Runtime> {
    let RunOptions {
        verbose,
        init_args,
        renderer,
    } = options;

    let core = Rc::new(Core {
        root: component.clone(),
        target,
        state: RefCell::new(TreeStore::immutable(Value::Null)),
        signals: RefCell::new(TreeStore::mutable(SignalTree::Null)),
        bindings: RefCell::new(HashMap::new()),
        renderer: RefCell::new(renderer.unwrap_or_else(|| Box::new(NullRenderer))),
        verbose,
        revision: signal(0),
    });
    let callers = core.callers(&Address::root(), component);

    let state = component.init(&init_args)?;
    debug!(component = component.display_name(), "run");
    callers.set_state(state)?;

    Ok(Runtime { core, callers })
}

impl Runtime {
    pub fn get_state(&self) -> Value {
        self.core.state.borrow().root().clone()
    }

    pub fn set_state(&self, state: Value) -> Result<()> {
        self.callers.set_state(state)
    }

    pub fn set_state_no_render(&self, state: Value) -> Result<()> {
        self.callers.set_state_no_render(state)
    }

    pub fn reduce(&self, name: &str, payload: &Value) -> Result<()> {
        self.callers.reduce(name, payload)
    }

    pub fn call_method(&self, name: &str, payload: &Value) -> Result<()> {
        self.callers.call_method(name, payload)
    }

    /// One of the root instance's signals.
    pub fn signal(&self, name: &str) -> Result<Rc<SignalChannel>> {
        self.callers.signal(name)
    }

    pub fn signal_tree(&self) -> SignalTree {
        self.core.signals.borrow().root().clone()
    }

    /// Callers bound to the root instance.
    pub fn callers(&self) -> &StateCallers {
        &self.callers
    }

    /// Number of committed cycles.
    pub fn revision(&self) -> u64 {
        self.core.revision.get()
    }

    /// Reactive view of [`Runtime::revision`].
    pub fn revision_signal(&self) -> Signal<u64> {
        self.core.revision.clone()
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("component", &self.core.root.display_name())
            .field("revision", &self.revision())
            .finish_non_exhaustive()
    }
}
