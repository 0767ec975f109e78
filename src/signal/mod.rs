//! Signals - per-instance event channels and their forwarding surface.
//!
//! Every component instance owns one [`SignalChannel`] per declared signal
//! name. Its parent reaches those channels through a [`ChildSignals`]
//! surface that mirrors the parent's model:
//!
//! ```text
//! parent.child_signals.child.setChild1.call(p)   ──► every live child's setChild1
//! child.signals.setParent.call(p)                ──► parent handlers registered
//!                                                    with on_each, plus context
//! ```
//!
//! Fan-out bookkeeping lives on the parent-facing channel: registered
//! handlers (`on` / `on_each`) and live call targets (one per child
//! instance). Targets are added on CREATE at the child's index or key
//! position and removed on DESTROY by [`merge_signals`], never touched on
//! UPDATE.
//!
//! # Example
//!
//! ```ignore
//! Component::builder("Parent")
//!     .model(Model::object([("child", array_of(&child))]))
//!     .signals(["setChild1"])
//!     .signal_setup(|setup| {
//!         let to_children = setup.child_signal(&address!["child"], "setChild1")?;
//!         setup.signal("setChild1")?.on(move |payload| to_children.call(payload));
//!         Ok(())
//!     })
//! ```

mod merge;

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::error::{Error, Result};
use crate::model::Model;
use crate::runtime::StateCallers;
use crate::tree::{Address, Key, Tree, Value};

pub use merge::merge_signals;
pub(crate) use merge::{ParentLink, merge_scoped};

/// Listener of a channel.
pub type Handler = Rc<dyn Fn(&Value) -> Result<()>>;

/// Listener registered on a collection with `on_each`.
pub type EachHandler = Rc<dyn Fn(&Value, &EachContext) -> Result<()>>;

/// Signal tree: one node per component slot, `None` data for slots that are
/// not drawn.
pub type SignalTree = Tree<Option<Rc<SignalData>>>;

// =============================================================================
// Channel
// =============================================================================

/// Raw multi-listener dispatcher.
///
/// No payload validation; listeners run in registration order and the first
/// error stops the call.
#[derive(Default)]
pub struct Channel {
    listeners: RefCell<Vec<Handler>>,
}

impl Channel {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub fn on(&self, handler: Handler) {
        self.listeners.borrow_mut().push(handler);
    }

    pub fn call(&self, payload: &Value) -> Result<()> {
        // Listeners may register more listeners.
        let listeners = self.listeners.borrow().clone();
        for listener in listeners {
            listener(payload)?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.listeners.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// =============================================================================
// Signal channels
// =============================================================================

/// Position of a child inside its collection.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum EachContext {
    Index(usize),
    Key(String),
}

impl EachContext {
    pub fn index(&self) -> Option<usize> {
        match self {
            EachContext::Index(index) => Some(*index),
            EachContext::Key(_) => None,
        }
    }

    pub fn key(&self) -> Option<&str> {
        match self {
            EachContext::Key(key) => Some(key),
            EachContext::Index(_) => None,
        }
    }
}

impl From<&Key> for EachContext {
    fn from(key: &Key) -> Self {
        match key {
            Key::Index(index) => EachContext::Index(*index),
            Key::Field(name) => EachContext::Key(name.clone()),
        }
    }
}

#[derive(Clone)]
enum OnFn {
    Single(Handler),
    Each(EachHandler),
}

impl OnFn {
    /// Listener to attach to one target.
    fn bind(&self, context: Option<&EachContext>) -> Option<Handler> {
        match (self, context) {
            (OnFn::Single(handler), _) => Some(handler.clone()),
            (OnFn::Each(handler), Some(context)) => {
                let handler = handler.clone();
                let context = context.clone();
                Some(Rc::new(move |payload: &Value| handler(payload, &context)))
            }
            (OnFn::Each(_), None) => None,
        }
    }
}

/// A live receiver of a signal channel.
#[derive(Clone)]
pub(crate) struct CallTarget {
    address: Address,
    context: Option<EachContext>,
    channel: Rc<Channel>,
}

/// Whether a channel addresses one instance or a collection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelKind {
    Single,
    Collection,
}

/// Public signal endpoint.
///
/// An instance's own signal has exactly one target: the instance's
/// [`Channel`]. A parent-facing signal has one target per live child.
pub struct SignalChannel {
    name: String,
    kind: ChannelKind,
    on_fns: RefCell<Vec<OnFn>>,
    targets: RefCell<Vec<CallTarget>>,
}

impl SignalChannel {
    /// Parent-facing channel without targets.
    pub fn new(name: impl Into<String>, kind: ChannelKind) -> Rc<Self> {
        Rc::new(Self {
            name: name.into(),
            kind,
            on_fns: RefCell::new(Vec::new()),
            targets: RefCell::new(Vec::new()),
        })
    }

    /// Channel owned by the instance at `address`.
    pub fn own(name: impl Into<String>, address: &Address) -> Rc<Self> {
        let signal = Self::new(name, ChannelKind::Single);
        signal.targets.borrow_mut().push(CallTarget {
            address: address.clone(),
            context: None,
            channel: Channel::new(),
        });
        signal
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ChannelKind {
        self.kind
    }

    /// Register `handler(payload)` on every current and future target.
    pub fn on(&self, handler: impl Fn(&Value) -> Result<()> + 'static) {
        self.register(OnFn::Single(Rc::new(handler)));
    }

    /// [`SignalChannel::on`] for an already shared handler.
    pub fn connect(&self, handler: Handler) {
        self.register(OnFn::Single(handler));
    }

    /// Register `handler(payload, context)` on every current and future
    /// child of a collection.
    pub fn on_each(&self, handler: impl Fn(&Value, &EachContext) -> Result<()> + 'static) -> Result<()> {
        if self.kind != ChannelKind::Collection {
            return Err(Error::argument(
                self.name.as_str(),
                "on_each is only available on collection signals",
            ));
        }
        self.register(OnFn::Each(Rc::new(handler)));
        Ok(())
    }

    fn register(&self, on_fn: OnFn) {
        let targets = self.targets.borrow().clone();
        for target in &targets {
            if let Some(handler) = on_fn.bind(target.context.as_ref()) {
                target.channel.on(handler);
            }
        }
        self.on_fns.borrow_mut().push(on_fn);
    }

    /// Invoke every target with `payload`, which must be a mapping.
    ///
    /// `Null` is accepted as an empty mapping.
    pub fn call(&self, payload: &Value) -> Result<()> {
        let payload = match payload {
            Tree::Null => Value::empty_object(),
            Tree::Object(_) => payload.clone(),
            _ => {
                return Err(Error::argument(
                    self.name.as_str(),
                    "Call only accepts a single object as argument.",
                ));
            }
        };
        let targets = self.targets.borrow().clone();
        for target in targets {
            target.channel.call(&payload)?;
        }
        Ok(())
    }

    /// Handler that forwards its payload to [`SignalChannel::call`].
    pub fn caller(self: &Rc<Self>) -> Handler {
        let signal = self.clone();
        Rc::new(move |payload: &Value| signal.call(payload))
    }

    /// Channel of an instance's own signal.
    pub(crate) fn own_channel(&self) -> Option<Rc<Channel>> {
        self.targets.borrow().first().map(|target| target.channel.clone())
    }

    /// Add a live child: bind every registered handler to it with `context`.
    ///
    /// Index targets are kept in index order; key targets are appended and
    /// placed with [`SignalChannel::order_targets`].
    pub(crate) fn attach_target(&self, address: &Address, context: Option<EachContext>, channel: Rc<Channel>) {
        let on_fns = self.on_fns.borrow().clone();
        for on_fn in &on_fns {
            if let Some(handler) = on_fn.bind(context.as_ref()) {
                channel.on(handler);
            }
        }
        let mut targets = self.targets.borrow_mut();
        let position = match &context {
            Some(EachContext::Index(index)) => targets
                .iter()
                .position(|target| matches!(target.context, Some(EachContext::Index(other)) if other > *index))
                .unwrap_or(targets.len()),
            _ => targets.len(),
        };
        targets.insert(
            position,
            CallTarget {
                address: address.clone(),
                context,
                channel,
            },
        );
    }

    /// Drop the targets of the child at `address`.
    pub(crate) fn remove_targets(&self, address: &Address) {
        self.targets.borrow_mut().retain(|target| &target.address != address);
    }

    /// Sort targets to follow `order`. Targets missing from `order` go last.
    pub(crate) fn order_targets(&self, order: &[Address]) {
        self.targets.borrow_mut().sort_by_key(|target| {
            order
                .iter()
                .position(|address| address == &target.address)
                .unwrap_or(usize::MAX)
        });
    }

    pub(crate) fn snapshot_targets(&self) -> Vec<CallTarget> {
        self.targets.borrow().clone()
    }

    pub(crate) fn restore_targets(&self, targets: Vec<CallTarget>) {
        *self.targets.borrow_mut() = targets;
    }

    /// Addresses of the live targets, in call order.
    pub fn target_addresses(&self) -> Vec<Address> {
        self.targets.borrow().iter().map(|target| target.address.clone()).collect()
    }

    /// Number of live targets.
    pub fn call_targets_len(&self) -> usize {
        self.targets.borrow().len()
    }

    /// Number of registered `on` / `on_each` handlers.
    pub fn on_fns_len(&self) -> usize {
        self.on_fns.borrow().len()
    }
}

impl fmt::Debug for SignalChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalChannel")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("on_fns", &self.on_fns_len())
            .field("targets", &self.call_targets_len())
            .finish()
    }
}

// =============================================================================
// Signal sets
// =============================================================================

/// Named signal channels, in declaration order.
#[derive(Debug, Default)]
pub struct SignalSet(IndexMap<String, Rc<SignalChannel>>);

impl SignalSet {
    /// An instance's own channels.
    pub fn own<S: AsRef<str>>(names: &[S], address: &Address) -> Self {
        Self(
            names
                .iter()
                .map(|name| (name.as_ref().to_string(), SignalChannel::own(name.as_ref(), address)))
                .collect(),
        )
    }

    /// Parent-facing channels for one child slot or collection.
    pub fn forwarding<S: AsRef<str>>(names: &[S], kind: ChannelKind) -> Self {
        Self(
            names
                .iter()
                .map(|name| (name.as_ref().to_string(), SignalChannel::new(name.as_ref(), kind)))
                .collect(),
        )
    }

    pub fn get(&self, name: &str) -> Result<Rc<SignalChannel>> {
        self.0
            .get(name)
            .cloned()
            .ok_or_else(|| Error::unknown("signal", name))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Rc<SignalChannel>)> {
        self.0.iter().map(|(name, signal)| (name.as_str(), signal))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Forwarding surface into child components, shaped like the model.
#[derive(Debug)]
pub enum ChildSignals {
    /// A single child component.
    Single(SignalSet),
    /// An `array_of` / `object_of` collection.
    Collection(SignalSet),
    Array(Vec<ChildSignals>),
    Object(IndexMap<String, ChildSignals>),
    Empty,
}

impl ChildSignals {
    /// Build the surface for a component's sub-model.
    pub fn from_model(model: &Model) -> Self {
        match model {
            Model::Component(component) => {
                ChildSignals::Single(SignalSet::forwarding(component.signal_names(), ChannelKind::Single))
            }
            Model::ArrayOf(component) | Model::ObjectOf(component) => ChildSignals::Collection(
                SignalSet::forwarding(component.signal_names(), ChannelKind::Collection),
            ),
            Model::Array(models) => ChildSignals::Array(models.iter().map(Self::from_model).collect()),
            Model::Object(models) => ChildSignals::Object(
                models
                    .iter()
                    .map(|(key, model)| (key.clone(), Self::from_model(model)))
                    .collect(),
            ),
            Model::Data => ChildSignals::Empty,
        }
    }

    /// Surface at a model path (collection entries are not part of the path).
    pub fn at(&self, path: &[Key]) -> Option<&ChildSignals> {
        let Some((key, rest)) = path.split_first() else {
            return Some(self);
        };
        match (self, key) {
            (ChildSignals::Array(items), Key::Index(index)) => items.get(*index)?.at(rest),
            (ChildSignals::Object(map), Key::Field(name)) => map.get(name)?.at(rest),
            _ => None,
        }
    }

    /// Signal set at a model path.
    pub fn signals(&self, path: &[Key]) -> Option<&SignalSet> {
        match self.at(path)? {
            ChildSignals::Single(set) | ChildSignals::Collection(set) => Some(set),
            _ => None,
        }
    }

    /// Signal set serving the child instance at `relative` (relative to the
    /// owning component), plus the child's position if it sits in a
    /// collection.
    pub(crate) fn resolve(&self, relative: &[Key]) -> Option<(&SignalSet, Option<EachContext>)> {
        match (self, relative) {
            (ChildSignals::Single(set), []) => Some((set, None)),
            (ChildSignals::Collection(set), [entry]) => Some((set, Some(EachContext::from(entry)))),
            (ChildSignals::Array(items), [Key::Index(index), rest @ ..]) => items.get(*index)?.resolve(rest),
            (ChildSignals::Object(map), [Key::Field(name), rest @ ..]) => map.get(name)?.resolve(rest),
            _ => None,
        }
    }
}

/// Signal bookkeeping of one live component instance.
#[derive(Debug)]
pub struct SignalData {
    pub signals: SignalSet,
    pub child_signals: ChildSignals,
}

// =============================================================================
// Signal setup context
// =============================================================================

/// Context handed to a component's signal setup.
pub struct SignalSetup<'a> {
    pub signals: &'a SignalSet,
    pub child_signals: &'a ChildSignals,
    pub callers: StateCallers,
}

impl SignalSetup<'_> {
    /// One of the instance's own signals.
    pub fn signal(&self, name: &str) -> Result<Rc<SignalChannel>> {
        self.signals.get(name)
    }

    /// Parent-facing signal of the child slot or collection at `path`.
    pub fn child_signal(&self, path: &[Key], name: &str) -> Result<Rc<SignalChannel>> {
        self.child_signals
            .signals(path)
            .ok_or_else(|| Error::unknown("child", Address::from_keys(path.iter().cloned()).to_string()))?
            .get(name)
    }

    /// Handler that runs the named reducer of this instance.
    pub fn reducer(&self, name: &str) -> Result<Handler> {
        self.callers.reducer(name)
    }

    /// Handler that runs the named method of this instance.
    pub fn method(&self, name: &str) -> Result<Handler> {
        self.callers.method(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address;
    use crate::model::{Component, array_of};
    use serde_json::json;
    use std::cell::Cell;

    #[test]
    fn test_channel_calls_multiple_listeners() {
        let called = Rc::new(Cell::new(0));
        let channel = Channel::new();
        let c = called.clone();
        channel.on(Rc::new(move |x: &Value| {
            c.set(c.get() + x.as_i64().unwrap_or(0));
            Ok(())
        }));
        let c = called.clone();
        channel.on(Rc::new(move |x: &Value| {
            c.set(c.get() + x.as_i64().unwrap_or(0) * 2);
            Ok(())
        }));
        channel.call(&Value::from(2)).unwrap();
        assert_eq!(called.get(), 6);
        assert_eq!(channel.len(), 2);
    }

    #[test]
    fn test_own_signal_dispatches_to_handlers() {
        let signal = SignalChannel::own("set", &Address::root());
        let count = Rc::new(Cell::new(0));
        let c = count.clone();
        signal.on(move |payload| {
            c.set(payload.field("x").as_i64().unwrap_or(0));
            Ok(())
        });
        signal.call(&Value::from(json!({ "x": 10 }))).unwrap();
        assert_eq!(count.get(), 10);
        assert_eq!(signal.on_fns_len(), 1);
    }

    #[test]
    fn test_call_sums_payload_fields() {
        let signal = SignalChannel::own("sum", &Address::root());
        let count = Rc::new(Cell::new(0));
        let c = count.clone();
        signal.on(move |payload| {
            let x = payload.field("x").as_i64().unwrap_or(0);
            let y = payload.field("y").as_i64().unwrap_or(0);
            c.set(x + y);
            Ok(())
        });
        signal.call(&Value::from(json!({ "x": 20, "y": 30 }))).unwrap();
        assert_eq!(count.get(), 50);
    }

    #[test]
    fn test_call_rejects_non_mapping() {
        let signal = SignalChannel::own("sig", &Address::root());
        let err = signal.call(&Value::from(1)).unwrap_err();
        assert!(err.to_string().contains("Call only accepts a single object as argument."));
        assert!(signal.call(&Value::Null).is_ok());
    }

    #[test]
    fn test_on_each_passes_context() {
        let api = SignalChannel::new("sig", ChannelKind::Collection);
        let watch = Rc::new(RefCell::new(String::new()));
        let w = watch.clone();
        api.on_each(move |payload, context| {
            assert_eq!(context.index(), None);
            *w.borrow_mut() = format!("{}{}", context.key().unwrap_or(""), payload.field("x").as_i64().unwrap_or(0));
            Ok(())
        })
        .unwrap();

        let child = Channel::new();
        api.attach_target(&address!["list", "key"], Some(EachContext::Key("key".into())), child.clone());
        child.call(&Value::from(json!({ "x": 10 }))).unwrap();
        assert_eq!(*watch.borrow(), "key10");
    }

    #[test]
    fn test_on_each_rejected_on_single() {
        let api = SignalChannel::new("sig", ChannelKind::Single);
        assert!(matches!(api.on_each(|_, _| Ok(())), Err(Error::ArgumentShape { .. })));
    }

    #[test]
    fn test_handlers_reach_late_and_early_targets() {
        let api = SignalChannel::new("sig", ChannelKind::Collection);
        let hits = Rc::new(Cell::new(0));

        let early = Channel::new();
        api.attach_target(&address![0], Some(EachContext::Index(0)), early.clone());

        let h = hits.clone();
        api.on_each(move |_, context| {
            h.set(h.get() + 1 + context.index().unwrap_or(0));
            Ok(())
        })
        .unwrap();

        let late = Channel::new();
        api.attach_target(&address![1], Some(EachContext::Index(1)), late.clone());

        early.call(&Value::empty_object()).unwrap();
        late.call(&Value::empty_object()).unwrap();
        assert_eq!(hits.get(), 1 + 2);

        assert_eq!(api.call_targets_len(), 2);
        api.remove_targets(&address![0]);
        assert_eq!(api.call_targets_len(), 1);
    }

    #[test]
    fn test_index_targets_stay_in_index_order() {
        let api = SignalChannel::new("sig", ChannelKind::Collection);
        for index in [0, 2, 1] {
            api.attach_target(&address![index], Some(EachContext::Index(index)), Channel::new());
        }
        assert_eq!(api.target_addresses(), vec![address![0], address![1], address![2]]);

        api.attach_target(&address!["b"], Some(EachContext::Key("b".into())), Channel::new());
        api.attach_target(&address!["a"], Some(EachContext::Key("a".into())), Channel::new());
        api.order_targets(&[address!["a"], address!["b"]]);
        assert_eq!(api.target_addresses()[..2], [address!["a"], address!["b"]]);
    }

    #[test]
    fn test_child_signals_keep_model_shape() {
        let has_signal = Component::builder("HasSignal").signals(["ribose"]).build().unwrap();
        let parent = Component::builder("Parent")
            .model(Model::object([("deoxy", array_of(&has_signal))]))
            .build()
            .unwrap();
        let child_signals = ChildSignals::from_model(parent.model());

        let ribose = child_signals.signals(&address!["deoxy"]).unwrap().get("ribose").unwrap();
        assert_eq!(ribose.kind(), ChannelKind::Collection);

        let watch = Rc::new(RefCell::new(String::new()));
        let w = watch.clone();
        ribose
            .on_each(move |payload, context| {
                *w.borrow_mut() = format!(
                    "{}{}",
                    payload.field("s").as_str().unwrap_or(""),
                    context.index().unwrap_or(0)
                );
                Ok(())
            })
            .unwrap();
        let child = Channel::new();
        ribose.attach_target(&address!["deoxy", 2], Some(EachContext::Index(2)), child.clone());
        child.call(&Value::from(json!({ "s": "S" }))).unwrap();
        assert_eq!(*watch.borrow(), "S2");
    }

    #[test]
    fn test_resolve_child_positions() {
        let def = Component::builder("Def").signals(["a"]).build().unwrap();
        let model = Model::object([
            ("one", Model::component(&def)),
            ("list", array_of(&def)),
            ("nested", Model::array([Model::Data, Model::component(&def)])),
        ]);
        let child_signals = ChildSignals::from_model(&model);

        let (_, context) = child_signals.resolve(&address!["one"]).unwrap();
        assert_eq!(context, None);
        let (_, context) = child_signals.resolve(&address!["list", 3]).unwrap();
        assert_eq!(context, Some(EachContext::Index(3)));
        assert!(child_signals.resolve(&address!["nested", 1]).is_some());
        assert!(child_signals.resolve(&address!["nested", 0]).is_none());
        assert!(child_signals.resolve(&address!["one", 0]).is_none());
    }

    #[test]
    fn test_unknown_signal_name() {
        let set = SignalSet::own(&["a"], &Address::root());
        assert!(set.get("a").is_ok());
        assert_eq!(set.get("b").unwrap_err(), Error::unknown("signal", "b"));
    }
}
