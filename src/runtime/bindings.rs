//! Mount handles and bindings.
//!
//! A component's render hook tells the runtime where its child components
//! live by binding child addresses to mount handles. The runtime never looks
//! inside a handle; it only hands it back to the child's hooks and to the
//! [`Renderer`](super::Renderer).

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use tracing::warn;

use crate::model::Model;
use crate::tree::{Address, Key, Value, get};

// =============================================================================
// Opaque handles
// =============================================================================

/// Opaque, cloneable mount handle. Two handles are equal when they are the
/// same handle.
#[derive(Clone)]
pub struct Mount(Rc<dyn Any>);

impl Mount {
    pub fn new<T: Any>(target: T) -> Self {
        Self(Rc::new(target))
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref()
    }
}

impl PartialEq for Mount {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Mount {}

impl fmt::Debug for Mount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Mount({:p})", Rc::as_ptr(&self.0))
    }
}

/// Opaque view description produced by a render hook for the renderer.
#[derive(Clone)]
pub struct View(Rc<dyn Any>);

impl View {
    pub fn new<T: Any>(view: T) -> Self {
        Self(Rc::new(view))
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref()
    }
}

impl fmt::Debug for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("View(..)")
    }
}

/// What a render hook produced.
#[derive(Clone, Debug, Default)]
pub enum Rendered {
    #[default]
    Nothing,
    /// Child mounts, bound directly.
    Bindings(Bindings),
    /// A view for the renderer, which reports the bindings it created.
    View(View),
}

// =============================================================================
// Bindings
// =============================================================================

/// Where a binding points: one key of the component's state or a full
/// address below it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BindingTarget {
    Key(Key),
    Address(Address),
}

impl BindingTarget {
    pub fn address(&self) -> Address {
        match self {
            BindingTarget::Key(key) => Address::from_keys([key.clone()]),
            BindingTarget::Address(address) => address.clone(),
        }
    }
}

impl From<&str> for BindingTarget {
    fn from(name: &str) -> Self {
        BindingTarget::Key(name.into())
    }
}

impl From<usize> for BindingTarget {
    fn from(index: usize) -> Self {
        BindingTarget::Key(index.into())
    }
}

impl From<Address> for BindingTarget {
    fn from(address: Address) -> Self {
        BindingTarget::Address(address)
    }
}

/// Ordered `(target, mount)` pairs.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Bindings(Vec<(BindingTarget, Mount)>);

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(mut self, target: impl Into<BindingTarget>, mount: Mount) -> Self {
        self.0.push((target.into(), mount));
        self
    }

    pub fn push(&mut self, target: impl Into<BindingTarget>, mount: Mount) {
        self.0.push((target.into(), mount));
    }

    pub fn iter(&self) -> impl Iterator<Item = &(BindingTarget, Mount)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Escape one address element: `\` and `,` get a backslash.
fn escape(key: &Key) -> String {
    key.to_string().replace('\\', "\\\\").replace(',', "\\,")
}

/// String key of a binding target.
///
/// A single key is used as is; an address joins its escaped elements with
/// `,`.
pub fn make_binding_key(target: &BindingTarget) -> String {
    match target {
        BindingTarget::Key(key) => key.to_string(),
        BindingTarget::Address(address) => address.iter().map(escape).collect::<Vec<_>>().join(","),
    }
}

/// Binding key of a child address.
pub(crate) fn address_key(address: &Address) -> String {
    match &address[..] {
        [key] => key.to_string(),
        _ => make_binding_key(&BindingTarget::Address(address.clone())),
    }
}

/// Map every binding to its key.
///
/// A binding that does not point at a component slot with state is kept,
/// but logged.
pub fn process_bindings(bindings: &Bindings, model: &Model, state: &Value) -> IndexMap<String, Mount> {
    bindings
        .iter()
        .map(|(target, mount)| {
            let address = target.address();
            let resolves = matches!(model.at(&address), Some(Model::Component(_)))
                && get(state, &address).is_present();
            if !resolves {
                warn!(%address, "binding does not match a component in the model");
            }
            (make_binding_key(target), mount.clone())
        })
        .collect()
}
