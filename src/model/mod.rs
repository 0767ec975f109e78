//! Model declarations - the static shape of an application.
//!
//! A model is a closed set of node kinds, matched exhaustively by the diff
//! engine and the signal merge:
//!
//! ```text
//! Component(C)        one instance of C
//! ArrayOf(C)          index-addressed collection of C
//! ObjectOf(C)         key-addressed collection of C
//! Array([..]) / Object({..})   plain containers, traversed to find components
//! Data                plain leaf, ignored by diffing and shape checks
//! ```
//!
//! Models are authored once and never change while a runtime is alive.

mod component;

use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::error::{Error, Result};
use crate::tree::{Address, Key, Tree, Value};

pub use component::*;
pub(crate) use component::expect_mapping;

/// One node of a model tree.
#[derive(Clone)]
pub enum Model {
    Component(Rc<Component>),
    ArrayOf(Rc<Component>),
    ObjectOf(Rc<Component>),
    Array(Rc<Vec<Model>>),
    Object(Rc<IndexMap<String, Model>>),
    Data,
}

/// Ordered, index-addressed collection of `component`.
pub fn array_of(component: &Rc<Component>) -> Model {
    Model::ArrayOf(component.clone())
}

/// Key-addressed collection of `component`.
pub fn object_of(component: &Rc<Component>) -> Model {
    Model::ObjectOf(component.clone())
}

impl Model {
    pub fn component(component: &Rc<Component>) -> Self {
        Model::Component(component.clone())
    }

    pub fn array(models: impl IntoIterator<Item = Model>) -> Self {
        Model::Array(Rc::new(models.into_iter().collect()))
    }

    pub fn object<K: Into<String>>(entries: impl IntoIterator<Item = (K, Model)>) -> Self {
        Model::Object(Rc::new(
            entries.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        ))
    }

    /// Model of a component without any nested structure.
    pub fn empty() -> Self {
        Model::Object(Rc::new(IndexMap::new()))
    }

    /// Whether two model handles are the same declaration.
    pub fn same(&self, other: &Model) -> bool {
        match (self, other) {
            (Model::Component(a), Model::Component(b))
            | (Model::ArrayOf(a), Model::ArrayOf(b))
            | (Model::ObjectOf(a), Model::ObjectOf(b)) => Rc::ptr_eq(a, b),
            (Model::Array(a), Model::Array(b)) => Rc::ptr_eq(a, b),
            (Model::Object(a), Model::Object(b)) => Rc::ptr_eq(a, b),
            (Model::Data, Model::Data) => true,
            _ => false,
        }
    }

    /// Whether any component is declared at or below this node.
    pub fn has_children(&self) -> bool {
        match self {
            Model::Component(_) | Model::ArrayOf(_) | Model::ObjectOf(_) => true,
            Model::Array(models) => models.iter().any(Model::has_children),
            Model::Object(models) => models.values().any(Model::has_children),
            Model::Data => false,
        }
    }

    /// Model node reached by following `address`; component boundaries are
    /// stepped through into the component's own model.
    pub fn at(&self, address: &[Key]) -> Option<Model> {
        let Some((key, rest)) = address.split_first() else {
            return Some(self.clone());
        };
        let next = match (self, key) {
            (Model::Component(component), _) => return component.model().at(address),
            (Model::ArrayOf(component), Key::Index(_))
            | (Model::ObjectOf(component), Key::Field(_)) => Model::Component(component.clone()),
            (Model::Array(models), Key::Index(index)) => models.get(*index)?.clone(),
            (Model::Object(models), Key::Field(name)) => models.get(name)?.clone(),
            _ => return None,
        };
        next.at(rest)
    }
}

impl From<Rc<Component>> for Model {
    fn from(component: Rc<Component>) -> Self {
        Model::Component(component)
    }
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Model::Component(c) => write!(f, "Component({})", c.display_name()),
            Model::ArrayOf(c) => write!(f, "ArrayOf({})", c.display_name()),
            Model::ObjectOf(c) => write!(f, "ObjectOf({})", c.display_name()),
            Model::Array(models) => f.debug_list().entries(models.iter()).finish(),
            Model::Object(models) => f.debug_map().entries(models.iter()).finish(),
            Model::Data => f.write_str("Data"),
        }
    }
}

// =============================================================================
// Shape validation
// =============================================================================

/// Verify that `state` has the container kinds `model` expects.
///
/// `Null` is accepted at every slot (it means "do not draw"); plain leaves in
/// the model accept anything.
pub fn check_state(model: &Model, state: &Value) -> Result<()> {
    check_state_at(model, state, &Address::root())
}

/// [`check_state`] reporting mismatches relative to `address`.
pub fn check_state_at(model: &Model, state: &Value, address: &Address) -> Result<()> {
    if state.is_null() {
        return Ok(());
    }
    let mismatch = || Error::StateShapeMismatch {
        address: address.clone(),
    };

    match model {
        Model::Data => Ok(()),
        Model::Component(component) => check_state_at(component.model(), state, address),
        Model::ArrayOf(component) => {
            if !state.is_array() {
                return Err(mismatch());
            }
            let model = Model::Component(component.clone());
            for (index, item) in state.items().iter().enumerate() {
                check_state_at(&model, item, &address.with(index))?;
            }
            Ok(())
        }
        Model::ObjectOf(component) => {
            if !state.is_object() {
                return Err(mismatch());
            }
            let model = Model::Component(component.clone());
            for (key, item) in state.entries() {
                check_state_at(&model, &item, &address.with(key))?;
            }
            Ok(())
        }
        Model::Array(models) => {
            if !state.is_array() {
                return Err(mismatch());
            }
            for (index, model) in models.iter().enumerate() {
                check_state_at(model, &state.at(index), &address.with(index))?;
            }
            Ok(())
        }
        Model::Object(models) => {
            if !matches!(state, Tree::Object(_)) {
                return Err(mismatch());
            }
            for (key, model) in models.iter() {
                check_state_at(model, &state.field(key), &address.with(key.as_str()))?;
            }
            Ok(())
        }
    }
}
