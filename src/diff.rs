//! Model-driven minimal diff.
//!
//! The diff walks the model, not the state: plain containers are traversed
//! only to find component boundaries, and every component slot becomes a
//! tagged [`Tree::Node`] whose data is the transition of that slot.
//!
//! ```text
//! old      new      tag
//! absent   absent   none
//! absent   present  CREATE
//! present  absent   DESTROY
//! present  present  UPDATE   (none when both are the same snapshot)
//! ```
//!
//! `Null` and a missing key are the same thing. Values are never compared
//! deeply: a slot is either the very same snapshot or it is updated.

use serde::Serialize;
use tracing::trace;

use crate::model::{Component, Model};
use crate::tree::{Address, Tree, Value};

/// Transition of one component slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiffTag {
    Create,
    Update,
    Destroy,
}

/// Diff tree: a tagged node at every component boundary, `None` data for
/// untouched slots.
pub type DiffTree = Tree<Option<DiffTag>>;

bitflags::bitflags! {
    /// Which transitions occur anywhere in a diff tree.
    ///
    /// An empty set means there is nothing to render.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Changes: u8 {
        const CREATE = 1 << 0;
        const UPDATE = 1 << 1;
        const DESTROY = 1 << 2;
    }
}

impl Changes {
    /// Summarise every tag in `diff`, at any depth.
    pub fn of(diff: &DiffTree) -> Self {
        match diff {
            Tree::Null | Tree::Leaf(_) => Changes::empty(),
            Tree::Array(items) => items.borrow().iter().map(Changes::of).collect(),
            Tree::Object(map) => map.borrow().values().map(Changes::of).collect(),
            Tree::Node(node) => {
                let node = node.borrow();
                Changes::from(node.data) | Changes::of(&node.children)
            }
        }
    }
}

impl From<Option<DiffTag>> for Changes {
    fn from(tag: Option<DiffTag>) -> Self {
        match tag {
            Some(DiffTag::Create) => Changes::CREATE,
            Some(DiffTag::Update) => Changes::UPDATE,
            Some(DiffTag::Destroy) => Changes::DESTROY,
            None => Changes::empty(),
        }
    }
}

/// A diff plus the scope it was computed for.
#[derive(Clone, Debug)]
pub struct ScopedDiff {
    pub diff: DiffTree,
    /// Address of the diff root inside the whole state tree.
    pub address: Address,
    /// Address the old state was read from.
    pub past_address: Address,
    /// Model node matched at the diff root.
    pub model_node: Model,
}

/// Result of [`diff_with_model_min`].
///
/// Both outputs carry the same diff; the signal merge consumes
/// `min_signals` and the render pass consumes `min_update`.
#[derive(Clone, Debug)]
pub struct DiffOutput {
    pub min_signals: ScopedDiff,
    pub min_update: ScopedDiff,
}

/// Transition of a single component slot.
pub fn slot_tag(new: &Value, old: &Value) -> Option<DiffTag> {
    match (old.is_present(), new.is_present()) {
        (false, false) => None,
        (false, true) => Some(DiffTag::Create),
        (true, false) => Some(DiffTag::Destroy),
        (true, true) if Tree::ptr_eq(new, old) => None,
        (true, true) => Some(DiffTag::Update),
    }
}

/// Diff `new` against `old` following `model`.
///
/// `address` is where `model` sits in the whole state tree and
/// `past_address` is where `old` lived. Both are recorded on the result and
/// do not affect the tags.
pub fn diff_with_model_min(
    model: &Model,
    new: &Value,
    old: &Value,
    address: &Address,
    past_address: &Address,
) -> DiffOutput {
    trace!(%address, %past_address, "diff");
    let diff = diff_model(model, new, old);
    let scoped = ScopedDiff {
        diff,
        address: address.clone(),
        past_address: past_address.clone(),
        model_node: model.clone(),
    };
    DiffOutput {
        min_signals: scoped.clone(),
        min_update: scoped,
    }
}

fn diff_model(model: &Model, new: &Value, old: &Value) -> DiffTree {
    match model {
        Model::Data => Tree::Null,
        Model::Component(component) => diff_component(component, new, old),
        Model::ArrayOf(component) => {
            let len = new.items().len().max(old.items().len());
            Tree::array((0..len).map(|index| diff_component(component, &new.at(index), &old.at(index))))
        }
        Model::ObjectOf(component) => {
            let mut keys = new.keys();
            for key in old.keys() {
                if !keys.contains(&key) {
                    keys.push(key);
                }
            }
            Tree::object(keys.into_iter().map(|key| {
                let diff = diff_component(component, &new.field(&key), &old.field(&key));
                (key, diff)
            }))
        }
        Model::Array(models) => Tree::array(models.iter().enumerate().map(|(index, model)| {
            diff_model(model, &new.at(index), &old.at(index))
        })),
        Model::Object(models) => Tree::object(
            models
                .iter()
                .filter(|(_, model)| !matches!(model, Model::Data))
                .map(|(key, model)| (key.clone(), diff_model(model, &new.field(key), &old.field(key)))),
        ),
    }
}

fn diff_component(component: &Component, new: &Value, old: &Value) -> DiffTree {
    let tag = slot_tag(new, old);
    let children = match tag {
        Some(DiffTag::Create) => diff_model(component.model(), new, &Value::Null),
        Some(DiffTag::Destroy) => diff_model(component.model(), &Value::Null, old),
        Some(DiffTag::Update) | None => diff_model(component.model(), new, old),
    };
    Tree::node(tag, children)
}

/// Fold over the first layer of tagged nodes below `tree`, passing each
/// node's data and its address relative to `tree`.
pub fn reduce_children<T: Clone, A>(
    tree: &Tree<T>,
    init: A,
    mut f: impl FnMut(A, &T, &Address) -> A,
) -> A {
    tree.child_nodes()
        .into_iter()
        .fold(init, |acc, (address, node)| match node.node_data() {
            Some(data) => f(acc, &data, &address),
            None => acc,
        })
}
