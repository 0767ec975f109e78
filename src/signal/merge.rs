//! Signal tree merge.
//!
//! Walks the model and a diff tree together with the previous signal tree:
//! - CREATE allocates channels, runs signal setup and links the instance
//!   into its parent's forwarding surface
//! - DESTROY unlinks the instance and drops its node
//! - UPDATE and none reuse the previous [`SignalData`] by reference
//!
//! A failed merge restores every forwarding channel it touched, so the
//! previous signal tree stays valid.

use std::rc::Rc;

use tracing::{debug, trace};

use super::{CallTarget, ChildSignals, SignalChannel, SignalData, SignalSet, SignalSetup, SignalTree};
use crate::diff::{DiffTag, DiffTree};
use crate::error::Result;
use crate::model::{Component, Model};
use crate::runtime::StateCallers;
use crate::tree::{Address, Tree};

/// Forwarding surface of the nearest enclosing component instance.
#[derive(Clone)]
pub(crate) struct ParentLink {
    pub(crate) data: Rc<SignalData>,
    /// Address of the enclosing instance.
    pub(crate) base: Address,
}

impl ParentLink {
    fn attach(&self, address: &Address, own: &SignalSet, journal: &mut Journal) {
        let Some(relative) = address.relative_to(&self.base) else {
            return;
        };
        let Some((api, context)) = self.data.child_signals.resolve(&relative) else {
            return;
        };
        for (name, signal) in own.iter() {
            let (Ok(forward), Some(channel)) = (api.get(name), signal.own_channel()) else {
                continue;
            };
            journal.save(&forward);
            forward.attach_target(address, context.clone(), channel);
        }
        trace!(%address, base = %self.base, "linked child signals");
    }

    fn detach(&self, address: &Address, journal: &mut Journal) {
        let Some(relative) = address.relative_to(&self.base) else {
            return;
        };
        if let Some((api, _)) = self.data.child_signals.resolve(&relative) {
            for (_, forward) in api.iter() {
                journal.save(forward);
                forward.remove_targets(address);
            }
            trace!(%address, base = %self.base, "unlinked child signals");
        }
    }

    /// Put the targets of the collection at `collection` in `live` order.
    fn order(&self, collection: &Address, live: &[Address], journal: &mut Journal) {
        let Some(relative) = collection.relative_to(&self.base) else {
            return;
        };
        if let Some(api) = self.data.child_signals.signals(&relative) {
            for (_, forward) in api.iter() {
                journal.save(forward);
                forward.order_targets(live);
            }
        }
    }
}

/// Target lists of forwarding channels as they were before a merge.
#[derive(Default)]
struct Journal(Vec<(Rc<SignalChannel>, Vec<CallTarget>)>);

impl Journal {
    /// Remember `forward`'s targets unless they were already saved.
    fn save(&mut self, forward: &Rc<SignalChannel>) {
        if self.0.iter().any(|(saved, _)| Rc::ptr_eq(saved, forward)) {
            return;
        }
        self.0.push((forward.clone(), forward.snapshot_targets()));
    }

    fn rollback(self) {
        debug!(channels = self.0.len(), "merge failed, restoring call targets");
        for (forward, targets) in self.0 {
            forward.restore_targets(targets);
        }
    }
}

/// Merge `diff` into `old` and return the new signal tree for `model` at
/// `address`.
///
/// `callers` supplies the bound callers handed to each new instance's
/// signal setup.
pub fn merge_signals(
    model: &Model,
    address: &Address,
    diff: &DiffTree,
    old: &SignalTree,
    callers: &StateCallers,
) -> Result<SignalTree> {
    merge_scoped(model, address, diff, old, callers, None)
}

/// [`merge_signals`] for a subtree whose enclosing instance is `parent`.
pub(crate) fn merge_scoped(
    model: &Model,
    address: &Address,
    diff: &DiffTree,
    old: &SignalTree,
    callers: &StateCallers,
    parent: Option<&ParentLink>,
) -> Result<SignalTree> {
    let mut journal = Journal::default();
    let merged = merge_node(model, address, diff, old, callers, parent, &mut journal);
    if merged.is_err() {
        journal.rollback();
    }
    merged
}

fn merge_node(
    model: &Model,
    address: &Address,
    diff: &DiffTree,
    old: &SignalTree,
    callers: &StateCallers,
    parent: Option<&ParentLink>,
    journal: &mut Journal,
) -> Result<SignalTree> {
    match model {
        Model::Data => Ok(Tree::Null),
        Model::Component(component) => merge_component(component, address, diff, old, callers, parent, journal),
        Model::ArrayOf(component) => {
            let diffs = diff.items();
            let mut merged = Vec::with_capacity(diffs.len());
            for (index, diff) in diffs.iter().enumerate() {
                merged.push(merge_component(
                    component,
                    &address.with(index),
                    diff,
                    &old.at(index),
                    callers,
                    parent,
                    journal,
                )?);
            }
            // Dead tail entries go away; interior ones keep their slot.
            let kept = merged
                .iter()
                .rposition(|node| matches!(node.node_data(), Some(Some(_))))
                .map_or(0, |last| last + 1);
            merged.truncate(kept);
            Ok(Tree::array(merged))
        }
        Model::ObjectOf(component) => {
            let mut merged = Vec::new();
            for (key, diff) in diff.entries() {
                let node = merge_component(
                    component,
                    &address.with(key.as_str()),
                    &diff,
                    &old.field(&key),
                    callers,
                    parent,
                    journal,
                )?;
                if tag_of(&diff) != Some(DiffTag::Destroy) {
                    merged.push((key, node));
                }
            }
            if let Some(parent) = parent {
                let live: Vec<Address> = merged
                    .iter()
                    .filter(|(_, node)| matches!(node.node_data(), Some(Some(_))))
                    .map(|(key, _)| address.with(key.as_str()))
                    .collect();
                parent.order(address, &live, journal);
            }
            Ok(Tree::object(merged))
        }
        Model::Array(models) => {
            let mut merged = Vec::with_capacity(models.len());
            for (index, model) in models.iter().enumerate() {
                merged.push(merge_node(
                    model,
                    &address.with(index),
                    &diff.at(index),
                    &old.at(index),
                    callers,
                    parent,
                    journal,
                )?);
            }
            Ok(Tree::array(merged))
        }
        Model::Object(models) => {
            let mut merged = Vec::with_capacity(models.len());
            for (key, model) in models.iter() {
                if matches!(model, Model::Data) {
                    continue;
                }
                let node = merge_node(
                    model,
                    &address.with(key.as_str()),
                    &diff.field(key),
                    &old.field(key),
                    callers,
                    parent,
                    journal,
                )?;
                merged.push((key.clone(), node));
            }
            Ok(Tree::object(merged))
        }
    }
}

fn tag_of(diff: &DiffTree) -> Option<DiffTag> {
    diff.node_data().flatten()
}

fn merge_component(
    component: &Rc<Component>,
    address: &Address,
    diff: &DiffTree,
    old: &SignalTree,
    callers: &StateCallers,
    parent: Option<&ParentLink>,
    journal: &mut Journal,
) -> Result<SignalTree> {
    let children = diff.node_children().unwrap_or_default();
    let tag = tag_of(diff);

    if tag == Some(DiffTag::Destroy) {
        if let Some(parent) = parent {
            parent.detach(address, journal);
        }
        trace!(%address, component = component.display_name(), "destroy signals");
        return Ok(Tree::node(None, Tree::Null));
    }

    match (tag, old.node_data().flatten()) {
        (Some(DiffTag::Update) | None, Some(data)) => {
            let link = ParentLink {
                data: data.clone(),
                base: address.clone(),
            };
            let old_children = old.node_children().unwrap_or_default();
            let merged = merge_node(
                component.model(),
                address,
                &children,
                &old_children,
                callers,
                Some(&link),
                journal,
            )?;
            Ok(Tree::node(Some(data), merged))
        }
        (None, None) => {
            let merged = merge_node(component.model(), address, &children, &Tree::Null, callers, None, journal)?;
            Ok(Tree::node(None, merged))
        }
        // CREATE, or UPDATE of an instance installed without a render.
        _ => create(component, address, &children, callers, parent, journal),
    }
}

fn create(
    component: &Rc<Component>,
    address: &Address,
    children: &DiffTree,
    callers: &StateCallers,
    parent: Option<&ParentLink>,
    journal: &mut Journal,
) -> Result<SignalTree> {
    let data = Rc::new(SignalData {
        signals: SignalSet::own(component.signal_names(), address),
        child_signals: ChildSignals::from_model(component.model()),
    });
    if let Some(parent) = parent {
        parent.attach(address, &data.signals, journal);
    }
    trace!(%address, component = component.display_name(), "create signals");

    if let Some(setup) = component.signal_setup() {
        setup(&SignalSetup {
            signals: &data.signals,
            child_signals: &data.child_signals,
            callers: callers.at(address, component),
        })?;
    }

    let link = ParentLink {
        data: data.clone(),
        base: address.clone(),
    };
    let merged = merge_node(component.model(), address, children, &Tree::Null, callers, Some(&link), journal)?;
    Ok(Tree::node(Some(data), merged))
}
