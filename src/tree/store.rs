//! Addressed get/set over nested trees.
//!
//! Two write modes:
//! - [`Mode::Mutable`] writes into the existing containers and keeps the
//!   root reference (signal and binding bookkeeping).
//! - [`Mode::Immutable`] copies every container on the path and shares the
//!   rest (state snapshots that are kept around for diffing).
//!
//! Tagged [`Tree::Node`]s are stepped through: a key applied to a node is
//! applied to its `children`.

use super::{Address, Key, Tree, shared};

/// Write mode of a [`TreeStore`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    Mutable,
    Immutable,
}

fn step<T: Clone>(tree: &Tree<T>, key: &Key) -> Option<Tree<T>> {
    match tree {
        Tree::Node(node) => {
            let children = node.borrow().children.clone();
            step(&children, key)
        }
        _ => tree.child(key),
    }
}

fn lookup<T: Clone>(tree: &Tree<T>, address: &[Key]) -> Option<Tree<T>> {
    address
        .iter()
        .try_fold(tree.clone(), |current, key| step(&current, key))
}

/// Value at `address`, or `Null` if any segment is missing.
pub fn get<T: Clone>(tree: &Tree<T>, address: &[Key]) -> Tree<T> {
    lookup(tree, address).unwrap_or_default()
}

/// Value at `address`, or `default` if any segment is missing.
pub fn get_or<T: Clone>(tree: &Tree<T>, address: &[Key], default: Tree<T>) -> Tree<T> {
    lookup(tree, address).unwrap_or(default)
}

/// Write `value` at `address` and return the resulting root.
///
/// Missing or non-container intermediates are replaced by a fresh array
/// (index segment) or object (field segment).
pub fn set<T: Clone>(tree: &Tree<T>, address: &[Key], value: Tree<T>, mode: Mode) -> Tree<T> {
    let Some((key, rest)) = address.split_first() else {
        return value;
    };

    match (tree, key) {
        (Tree::Node(node), _) => {
            let children = node.borrow().children.clone();
            let children = set(&children, address, value, mode);
            match mode {
                Mode::Mutable => {
                    node.borrow_mut().children = children;
                    tree.clone()
                }
                Mode::Immutable => {
                    let data = node.borrow().data.clone();
                    Tree::node(data, children)
                }
            }
        }
        (Tree::Array(items), Key::Index(index)) => {
            let index = *index;
            let child = items.borrow().get(index).cloned().unwrap_or_default();
            let child = set(&child, rest, value, mode);
            match mode {
                Mode::Mutable => {
                    let mut items = items.borrow_mut();
                    if index >= items.len() {
                        items.resize_with(index + 1, Tree::default);
                    }
                    items[index] = child;
                    drop(items);
                    tree.clone()
                }
                Mode::Immutable => {
                    let mut copy = items.borrow().clone();
                    if index >= copy.len() {
                        copy.resize_with(index + 1, Tree::default);
                    }
                    copy[index] = child;
                    Tree::array(copy)
                }
            }
        }
        (Tree::Object(map), Key::Field(name)) => {
            let child = map.borrow().get(name).cloned().unwrap_or_default();
            let child = set(&child, rest, value, mode);
            match mode {
                Mode::Mutable => {
                    map.borrow_mut().insert(name.clone(), child);
                    tree.clone()
                }
                Mode::Immutable => {
                    let mut copy = map.borrow().clone();
                    copy.insert(name.clone(), child);
                    Tree::Object(shared(copy))
                }
            }
        }
        _ => set(&Tree::container_for(key), address, value, mode),
    }
}

/// A tree root plus the mode used to write into it.
#[derive(Clone, Debug)]
pub struct TreeStore<T> {
    root: Tree<T>,
    mode: Mode,
}

impl<T: Clone> TreeStore<T> {
    pub fn new(root: Tree<T>, mode: Mode) -> Self {
        Self { root, mode }
    }

    pub fn mutable(root: Tree<T>) -> Self {
        Self::new(root, Mode::Mutable)
    }

    pub fn immutable(root: Tree<T>) -> Self {
        Self::new(root, Mode::Immutable)
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn root(&self) -> &Tree<T> {
        &self.root
    }

    pub fn get(&self, address: &Address) -> Tree<T> {
        get(&self.root, address)
    }

    pub fn get_or(&self, address: &Address, default: Tree<T>) -> Tree<T> {
        get_or(&self.root, address, default)
    }

    pub fn set(&mut self, address: &Address, value: Tree<T>) {
        self.root = set(&self.root, address, value, self.mode);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address;
    use crate::tree::{Scalar, Value};
    use serde_json::json;

    fn value(json: serde_json::Value) -> Value {
        Value::from(json)
    }

    #[test]
    fn test_get_traverses_arrays_and_objects() {
        let store = TreeStore::immutable(value(json!({ "a": [0, { "b": 10 }] })));
        assert_eq!(store.get(&address!["a", 1, "b"]).as_i64(), Some(10));
    }

    #[test]
    fn test_get_defaults_to_null() {
        let tree = value(json!({ "a": 10 }));
        assert!(get(&tree, &address!["b"]).is_null());
        assert!(get(&value(json!([0, 1])), &address![2]).is_null());
        assert_eq!(get(&value(json!([0, 1])), &address![1]).as_i64(), Some(1));
    }

    #[test]
    fn test_get_default_for_scalars() {
        for scalar in [json!(null), json!(true), json!(false), json!(3)] {
            assert!(get(&value(scalar), &address!["b"]).is_null());
        }
    }

    #[test]
    fn test_get_never_indexes_strings() {
        assert!(get(&value(json!("abc")), &address![2]).is_null());
    }

    #[test]
    fn test_get_or_uses_caller_default() {
        let tree = value(json!({ "a": 1 }));
        let fallback = Value::from("missing");
        assert_eq!(get_or(&tree, &address!["x", "y"], fallback.clone()), fallback);
    }

    #[test]
    fn test_set_mutable_keeps_root() {
        let mut store = TreeStore::mutable(value(json!([0, { "b": 10 }])));
        let old_root = store.get(&Address::root());
        let address = address![1, "b"];
        store.set(&address, Value::from(20));
        assert_eq!(store.get(&address).as_i64(), Some(20));
        assert!(Tree::ptr_eq(&old_root, &store.get(&Address::root())));
        assert_eq!(old_root, value(json!([0, { "b": 20 }])));
    }

    #[test]
    fn test_set_mutable_top_level() {
        let mut store = TreeStore::mutable(value(json!([0, { "b": 10 }])));
        store.set(&Address::root(), Value::from(20));
        assert_eq!(store.get(&Address::root()).as_i64(), Some(20));
    }

    #[test]
    fn test_set_immutable_copies_path() {
        let mut store = TreeStore::immutable(value(json!([0, { "b": 10 }])));
        let old_root = store.get(&Address::root());
        let address = address![1, "b"];
        store.set(&address, Value::from(20));
        assert_eq!(store.get(&address).as_i64(), Some(20));
        assert!(!Tree::ptr_eq(&old_root, &store.get(&Address::root())));
        assert_eq!(old_root, value(json!([0, { "b": 10 }])));
    }

    #[test]
    fn test_set_immutable_in_array() {
        let mut store = TreeStore::immutable(value(json!([0, { "b": 10 }])));
        let old_root = store.get(&Address::root());
        store.set(&address![1], Value::from(20));
        assert_eq!(store.root(), &value(json!([0, 20])));
        assert!(!Tree::ptr_eq(&old_root, store.root()));
    }

    #[test]
    fn test_set_immutable_shares_siblings() {
        let mut store = TreeStore::immutable(value(json!({ "a": { "x": 1 }, "b": { "y": 2 } })));
        let old_b = store.get(&address!["b"]);
        store.set(&address!["a", "x"], Value::from(5));
        assert!(Tree::ptr_eq(&old_b, &store.get(&address!["b"])));
    }

    #[test]
    fn test_set_creates_intermediate_containers() {
        let mut store = TreeStore::mutable(Value::Null);
        store.set(&address!["a", 2, "b"], Value::from(1));
        assert_eq!(store.root(), &value(json!({ "a": [null, null, { "b": 1 }] })));
    }

    #[test]
    fn test_set_through_node_children_in_array() {
        // child1 is a collection component; its second `a` entry is a nested component
        let mut signals: TreeStore<&str> = TreeStore::mutable(Tree::object([(
            "child1",
            Tree::node("parent", Tree::array([Tree::object([("a", Tree::array([Tree::Null]))])])),
        )]));
        let address = address!["child1", 0, "a", 1];
        let new_signals = Tree::node("TAG", Tree::empty_array());
        signals.set(&address, new_signals.clone());
        assert!(Tree::ptr_eq(&signals.get(&address), &new_signals));
        assert_eq!(signals.get(&address!["child1"]).node_data(), Some("parent"));
    }

    #[test]
    fn test_set_through_node_children_in_object() {
        let mut signals: TreeStore<&str> = TreeStore::mutable(Tree::object([(
            "child1",
            Tree::node("parent", Tree::object([("child2", Tree::node("old", Tree::Null))])),
        )]));
        let address = address!["child1", "child2"];
        let new_signals = Tree::node("TAG", Tree::empty_array());
        signals.set(&address, new_signals.clone());
        assert_eq!(signals.get(&address), new_signals);
    }

    #[test]
    fn test_get_through_nested_nodes() {
        let tree: Tree<&str> = Tree::object([(
            "child1",
            Tree::node(
                "outer",
                Tree::array([Tree::object([(
                    "a",
                    Tree::array([Tree::leaf("zero"), Tree::node("TAG", Tree::empty_array())]),
                )])]),
            ),
        )]);
        assert_eq!(get(&tree, &address!["child1", 0, "a", 1]).node_data(), Some("TAG"));
    }

    #[test]
    fn test_immutable_set_through_node_copies_node() {
        let root: Tree<Scalar> = Tree::node(
            Scalar::Int(1),
            Tree::object([("x", Value::from(1)), ("y", Value::from(2))]),
        );
        let next = set(&root, &address!["x"], Value::from(9), Mode::Immutable);
        assert!(!Tree::ptr_eq(&root, &next));
        assert_eq!(get(&root, &address!["x"]).as_i64(), Some(1));
        assert_eq!(get(&next, &address!["x"]).as_i64(), Some(9));
        assert_eq!(next.node_data(), Some(Scalar::Int(1)));
    }
}
