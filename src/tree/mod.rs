//! Addressed trees - the shared representation for state, diffs and signals.
//!
//! One generic [`Tree`] type backs all three trees the runtime juggles:
//!
//! ```text
//! Value      = Tree<Scalar>                  application state
//! DiffTree   = Tree<Option<DiffTag>>         CREATE / UPDATE / DESTROY per component
//! SignalTree = Tree<Option<Rc<SignalData>>>  channels per component instance
//! ```
//!
//! Containers are reference counted, so two trees can share untouched
//! subtrees and identity is observable through [`Tree::ptr_eq`]. A
//! [`Tree::Node`] is a tagged component node: it carries its own `data` plus a
//! nested `children` tree, and addressing descends through it transparently.
//!
//! Reading and writing by [`Address`] lives in [`store`].

pub mod store;

use std::cell::RefCell;
use std::fmt;
use std::ops::Deref;
use std::rc::Rc;

use indexmap::IndexMap;
use serde::ser::{SerializeMap, SerializeSeq, SerializeStruct};
use serde::{Deserialize, Serialize, Serializer};
use smallvec::SmallVec;

pub use store::{Mode, TreeStore, get, get_or, set};

/// Shared, interior-mutable container cell.
pub type Shared<T> = Rc<RefCell<T>>;

fn shared<T>(value: T) -> Shared<T> {
    Rc::new(RefCell::new(value))
}

// =============================================================================
// Keys and Addresses
// =============================================================================

/// One path segment: an object field or a sequence index.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Key {
    Index(usize),
    Field(String),
}

impl Key {
    /// The index, if this is an index segment.
    pub fn as_index(&self) -> Option<usize> {
        match self {
            Key::Index(index) => Some(*index),
            Key::Field(_) => None,
        }
    }

    /// The field name, if this is a field segment.
    pub fn as_field(&self) -> Option<&str> {
        match self {
            Key::Field(name) => Some(name),
            Key::Index(_) => None,
        }
    }
}

impl From<usize> for Key {
    fn from(index: usize) -> Self {
        Key::Index(index)
    }
}

impl From<&str> for Key {
    fn from(name: &str) -> Self {
        Key::Field(name.to_string())
    }
}

impl From<String> for Key {
    fn from(name: String) -> Self {
        Key::Field(name)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Index(index) => write!(f, "{index}"),
            Key::Field(name) => f.write_str(name),
        }
    }
}

/// Ordered sequence of keys locating a node in a tree.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(SmallVec<[Key; 4]>);

impl Address {
    /// The empty address (the root).
    pub fn root() -> Self {
        Self::default()
    }

    pub fn from_keys(keys: impl IntoIterator<Item = Key>) -> Self {
        Self(keys.into_iter().collect())
    }

    /// A copy of this address with `key` appended.
    pub fn with(&self, key: impl Into<Key>) -> Self {
        let mut keys = self.0.clone();
        keys.push(key.into());
        Self(keys)
    }

    /// Append `key` when present, otherwise return the address unchanged.
    pub fn with_optional(&self, key: Option<Key>) -> Self {
        match key {
            Some(key) => self.with(key),
            None => self.clone(),
        }
    }

    /// This address followed by every key of `relative`.
    pub fn join(&self, relative: &[Key]) -> Self {
        Self(self.0.iter().chain(relative).cloned().collect())
    }

    /// Address without its last segment (root stays root).
    pub fn parent(&self) -> Self {
        let mut keys = self.0.clone();
        keys.pop();
        Self(keys)
    }

    /// Address made of the first `len` segments.
    pub fn prefix(&self, len: usize) -> Self {
        Self(self.0.iter().take(len).cloned().collect())
    }

    /// The remainder of this address below `prefix`, if it starts with it.
    pub fn relative_to(&self, prefix: &Address) -> Option<Address> {
        self.0
            .starts_with(&prefix.0)
            .then(|| Self(self.0[prefix.len()..].iter().cloned().collect()))
    }
}

/// Append an optional key to an address.
pub fn address_with(address: &Address, key: Option<Key>) -> Address {
    address.with_optional(key)
}

impl Deref for Address {
    type Target = [Key];

    fn deref(&self) -> &[Key] {
        &self.0
    }
}

impl FromIterator<Key> for Address {
    fn from_iter<I: IntoIterator<Item = Key>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, key) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{key}")?;
        }
        f.write_str("]")
    }
}

/// Build an [`Address`] from a list of field names and indices.
///
/// ```ignore
/// let address = address!["children", 2, "label"];
/// ```
#[macro_export]
macro_rules! address {
    ($($key:expr),* $(,)?) => {
        $crate::tree::Address::from_keys([$($crate::tree::Key::from($key)),*])
    };
}

// =============================================================================
// Tree
// =============================================================================

/// Tagged component node: its own data plus a nested children tree.
pub struct Node<T> {
    pub data: T,
    pub children: Tree<T>,
}

/// Generic nested tree with reference-counted containers.
pub enum Tree<T> {
    Null,
    Leaf(T),
    Array(Shared<Vec<Tree<T>>>),
    Object(Shared<IndexMap<String, Tree<T>>>),
    Node(Shared<Node<T>>),
}

impl<T> Default for Tree<T> {
    fn default() -> Self {
        Tree::Null
    }
}

impl<T: Clone> Clone for Tree<T> {
    fn clone(&self) -> Self {
        match self {
            Tree::Null => Tree::Null,
            Tree::Leaf(value) => Tree::Leaf(value.clone()),
            Tree::Array(items) => Tree::Array(items.clone()),
            Tree::Object(map) => Tree::Object(map.clone()),
            Tree::Node(node) => Tree::Node(node.clone()),
        }
    }
}

impl<T> Tree<T> {
    pub fn array(items: impl IntoIterator<Item = Tree<T>>) -> Self {
        Tree::Array(shared(items.into_iter().collect()))
    }

    pub fn object<K: Into<String>>(entries: impl IntoIterator<Item = (K, Tree<T>)>) -> Self {
        Tree::Object(shared(
            entries.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        ))
    }

    pub fn empty_array() -> Self {
        Tree::Array(shared(Vec::new()))
    }

    pub fn empty_object() -> Self {
        Tree::Object(shared(IndexMap::new()))
    }

    pub fn node(data: T, children: Tree<T>) -> Self {
        Tree::Node(shared(Node { data, children }))
    }

    pub fn leaf(value: T) -> Self {
        Tree::Leaf(value)
    }

    /// Empty container suited to hold `key`.
    pub(crate) fn container_for(key: &Key) -> Self {
        match key {
            Key::Index(_) => Tree::empty_array(),
            Key::Field(_) => Tree::empty_object(),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Tree::Null)
    }

    /// Anything other than `Null` counts as present.
    pub fn is_present(&self) -> bool {
        !self.is_null()
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Tree::Array(_))
    }

    pub fn is_object(&self) -> bool {
        matches!(self, Tree::Object(_))
    }

    pub fn is_node(&self) -> bool {
        matches!(self, Tree::Node(_))
    }

    /// Number of entries in an array or object (0 otherwise).
    pub fn len(&self) -> usize {
        match self {
            Tree::Array(items) => items.borrow().len(),
            Tree::Object(map) => map.borrow().len(),
            _ => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether both trees are the same container (scalars and nulls never are).
    pub fn ptr_eq(a: &Tree<T>, b: &Tree<T>) -> bool {
        match (a, b) {
            (Tree::Array(x), Tree::Array(y)) => Rc::ptr_eq(x, y),
            (Tree::Object(x), Tree::Object(y)) => Rc::ptr_eq(x, y),
            (Tree::Node(x), Tree::Node(y)) => Rc::ptr_eq(x, y),
            _ => false,
        }
    }

    /// Field names of an object, in insertion order.
    pub fn keys(&self) -> Vec<String> {
        match self {
            Tree::Object(map) => map.borrow().keys().cloned().collect(),
            _ => Vec::new(),
        }
    }
}

impl<T: Clone> Tree<T> {
    /// Direct child of an array or object (no node transparency).
    pub fn child(&self, key: &Key) -> Option<Tree<T>> {
        match (self, key) {
            (Tree::Array(items), Key::Index(index)) => items.borrow().get(*index).cloned(),
            (Tree::Object(map), Key::Field(name)) => map.borrow().get(name).cloned(),
            _ => None,
        }
    }

    /// Array element or `Null`.
    pub fn at(&self, index: usize) -> Tree<T> {
        self.child(&Key::Index(index)).unwrap_or_default()
    }

    /// Object field or `Null`.
    pub fn field(&self, name: &str) -> Tree<T> {
        self.child(&Key::Field(name.to_string())).unwrap_or_default()
    }

    /// Array elements (cloned handles); empty for anything else.
    pub fn items(&self) -> Vec<Tree<T>> {
        match self {
            Tree::Array(items) => items.borrow().clone(),
            _ => Vec::new(),
        }
    }

    /// Object entries (cloned handles); empty for anything else.
    pub fn entries(&self) -> Vec<(String, Tree<T>)> {
        match self {
            Tree::Object(map) => map
                .borrow()
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Data of a tagged node.
    pub fn node_data(&self) -> Option<T> {
        match self {
            Tree::Node(node) => Some(node.borrow().data.clone()),
            _ => None,
        }
    }

    /// Replace the data of a tagged node in place. No-op on other variants.
    pub(crate) fn set_node_data(&self, data: T) {
        if let Tree::Node(node) = self {
            node.borrow_mut().data = data;
        }
    }

    /// Children of a tagged node.
    pub fn node_children(&self) -> Option<Tree<T>> {
        match self {
            Tree::Node(node) => Some(node.borrow().children.clone()),
            _ => None,
        }
    }

    /// First layer of tagged nodes reachable through plain containers, with
    /// their addresses relative to `self`. Nodes are not descended into.
    pub fn child_nodes(&self) -> Vec<(Address, Tree<T>)> {
        fn walk<T: Clone>(tree: &Tree<T>, address: &Address, out: &mut Vec<(Address, Tree<T>)>) {
            match tree {
                Tree::Node(_) => out.push((address.clone(), tree.clone())),
                Tree::Array(items) => {
                    for (index, item) in items.borrow().iter().enumerate() {
                        walk(item, &address.with(index), out);
                    }
                }
                Tree::Object(map) => {
                    for (key, item) in map.borrow().iter() {
                        walk(item, &address.with(key.as_str()), out);
                    }
                }
                Tree::Null | Tree::Leaf(_) => {}
            }
        }

        let mut out = Vec::new();
        match self {
            Tree::Node(node) => walk(&node.borrow().children, &Address::root(), &mut out),
            _ => walk(self, &Address::root(), &mut out),
        }
        out
    }

    /// Shallow copy of an object with one field replaced (or added).
    ///
    /// Non-objects are treated as an empty object.
    pub fn with_field(&self, name: &str, value: Tree<T>) -> Tree<T> {
        let mut map = match self {
            Tree::Object(map) => map.borrow().clone(),
            _ => IndexMap::new(),
        };
        map.insert(name.to_string(), value);
        Tree::Object(shared(map))
    }
}

impl<T: PartialEq> PartialEq for Tree<T> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Tree::Null, Tree::Null) => true,
            (Tree::Leaf(a), Tree::Leaf(b)) => a == b,
            (Tree::Array(a), Tree::Array(b)) => Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow(),
            (Tree::Object(a), Tree::Object(b)) => {
                if Rc::ptr_eq(a, b) {
                    return true;
                }
                let (a, b) = (a.borrow(), b.borrow());
                a.len() == b.len() && a.iter().all(|(k, v)| b.get(k) == Some(v))
            }
            (Tree::Node(a), Tree::Node(b)) => {
                if Rc::ptr_eq(a, b) {
                    return true;
                }
                let (a, b) = (a.borrow(), b.borrow());
                a.data == b.data && a.children == b.children
            }
            _ => false,
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Tree<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tree::Null => f.write_str("null"),
            Tree::Leaf(value) => value.fmt(f),
            Tree::Array(items) => f.debug_list().entries(items.borrow().iter()).finish(),
            Tree::Object(map) => f.debug_map().entries(map.borrow().iter()).finish(),
            Tree::Node(node) => {
                let node = node.borrow();
                f.debug_struct("Node")
                    .field("data", &node.data)
                    .field("children", &node.children)
                    .finish()
            }
        }
    }
}

impl<T: Serialize> Serialize for Tree<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Tree::Null => serializer.serialize_unit(),
            Tree::Leaf(value) => value.serialize(serializer),
            Tree::Array(items) => {
                let items = items.borrow();
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items.iter() {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Tree::Object(map) => {
                let map = map.borrow();
                let mut out = serializer.serialize_map(Some(map.len()))?;
                for (key, value) in map.iter() {
                    out.serialize_entry(key, value)?;
                }
                out.end()
            }
            Tree::Node(node) => {
                let node = node.borrow();
                let mut out = serializer.serialize_struct("Node", 2)?;
                out.serialize_field("data", &node.data)?;
                out.serialize_field("children", &node.children)?;
                out.end()
            }
        }
    }
}

// =============================================================================
// State values
// =============================================================================

/// Plain scalar stored at the leaves of application state.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(Rc<str>),
}

/// Application state tree.
pub type Value = Tree<Scalar>;

impl Value {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Tree::Leaf(Scalar::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Tree::Leaf(Scalar::Int(n)) => Some(*n),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Tree::Leaf(Scalar::Int(n)) => Some(*n as f64),
            Tree::Leaf(Scalar::Float(n)) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Tree::Leaf(Scalar::String(s)) => Some(s),
            _ => None,
        }
    }

    /// Convert to a `serde_json::Value` for display.
    ///
    /// Lossy: non-finite floats become null, and a value that fails to
    /// serialize comes back as null as a whole.
    pub fn to_json(&self) -> serde_json::Value {
        let json = serde_json::to_value(self);
        debug_assert!(json.is_ok(), "state values always serialize");
        json.unwrap_or_default()
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        use serde_json::Value as Json;
        match json {
            Json::Null => Tree::Null,
            Json::Bool(b) => Tree::Leaf(Scalar::Bool(b)),
            Json::Number(n) => match n.as_i64() {
                Some(i) => Tree::Leaf(Scalar::Int(i)),
                None => Tree::Leaf(Scalar::Float(n.as_f64().unwrap_or(f64::NAN))),
            },
            Json::String(s) => Tree::Leaf(Scalar::String(s.into())),
            Json::Array(items) => Tree::array(items.into_iter().map(Value::from)),
            Json::Object(map) => Tree::object(map.into_iter().map(|(k, v)| (k, Value::from(v)))),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Tree::Leaf(Scalar::Bool(b))
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Tree::Leaf(Scalar::Int(n))
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Tree::Leaf(Scalar::Int(n.into()))
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Tree::Leaf(Scalar::Float(n))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Tree::Leaf(Scalar::String(s.into()))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Tree::Leaf(Scalar::String(s.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_address_with_appends_key() {
        let address = address!["a", 1];
        assert_eq!(address_with(&address, Some("b".into())), address!["a", 1, "b"]);
    }

    #[test]
    fn test_address_with_none_returns_same_address() {
        let address = address!["a", 1];
        assert_eq!(address_with(&address, None), address);
    }

    #[test]
    fn test_address_equality() {
        assert_eq!(address![1, 2], address![1, 2]);
        assert_ne!(address![1, 2], address![1, 3]);
        assert_ne!(address![1, 2], address![1, 2, 3]);
    }

    #[test]
    fn test_address_relative_to() {
        let address = address!["child", 0, "a"];
        assert_eq!(address.relative_to(&address!["child"]), Some(address![0, "a"]));
        assert_eq!(address.relative_to(&address!["other"]), None);
        assert_eq!(address.parent(), address!["child", 0]);
    }

    #[test]
    fn test_address_deserializes_from_json() {
        let address: Address = serde_json::from_value(json!(["children", 2, "label"])).unwrap();
        assert_eq!(address, address!["children", 2, "label"]);
        assert_eq!(address.to_string(), "[children, 2, label]");
    }

    #[test]
    fn test_value_json_conversion() {
        let value = Value::from(json!({ "a": [1, 2.5, "x", true, null] }));
        assert_eq!(value.field("a").at(0).as_i64(), Some(1));
        assert_eq!(value.field("a").at(1).as_f64(), Some(2.5));
        assert_eq!(value.field("a").at(2).as_str(), Some("x"));
        assert_eq!(value.field("a").at(3).as_bool(), Some(true));
        assert!(value.field("a").at(4).is_null());
        assert_eq!(value.to_json(), json!({ "a": [1, 2.5, "x", true, null] }));
    }

    #[test]
    fn test_object_equality_ignores_order() {
        let a = Value::from(json!({ "x": 1, "y": 2 }));
        let b = Tree::object([("y", Value::from(2)), ("x", Value::from(1))]);
        assert_eq!(a, b);
        assert!(!Tree::ptr_eq(&a, &b));
        assert!(Tree::ptr_eq(&a, &a.clone()));
    }

    #[test]
    fn test_with_field_is_shallow_copy() {
        let state = Value::from(json!({ "val": 1, "nested": { "k": 0 } }));
        let next = state.with_field("val", Value::from(2));
        assert_eq!(state.field("val").as_i64(), Some(1));
        assert_eq!(next.field("val").as_i64(), Some(2));
        assert!(Tree::ptr_eq(&state.field("nested"), &next.field("nested")));
    }

    #[test]
    fn test_node_accessors() {
        let node: Tree<i32> = Tree::node(3, Tree::array([Tree::leaf(1)]));
        assert_eq!(node.node_data(), Some(3));
        assert_eq!(node.node_children().map(|c| c.len()), Some(1));
        assert_eq!(Tree::<i32>::Null.node_data(), None);
    }
}
