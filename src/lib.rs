//! # spark-model
//!
//! Declarative component runtime built on
//! [spark-signals](https://github.com/RLabs-Inc/spark-signals).
//!
//! ## Architecture
//!
//! An application is a static [`Model`] of components and one immutable
//! state tree. Every state change runs one cycle:
//!
//! ```text
//! set_state → check_state → diff_with_model_min → merge_signals → render
//! ```
//!
//! The diff tags each component boundary as CREATE, UPDATE, DESTROY or
//! unchanged. The signal merge keeps one stable set of signal channels per
//! live component, wiring parents to children on creation and unwiring on
//! destruction. The render pass walks the diff, running lifecycle hooks and
//! handing views to a pluggable [`Renderer`].
//!
//! ## Modules
//!
//! - [`tree`] - Generic trees, addresses and the addressed tree store
//! - [`model`] - Model nodes, component declarations and shape checks
//! - [`diff`] - Model-driven minimal diff
//! - [`signal`] - Signal channels and the signal-tree merge
//! - [`runtime`] - State callers, render pass and the `run` entry point
//! - [`tagged`] - Type-tagged dynamic values

pub mod diff;
pub mod error;
pub mod model;
pub mod runtime;
pub mod signal;
pub mod tagged;
pub mod tree;

pub use error::{Error, Result};

pub use tree::{Address, Key, Mode, Scalar, Tree, TreeStore, Value};

pub use model::{Component, ComponentBuilder, Model, array_of, check_state, object_of};

pub use diff::{Changes, DiffTag, DiffTree, diff_with_model_min};

pub use signal::{SignalChannel, SignalTree, merge_signals};

pub use runtime::{
    Bindings, HookArgs, Mount, NullRenderer, Rendered, Renderer, RunOptions, Runtime, StateCallers,
    View, run,
};
