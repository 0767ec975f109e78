//! Renderer boundary and the per-node render step.

use std::cell::RefCell;

use indexmap::IndexMap;

use super::HookArgs;
use super::bindings::{Bindings, Mount, Rendered, View, process_bindings};
use crate::diff::DiffTag;
use crate::error::Result;
use crate::model::Component;
use crate::tree::Address;

/// Output collaborator: turns views into concrete output at a mount.
pub trait Renderer {
    /// Render `view` into `mount` and report the child mounts it created.
    fn render(&mut self, mount: &Mount, view: &View) -> Result<Bindings>;

    /// Remove whatever was rendered into `mount`.
    fn remove(&mut self, _mount: &Mount) {}
}

/// Renders nothing and creates no bindings.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullRenderer;

impl Renderer for NullRenderer {
    fn render(&mut self, _mount: &Mount, _view: &View) -> Result<Bindings> {
        Ok(Bindings::new())
    }
}

/// Result of [`update_el`].
#[derive(Debug, Default)]
pub struct UpdateElOutput {
    /// Child mounts by binding key; `None` when nothing was rendered.
    pub render_result: Option<IndexMap<String, Mount>>,
    /// Mount the node is rendered into.
    pub last_rendered: Option<Mount>,
}

/// Run the lifecycle and render step of one component node.
///
/// - DESTROY: `will_unmount`, nothing rendered
/// - none: nothing rendered, `should_update` is not consulted
/// - UPDATE vetoed by `should_update`: nothing rendered
/// - CREATE: `will_mount` then render
/// - UPDATE: `will_update` then render
pub fn update_el(
    address: &Address,
    component: &Component,
    tag: Option<DiffTag>,
    args: &HookArgs,
    renderer: &RefCell<Box<dyn Renderer>>,
) -> Result<UpdateElOutput> {
    let lifecycle = component.lifecycle();
    let skipped = UpdateElOutput {
        render_result: None,
        last_rendered: args.mount.clone(),
    };

    match tag {
        Some(DiffTag::Destroy) => {
            if let Some(hook) = &lifecycle.will_unmount {
                hook(args)?;
            }
            return Ok(UpdateElOutput::default());
        }
        None => return Ok(skipped),
        Some(DiffTag::Update) if !component.should_update(&args.state, &args.last_state) => {
            tracing::debug!(%address, component = component.display_name(), "update vetoed");
            return Ok(skipped);
        }
        Some(DiffTag::Create) => {
            if let Some(hook) = &lifecycle.will_mount {
                hook(args)?;
            }
        }
        Some(DiffTag::Update) => {
            if let Some(hook) = &lifecycle.will_update {
                hook(args)?;
            }
        }
    }

    let rendered = match component.render_fn() {
        Some(render) => render(args)?,
        None => Rendered::Nothing,
    };
    let bindings = match rendered {
        Rendered::Nothing => Bindings::new(),
        Rendered::Bindings(bindings) => bindings,
        Rendered::View(view) => match &args.mount {
            Some(mount) => renderer.borrow_mut().render(mount, &view)?,
            None => Bindings::new(),
        },
    };

    Ok(UpdateElOutput {
        render_result: Some(process_bindings(&bindings, component.model(), &args.state)),
        last_rendered: args.mount.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Model;
    use crate::runtime::StateCallers;
    use crate::tree::Value;
    use serde_json::json;
    use std::rc::Rc;

    fn renderer() -> RefCell<Box<dyn Renderer>> {
        RefCell::new(Box::new(NullRenderer))
    }

    fn args(component: &Rc<Component>, state: Value, mount: Option<Mount>) -> HookArgs {
        HookArgs {
            state,
            last_state: Value::Null,
            mount,
            callers: StateCallers::detached(component),
        }
    }

    fn binding_child(key: &'static str) -> Rc<Component> {
        let def = Component::builder("Def").build().unwrap();
        Component::builder("C")
            .model(Model::object([("c", Model::component(&def))]))
            .render(move |args| {
                let mount = args.mount.clone().unwrap_or_else(|| Mount::new(()));
                Ok(Rendered::Bindings(Bindings::new().bind(key, mount)))
            })
            .build()
            .unwrap()
    }

    #[test]
    fn test_destroy_returns_nothing() {
        let def = Component::builder("Def").build().unwrap();
        let el1 = Mount::new("EL1");
        let out = update_el(
            &Address::root(),
            &def,
            Some(DiffTag::Destroy),
            &args(&def, Value::empty_object(), Some(el1)),
            &renderer(),
        )
        .unwrap();
        assert!(out.render_result.is_none());
    }

    #[test]
    fn test_update_returns_binding() {
        let component = binding_child("c");
        let el1 = Mount::new("EL1");
        let state = Value::from(json!({ "c": {} }));
        let out = update_el(
            &Address::root(),
            &component,
            Some(DiffTag::Update),
            &args(&component, state, Some(el1.clone())),
            &renderer(),
        )
        .unwrap();
        let result = out.render_result.unwrap();
        assert_eq!(result.get("c"), Some(&el1));
    }

    #[test]
    fn test_create_returns_binding() {
        let component = binding_child("c");
        let el1 = Mount::new("EL1");
        let state = Value::from(json!({ "c": {} }));
        let out = update_el(
            &Address::root(),
            &component,
            Some(DiffTag::Create),
            &args(&component, state, Some(el1.clone())),
            &renderer(),
        )
        .unwrap();
        assert_eq!(out.render_result.unwrap().get("c"), Some(&el1));
    }

    #[test]
    fn test_updates_with_new_mount() {
        let component = binding_child("a");
        let el2 = Mount::new("EL2");
        let out = update_el(
            &Address::root(),
            &component,
            Some(DiffTag::Update),
            &args(&component, Value::from(json!({ "c": {} })), Some(el2.clone())),
            &renderer(),
        )
        .unwrap();
        assert_eq!(out.render_result.unwrap().get("a"), Some(&el2));
        assert_eq!(out.last_rendered, Some(el2));
    }

    #[test]
    fn test_none_tag_does_not_call_should_update() {
        let component = Component::builder("C")
            .render(|_| panic!("render must not run"))
            .should_update(|_, _| panic!("should_update must not run"))
            .build()
            .unwrap();
        let el1 = Mount::new("EL1");
        let out = update_el(
            &Address::root(),
            &component,
            None,
            &args(&component, Value::from(json!({ "c": {} })), Some(el1.clone())),
            &renderer(),
        )
        .unwrap();
        assert!(out.render_result.is_none());
        assert_eq!(out.last_rendered, Some(el1));
    }

    #[test]
    fn test_should_update_vetoes_render() {
        let component = Component::builder("C")
            .render(|_| panic!("render must not run"))
            .should_update(|_, _| false)
            .build()
            .unwrap();
        let out = update_el(
            &Address::root(),
            &component,
            Some(DiffTag::Update),
            &args(&component, Value::empty_object(), None),
            &renderer(),
        )
        .unwrap();
        assert!(out.render_result.is_none());
    }

    #[test]
    fn test_view_goes_through_renderer() {
        struct Recording(Rc<RefCell<Vec<String>>>, Mount);

        impl Renderer for Recording {
            fn render(&mut self, _mount: &Mount, view: &View) -> Result<Bindings> {
                self.0.borrow_mut().push(view.downcast_ref::<&str>().copied().unwrap_or("?").to_string());
                Ok(Bindings::new().bind("c", self.1.clone()))
            }
        }

        let seen = Rc::new(RefCell::new(Vec::new()));
        let child_mount = Mount::new("child");
        let renderer: RefCell<Box<dyn Renderer>> =
            RefCell::new(Box::new(Recording(seen.clone(), child_mount.clone())));
        let component = Component::builder("C")
            .render(|_| Ok(Rendered::View(View::new("<div/>"))))
            .build()
            .unwrap();

        let out = update_el(
            &Address::root(),
            &component,
            Some(DiffTag::Create),
            &args(&component, Value::empty_object(), Some(Mount::new("root"))),
            &renderer,
        )
        .unwrap();
        assert_eq!(*seen.borrow(), vec!["<div/>".to_string()]);
        assert_eq!(out.render_result.unwrap().get("c"), Some(&child_mount));
    }
}
