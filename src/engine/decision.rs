//! The vocabulary callbacks use to steer a traversal.
//!
//! Every callback returns exactly one [`Decision`]. The directive says what happens
//! to the current node; the optional modifiers attach further callbacks to it:
//!
//! | Directive   | Effect                                                            |
//! |-------------|-------------------------------------------------------------------|
//! | `proceed`   | descend into the node's fields (the default)                      |
//! | `skip`      | treat the node as a leaf                                          |
//! | `halt`      | stop descending anywhere; pending post callbacks still run        |
//! | `error`     | abort the walk with the given error; nothing else runs            |
//! | `replace`   | substitute the node; its ancestors are rebuilt, never mutated     |
//! | `actions`   | visit the listed children / run the listed calls, in that order   |
//!
//! | Modifier    | Effect                                                            |
//! |-------------|-------------------------------------------------------------------|
//! | `intercept` | called before each struct below this node, until overridden      |
//! | `post`      | called once the node's children are done, with the final value    |

use std::any::Any;
use std::fmt;

use super::descriptor::{Descriptor, TypeId};

/// Callback signature shared by the root visitor, intercepts and post callbacks.
pub type WalkFn<'a> = dyn for<'n> Fn(Node<'n>) -> Decision<'a> + 'a;

/// Side-effect unit of an explicit action list.
pub type CallFn<'a> = Box<dyn FnOnce() -> anyhow::Result<()> + 'a>;

/// The struct value a callback is invoked on.
#[derive(Clone, Copy)]
pub struct Node<'n> {
    desc: &'n Descriptor,
    value: &'n dyn Any,
}

impl<'n> Node<'n> {
    pub(crate) fn new(desc: &'n Descriptor, value: &'n dyn Any) -> Self {
        Self { desc, value }
    }

    pub fn type_id(&self) -> TypeId {
        self.desc.id()
    }

    /// Declared name of the node's type.
    pub fn name(&self) -> &'static str {
        self.desc.name()
    }

    pub fn value(&self) -> &'n dyn Any {
        self.value
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&'n T> {
        self.value.downcast_ref::<T>()
    }

    pub fn is<T: Any>(&self) -> bool {
        self.value.is::<T>()
    }

    /// Address of the visited value; equal addresses mean the same value.
    pub fn addr(&self) -> *const () {
        self.value as *const dyn Any as *const ()
    }
}

impl fmt::Debug for Node<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("type_id", &self.type_id())
            .field("name", &self.name())
            .field("addr", &self.addr())
            .finish()
    }
}

/// One unit of an explicit action list.
pub enum Action<'a> {
    /// Visit traversable child `index` (field `index` of the current struct).
    Visit(usize),
    /// Run a side effect that has no value of its own.
    Call(CallFn<'a>),
}

impl<'a> Action<'a> {
    pub fn visit(index: usize) -> Self {
        Action::Visit(index)
    }

    pub fn call(f: impl FnOnce() -> anyhow::Result<()> + 'a) -> Self {
        Action::Call(Box::new(f))
    }
}

impl fmt::Debug for Action<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Visit(index) => write!(f, "Visit({index})"),
            Action::Call(_) => write!(f, "Call(..)"),
        }
    }
}

pub(crate) enum Directive<'a> {
    Continue,
    Skip,
    Halt,
    Error(anyhow::Error),
    Replace(TypeId, Box<dyn Any>),
    Actions(Vec<Action<'a>>),
}

/// A callback's directive for the node it was handed.
pub struct Decision<'a> {
    pub(crate) directive: Directive<'a>,
    pub(crate) intercept: Option<&'a WalkFn<'a>>,
    pub(crate) post: Option<&'a WalkFn<'a>>,
}

impl<'a> Decision<'a> {
    fn with(directive: Directive<'a>) -> Self {
        Self {
            directive,
            intercept: None,
            post: None,
        }
    }

    /// Continue: descend into the node normally.
    pub fn proceed() -> Self {
        Self::with(Directive::Continue)
    }

    /// Do not visit the node's children.
    pub fn skip() -> Self {
        Self::with(Directive::Skip)
    }

    /// End the walk early. Post callbacks already registered on the path back to
    /// the root still run, and the partial result is returned without error.
    pub fn halt() -> Self {
        Self::with(Directive::Halt)
    }

    /// Abort the walk. The error is returned from the walk as
    /// [`WalkError::Aborted`](super::WalkError::Aborted); post callbacks do not run.
    pub fn error(err: impl Into<anyhow::Error>) -> Self {
        Self::with(Directive::Error(err.into()))
    }

    /// Replace the current node with `value`, described by `type_id`.
    ///
    /// The replacement's children are not visited, and every ancestor is cloned.
    pub fn replace<T: Any>(type_id: TypeId, value: T) -> Self {
        Self::with(Directive::Replace(type_id, Box::new(value)))
    }

    /// Visit exactly the given actions instead of the node's fields.
    /// An empty list behaves like [`Decision::skip`].
    pub fn actions(actions: Vec<Action<'a>>) -> Self {
        if actions.is_empty() {
            return Self::skip();
        }
        Self::with(Directive::Actions(actions))
    }

    /// Call `f` before descending into each struct below this node.
    pub fn intercept(mut self, f: &'a WalkFn<'a>) -> Self {
        self.intercept = Some(f);
        self
    }

    /// Call `f` after this node's children have been visited.
    pub fn post(mut self, f: &'a WalkFn<'a>) -> Self {
        self.post = Some(f);
        self
    }

    pub fn is_continue(&self) -> bool {
        matches!(self.directive, Directive::Continue)
    }
}

impl Default for Decision<'_> {
    fn default() -> Self {
        Self::proceed()
    }
}

impl fmt::Debug for Decision<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let directive = match &self.directive {
            Directive::Continue => "continue".to_string(),
            Directive::Skip => "skip".to_string(),
            Directive::Halt => "halt".to_string(),
            Directive::Error(err) => format!("error({err})"),
            Directive::Replace(id, _) => format!("replace({id})"),
            Directive::Actions(actions) => format!("actions({actions:?})"),
        };
        f.debug_struct("Decision")
            .field("directive", &directive)
            .field("intercept", &self.intercept.is_some())
            .field("post", &self.post.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_continue() {
        assert!(Decision::default().is_continue());
        assert!(Decision::proceed().is_continue());
        assert!(!Decision::skip().is_continue());
    }

    #[test]
    fn test_empty_actions_skip() {
        let d = Decision::actions(Vec::new());
        assert!(matches!(d.directive, Directive::Skip));
    }

    #[test]
    fn test_modifiers_attach() {
        let post = |_: Node<'_>| Decision::proceed();
        let d = Decision::skip().post(&post).intercept(&post);
        assert!(d.post.is_some());
        assert!(d.intercept.is_some());
        assert_eq!(
            format!("{d:?}"),
            r#"Decision { directive: "skip", intercept: true, post: true }"#
        );
    }

    #[test]
    fn test_action_debug() {
        let actions = vec![Action::visit(2), Action::call(|| Ok(()))];
        assert_eq!(format!("{actions:?}"), "[Visit(2), Call(..)]");
    }
}
