//! Generic traversal engine for typed object graphs.
//!
//! An [`Engine`] is built once from a table of [`Descriptor`]s and can then walk
//! any value those descriptors cover. A walk visits every reachable struct, calls
//! back into user code at each one, and rebuilds the minimal set of ancestors
//! when the callback replaces something. Untouched subtrees are shared with the
//! input, never copied.
//!
//! ```ignore
//! let engine = Engine::new(descriptors)?;
//! let visit = |node: Node<'_>| {
//!     if let Some(leaf) = node.downcast_ref::<Leaf>() {
//!         return Decision::replace(LEAF, Leaf { value: leaf.value + 1 });
//!     }
//!     Decision::proceed()
//! };
//! let walked = engine.walk(ROOT, &root, &visit)?;
//! let root: Root = walked.into_value().unwrap();
//! ```

pub mod accessor;
pub mod decision;
pub mod descriptor;
pub mod error;
pub mod stack;
pub mod stringify;
pub mod table;
pub mod walk;

use std::any::Any;

use tracing::debug;

pub use accessor::Abstract;
pub use decision::{Action, CallFn, Decision, Node, WalkFn};
pub use descriptor::{Descriptor, Field, Handle, Kind, Mismatch, PointerLike, StructBuilder, TypeId};
pub use error::{DescriptorError, WalkError};
pub use stringify::TypeName;
pub use table::DescriptorTable;
pub use walk::Walked;

use crate::config::EngineConfig;

/// A linked descriptor table plus the settings every walk runs under.
///
/// Immutable once built and shareable across threads.
#[derive(Debug, Clone)]
pub struct Engine {
    table: DescriptorTable,
    config: EngineConfig,
}

impl Engine {
    /// Builds an engine with the default configuration.
    pub fn new(descriptors: impl IntoIterator<Item = Descriptor>) -> Result<Self, DescriptorError> {
        Self::with_config(descriptors, EngineConfig::default())
    }

    pub fn with_config(
        descriptors: impl IntoIterator<Item = Descriptor>,
        config: EngineConfig,
    ) -> Result<Self, DescriptorError> {
        let table = DescriptorTable::new(descriptors)?;
        debug!("Engine ready: {} descriptors, max depth {}", table.len(), config.max_depth);
        Ok(Self { table, config })
    }

    pub fn table(&self) -> &DescriptorTable {
        &self.table
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn descriptor(&self, id: TypeId) -> Option<&Descriptor> {
        self.table.get(id)
    }

    /// Walks `root`, a value of type `root_type`, calling `callback` at every struct.
    ///
    /// A replacement of the root itself must be assignable to `assignable_to`.
    /// Returns the original value (borrowed) if nothing was replaced, otherwise a
    /// rebuilt root that shares every untouched subtree with `root`.
    ///
    /// # Errors
    /// * [`WalkError::Aborted`] - a callback or action returned an error
    /// * [`WalkError::UnknownType`] - an id with no descriptor was used
    /// * [`WalkError::NotAssignable`] - a replacement does not fit its slot
    /// * [`WalkError::NoSuchChild`] - an action named a field that does not exist
    /// * [`WalkError::TypeMismatch`] - the descriptors disagree with the values
    /// * [`WalkError::DepthExceeded`] - the graph is deeper than the configured limit
    pub fn execute<'a>(
        &'a self,
        callback: &'a WalkFn<'a>,
        root_type: TypeId,
        root: &'a dyn Any,
        assignable_to: TypeId,
    ) -> Result<Walked<'a>, WalkError> {
        let desc = self.table.get(root_type).ok_or(WalkError::UnknownType(root_type))?;
        let assignable = self
            .table
            .get(assignable_to)
            .ok_or(WalkError::UnknownType(assignable_to))?;
        walk::Walk::new(&self.table, self.config.max_depth, callback).run(desc, root, assignable)
    }

    /// Typed entry point: walks `root` with any root replacement limited to
    /// `root_type` itself.
    pub fn walk<'a, T: Any>(
        &'a self,
        root_type: TypeId,
        root: &'a T,
        callback: &'a WalkFn<'a>,
    ) -> Result<Walked<'a>, WalkError> {
        self.execute(callback, root_type, root, root_type)
    }

    /// A read-only accessor around `value`, or `None` if there is no value.
    pub fn abstract_node<'e>(
        &'e self,
        type_id: TypeId,
        value: Option<&'e dyn Any>,
    ) -> Result<Option<Abstract<'e>>, WalkError> {
        let desc = self.table.get(type_id).ok_or(WalkError::UnknownType(type_id))?;
        Ok(value.map(|value| Abstract::new(&self.table, desc, value)))
    }

    /// Debug rendering of a type, e.g. `*[]*Leaf`. See [`TypeName`].
    pub fn stringify(&self, id: TypeId) -> String {
        stringify::render(&self.table, id)
    }

    /// Allocation-free [`Engine::stringify`], for log lines.
    pub fn type_name(&self, id: TypeId) -> TypeName<'_> {
        TypeName::new(&self.table, id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[derive(Clone, Debug, PartialEq)]
    struct Leaf {
        value: i64,
    }

    #[derive(Clone, Debug)]
    struct Root {
        left: Option<Arc<Leaf>>,
        right: Option<Arc<Leaf>>,
        tag: &'static str,
    }

    const ROOT: TypeId = TypeId(1);
    const LEAF: TypeId = TypeId(2);
    const LEAF_PTR: TypeId = TypeId(3);

    fn engine() -> Engine {
        let _ = crate::logging::init_logger(false, Some("debug"));
        Engine::new(vec![
            Descriptor::structure::<Root>(ROOT, "Root")
                .field("left", LEAF_PTR, |r| &r.left, |r, v| r.left = v)
                .field("right", LEAF_PTR, |r| &r.right, |r, v| r.right = v)
                .build(),
            Descriptor::structure::<Leaf>(LEAF, "Leaf").build(),
            Descriptor::pointer::<Option<Arc<Leaf>>>(LEAF_PTR, LEAF),
        ])
        .unwrap()
    }

    #[test]
    fn test_unknown_root_type() {
        let engine = engine();
        let root = Leaf { value: 1 };
        let visit = |_: Node<'_>| Decision::proceed();
        let err = engine.walk(TypeId(9), &root, &visit).unwrap_err();
        assert!(matches!(err, WalkError::UnknownType(TypeId(9))));
        assert!(engine.abstract_node(TypeId(9), None).is_err());
    }

    #[test]
    fn test_replace_one_leaf() {
        let engine = engine();
        let right = Arc::new(Leaf { value: 2 });
        let root = Root {
            left: Some(Arc::new(Leaf { value: 1 })),
            right: Some(right.clone()),
            tag: "kept",
        };
        let visit = |node: Node<'_>| match node.downcast_ref::<Leaf>() {
            Some(leaf) if leaf.value == 1 => Decision::replace(LEAF, Leaf { value: 10 }),
            _ => Decision::proceed(),
        };

        let walked = engine.walk(ROOT, &root, &visit).unwrap();
        assert!(walked.changed());
        assert_eq!(walked.type_id(), ROOT);
        let out: Root = walked.into_value().unwrap();
        assert_eq!(out.left.as_deref(), Some(&Leaf { value: 10 }));
        assert!(Arc::ptr_eq(out.right.as_ref().unwrap(), &right));
        assert_eq!(out.tag, "kept");
    }

    #[test]
    fn test_unchanged_walk_borrows_root() {
        let engine = engine();
        let root = Root { left: None, right: None, tag: "t" };
        let visit = |_: Node<'_>| Decision::proceed();
        let walked = engine.walk(ROOT, &root, &visit).unwrap();
        assert!(!walked.changed());
        let Handle::Borrowed(value) = walked.into_handle() else {
            panic!("expected the original root");
        };
        assert!(std::ptr::addr_eq(value as *const dyn Any, &root as *const Root));
    }

    #[test]
    fn test_stringify_through_engine() {
        let engine = engine();
        assert_eq!(engine.stringify(LEAF_PTR), "*Leaf");
        assert_eq!(engine.type_name(ROOT).to_string(), "Root");
        assert_eq!(engine.stringify(TypeId::NONE), "<NIL>");
    }
}
