use std::any::Any;
use std::fmt;

use super::descriptor::{Descriptor, Shape, TypeId};
use super::table::DescriptorTable;

/// Read-only, type-erased view of a visitable value.
///
/// Lets code inspect an arbitrary node's children without knowing its Rust type,
/// e.g. to print a graph generically. Any descriptor/value disagreement surfaces
/// as a missing child rather than an error.
#[derive(Clone, Copy)]
pub struct Abstract<'e> {
    table: &'e DescriptorTable,
    desc: &'e Descriptor,
    value: &'e dyn Any,
}

impl<'e> Abstract<'e> {
    pub(crate) fn new(table: &'e DescriptorTable, desc: &'e Descriptor, value: &'e dyn Any) -> Self {
        Self { table, desc, value }
    }

    pub fn type_id(&self) -> TypeId {
        self.desc.id()
    }

    /// Declared name; empty for pointers and slices.
    pub fn name(&self) -> &'static str {
        self.desc.name()
    }

    pub fn value(&self) -> &'e dyn Any {
        self.value
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&'e T> {
        self.value.downcast_ref::<T>()
    }

    /// Number of children: field count for a struct, length for a slice, and
    /// one for a pointer or union (even when it is empty).
    pub fn num_children(&self) -> usize {
        match &self.desc.shape {
            Shape::Struct { fields } => fields.len(),
            Shape::Slice { len, .. } => len(self.value).unwrap_or(0),
            Shape::Pointer { .. } | Shape::TaggedUnion { .. } => 1,
        }
    }

    /// The `index`th child, or `None` if out of range or null.
    pub fn child_at(&self, index: usize) -> Option<Abstract<'e>> {
        let table = self.table;
        match &self.desc.shape {
            Shape::Struct { fields } => {
                let field = fields.get(index)?;
                let value = (field.get)(self.value).ok()?;
                Some(Abstract::new(table, table.linked(field.target.link), value))
            }
            Shape::Pointer { elem, deref, .. } => {
                if index != 0 {
                    return None;
                }
                let value = deref(self.value).ok()??;
                Some(Abstract::new(table, table.linked(elem.link), value))
            }
            Shape::Slice { elem, index: at, .. } => {
                let value = at(self.value, index).ok()??;
                Some(Abstract::new(table, table.linked(elem.link), value))
            }
            Shape::TaggedUnion { inspect, .. } => {
                if index != 0 {
                    return None;
                }
                let (id, value) = inspect(self.value).ok()??;
                Some(Abstract::new(table, table.get(id)?, value))
            }
        }
    }

    pub fn children(&self) -> impl Iterator<Item = Abstract<'e>> + '_ {
        (0..self.num_children()).filter_map(|i| self.child_at(i))
    }
}

impl fmt::Debug for Abstract<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Abstract")
            .field("type", &super::stringify::TypeName::new(self.table, self.desc.id()))
            .field("children", &self.num_children())
            .finish()
    }
}
