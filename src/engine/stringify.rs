use std::fmt;

use super::descriptor::{Shape, TypeId};
use super::table::DescriptorTable;

/// Renders a type id the way it would be spelled in a declaration: `*` per pointer
/// level and `[]` per slice level, followed by the struct or union name.
///
/// Borrowed from a table, so it can be dropped into log lines without building a
/// `String` unless the line is actually emitted.
#[derive(Clone, Copy)]
pub struct TypeName<'t> {
    table: &'t DescriptorTable,
    id: TypeId,
}

impl<'t> TypeName<'t> {
    pub(crate) fn new(table: &'t DescriptorTable, id: TypeId) -> Self {
        Self { table, id }
    }
}

impl fmt::Display for TypeName<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.id.is_none() {
            return f.write_str("<NIL>");
        }
        let mut id = self.id;
        loop {
            let Some(desc) = self.table.get(id) else {
                return write!(f, "<UNKNOWN:{id}>");
            };
            match &desc.shape {
                Shape::Struct { .. } | Shape::TaggedUnion { .. } => return f.write_str(desc.name()),
                Shape::Pointer { elem, .. } => {
                    f.write_str("*")?;
                    id = elem.id;
                }
                Shape::Slice { elem, .. } => {
                    f.write_str("[]")?;
                    id = elem.id;
                }
            }
        }
    }
}

impl fmt::Debug for TypeName<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

pub(crate) fn render(table: &DescriptorTable, id: TypeId) -> String {
    TypeName::new(table, id).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::descriptor::Descriptor;
    use std::sync::Arc;

    #[derive(Clone)]
    struct Item;

    #[derive(Clone)]
    enum Figure {
        Item(Arc<Item>),
    }

    fn table() -> DescriptorTable {
        DescriptorTable::new(vec![
            Descriptor::structure::<Item>(TypeId(1), "Item").build(),
            Descriptor::pointer::<Option<Arc<Item>>>(TypeId(2), TypeId(1)),
            Descriptor::slice::<Option<Arc<Item>>>(TypeId(3), TypeId(2)),
            Descriptor::pointer::<Option<Arc<Vec<Option<Arc<Item>>>>>>(TypeId(4), TypeId(3)),
            Descriptor::tagged_union::<Figure>(
                TypeId(5),
                "Figure",
                |s| match s {
                    Figure::Item(item) => Some((TypeId(1), &**item as &dyn std::any::Any)),
                },
                |_, _| None,
            ),
            Descriptor::slice::<Figure>(TypeId(6), TypeId(5)),
        ])
        .unwrap()
    }

    #[test]
    fn test_stringify_wrappers() {
        let table = table();
        assert_eq!(render(&table, TypeId(1)), "Item");
        assert_eq!(render(&table, TypeId(2)), "*Item");
        assert_eq!(render(&table, TypeId(3)), "[]*Item");
        assert_eq!(render(&table, TypeId(4)), "*[]*Item");
        assert_eq!(render(&table, TypeId(5)), "Figure");
        assert_eq!(render(&table, TypeId(6)), "[]Figure");
    }

    #[test]
    fn test_stringify_nil_and_unknown() {
        let table = table();
        assert_eq!(render(&table, TypeId::NONE), "<NIL>");
        assert_eq!(render(&table, TypeId(42)), "<UNKNOWN:42>");
        assert_eq!(format!("{:?}", TypeName::new(&table, TypeId(2))), "*Item");
    }
}
