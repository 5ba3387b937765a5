//! Immutable id→descriptor table, cross-linked once at construction.

use tracing::debug;

use super::descriptor::{Descriptor, Link, Shape, TypeId, TypeRef};
use super::error::DescriptorError;

/// How far ids may run ahead of the descriptor count before the table refuses
/// to build a dense index for them.
const ID_SPREAD: usize = 16;
const ID_SLACK: usize = 1024;

/// The full set of descriptors an engine traverses with.
///
/// Every element and field reference is resolved to a direct [`Link`] when the
/// table is built, so traversal never looks a type up by id.
#[derive(Debug, Clone)]
pub struct DescriptorTable {
    types: Vec<Descriptor>,
    /// Dense id → position map. `Link::UNRESOLVED` marks ids with no descriptor.
    index: Vec<Link>,
}

impl DescriptorTable {
    /// Builds and links a table.
    ///
    /// # Errors
    /// Any reserved, duplicated or dangling id, or ids so sparse that a dense
    /// index over them would be mostly empty. These are defects in whatever
    /// produced the descriptors and callers are expected to treat them as fatal.
    pub fn new(descriptors: impl IntoIterator<Item = Descriptor>) -> Result<Self, DescriptorError> {
        let types: Vec<Descriptor> = descriptors.into_iter().collect();

        let max_id = types.iter().map(|d| d.id.index()).max().unwrap_or(0);
        if max_id > types.len().saturating_mul(ID_SPREAD).saturating_add(ID_SLACK) {
            return Err(DescriptorError::SparseIds {
                id: TypeId(max_id as u32),
                count: types.len(),
            });
        }
        let mut index = vec![Link::UNRESOLVED; max_id + 1];
        for (pos, desc) in types.iter().enumerate() {
            if desc.id.is_none() {
                return Err(DescriptorError::ReservedId { name: desc.name });
            }
            let slot = &mut index[desc.id.index()];
            if *slot != Link::UNRESOLVED {
                return Err(DescriptorError::DuplicateId(desc.id));
            }
            *slot = Link(pos);
        }

        let mut table = Self { types, index };
        table.link()?;
        debug!("Linked {} type descriptors", table.types.len());
        Ok(table)
    }

    fn link(&mut self) -> Result<(), DescriptorError> {
        let index = &self.index;
        let resolve = |r: &mut TypeRef| -> Option<()> {
            let link = *index.get(r.id.index())?;
            if link == Link::UNRESOLVED {
                return None;
            }
            r.link = link;
            Some(())
        };

        for desc in &mut self.types {
            let owner = desc.id;
            match desc.shape_mut() {
                Shape::Pointer { elem, .. } | Shape::Slice { elem, .. } => {
                    let target = elem.id;
                    resolve(elem).ok_or(DescriptorError::MissingElem { owner, target })?;
                }
                Shape::Struct { fields } => {
                    for field in fields.iter_mut() {
                        let target = field.target.id;
                        resolve(&mut field.target).ok_or(DescriptorError::MissingFieldTarget {
                            owner,
                            field: field.name,
                            target,
                        })?;
                    }
                }
                Shape::TaggedUnion { .. } => {}
            }
        }
        Ok(())
    }

    /// O(1) lookup by id. `None` for 0 and for ids with no descriptor.
    pub fn get(&self, id: TypeId) -> Option<&Descriptor> {
        match self.index.get(id.index()) {
            Some(&link) if link != Link::UNRESOLVED => Some(&self.types[link.0]),
            _ => None,
        }
    }

    pub(crate) fn linked(&self, link: Link) -> &Descriptor {
        &self.types[link.0]
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Descriptor> {
        self.types.iter()
    }
}
