use super::descriptor::TypeId;

/// A descriptor table that cannot be linked.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DescriptorError {
    #[error("bad codegen: descriptor {name:?} uses reserved type id 0")]
    ReservedId { name: &'static str },

    #[error("bad codegen: duplicate descriptor for type id {0}")]
    DuplicateId(TypeId),

    #[error("bad codegen: type id {id} is far outside a table of {count} descriptors")]
    SparseIds { id: TypeId, count: usize },

    #[error("bad codegen: missing {owner}.elem {target}")]
    MissingElem { owner: TypeId, target: TypeId },

    #[error("bad codegen: missing {owner}.{field}.target {target}")]
    MissingFieldTarget {
        owner: TypeId,
        field: &'static str,
        target: TypeId,
    },
}

/// Why a traversal stopped without producing a result.
#[derive(Debug, thiserror::Error)]
pub enum WalkError {
    /// A callback returned an error decision, or a side-effect action failed.
    /// The error is passed through untouched.
    #[error(transparent)]
    Aborted(anyhow::Error),

    #[error("unknown type id {0}")]
    UnknownType(TypeId),

    #[error("cannot replace a {expected} with a {found}")]
    NotAssignable { expected: String, found: String },

    #[error("{owner} has no traversable child at index {index}")]
    NoSuchChild { owner: &'static str, index: usize },

    #[error("descriptor {name} was handed a value that is not a {expected}")]
    TypeMismatch { name: String, expected: &'static str },

    #[error("traversal exceeded the depth limit of {0} frames")]
    DepthExceeded(usize),
}

impl WalkError {
    /// The callback's own error, if this traversal was aborted by one.
    pub fn as_aborted(&self) -> Option<&anyhow::Error> {
        match self {
            WalkError::Aborted(err) => Some(err),
            _ => None,
        }
    }
}
