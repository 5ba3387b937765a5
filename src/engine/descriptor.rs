//! Per-type descriptors consumed by the traversal engine.
//!
//! A descriptor is the static metadata for one visitable type: its kind, its
//! declared name, and a small table of type-erased functions that let the engine
//! reach into (and rebuild) values of that type without knowing it statically.
//!
//! # Kinds
//!
//! - `Struct`: ordered traversable fields, each a lens (getter + setter) on the
//!   parent value. Fields that are not listed are carried along by the copy fn.
//! - `Pointer`: a nullable or non-null indirection (`Option<Arc<T>>`, `Box<T>`, ...)
//!   described by [`PointerLike`].
//! - `Slice`: a `Vec<T>` of visitable elements.
//! - `TaggedUnion`: a runtime-typed value (usually an enum) described by an
//!   inspect fn and a rewrap fn.
//!
//! # Usage
//!
//! ```ignore
//! use rewalk::engine::{Descriptor, TypeId};
//!
//! const ROOT: TypeId = TypeId(1);
//! const LEAF: TypeId = TypeId(2);
//! const LEAF_PTR: TypeId = TypeId(3);
//!
//! let descriptors = vec![
//!     Descriptor::structure::<Root>(ROOT, "Root")
//!         .field("child", LEAF_PTR, |r| &r.child, |r, v| r.child = v)
//!         .build(),
//!     Descriptor::structure::<Leaf>(LEAF, "Leaf").build(),
//!     Descriptor::pointer::<Option<Arc<Leaf>>>(LEAF_PTR, LEAF),
//! ];
//! ```

use std::any::{Any, type_name};
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

/// Lightweight type token. Ids are dense and `0` is reserved for "no type".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct TypeId(pub u32);

impl TypeId {
    /// The reserved "no type" id.
    pub const NONE: TypeId = TypeId(0);

    pub fn is_none(self) -> bool {
        self.0 == 0
    }

    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Discriminator for the shapes the engine knows how to traverse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Struct,
    Pointer,
    Slice,
    TaggedUnion,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Kind::Struct => write!(f, "struct"),
            Kind::Pointer => write!(f, "pointer"),
            Kind::Slice => write!(f, "slice"),
            Kind::TaggedUnion => write!(f, "tagged union"),
        }
    }
}

/// Reported by a descriptor function that was handed a value of the wrong Rust type.
///
/// This only happens when a descriptor table disagrees with the values it is used
/// on, which is a defect in whatever produced the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mismatch {
    pub expected: &'static str,
}

impl Mismatch {
    pub fn of<T: ?Sized>() -> Self {
        Self { expected: type_name::<T>() }
    }
}

/// A type-erased value as seen by the engine.
///
/// `Borrowed` handles point into the caller's original graph; `Owned` handles hold
/// replacement values supplied by callbacks or values rebuilt on the unwind path.
pub enum Handle<'a> {
    Borrowed(&'a dyn Any),
    Owned(Box<dyn Any>),
}

impl<'a> Handle<'a> {
    pub fn get(&self) -> &dyn Any {
        match self {
            Handle::Borrowed(value) => *value,
            Handle::Owned(value) => value.as_ref(),
        }
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.get().downcast_ref::<T>()
    }

    pub fn is_owned(&self) -> bool {
        matches!(self, Handle::Owned(_))
    }

    /// Extracts a `T`, moving it out of an owned handle or cloning it out of a
    /// borrowed one. Returns `None` if the handle holds some other type.
    pub fn take<T: Any + Clone>(self) -> Option<T> {
        match self {
            Handle::Borrowed(value) => value.downcast_ref::<T>().cloned(),
            Handle::Owned(value) => value.downcast::<T>().ok().map(|boxed| *boxed),
        }
    }

    /// Address of the underlying value, used as the identity half of the cycle guard.
    pub(crate) fn addr(&self) -> *const () {
        self.get() as *const dyn Any as *const ()
    }
}

impl fmt::Debug for Handle<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Handle::Borrowed(_) => write!(f, "Borrowed({:p})", self.addr()),
            Handle::Owned(_) => write!(f, "Owned({:p})", self.addr()),
        }
    }
}

/// An indirection the engine can see through and rebuild.
///
/// Implemented for the common owning pointers. Generated code may implement it for
/// custom cells (for example a `OnceLock<Arc<T>>` used to tie a knot).
pub trait PointerLike: Any + Clone {
    type Target: Any + Clone;

    /// The pointee, or `None` for a null pointer.
    fn target(&self) -> Option<&Self::Target>;

    /// A fresh pointer holding `value`.
    fn from_target(value: Self::Target) -> Self;
}

impl<T: Any + Clone> PointerLike for Arc<T> {
    type Target = T;

    fn target(&self) -> Option<&T> {
        Some(&**self)
    }

    fn from_target(value: T) -> Self {
        Arc::new(value)
    }
}

impl<T: Any + Clone> PointerLike for Option<Arc<T>> {
    type Target = T;

    fn target(&self) -> Option<&T> {
        self.as_deref()
    }

    fn from_target(value: T) -> Self {
        Some(Arc::new(value))
    }
}

impl<T: Any + Clone> PointerLike for Box<T> {
    type Target = T;

    fn target(&self) -> Option<&T> {
        Some(&**self)
    }

    fn from_target(value: T) -> Self {
        Box::new(value)
    }
}

impl<T: Any + Clone> PointerLike for Option<Box<T>> {
    type Target = T;

    fn target(&self) -> Option<&T> {
        self.as_deref()
    }

    fn from_target(value: T) -> Self {
        Some(Box::new(value))
    }
}

impl<T: Any + Clone> PointerLike for Rc<T> {
    type Target = T;

    fn target(&self) -> Option<&T> {
        Some(&**self)
    }

    fn from_target(value: T) -> Self {
        Rc::new(value)
    }
}

impl<T: Any + Clone> PointerLike for Option<Rc<T>> {
    type Target = T;

    fn target(&self) -> Option<&T> {
        self.as_deref()
    }

    fn from_target(value: T) -> Self {
        Some(Rc::new(value))
    }
}

pub(crate) type CopyFn = fn(&dyn Any) -> Result<Box<dyn Any>, Mismatch>;
pub(crate) type GetFn =
    Arc<dyn for<'v> Fn(&'v dyn Any) -> Result<&'v dyn Any, Mismatch> + Send + Sync>;
pub(crate) type SetFn =
    Arc<dyn for<'h> Fn(&mut dyn Any, Handle<'h>) -> Result<(), Mismatch> + Send + Sync>;
pub(crate) type DerefFn = for<'v> fn(&'v dyn Any) -> Result<Option<&'v dyn Any>, Mismatch>;
pub(crate) type WrapFn = for<'h> fn(Handle<'h>) -> Result<Box<dyn Any>, Mismatch>;
pub(crate) type LenFn = fn(&dyn Any) -> Result<usize, Mismatch>;
pub(crate) type IndexFn = for<'v> fn(&'v dyn Any, usize) -> Result<Option<&'v dyn Any>, Mismatch>;
pub(crate) type NewSliceFn = fn(usize) -> Box<dyn Any>;
pub(crate) type PushFn = for<'h> fn(&mut dyn Any, Handle<'h>) -> Result<(), Mismatch>;
pub(crate) type InspectFn = Arc<
    dyn for<'v> Fn(&'v dyn Any) -> Result<Option<(TypeId, &'v dyn Any)>, Mismatch> + Send + Sync,
>;
pub(crate) type RewrapFn =
    Arc<dyn for<'h> Fn(TypeId, Handle<'h>) -> Result<Option<Box<dyn Any>>, Mismatch> + Send + Sync>;

/// Position of a descriptor inside its table, filled in when the table is linked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Link(pub(crate) usize);

impl Link {
    pub(crate) const UNRESOLVED: Link = Link(usize::MAX);
}

/// A reference from one descriptor to another: declared by id, resolved to a link.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TypeRef {
    pub(crate) id: TypeId,
    pub(crate) link: Link,
}

impl TypeRef {
    fn new(id: TypeId) -> Self {
        Self { id, link: Link::UNRESOLVED }
    }
}

/// One traversable field of a struct.
#[derive(Clone)]
pub struct Field {
    pub(crate) name: &'static str,
    pub(crate) target: TypeRef,
    pub(crate) get: GetFn,
    pub(crate) set: SetFn,
}

impl Field {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn target(&self) -> TypeId {
        self.target.id
    }
}

impl fmt::Debug for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("name", &self.name)
            .field("target", &self.target.id)
            .finish()
    }
}

#[derive(Clone)]
pub(crate) enum Shape {
    Struct {
        fields: Vec<Field>,
    },
    Pointer {
        elem: TypeRef,
        deref: DerefFn,
        wrap: WrapFn,
    },
    Slice {
        elem: TypeRef,
        len: LenFn,
        index: IndexFn,
        new_slice: NewSliceFn,
        push: PushFn,
    },
    TaggedUnion {
        inspect: InspectFn,
        rewrap: RewrapFn,
    },
}

/// Static metadata for one visitable type.
#[derive(Clone)]
pub struct Descriptor {
    pub(crate) id: TypeId,
    pub(crate) name: &'static str,
    pub(crate) size: usize,
    pub(crate) copy: CopyFn,
    pub(crate) shape: Shape,
}

impl Descriptor {
    pub fn id(&self) -> TypeId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Size in bytes of the described Rust type.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn kind(&self) -> Kind {
        match self.shape {
            Shape::Struct { .. } => Kind::Struct,
            Shape::Pointer { .. } => Kind::Pointer,
            Shape::Slice { .. } => Kind::Slice,
            Shape::TaggedUnion { .. } => Kind::TaggedUnion,
        }
    }

    /// Traversable fields, empty for anything but a struct.
    pub fn fields(&self) -> &[Field] {
        match &self.shape {
            Shape::Struct { fields } => fields,
            _ => &[],
        }
    }

    /// Element type of a pointer or slice.
    pub fn elem(&self) -> Option<TypeId> {
        match &self.shape {
            Shape::Pointer { elem, .. } | Shape::Slice { elem, .. } => Some(elem.id),
            _ => None,
        }
    }

    /// Starts a struct descriptor for `S`. Fields are added in traversal order.
    pub fn structure<S: Any + Clone>(id: TypeId, name: &'static str) -> StructBuilder<S> {
        StructBuilder {
            id,
            name,
            fields: Vec::new(),
            _marker: std::marker::PhantomData,
        }
    }

    /// Describes a pointer type `P` whose pointee is described by `elem`.
    pub fn pointer<P: PointerLike>(id: TypeId, elem: TypeId) -> Descriptor {
        Descriptor {
            id,
            name: "",
            size: size_of::<P>(),
            copy: copy_value::<P>,
            shape: Shape::Pointer {
                elem: TypeRef::new(elem),
                deref: deref_pointer::<P>,
                wrap: wrap_pointer::<P>,
            },
        }
    }

    /// Describes a `Vec<T>` whose elements are described by `elem`.
    pub fn slice<T: Any + Clone>(id: TypeId, elem: TypeId) -> Descriptor {
        Descriptor {
            id,
            name: "",
            size: size_of::<Vec<T>>(),
            copy: copy_value::<Vec<T>>,
            shape: Shape::Slice {
                elem: TypeRef::new(elem),
                len: slice_len::<T>,
                index: slice_index::<T>,
                new_slice: new_slice::<T>,
                push: slice_push::<T>,
            },
        }
    }

    /// Describes a tagged union `U`.
    ///
    /// # Arguments
    /// * `inspect` - Maps a union value to its concrete type id and payload, or `None`
    ///   for an empty value.
    /// * `rewrap` - Rebuilds a union value from a concrete type id and payload. Use
    ///   [`Handle::take`] to extract the payload. Returns `None` for a type id the
    ///   union cannot hold.
    pub fn tagged_union<U: Any + Clone>(
        id: TypeId,
        name: &'static str,
        inspect: for<'v> fn(&'v U) -> Option<(TypeId, &'v dyn Any)>,
        rewrap: for<'h> fn(TypeId, Handle<'h>) -> Option<U>,
    ) -> Descriptor {
        let inspect: InspectFn = Arc::new(inspect_lens(move |value: &dyn Any| {
            let union = value.downcast_ref::<U>().ok_or_else(Mismatch::of::<U>)?;
            Ok(inspect(union))
        }));
        let rewrap: RewrapFn = Arc::new(
            move |id: TypeId, payload: Handle<'_>| -> Result<Option<Box<dyn Any>>, Mismatch> {
                Ok(rewrap(id, payload).map(|union| Box::new(union) as Box<dyn Any>))
            },
        );
        Descriptor {
            id,
            name,
            size: size_of::<U>(),
            copy: copy_value::<U>,
            shape: Shape::TaggedUnion { inspect, rewrap },
        }
    }

    pub(crate) fn shape_mut(&mut self) -> &mut Shape {
        &mut self.shape
    }
}

impl fmt::Debug for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = f.debug_struct("Descriptor");
        out.field("id", &self.id)
            .field("name", &self.name)
            .field("kind", &self.kind())
            .field("size", &self.size);
        match &self.shape {
            Shape::Struct { fields } => out.field("fields", fields),
            Shape::Pointer { elem, .. } | Shape::Slice { elem, .. } => out.field("elem", &elem.id),
            Shape::TaggedUnion { .. } => &mut out,
        };
        out.finish()
    }
}

/// Builder returned by [`Descriptor::structure`].
pub struct StructBuilder<S> {
    id: TypeId,
    name: &'static str,
    fields: Vec<Field>,
    _marker: std::marker::PhantomData<fn() -> S>,
}

impl<S: Any + Clone> StructBuilder<S> {
    /// Adds a traversable field of Rust type `F`, described by `target`.
    ///
    /// `get` and `set` form the lens through which the engine reads the field from
    /// the original value and writes a replacement into a fresh copy.
    pub fn field<F: Any + Clone>(
        mut self,
        name: &'static str,
        target: TypeId,
        get: for<'v> fn(&'v S) -> &'v F,
        set: fn(&mut S, F),
    ) -> Self {
        let getter: GetFn = Arc::new(field_lens(move |value: &dyn Any| {
            let parent = value.downcast_ref::<S>().ok_or_else(Mismatch::of::<S>)?;
            Ok(get(parent) as &dyn Any)
        }));
        let setter: SetFn = Arc::new(move |dest: &mut dyn Any, child: Handle<'_>| -> Result<(), Mismatch> {
            let parent = dest.downcast_mut::<S>().ok_or_else(Mismatch::of::<S>)?;
            let value = child.take::<F>().ok_or_else(Mismatch::of::<F>)?;
            set(parent, value);
            Ok(())
        });
        self.fields.push(Field {
            name,
            target: TypeRef::new(target),
            get: getter,
            set: setter,
        });
        self
    }

    pub fn build(self) -> Descriptor {
        Descriptor {
            id: self.id,
            name: self.name,
            size: size_of::<S>(),
            copy: copy_value::<S>,
            shape: Shape::Struct { fields: self.fields },
        }
    }
}

// Pin closure signatures to the higher-ranked forms stored in the descriptor.
fn field_lens<G>(lens: G) -> G
where
    G: for<'v> Fn(&'v dyn Any) -> Result<&'v dyn Any, Mismatch>,
{
    lens
}

fn inspect_lens<G>(lens: G) -> G
where
    G: for<'v> Fn(&'v dyn Any) -> Result<Option<(TypeId, &'v dyn Any)>, Mismatch>,
{
    lens
}

fn copy_value<T: Any + Clone>(value: &dyn Any) -> Result<Box<dyn Any>, Mismatch> {
    let value = value.downcast_ref::<T>().ok_or_else(Mismatch::of::<T>)?;
    Ok(Box::new(value.clone()))
}

fn deref_pointer<P: PointerLike>(value: &dyn Any) -> Result<Option<&dyn Any>, Mismatch> {
    let ptr = value.downcast_ref::<P>().ok_or_else(Mismatch::of::<P>)?;
    Ok(ptr.target().map(|target| target as &dyn Any))
}

fn wrap_pointer<P: PointerLike>(pointee: Handle<'_>) -> Result<Box<dyn Any>, Mismatch> {
    let target = pointee.take::<P::Target>().ok_or_else(Mismatch::of::<P::Target>)?;
    Ok(Box::new(P::from_target(target)))
}

fn slice_len<T: Any + Clone>(value: &dyn Any) -> Result<usize, Mismatch> {
    let items = value.downcast_ref::<Vec<T>>().ok_or_else(Mismatch::of::<Vec<T>>)?;
    Ok(items.len())
}

fn slice_index<T: Any + Clone>(value: &dyn Any, idx: usize) -> Result<Option<&dyn Any>, Mismatch> {
    let items = value.downcast_ref::<Vec<T>>().ok_or_else(Mismatch::of::<Vec<T>>)?;
    Ok(items.get(idx).map(|item| item as &dyn Any))
}

fn new_slice<T: Any + Clone>(len: usize) -> Box<dyn Any> {
    Box::new(Vec::<T>::with_capacity(len))
}

fn slice_push<T: Any + Clone>(dest: &mut dyn Any, item: Handle<'_>) -> Result<(), Mismatch> {
    let items = dest.downcast_mut::<Vec<T>>().ok_or_else(Mismatch::of::<Vec<T>>)?;
    items.push(item.take::<T>().ok_or_else(Mismatch::of::<T>)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug, PartialEq)]
    struct Pair {
        left: Option<Arc<Pair>>,
        label: String,
    }

    #[test]
    fn test_struct_builder_lenses() {
        let desc = Descriptor::structure::<Pair>(TypeId(1), "Pair")
            .field("left", TypeId(2), |p| &p.left, |p, v| p.left = v)
            .build();
        assert_eq!(desc.kind(), Kind::Struct);
        assert_eq!(desc.fields().len(), 1);
        assert_eq!(desc.fields()[0].name(), "left");
        assert_eq!(desc.size(), size_of::<Pair>());

        let inner = Arc::new(Pair { left: None, label: "inner".into() });
        let outer = Pair { left: Some(inner.clone()), label: "outer".into() };

        let got = (desc.fields()[0].get)(&outer).unwrap();
        let got = got.downcast_ref::<Option<Arc<Pair>>>().unwrap();
        assert!(Arc::ptr_eq(got.as_ref().unwrap(), &inner));

        let mut copy = (desc.copy)(&outer).unwrap();
        (desc.fields()[0].set)(copy.as_mut(), Handle::Owned(Box::new(None::<Arc<Pair>>))).unwrap();
        let copy = copy.downcast_ref::<Pair>().unwrap();
        assert_eq!(copy.left, None);
        assert_eq!(copy.label, "outer");
    }

    #[test]
    fn test_lens_reports_mismatch() {
        let desc = Descriptor::structure::<Pair>(TypeId(1), "Pair")
            .field("left", TypeId(2), |p| &p.left, |p, v| p.left = v)
            .build();
        let err = (desc.fields()[0].get)(&42u8).err().unwrap();
        assert!(err.expected.contains("Pair"));
    }

    #[test]
    fn test_pointer_deref_and_wrap() {
        let desc = Descriptor::pointer::<Option<Arc<String>>>(TypeId(3), TypeId(4));
        assert_eq!(desc.kind(), Kind::Pointer);
        assert_eq!(desc.elem(), Some(TypeId(4)));
        let Shape::Pointer { deref, wrap, .. } = &desc.shape else {
            panic!("expected pointer shape");
        };

        let null: Option<Arc<String>> = None;
        assert!(deref(&null).unwrap().is_none());

        let some = Some(Arc::new("hi".to_string()));
        let target = deref(&some).unwrap().unwrap();
        assert_eq!(target.downcast_ref::<String>().unwrap(), "hi");

        let fresh = wrap(Handle::Owned(Box::new("bye".to_string()))).unwrap();
        let fresh = fresh.downcast_ref::<Option<Arc<String>>>().unwrap();
        assert_eq!(fresh.as_deref().map(String::as_str), Some("bye"));
    }

    #[test]
    fn test_slice_functions() {
        let desc = Descriptor::slice::<u32>(TypeId(5), TypeId(6));
        let Shape::Slice { len, index, new_slice, push, .. } = &desc.shape else {
            panic!("expected slice shape");
        };
        let items = vec![1u32, 2, 3];
        assert_eq!(len(&items).unwrap(), 3);
        assert_eq!(index(&items, 1).unwrap().unwrap().downcast_ref::<u32>(), Some(&2));
        assert!(index(&items, 3).unwrap().is_none());

        let mut out = new_slice(2);
        push(out.as_mut(), Handle::Borrowed(&7u32)).unwrap();
        push(out.as_mut(), Handle::Owned(Box::new(8u32))).unwrap();
        assert_eq!(out.downcast_ref::<Vec<u32>>().unwrap(), &vec![7, 8]);
    }

    #[test]
    fn test_handle_take() {
        let value = 5i64;
        assert_eq!(Handle::Borrowed(&value).take::<i64>(), Some(5));
        assert_eq!(Handle::Owned(Box::new(6i64)).take::<i64>(), Some(6));
        assert_eq!(Handle::Owned(Box::new(6i64)).take::<u8>(), None);
    }
}
