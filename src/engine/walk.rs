//! The traversal state machine.
//!
//! A walk is an unrolled recursion over an explicit [`Stack`]. Each step either
//! enters the active slot (pushing a frame for its children), unwinds it (rebuilding
//! it from the frame just completed and running its post callback), or advances to
//! the next slot. Values are only ever read from the original graph; a replacement
//! anywhere below a slot leaves that slot holding a fresh, owned copy.

use std::any::Any;

use tracing::trace;

use super::decision::{Action, Decision, Directive, Node, WalkFn};
use super::descriptor::{Descriptor, Field, Handle, Kind, Mismatch, Shape, TypeId};
use super::error::WalkError;
use super::stack::{Frame, Slot, Stack, Target};
use super::stringify::{TypeName, render};
use super::table::DescriptorTable;

/// Outcome of a completed traversal.
#[derive(Debug)]
pub struct Walked<'a> {
    type_id: TypeId,
    value: Handle<'a>,
    changed: bool,
}

impl<'a> Walked<'a> {
    /// Type of the resulting root. Differs from the input type only when the root
    /// itself was replaced.
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// `true` if anything in the graph was replaced.
    pub fn changed(&self) -> bool {
        self.changed
    }

    pub fn value(&self) -> &dyn Any {
        self.value.get()
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    /// The resulting root: the original value when nothing changed (cloned out of
    /// the borrow), otherwise the rebuilt one.
    pub fn into_value<T: Any + Clone>(self) -> Option<T> {
        self.value.take::<T>()
    }

    pub fn into_handle(self) -> Handle<'a> {
        self.value
    }
}

enum Step<'a> {
    Enter,
    Unwind,
    Next,
    Done(Walked<'a>),
}

/// What a decision leaves for the node once its modifiers have been recorded.
enum Flow<'a> {
    Descend,
    Skip,
    Halt,
    Replaced,
    Actions(Vec<Action<'a>>),
}

pub(crate) struct Walk<'a> {
    table: &'a DescriptorTable,
    max_depth: usize,
    callback: &'a WalkFn<'a>,
    stack: Stack<'a>,
    halting: bool,
    /// The frame popped most recently, consumed by the next unwind.
    returning: Option<Frame<'a>>,
}

impl<'a> Walk<'a> {
    pub(crate) fn new(table: &'a DescriptorTable, max_depth: usize, callback: &'a WalkFn<'a>) -> Self {
        Self {
            table,
            max_depth: max_depth.max(1),
            callback,
            stack: Stack::new(),
            halting: false,
            returning: None,
        }
    }

    pub(crate) fn run(
        mut self,
        root: &'a Descriptor,
        value: &'a dyn Any,
        assignable_to: &'a Descriptor,
    ) -> Result<Walked<'a>, WalkError> {
        self.stack.enter(None, 1);
        self.stack.push(Slot::value(root, Handle::Borrowed(value), assignable_to, 0));

        let mut step = Step::Enter;
        loop {
            step = match step {
                Step::Enter => self.enter()?,
                Step::Unwind => self.unwind()?,
                Step::Next => self.next_slot(),
                Step::Done(walked) => return Ok(walked),
            };
        }
    }

    fn enter(&mut self) -> Result<Step<'a>, WalkError> {
        let (desc, value) = match &mut self.stack.active_mut().target {
            Target::Call(call) => {
                if let Some(f) = call.take() {
                    if let Err(err) = f() {
                        trace!("Action aborted the walk: {}", err);
                        return Err(WalkError::Aborted(err));
                    }
                }
                return Ok(Step::Unwind);
            }
            Target::Value { desc, value: Handle::Borrowed(value), .. } => (*desc, *value),
            // Owned values are replacements; they are never descended into.
            Target::Value { .. } => return Ok(Step::Unwind),
        };

        if self.stack.on_stack() {
            trace!("Cycle at {}, skipping", TypeName::new(self.table, desc.id()));
            return Ok(Step::Next);
        }

        match &desc.shape {
            Shape::Struct { fields } => return self.enter_struct(desc, fields, value),

            Shape::Pointer { elem, deref, .. } => {
                let Some(pointee) = deref(value).map_err(type_mismatch(self.table, desc))? else {
                    return Ok(Step::Unwind);
                };
                let elem = self.table.linked(elem.link);
                self.enter_frame(self.stack.top().intercept, 1)?;
                self.stack.push(Slot::value(elem, Handle::Borrowed(pointee), elem, 0));
            }

            Shape::Slice { elem, len, index, .. } => {
                let count = len(value).map_err(type_mismatch(self.table, desc))?;
                if count == 0 {
                    return Ok(Step::Unwind);
                }
                let elem = self.table.linked(elem.link);
                self.enter_frame(self.stack.top().intercept, count)?;
                for i in 0..count {
                    let Some(item) = index(value, i).map_err(type_mismatch(self.table, desc))? else {
                        break;
                    };
                    self.stack.push(Slot::value(elem, Handle::Borrowed(item), elem, i));
                }
            }

            Shape::TaggedUnion { inspect, .. } => {
                let Some((id, payload)) = inspect(value).map_err(type_mismatch(self.table, desc))? else {
                    return Ok(Step::Unwind);
                };
                if id.is_none() {
                    return Ok(Step::Unwind);
                }
                let concrete = self.table.get(id).ok_or(WalkError::UnknownType(id))?;
                self.enter_frame(self.stack.top().intercept, 1)?;
                // A union member may be swapped for any other member.
                self.stack.push(Slot::value(concrete, Handle::Borrowed(payload), desc, 0));
            }
        }
        Ok(Step::Enter)
    }

    fn enter_struct(
        &mut self,
        desc: &'a Descriptor,
        fields: &'a [Field],
        value: &'a dyn Any,
    ) -> Result<Step<'a>, WalkError> {
        let node = Node::new(desc, value);
        let mut leaf = false;

        if let Some(intercept) = self.stack.top().intercept {
            let decision = intercept(node);
            if let Some(replacement) = decision.intercept {
                self.stack.top_mut().intercept = Some(replacement);
            }
            match self.apply(decision)? {
                Flow::Skip | Flow::Replaced => leaf = true,
                // An intercept only filters; its action lists are not honoured.
                Flow::Descend | Flow::Halt | Flow::Actions(_) => {}
            }
        }

        // The node's own callback always runs, on the replacement if the
        // intercept supplied one.
        let decision = match &self.stack.active().target {
            Target::Value { desc, value: Handle::Owned(owned), .. } => {
                (self.callback)(Node::new(*desc, &**owned))
            }
            _ => (self.callback)(node),
        };
        let intercept = decision.intercept.or(self.stack.top().intercept);
        let flow = self.apply(decision)?;
        if self.halting || leaf {
            return Ok(Step::Unwind);
        }

        match flow {
            Flow::Skip | Flow::Halt | Flow::Replaced => Ok(Step::Unwind),
            Flow::Actions(actions) => {
                self.enter_frame(intercept, actions.len())?;
                for action in actions {
                    let slot = match action {
                        Action::Visit(i) => {
                            let field = fields
                                .get(i)
                                .ok_or(WalkError::NoSuchChild { owner: desc.name(), index: i })?;
                            self.field_slot(desc, field, value, i)?
                        }
                        Action::Call(f) => Slot::call(f),
                    };
                    self.stack.push(slot);
                }
                Ok(Step::Enter)
            }
            Flow::Descend => {
                if fields.is_empty() {
                    return Ok(Step::Unwind);
                }
                self.enter_frame(intercept, fields.len())?;
                for (i, field) in fields.iter().enumerate() {
                    let slot = self.field_slot(desc, field, value, i)?;
                    self.stack.push(slot);
                }
                Ok(Step::Enter)
            }
        }
    }

    fn field_slot(
        &self,
        owner: &'a Descriptor,
        field: &'a Field,
        value: &'a dyn Any,
        index: usize,
    ) -> Result<Slot<'a>, WalkError> {
        let target = self.table.linked(field.target.link);
        let child = (field.get)(value).map_err(type_mismatch(self.table, owner))?;
        Ok(Slot::value(target, Handle::Borrowed(child), target, index))
    }

    fn enter_frame(&mut self, intercept: Option<&'a WalkFn<'a>>, count: usize) -> Result<(), WalkError> {
        if self.stack.depth() >= self.max_depth {
            return Err(WalkError::DepthExceeded(self.max_depth));
        }
        self.stack.enter(intercept, count);
        Ok(())
    }

    /// Records a decision against the active slot.
    fn apply(&mut self, decision: Decision<'a>) -> Result<Flow<'a>, WalkError> {
        if let Some(post) = decision.post {
            self.stack.active_mut().post = Some(post);
        }
        match decision.directive {
            Directive::Continue => Ok(Flow::Descend),
            Directive::Skip => Ok(Flow::Skip),
            Directive::Halt => {
                trace!("Halting walk");
                self.halting = true;
                Ok(Flow::Halt)
            }
            Directive::Error(err) => {
                trace!("Callback aborted the walk: {}", err);
                Err(WalkError::Aborted(err))
            }
            Directive::Replace(id, value) => {
                self.replace(id, value)?;
                Ok(Flow::Replaced)
            }
            Directive::Actions(actions) => Ok(Flow::Actions(actions)),
        }
    }

    /// Post callbacks may only halt, abort or replace.
    fn apply_post(&mut self, decision: Decision<'a>) -> Result<(), WalkError> {
        match decision.directive {
            Directive::Halt => {
                trace!("Halting walk from post callback");
                self.halting = true;
            }
            Directive::Error(err) => {
                trace!("Post callback aborted the walk: {}", err);
                return Err(WalkError::Aborted(err));
            }
            Directive::Replace(id, value) => self.replace(id, value)?,
            Directive::Continue | Directive::Skip | Directive::Actions(_) => {}
        }
        Ok(())
    }

    fn replace(&mut self, id: TypeId, replacement: Box<dyn Any>) -> Result<(), WalkError> {
        let table = self.table;
        let found = table.get(id).ok_or(WalkError::UnknownType(id))?;
        let slot = self.stack.active_mut();
        let Target::Value { desc, value, assignable_to } = &mut slot.target else {
            unreachable!("replacement for a call slot");
        };
        if found.id() != assignable_to.id() && assignable_to.kind() != Kind::TaggedUnion {
            return Err(WalkError::NotAssignable {
                expected: render(table, assignable_to.id()),
                found: render(table, id),
            });
        }
        trace!(
            "Replacing {} with {}",
            TypeName::new(table, desc.id()),
            TypeName::new(table, id)
        );
        *desc = found;
        *value = Handle::Owned(replacement);
        slot.dirty = true;
        slot.replaced = true;
        Ok(())
    }

    fn unwind(&mut self) -> Result<Step<'a>, WalkError> {
        if let Some(returning) = self.returning.take() {
            let slot = self.stack.active();
            if slot.dirty && !slot.replaced {
                self.rebuild(returning)?;
            }
        }

        let slot = self.stack.active_mut();
        if let Some(post) = slot.post.take() {
            if let Target::Value { desc, value, .. } = &slot.target {
                let decision = post(Node::new(desc, value.get()));
                self.apply_post(decision)?;
            }
        }

        let depth = self.stack.depth();
        if depth > 1 && self.stack.active().dirty {
            self.stack.parent_active_mut().dirty = true;
        }
        Ok(Step::Next)
    }

    /// Folds the completed child frame into a fresh value for the active slot.
    fn rebuild(&mut self, frame: Frame<'a>) -> Result<(), WalkError> {
        let table = self.table;
        let slot = self.stack.active_mut();
        let Target::Value { desc, value, .. } = &mut slot.target else {
            return Ok(());
        };
        let desc: &'a Descriptor = *desc;
        let mismatch = type_mismatch(table, desc);

        let next = match &desc.shape {
            Shape::Struct { fields } => {
                // Untraversed fields come along with the copy.
                let mut next = (desc.copy)(value.get()).map_err(&mismatch)?;
                for child in frame.slots {
                    if !child.dirty {
                        continue;
                    }
                    if let Target::Value { value: child_value, .. } = child.target {
                        (fields[child.child].set)(next.as_mut(), child_value).map_err(&mismatch)?;
                    }
                }
                next
            }
            Shape::Pointer { wrap, .. } => {
                let (_, pointee) = into_value(frame);
                wrap(pointee).map_err(&mismatch)?
            }
            Shape::Slice { new_slice, push, .. } => {
                let mut next = new_slice(frame.count());
                for child in frame.slots {
                    if let Target::Value { value: item, .. } = child.target {
                        push(next.as_mut(), item).map_err(&mismatch)?;
                    }
                }
                next
            }
            Shape::TaggedUnion { rewrap, .. } => {
                let (member, payload) = into_value(frame);
                if member.id() == desc.id() {
                    match payload {
                        Handle::Owned(union) => union,
                        Handle::Borrowed(union) => (desc.copy)(union).map_err(&mismatch)?,
                    }
                } else {
                    rewrap(member.id(), payload)
                        .map_err(&mismatch)?
                        .ok_or_else(|| WalkError::NotAssignable {
                            expected: render(table, desc.id()),
                            found: render(table, member.id()),
                        })?
                }
            }
        };
        *value = Handle::Owned(next);
        Ok(())
    }

    fn next_slot(&mut self) -> Step<'a> {
        let frame = self.stack.top_mut();
        frame.idx += 1;
        if frame.idx < frame.count() && !self.halting {
            return Step::Enter;
        }

        if self.stack.depth() == 1 {
            let root = self.stack.pop();
            let changed = root.zero().dirty;
            let (desc, value) = into_value(root);
            return Step::Done(Walked {
                type_id: desc.id(),
                value,
                changed,
            });
        }

        self.returning = Some(self.stack.pop());
        Step::Unwind
    }
}

/// The descriptor and value held by the first slot of a single-slot frame.
fn into_value<'a>(frame: Frame<'a>) -> (&'a Descriptor, Handle<'a>) {
    match frame.slots.into_iter().next().map(|slot| slot.target) {
        Some(Target::Value { desc, value, .. }) => (desc, value),
        _ => unreachable!("single-slot frame without a value"),
    }
}

fn type_mismatch<'t>(table: &'t DescriptorTable, desc: &'t Descriptor) -> impl Fn(Mismatch) -> WalkError + 't {
    move |mismatch| WalkError::TypeMismatch {
        name: render(table, desc.id()),
        expected: mismatch.expected,
    }
}
