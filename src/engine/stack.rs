//! Explicit activation records for the traversal loop.
//!
//! A [`Frame`] stands for the visitation of one struct, pointer, slice or union: one
//! [`Slot`] per child still to be visited. Slots live inline up to a fixed capacity.
//! The frame buffer itself is recycled through a per-thread pool, so once a thread
//! has walked a graph of some depth, later walks up to that depth do not touch the
//! heap.

use std::cell::RefCell;

use smallvec::SmallVec;

use super::decision::{CallFn, WalkFn};
use super::descriptor::{Descriptor, Handle};

/// Inline slot capacity of a frame. Larger frames (long slices, mostly) spill
/// to the heap.
pub const FIXED_SLOT_COUNT: usize = 16;

/// Frame capacity of a stack built from scratch.
pub const DEFAULT_STACK_DEPTH: usize = 8;

/// Number of idle frame buffers kept per thread. Only nested walks need more
/// than one.
const POOLED_STACKS: usize = 4;

thread_local! {
    static POOL: RefCell<Vec<Vec<Frame<'static>>>> = const { RefCell::new(Vec::new()) };
}

/// Moves an emptied frame buffer to another lifetime, keeping its allocation.
fn recycle<'to>(mut frames: Vec<Frame<'_>>) -> Vec<Frame<'to>> {
    frames.clear();
    // An empty in-place collect between layout-identical types reuses the buffer.
    frames
        .into_iter()
        .map(|_| -> Frame<'to> { unreachable!("buffer was cleared") })
        .collect()
}

pub(crate) enum Target<'a> {
    /// A value to visit, and the type any replacement for it must satisfy.
    Value {
        desc: &'a Descriptor,
        value: Handle<'a>,
        assignable_to: &'a Descriptor,
    },
    /// A side effect from an explicit action list. Taken when it runs.
    Call(Option<CallFn<'a>>),
}

/// The in-flight state for one child of a frame.
pub(crate) struct Slot<'a> {
    pub(crate) target: Target<'a>,
    pub(crate) post: Option<&'a WalkFn<'a>>,
    /// Field or element index this slot stands for in its parent.
    pub(crate) child: usize,
    /// Set when this value, or anything below it, has been replaced.
    pub(crate) dirty: bool,
    /// Set when the value was replaced wholesale; reconstruction is skipped.
    pub(crate) replaced: bool,
}

impl<'a> Slot<'a> {
    pub(crate) fn value(
        desc: &'a Descriptor,
        value: Handle<'a>,
        assignable_to: &'a Descriptor,
        child: usize,
    ) -> Self {
        Self {
            target: Target::Value { desc, value, assignable_to },
            post: None,
            child,
            dirty: false,
            replaced: false,
        }
    }

    pub(crate) fn call(f: CallFn<'a>) -> Self {
        Self {
            target: Target::Call(Some(f)),
            post: None,
            child: 0,
            dirty: false,
            replaced: false,
        }
    }

    /// Whether this slot holds exactly `value` under `desc`.
    fn holds(&self, desc: &Descriptor, value: *const ()) -> bool {
        match &self.target {
            Target::Value { desc: own, value: Handle::Borrowed(v), .. } => {
                own.id() == desc.id() && std::ptr::addr_eq(*v as *const dyn std::any::Any, value)
            }
            _ => false,
        }
    }
}

pub(crate) struct Frame<'a> {
    /// Index of the slot being visited.
    pub(crate) idx: usize,
    /// Inherited intercept, applied to each struct slot of this frame.
    pub(crate) intercept: Option<&'a WalkFn<'a>>,
    pub(crate) slots: SmallVec<[Slot<'a>; FIXED_SLOT_COUNT]>,
}

impl<'a> Frame<'a> {
    pub(crate) fn count(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn active(&self) -> &Slot<'a> {
        &self.slots[self.idx]
    }

    pub(crate) fn active_mut(&mut self) -> &mut Slot<'a> {
        &mut self.slots[self.idx]
    }

    pub(crate) fn zero(&self) -> &Slot<'a> {
        &self.slots[0]
    }
}

/// LIFO of frames owned by a single traversal.
///
/// The frame buffer is taken from the thread's pool and handed back on drop.
pub(crate) struct Stack<'a> {
    frames: Vec<Frame<'a>>,
}

impl<'a> Stack<'a> {
    pub(crate) fn new() -> Self {
        let pooled = POOL.try_with(|pool| pool.borrow_mut().pop()).ok().flatten();
        let frames = match pooled {
            Some(frames) => recycle(frames),
            None => Vec::with_capacity(DEFAULT_STACK_DEPTH),
        };
        Self { frames }
    }

    pub(crate) fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Pushes an empty frame with room for `count` slots.
    pub(crate) fn enter(&mut self, intercept: Option<&'a WalkFn<'a>>, count: usize) {
        self.frames.push(Frame {
            idx: 0,
            intercept,
            slots: SmallVec::with_capacity(count),
        });
    }

    /// Appends a slot to the top frame.
    pub(crate) fn push(&mut self, slot: Slot<'a>) {
        self.top_mut().slots.push(slot);
    }

    pub(crate) fn pop(&mut self) -> Frame<'a> {
        match self.frames.pop() {
            Some(frame) => frame,
            None => unreachable!("pop from an empty traversal stack"),
        }
    }

    pub(crate) fn top(&self) -> &Frame<'a> {
        match self.frames.last() {
            Some(frame) => frame,
            None => unreachable!("traversal stack is empty"),
        }
    }

    pub(crate) fn top_mut(&mut self) -> &mut Frame<'a> {
        match self.frames.last_mut() {
            Some(frame) => frame,
            None => unreachable!("traversal stack is empty"),
        }
    }

    /// Frame `k`, counted from the bottom of the stack.
    pub(crate) fn peek(&self, k: usize) -> &Frame<'a> {
        &self.frames[k]
    }

    /// The active slot of the top frame.
    pub(crate) fn active(&self) -> &Slot<'a> {
        self.top().active()
    }

    pub(crate) fn active_mut(&mut self) -> &mut Slot<'a> {
        self.top_mut().active_mut()
    }

    /// The active slot of the frame below the top: the parent of the active slot.
    pub(crate) fn parent_active_mut(&mut self) -> &mut Slot<'a> {
        let depth = self.depth();
        self.frames[depth - 2].active_mut()
    }

    /// Whether the active slot of the top frame is already being visited further
    /// down the stack. Only exact (type, address) matches count.
    pub(crate) fn on_stack(&self) -> bool {
        let depth = self.depth();
        if depth < 2 {
            return false;
        }
        let current = self.active();
        let (desc, addr) = match &current.target {
            Target::Value { desc, value: Handle::Borrowed(v), .. } => {
                (*desc, *v as *const dyn std::any::Any as *const ())
            }
            _ => return false,
        };
        (0..depth - 1).any(|k| self.peek(k).active().holds(desc, addr))
    }
}

impl Drop for Stack<'_> {
    fn drop(&mut self) {
        let frames = recycle(std::mem::take(&mut self.frames));
        // The pool may already be gone while the thread shuts down.
        let _ = POOL.try_with(|pool| {
            let mut pool = pool.borrow_mut();
            if pool.len() < POOLED_STACKS {
                pool.push(frames);
            }
        });
    }
}
