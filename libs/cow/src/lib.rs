//! A single reusable copy-on-write primitive.
//!
//! Every COW structure in this workspace (byte-store pages and directories,
//! `pitree` pages and directories) is built out of the same handle: an
//! [`Rc`] that is shared freely on clone and physically duplicated on first
//! write. This stands in for the hand-maintained "lazy-copy" bit the
//! original implementation carries explicitly on each page object; `Rc`'s
//! strong count already *is* that bit, so [`Cow::is_shared`] reads it back
//! out instead of tracking a parallel flag that could drift out of sync.

use std::rc::Rc;

/// A clone-cheap handle to a value that is physically duplicated the first
/// time it is mutated while shared with another handle.
#[derive(Debug)]
pub struct Cow<T>(Rc<T>);

impl<T> Cow<T> {
    pub fn new(value: T) -> Self {
        Cow(Rc::new(value))
    }

    #[inline]
    pub fn get(&self) -> &T {
        &self.0
    }

    /// True if another handle aliases the same underlying value right now.
    ///
    /// This is exactly the "lazy-copy flag" of the original design: it is
    /// set the moment a sibling clone exists and clears itself the moment
    /// the last other handle is dropped, with no bookkeeping on our part.
    #[inline]
    pub fn is_shared(&self) -> bool {
        Rc::strong_count(&self.0) > 1
    }
}

impl<T: Clone> Cow<T> {
    /// Mutable access, cloning the inner value first if it is still shared.
    #[inline]
    pub fn get_mut(&mut self) -> &mut T {
        Rc::make_mut(&mut self.0)
    }
}

impl<T> Clone for Cow<T> {
    #[inline]
    fn clone(&self) -> Self {
        Cow(Rc::clone(&self.0))
    }
}

impl<T: Default> Default for Cow<T> {
    fn default() -> Self {
        Cow(Rc::new(T::default()))
    }
}

impl<T: PartialEq> PartialEq for Cow<T> {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0) || *self.0 == *other.0
    }
}
