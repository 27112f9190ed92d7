//! Scoped read-modify-write access to one key.

use docstore_types::{DataKey, NodeValue};
use tracing::warn;

use crate::error::DataResult;
use crate::kind::DataKind;
use crate::object::DataObject;

/// A short-lived handle bound to one key of one [`DataObject`].
///
/// The handle holds a copy of the value as it was when the handle was opened.
/// Mutate the copy, then let the handle go out of scope (or call
/// [`close`](Self::close) to observe the result): an absent value removes the
/// key's subtree, a present value is written back.
///
/// The handle borrows the object mutably for its whole lifetime, so no other
/// access to the object can interleave with it.
pub struct ValueHandle<'a, R: NodeValue, O: DataKind> {
    object: &'a mut DataObject<O>,
    key: &'a DataKey<R, O>,
    value: Option<R>,
    closed: bool,
}

impl<'a, R: NodeValue, O: DataKind> ValueHandle<'a, R, O> {
    pub(crate) fn new(
        object: &'a mut DataObject<O>,
        key: &'a DataKey<R, O>,
        value: Option<R>,
    ) -> Self {
        Self {
            object,
            key,
            value,
            closed: false,
        }
    }

    pub fn key(&self) -> &DataKey<R, O> {
        self.key
    }

    pub fn value(&self) -> Option<&R> {
        self.value.as_ref()
    }

    /// The current value, or the key's default if the value is absent.
    pub fn value_or_default(&self) -> Option<&R> {
        self.value.as_ref().or_else(|| self.key.default_value())
    }

    pub fn value_mut(&mut self) -> &mut Option<R> {
        &mut self.value
    }

    /// Replace the value. `None` removes the key on close.
    pub fn set_value(&mut self, value: Option<R>) {
        self.value = value;
    }

    /// Write the value back and report the outcome.
    pub fn close(mut self) -> DataResult<()> {
        self.closed = true;
        self.write_back()
    }

    /// Drop the handle without writing anything back.
    pub fn discard(mut self) {
        self.closed = true;
    }

    fn write_back(&mut self) -> DataResult<()> {
        match self.value.take() {
            None => {
                self.object.remove(self.key);
                Ok(())
            }
            Some(value) => self.object.set(self.key, value),
        }
    }
}

impl<R: NodeValue, O: DataKind> Drop for ValueHandle<'_, R, O> {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if let Err(e) = self.write_back() {
            warn!(kind = O::NAME, path = %self.key.path(), error = %e, "value handle write-back failed");
        }
    }
}
