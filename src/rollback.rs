//! A stack of compensating actions for multi-step builds.
//!
//! Each step that creates an external resource pushes the action that undoes it.  If the
//! [`Rollback`] is dropped without being [committed](Rollback::commit), the actions run in
//! reverse order.  Failures while unwinding are logged and do not stop the remaining actions:
//! the caller is already returning the error that caused the unwind.

use log::{debug, error};

use crate::error::Result;

type Compensation<'a> = Box<dyn FnOnce() -> Result<()> + 'a>;

#[derive(Default)]
pub(crate) struct Rollback<'a> {
    actions: Vec<(&'static str, Compensation<'a>)>,
}

impl<'a> Rollback<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the action undoing the step that is about to run (or just ran).
    pub fn push(&mut self, what: &'static str, action: impl FnOnce() -> Result<()> + 'a) {
        self.actions.push((what, Box::new(action)));
    }

    /// Forgets all registered actions; ownership of the resources has moved elsewhere.
    pub fn commit(mut self) {
        self.actions.clear();
    }
}

impl Drop for Rollback<'_> {
    fn drop(&mut self) {
        while let Some((what, action)) = self.actions.pop() {
            debug!("rollback: {what}");
            if let Err(err) = action() {
                error!("rollback of {what} failed: {err}");
            }
        }
    }
}
