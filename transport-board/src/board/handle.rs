use std::cell::RefCell;
use std::sync::{Mutex, PoisonError};

use super::AssignmentStore;

/// Short synchronous access to a shared store.
///
/// Long-running work (photo recognition) calls `update` between awaits and
/// never holds the store across one.
pub trait BoardHandle {
    fn update<T>(&self, f: impl FnOnce(&mut AssignmentStore) -> T) -> T;
}

impl BoardHandle for RefCell<AssignmentStore> {
    fn update<T>(&self, f: impl FnOnce(&mut AssignmentStore) -> T) -> T {
        f(&mut self.borrow_mut())
    }
}

impl BoardHandle for Mutex<AssignmentStore> {
    fn update<T>(&self, f: impl FnOnce(&mut AssignmentStore) -> T) -> T {
        let mut store = self.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut store)
    }
}
