//! Lock helper shared by objects that guard state with a mutex.
//!
//! A panic inside an object method is reported as `E_UNEXPECTED` at the ABI
//! edge; the state it was touching stays usable, so poisoning is ignored.

use std::sync::{Mutex, MutexGuard, PoisonError};

pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}
