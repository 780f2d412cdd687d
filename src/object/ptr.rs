//! Smart handle owning one reference to an interface.

use std::ffi::c_void;
use std::fmt;
use std::marker::PhantomData;
use std::ptr::{self, NonNull};

use crate::common::error::{ComResult, HResult};
use crate::common::ids::Guid;

use super::domain::{IUnknown, IUnknownVtbl, Interface};

/// Owned reference to contract `I`.
///
/// A live handle accounts for exactly one count on the object: cloning adds a
/// reference, dropping releases it. An empty handle is spelled
/// `Option<ComPtr<I>>`.
///
/// Handles are `Send` but not `Sync`. The count itself is thread safe, but
/// the methods behind a foreign object need not be: a clone moved to another
/// thread must not call into the same object concurrently unless the object
/// is free-threaded (it answers `IMarshal`). Objects built by this crate as
/// `ComClass` are `Send + Sync` and carry no such restriction.
#[repr(transparent)]
pub struct ComPtr<I: Interface> {
    raw: NonNull<c_void>,
    _iface: PhantomData<*const I>,
}

// The count is atomic; method bodies are not assumed to be thread safe, so
// only moving a handle between threads is allowed.
unsafe impl<I: Interface> Send for ComPtr<I> {}

impl<I: Interface> ComPtr<I> {
    /// Adopt a raw interface pointer, taking over the count it carries.
    ///
    /// # Safety
    ///
    /// `raw` must be null or a live pointer to contract `I` whose count the
    /// caller owns.
    pub unsafe fn from_raw(raw: *mut c_void) -> Option<Self> {
        NonNull::new(raw).map(|raw| Self {
            raw,
            _iface: PhantomData,
        })
    }

    pub(crate) unsafe fn from_raw_unchecked(raw: *mut c_void) -> Self {
        Self {
            raw: NonNull::new_unchecked(raw),
            _iface: PhantomData,
        }
    }

    /// Take a new reference on a borrowed raw pointer.
    ///
    /// # Safety
    ///
    /// `raw` must be null or a live pointer to contract `I`.
    pub unsafe fn from_borrowed(raw: *mut c_void) -> Option<Self> {
        let this = Self::from_raw(raw)?;
        (this.unknown_vtbl().add_ref)(this.as_raw());
        Some(this)
    }

    pub fn as_raw(&self) -> *mut c_void {
        self.raw.as_ptr()
    }

    /// Give up the handle without releasing; the caller now owns the count.
    pub fn into_raw(self) -> *mut c_void {
        let raw = self.as_raw();
        std::mem::forget(self);
        raw
    }

    /// Move the owned count into an output slot.
    ///
    /// A null slot releases the reference and returns `E_POINTER`.
    ///
    /// # Safety
    ///
    /// `out` must be null or valid for writes.
    pub unsafe fn detach(self, out: *mut *mut c_void) -> HResult {
        if out.is_null() {
            return HResult::E_POINTER;
        }
        *out = self.into_raw();
        HResult::S_OK
    }

    pub fn vtbl(&self) -> &I::Vtbl {
        unsafe { &**(self.raw.as_ptr() as *const *const I::Vtbl) }
    }

    pub fn unknown_vtbl(&self) -> &IUnknownVtbl {
        unsafe { &**(self.raw.as_ptr() as *const *const IUnknownVtbl) }
    }

    /// Ask the object for contract `J`.
    pub fn query<J: Interface>(&self) -> ComResult<ComPtr<J>> {
        let raw = self.query_raw(&J::IID)?;
        Ok(ComPtr {
            raw,
            _iface: PhantomData,
        })
    }

    /// Ask the object for an arbitrary identifier; the pointer carries a count.
    pub fn query_raw(&self, iid: &Guid) -> ComResult<NonNull<c_void>> {
        let mut out: *mut c_void = ptr::null_mut();
        let hr = unsafe { (self.unknown_vtbl().query_interface)(self.as_raw(), iid, &mut out) };
        hr.ok()?;
        NonNull::new(out).ok_or(HResult::E_POINTER)
    }

    /// Identity comparison through the base capability.
    pub fn same_object<J: Interface>(&self, other: &ComPtr<J>) -> bool {
        match (self.query::<IUnknown>(), other.query::<IUnknown>()) {
            (Ok(a), Ok(b)) => a.as_raw() == b.as_raw(),
            _ => false,
        }
    }

    /// Current count, observed through an add-ref/release pair.
    #[cfg(test)]
    pub(crate) fn ref_count(&self) -> u32 {
        let base = self.unknown_vtbl();
        unsafe {
            let count = (base.add_ref)(self.as_raw());
            (base.release)(self.as_raw());
            count - 1
        }
    }
}

impl<I: Interface> Clone for ComPtr<I> {
    fn clone(&self) -> Self {
        unsafe {
            (self.unknown_vtbl().add_ref)(self.as_raw());
        }
        Self {
            raw: self.raw,
            _iface: PhantomData,
        }
    }
}

impl<I: Interface> Drop for ComPtr<I> {
    fn drop(&mut self) {
        unsafe {
            (self.unknown_vtbl().release)(self.as_raw());
        }
    }
}

impl<I: Interface> fmt::Debug for ComPtr<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComPtr")
            .field("iid", &I::IID)
            .field("raw", &self.raw)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::object::root::tests::{tracked, IProbe};

    #[test]
    fn clone_and_drop_balance() {
        let (object, drops) = tracked(1);
        let copy = object.clone();
        assert_eq!(object.ref_count(), 2);
        drop(copy);
        assert_eq!(object.ref_count(), 1);
        drop(object);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn reassignment_releases_the_previous_object() {
        let (first, first_drops) = tracked(1);
        let (second, second_drops) = tracked(2);
        let mut slot = Some(first);
        slot = Some(second.clone());
        assert_eq!(first_drops.load(Ordering::SeqCst), 1);
        assert_eq!(second.ref_count(), 2);
        slot = None;
        assert!(slot.is_none());
        assert_eq!(second.ref_count(), 1);
        assert_eq!(second_drops.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn detach_moves_the_count_out() {
        let (object, drops) = tracked(1);
        let keep = object.clone();
        let mut out: *mut c_void = ptr::null_mut();
        assert_eq!(unsafe { object.detach(&mut out) }, HResult::S_OK);
        assert_eq!(out, keep.as_raw());
        assert_eq!(keep.ref_count(), 2);

        let adopted = unsafe { ComPtr::<IProbe>::from_raw(out) }.unwrap();
        drop((adopted, keep));
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn detach_into_null_releases() {
        let (object, drops) = tracked(1);
        assert_eq!(unsafe { object.detach(ptr::null_mut()) }, HResult::E_POINTER);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn borrowed_pointer_takes_its_own_reference() {
        let (object, _drops) = tracked(1);
        let borrowed = unsafe { ComPtr::<IProbe>::from_borrowed(object.as_raw()) }.unwrap();
        assert_eq!(object.ref_count(), 2);
        assert!(borrowed.same_object(&object));
        assert!(unsafe { ComPtr::<IProbe>::from_borrowed(ptr::null_mut()) }.is_none());
    }
}
