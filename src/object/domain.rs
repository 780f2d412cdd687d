//! Interface contracts and the base capability every object exposes.
//!
//! An interface pointer is the address of a slot whose first word is a
//! pointer to that interface's vtable. Every vtable begins with the three
//! [`IUnknownVtbl`] entries in fixed order, so a caller that only knows the
//! base capability can still manage lifetime and probe for other contracts.

use std::ffi::c_void;

use crate::common::error::HResult;
use crate::common::ids::Guid;

pub type QueryInterfaceFn =
    unsafe extern "system" fn(this: *mut c_void, iid: *const Guid, out: *mut *mut c_void) -> HResult;
pub type AddRefFn = unsafe extern "system" fn(this: *mut c_void) -> u32;
pub type ReleaseFn = unsafe extern "system" fn(this: *mut c_void) -> u32;

/// Leading entries of every vtable.
#[repr(C)]
pub struct IUnknownVtbl {
    pub query_interface: QueryInterfaceFn,
    pub add_ref: AddRefFn,
    pub release: ReleaseFn,
}

/// A contract identified by a fixed 128-bit identifier.
///
/// # Safety
///
/// `Vtbl` must be `#[repr(C)]` and start with an [`IUnknownVtbl`].
pub unsafe trait Interface: 'static {
    const IID: Guid;
    type Vtbl: 'static;
}

/// The base capability.
pub enum IUnknown {}

unsafe impl Interface for IUnknown {
    const IID: Guid = Guid::parse("00000000-0000-0000-c000-000000000046");
    type Vtbl = IUnknownVtbl;
}

/// Thread-marshalling helper contract. Only its identity is modelled here;
/// the helper itself comes from the platform.
pub enum IMarshal {}

unsafe impl Interface for IMarshal {
    const IID: Guid = Guid::parse("00000003-0000-0000-c000-000000000046");
    type Vtbl = IUnknownVtbl;
}

/// Rust type that can be hosted in a reference-counted object.
pub trait ComClass: Sized + Send + Sync + 'static {
    /// Contract handed out by factories and answered for the base identifier.
    type Primary: Implement<Self>;

    /// Hand out the platform's free-threaded marshaller when asked for
    /// [`IMarshal`].
    const FREE_THREADED: bool = false;

    /// Explicit capability map, checked in declaration order.
    ///
    /// Empty means the object answers only for the base capability and
    /// `Primary`.
    fn capability_map() -> Vec<Capability> {
        Vec::new()
    }
}

/// Static vtable serving contract `Self` for class `C`.
///
/// # Safety
///
/// Every entry of `VTBL` must treat its `this` argument as an interface slot
/// of a `ComObject<C>`.
pub unsafe trait Implement<C: ComClass>: Interface {
    const VTBL: &'static Self::Vtbl;
}

/// One entry of a capability map.
#[derive(Copy, Clone, Debug)]
pub struct Capability {
    pub(crate) iid: Guid,
    pub(crate) vtbl: *const c_void,
}

impl Capability {
    pub fn of<I, C>() -> Self
    where
        I: Implement<C>,
        C: ComClass,
    {
        Self {
            iid: I::IID,
            vtbl: I::VTBL as *const I::Vtbl as *const c_void,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn well_known_identifiers() {
        assert_eq!(
            IUnknown::IID.to_string(),
            "00000000-0000-0000-c000-000000000046"
        );
        assert_eq!(IMarshal::IID.data1, 3);
        assert_ne!(IUnknown::IID, IMarshal::IID);
    }

    #[test]
    fn base_vtable_is_three_pointers() {
        assert_eq!(
            std::mem::size_of::<IUnknownVtbl>(),
            3 * std::mem::size_of::<usize>()
        );
    }
}
