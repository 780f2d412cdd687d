//! Reference-counted object root.
//!
//! A [`ComObject`] is a single heap allocation holding a shared header and the
//! hosted Rust value. The header owns one interface slot per supported
//! contract; each slot carries its vtable pointer and a back pointer to the
//! header, so the three base entries are the same functions for every slot of
//! every object.

use std::alloc::{alloc, Layout};
use std::ffi::c_void;
use std::marker::PhantomData;
use std::ops::Deref;
use std::panic::{self, AssertUnwindSafe};
use std::ptr::{self, NonNull};
use std::sync::atomic::{fence, AtomicU32, Ordering};

use once_cell::sync::OnceCell;

use crate::common::config;
use crate::common::error::{ComResult, HResult};
use crate::common::ids::Guid;
use crate::common::log::{self, Level};

use super::domain::{ComClass, IMarshal, IUnknown, IUnknownVtbl, Implement, Interface};
use super::marshal;
use super::ptr::ComPtr;

/// Base entries shared by every vtable built in this crate.
pub const UNKNOWN_VTBL: IUnknownVtbl = IUnknownVtbl {
    query_interface: query_interface_thunk,
    add_ref: add_ref_thunk,
    release: release_thunk,
};

unsafe impl<C: ComClass> Implement<C> for IUnknown {
    const VTBL: &'static IUnknownVtbl = &UNKNOWN_VTBL;
}

/// What an interface pointer points at.
#[repr(C)]
struct Slot {
    vtbl: *const c_void,
    header: *const Header,
}

#[repr(C)]
struct Header {
    refs: AtomicU32,
    /// Slot 0 always serves the primary contract.
    slots: Box<[Slot]>,
    /// Identifier to slot index, in declaration order.
    map: Box<[(Guid, usize)]>,
    free_threaded: bool,
    marshaller: OnceCell<Option<ComPtr<IUnknown>>>,
    destroy: unsafe fn(*const Header),
    class: &'static str,
}

/// Heap object hosting a `C`.
#[repr(C)]
pub struct ComObject<C: ComClass> {
    header: Header,
    value: C,
}

impl<C: ComClass> ComObject<C> {
    /// Allocate a new object with a count of one.
    fn allocate(value: C) -> ComResult<NonNull<Self>> {
        let primary = <C::Primary as Interface>::IID;
        let declared = C::capability_map();

        let mut slots: Vec<Slot> = Vec::new();
        slots
            .try_reserve_exact(declared.len() + 1)
            .map_err(|_| HResult::E_OUTOFMEMORY)?;
        slots.push(Slot {
            vtbl: <C::Primary as Implement<C>>::VTBL as *const _ as *const c_void,
            header: ptr::null(),
        });

        // The primary contract always answers from slot 0, declared or not.
        let mut map: Vec<(Guid, usize)> = Vec::new();
        map.try_reserve_exact(declared.len() + 1)
            .map_err(|_| HResult::E_OUTOFMEMORY)?;
        map.push((primary, 0));
        for entry in &declared {
            if map.iter().all(|(iid, _)| *iid != entry.iid) {
                slots.push(Slot {
                    vtbl: entry.vtbl,
                    header: ptr::null(),
                });
                map.push((entry.iid, slots.len() - 1));
            }
        }

        let layout = Layout::new::<Self>();
        // SAFETY: the layout always has a non-zero size, the header is never empty.
        let raw = unsafe { alloc(layout) } as *mut Self;
        let object = NonNull::new(raw).ok_or(HResult::E_OUTOFMEMORY)?;

        let free_threaded = C::FREE_THREADED && config::cfg().free_threaded;
        unsafe {
            object.as_ptr().write(Self {
                header: Header {
                    refs: AtomicU32::new(1),
                    slots: slots.into_boxed_slice(),
                    map: map.into_boxed_slice(),
                    free_threaded,
                    marshaller: OnceCell::new(),
                    destroy: destroy::<C>,
                    class: std::any::type_name::<C>(),
                },
                value,
            });
            // Slots learn the header address once the object has its final home.
            let header = ptr::addr_of!((*object.as_ptr()).header);
            for slot in (*object.as_ptr()).header.slots.iter_mut() {
                slot.header = header;
            }
        }

        log::log_json(
            Level::Debug,
            "object",
            "created",
            HResult::S_OK,
            Some(std::any::type_name::<C>()),
        );
        Ok(object)
    }

    /// Recover the hosted value behind an interface pointer of this class.
    ///
    /// # Safety
    ///
    /// `this` must be a live interface pointer of a `ComObject<C>`.
    pub(crate) unsafe fn value_of<'a>(this: *mut c_void) -> &'a C {
        &(*(header_of(this) as *const Self)).value
    }
}

unsafe fn destroy<C: ComClass>(header: *const Header) {
    let class = (*header).class;
    // Allocated in `allocate` with the global allocator and `Layout::new::<Self>()`.
    drop(Box::from_raw(header as *mut ComObject<C>));
    log::log_json(Level::Debug, "object", "destroyed", HResult::S_OK, Some(class));
}

/// Header behind an interface slot, keeping the allocation's provenance.
unsafe fn header_of(this: *mut c_void) -> *const Header {
    (*(this as *const Slot)).header
}

fn slot_ptr(header: &Header, index: usize) -> *mut c_void {
    &header.slots[index] as *const Slot as *mut c_void
}

impl Header {
    fn primary(&self) -> *mut c_void {
        slot_ptr(self, 0)
    }

    /// Find a slot answering `iid`; the returned pointer carries a new count.
    fn query(&self, iid: &Guid) -> ComResult<*mut c_void> {
        let found = if *iid == IUnknown::IID {
            Some(self.primary())
        } else {
            self.map
                .iter()
                .find(|(candidate, _)| candidate == iid)
                .map(|&(_, index)| slot_ptr(self, index))
        };
        if let Some(slot) = found {
            self.refs.fetch_add(1, Ordering::Relaxed);
            return Ok(slot);
        }
        if *iid == IMarshal::IID && self.free_threaded {
            return self.query_marshaller(iid);
        }
        Err(HResult::E_NOINTERFACE)
    }

    fn query_marshaller(&self, iid: &Guid) -> ComResult<*mut c_void> {
        let outer = self.primary();
        let helper = self
            .marshaller
            .get_or_try_init(|| unsafe { marshal::create_helper(outer) })?;
        match helper {
            Some(helper) => helper.query_raw(iid).map(NonNull::as_ptr),
            None => Err(HResult::E_NOINTERFACE),
        }
    }
}

unsafe extern "system" fn query_interface_thunk(
    this: *mut c_void,
    iid: *const Guid,
    out: *mut *mut c_void,
) -> HResult {
    if out.is_null() {
        return HResult::E_POINTER;
    }
    *out = ptr::null_mut();
    if iid.is_null() {
        return HResult::E_INVALIDARG;
    }
    let header = &*header_of(this);
    match guard(|| header.query(&*iid)) {
        Ok(slot) => {
            *out = slot;
            HResult::S_OK
        }
        Err(code) => code,
    }
}

unsafe extern "system" fn add_ref_thunk(this: *mut c_void) -> u32 {
    (*header_of(this)).refs.fetch_add(1, Ordering::Relaxed) + 1
}

unsafe extern "system" fn release_thunk(this: *mut c_void) -> u32 {
    let header = header_of(this);
    let previous = (*header).refs.fetch_sub(1, Ordering::Release);
    debug_assert!(previous != 0, "release on a destroyed object");
    if previous != 1 {
        return previous - 1;
    }
    fence(Ordering::Acquire);
    ((*header).destroy)(header);
    0
}

/// Run an interface method body, turning a panic into `E_UNEXPECTED` so it
/// never unwinds into the caller's frames.
pub(crate) fn guard<T>(body: impl FnOnce() -> ComResult<T>) -> ComResult<T> {
    match panic::catch_unwind(AssertUnwindSafe(body)) {
        Ok(result) => result,
        Err(_) => {
            log::log_json(Level::Error, "object", "panic", HResult::E_UNEXPECTED, None);
            Err(HResult::E_UNEXPECTED)
        }
    }
}

/// Owned reference to a whole object, with direct access to the hosted value.
pub struct Instance<C: ComClass> {
    object: NonNull<ComObject<C>>,
    _owns: PhantomData<ComObject<C>>,
}

unsafe impl<C: ComClass> Send for Instance<C> {}
unsafe impl<C: ComClass> Sync for Instance<C> {}

impl<C: ComClass> Instance<C> {
    /// Allocate a new object hosting `value`.
    pub fn new(value: C) -> ComResult<Self> {
        Ok(Self {
            object: ComObject::allocate(value)?,
            _owns: PhantomData,
        })
    }

    fn header(&self) -> &Header {
        unsafe { &self.object.as_ref().header }
    }

    /// Reference to the primary contract.
    pub fn interface(&self) -> ComPtr<C::Primary> {
        let header = self.header();
        header.refs.fetch_add(1, Ordering::Relaxed);
        unsafe { ComPtr::from_raw_unchecked(header.primary()) }
    }

    /// Trade this handle for a reference to the primary contract without
    /// touching the count.
    pub fn into_interface(self) -> ComPtr<C::Primary> {
        let raw = self.header().primary();
        std::mem::forget(self);
        unsafe { ComPtr::from_raw_unchecked(raw) }
    }

    pub fn query<I: Interface>(&self) -> ComResult<ComPtr<I>> {
        let raw = self.header().query(&I::IID)?;
        Ok(unsafe { ComPtr::from_raw_unchecked(raw) })
    }
}

impl<C: ComClass> Deref for Instance<C> {
    type Target = C;

    fn deref(&self) -> &C {
        unsafe { &self.object.as_ref().value }
    }
}

impl<C: ComClass> Clone for Instance<C> {
    fn clone(&self) -> Self {
        self.header().refs.fetch_add(1, Ordering::Relaxed);
        Self {
            object: self.object,
            _owns: PhantomData,
        }
    }
}

impl<C: ComClass> Drop for Instance<C> {
    fn drop(&mut self) {
        unsafe {
            release_thunk(self.header().primary());
        }
    }
}

/// Create an object and return its primary contract.
pub fn create<C: ComClass>(value: C) -> ComResult<ComPtr<C::Primary>> {
    Instance::new(value).map(Instance::into_interface)
}
