//! Free-threaded marshaller hook.
//!
//! Some hosts only call an object from several threads when it hands out a
//! thread-marshalling helper for `IMarshal`. Objects that opt in create the
//! helper lazily through a [`MarshalHost`] and keep it for their lifetime.

use std::ffi::c_void;
use std::ptr::NonNull;

use once_cell::sync::OnceCell;

use crate::common::error::{ComResult, HResult};
use crate::common::log::{self, Level};

use super::domain::IUnknown;
use super::ptr::ComPtr;

/// Source of thread-marshalling helpers.
pub trait MarshalHost: Send + Sync {
    /// Create a helper aggregated by `outer`, or `None` when the platform has
    /// no marshalling host.
    ///
    /// # Safety
    ///
    /// `outer` is the controlling object's base interface. The helper must not
    /// keep a counted reference to it.
    unsafe fn create(&self, outer: NonNull<c_void>) -> ComResult<Option<ComPtr<IUnknown>>>;
}

/// Host backed by the operating system.
pub struct PlatformMarshalHost;

#[cfg(windows)]
#[link(name = "ole32")]
extern "system" {
    fn CoCreateFreeThreadedMarshaler(outer: *mut c_void, marshal: *mut *mut c_void) -> HResult;
}

impl MarshalHost for PlatformMarshalHost {
    #[cfg(windows)]
    unsafe fn create(&self, outer: NonNull<c_void>) -> ComResult<Option<ComPtr<IUnknown>>> {
        let mut helper: *mut c_void = std::ptr::null_mut();
        CoCreateFreeThreadedMarshaler(outer.as_ptr(), &mut helper).ok()?;
        Ok(ComPtr::from_raw(helper))
    }

    #[cfg(not(windows))]
    unsafe fn create(&self, _outer: NonNull<c_void>) -> ComResult<Option<ComPtr<IUnknown>>> {
        Ok(None)
    }
}

static HOST: OnceCell<Box<dyn MarshalHost>> = OnceCell::new();

/// Replace the platform host. Only the first call before any helper has been
/// created takes effect; later calls hand the host back.
pub fn install_marshal_host(host: Box<dyn MarshalHost>) -> Result<(), Box<dyn MarshalHost>> {
    HOST.set(host)
}

fn host() -> &'static dyn MarshalHost {
    HOST.get_or_init(|| Box::new(PlatformMarshalHost)).as_ref()
}

pub(crate) unsafe fn create_helper(outer: *mut c_void) -> ComResult<Option<ComPtr<IUnknown>>> {
    let outer = NonNull::new(outer).ok_or(HResult::E_POINTER)?;
    let helper = host().create(outer);
    match &helper {
        Ok(Some(_)) => log::log_json(Level::Debug, "marshal", "helper_created", HResult::S_OK, None),
        Ok(None) => {}
        Err(code) => log::log_json(Level::Error, "marshal", "helper_failed", *code, None),
    }
    helper
}
