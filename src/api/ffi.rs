//! Exported entry points.
//!
//! Each factory takes only an output slot, allocates a new object with a count
//! of one and moves that reference into the slot. Callers resolve them by name
//! after loading the library; no registry is involved.

use std::ffi::c_void;
use std::ptr;

use crate::calc::Calculator;
use crate::common::error::{ComResult, HResult};
use crate::common::log::{self, Level};
use crate::object::domain::Interface;
use crate::object::ptr::ComPtr;
use crate::object::root::{create, guard};
use crate::streams::NativeFileSystem;

/// ABI version; bumped whenever an exported signature or identifier changes.
pub const API_VERSION: u32 = 1;

#[no_mangle]
pub extern "system" fn comlight_api_version() -> u32 {
    API_VERSION
}

/// Sign-bit test for callers that lack a `FAILED` macro.
#[no_mangle]
pub extern "system" fn comlight_hresult_failed(code: HResult) -> bool {
    code.failed()
}

/// Create a calculator and return its `ICalculator`.
///
/// # Safety
///
/// `out` must be null or valid for writes.
#[no_mangle]
pub unsafe extern "system" fn comlight_create_calculator(out: *mut *mut c_void) -> HResult {
    export(out, "create_calculator", || create(Calculator::default()))
}

/// Create a native file system and return its `IFileSystem`.
///
/// # Safety
///
/// `out` must be null or valid for writes.
#[no_mangle]
pub unsafe extern "system" fn comlight_create_file_system(out: *mut *mut c_void) -> HResult {
    export(out, "create_file_system", || create(NativeFileSystem))
}

unsafe fn export<I: Interface>(
    out: *mut *mut c_void,
    event: &str,
    make: impl FnOnce() -> ComResult<ComPtr<I>>,
) -> HResult {
    if out.is_null() {
        return HResult::E_POINTER;
    }
    *out = ptr::null_mut();
    match guard(make) {
        Ok(object) => object.detach(out),
        Err(code) => {
            log::log_json(Level::Error, "api", event, code, None);
            code
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calc::{IAccumulator, ICalculator};
    use crate::object::domain::IUnknown;
    use crate::streams::IFileSystem;

    #[test]
    fn api_version_is_stable() {
        assert_eq!(comlight_api_version(), 1);
    }

    #[test]
    fn failure_predicate_matches_sign_bit() {
        assert!(comlight_hresult_failed(HResult::E_EOF));
        assert!(!comlight_hresult_failed(HResult::S_FALSE));
    }

    #[test]
    fn calculator_factory_hands_out_one_reference() {
        let mut raw: *mut c_void = ptr::null_mut();
        assert_eq!(unsafe { comlight_create_calculator(&mut raw) }, HResult::S_OK);
        let calc = unsafe { ComPtr::<ICalculator>::from_raw(raw) }.unwrap();
        assert_eq!(calc.ref_count(), 1);
        assert_eq!(calc.add(20, 22), Ok(42));
        assert!(calc.query::<IAccumulator>().is_ok());
        assert!(calc.query::<IUnknown>().is_ok());
        assert_eq!(calc.query::<IFileSystem>().err(), Some(HResult::E_NOINTERFACE));
    }

    #[test]
    fn file_system_factory_answers_its_contract() {
        let mut raw: *mut c_void = ptr::null_mut();
        assert_eq!(unsafe { comlight_create_file_system(&mut raw) }, HResult::S_OK);
        let fs = unsafe { ComPtr::<IFileSystem>::from_raw(raw) }.unwrap();
        assert_eq!(fs.ref_count(), 1);
        assert_eq!(fs.query::<ICalculator>().err(), Some(HResult::E_NOINTERFACE));
    }

    #[test]
    fn factories_reject_null_slots() {
        assert_eq!(
            unsafe { comlight_create_calculator(ptr::null_mut()) },
            HResult::E_POINTER
        );
        assert_eq!(
            unsafe { comlight_create_file_system(ptr::null_mut()) },
            HResult::E_POINTER
        );
    }
}
