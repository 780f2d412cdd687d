//! Status codes shared by both sides of the boundary.
//!
//! Every fallible operation returns an `HResult`. Inside the crate the code is
//! carried as the error half of [`ComResult`] so failures short-circuit with
//! `?` and get folded back into a raw code at the ABI edge.

use std::fmt;
use std::io;

use thiserror::Error;

/// Facility used when wrapping platform error numbers.
const FACILITY_WIN32: u32 = 7;

/// Platform error number for "reached the end of the file".
pub const ERROR_HANDLE_EOF: u32 = 38;

/// Signed status code, binary compatible with a Windows `HRESULT`.
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Hash, Error)]
#[error("{} (0x{:08X})", describe(.0), .0)]
pub struct HResult(pub i32);

/// Result alias used throughout the crate.
pub type ComResult<T> = Result<T, HResult>;

const fn hr(code: u32) -> HResult {
    HResult(code as i32)
}

impl HResult {
    pub const S_OK: Self = hr(0);
    pub const S_FALSE: Self = hr(1);
    pub const E_NOTIMPL: Self = hr(0x8000_4001);
    pub const E_NOINTERFACE: Self = hr(0x8000_4002);
    pub const E_POINTER: Self = hr(0x8000_4003);
    pub const E_FAIL: Self = hr(0x8000_4005);
    pub const E_UNEXPECTED: Self = hr(0x8000_FFFF);
    pub const E_OUTOFMEMORY: Self = hr(0x8007_000E);
    pub const E_INVALIDARG: Self = hr(0x8007_0057);
    /// The object has no underlying resource yet (or it was closed).
    pub const OLE_E_BLANK: Self = hr(0x8004_0007);
    pub const DISP_E_OVERFLOW: Self = hr(0x8002_000A);
    pub const CTL_E_DEVICEIOERROR: Self = hr(0x800A_0039);
    /// Read past the end of data.
    pub const E_EOF: Self = Self::from_win32(ERROR_HANDLE_EOF);

    /// Wrap a platform error number into the failure space.
    ///
    /// Values that are already zero or negative are returned unchanged, so
    /// wrapping an existing failure code is a no-op.
    pub const fn from_win32(code: u32) -> Self {
        if code as i32 <= 0 {
            Self(code as i32)
        } else {
            hr((code & 0xFFFF) | (FACILITY_WIN32 << 16) | 0x8000_0000)
        }
    }

    pub const fn failed(self) -> bool {
        self.0 < 0
    }

    pub const fn succeeded(self) -> bool {
        !self.failed()
    }

    /// `Ok(())` for success codes, `Err(self)` otherwise.
    pub fn ok(self) -> ComResult<()> {
        if self.failed() {
            Err(self)
        } else {
            Ok(())
        }
    }

    /// Fold a result back into a raw code.
    pub fn from_result(result: ComResult<()>) -> Self {
        match result {
            Ok(()) => Self::S_OK,
            Err(code) => code,
        }
    }

    /// Unsigned view, handy for logs and hex dumps.
    pub const fn bits(self) -> u32 {
        self.0 as u32
    }
}

impl fmt::Debug for HResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HResult(0x{:08X})", self.bits())
    }
}

impl From<HResult> for io::Error {
    fn from(code: HResult) -> Self {
        let kind = match code {
            HResult::E_EOF => io::ErrorKind::UnexpectedEof,
            HResult::E_NOTIMPL => io::ErrorKind::Unsupported,
            HResult::E_INVALIDARG | HResult::E_POINTER => io::ErrorKind::InvalidInput,
            HResult::E_OUTOFMEMORY => io::ErrorKind::OutOfMemory,
            _ => io::ErrorKind::Other,
        };
        io::Error::new(kind, code)
    }
}

fn describe(code: &i32) -> &'static str {
    match HResult(*code) {
        HResult::S_OK => "success",
        HResult::S_FALSE => "success (false)",
        HResult::E_NOTIMPL => "not implemented",
        HResult::E_NOINTERFACE => "no such interface supported",
        HResult::E_POINTER => "invalid pointer",
        HResult::E_FAIL => "unspecified failure",
        HResult::E_UNEXPECTED => "catastrophic failure",
        HResult::E_OUTOFMEMORY => "out of memory",
        HResult::E_INVALIDARG => "invalid argument",
        HResult::OLE_E_BLANK => "uninitialized object",
        HResult::DISP_E_OVERFLOW => "arithmetic overflow",
        HResult::CTL_E_DEVICEIOERROR => "device I/O error",
        HResult::E_EOF => "reached the end of the file",
        other if other.succeeded() => "success",
        _ => "failure",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(HResult::S_OK.bits(), 0);
        assert_eq!(HResult::S_FALSE.bits(), 1);
        assert_eq!(HResult::E_NOTIMPL.bits(), 0x8000_4001);
        assert_eq!(HResult::E_NOINTERFACE.bits(), 0x8000_4002);
        assert_eq!(HResult::E_POINTER.bits(), 0x8000_4003);
        assert_eq!(HResult::OLE_E_BLANK.bits(), 0x8004_0007);
        assert_eq!(HResult::DISP_E_OVERFLOW.bits(), 0x8002_000A);
        assert_eq!(HResult::CTL_E_DEVICEIOERROR.bits(), 0x800A_0039);
        assert_eq!(HResult::E_EOF.bits(), 0x8007_0026);
    }

    #[test]
    fn failed_and_succeeded_partition_every_code() {
        let samples = [
            i32::MIN,
            -1,
            0,
            1,
            i32::MAX,
            HResult::E_EOF.0,
            HResult::S_FALSE.0,
            0x0004_0000,
        ];
        for raw in samples {
            let code = HResult(raw);
            assert_ne!(code.failed(), code.succeeded(), "{code:?}");
        }
        for shift in 0..32 {
            let code = HResult((1u32 << shift) as i32);
            assert_eq!(code.failed(), shift == 31);
            assert_ne!(code.failed(), code.succeeded());
        }
    }

    #[test]
    fn win32_wrapping_is_idempotent_on_failures() {
        assert_eq!(HResult::from_win32(ERROR_HANDLE_EOF), HResult::E_EOF);
        assert_eq!(HResult::from_win32(HResult::E_EOF.bits()), HResult::E_EOF);
        assert_eq!(HResult::from_win32(0), HResult::S_OK);
        assert_eq!(HResult::from_win32(2).bits(), 0x8007_0002);
        assert!(HResult::from_win32(5).failed());
    }

    #[test]
    fn ok_and_from_result_round_trip() {
        assert_eq!(HResult::S_FALSE.ok(), Ok(()));
        assert_eq!(HResult::E_FAIL.ok(), Err(HResult::E_FAIL));
        assert_eq!(HResult::from_result(Ok(())), HResult::S_OK);
        assert_eq!(
            HResult::from_result(Err(HResult::OLE_E_BLANK)),
            HResult::OLE_E_BLANK
        );
    }

    #[test]
    fn display_names_the_failure() {
        let text = HResult::E_EOF.to_string();
        assert!(text.contains("end of the file"), "{text}");
        assert!(text.contains("0x80070026"), "{text}");
        assert_eq!(
            io::Error::from(HResult::E_EOF).kind(),
            io::ErrorKind::UnexpectedEof
        );
    }
}
