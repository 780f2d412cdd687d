//! Filesystem-backed stream factory exposed as `IFileSystem`.
//!
//! Paths arrive as the platform's native NUL-terminated string: UTF-16 on
//! Windows, bytes elsewhere. Decoding them is confined to this module.

use std::ffi::c_void;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use crate::common::error::{ComResult, HResult};
use crate::common::ids::Guid;
use crate::object::domain::{ComClass, IUnknownVtbl, Implement, Interface};
use crate::object::ptr::ComPtr;
use crate::object::root::{guard, ComObject, Instance, UNKNOWN_VTBL};

use super::domain::{IReadStream, IWriteStream};
use super::service::{ReaderStream, WriterStream};

/// Native path character.
#[cfg(windows)]
pub type PathChar = u16;
#[cfg(not(windows))]
pub type PathChar = std::os::raw::c_char;

/// Decode a NUL-terminated native path.
///
/// # Safety
///
/// `raw` must be null or point to a NUL-terminated string.
pub unsafe fn path_from_raw(raw: *const PathChar) -> ComResult<PathBuf> {
    if raw.is_null() {
        return Err(HResult::E_POINTER);
    }
    decode(raw)
}

#[cfg(windows)]
unsafe fn decode(raw: *const u16) -> ComResult<PathBuf> {
    use std::ffi::OsString;
    use std::os::windows::ffi::OsStringExt;

    let mut len = 0;
    while *raw.add(len) != 0 {
        len += 1;
    }
    let wide = std::slice::from_raw_parts(raw, len);
    Ok(PathBuf::from(OsString::from_wide(wide)))
}

#[cfg(unix)]
unsafe fn decode(raw: *const std::os::raw::c_char) -> ComResult<PathBuf> {
    use std::ffi::{CStr, OsStr};
    use std::os::unix::ffi::OsStrExt;

    let bytes = CStr::from_ptr(raw).to_bytes();
    Ok(PathBuf::from(OsStr::from_bytes(bytes)))
}

#[cfg(not(any(unix, windows)))]
unsafe fn decode(raw: *const std::os::raw::c_char) -> ComResult<PathBuf> {
    let text = std::ffi::CStr::from_ptr(raw)
        .to_str()
        .map_err(|_| HResult::E_INVALIDARG)?;
    Ok(PathBuf::from(text))
}

pub enum IFileSystem {}

#[repr(C)]
pub struct IFileSystemVtbl {
    pub base: IUnknownVtbl,
    pub open_file: unsafe extern "system" fn(
        this: *mut c_void,
        path: *const PathChar,
        stream: *mut *mut c_void,
    ) -> HResult,
    pub create_file: unsafe extern "system" fn(
        this: *mut c_void,
        path: *const PathChar,
        stream: *mut *mut c_void,
    ) -> HResult,
}

unsafe impl Interface for IFileSystem {
    const IID: Guid = Guid::parse("d29d85bf-d6d1-4c4c-8989-ce9260debc60");
    type Vtbl = IFileSystemVtbl;
}

/// Server side of `IFileSystem`.
pub trait FileSystem: ComClass {
    fn open_file(&self, path: &Path) -> ComResult<ComPtr<IReadStream>>;
    fn create_file(&self, path: &Path) -> ComResult<ComPtr<IWriteStream>>;
}

unsafe fn stream_out<I: Interface>(
    out: *mut *mut c_void,
    make: impl FnOnce() -> ComResult<ComPtr<I>>,
) -> HResult {
    if out.is_null() {
        return HResult::E_POINTER;
    }
    *out = std::ptr::null_mut();
    match guard(make) {
        Ok(stream) => stream.detach(out),
        Err(code) => code,
    }
}

unsafe extern "system" fn open_file_thunk<C: FileSystem>(
    this: *mut c_void,
    path: *const PathChar,
    stream: *mut *mut c_void,
) -> HResult {
    stream_out(stream, || {
        let path = path_from_raw(path)?;
        ComObject::<C>::value_of(this).open_file(&path)
    })
}

unsafe extern "system" fn create_file_thunk<C: FileSystem>(
    this: *mut c_void,
    path: *const PathChar,
    stream: *mut *mut c_void,
) -> HResult {
    stream_out(stream, || {
        let path = path_from_raw(path)?;
        ComObject::<C>::value_of(this).create_file(&path)
    })
}

unsafe impl<C: FileSystem> Implement<C> for IFileSystem {
    const VTBL: &'static IFileSystemVtbl = &IFileSystemVtbl {
        base: UNKNOWN_VTBL,
        open_file: open_file_thunk::<C>,
        create_file: create_file_thunk::<C>,
    };
}

/// `IFileSystem` over `std::fs`.
#[derive(Default)]
pub struct NativeFileSystem;

impl ComClass for NativeFileSystem {
    type Primary = IFileSystem;
    const FREE_THREADED: bool = true;
}

impl FileSystem for NativeFileSystem {
    fn open_file(&self, path: &Path) -> ComResult<ComPtr<IReadStream>> {
        let stream = Instance::new(ReaderStream::<File>::default())?;
        stream.open(path)?;
        Ok(stream.into_interface())
    }

    fn create_file(&self, path: &Path) -> ComResult<ComPtr<IWriteStream>> {
        let stream = Instance::new(WriterStream::<BufWriter<File>>::default())?;
        stream.create(path)?;
        Ok(stream.into_interface())
    }
}

impl ComPtr<IFileSystem> {
    /// Open an existing file for reading.
    pub fn open_file(&self, path: &Path) -> ComResult<ComPtr<IReadStream>> {
        let native = NativePath::new(path)?;
        let mut out: *mut c_void = std::ptr::null_mut();
        unsafe {
            (self.vtbl().open_file)(self.as_raw(), native.as_ptr(), &mut out).ok()?;
            ComPtr::from_raw(out).ok_or(HResult::E_POINTER)
        }
    }

    /// Create or truncate a file for writing.
    pub fn create_file(&self, path: &Path) -> ComResult<ComPtr<IWriteStream>> {
        let native = NativePath::new(path)?;
        let mut out: *mut c_void = std::ptr::null_mut();
        unsafe {
            (self.vtbl().create_file)(self.as_raw(), native.as_ptr(), &mut out).ok()?;
            ComPtr::from_raw(out).ok_or(HResult::E_POINTER)
        }
    }
}

/// Owned NUL-terminated native path for outgoing calls.
struct NativePath(Vec<PathChar>);

impl NativePath {
    #[cfg(windows)]
    fn new(path: &Path) -> ComResult<Self> {
        use std::os::windows::ffi::OsStrExt;

        let mut wide: Vec<u16> = path.as_os_str().encode_wide().collect();
        if wide.contains(&0) {
            return Err(HResult::E_INVALIDARG);
        }
        wide.push(0);
        Ok(Self(wide))
    }

    #[cfg(not(windows))]
    fn new(path: &Path) -> ComResult<Self> {
        #[cfg(unix)]
        let bytes = {
            use std::os::unix::ffi::OsStrExt;
            path.as_os_str().as_bytes()
        };
        #[cfg(not(unix))]
        let bytes = path.to_str().ok_or(HResult::E_INVALIDARG)?.as_bytes();

        if bytes.contains(&0) {
            return Err(HResult::E_INVALIDARG);
        }
        let mut chars: Vec<PathChar> = bytes.iter().map(|&b| b as PathChar).collect();
        chars.push(0);
        Ok(Self(chars))
    }

    fn as_ptr(&self) -> *const PathChar {
        self.0.as_ptr()
    }
}
