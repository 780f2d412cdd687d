//! Stream contracts and their vtables.
//!
//! `IReadStream` is a readable, seekable byte stream; `IWriteStream` is a
//! sequential, flushable byte sink. Implementations supply the [`ReadStream`]
//! and [`WriteStream`] traits; the thunks below validate the raw arguments and
//! never let a panic cross the boundary.

use std::ffi::c_void;
use std::slice;

use crate::common::error::{ComResult, HResult};
use crate::common::ids::Guid;
use crate::object::domain::{ComClass, IUnknownVtbl, Implement, Interface};
use crate::object::root::{guard, ComObject, UNKNOWN_VTBL};

/// Reference point for `seek`.
#[repr(u8)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SeekOrigin {
    Begin = 0,
    Current = 1,
    End = 2,
}

impl TryFrom<u8> for SeekOrigin {
    type Error = HResult;

    fn try_from(raw: u8) -> ComResult<Self> {
        match raw {
            0 => Ok(SeekOrigin::Begin),
            1 => Ok(SeekOrigin::Current),
            2 => Ok(SeekOrigin::End),
            _ => Err(HResult::E_INVALIDARG),
        }
    }
}

pub enum IReadStream {}

#[repr(C)]
pub struct IReadStreamVtbl {
    pub base: IUnknownVtbl,
    /// Read up to `count` bytes into `buffer[offset..offset + count]`.
    pub read: unsafe extern "system" fn(
        this: *mut c_void,
        buffer: *mut u8,
        buffer_length: i32,
        offset: i32,
        count: i32,
        read: *mut i32,
    ) -> HResult,
    pub seek: unsafe extern "system" fn(this: *mut c_void, offset: i64, origin: u8) -> HResult,
    pub get_position: unsafe extern "system" fn(this: *mut c_void, position: *mut i64) -> HResult,
    pub get_length: unsafe extern "system" fn(this: *mut c_void, length: *mut i64) -> HResult,
}

unsafe impl Interface for IReadStream {
    const IID: Guid = Guid::parse("7e2d9b14-0c6a-4a8f-b351-92f4e6d8a07c");
    type Vtbl = IReadStreamVtbl;
}

pub enum IWriteStream {}

#[repr(C)]
pub struct IWriteStreamVtbl {
    pub base: IUnknownVtbl,
    pub write: unsafe extern "system" fn(this: *mut c_void, buffer: *const u8, count: i32) -> HResult,
    pub flush: unsafe extern "system" fn(this: *mut c_void) -> HResult,
}

unsafe impl Interface for IWriteStream {
    const IID: Guid = Guid::parse("d7c3eb39-9170-43b9-ba98-2ea1f2fed8a8");
    type Vtbl = IWriteStreamVtbl;
}

/// Server side of `IReadStream`.
pub trait ReadStream: ComClass {
    /// Read into `buf`, returning how many bytes were produced. Zero means the
    /// end of data.
    fn read(&self, buf: &mut [u8]) -> ComResult<usize>;

    /// Non-seekable streams keep the default.
    fn seek(&self, _offset: i64, _origin: SeekOrigin) -> ComResult<()> {
        Err(HResult::E_NOTIMPL)
    }

    fn position(&self) -> ComResult<i64>;

    fn length(&self) -> ComResult<i64> {
        Err(HResult::E_NOTIMPL)
    }
}

/// Server side of `IWriteStream`.
pub trait WriteStream: ComClass {
    /// Write all of `data` or fail.
    fn write(&self, data: &[u8]) -> ComResult<()>;

    fn flush(&self) -> ComResult<()>;
}

/// Validate an `offset`/`count` window inside a buffer of `length` bytes.
fn window(length: i32, offset: i32, count: i32) -> ComResult<(usize, usize)> {
    if length < 0 || offset < 0 || count < 0 {
        return Err(HResult::E_INVALIDARG);
    }
    if offset as i64 + count as i64 > length as i64 {
        return Err(HResult::E_INVALIDARG);
    }
    Ok((offset as usize, count as usize))
}

unsafe extern "system" fn read_thunk<C: ReadStream>(
    this: *mut c_void,
    buffer: *mut u8,
    buffer_length: i32,
    offset: i32,
    count: i32,
    read: *mut i32,
) -> HResult {
    if read.is_null() {
        return HResult::E_POINTER;
    }
    *read = 0;
    HResult::from_result(guard(|| {
        let (offset, count) = window(buffer_length, offset, count)?;
        let dest: &mut [u8] = if count == 0 {
            &mut []
        } else if buffer.is_null() {
            return Err(HResult::E_POINTER);
        } else {
            slice::from_raw_parts_mut(buffer.add(offset), count)
        };
        let produced = ComObject::<C>::value_of(this).read(dest)?;
        *read = produced.min(count) as i32;
        Ok(())
    }))
}

unsafe extern "system" fn seek_thunk<C: ReadStream>(this: *mut c_void, offset: i64, origin: u8) -> HResult {
    HResult::from_result(guard(|| {
        let origin = SeekOrigin::try_from(origin)?;
        ComObject::<C>::value_of(this).seek(offset, origin)
    }))
}

unsafe extern "system" fn get_position_thunk<C: ReadStream>(this: *mut c_void, position: *mut i64) -> HResult {
    if position.is_null() {
        return HResult::E_POINTER;
    }
    HResult::from_result(guard(|| {
        *position = ComObject::<C>::value_of(this).position()?;
        Ok(())
    }))
}

unsafe extern "system" fn get_length_thunk<C: ReadStream>(this: *mut c_void, length: *mut i64) -> HResult {
    if length.is_null() {
        return HResult::E_POINTER;
    }
    HResult::from_result(guard(|| {
        *length = ComObject::<C>::value_of(this).length()?;
        Ok(())
    }))
}

unsafe impl<C: ReadStream> Implement<C> for IReadStream {
    const VTBL: &'static IReadStreamVtbl = &IReadStreamVtbl {
        base: UNKNOWN_VTBL,
        read: read_thunk::<C>,
        seek: seek_thunk::<C>,
        get_position: get_position_thunk::<C>,
        get_length: get_length_thunk::<C>,
    };
}

unsafe extern "system" fn write_thunk<C: WriteStream>(this: *mut c_void, buffer: *const u8, count: i32) -> HResult {
    HResult::from_result(guard(|| {
        let data: &[u8] = match count {
            c if c < 0 => return Err(HResult::E_INVALIDARG),
            0 => &[],
            _ if buffer.is_null() => return Err(HResult::E_POINTER),
            c => slice::from_raw_parts(buffer, c as usize),
        };
        ComObject::<C>::value_of(this).write(data)
    }))
}

unsafe extern "system" fn flush_thunk<C: WriteStream>(this: *mut c_void) -> HResult {
    HResult::from_result(guard(|| ComObject::<C>::value_of(this).flush()))
}

unsafe impl<C: WriteStream> Implement<C> for IWriteStream {
    const VTBL: &'static IWriteStreamVtbl = &IWriteStreamVtbl {
        base: UNKNOWN_VTBL,
        write: write_thunk::<C>,
        flush: flush_thunk::<C>,
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seek_origins_match_wire_values() {
        assert_eq!(SeekOrigin::try_from(0), Ok(SeekOrigin::Begin));
        assert_eq!(SeekOrigin::try_from(1), Ok(SeekOrigin::Current));
        assert_eq!(SeekOrigin::try_from(2), Ok(SeekOrigin::End));
        assert_eq!(SeekOrigin::try_from(3), Err(HResult::E_INVALIDARG));
    }

    #[test]
    fn windows_are_bounded_by_the_buffer() {
        assert_eq!(window(10, 2, 8), Ok((2, 8)));
        assert_eq!(window(0, 0, 0), Ok((0, 0)));
        assert_eq!(window(10, 3, 8), Err(HResult::E_INVALIDARG));
        assert_eq!(window(10, -1, 1), Err(HResult::E_INVALIDARG));
        assert_eq!(window(-1, 0, 0), Err(HResult::E_INVALIDARG));
        assert_eq!(window(i32::MAX, i32::MAX, i32::MAX), Err(HResult::E_INVALIDARG));
    }

    #[test]
    fn stream_identifiers_are_distinct() {
        assert_ne!(IReadStream::IID, IWriteStream::IID);
        assert_eq!(
            IWriteStream::IID.to_string(),
            "d7c3eb39-9170-43b9-ba98-2ea1f2fed8a8"
        );
    }
}
