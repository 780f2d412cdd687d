//! Caller side of the stream contracts: typed wrappers on `ComPtr` and
//! `std::io` adapters for Rust consumers.

use std::io;

use crate::common::error::{ComResult, HResult};
use crate::object::ptr::ComPtr;

use super::domain::{IReadStream, IWriteStream, SeekOrigin};

/// Largest request a single call can carry.
const MAX_CHUNK: usize = i32::MAX as usize;

impl ComPtr<IReadStream> {
    /// Read up to `count` bytes into `buf[offset..offset + count]`.
    pub fn read_into(&self, buf: &mut [u8], offset: usize, count: usize) -> ComResult<usize> {
        let length = i32::try_from(buf.len()).map_err(|_| HResult::E_INVALIDARG)?;
        let offset = i32::try_from(offset).map_err(|_| HResult::E_INVALIDARG)?;
        let count = i32::try_from(count).map_err(|_| HResult::E_INVALIDARG)?;
        let mut read = 0i32;
        unsafe {
            (self.vtbl().read)(self.as_raw(), buf.as_mut_ptr(), length, offset, count, &mut read).ok()?;
        }
        Ok(read.max(0) as usize)
    }

    /// Read whatever is available into `buf`. `Ok(0)` means the end of data.
    pub fn read(&self, buf: &mut [u8]) -> ComResult<usize> {
        let len = buf.len().min(MAX_CHUNK);
        let window = &mut buf[..len];
        self.read_into(window, 0, len)
    }

    /// Fill `buf` completely or fail with `E_EOF`.
    pub fn read_exact(&self, buf: &mut [u8]) -> ComResult<()> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.read(&mut buf[filled..])? {
                0 => return Err(HResult::E_EOF),
                n => filled += n,
            }
        }
        Ok(())
    }

    /// Read everything from the current position on.
    pub fn read_to_end(&self, out: &mut Vec<u8>) -> ComResult<usize> {
        let start = out.len();
        let mut chunk = vec![0u8; 64 * 1024];
        loop {
            match self.read(&mut chunk)? {
                0 => return Ok(out.len() - start),
                n => out.extend_from_slice(&chunk[..n]),
            }
        }
    }

    pub fn seek(&self, offset: i64, origin: SeekOrigin) -> ComResult<()> {
        unsafe { (self.vtbl().seek)(self.as_raw(), offset, origin as u8).ok() }
    }

    pub fn position(&self) -> ComResult<i64> {
        let mut position = 0i64;
        unsafe { (self.vtbl().get_position)(self.as_raw(), &mut position).ok()? };
        Ok(position)
    }

    pub fn length(&self) -> ComResult<i64> {
        let mut length = 0i64;
        unsafe { (self.vtbl().get_length)(self.as_raw(), &mut length).ok()? };
        Ok(length)
    }
}

impl ComPtr<IWriteStream> {
    /// Single call; `data` must fit in one request.
    pub fn write(&self, data: &[u8]) -> ComResult<()> {
        let count = i32::try_from(data.len()).map_err(|_| HResult::E_INVALIDARG)?;
        unsafe { (self.vtbl().write)(self.as_raw(), data.as_ptr(), count).ok() }
    }

    /// Write a whole buffer, split into as few calls as the ABI allows.
    pub fn write_all(&self, data: &[u8]) -> ComResult<()> {
        if data.is_empty() {
            return self.write(data);
        }
        data.chunks(MAX_CHUNK).try_for_each(|chunk| self.write(chunk))
    }

    pub fn flush(&self) -> ComResult<()> {
        unsafe { (self.vtbl().flush)(self.as_raw()).ok() }
    }
}

/// `io::Read + io::Seek` view of a read stream.
#[derive(Clone, Debug)]
pub struct StreamReader {
    stream: ComPtr<IReadStream>,
}

impl StreamReader {
    pub fn new(stream: ComPtr<IReadStream>) -> Self {
        Self { stream }
    }

    pub fn into_inner(self) -> ComPtr<IReadStream> {
        self.stream
    }
}

impl io::Read for StreamReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(self.stream.read(buf)?)
    }
}

impl io::Seek for StreamReader {
    fn seek(&mut self, pos: io::SeekFrom) -> io::Result<u64> {
        let (offset, origin) = match pos {
            io::SeekFrom::Start(n) => (
                i64::try_from(n).map_err(|_| HResult::E_INVALIDARG)?,
                SeekOrigin::Begin,
            ),
            io::SeekFrom::Current(n) => (n, SeekOrigin::Current),
            io::SeekFrom::End(n) => (n, SeekOrigin::End),
        };
        self.stream.seek(offset, origin)?;
        let position = self.stream.position()?;
        Ok(u64::try_from(position).map_err(|_| HResult::E_UNEXPECTED)?)
    }
}

/// `io::Write` view of a write stream.
#[derive(Clone, Debug)]
pub struct StreamWriter {
    stream: ComPtr<IWriteStream>,
}

impl StreamWriter {
    pub fn new(stream: ComPtr<IWriteStream>) -> Self {
        Self { stream }
    }

    pub fn into_inner(self) -> ComPtr<IWriteStream> {
        self.stream
    }
}

impl io::Write for StreamWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let len = buf.len().min(MAX_CHUNK);
        self.stream.write(&buf[..len])?;
        Ok(len)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(self.stream.flush()?)
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Read, Seek, SeekFrom, Write};

    use super::*;
    use crate::object::root::{create, Instance};
    use crate::streams::service::{ReaderStream, WriterStream};

    fn reader_over(bytes: &[u8]) -> ComPtr<IReadStream> {
        create(ReaderStream::new(Cursor::new(bytes.to_vec()))).unwrap()
    }

    #[test]
    fn read_into_respects_the_window() {
        let stream = reader_over(b"abcdef");
        let mut buf = [b'.'; 8];
        assert_eq!(stream.read_into(&mut buf, 2, 3), Ok(3));
        assert_eq!(&buf, b"..abc...");
        assert_eq!(stream.read_into(&mut buf, 6, 3), Err(HResult::E_INVALIDARG));
        assert_eq!(stream.read_into(&mut buf, 0, 0), Ok(0));
    }

    #[test]
    fn read_exact_fails_with_end_of_data() {
        let stream = reader_over(b"abc");
        let mut buf = [0u8; 4];
        assert_eq!(stream.read_exact(&mut buf), Err(HResult::E_EOF));

        let stream = reader_over(b"abcd");
        stream.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"abcd");
        assert_eq!(stream.read(&mut buf), Ok(0));
    }

    #[test]
    fn raw_read_rejects_bad_arguments() {
        let stream = reader_over(b"abc");
        let read = stream.vtbl().read;
        let mut n = 0i32;
        unsafe {
            assert_eq!(
                read(stream.as_raw(), std::ptr::null_mut(), 4, 0, 4, &mut n),
                HResult::E_POINTER
            );
            assert_eq!(
                read(stream.as_raw(), std::ptr::null_mut(), 0, 0, 0, std::ptr::null_mut()),
                HResult::E_POINTER
            );
            assert_eq!(
                read(stream.as_raw(), std::ptr::null_mut(), 0, 0, 0, &mut n),
                HResult::S_OK
            );
            assert_eq!(n, 0);
            assert_eq!((stream.vtbl().seek)(stream.as_raw(), 0, 7), HResult::E_INVALIDARG);
        }
    }

    #[test]
    fn io_adapters_wrap_foreign_streams() {
        let sink = Instance::new(WriterStream::new(Vec::new())).unwrap();
        let mut writer = StreamWriter::new(sink.interface());
        write!(writer, "{}-{}", "left", 42).unwrap();
        writer.flush().unwrap();
        let written = sink.with_sink(|v| v.clone()).unwrap();
        assert_eq!(written, b"left-42");

        let mut reader = StreamReader::new(reader_over(&written));
        let mut text = String::new();
        reader.read_to_string(&mut text).unwrap();
        assert_eq!(text, "left-42");
        assert_eq!(reader.seek(SeekFrom::Start(5)).unwrap(), 5);
        assert_eq!(reader.seek(SeekFrom::End(-1)).unwrap(), 6);
        let mut last = String::new();
        reader.read_to_string(&mut last).unwrap();
        assert_eq!(last, "2");
    }

    #[test]
    fn io_errors_carry_the_code() {
        let blank = create(ReaderStream::<Cursor<Vec<u8>>>::default()).unwrap();
        let mut reader = StreamReader::new(blank);
        let err = reader.read(&mut [0u8; 1]).unwrap_err();
        let inner = err.get_ref().and_then(|e| e.downcast_ref::<HResult>());
        assert_eq!(inner, Some(&HResult::OLE_E_BLANK));
    }
}
