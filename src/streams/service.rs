//! Stream objects over `std::io` sources and sinks.
//!
//! Each object keeps its resource behind a mutex. An object with no resource,
//! either never opened or explicitly closed, answers `OLE_E_BLANK`.

use std::fs::File;
use std::io::{self, BufWriter, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::{Mutex, PoisonError};

use crate::common::config;
use crate::common::error::{ComResult, HResult};
use crate::common::log::{self, Level};
use crate::common::sync::lock;
use crate::object::domain::ComClass;

use super::domain::{IReadStream, IWriteStream, ReadStream, SeekOrigin, WriteStream};

/// Map an I/O failure to the device error code, logging the OS detail.
fn device_error(event: &str, err: io::Error) -> HResult {
    log::log_json(
        Level::Error,
        "streams",
        event,
        HResult::CTL_E_DEVICEIOERROR,
        Some(&err.to_string()),
    );
    HResult::CTL_E_DEVICEIOERROR
}

fn read_retrying<R: Read + ?Sized>(source: &mut R, buf: &mut [u8]) -> ComResult<usize> {
    loop {
        match source.read(buf) {
            Ok(n) => return Ok(n),
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(device_error("read_failed", err)),
        }
    }
}

fn to_offset(value: u64) -> ComResult<i64> {
    i64::try_from(value).map_err(|_| HResult::DISP_E_OVERFLOW)
}

/// Seekable read stream.
pub struct ReaderStream<R> {
    source: Mutex<Option<R>>,
}

impl<R> Default for ReaderStream<R> {
    fn default() -> Self {
        Self {
            source: Mutex::new(None),
        }
    }
}

impl<R: Read + Seek + Send + 'static> ReaderStream<R> {
    pub fn new(source: R) -> Self {
        Self {
            source: Mutex::new(Some(source)),
        }
    }

    /// Attach a source, replacing (and dropping) any previous one.
    pub fn attach(&self, source: R) {
        *lock(&self.source) = Some(source);
    }

    /// Release the source. Returns false when nothing was open.
    pub fn close(&self) -> bool {
        lock(&self.source).take().is_some()
    }

    pub fn is_open(&self) -> bool {
        lock(&self.source).is_some()
    }

    fn with_source<T>(&self, f: impl FnOnce(&mut R) -> ComResult<T>) -> ComResult<T> {
        match lock(&self.source).as_mut() {
            Some(source) => f(source),
            None => Err(HResult::OLE_E_BLANK),
        }
    }
}

impl ReaderStream<File> {
    /// Open `path` for reading.
    pub fn open(&self, path: &Path) -> ComResult<()> {
        let file = File::open(path).map_err(|err| device_error("open_failed", err))?;
        self.attach(file);
        Ok(())
    }
}

impl<R: Read + Seek + Send + 'static> ComClass for ReaderStream<R> {
    type Primary = IReadStream;
}

impl<R: Read + Seek + Send + 'static> ReadStream for ReaderStream<R> {
    fn read(&self, buf: &mut [u8]) -> ComResult<usize> {
        self.with_source(|source| read_retrying(source, buf))
    }

    fn seek(&self, offset: i64, origin: SeekOrigin) -> ComResult<()> {
        let target = match origin {
            SeekOrigin::Begin => {
                let start = u64::try_from(offset).map_err(|_| HResult::E_INVALIDARG)?;
                SeekFrom::Start(start)
            }
            SeekOrigin::Current => SeekFrom::Current(offset),
            SeekOrigin::End => SeekFrom::End(offset),
        };
        self.with_source(|source| match source.seek(target) {
            Ok(_) => Ok(()),
            Err(err) if err.kind() == ErrorKind::InvalidInput => Err(HResult::E_INVALIDARG),
            Err(err) => Err(device_error("seek_failed", err)),
        })
    }

    fn position(&self) -> ComResult<i64> {
        self.with_source(|source| {
            let pos = source
                .stream_position()
                .map_err(|err| device_error("tell_failed", err))?;
            to_offset(pos)
        })
    }

    fn length(&self) -> ComResult<i64> {
        self.with_source(|source| {
            let measure = |source: &mut R| -> io::Result<u64> {
                let current = source.stream_position()?;
                let end = source.seek(SeekFrom::End(0))?;
                if end != current {
                    source.seek(SeekFrom::Start(current))?;
                }
                Ok(end)
            };
            let end = measure(source).map_err(|err| device_error("length_failed", err))?;
            to_offset(end)
        })
    }
}

/// Read stream over a source that cannot seek, such as a pipe.
pub struct ForwardStream<R> {
    state: Mutex<Option<(R, i64)>>,
}

impl<R: Read + Send + 'static> ForwardStream<R> {
    pub fn new(source: R) -> Self {
        Self {
            state: Mutex::new(Some((source, 0))),
        }
    }

    pub fn close(&self) -> bool {
        lock(&self.state).take().is_some()
    }
}

impl<R: Read + Send + 'static> ComClass for ForwardStream<R> {
    type Primary = IReadStream;
}

impl<R: Read + Send + 'static> ReadStream for ForwardStream<R> {
    fn read(&self, buf: &mut [u8]) -> ComResult<usize> {
        match lock(&self.state).as_mut() {
            Some((source, position)) => {
                let n = read_retrying(source, buf)?;
                *position += n as i64;
                Ok(n)
            }
            None => Err(HResult::OLE_E_BLANK),
        }
    }

    fn position(&self) -> ComResult<i64> {
        match lock(&self.state).as_ref() {
            Some((_, position)) => Ok(*position),
            None => Err(HResult::OLE_E_BLANK),
        }
    }
}

/// Sequential write stream.
pub struct WriterStream<W: Write> {
    sink: Mutex<Option<W>>,
}

impl<W: Write> Default for WriterStream<W> {
    fn default() -> Self {
        Self {
            sink: Mutex::new(None),
        }
    }
}

impl<W: Write + Send + 'static> WriterStream<W> {
    pub fn new(sink: W) -> Self {
        Self {
            sink: Mutex::new(Some(sink)),
        }
    }

    /// Attach a sink. A previously attached sink is flushed and dropped first.
    pub fn attach(&self, sink: W) -> ComResult<()> {
        let previous = lock(&self.sink).replace(sink);
        match previous {
            Some(mut old) => old.flush().map_err(|err| device_error("flush_failed", err)),
            None => Ok(()),
        }
    }

    /// Flush and release the sink. `OLE_E_BLANK` when nothing was open.
    pub fn close(&self) -> ComResult<()> {
        let mut sink = lock(&self.sink).take().ok_or(HResult::OLE_E_BLANK)?;
        sink.flush().map_err(|err| device_error("flush_failed", err))
    }

    /// Run `f` on the sink; used by tests and callers that need to inspect it.
    pub fn with_sink<T>(&self, f: impl FnOnce(&mut W) -> T) -> ComResult<T> {
        lock(&self.sink).as_mut().map(f).ok_or(HResult::OLE_E_BLANK)
    }
}

impl WriterStream<BufWriter<File>> {
    /// Create (or truncate) `path` for writing.
    pub fn create(&self, path: &Path) -> ComResult<()> {
        let file = File::create(path).map_err(|err| device_error("create_failed", err))?;
        self.attach(BufWriter::with_capacity(config::cfg().write_buffer, file))
    }
}

impl<W: Write> Drop for WriterStream<W> {
    fn drop(&mut self) {
        let sink = self.sink.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(sink) = sink.as_mut() {
            if let Err(err) = sink.flush() {
                device_error("flush_failed", err);
            }
        }
    }
}

impl<W: Write + Send + 'static> ComClass for WriterStream<W> {
    type Primary = IWriteStream;
}

impl<W: Write + Send + 'static> WriteStream for WriterStream<W> {
    fn write(&self, data: &[u8]) -> ComResult<()> {
        match lock(&self.sink).as_mut() {
            Some(sink) => sink
                .write_all(data)
                .map_err(|err| device_error("write_failed", err)),
            None => Err(HResult::OLE_E_BLANK),
        }
    }

    fn flush(&self) -> ComResult<()> {
        match lock(&self.sink).as_mut() {
            Some(sink) => sink.flush().map_err(|err| device_error("flush_failed", err)),
            None => Err(HResult::OLE_E_BLANK),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::object::root::{create, Instance};

    struct Broken;

    impl Write for Broken {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(ErrorKind::Other, "broken sink"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Err(io::Error::new(ErrorKind::Other, "broken sink"))
        }
    }

    /// Accepts everything and counts flushes.
    struct Counting(Arc<AtomicUsize>);

    impl Write for Counting {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn blank_streams_report_not_open() {
        let reader = create(ReaderStream::<Cursor<Vec<u8>>>::default()).unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(reader.read(&mut buf), Err(HResult::OLE_E_BLANK));
        assert_eq!(reader.position(), Err(HResult::OLE_E_BLANK));
        assert_eq!(reader.length(), Err(HResult::OLE_E_BLANK));
        assert_eq!(reader.seek(0, SeekOrigin::Begin), Err(HResult::OLE_E_BLANK));

        let writer = create(WriterStream::<Vec<u8>>::default()).unwrap();
        assert_eq!(writer.write_all(b"x"), Err(HResult::OLE_E_BLANK));
        assert_eq!(writer.flush(), Err(HResult::OLE_E_BLANK));
    }

    #[test]
    fn explicit_close_releases_once() {
        let reader = Instance::new(ReaderStream::new(Cursor::new(vec![1u8, 2, 3]))).unwrap();
        assert!(reader.is_open());
        assert!(reader.close());
        assert!(!reader.close());
        let stream = reader.interface();
        assert_eq!(stream.position(), Err(HResult::OLE_E_BLANK));

        let writer = Instance::new(WriterStream::new(Vec::new())).unwrap();
        assert_eq!(writer.close(), Ok(()));
        assert_eq!(writer.close(), Err(HResult::OLE_E_BLANK));
    }

    #[test]
    fn seeking_moves_the_cursor() {
        let stream = create(ReaderStream::new(Cursor::new(b"abcdef".to_vec()))).unwrap();
        assert_eq!(stream.length(), Ok(6));
        assert_eq!(stream.position(), Ok(0));

        stream.seek(-2, SeekOrigin::End).unwrap();
        let mut tail = [0u8; 2];
        stream.read_exact(&mut tail).unwrap();
        assert_eq!(&tail, b"ef");

        stream.seek(1, SeekOrigin::Begin).unwrap();
        stream.seek(2, SeekOrigin::Current).unwrap();
        assert_eq!(stream.position(), Ok(3));
        assert_eq!(stream.length(), Ok(6));
        assert_eq!(stream.position(), Ok(3));

        assert_eq!(stream.seek(-1, SeekOrigin::Begin), Err(HResult::E_INVALIDARG));
        assert_eq!(stream.seek(-10, SeekOrigin::Current), Err(HResult::E_INVALIDARG));
    }

    #[test]
    fn forward_streams_cannot_seek() {
        let stream = create(ForwardStream::new(&b"hello"[..])).unwrap();
        let mut buf = [0u8; 3];
        assert_eq!(stream.read(&mut buf), Ok(3));
        assert_eq!(stream.position(), Ok(3));
        assert_eq!(stream.seek(0, SeekOrigin::Begin), Err(HResult::E_NOTIMPL));
        assert_eq!(stream.length(), Err(HResult::E_NOTIMPL));
        assert_eq!(stream.read(&mut buf), Ok(2));
        assert_eq!(stream.read(&mut buf), Ok(0));
    }

    #[test]
    fn closed_forward_stream_is_blank() {
        let reader = Instance::new(ForwardStream::new(&b"abc"[..])).unwrap();
        let stream = reader.interface();
        let mut buf = [0u8; 2];
        assert_eq!(stream.read(&mut buf), Ok(2));

        assert!(reader.close());
        assert!(!reader.close());
        assert_eq!(stream.read(&mut buf), Err(HResult::OLE_E_BLANK));
        assert_eq!(stream.position(), Err(HResult::OLE_E_BLANK));
    }

    #[test]
    fn attach_flushes_the_previous_sink() {
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let writer = Instance::new(WriterStream::new(Counting(first.clone()))).unwrap();
        writer.interface().write_all(b"pending").unwrap();

        writer.attach(Counting(second.clone())).unwrap();
        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 0);

        writer.interface().write_all(b"next").unwrap();
        assert_eq!(writer.close(), Ok(()));
        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failing_sink_reports_device_errors() {
        let stream = create(WriterStream::new(Broken)).unwrap();
        assert_eq!(stream.write_all(b"abc"), Err(HResult::CTL_E_DEVICEIOERROR));
        assert_eq!(stream.flush(), Err(HResult::CTL_E_DEVICEIOERROR));
    }

    #[test]
    fn writes_reach_the_sink_in_order() {
        let writer = Instance::new(WriterStream::new(Vec::new())).unwrap();
        let stream = writer.interface();
        stream.write_all(b"Hello, ").unwrap();
        stream.write_all(b"world!").unwrap();
        stream.flush().unwrap();
        let contents = writer.with_sink(|sink| sink.clone()).unwrap();
        assert_eq!(contents, b"Hello, world!");
    }
}
