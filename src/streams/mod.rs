//! Byte streams crossing the boundary.
//!
//! `domain` holds the contracts, `service` the stream objects over `std::io`,
//! `client` the caller-side helpers and `repo_fs` the file-backed factory.

pub mod client;
pub mod domain;
pub mod repo_fs;
pub mod service;

pub use client::{StreamReader, StreamWriter};
pub use domain::{IReadStream, IWriteStream, ReadStream, SeekOrigin, WriteStream};
pub use repo_fs::{FileSystem, IFileSystem, NativeFileSystem};
pub use service::{ForwardStream, ReaderStream, WriterStream};
