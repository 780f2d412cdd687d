// lib.rs - COM-style interface objects shared across an FFI boundary
pub mod api;
pub mod calc;
pub mod common;
pub mod object;
pub mod streams;

pub use api::ffi::{comlight_api_version, comlight_create_calculator, comlight_create_file_system};
pub use common::{ComResult, Guid, HResult};
pub use object::{ComClass, ComPtr, Instance, Interface};
