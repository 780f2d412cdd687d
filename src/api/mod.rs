//! Public entry points for foreign callers.

pub mod ffi;
