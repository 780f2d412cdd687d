//! Object model: interface contracts, the reference-counted root, the smart
//! handle and the free-threaded marshaller hook.

pub mod domain;
pub mod marshal;
pub mod ptr;
pub mod root;

pub use domain::{Capability, ComClass, IMarshal, IUnknown, IUnknownVtbl, Implement, Interface};
pub use marshal::{install_marshal_host, MarshalHost};
pub use ptr::ComPtr;
pub use root::{create, ComObject, Instance, UNKNOWN_VTBL};
