//! Calculator sample: two contracts on one object, used to exercise the
//! capability map and calls delegated across objects.

pub mod domain;
pub mod service;

pub use domain::{Accumulate, Calculate, IAccumulator, ICalculator};
pub use service::Calculator;
