//! Calculator object serving `ICalculator` and `IAccumulator`.

use std::sync::Mutex;

use crate::common::error::{ComResult, HResult};
use crate::common::sync::lock;
use crate::object::domain::{Capability, ComClass};

use super::domain::{Accumulate, Calculate, IAccumulator, ICalculator};

#[derive(Default)]
pub struct Calculator {
    total: Mutex<i32>,
}

impl ComClass for Calculator {
    type Primary = ICalculator;
    const FREE_THREADED: bool = true;

    fn capability_map() -> Vec<Capability> {
        vec![
            Capability::of::<ICalculator, Self>(),
            Capability::of::<IAccumulator, Self>(),
        ]
    }
}

/// Sum two values, failing instead of wrapping.
pub fn checked_add(a: i32, b: i32) -> ComResult<i32> {
    a.checked_add(b).ok_or(HResult::DISP_E_OVERFLOW)
}

impl Calculate for Calculator {
    fn add(&self, a: i32, b: i32) -> ComResult<i32> {
        checked_add(a, b)
    }
}

impl Accumulate for Calculator {
    fn push(&self, value: i32) -> ComResult<()> {
        let mut total = lock(&self.total);
        *total = checked_add(*total, value)?;
        Ok(())
    }

    fn total(&self) -> ComResult<i32> {
        Ok(*lock(&self.total))
    }

    fn reset(&self) -> ComResult<()> {
        *lock(&self.total) = 0;
        Ok(())
    }
}
