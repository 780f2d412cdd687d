//! Calculator contracts: checked addition and a running total.

use std::ffi::c_void;

use crate::common::error::{ComResult, HResult};
use crate::common::ids::Guid;
use crate::object::domain::{ComClass, IUnknownVtbl, Implement, Interface};
use crate::object::ptr::ComPtr;
use crate::object::root::{guard, ComObject, UNKNOWN_VTBL};

pub enum ICalculator {}

#[repr(C)]
pub struct ICalculatorVtbl {
    pub base: IUnknownVtbl,
    pub add: unsafe extern "system" fn(this: *mut c_void, a: i32, b: i32, result: *mut i32) -> HResult,
    /// Delegate the addition to another calculator.
    pub add_via: unsafe extern "system" fn(
        this: *mut c_void,
        other: *mut c_void,
        a: i32,
        b: i32,
        result: *mut i32,
    ) -> HResult,
}

unsafe impl Interface for ICalculator {
    const IID: Guid = Guid::parse("5b0e8f3c-2d4a-4c71-9e36-a1d7c84f0b92");
    type Vtbl = ICalculatorVtbl;
}

pub enum IAccumulator {}

#[repr(C)]
pub struct IAccumulatorVtbl {
    pub base: IUnknownVtbl,
    pub push: unsafe extern "system" fn(this: *mut c_void, value: i32) -> HResult,
    pub total: unsafe extern "system" fn(this: *mut c_void, total: *mut i32) -> HResult,
    pub reset: unsafe extern "system" fn(this: *mut c_void) -> HResult,
}

unsafe impl Interface for IAccumulator {
    const IID: Guid = Guid::parse("c41f7a2e-8b3d-4f05-a6e9-3d27b5180c6f");
    type Vtbl = IAccumulatorVtbl;
}

pub trait Calculate: ComClass {
    fn add(&self, a: i32, b: i32) -> ComResult<i32>;

    fn add_via(&self, other: &ComPtr<ICalculator>, a: i32, b: i32) -> ComResult<i32> {
        other.add(a, b)
    }
}

pub trait Accumulate: ComClass {
    fn push(&self, value: i32) -> ComResult<()>;
    fn total(&self) -> ComResult<i32>;
    fn reset(&self) -> ComResult<()>;
}

unsafe extern "system" fn add_thunk<C: Calculate>(this: *mut c_void, a: i32, b: i32, result: *mut i32) -> HResult {
    if result.is_null() {
        return HResult::E_POINTER;
    }
    HResult::from_result(guard(|| {
        *result = ComObject::<C>::value_of(this).add(a, b)?;
        Ok(())
    }))
}

unsafe extern "system" fn add_via_thunk<C: Calculate>(
    this: *mut c_void,
    other: *mut c_void,
    a: i32,
    b: i32,
    result: *mut i32,
) -> HResult {
    if result.is_null() {
        return HResult::E_POINTER;
    }
    HResult::from_result(guard(|| {
        let other = ComPtr::<ICalculator>::from_borrowed(other).ok_or(HResult::E_POINTER)?;
        *result = ComObject::<C>::value_of(this).add_via(&other, a, b)?;
        Ok(())
    }))
}

unsafe impl<C: Calculate> Implement<C> for ICalculator {
    const VTBL: &'static ICalculatorVtbl = &ICalculatorVtbl {
        base: UNKNOWN_VTBL,
        add: add_thunk::<C>,
        add_via: add_via_thunk::<C>,
    };
}

unsafe extern "system" fn push_thunk<C: Accumulate>(this: *mut c_void, value: i32) -> HResult {
    HResult::from_result(guard(|| ComObject::<C>::value_of(this).push(value)))
}

unsafe extern "system" fn total_thunk<C: Accumulate>(this: *mut c_void, total: *mut i32) -> HResult {
    if total.is_null() {
        return HResult::E_POINTER;
    }
    HResult::from_result(guard(|| {
        *total = ComObject::<C>::value_of(this).total()?;
        Ok(())
    }))
}

unsafe extern "system" fn reset_thunk<C: Accumulate>(this: *mut c_void) -> HResult {
    HResult::from_result(guard(|| ComObject::<C>::value_of(this).reset()))
}

unsafe impl<C: Accumulate> Implement<C> for IAccumulator {
    const VTBL: &'static IAccumulatorVtbl = &IAccumulatorVtbl {
        base: UNKNOWN_VTBL,
        push: push_thunk::<C>,
        total: total_thunk::<C>,
        reset: reset_thunk::<C>,
    };
}

impl ComPtr<ICalculator> {
    /// Checked addition; the output is never written on failure.
    pub fn add(&self, a: i32, b: i32) -> ComResult<i32> {
        let mut result = 0;
        unsafe { (self.vtbl().add)(self.as_raw(), a, b, &mut result).ok()? };
        Ok(result)
    }

    pub fn add_via(&self, other: &ComPtr<ICalculator>, a: i32, b: i32) -> ComResult<i32> {
        let mut result = 0;
        unsafe { (self.vtbl().add_via)(self.as_raw(), other.as_raw(), a, b, &mut result).ok()? };
        Ok(result)
    }
}

impl ComPtr<IAccumulator> {
    pub fn push(&self, value: i32) -> ComResult<()> {
        unsafe { (self.vtbl().push)(self.as_raw(), value).ok() }
    }

    pub fn total(&self) -> ComResult<i32> {
        let mut total = 0;
        unsafe { (self.vtbl().total)(self.as_raw(), &mut total).ok()? };
        Ok(total)
    }

    pub fn reset(&self) -> ComResult<()> {
        unsafe { (self.vtbl().reset)(self.as_raw()).ok() }
    }
}
