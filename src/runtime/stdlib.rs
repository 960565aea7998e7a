//! Standard library entry points linked into every compiled program.
//!
//! Arrays carry a hidden header slot holding their element count so `free_*`
//! can recover the allocation layout from the element pointer alone.

use std::alloc::{self, Layout};
use tracing::warn;

const SLOT: usize = 8;

#[unsafe(no_mangle)]
pub extern "C" fn print_int(value: i64) {
    println!("Outputting Integer: {value}");
}

#[unsafe(no_mangle)]
pub extern "C" fn print_float(value: f64) {
    println!("Outputting Float: {value:.6}");
}

fn array_layout(count: usize) -> Option<Layout> {
    let slots = count.checked_add(1)?;
    Layout::from_size_align(slots.checked_mul(SLOT)?, SLOT).ok()
}

/// Allocate `count` eight-byte elements; null on a negative count or
/// allocation failure.
fn allocate(count: i64, zeroed: bool) -> *mut u8 {
    let Ok(count) = usize::try_from(count) else {
        warn!(count, "negative array length");
        return std::ptr::null_mut();
    };
    let Some(layout) = array_layout(count) else {
        warn!(count, "array length overflows the address space");
        return std::ptr::null_mut();
    };
    // SAFETY: the layout always covers at least the header slot.
    unsafe {
        let base = if zeroed {
            alloc::alloc_zeroed(layout)
        } else {
            alloc::alloc(layout)
        };
        if base.is_null() {
            return base;
        }
        (base as *mut usize).write(count);
        base.add(SLOT)
    }
}

/// # Safety
/// `ptr` must be null or come from the matching allocation entry point.
unsafe fn release(ptr: *mut u8) {
    if ptr.is_null() {
        return;
    }
    let base = ptr.sub(SLOT);
    let count = (base as *const usize).read();
    if let Some(layout) = array_layout(count) {
        alloc::dealloc(base, layout);
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn malloc_int(count: i64) -> *mut i64 {
    allocate(count, false) as *mut i64
}

#[unsafe(no_mangle)]
pub extern "C" fn malloc_float(count: i64) -> *mut f64 {
    allocate(count, false) as *mut f64
}

#[unsafe(no_mangle)]
pub extern "C" fn calloc_int(count: i64) -> *mut i64 {
    allocate(count, true) as *mut i64
}

#[unsafe(no_mangle)]
pub extern "C" fn calloc_float(count: i64) -> *mut f64 {
    allocate(count, true) as *mut f64
}

/// # Safety
/// `ptr` must be null or returned by `malloc_int`/`calloc_int` and not yet freed.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn free_int(ptr: *mut i64) {
    release(ptr as *mut u8)
}

/// # Safety
/// `ptr` must be null or returned by `malloc_float`/`calloc_float` and not yet freed.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn free_float(ptr: *mut f64) {
    release(ptr as *mut u8)
}
