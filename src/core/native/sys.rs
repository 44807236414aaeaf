// Raw C ABI of the native engine shim, resolved by symbol name at runtime.
#![allow(non_camel_case_types)]

use libc::{c_char, c_float, c_int, c_void};

pub const VWGATE_OK: c_int = 0;

pub const VWGATE_ERR_OUT_OF_MEMORY: i32 = 1;
pub const VWGATE_ERR_INVALID_ARGUMENT: i32 = 2;
pub const VWGATE_ERR_EXCEPTION: i32 = 3;
pub const VWGATE_ERR_UNKNOWN: i32 = 4;

#[repr(C)]
pub struct vwgate_error {
    pub kind: i32,
    pub message: *mut c_char,
}

#[repr(C)]
pub struct vwgate_floats {
    pub data: *mut c_float,
    pub len: usize,
}

pub type InitializeFn =
    unsafe extern "C" fn(command: *const c_char, out_err: *mut *mut vwgate_error) -> *mut c_void;

pub type RunFn = unsafe extern "C" fn(
    handle: *mut c_void,
    example: *const c_char,
    learn: c_int,
    out_prediction: *mut c_float,
    out_err: *mut *mut vwgate_error,
) -> c_int;

pub type QueryTopicsFn = unsafe extern "C" fn(
    handle: *mut c_void,
    example: *const c_char,
    out_weights: *mut vwgate_floats,
    out_err: *mut *mut vwgate_error,
) -> c_int;

pub type ReleaseFn =
    unsafe extern "C" fn(handle: *mut c_void, out_err: *mut *mut vwgate_error) -> c_int;

pub type VersionFn = unsafe extern "C" fn() -> *const c_char;

pub type FloatsFreeFn = unsafe extern "C" fn(floats: *mut vwgate_floats);

pub type ErrorFreeFn = unsafe extern "C" fn(err: *mut vwgate_error);

pub const SYM_INITIALIZE: &[u8] = b"vwgate_initialize\0";
pub const SYM_RUN: &[u8] = b"vwgate_run\0";
pub const SYM_QUERY_TOPICS: &[u8] = b"vwgate_query_topics\0";
pub const SYM_RELEASE: &[u8] = b"vwgate_release\0";
pub const SYM_VERSION: &[u8] = b"vwgate_version\0";
pub const SYM_FLOATS_FREE: &[u8] = b"vwgate_floats_free\0";
pub const SYM_ERROR_FREE: &[u8] = b"vwgate_error_free\0";
