//! C ABI for the tabula model runtime.
//!
//! Language libraries load this crate as a shared library. Every function
//! returns a status code, zero on success, and writes its result through an
//! out-pointer. Everything the library allocates is released by exactly one
//! matching free function: models with [`tabula_model_free`] and strings
//! with [`tabula_string_free`].
//!
//! On failure the message is kept per thread and can be fetched with
//! [`tabula_error_message`].

// Raw pointers cross this boundary; every unsafe block states its contract.
#![allow(unsafe_code)]

use libc::c_char;
use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::panic::{catch_unwind, AssertUnwindSafe};
use tabula::{Model, TabulaError};
use tracing::{debug, warn};

/// Success.
pub const TABULA_OK: isize = 0;
/// A required pointer was null or an argument was otherwise unusable.
pub const TABULA_ERROR_INVALID_ARGUMENT: isize = 1;
/// The model bytes could not be decoded or failed validation.
pub const TABULA_ERROR_INVALID_MODEL: isize = 2;
/// Prediction input or options were not valid UTF-8, JSON, or the right shape.
pub const TABULA_ERROR_INVALID_INPUT: isize = 3;
/// Anything else, including a caught panic.
pub const TABULA_ERROR_INTERNAL: isize = 4;

/// Opaque model handle.
pub struct TabulaModel {
    model: Model,
}

thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

struct CallError {
    status: isize,
    message: String,
}

impl CallError {
    fn invalid_argument(message: impl Into<String>) -> Self {
        Self {
            status: TABULA_ERROR_INVALID_ARGUMENT,
            message: message.into(),
        }
    }

    fn invalid_input(message: impl Into<String>) -> Self {
        Self {
            status: TABULA_ERROR_INVALID_INPUT,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: TABULA_ERROR_INTERNAL,
            message: message.into(),
        }
    }
}

impl From<TabulaError> for CallError {
    fn from(err: TabulaError) -> Self {
        let status = if err.is_model_error() {
            TABULA_ERROR_INVALID_MODEL
        } else if err.is_input_error() {
            TABULA_ERROR_INVALID_INPUT
        } else {
            TABULA_ERROR_INTERNAL
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

fn set_last_error(message: &str) {
    // Interior NULs would truncate the message on the C side anyway.
    let message = CString::new(message.replace('\0', " ")).unwrap_or_default();
    LAST_ERROR.with(|cell| *cell.borrow_mut() = Some(message));
}

/// Run `f`, turning errors and panics into a status code.
fn ffi_call(name: &str, f: impl FnOnce() -> Result<(), CallError>) -> isize {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(())) => TABULA_OK,
        Ok(Err(err)) => {
            warn!(function = name, status = err.status, "{}", err.message);
            set_last_error(&err.message);
            err.status
        }
        Err(_) => {
            let message = format!("{name} panicked");
            warn!(function = name, "{}", message);
            set_last_error(&message);
            TABULA_ERROR_INTERNAL
        }
    }
}

fn into_c_string(value: String) -> Result<*const c_char, CallError> {
    CString::new(value)
        .map(|s| s.into_raw() as *const c_char)
        .map_err(|_| CallError::internal("string contains an interior NUL byte"))
}

/// # Safety
///
/// `ptr` must be null or point to a NUL-terminated string that stays valid
/// for the returned lifetime.
unsafe fn read_str<'a>(ptr: *const c_char, what: &str) -> Result<&'a str, CallError> {
    if ptr.is_null() {
        return Err(CallError::invalid_argument(format!("{what} is null")));
    }
    // SAFETY: non-null and NUL-terminated per the caller's contract.
    let s = unsafe { CStr::from_ptr(ptr) };
    s.to_str()
        .map_err(|_| CallError::invalid_input(format!("{what} is not valid UTF-8")))
}

/// Reject a null out-pointer before anything is allocated for it.
fn check_out<T>(out: *mut T, what: &str) -> Result<(), CallError> {
    if out.is_null() {
        return Err(CallError::invalid_argument(format!("{what} is null")));
    }
    Ok(())
}

/// # Safety
///
/// `out` must be null or valid for a pointer-sized write.
unsafe fn write_out<T>(out: *mut T, value: T) -> Result<(), CallError> {
    if out.is_null() {
        return Err(CallError::invalid_argument("output pointer is null"));
    }
    // SAFETY: non-null and writable per the caller's contract.
    unsafe { out.write(value) };
    Ok(())
}

/// Retrieve the library version. On success a C string is written to
/// `version_ptr`; release it with [`tabula_string_free`].
///
/// # Safety
///
/// `version_ptr` must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn tabula_version(version_ptr: *mut *const c_char) -> isize {
    ffi_call("tabula_version", || {
        check_out(version_ptr, "version_ptr")?;
        let version = into_c_string(tabula::VERSION.to_string())?;
        // SAFETY: forwarded from this function's contract.
        unsafe { write_out(version_ptr, version) }
    })
}

/// Load a model from `model_data_len` bytes at `model_data`. On success a
/// model handle is written to `model_ptr`; release it with
/// [`tabula_model_free`].
///
/// # Safety
///
/// `model_data` must point to `model_data_len` readable bytes and
/// `model_ptr` must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn tabula_model_load(
    model_data: *const u8,
    model_data_len: usize,
    model_ptr: *mut *const TabulaModel,
) -> isize {
    ffi_call("tabula_model_load", || {
        check_out(model_ptr, "model_ptr")?;
        if model_data.is_null() {
            return Err(CallError::invalid_argument("model_data is null"));
        }
        // SAFETY: non-null and `model_data_len` bytes long per the contract.
        let bytes = unsafe { std::slice::from_raw_parts(model_data, model_data_len) };
        let model = Model::from_slice(bytes)?;
        debug!(id = %model.id(), "Model handle created");
        let handle = Box::into_raw(Box::new(TabulaModel { model }));
        // SAFETY: checked non-null above.
        unsafe { write_out(model_ptr, handle as *const TabulaModel) }
    })
}

/// Retrieve the model id. On success a C string is written to `id_ptr`;
/// release it with [`tabula_string_free`].
///
/// # Safety
///
/// `model` must be a live handle from [`tabula_model_load`] and `id_ptr`
/// must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn tabula_model_id(
    model: *const TabulaModel,
    id_ptr: *mut *const c_char,
) -> isize {
    ffi_call("tabula_model_id", || {
        check_out(id_ptr, "id_ptr")?;
        // SAFETY: a live handle per the contract; null is rejected.
        let handle = unsafe { model.as_ref() }
            .ok_or_else(|| CallError::invalid_argument("model is null"))?;
        let id = into_c_string(handle.model.id().to_string())?;
        // SAFETY: forwarded from this function's contract.
        unsafe { write_out(id_ptr, id) }
    })
}

/// Make a prediction.
///
/// `input` is a JSON object or array of objects, `options` an optional JSON
/// options object (null for defaults). On success the JSON output is written
/// to `output_ptr`; release it with [`tabula_string_free`].
///
/// # Safety
///
/// `model` must be a live handle, `input` and non-null `options` must be
/// NUL-terminated strings, and `output_ptr` must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn tabula_model_predict(
    model: *const TabulaModel,
    input: *const c_char,
    options: *const c_char,
    output_ptr: *mut *const c_char,
) -> isize {
    ffi_call("tabula_model_predict", || {
        check_out(output_ptr, "output_ptr")?;
        // SAFETY: a live handle per the contract; null is rejected.
        let handle = unsafe { model.as_ref() }
            .ok_or_else(|| CallError::invalid_argument("model is null"))?;
        // SAFETY: NUL-terminated per the contract.
        let input = unsafe { read_str(input, "input") }?;
        let options = if options.is_null() {
            None
        } else {
            // SAFETY: non-null and NUL-terminated per the contract.
            Some(unsafe { read_str(options, "options") }?)
        };
        let output = handle.model.predict_json(input, options)?;
        let output = into_c_string(output)?;
        // SAFETY: forwarded from this function's contract.
        unsafe { write_out(output_ptr, output) }
    })
}

/// Retrieve the last error raised on this thread. A C string is written to
/// `message_ptr`, or null when no call has failed; release a non-null
/// string with [`tabula_string_free`].
///
/// # Safety
///
/// `message_ptr` must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn tabula_error_message(message_ptr: *mut *const c_char) -> isize {
    if message_ptr.is_null() {
        return TABULA_ERROR_INVALID_ARGUMENT;
    }
    let message = LAST_ERROR.with(|cell| cell.borrow().clone());
    let message = message.map_or(std::ptr::null(), |m| m.into_raw() as *const c_char);
    // SAFETY: checked non-null above, writable per the contract.
    unsafe { message_ptr.write(message) };
    TABULA_OK
}

/// Free a string returned by this library. Null is a no-op.
///
/// # Safety
///
/// `string` must be null or a string returned by this library that has not
/// been freed yet.
#[no_mangle]
pub unsafe extern "C" fn tabula_string_free(string: *const c_char) -> isize {
    ffi_call("tabula_string_free", || {
        if !string.is_null() {
            // SAFETY: produced by `CString::into_raw` and not yet freed.
            drop(unsafe { CString::from_raw(string as *mut c_char) });
        }
        Ok(())
    })
}

/// Free a model handle. Null is a no-op.
///
/// # Safety
///
/// `model` must be null or a handle from [`tabula_model_load`] that has not
/// been freed yet.
#[no_mangle]
pub unsafe extern "C" fn tabula_model_free(model: *const TabulaModel) -> isize {
    ffi_call("tabula_model_free", || {
        if !model.is_null() {
            // SAFETY: produced by `Box::into_raw` and not yet freed.
            drop(unsafe { Box::from_raw(model as *mut TabulaModel) });
        }
        Ok(())
    })
}
