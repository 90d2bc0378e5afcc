use std::any::Any;
use std::borrow::Cow;
use std::ffi::CStr;
use std::os::raw::c_char;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Borrows a nul-terminated string from native code, lossily converting
/// anything that isn't UTF-8. Returns `None` for a null pointer.
pub(crate) fn try_get_str_from_ptr<'a>(ptr: *const c_char) -> Option<Cow<'a, str>> {
    if ptr.is_null() {
        return None;
    }
    let cstr = unsafe { CStr::from_ptr(ptr) };
    Some(cstr.to_string_lossy())
}

pub(crate) fn log_panic(panic: Box<dyn Any + Send>) {
    if let Some(panic) = panic.downcast_ref::<String>() {
        log::error!("RustPanic: {panic}");
    } else if let Some(panic) = panic.downcast_ref::<&str>() {
        log::error!("RustPanic: {panic}");
    } else {
        log::error!("RustPanic: UNKNOWN");
    }
}

/// Run a closure and abort the program if it panics.
///
/// This is generally used to ensure Rust callbacks won't unwind past the FFI
/// boundary, which leads to undefined behaviour.
pub(crate) fn abort_on_panic<R>(f: impl FnOnce() -> R) -> R {
    catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|panic| {
        // Try logging the panic before aborting
        log_panic(panic);
        std::process::abort();
    })
}
