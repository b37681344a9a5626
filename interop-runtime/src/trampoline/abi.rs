//! C-ABI side of the trampoline.
//!
//! Native code receives one of the `#[repr(C)]` callback structs below. Each
//! carries `extern "C"` entry points instantiated for the payload type, a
//! destroy notification, and the registration token as its `void*` context.
//! The entry points never unwind and never touch caller code directly: they
//! resolve the token through [`CallbackArena::global`], so the structs can
//! only be built for registrations in that arena.

use std::ffi::c_void;

use super::arena::{CallbackArena, CallbackGuard, CallbackToken};
use super::items::Items;
use crate::diagnostics;
use crate::error::{Error, Result};
use crate::marshal::Primitive;

/// Destroy notification: native code calls it once, when it drops its copy.
pub type DestroyFn = extern "C" fn(ctx: *mut c_void);

/// Native cursor step: returns the next item, or null at the end.
pub type NextFn<T> = unsafe extern "C" fn(iter: *mut c_void) -> *const T;

/// Single-value callback.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct ScalarCallback<T> {
    pub on_value: extern "C" fn(ctx: *mut c_void, value: T) -> T,
    pub on_destroy: Option<DestroyFn>,
    pub ctx: *mut c_void,
}

/// Single-value callback that may decline to answer.
///
/// `on_value` returns true after writing the answer through `out`, false when
/// the caller had none; native code then keeps its current value.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct OptionalCallback<T> {
    pub on_value: extern "C" fn(ctx: *mut c_void, value: T, out: *mut T) -> bool,
    pub on_destroy: Option<DestroyFn>,
    pub ctx: *mut c_void,
}

/// Collection callback over a contiguous native buffer.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct ItemsCallback<T> {
    pub on_items: extern "C" fn(ctx: *mut c_void, items: *const T, count: usize),
    pub on_destroy: Option<DestroyFn>,
    pub ctx: *mut c_void,
}

/// Collection callback over a native cursor.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct CursorCallback<T> {
    pub on_cursor: extern "C" fn(ctx: *mut c_void, iter: *mut c_void, next: NextFn<T>),
    pub on_destroy: Option<DestroyFn>,
    pub ctx: *mut c_void,
}

// Safety: `ctx` is a token, not an address; the entry points are plain
// functions that look it up in a thread-safe table.
unsafe impl<T> Send for ScalarCallback<T> {}
unsafe impl<T> Sync for ScalarCallback<T> {}
unsafe impl<T> Send for OptionalCallback<T> {}
unsafe impl<T> Sync for OptionalCallback<T> {}
unsafe impl<T> Send for ItemsCallback<T> {}
unsafe impl<T> Sync for ItemsCallback<T> {}
unsafe impl<T> Send for CursorCallback<T> {}
unsafe impl<T> Sync for CursorCallback<T> {}

/// Shared by the callback structs.
pub trait CallbackAbi {
    fn context(&self) -> *mut c_void;
    fn destroy_fn(&self) -> Option<DestroyFn>;

    /// Send the destroy notification, if the struct carries one.
    fn notify_destroy(&self) {
        if let Some(on_destroy) = self.destroy_fn() {
            on_destroy(self.context());
        }
    }
}

macro_rules! callback_abi {
    ($($name:ident),+) => {
        $(
            impl<T> CallbackAbi for $name<T> {
                fn context(&self) -> *mut c_void {
                    self.ctx
                }

                fn destroy_fn(&self) -> Option<DestroyFn> {
                    self.on_destroy
                }
            }
        )+
    };
}

callback_abi!(ScalarCallback, OptionalCallback, ItemsCallback, CursorCallback);

/// Token of a registration the entry points can reach.
fn dispatchable(guard: &CallbackGuard<'_>) -> Result<CallbackToken> {
    if guard.is_global() {
        return Ok(guard.token());
    }
    let detail = format!(
        "callback {} is registered in a private arena; native invocations would be stale",
        guard.token()
    );
    diagnostics::protocol_violation(detail.clone());
    Err(Error::ProtocolViolation(detail))
}

impl<T: Primitive> ScalarCallback<T> {
    /// Struct routing to the registration behind `guard`, which must belong
    /// to [`CallbackArena::global`].
    pub fn new(guard: &CallbackGuard<'_>) -> Result<Self> {
        dispatchable(guard).map(Self::for_token)
    }

    pub fn for_token(token: CallbackToken) -> Self {
        Self {
            on_value: scalar_trampoline::<T>,
            on_destroy: Some(destroy_trampoline),
            ctx: token.as_context(),
        }
    }

    /// Invoke the callback the way native code does.
    pub fn call(&self, value: T) -> T {
        (self.on_value)(self.ctx, value)
    }
}

impl<T: Primitive> OptionalCallback<T> {
    pub fn new(guard: &CallbackGuard<'_>) -> Result<Self> {
        dispatchable(guard).map(Self::for_token)
    }

    pub fn for_token(token: CallbackToken) -> Self {
        Self {
            on_value: optional_trampoline::<T>,
            on_destroy: Some(destroy_trampoline),
            ctx: token.as_context(),
        }
    }

    /// Invoke the callback the way native code does; `None` when it declined
    /// or could not be delivered.
    pub fn call(&self, value: T) -> Option<T> {
        let mut out = T::default();
        (self.on_value)(self.ctx, value, &mut out).then_some(out)
    }
}

impl<T: Primitive> ItemsCallback<T> {
    pub fn new(guard: &CallbackGuard<'_>) -> Result<Self> {
        dispatchable(guard).map(Self::for_token)
    }

    pub fn for_token(token: CallbackToken) -> Self {
        Self {
            on_items: items_trampoline::<T>,
            on_destroy: Some(destroy_trampoline),
            ctx: token.as_context(),
        }
    }

    pub fn call(&self, items: &[T]) {
        (self.on_items)(self.ctx, items.as_ptr(), items.len())
    }
}

impl<T: Primitive> CursorCallback<T> {
    pub fn new(guard: &CallbackGuard<'_>) -> Result<Self> {
        dispatchable(guard).map(Self::for_token)
    }

    pub fn for_token(token: CallbackToken) -> Self {
        Self {
            on_cursor: cursor_trampoline::<T>,
            on_destroy: Some(destroy_trampoline),
            ctx: token.as_context(),
        }
    }

    /// # Safety
    ///
    /// `next` must be safe to call with `iter` until it returns null.
    pub unsafe fn call(&self, iter: *mut c_void, next: NextFn<T>) {
        (self.on_cursor)(self.ctx, iter, next)
    }
}

fn token_of(ctx: *mut c_void) -> Option<CallbackToken> {
    let token = CallbackToken::from_context(ctx);
    if token.is_none() {
        diagnostics::protocol_violation("callback invoked with a null context");
    }
    token
}

/// Entry point for [`ScalarCallback`].
///
/// Returns the handler's value, or `T::default()` when the invocation was
/// dropped or failed.
pub extern "C" fn scalar_trampoline<T: Primitive>(ctx: *mut c_void, value: T) -> T {
    let Some(token) = token_of(ctx) else {
        return T::default();
    };
    match CallbackArena::global().invoke_scalar(token, value.into_scalar()) {
        Ok(Some(out)) => T::from_scalar(out).unwrap_or_else(|| {
            diagnostics::protocol_violation(format!(
                "callback {token} returned {} where native expects {}",
                out.kind(),
                T::KIND
            ));
            T::default()
        }),
        Ok(None) => T::default(),
        Err(e) => {
            tracing::trace!(%token, "callback not delivered: {e}");
            T::default()
        }
    }
}

/// Entry point for [`OptionalCallback`]. Writes `out` only when answering.
pub extern "C" fn optional_trampoline<T: Primitive>(ctx: *mut c_void, value: T, out: *mut T) -> bool {
    let Some(token) = token_of(ctx) else {
        return false;
    };
    if out.is_null() {
        diagnostics::protocol_violation(format!("callback {token} invoked with a null out value"));
        return false;
    }
    match CallbackArena::global().invoke_scalar(token, value.into_scalar()) {
        Ok(Some(answer)) => match T::from_scalar(answer) {
            Some(answer) => {
                unsafe { out.write_unaligned(answer) };
                true
            }
            None => {
                diagnostics::protocol_violation(format!(
                    "callback {token} returned {} where native expects {}",
                    answer.kind(),
                    T::KIND
                ));
                false
            }
        },
        Ok(None) => false,
        Err(e) => {
            tracing::trace!(%token, "callback not delivered: {e}");
            false
        }
    }
}

/// Entry point for [`ItemsCallback`]. `items` is only read during the call.
pub extern "C" fn items_trampoline<T: Primitive>(ctx: *mut c_void, items: *const T, count: usize) {
    let Some(token) = token_of(ctx) else {
        return;
    };
    let mut items = match unsafe { Items::from_buffer(items, count) } {
        Ok(items) => items,
        Err(Error::ProtocolViolation(detail)) => {
            diagnostics::protocol_violation(format!("callback {token}: {detail}"));
            return;
        }
        Err(e) => {
            tracing::trace!(%token, "collection not delivered: {e}");
            return;
        }
    };
    if let Err(e) = CallbackArena::global().invoke_items(token, &mut items) {
        tracing::trace!(%token, "collection not delivered: {e}");
    }
}

/// Entry point for [`CursorCallback`]. The cursor is pulled at most until it
/// first returns null.
pub extern "C" fn cursor_trampoline<T: Primitive>(ctx: *mut c_void, iter: *mut c_void, next: NextFn<T>) {
    let Some(token) = token_of(ctx) else {
        return;
    };
    let mut pull = || {
        let item = unsafe { next(iter) };
        if item.is_null() {
            None
        } else {
            Some(unsafe { T::read_raw(item) }.into_scalar())
        }
    };
    let mut items = Items::from_cursor(T::KIND, &mut pull);
    if let Err(e) = CallbackArena::global().invoke_items(token, &mut items) {
        tracing::trace!(%token, "cursor not delivered: {e}");
    }
}

/// Destroy notification: the native side is done with this registration.
pub extern "C" fn destroy_trampoline(ctx: *mut c_void) {
    if let Some(token) = CallbackToken::from_context(ctx) {
        CallbackArena::global().unregister(token);
    }
}
