//! Registry of caller callbacks addressed by opaque tokens.
//!
//! Native code never holds a reference to caller code, only a token. An
//! invocation looks the token up; a token that is no longer registered is
//! dropped as stale instead of reaching freed memory.

use std::cell::RefCell;
use std::ffi::c_void;
use std::fmt;
use std::num::NonZeroU64;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::Lazy;
use parking_lot::ReentrantMutex;

use super::items::Items;
use crate::diagnostics::{self, DiagnosticEvent};
use crate::error::{Error, Result};
use crate::marshal::{Primitive, Scalar};

static GLOBAL: Lazy<CallbackArena> = Lazy::new(CallbackArena::new);
static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

/// Opaque identifier native code carries as its callback context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackToken(NonZeroU64);

impl CallbackToken {
    fn next() -> Self {
        let raw = NEXT_TOKEN.fetch_add(1, Ordering::Relaxed);
        // The counter starts at 1 and a u64 does not wrap in practice.
        Self(NonZeroU64::new(raw).unwrap_or(NonZeroU64::MIN))
    }

    pub fn get(self) -> u64 {
        self.0.get()
    }

    /// The token as the `void*` context handed to native code.
    pub fn as_context(self) -> *mut c_void {
        self.0.get() as usize as *mut c_void
    }

    /// Recover a token from a native context; `None` for null.
    pub fn from_context(ctx: *mut c_void) -> Option<Self> {
        NonZeroU64::new(ctx as usize as u64).map(Self)
    }
}

impl fmt::Display for CallbackToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Handler for single-value callbacks. The returned value, if any, goes
/// back to native code.
pub type ScalarHandler = Box<dyn FnMut(Scalar) -> Result<Option<Scalar>> + Send>;

/// Handler invoked at most once.
pub type OnceHandler = Box<dyn FnOnce(Scalar) -> Result<()> + Send>;

/// How a collection callback receives its items.
pub enum CollectionShape {
    /// Iterate the native sequence in place, within the call.
    Lazy(Box<dyn for<'a> FnMut(&mut Items<'a>) -> Result<()> + Send>),
    /// Receive a copy made before control returns to native code.
    Materialized(Box<dyn FnMut(Arc<[Scalar]>) -> Result<()> + Send>),
}

impl fmt::Debug for CollectionShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CollectionShape::Lazy(_) => f.write_str("Lazy"),
            CollectionShape::Materialized(_) => f.write_str("Materialized"),
        }
    }
}

/// What a registration accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationKind {
    Scalar,
    Collection,
    OneShot,
}

enum Handler {
    Scalar(ScalarHandler),
    Collection(CollectionShape),
    OneShot(OnceHandler),
}

/// One registered callback.
///
/// The handler sits behind a lock: invocations of the same registration are
/// serialized, and a reentrant invocation from inside the handler is refused.
pub struct Registration {
    kind: RegistrationKind,
    handler: ReentrantMutex<RefCell<Option<Handler>>>,
}

impl Registration {
    fn new(handler: Handler) -> Self {
        let kind = match handler {
            Handler::Scalar(_) => RegistrationKind::Scalar,
            Handler::Collection(_) => RegistrationKind::Collection,
            Handler::OneShot(_) => RegistrationKind::OneShot,
        };
        Self {
            kind,
            handler: ReentrantMutex::new(RefCell::new(Some(handler))),
        }
    }

    pub fn kind(&self) -> RegistrationKind {
        self.kind
    }
}

/// Token-keyed table of live callback registrations.
pub struct CallbackArena {
    entries: DashMap<u64, Arc<Registration>>,
}

impl Default for CallbackArena {
    fn default() -> Self {
        Self::new()
    }
}

impl CallbackArena {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// The arena the C-ABI trampolines dispatch into.
    pub fn global() -> &'static CallbackArena {
        &GLOBAL
    }

    fn insert(&self, handler: Handler) -> CallbackGuard<'_> {
        let token = CallbackToken::next();
        let registration = Arc::new(Registration::new(handler));
        tracing::debug!(%token, kind = ?registration.kind, "callback registered");
        self.entries.insert(token.get(), registration);
        CallbackGuard {
            arena: self,
            token,
            armed: true,
        }
    }

    pub fn register_scalar(&self, handler: ScalarHandler) -> CallbackGuard<'_> {
        self.insert(Handler::Scalar(handler))
    }

    pub fn register_collection(&self, shape: CollectionShape) -> CallbackGuard<'_> {
        self.insert(Handler::Collection(shape))
    }

    pub fn register_once(&self, handler: OnceHandler) -> CallbackGuard<'_> {
        self.insert(Handler::OneShot(handler))
    }

    /// A typed value callback returning a value to native code.
    pub fn register_scalar_fn<T, R>(&self, mut f: impl FnMut(T) -> R + Send + 'static) -> CallbackGuard<'_>
    where
        T: Primitive,
        R: Primitive,
    {
        self.register_scalar(Box::new(move |value| {
            let value = expect_kind::<T>(value)?;
            Ok(Some(f(value).into_scalar()))
        }))
    }

    /// A typed value callback whose return value native code ignores.
    pub fn register_sink<T: Primitive>(&self, mut f: impl FnMut(T) + Send + 'static) -> CallbackGuard<'_> {
        self.register_scalar(Box::new(move |value| {
            f(expect_kind::<T>(value)?);
            Ok(None)
        }))
    }

    /// A typed value callback that may decline to answer; native code then
    /// keeps its own value.
    pub fn register_optional_fn<T, R>(
        &self,
        mut f: impl FnMut(T) -> Option<R> + Send + 'static,
    ) -> CallbackGuard<'_>
    where
        T: Primitive,
        R: Primitive,
    {
        self.register_scalar(Box::new(move |value| {
            let value = expect_kind::<T>(value)?;
            Ok(f(value).map(Primitive::into_scalar))
        }))
    }

    pub fn register_once_fn<T: Primitive>(&self, f: impl FnOnce(T) + Send + 'static) -> CallbackGuard<'_> {
        self.register_once(Box::new(move |value| {
            f(expect_kind::<T>(value)?);
            Ok(())
        }))
    }

    /// A collection callback iterating native items in place.
    pub fn register_lazy<T: Primitive>(
        &self,
        mut f: impl FnMut(&mut dyn Iterator<Item = T>) + Send + 'static,
    ) -> CallbackGuard<'_> {
        self.register_collection(CollectionShape::Lazy(Box::new(move |items: &mut Items<'_>| {
            let mut typed = items.typed::<T>().map_err(reported)?;
            f(&mut typed);
            Ok(())
        })))
    }

    /// A collection callback receiving an owned copy of the items.
    pub fn register_collected<T: Primitive>(
        &self,
        mut f: impl FnMut(Vec<T>) + Send + 'static,
    ) -> CallbackGuard<'_> {
        self.register_collection(CollectionShape::Materialized(Box::new(move |items: Arc<[Scalar]>| {
            let values = items
                .iter()
                .map(|item| expect_kind::<T>(*item))
                .collect::<Result<Vec<T>>>()?;
            f(values);
            Ok(())
        })))
    }

    fn lookup(&self, token: CallbackToken) -> Result<Arc<Registration>> {
        match self.entries.get(&token.get()) {
            Some(entry) => Ok(entry.value().clone()),
            None => Err(stale(token)),
        }
    }

    /// Deliver one value.
    pub fn invoke_scalar(&self, token: CallbackToken, value: Scalar) -> Result<Option<Scalar>> {
        // A one-shot leaves the table before it runs, so only one invoker
        // can ever win it.
        if let Some((_, registration)) = self
            .entries
            .remove_if(&token.get(), |_, r| r.kind == RegistrationKind::OneShot)
        {
            return run_once(token, &registration, value).map(|()| None);
        }

        let registration = self.lookup(token)?;
        with_handler(token, &registration, |handler| match handler {
            Handler::Scalar(f) => contain(token, || f(value)),
            _ => Err(violation(format!(
                "callback {token} is a {:?} registration, got a single value",
                registration.kind
            ))),
        })
    }

    /// Deliver a collection.
    pub fn invoke_items(&self, token: CallbackToken, items: &mut Items<'_>) -> Result<()> {
        let registration = self.lookup(token)?;
        with_handler(token, &registration, |handler| match handler {
            Handler::Collection(CollectionShape::Lazy(f)) => contain(token, || f(items)),
            Handler::Collection(CollectionShape::Materialized(f)) => {
                let copied: Arc<[Scalar]> = items.by_ref().collect();
                contain(token, || f(copied))
            }
            _ => Err(violation(format!(
                "callback {token} is a {:?} registration, got a collection",
                registration.kind
            ))),
        })
    }

    /// Remove a registration. Returns whether it was still registered.
    ///
    /// An invocation already running finishes; later ones are stale.
    pub fn unregister(&self, token: CallbackToken) -> bool {
        let removed = self.entries.remove(&token.get()).is_some();
        if removed {
            tracing::debug!(%token, "callback unregistered");
        }
        removed
    }

    pub fn is_registered(&self, token: CallbackToken) -> bool {
        self.entries.contains_key(&token.get())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn stale(token: CallbackToken) -> Error {
    diagnostics::report(DiagnosticEvent::StaleCallback { token: token.get() });
    Error::StaleCallback { token: token.get() }
}

fn violation(detail: String) -> Error {
    diagnostics::protocol_violation(detail.clone());
    Error::ProtocolViolation(detail)
}

fn reported(err: Error) -> Error {
    if let Error::ProtocolViolation(detail) = &err {
        diagnostics::protocol_violation(detail.clone());
    }
    err
}

fn expect_kind<T: Primitive>(value: Scalar) -> Result<T> {
    T::from_scalar(value).ok_or_else(|| {
        violation(format!("expected a {} payload, native sent {}", T::KIND, value.kind()))
    })
}

/// Run caller code without letting a panic unwind into native frames.
fn contain<R>(token: CallbackToken, f: impl FnOnce() -> Result<R>) -> Result<R> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(_) => {
            diagnostics::report(DiagnosticEvent::CallbackPanicked { token: token.get() });
            Err(Error::CallbackPanicked { token: token.get() })
        }
    }
}

fn with_handler<R>(
    token: CallbackToken,
    registration: &Registration,
    f: impl FnOnce(&mut Handler) -> Result<R>,
) -> Result<R> {
    let lock = registration.handler.lock();
    let Ok(mut slot) = lock.try_borrow_mut() else {
        return Err(violation(format!("callback {token} invoked reentrantly")));
    };
    match slot.as_mut() {
        Some(handler) => f(handler),
        None => Err(stale(token)),
    }
}

fn run_once(token: CallbackToken, registration: &Registration, value: Scalar) -> Result<()> {
    let handler = {
        let lock = registration.handler.lock();
        let Ok(mut slot) = lock.try_borrow_mut() else {
            return Err(violation(format!("callback {token} invoked reentrantly")));
        };
        slot.take()
    };
    match handler {
        Some(Handler::OneShot(f)) => {
            tracing::debug!(%token, "one-shot callback consumed");
            contain(token, || f(value))
        }
        _ => Err(stale(token)),
    }
}

/// Keeps a registration alive; dropping it unregisters.
pub struct CallbackGuard<'a> {
    arena: &'a CallbackArena,
    token: CallbackToken,
    armed: bool,
}

impl CallbackGuard<'_> {
    pub fn token(&self) -> CallbackToken {
        self.token
    }

    /// Whether the registration lives in [`CallbackArena::global`], the only
    /// arena the C entry points dispatch into.
    pub fn is_global(&self) -> bool {
        std::ptr::eq(self.arena, CallbackArena::global())
    }

    /// Unregister now.
    pub fn unregister(mut self) -> bool {
        self.armed = false;
        self.arena.unregister(self.token)
    }

    /// Leave the registration in place after this guard drops.
    ///
    /// The native side then owns it and ends it through its destroy
    /// notification; a one-shot also ends when it fires.
    pub fn detach(mut self) -> CallbackToken {
        self.armed = false;
        self.token
    }
}

impl Drop for CallbackGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.arena.unregister(self.token);
        }
    }
}

impl fmt::Debug for CallbackGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackGuard")
            .field("token", &self.token)
            .field("armed", &self.armed)
            .finish()
    }
}
