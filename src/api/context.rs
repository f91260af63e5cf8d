//! Purpose: RAII wrapper around a GEOS context handle.
//! Exports: `Context`.
//! Role: Installs the notice/error handlers on creation and tears the context down on drop.
//! Invariants: A `Context` always holds a non-null handle from `initGEOS_r`.
//! Invariants: `finishGEOS_r` is resolved before the context is created, so drop cannot fail.
//! Invariants: The context holds the library handle, so GEOS stays mapped until after `finishGEOS_r`.
//! Invariants: `Send` but not `Sync`; a context must not be used from two threads at once.
use std::ptr::NonNull;
use std::sync::Arc;

use crate::core::error::{Error, ErrorKind};
use crate::core::func::LazyFunc;
use crate::core::handlers::{error_handler, notice_handler};
use crate::core::loader::NativeLibrary;
use crate::core::sys::{ContextPtr, FinishFn, GEOSContextHandle_t, InitFn, MessageHandler};

pub struct Context {
    handle: NonNull<GEOSContextHandle_t>,
    finish: FinishFn,
    // Dropped after `drop` runs `finish`.
    _library: Arc<dyn NativeLibrary>,
}

// GEOS contexts may migrate between threads as long as calls are not concurrent.
unsafe impl Send for Context {}

impl Context {
    pub(crate) fn create(
        library: Arc<dyn NativeLibrary>,
        init: &LazyFunc<InitFn>,
        finish: &LazyFunc<FinishFn>,
    ) -> Result<Self, Error> {
        let finish = finish.resolve()?;
        let raw = unsafe {
            init.call((
                notice_handler as MessageHandler,
                error_handler as MessageHandler,
            ))
        }?;
        let handle = NonNull::new(raw).ok_or_else(|| {
            Error::new(ErrorKind::Geos)
                .with_message("GEOS returned a null context")
                .with_symbol(init.name())
        })?;
        tracing::debug!("created GEOS context");
        Ok(Self {
            handle,
            finish,
            _library: library,
        })
    }

    pub fn as_ptr(&self) -> ContextPtr {
        self.handle.as_ptr()
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        unsafe { (self.finish)(self.handle.as_ptr()) };
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("handle", &self.handle)
            .finish()
    }
}
