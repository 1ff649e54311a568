use std::sync::Arc;

use crate::engine::{Engine, ErrorPtr};
use crate::error::{AnnError, Result};
use crate::handle::Handle;

/// Owns the error context shared by every engine call of one index.
///
/// [`ErrorChannel::call`] is the only path into the engine: it passes the
/// context as the trailing argument, inspects it right after the call and
/// clears it before surfacing a failure, so a stale message never leaks into
/// the next call.
pub struct ErrorChannel {
    engine: Arc<dyn Engine>,
    context: Handle<ErrorPtr>,
}

impl ErrorChannel {
    pub fn new(engine: Arc<dyn Engine>) -> Self {
        let raw = engine.create_error_object();
        let release_engine = Arc::clone(&engine);
        let context = Handle::acquire(raw, move |err| release_engine.destroy_error_object(err));
        Self { engine, context }
    }

    /// For release functions only; they take no error context.
    pub(crate) fn engine(&self) -> &Arc<dyn Engine> {
        &self.engine
    }

    pub fn call<R>(&self, f: impl FnOnce(&dyn Engine, ErrorPtr) -> R) -> Result<R> {
        let err = self.context.value();
        let value = f(self.engine.as_ref(), err);
        if let Some(message) = self.engine.error_string(err).filter(|m| !m.is_empty()) {
            self.engine.clear_error_string(err);
            return Err(AnnError::Engine(message));
        }
        Ok(value)
    }

    /// Destroys the error context. Later calls are not allowed.
    pub(crate) fn release(&mut self) -> bool {
        self.context.release()
    }
}
