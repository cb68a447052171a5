//! Process-wide audio backend initialization.
//!
//! The platform audio host is initialized once and shared by every backend in
//! the process. Each user holds a [`BackendToken`]; the host context is torn
//! down when the last token is dropped and re-initialized on the next request.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::{Error, Result};

static REGISTRY: Mutex<Weak<BackendContext>> = Mutex::new(Weak::new());

#[derive(Debug)]
struct BackendContext {
    host: cpal::HostId,
}

impl Drop for BackendContext {
    fn drop(&mut self) {
        tracing::info!(host = self.host.name(), "audio backend released");
    }
}

/// Shared handle keeping the process-wide audio host initialized.
#[derive(Debug, Clone)]
pub struct BackendToken {
    context: Arc<BackendContext>,
}

impl BackendToken {
    /// Host API selected at initialization.
    pub fn host_id(&self) -> cpal::HostId {
        self.context.host
    }

    /// Opens the selected host.
    pub fn host(&self) -> Result<cpal::Host> {
        cpal::host_from_id(self.context.host)
            .map_err(|e| Error::DeviceUnavailable(e.to_string()))
    }
}

/// Returns a token for the process-wide audio host, initializing it if no
/// other token is alive.
pub fn ensure_backend_initialized() -> Result<BackendToken> {
    let mut registry = REGISTRY.lock();
    if let Some(context) = registry.upgrade() {
        return Ok(BackendToken { context });
    }

    let host = cpal::default_host().id();
    let context = Arc::new(BackendContext { host });
    *registry = Arc::downgrade(&context);
    tracing::info!(host = host.name(), "audio backend initialized");
    Ok(BackendToken { context })
}

/// Number of live [`BackendToken`]s.
pub fn backend_refcount() -> usize {
    REGISTRY.lock().strong_count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens_share_one_context() {
        let a = ensure_backend_initialized().unwrap();
        let b = ensure_backend_initialized().unwrap();
        assert!(Arc::ptr_eq(&a.context, &b.context));
        assert_eq!(a.host_id(), b.host_id());
        // other tests may hold tokens concurrently
        assert!(backend_refcount() >= 2);
    }
}
