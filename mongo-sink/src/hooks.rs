use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use tracing::warn;

use crate::Error;

type Notify = Arc<dyn Fn() + Send + Sync>;
type NotifyError = Arc<dyn Fn(Error) + Send + Sync>;

/// Caller-supplied lifecycle notifications, each independently optional with
/// a no-op default.
///
/// Hooks are an informational side channel: they carry backend lifecycle
/// events (reconnect, error, timeout, closure) out of the sink without
/// affecting data flow. A panic inside a hook is caught and logged so it can
/// never reach the sequencer or the session.
#[derive(Clone, Default)]
pub struct LifecycleHooks {
    on_reconnect: Option<Notify>,
    on_error: Option<NotifyError>,
    on_timeout: Option<Notify>,
    on_close: Option<Notify>,
}

impl LifecycleHooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fired when the backend recovers from a transient disruption.
    pub fn on_reconnect(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_reconnect = Some(Arc::new(hook));
        self
    }

    /// Fired once per failed write and once per write that never got a
    /// connection. This is the only failure channel of the sink.
    pub fn on_error(mut self, hook: impl Fn(Error) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(hook));
        self
    }

    /// Fired when the backend reports a timed-out heartbeat. Informational
    /// only; the corresponding write still resolves through the normal path.
    pub fn on_timeout(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_timeout = Some(Arc::new(hook));
        self
    }

    /// Fired when the connection is released at shutdown.
    pub fn on_close(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_close = Some(Arc::new(hook));
        self
    }

    pub(crate) fn reconnected(&self) {
        if let Some(hook) = &self.on_reconnect {
            isolate("on_reconnect", || hook());
        }
    }

    pub(crate) fn error(&self, cause: Error) {
        if let Some(hook) = &self.on_error {
            isolate("on_error", || hook(cause));
        }
    }

    pub(crate) fn timed_out(&self) {
        if let Some(hook) = &self.on_timeout {
            isolate("on_timeout", || hook());
        }
    }

    pub(crate) fn closed(&self) {
        if let Some(hook) = &self.on_close {
            isolate("on_close", || hook());
        }
    }
}

fn isolate(name: &str, hook: impl FnOnce()) {
    if catch_unwind(AssertUnwindSafe(hook)).is_err() {
        warn!(hook = name, "lifecycle hook panicked");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn test_default_hooks_are_noops() {
        let hooks = LifecycleHooks::new();
        hooks.reconnected();
        hooks.error(Error::Other("ignored".to_string()));
        hooks.timed_out();
        hooks.closed();
    }

    #[test]
    fn test_hooks_receive_events() {
        let reconnects = Arc::new(AtomicUsize::new(0));
        let errors = Arc::new(AtomicUsize::new(0));
        let hooks = LifecycleHooks::new()
            .on_reconnect({
                let reconnects = Arc::clone(&reconnects);
                move || {
                    reconnects.fetch_add(1, Ordering::SeqCst);
                }
            })
            .on_error({
                let errors = Arc::clone(&errors);
                move |cause| {
                    assert!(matches!(cause, Error::Other(_)));
                    errors.fetch_add(1, Ordering::SeqCst);
                }
            });

        hooks.reconnected();
        hooks.error(Error::Other("boom".to_string()));
        hooks.error(Error::Other("boom".to_string()));
        assert_eq!(reconnects.load(Ordering::SeqCst), 1);
        assert_eq!(errors.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_panicking_hook_is_isolated() {
        let closes = Arc::new(AtomicUsize::new(0));
        let hooks = LifecycleHooks::new()
            .on_error(|_| panic!("hook blew up"))
            .on_close({
                let closes = Arc::clone(&closes);
                move || {
                    closes.fetch_add(1, Ordering::SeqCst);
                }
            });

        hooks.error(Error::Other("boom".to_string()));
        // The session must still be usable after a hook panic.
        hooks.closed();
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }
}
