use super::{Hook, TransactionEvent};
use log::trace;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

static NEXT_HANDLER_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies an attached handler so it can be detached later
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

impl HandlerId {
    fn next() -> Self {
        HandlerId(NEXT_HANDLER_ID.fetch_add(1, Ordering::SeqCst))
    }
}

pub type Handler = Box<dyn FnMut(&mut TransactionEvent) + Send>;

/// A handler shared between the bus and any raise in progress. The mutex
/// gives one caller at a time the `FnMut`.
pub type SharedHandler = Arc<Mutex<Handler>>;

/// Ordered handler lists keyed by hook.
///
/// Handlers run synchronously in attach order and all of them see the same
/// payload, so a later handler observes (and may overrule) an earlier veto.
pub struct EventBus<H: Hook> {
    handlers: HashMap<H, Vec<(HandlerId, SharedHandler)>>,
}

impl<H: Hook> EventBus<H> {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    pub fn attach<F>(&mut self, hook: H, handler: F) -> HandlerId
    where
        F: FnMut(&mut TransactionEvent) + Send + 'static,
    {
        let id = HandlerId::next();
        let handler: Handler = Box::new(handler);
        self.handlers
            .entry(hook)
            .or_default()
            .push((id, Arc::new(Mutex::new(handler))));
        id
    }

    /// Returns false if `id` is not attached to `hook`
    pub fn detach(&mut self, hook: H, id: HandlerId) -> bool {
        let Some(list) = self.handlers.get_mut(&hook) else {
            return false;
        };
        let before = list.len();
        list.retain(|(handler_id, _)| *handler_id != id);
        let removed = list.len() != before;
        if list.is_empty() {
            self.handlers.remove(&hook);
        }
        removed
    }

    pub fn has_handlers(&self, hook: H) -> bool {
        self.handler_count(hook) > 0
    }

    pub fn handler_count(&self, hook: H) -> usize {
        self.handlers.get(&hook).map_or(0, Vec::len)
    }

    /// The handlers currently attached to `hook`, in attach order
    pub fn snapshot(&self, hook: H) -> Vec<SharedHandler> {
        self.handlers
            .get(&hook)
            .map(|list| list.iter().map(|(_, handler)| Arc::clone(handler)).collect())
            .unwrap_or_default()
    }

    /// Run every handler of `hook` against `event`.
    ///
    /// Returns the event's validity afterwards; always true for hooks that
    /// are not cancelable.
    pub fn raise(&self, hook: H, event: &mut TransactionEvent) -> bool {
        raise_handlers(hook, &self.snapshot(hook), event)
    }
}

/// Run a snapshot taken with [`EventBus::snapshot`].
///
/// Each handler is locked only while it runs. A caller raising the same
/// hook concurrently waits for a busy handler instead of skipping it, so a
/// handler must not re-raise the hook it is attached to.
pub fn raise_handlers<H: Hook>(hook: H, handlers: &[SharedHandler], event: &mut TransactionEvent) -> bool {
    if !handlers.is_empty() {
        trace!("Raising {} to {} handler(s)", hook, handlers.len());
    }

    for handler in handlers {
        let mut handler = handler.lock().unwrap_or_else(PoisonError::into_inner);
        (*handler)(event);
    }
    !hook.is_cancelable() || event.is_valid()
}

impl<H: Hook> Default for EventBus<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: Hook> fmt::Debug for EventBus<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: HashMap<String, usize> = self
            .handlers
            .iter()
            .map(|(hook, list)| (hook.to_string(), list.len()))
            .collect();
        f.debug_struct("EventBus").field("handlers", &counts).finish()
    }
}
