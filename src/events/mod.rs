// ============================================================================
// Lifecycle Notifications
// ============================================================================
//
// Handlers attach to named hooks on a connection or a transaction and are
// invoked synchronously, in attach order, with a mutable event payload.
// Before-hooks are cancelable: a handler clears `is_valid` to veto.
//
// ============================================================================

pub mod bus;
pub mod event;

pub use bus::{EventBus, Handler, HandlerId, SharedHandler, raise_handlers};
pub use event::{ConnectionHook, Hook, TransactionEvent, TransactionHook};
