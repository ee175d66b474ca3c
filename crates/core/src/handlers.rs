//! Subscriber registry.
//!
//! Handlers live in an [`IndexMap`] keyed by [`HandlerId`], so removal is O(1)
//! and delivery follows registration order.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::Mutex;
use skooly_protocol::ChatEvent;
use skooly_runtime::EventSink;
use tracing::trace;

/// Unique identifier for event handlers.
pub type HandlerId = u64;

static NEXT_HANDLER_ID: AtomicU64 = AtomicU64::new(1);

/// Returns a new globally-unique handler ID.
pub fn next_handler_id() -> HandlerId {
	NEXT_HANDLER_ID.fetch_add(1, Ordering::SeqCst)
}

/// Handler function invoked with every chat event.
pub type HandlerFn = Arc<dyn Fn(ChatEvent) + Send + Sync>;

type HandlerMap = Arc<Mutex<IndexMap<HandlerId, HandlerFn>>>;

/// Ordered set of event handlers shared by all clones of a session.
#[derive(Clone, Default)]
pub struct Subscribers {
	handlers: HandlerMap,
}

impl Subscribers {
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers `handler` and returns the handle that can remove it.
	pub fn subscribe<F>(&self, handler: F) -> Subscription
	where
		F: Fn(ChatEvent) + Send + Sync + 'static,
	{
		let id = next_handler_id();
		self.handlers.lock().insert(id, Arc::new(handler));
		trace!(id, "subscriber registered");
		Subscription::from_handler_map(id, &self.handlers)
	}

	pub fn len(&self) -> usize {
		self.handlers.lock().len()
	}

	pub fn is_empty(&self) -> bool {
		self.handlers.lock().is_empty()
	}
}

impl EventSink for Subscribers {
	/// Invokes every handler in registration order.
	///
	/// Handlers run on a snapshot taken outside the lock, so a handler may
	/// subscribe or unsubscribe without deadlocking.
	fn emit(&self, event: ChatEvent) {
		let handlers: Vec<HandlerFn> = self.handlers.lock().values().cloned().collect();
		trace!(count = handlers.len(), ?event, "delivering chat event");
		for handler in handlers {
			handler(event.clone());
		}
	}
}

impl std::fmt::Debug for Subscribers {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Subscribers").field("len", &self.len()).finish()
	}
}

/// Handle for a registered handler.
///
/// Dropping the handle leaves the handler registered for the life of the
/// session; call [`unsubscribe`](Self::unsubscribe) to remove it. Holds a
/// weak reference to the registry, so unsubscribing after the session is gone
/// is a no-op.
pub struct Subscription {
	id: HandlerId,
	handlers: Weak<Mutex<IndexMap<HandlerId, HandlerFn>>>,
}

impl Subscription {
	fn from_handler_map(id: HandlerId, handlers: &HandlerMap) -> Self {
		Self {
			id,
			handlers: Arc::downgrade(handlers),
		}
	}

	/// Returns this subscription's handler ID.
	pub fn id(&self) -> HandlerId {
		self.id
	}

	/// Removes the handler. Events already being delivered may still reach it.
	pub fn unsubscribe(self) {
		if let Some(map) = self.handlers.upgrade() {
			map.lock().shift_remove(&self.id);
			trace!(id = self.id, "subscriber removed");
		}
	}
}

impl std::fmt::Debug for Subscription {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Subscription")
			.field("id", &self.id)
			.field("active", &(self.handlers.strong_count() > 0))
			.finish()
	}
}
