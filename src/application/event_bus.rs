//! Synchronous, single-threaded publish/subscribe.
//!
//! `fire` runs every handler registered for the event's name, in registration
//! order, before it returns. The handler list is snapshotted at the start of
//! each `fire`: handlers added while an event is being delivered only see
//! later events, and a handler may safely fire further events or mutate the
//! tree that owns the bus.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::hash::Hash;
use std::rc::Rc;

use tracing::trace;
use uuid::Uuid;

use crate::domain::event::{EventName, TreeEvent};

/// An event that can be routed by name.
pub trait BusEvent {
    type Name: Copy + Eq + Hash + fmt::Debug;

    fn name(&self) -> Self::Name;
}

impl BusEvent for TreeEvent {
    type Name = EventName;

    fn name(&self) -> EventName {
        TreeEvent::name(self)
    }
}

/// Handle returned by `on`, used to unsubscribe one handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

/// Groups handlers registered by one subscriber so they can be removed together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(Uuid);

impl ContextId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ContextId {
    fn default() -> Self {
        Self::new()
    }
}

/// What `off` removes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unsubscribe<N> {
    Handler(HandlerId),
    Context(ContextId),
    ContextEvent(ContextId, N),
}

impl<N> From<HandlerId> for Unsubscribe<N> {
    fn from(id: HandlerId) -> Self {
        Unsubscribe::Handler(id)
    }
}

impl<N> From<ContextId> for Unsubscribe<N> {
    fn from(context: ContextId) -> Self {
        Unsubscribe::Context(context)
    }
}

type Handler<E> = Rc<dyn Fn(&E)>;

struct Registration<E: BusEvent> {
    id: HandlerId,
    name: E::Name,
    context: Option<ContextId>,
    handler: Handler<E>,
}

pub struct EventBus<E: BusEvent> {
    registrations: RefCell<Vec<Registration<E>>>,
    next_id: Cell<u64>,
}

impl<E: BusEvent> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: BusEvent> fmt::Debug for EventBus<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("handlers", &self.registrations.borrow().len())
            .finish()
    }
}

impl<E: BusEvent> EventBus<E> {
    pub fn new() -> Self {
        Self {
            registrations: RefCell::new(Vec::new()),
            next_id: Cell::new(0),
        }
    }

    pub fn on<F>(&self, name: E::Name, handler: F) -> HandlerId
    where
        F: Fn(&E) + 'static,
    {
        self.register(name, None, Rc::new(handler))
    }

    pub fn on_with_context<F>(&self, name: E::Name, context: ContextId, handler: F) -> HandlerId
    where
        F: Fn(&E) + 'static,
    {
        self.register(name, Some(context), Rc::new(handler))
    }

    fn register(&self, name: E::Name, context: Option<ContextId>, handler: Handler<E>) -> HandlerId {
        let id = HandlerId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        trace!(?name, ?id, "handler registered");
        self.registrations.borrow_mut().push(Registration {
            id,
            name,
            context,
            handler,
        });
        id
    }

    /// Removes matching handlers; returns how many were removed.
    pub fn off(&self, target: impl Into<Unsubscribe<E::Name>>) -> usize {
        let target = target.into();
        let mut registrations = self.registrations.borrow_mut();
        let before = registrations.len();
        registrations.retain(|r| match target {
            Unsubscribe::Handler(id) => r.id != id,
            Unsubscribe::Context(context) => r.context != Some(context),
            Unsubscribe::ContextEvent(context, name) => {
                !(r.context == Some(context) && r.name == name)
            }
        });
        before - registrations.len()
    }

    /// Delivers `event` to every handler registered for its name; returns how
    /// many handlers ran.
    pub fn fire(&self, event: &E) -> usize {
        let name = event.name();
        let snapshot: Vec<Handler<E>> = self
            .registrations
            .borrow()
            .iter()
            .filter(|r| r.name == name)
            .map(|r| Rc::clone(&r.handler))
            .collect();

        trace!(?name, handlers = snapshot.len(), "firing event");
        for handler in &snapshot {
            handler(event);
        }
        snapshot.len()
    }

    pub fn handler_count(&self, name: E::Name) -> usize {
        self.registrations
            .borrow()
            .iter()
            .filter(|r| r.name == name)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.borrow().is_empty()
    }
}
