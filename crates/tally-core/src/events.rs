//! Typed publish/subscribe feed of tree state changes.
//!
//! Observers (UI, persistence) subscribe by [`EventKind`] and optionally by
//! the [`NodeId`] they care about. Matching compares stored ids, never
//! object identity.

use std::fmt;

use serde::Serialize;

use crate::node::{GoalScope, NodeId, RecordingPolicy};
use crate::stat::Millis;

/// Whether an entity is a file or a folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    File,
    Folder,
}

/// Discriminant of [`TallyEvent`], used as a subscription key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Created,
    Renamed,
    Deleted,
    WordsChanged,
    GoalSet,
    TitleSet,
    RecordingPolicySet,
}

/// A state transition of one entity.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TallyEvent {
    Created {
        id: NodeId,
        kind: EntityKind,
        path: String,
    },
    Renamed {
        id: NodeId,
        old_path: String,
        new_path: String,
    },
    Deleted {
        id: NodeId,
        kind: EntityKind,
        path: String,
    },
    WordsChanged {
        id: NodeId,
        old: u64,
        new: u64,
        at: Millis,
    },
    GoalSet {
        id: NodeId,
        scope: GoalScope,
        old: u64,
        new: u64,
    },
    TitleSet {
        id: NodeId,
        old: Option<String>,
        new: Option<String>,
    },
    RecordingPolicySet {
        id: NodeId,
        old: RecordingPolicy,
        new: RecordingPolicy,
    },
}

impl TallyEvent {
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            TallyEvent::Created { .. } => EventKind::Created,
            TallyEvent::Renamed { .. } => EventKind::Renamed,
            TallyEvent::Deleted { .. } => EventKind::Deleted,
            TallyEvent::WordsChanged { .. } => EventKind::WordsChanged,
            TallyEvent::GoalSet { .. } => EventKind::GoalSet,
            TallyEvent::TitleSet { .. } => EventKind::TitleSet,
            TallyEvent::RecordingPolicySet { .. } => EventKind::RecordingPolicySet,
        }
    }

    /// The entity the event is about.
    #[must_use]
    pub fn entity(&self) -> NodeId {
        match self {
            TallyEvent::Created { id, .. }
            | TallyEvent::Renamed { id, .. }
            | TallyEvent::Deleted { id, .. }
            | TallyEvent::WordsChanged { id, .. }
            | TallyEvent::GoalSet { id, .. }
            | TallyEvent::TitleSet { id, .. }
            | TallyEvent::RecordingPolicySet { id, .. } => *id,
        }
    }
}

/// Handle returned by [`EventDispatcher::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Handler = Box<dyn FnMut(&TallyEvent)>;

struct Subscription {
    id: SubscriptionId,
    kind: EventKind,
    entity: Option<NodeId>,
    handler: Handler,
}

/// Registry of subscriptions keyed by `(kind, optional entity)`.
#[derive(Default)]
pub struct EventDispatcher {
    next_id: u64,
    subscriptions: Vec<Subscription>,
}

impl fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("subscriptions", &self.subscriptions.len())
            .finish()
    }
}

impl EventDispatcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for events of `kind`. With `entity` set, only
    /// events about that entity are delivered.
    pub fn subscribe(
        &mut self,
        kind: EventKind,
        entity: Option<NodeId>,
        handler: impl FnMut(&TallyEvent) + 'static,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.subscriptions.push(Subscription {
            id,
            kind,
            entity,
            handler: Box::new(handler),
        });
        id
    }

    /// Remove a subscription. Returns false if it was already gone.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscriptions.len();
        self.subscriptions.retain(|s| s.id != id);
        self.subscriptions.len() != before
    }

    /// Deliver an event to every matching subscription, in subscription order.
    pub fn emit(&mut self, event: &TallyEvent) {
        let kind = event.kind();
        let entity = event.entity();
        for sub in &mut self.subscriptions {
            if sub.kind == kind && sub.entity.is_none_or(|e| e == entity) {
                (sub.handler)(event);
            }
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }
}
