use std::{
    fmt,
    sync::{
        Weak,
        atomic::{AtomicU64, Ordering},
    },
};

use super::{Inner, has_callback, remove_callback};

static NEXT_SUBSCRIPTION_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    pub(super) fn next() -> Self {
        SubscriptionId(NEXT_SUBSCRIPTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Handle returned by [`Container::subscribe`](super::Container::subscribe).
///
/// The handle does not keep the container alive, and dropping it does not
/// cancel the subscription.
pub struct Subscription {
    container: Weak<Inner>,
    id: SubscriptionId,
}

impl Subscription {
    pub(super) fn new(container: Weak<Inner>, id: SubscriptionId) -> Self {
        Self { container, id }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Stops delivery to the callback. Dispatches already in progress may
    /// still reach it; later ones will not.
    ///
    /// Returns false if the subscription was already cancelled or the
    /// container is gone.
    pub fn cancel(&self) -> bool {
        match self.container.upgrade() {
            Some(inner) => remove_callback(&inner, self.id),
            None => false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.container
            .upgrade()
            .is_some_and(|inner| has_callback(&inner, self.id))
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}
