use chrono::{DateTime, Utc};

/// A fact recorded by an aggregate (invoice issued, tenant registered, ...).
///
/// Events are immutable, versioned and append-only.
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable name, e.g. `"billing.invoice.paid"`.
    fn event_type(&self) -> &'static str;

    /// Schema version of this event type.
    fn version(&self) -> u32;

    /// Business time of the fact.
    fn occurred_at(&self) -> DateTime<Utc>;
}
