//! Action events and tagged outcomes.
//!
//! Every public operation is an action; the hook bus sees each action
//! as a [`CacheEvent`] before execution and a `(CacheEvent,
//! EventOutcome)` pair after. Outcomes carry the same tags the action
//! surface returns: ok, missing, commit, ignore or error.

use std::time::Duration;

use crate::error::CacheError;

/// The named operations of the action surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Get,
    Fetch,
    Set,
    Del,
    Exists,
    Count,
    Keys,
    Clear,
    Empty,
    Incr,
    Decr,
    Update,
    Take,
    Ttl,
    Expire,
    ExpireAt,
    Persist,
    Refresh,
    Touch,
    Transaction,
    Execute,
    Inspect,
    Stats,
    Invoke,
    Dump,
    Load,
    Size,
    Purge,
}

impl Action {
    /// Stable lowercase name, used in logs and stats counters.
    pub fn name(&self) -> &'static str {
        match self {
            Action::Get => "get",
            Action::Fetch => "fetch",
            Action::Set => "set",
            Action::Del => "del",
            Action::Exists => "exists",
            Action::Count => "count",
            Action::Keys => "keys",
            Action::Clear => "clear",
            Action::Empty => "empty",
            Action::Incr => "incr",
            Action::Decr => "decr",
            Action::Update => "update",
            Action::Take => "take",
            Action::Ttl => "ttl",
            Action::Expire => "expire",
            Action::ExpireAt => "expire_at",
            Action::Persist => "persist",
            Action::Refresh => "refresh",
            Action::Touch => "touch",
            Action::Transaction => "transaction",
            Action::Execute => "execute",
            Action::Inspect => "inspect",
            Action::Stats => "stats",
            Action::Invoke => "invoke",
            Action::Dump => "dump",
            Action::Load => "load",
            Action::Size => "size",
            Action::Purge => "purge",
        }
    }

    /// Whether the action can grow the keyspace. Size-bound policies
    /// react to these.
    pub fn may_grow(&self) -> bool {
        matches!(
            self,
            Action::Set
                | Action::Fetch
                | Action::Incr
                | Action::Decr
                | Action::Update
                | Action::Invoke
                | Action::Load
                | Action::Transaction
                | Action::Execute
        )
    }
}

/// Arguments of an action as seen by observers, option records
/// stripped.
#[derive(Debug, Clone)]
pub enum EventArgs<K, V> {
    None,
    Key(K),
    KeyValue(K, V, Option<Duration>),
    KeyCounter(K, i64, i64),
    KeyTtl(K, Option<Duration>),
    KeyAt(K, u64),
    Keys(Vec<K>),
    Command(String, K),
    Path(String),
}

/// A notification delivered to hooks around an action.
#[derive(Debug, Clone)]
pub struct CacheEvent<K, V> {
    pub action: Action,
    pub args: EventArgs<K, V>,
}

impl<K, V> CacheEvent<K, V> {
    pub fn new(action: Action, args: EventArgs<K, V>) -> Self {
        Self { action, args }
    }

    /// The synthetic notification emitted by lazy and Janitor purges.
    pub fn purge() -> Self {
        Self::new(Action::Purge, EventArgs::None)
    }
}

/// Payload shapes an action can produce.
#[derive(Debug, Clone, PartialEq)]
pub enum OutcomeValue<K, V> {
    Unit,
    Bool(bool),
    Count(usize),
    Int(i64),
    Value(Option<V>),
    Keys(Vec<K>),
    Duration(Option<Duration>),
}

/// Shape discriminant for [`OutcomeValue`], used to vet pre-hook
/// short-circuits against the action's return type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeKind {
    Unit,
    Bool,
    Count,
    Int,
    Value,
    Keys,
    Duration,
    /// Results no payload shape can stand in for (transactions,
    /// inspection); only error short-circuits apply.
    Opaque,
}

impl<K, V> OutcomeValue<K, V> {
    pub fn kind(&self) -> OutcomeKind {
        match self {
            OutcomeValue::Unit => OutcomeKind::Unit,
            OutcomeValue::Bool(_) => OutcomeKind::Bool,
            OutcomeValue::Count(_) => OutcomeKind::Count,
            OutcomeValue::Int(_) => OutcomeKind::Int,
            OutcomeValue::Value(_) => OutcomeKind::Value,
            OutcomeValue::Keys(_) => OutcomeKind::Keys,
            OutcomeValue::Duration(_) => OutcomeKind::Duration,
        }
    }
}

/// The tagged outcome of an action, as dispatched to post-hooks.
#[derive(Debug, Clone, PartialEq)]
pub enum EventOutcome<K, V> {
    /// The action completed with a payload.
    Ok(OutcomeValue<K, V>),
    /// A read found nothing and no fallback committed.
    Missing,
    /// A fallback produced this value and it was stored.
    Commit(V),
    /// A fallback produced this value and it was not stored.
    Ignore(V),
    /// The action failed with a tagged reason.
    Error(CacheError),
}

impl<K, V> EventOutcome<K, V> {
    /// Short tag name matching the action surface vocabulary.
    pub fn tag(&self) -> &'static str {
        match self {
            EventOutcome::Ok(_) => "ok",
            EventOutcome::Missing => "missing",
            EventOutcome::Commit(_) => "commit",
            EventOutcome::Ignore(_) => "ignore",
            EventOutcome::Error(_) => "error",
        }
    }

    /// Whether this outcome can stand in for a result of `kind`.
    ///
    /// Missing/commit/ignore are value-shaped; errors fit any action.
    pub fn matches(&self, kind: OutcomeKind) -> bool {
        match self {
            EventOutcome::Error(_) => true,
            EventOutcome::Missing | EventOutcome::Commit(_) | EventOutcome::Ignore(_) => {
                kind == OutcomeKind::Value
            }
            EventOutcome::Ok(value) => value.kind() == kind,
        }
    }
}

/// Result of a read-through action.
///
/// `Ok` is a plain hit; `Missing` a miss with nothing committed;
/// `Commit`/`Ignore` report what a fallback produced and whether it
/// was stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fetched<T> {
    Ok(T),
    Missing,
    Commit(T),
    Ignore(T),
}

impl<T> Fetched<T> {
    /// The carried value, if any.
    pub fn value(self) -> Option<T> {
        match self {
            Fetched::Ok(v) | Fetched::Commit(v) | Fetched::Ignore(v) => Some(v),
            Fetched::Missing => None,
        }
    }

    pub fn as_value(&self) -> Option<&T> {
        match self {
            Fetched::Ok(v) | Fetched::Commit(v) | Fetched::Ignore(v) => Some(v),
            Fetched::Missing => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Fetched::Missing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Outcome = EventOutcome<String, u32>;

    #[test]
    fn test_outcome_matches_shape() {
        let ok: Outcome = EventOutcome::Ok(OutcomeValue::Bool(true));
        assert!(ok.matches(OutcomeKind::Bool));
        assert!(!ok.matches(OutcomeKind::Count));

        let commit: Outcome = EventOutcome::Commit(3);
        assert!(commit.matches(OutcomeKind::Value));
        assert!(!commit.matches(OutcomeKind::Bool));

        let err: Outcome = EventOutcome::Error(CacheError::Locked);
        assert!(err.matches(OutcomeKind::Keys));
    }

    #[test]
    fn test_action_names_are_stable() {
        assert_eq!(Action::ExpireAt.name(), "expire_at");
        assert_eq!(Action::Purge.name(), "purge");
    }

    #[test]
    fn test_write_class_actions() {
        assert!(Action::Set.may_grow());
        assert!(Action::Fetch.may_grow());
        assert!(!Action::Get.may_grow());
        assert!(!Action::Del.may_grow());
    }

    #[test]
    fn test_fetched_value_extraction() {
        assert_eq!(Fetched::Ok(5).value(), Some(5));
        assert_eq!(Fetched::<i32>::Missing.value(), None);
        assert!(Fetched::<i32>::Missing.is_missing());
    }
}
