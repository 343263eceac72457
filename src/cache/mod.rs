//! The cache engine: keyspace, locksmith, expiration, hooks,
//! policies, registry, fallback and persistence.

pub mod actions;
pub mod command;
pub mod config;
pub mod entry;
pub mod events;
pub mod expiration;
pub mod fallback;
pub mod informant;
pub mod keyspace;
pub mod locksmith;
pub mod overseer;
pub mod persist;
pub mod policy;
pub mod warmer;

use std::fmt::Debug;
use std::hash::Hash;

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Bounds required of a cache key.
///
/// Keys cross worker-thread boundaries, order eviction ties and are
/// encoded into snapshots, hence the full set of bounds.
pub trait CacheKey:
    Clone + Debug + Hash + Eq + Ord + Send + Sync + Serialize + DeserializeOwned + 'static
{
}

impl<T> CacheKey for T where
    T: Clone + Debug + Hash + Eq + Ord + Send + Sync + Serialize + DeserializeOwned + 'static
{
}

/// Bounds required of a cache value.
pub trait CacheValue:
    Clone + Debug + Send + Sync + Serialize + DeserializeOwned + 'static
{
}

impl<T> CacheValue for T where T: Clone + Debug + Send + Sync + Serialize + DeserializeOwned + 'static {}

/// Values usable with the `incr`/`decr` actions.
///
/// Implemented for the primitive integer types. A value for which
/// [`CounterValue::to_int`] returns `None` makes the action fail with
/// `NonNumericValue`, which is how heterogeneous value types opt out
/// per key.
pub trait CounterValue: CacheValue {
    /// Reads the stored value as a signed counter, if numeric.
    fn to_int(&self) -> Option<i64>;
    /// Builds a stored value back from a counter.
    fn from_int(n: i64) -> Self;
}

macro_rules! impl_counter_signed {
    ($($ty:ty),*) => {
        $(impl CounterValue for $ty {
            fn to_int(&self) -> Option<i64> {
                Some(*self as i64)
            }
            fn from_int(n: i64) -> Self {
                n as $ty
            }
        })*
    };
}

macro_rules! impl_counter_unsigned {
    ($($ty:ty),*) => {
        $(impl CounterValue for $ty {
            fn to_int(&self) -> Option<i64> {
                i64::try_from(*self).ok()
            }
            fn from_int(n: i64) -> Self {
                // Unsigned counters clamp at zero rather than wrapping.
                if n < 0 { 0 } else { n as $ty }
            }
        })*
    };
}

impl_counter_signed!(i8, i16, i32, i64, isize);
impl_counter_unsigned!(u8, u16, u32, u64, usize);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_round_trip() {
        assert_eq!(<i64 as CounterValue>::from_int(41).to_int(), Some(41));
        assert_eq!(<u32 as CounterValue>::from_int(-5), 0);
        assert_eq!(<u64 as CounterValue>::to_int(&7u64), Some(7));
    }
}
