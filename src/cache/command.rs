//! User-defined invocable commands.
//!
//! A command is a named `(type, fn)` pair attached to a cache at
//! start and executed against a single key via `invoke`. Read
//! commands derive a result from the current value; write commands
//! additionally replace (or remove) the stored value, atomically with
//! respect to the key.

use std::sync::Arc;

/// A registered command over the value stored at a key.
pub enum Command<V> {
    /// Derives a result from the current value without writing.
    Read(Arc<dyn Fn(Option<&V>) -> Option<V> + Send + Sync>),
    /// Produces `(result, replacement)`; `Some(v)` writes `v` back
    /// under the default TTL, `None` removes the entry.
    Write(Arc<dyn Fn(Option<V>) -> (Option<V>, Option<V>) + Send + Sync>),
}

impl<V> Command<V> {
    pub fn read<F>(f: F) -> Self
    where
        F: Fn(Option<&V>) -> Option<V> + Send + Sync + 'static,
    {
        Command::Read(Arc::new(f))
    }

    pub fn write<F>(f: F) -> Self
    where
        F: Fn(Option<V>) -> (Option<V>, Option<V>) + Send + Sync + 'static,
    {
        Command::Write(Arc::new(f))
    }

    pub fn is_write(&self) -> bool {
        matches!(self, Command::Write(_))
    }
}

impl<V> Clone for Command<V> {
    fn clone(&self) -> Self {
        match self {
            Command::Read(f) => Command::Read(Arc::clone(f)),
            Command::Write(f) => Command::Write(Arc::clone(f)),
        }
    }
}

impl<V> std::fmt::Debug for Command<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = if self.is_write() { "write" } else { "read" };
        f.debug_tuple("Command").field(&kind).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_command_derives_without_writing() {
        let last = Command::read(|value: Option<&Vec<u32>>| {
            value.and_then(|items| items.last().copied()).map(|n| vec![n])
        });
        match &last {
            Command::Read(f) => {
                assert_eq!(f(Some(&vec![1, 2, 3])), Some(vec![3]));
                assert_eq!(f(None), None);
            }
            Command::Write(_) => panic!("expected a read command"),
        }
    }

    #[test]
    fn test_write_command_splits_result_and_replacement() {
        let pop = Command::write(|value: Option<Vec<u32>>| {
            let mut items = value.unwrap_or_default();
            let popped = items.pop().map(|n| vec![n]);
            (popped, Some(items))
        });
        match &pop {
            Command::Write(f) => {
                let (result, replacement) = f(Some(vec![1, 2, 3]));
                assert_eq!(result, Some(vec![3]));
                assert_eq!(replacement, Some(vec![1, 2]));
            }
            Command::Read(_) => panic!("expected a write command"),
        }
    }
}
