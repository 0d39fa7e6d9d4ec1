//! # Stash
//!
//! Request-scoped values handed from one sub-reconciler to a later one in the
//! same pass. A fresh [`Stash`] is created for every reconcile request and
//! dropped when the request completes, so nothing leaks between requests.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;

/// Typed name of a stash entry
///
/// Declare keys as constants next to the sub-reconciler that writes them:
///
/// ```
/// use riff_system::controller::stash::{Stash, StashKey};
///
/// const LATEST_IMAGE: StashKey<String> = StashKey::new("latest-image");
///
/// let mut stash = Stash::new();
/// stash.store_value(LATEST_IMAGE, "registry.example.com/app@sha256:abc".to_string());
/// assert_eq!(
///     stash.retrieve_value(LATEST_IMAGE).map(String::as_str),
///     Some("registry.example.com/app@sha256:abc")
/// );
/// ```
pub struct StashKey<T> {
    name: &'static str,
    _value: PhantomData<fn() -> T>,
}

impl<T> StashKey<T> {
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _value: PhantomData,
        }
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> Clone for StashKey<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for StashKey<T> {}

impl<T> fmt::Debug for StashKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("StashKey").field(&self.name).finish()
    }
}

#[derive(Default)]
pub struct Stash {
    values: HashMap<&'static str, Box<dyn Any + Send + Sync>>,
}

impl fmt::Debug for Stash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<_> = self.values.keys().collect();
        keys.sort();
        f.debug_struct("Stash").field("keys", &keys).finish()
    }
}

impl Stash {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` under `key`, replacing any earlier value
    pub fn store_value<T: Any + Send + Sync>(&mut self, key: StashKey<T>, value: T) {
        self.values.insert(key.name, Box::new(value));
    }

    /// The value stored under `key`
    ///
    /// Returns `None` when nothing was stored or the stored value has a
    /// different type than the key.
    #[must_use]
    pub fn retrieve_value<T: Any + Send + Sync>(&self, key: StashKey<T>) -> Option<&T> {
        self.values.get(key.name)?.downcast_ref::<T>()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADDRESSES: StashKey<Vec<String>> = StashKey::new("stream-addresses");
    const COUNT: StashKey<u32> = StashKey::new("count");

    #[test]
    fn test_missing_key_is_none() {
        let stash = Stash::new();
        assert!(stash.retrieve_value(COUNT).is_none());
    }

    #[test]
    fn test_store_replaces_previous_value() {
        let mut stash = Stash::new();
        stash.store_value(COUNT, 1);
        stash.store_value(COUNT, 2);

        assert_eq!(stash.retrieve_value(COUNT), Some(&2));
        assert_eq!(stash.len(), 1);
    }

    #[test]
    fn test_type_mismatch_is_none() {
        const SAME_NAME: StashKey<String> = StashKey::new("count");
        let mut stash = Stash::new();
        stash.store_value(COUNT, 7);

        assert!(stash.retrieve_value(SAME_NAME).is_none());
    }

    #[test]
    fn test_values_are_isolated_per_stash() {
        let mut first = Stash::new();
        first.store_value(ADDRESSES, vec!["a".to_string()]);
        let second = Stash::new();

        assert!(second.is_empty());
        assert_eq!(first.retrieve_value(ADDRESSES).map(Vec::len), Some(1));
    }
}
