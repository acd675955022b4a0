//! Bounded two-generation map used for key sets and DPoP nonces.
//!
//! Entries live in a *hot* generation until it fills up, at which point the hot
//! map becomes the *cold* one and the previous cold map is dropped wholesale.
//! A read that hits the cold generation copies the entry back into hot, so an
//! entry survives for at least one full generation after it was last touched.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;

#[derive(Debug, Clone)]
pub struct GenerationCache<K, V> {
    max_size: usize,
    hot: HashMap<K, V>,
    cold: HashMap<K, V>,
}

impl<K, V> GenerationCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size: max_size.max(1),
            hot: HashMap::new(),
            cold: HashMap::new(),
        }
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn get<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        if let Some(value) = self.hot.get(key) {
            return Some(value.clone());
        }
        let (key, value) = self
            .cold
            .get_key_value(key)
            .map(|(k, v)| (k.clone(), v.clone()))?;
        self.update(key, value.clone());
        Some(value)
    }

    pub fn has<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.hot.contains_key(key) || self.cold.contains_key(key)
    }

    pub fn set(&mut self, key: K, value: V) {
        match self.hot.get_mut(&key) {
            Some(slot) => *slot = value,
            None => self.update(key, value),
        }
    }

    /// Remove `key` from both generations, returning whether it was present.
    pub fn delete<Q>(&mut self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        let hot = self.hot.remove(key).is_some();
        let cold = self.cold.remove(key).is_some();
        hot || cold
    }

    fn update(&mut self, key: K, value: V) {
        self.hot.insert(key, value);
        if self.hot.len() >= self.max_size {
            self.cold = std::mem::take(&mut self.hot);
        }
    }
}

impl<K, V> Default for GenerationCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new(100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hot_then_cold_lookup() {
        let mut cache = GenerationCache::new(3);
        cache.set("a", 1);
        cache.set("b", 2);
        assert_eq!(cache.get("a"), Some(1));
        assert!(cache.has("b"));
        assert!(!cache.has("z"));
        assert_eq!(cache.get("z"), None);
    }

    #[test]
    fn rollover_promotes_and_discards() {
        let mut cache = GenerationCache::new(3);
        cache.set("k1", 1);
        cache.set("k2", 2);
        // third write fills hot; everything moves to cold
        cache.set("k3", 3);
        cache.set("k4", 4);

        // k1 sits in cold and is promoted back on read
        assert_eq!(cache.get("k1"), Some(1));

        // next rollover: hot = {k4, k1, k5}
        cache.set("k5", 5);
        assert_eq!(cache.get("k1"), Some(1));
        assert_eq!(cache.get("k4"), Some(4));

        // k2 and k3 were never touched after the first rollover
        assert!(!cache.has("k2"));
        assert!(!cache.has("k3"));
        assert_eq!(cache.get("k2"), None);
    }

    #[test]
    fn overwrite_in_hot_does_not_roll_over() {
        let mut cache = GenerationCache::new(2);
        cache.set("a", 1);
        cache.set("a", 2);
        cache.set("a", 3);
        assert_eq!(cache.get("a"), Some(3));
        cache.set("b", 1);
        // rolled over once; both still reachable through cold
        assert_eq!(cache.get("a"), Some(3));
        assert_eq!(cache.get("b"), Some(1));
    }

    #[test]
    fn delete_clears_both_generations() {
        let mut cache = GenerationCache::new(2);
        cache.set("a", 1);
        cache.set("b", 2);
        // promote a into hot while it also remains in cold
        assert_eq!(cache.get("a"), Some(1));
        assert!(cache.delete("a"));
        assert!(!cache.has("a"));
        assert_eq!(cache.get("a"), None);
        assert!(!cache.delete("a"));
    }
}
