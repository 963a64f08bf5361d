//! Lazy ordered iteration over an [`OrderedMap`].

use std::sync::Arc;

use crate::error::Result;
use crate::store::OrderedMap;

/// Walks a map one key at a time using key navigation, in ascending or
/// descending order. Nothing is materialized up front, and keys removed
/// while the walk is in progress are skipped.
pub struct MapEntries<K, V> {
    map: Arc<dyn OrderedMap<K, V>>,
    reverse: bool,
    current: Option<K>,
    started: bool,
    finished: bool,
}

impl<K: Clone, V> MapEntries<K, V> {
    pub fn new(map: Arc<dyn OrderedMap<K, V>>) -> Self {
        Self::with_direction(map, false)
    }

    pub fn reversed(map: Arc<dyn OrderedMap<K, V>>) -> Self {
        Self::with_direction(map, true)
    }

    fn with_direction(map: Arc<dyn OrderedMap<K, V>>, reverse: bool) -> Self {
        Self {
            map,
            reverse,
            current: None,
            started: false,
            finished: false,
        }
    }

    fn advance(&mut self) -> Result<Option<K>> {
        let next = match (&self.current, self.started) {
            (_, false) => {
                self.started = true;
                if self.reverse {
                    self.map.last_key()?
                } else {
                    self.map.first_key()?
                }
            }
            (Some(key), true) => {
                if self.reverse {
                    self.map.lower_key(key)?
                } else {
                    self.map.higher_key(key)?
                }
            }
            (None, true) => None,
        };
        self.current = next.clone();
        Ok(next)
    }
}

impl<K: Clone, V> Iterator for MapEntries<K, V> {
    type Item = Result<(K, V)>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.finished {
            let key = match self.advance() {
                Ok(Some(key)) => key,
                Ok(None) => {
                    self.finished = true;
                    return None;
                }
                Err(e) => {
                    self.finished = true;
                    return Some(Err(e));
                }
            };
            match self.map.get(&key) {
                Ok(Some(value)) => return Some(Ok((key, value))),
                Ok(None) => continue,
                Err(e) => {
                    self.finished = true;
                    return Some(Err(e));
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryMap;

    #[test]
    fn test_forward_and_reverse() {
        let map: Arc<dyn OrderedMap<String, i64>> = Arc::new(MemoryMap::new("test"));
        for (k, v) in [("b", 2), ("a", 1), ("c", 3)] {
            map.put(k.to_string(), v).unwrap();
        }

        let forward: Vec<i64> = MapEntries::new(map.clone())
            .map(|e| e.unwrap().1)
            .collect();
        assert_eq!(forward, vec![1, 2, 3]);

        let backward: Vec<String> = MapEntries::reversed(map.clone())
            .map(|e| e.unwrap().0)
            .collect();
        assert_eq!(backward, vec!["c", "b", "a"]);
    }

    #[test]
    fn test_tolerates_removal_during_walk() {
        let map: Arc<dyn OrderedMap<String, i64>> = Arc::new(MemoryMap::new("test"));
        for (k, v) in [("a", 1), ("b", 2), ("c", 3)] {
            map.put(k.to_string(), v).unwrap();
        }
        let mut entries = MapEntries::new(map.clone());
        assert_eq!(entries.next().unwrap().unwrap().1, 1);
        map.remove(&"b".to_string()).unwrap();
        assert_eq!(entries.next().unwrap().unwrap().1, 3);
        assert!(entries.next().is_none());
    }
}
