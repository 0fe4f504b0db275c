//! Symbol to submission index mapping.
//!
//! The oracle contract addresses assets by numeric index, the rest of
//! the client by symbol. The mapping is resolved once at startup and is
//! read-only afterwards.

use std::collections::HashMap;

use dashmap::DashMap;

/// Bidirectional symbol/index registry, populated at startup.
#[derive(Debug, Default)]
pub struct AssetRegistry {
    by_symbol: DashMap<String, u32>,
    by_index: DashMap<u32, String>,
}

impl AssetRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, symbol: impl Into<String>, index: u32) {
        let symbol = symbol.into();
        self.by_symbol.insert(symbol.clone(), index);
        self.by_index.insert(index, symbol);
    }

    #[must_use]
    pub fn index_of(&self, symbol: &str) -> Option<u32> {
        self.by_symbol.get(symbol).map(|e| *e)
    }

    #[must_use]
    pub fn symbol_of(&self, index: u32) -> Option<String> {
        self.by_index.get(&index).map(|e| e.clone())
    }

    /// Whether every configured symbol has a resolved index. Submitting
    /// with a partial registry would batch wrong indices, so the
    /// scheduler refuses to work epochs until this holds.
    #[must_use]
    pub fn covers(&self, symbols: &[String]) -> bool {
        symbols.iter().all(|s| self.by_symbol.contains_key(s))
    }

    /// Index to symbol snapshot for the confirmation listener.
    #[must_use]
    pub fn index_map(&self) -> HashMap<u32, String> {
        self.by_index
            .iter()
            .map(|e| (*e.key(), e.value().clone()))
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_symbol.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_symbol.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_both_directions() {
        let registry = AssetRegistry::new();
        registry.insert("XRP", 0);
        registry.insert("BTC", 2);

        assert_eq!(registry.index_of("XRP"), Some(0));
        assert_eq!(registry.index_of("BTC"), Some(2));
        assert_eq!(registry.index_of("DOGE"), None);
        assert_eq!(registry.symbol_of(2), Some("BTC".to_string()));
        assert_eq!(registry.symbol_of(1), None);
    }

    #[test]
    fn test_covers() {
        let registry = AssetRegistry::new();
        registry.insert("XRP", 0);
        registry.insert("BTC", 2);

        assert!(registry.covers(&["XRP".to_string()]));
        assert!(registry.covers(&["XRP".to_string(), "BTC".to_string()]));
        assert!(!registry.covers(&["XRP".to_string(), "DOGE".to_string()]));
        assert!(registry.covers(&[]));
    }

    #[test]
    fn test_index_map_snapshot() {
        let registry = AssetRegistry::new();
        registry.insert("XRP", 0);
        let map = registry.index_map();
        assert_eq!(map.get(&0), Some(&"XRP".to_string()));
        assert_eq!(map.len(), 1);
    }
}
