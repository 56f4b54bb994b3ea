//! Regex compile cache keyed by `(pattern, flags)` (spec.md §4.3).
//!
//! One `RegexCache` is shared (via `Arc`) across every expression compiled
//! for a single plan, so a `regex-match` predicate that is re-evaluated per
//! row never recompiles its pattern.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use regex::{Regex, RegexBuilder};

#[derive(Debug, Default)]
pub struct RegexCache {
    compiled: Mutex<HashMap<(String, String), Arc<Regex>>>,
}

impl RegexCache {
    pub fn new() -> Arc<RegexCache> {
        Arc::new(RegexCache::default())
    }

    pub fn get_or_compile(&self, pattern: &str, flags: &str) -> Result<Arc<Regex>, regex::Error> {
        let key = (pattern.to_owned(), flags.to_owned());
        let mut compiled = self.compiled.lock().expect("regex cache poisoned");
        if let Some(re) = compiled.get(&key) {
            return Ok(Arc::clone(re));
        }
        let mut builder = RegexBuilder::new(pattern);
        builder.case_insensitive(flags.contains('i'));
        builder.multi_line(flags.contains('m'));
        builder.dot_matches_new_line(flags.contains('s'));
        let re = Arc::new(builder.build()?);
        compiled.insert(key, Arc::clone(&re));
        Ok(re)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reuses_compiled_pattern() {
        let cache = RegexCache::new();
        let a = cache.get_or_compile("^a.*z$", "").unwrap();
        let b = cache.get_or_compile("^a.*z$", "").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn distinguishes_flags() {
        let cache = RegexCache::new();
        let a = cache.get_or_compile("abc", "").unwrap();
        let b = cache.get_or_compile("abc", "i").unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
    }
}
