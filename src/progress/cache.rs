//! 生成缓存：内容单元 ID -> 已生成文本
//!
//! 条目一经写入不会被本层淘汰或失效；命中即「免费展示，不扣账本」。
//! 注意：缓存没有容量上限，随课程单元数线性增长。

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GenerationCache {
    entries: BTreeMap<String, String>,
}

impl GenerationCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// 写入并返回新缓存
    pub fn put(mut self, key: impl Into<String>, content: impl Into<String>) -> Self {
        self.entries.insert(key.into(), content.into());
        self
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_then_get() {
        let cache = GenerationCache::new()
            .put("e_alphabet", "## Fonética")
            .put("i_past", "## Pretérito");
        assert_eq!(cache.get("e_alphabet"), Some("## Fonética"));
        assert_eq!(cache.get("i_past"), Some("## Pretérito"));
        assert_eq!(cache.get("c_subjunctive"), None);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_serializes_as_plain_map() {
        let cache = GenerationCache::new().put("u1", "text");
        let json = serde_json::to_string(&cache).unwrap();
        assert_eq!(json, r#"{"u1":"text"}"#);
        let back: GenerationCache = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cache);
    }
}
