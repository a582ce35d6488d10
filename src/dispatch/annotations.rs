//! 关键词注释过滤
//!
//! 下游行内注释按「整词、大小写不敏感」在文本中查找关键词；找不到的关键词无法渲染，
//! 在这里直接丢弃。

use regex::RegexBuilder;

use crate::progress::KeywordMetadata;

/// `word` 是否以整词形式出现在 `text` 中（忽略大小写）
pub fn occurs_in(word: &str, text: &str) -> bool {
    let word = word.trim();
    if word.is_empty() {
        return false;
    }
    let pattern = format!(r"\b{}\b", regex::escape(word));
    match RegexBuilder::new(&pattern).case_insensitive(true).build() {
        Ok(re) => re.is_match(text),
        Err(_) => false,
    }
}

/// 只保留至少出现在一段候选文本中的关键词
pub fn retain_anchored(keywords: Vec<KeywordMetadata>, texts: &[&str]) -> Vec<KeywordMetadata> {
    keywords
        .into_iter()
        .filter(|k| {
            let kept = texts.iter().any(|t| occurs_in(&k.word, t));
            if !kept {
                tracing::debug!(word = %k.word, "Dropping keyword not found in annotated text");
            }
            kept
        })
        .collect()
}
