//! Keyword extractor contract and a built-in phrase extractor
//!
//! The real extraction strategies (RAKE, TF-IDF, NER) are injected by the
//! host; the contract is simply cleaned text in, weighted `RawKeyword`s
//! out. The built-in `PhraseExtractor` is a small stopword-delimited
//! candidate generator so the pipeline works out of the box.

use crate::error::{DomainError, Result};
use crate::types::RawKeyword;
use std::collections::HashMap;

/// Strategy producing raw keywords from cleaned text
pub trait KeywordExtractor: Send + Sync {
    /// Short identifier recorded as the keyword source
    fn name(&self) -> &'static str;

    /// Extract weighted terms from cleaned text
    fn extract(&self, content: &str) -> Result<Vec<RawKeyword>>;
}

/// Shared extractor tuning knobs
#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    /// Minimum characters for a candidate word
    pub min_chars: usize,
    /// Maximum words per candidate phrase
    pub max_words: usize,
    /// Minimum occurrences for a candidate to be emitted
    pub min_frequency: u32,
    /// Minimum score for a candidate to be emitted
    pub score_threshold: f64,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            min_chars: 3,
            max_words: 4,
            min_frequency: 1,
            score_threshold: 0.5,
        }
    }
}

impl ExtractorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_words == 0 {
            return Err(DomainError::Validation("max_words must be positive".into()));
        }
        if !(0.0..=1.0).contains(&self.score_threshold) {
            return Err(DomainError::Validation(
                "score_threshold must be between 0 and 1".into(),
            ));
        }
        Ok(())
    }
}

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "from", "has", "have", "in",
    "into", "is", "it", "its", "of", "on", "or", "our", "that", "the", "their", "them", "then",
    "there", "these", "they", "this", "to", "was", "we", "were", "when", "which", "will", "with",
    "you", "your",
];

/// Stopword-delimited phrase extractor.
///
/// Candidates are word n-grams (up to `max_words`) that contain no
/// stopwords; scoring favors frequency and phrase length.
pub struct PhraseExtractor {
    config: ExtractorConfig,
}

impl PhraseExtractor {
    pub fn new(config: ExtractorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    fn is_stopword(word: &str) -> bool {
        STOPWORDS.contains(&word)
    }

    /// Base score: frequency and length both help, capped at 1.0
    fn score(frequency: u32, word_count: usize) -> f64 {
        let frequency_part = 0.15 * f64::from(frequency.min(3));
        let length_part = 0.1 * word_count.min(3) as f64;
        (0.3 + frequency_part + length_part).min(1.0)
    }
}

impl KeywordExtractor for PhraseExtractor {
    fn name(&self) -> &'static str {
        "phrase"
    }

    fn extract(&self, content: &str) -> Result<Vec<RawKeyword>> {
        // split into content-word runs, breaking on stopwords and punctuation
        let mut runs: Vec<Vec<String>> = Vec::new();
        let mut current: Vec<String> = Vec::new();

        for token in content.split(|c: char| c.is_whitespace() || ".,;:!?()[]\"'".contains(c)) {
            let word = token.trim().to_lowercase();
            if word.is_empty() || Self::is_stopword(&word) || word.len() < self.config.min_chars {
                if !current.is_empty() {
                    runs.push(std::mem::take(&mut current));
                }
                continue;
            }
            current.push(word);
        }
        if !current.is_empty() {
            runs.push(current);
        }

        // candidate n-grams within each run
        let mut frequencies: HashMap<String, u32> = HashMap::new();
        for run in &runs {
            for window in 1..=self.config.max_words.min(run.len()) {
                for gram in run.windows(window) {
                    let phrase = gram.join(" ");
                    *frequencies.entry(phrase).or_default() += 1;
                }
            }
        }

        let mut keywords: Vec<RawKeyword> = frequencies
            .into_iter()
            .filter(|(_, frequency)| *frequency >= self.config.min_frequency)
            .filter_map(|(phrase, frequency)| {
                let word_count = phrase.split_whitespace().count();
                let score = Self::score(frequency, word_count);
                if score < self.config.score_threshold {
                    return None;
                }
                Some(RawKeyword::new(phrase, score, self.name()).with_frequency(frequency))
            })
            .collect();

        keywords.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.text.cmp(&b.text))
        });
        Ok(keywords)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor() -> PhraseExtractor {
        PhraseExtractor::new(ExtractorConfig::default()).unwrap()
    }

    #[test]
    fn test_extracts_repeated_terms() {
        let content = "Graph databases store graph data. Neo4j is a graph database.";
        let keywords = extractor().extract(content).unwrap();

        let texts: Vec<&str> = keywords.iter().map(|kw| kw.text.as_str()).collect();
        assert!(texts.contains(&"graph"), "got {texts:?}");
        assert!(texts.contains(&"neo4j"), "got {texts:?}");
        assert!(texts.iter().any(|t| t.contains("graph database")));
    }

    #[test]
    fn test_stopwords_break_phrases() {
        let keywords = extractor().extract("rust is fast").unwrap();
        assert!(keywords.iter().all(|kw| !kw.text.contains("is")));
    }

    #[test]
    fn test_score_threshold_filters() {
        let config = ExtractorConfig {
            score_threshold: 0.95,
            ..Default::default()
        };
        let keywords = PhraseExtractor::new(config)
            .unwrap()
            .extract("one two three")
            .unwrap();
        assert!(keywords.is_empty());
    }

    #[test]
    fn test_frequency_counted_across_sentences() {
        let keywords = extractor()
            .extract("neo4j here. neo4j there. neo4j everywhere.")
            .unwrap();
        let neo4j = keywords.iter().find(|kw| kw.text == "neo4j").unwrap();
        assert_eq!(neo4j.frequency, 3);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = ExtractorConfig {
            max_words: 0,
            ..Default::default()
        };
        assert!(PhraseExtractor::new(config).is_err());
    }
}
