//! Keyword processing: normalization, merging, and scoring
//!
//! Raw keywords from any number of extractors are grouped by normalized
//! text, merged into canonical forms, scored with source-decay weighting,
//! and emitted as validated `KeywordIdentifier`s.

use crate::error::{DomainError, Result};
use crate::keyword::{KeywordIdentifier, KeywordNormalizer, KeywordValidator, VariantManager};
use crate::types::{KeywordType, RawKeyword};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info};

/// Scoring parameters
const CONFIDENCE_THRESHOLD: f64 = 0.4;
const SOURCE_DECAY_RATE: f64 = 0.7;
const MAX_SOURCES: usize = 5;
const EMIT_THRESHOLD: f64 = 0.3;

/// Configuration for keyword processing
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// Minimum aggregated score to keep a keyword
    pub min_score: f64,
    /// Maximum number of variants tracked per keyword
    pub max_variants: usize,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            min_score: EMIT_THRESHOLD,
            max_variants: 5,
        }
    }
}

impl ProcessorConfig {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.min_score) {
            return Err(DomainError::Validation(
                "min_score must be between 0 and 1".into(),
            ));
        }
        if self.max_variants == 0 {
            return Err(DomainError::Validation(
                "max_variants must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Turns raw extractor output into deduplicated, scored keywords
pub struct KeywordProcessor {
    config: ProcessorConfig,
    normalizer: KeywordNormalizer,
    variants: VariantManager,
    validator: KeywordValidator,
}

impl KeywordProcessor {
    pub fn new(
        config: ProcessorConfig,
        normalizer: KeywordNormalizer,
        variants: VariantManager,
        validator: KeywordValidator,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            normalizer,
            variants,
            validator,
        })
    }

    pub fn with_defaults() -> Self {
        Self {
            config: ProcessorConfig::default(),
            normalizer: KeywordNormalizer::new(),
            variants: VariantManager::new(),
            validator: KeywordValidator::default(),
        }
    }

    pub fn normalizer(&self) -> &KeywordNormalizer {
        &self.normalizer
    }

    /// Process raw keywords from multiple extractors into canonical,
    /// validated keywords
    pub fn process_keywords(&self, raw_groups: &[Vec<RawKeyword>]) -> Vec<KeywordIdentifier> {
        let grouped = self.group_by_normalized_text(raw_groups);

        let mut processed = Vec::new();
        let mut seen_canonicals: HashSet<String> = HashSet::new();

        for (normalized, group) in &grouped {
            let variant_texts: HashSet<&str> = group.iter().map(|kw| kw.text.as_str()).collect();
            let Some(canonical) = self.variants.get_canonical_form(variant_texts.iter().copied())
            else {
                continue;
            };

            // the same canonical can surface under several normalized keys;
            // only the first wins
            if !seen_canonicals.insert(canonical.clone()) {
                continue;
            }

            let score = self.calculate_score(group);
            if score < self.config.min_score {
                debug!(keyword = %canonical, score, "dropped below minimum score");
                continue;
            }

            let keyword_type = self.infer_type(group);
            let mut identifier = KeywordIdentifier::new(
                group[0].text.clone(),
                canonical,
                normalized.clone(),
                keyword_type,
                (score * 100.0).round() / 100.0,
            );
            for text in variant_texts.iter().take(self.config.max_variants) {
                identifier.add_variant(*text);
            }

            if self.validator.is_valid(&identifier) {
                processed.push(identifier);
            } else {
                debug!(keyword = %identifier.canonical_text, "keyword failed validation");
            }
        }

        info!(
            raw = raw_groups.iter().map(Vec::len).sum::<usize>(),
            unique = processed.len(),
            "processed raw keywords"
        );

        processed
    }

    /// Group all raw keywords across extractors by their normalized text.
    /// BTreeMap keeps the emission order deterministic.
    fn group_by_normalized_text(
        &self,
        raw_groups: &[Vec<RawKeyword>],
    ) -> BTreeMap<String, Vec<RawKeyword>> {
        let mut grouped: BTreeMap<String, Vec<RawKeyword>> = BTreeMap::new();
        for group in raw_groups {
            for keyword in group {
                let normalized = self.normalizer.normalize(&keyword.text);
                grouped.entry(normalized).or_default().push(keyword.clone());
            }
        }
        grouped
    }

    /// Aggregate a score across sources.
    ///
    /// Raw keywords below the confidence floor are discarded; the rest are
    /// taken score-descending, each weighted by `0.7^k` for the k-th source
    /// up to five sources. The per-source combined score is
    /// `0.6 * score + 0.4 * (frequency / max(1, frequency))`. The frequency
    /// ratio is always 1.0 for positive frequencies; the term stays so a
    /// caller-supplied denominator can slot in later without changing the
    /// score-first ordering, since the raw score remains dominant.
    fn calculate_score(&self, keywords: &[RawKeyword]) -> f64 {
        if keywords.is_empty() {
            return 0.0;
        }

        let mut sorted: Vec<&RawKeyword> = keywords.iter().collect();
        sorted.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

        let mut total_score = 0.0;
        let mut total_weight = 0.0;
        let mut sources_used = 0usize;

        for keyword in sorted {
            if keyword.score < CONFIDENCE_THRESHOLD {
                continue;
            }
            if sources_used >= MAX_SOURCES {
                break;
            }

            let weight = SOURCE_DECAY_RATE.powi(sources_used as i32);
            let frequency_ratio = f64::from(keyword.frequency) / f64::from(keyword.frequency.max(1));
            let combined = keyword.score * 0.6 + frequency_ratio * 0.4;

            total_score += combined * weight;
            total_weight += weight;
            sources_used += 1;
        }

        if total_weight <= 0.0 {
            return 0.0;
        }

        let normalized = (total_score / total_weight).clamp(0.0, 1.0);
        if normalized > EMIT_THRESHOLD {
            normalized
        } else {
            0.0
        }
    }

    /// Infer the keyword type: explicit extractor metadata wins, then
    /// phrases longer than two tokens are concepts, everything else a term
    fn infer_type(&self, keywords: &[RawKeyword]) -> KeywordType {
        for keyword in keywords {
            if let Some(Value::String(explicit)) = keyword.metadata.get("keyword_type") {
                if let Some(keyword_type) = KeywordType::parse(explicit) {
                    return keyword_type;
                }
            }
        }

        if keywords[0].text.split_whitespace().count() > 2 {
            KeywordType::Concept
        } else {
            KeywordType::Term
        }
    }
}
