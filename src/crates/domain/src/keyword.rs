//! Keyword identity, normalization, and variant handling

use crate::types::KeywordType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashMap};

/// Canonical representation of an extracted term.
///
/// Identity is a stable hash of `(canonical_text, keyword_type)`, so the
/// same concept extracted from different documents resolves to the same
/// keyword node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordIdentifier {
    /// Stable identifier derived from the canonical form and type
    pub id: String,
    /// Original form as extracted
    pub text: String,
    /// Best form, used for identity
    pub canonical_text: String,
    /// Lowercased, whitespace-collapsed form used for matching
    pub normalized_text: String,
    /// Known textual variations; ordered for stable serialization
    pub variants: BTreeSet<String>,
    pub keyword_type: KeywordType,
    pub score: f64,
    pub metadata: HashMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl KeywordIdentifier {
    pub fn new(
        text: impl Into<String>,
        canonical_text: impl Into<String>,
        normalized_text: impl Into<String>,
        keyword_type: KeywordType,
        score: f64,
    ) -> Self {
        let text = text.into();
        let canonical_text = canonical_text.into();
        let normalized_text = normalized_text.into();

        let mut variants = BTreeSet::new();
        variants.insert(text.clone());
        variants.insert(canonical_text.clone());

        let now = Utc::now();
        Self {
            id: Self::generate_id(&canonical_text, keyword_type),
            text,
            canonical_text,
            normalized_text,
            variants,
            keyword_type,
            score,
            metadata: HashMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Deterministic identifier: `kw_` plus the first 16 hex characters of
    /// the SHA-256 of `{canonical}:{type}`
    pub fn generate_id(canonical_text: &str, keyword_type: KeywordType) -> String {
        let mut hasher = Sha256::new();
        hasher.update(canonical_text.as_bytes());
        hasher.update(b":");
        hasher.update(keyword_type.as_str().as_bytes());
        let digest = hasher.finalize();
        let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
        format!("kw_{}", &hex[..16])
    }

    pub fn add_variant(&mut self, variant: impl Into<String>) {
        self.variants.insert(variant.into());
        self.updated_at = Utc::now();
    }

    /// Whether the text matches any known variant
    pub fn matches(&self, text: &str) -> bool {
        self.variants.contains(text)
    }

    /// Replace the canonical form; the identifier is re-derived
    pub fn update_canonical(&mut self, new_canonical: impl Into<String>) {
        let new_canonical = new_canonical.into();
        self.variants.insert(new_canonical.clone());
        self.id = Self::generate_id(&new_canonical, self.keyword_type);
        self.canonical_text = new_canonical;
        self.updated_at = Utc::now();
    }
}

/// Text normalization for keyword matching
#[derive(Debug, Clone, Default)]
pub struct KeywordNormalizer;

impl KeywordNormalizer {
    pub fn new() -> Self {
        Self
    }

    /// Lowercase and collapse whitespace
    pub fn normalize(&self, text: &str) -> String {
        text.to_lowercase()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Basic stem folding: strip a small adjective suffix set, otherwise
    /// just trim
    pub fn canonicalize(&self, text: &str, _keyword_type: KeywordType) -> String {
        const SUFFIXES: [&str; 5] = ["ian", "ish", "ese", "ic", "al"];

        let normalized = text.to_lowercase();
        let normalized = normalized.trim();
        for suffix in SUFFIXES {
            if let Some(stem) = normalized.strip_suffix(suffix) {
                return stem.to_string();
            }
        }
        text.trim().to_string()
    }
}

/// Variant detection and canonical-form selection
#[derive(Debug, Clone, Default)]
pub struct VariantManager {
    normalizer: KeywordNormalizer,
}

impl VariantManager {
    pub fn new() -> Self {
        Self {
            normalizer: KeywordNormalizer::new(),
        }
    }

    /// Two forms are variants when their normalized forms match, or one
    /// contains the other with a length difference of at most three
    pub fn is_variant(&self, a: &str, b: &str) -> bool {
        let norm_a = self.normalizer.normalize(a);
        let norm_b = self.normalizer.normalize(b);

        if norm_a == norm_b {
            return true;
        }

        if norm_a.contains(&norm_b) || norm_b.contains(&norm_a) {
            let len_diff = norm_a.len().abs_diff(norm_b.len());
            if len_diff <= 3 {
                return true;
            }
        }

        false
    }

    /// Choose the best canonical form: the longest variant, ties broken
    /// lexicographically
    pub fn get_canonical_form<'a, I>(&self, variants: I) -> Option<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        variants
            .into_iter()
            .max_by(|a, b| a.len().cmp(&b.len()).then(b.cmp(a)))
            .map(str::to_string)
    }
}

/// Structural checks applied to processed keywords before they are kept
#[derive(Debug, Clone)]
pub struct KeywordValidator {
    min_length: usize,
    max_length: usize,
}

impl Default for KeywordValidator {
    fn default() -> Self {
        Self {
            min_length: 2,
            max_length: 100,
        }
    }
}

impl KeywordValidator {
    pub fn new(min_length: usize, max_length: usize) -> Self {
        Self {
            min_length,
            max_length,
        }
    }

    pub fn is_valid(&self, keyword: &KeywordIdentifier) -> bool {
        let canonical = keyword.canonical_text.trim();
        if canonical.len() < self.min_length || canonical.len() > self.max_length {
            return false;
        }
        // reject pure punctuation or digits
        if !canonical.chars().any(|c| c.is_alphabetic()) {
            return false;
        }
        if !keyword.variants.contains(&keyword.canonical_text) {
            return false;
        }
        (0.0..=1.0).contains(&keyword.score)
    }
}
