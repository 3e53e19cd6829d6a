//! Keyword relationship detection and evidence tracking
//!
//! The relationship manager takes the processed keywords of one document
//! plus its cleaned content and produces typed, evidence-backed edges.
//! Semantic detection needs an injected similarity model; contextual
//! detection needs an injected sentence segmenter. Both stay optional so
//! the engine degrades to hierarchical detection alone.

use crate::types::{KeywordType, RelationType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Maximum confidence boost contributed by additional evidence
const MAX_EVIDENCE_BOOST: f64 = 0.5;
/// Boost per piece of evidence beyond the first
const EVIDENCE_BOOST_STEP: f64 = 0.1;

/// Semantic similarity thresholds
const SIMILARITY_THRESHOLD: f64 = 0.80;
const SYNONYM_THRESHOLD: f64 = 0.95;
/// Cap on semantic edges per keyword
const MAX_RELATIONSHIPS_PER_KEYWORD: usize = 5;

/// Text similarity provider, typically backed by an NLP model
pub trait SimilarityModel: Send + Sync {
    /// Similarity of two texts in [0, 1]
    fn similarity(&self, a: &str, b: &str) -> f64;
}

/// Splits cleaned content into sentences
pub trait SentenceSegmenter: Send + Sync {
    fn split(&self, content: &str) -> Vec<String>;
}

/// A supporting observation for a relationship
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationshipEvidence {
    /// Full text containing both keywords
    pub sentence_text: String,
    pub sentence_id: usize,
    /// Character range of the source keyword
    pub source_position: (usize, usize),
    /// Character range of the target keyword
    pub target_position: (usize, usize),
    /// Confidence of this observation alone
    pub confidence: f64,
    /// How the observation was made (detection method, raw scores)
    pub metadata: HashMap<String, serde_json::Value>,
}

/// A directed or undirected relationship between two keywords
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordRelationship {
    pub source_id: String,
    pub target_id: String,
    pub relation_type: RelationType,
    pub evidence: Vec<RelationshipEvidence>,
    pub confidence: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl KeywordRelationship {
    pub fn new(
        source_id: impl Into<String>,
        target_id: impl Into<String>,
        relation_type: RelationType,
    ) -> Self {
        let now = Utc::now();
        Self {
            source_id: source_id.into(),
            target_id: target_id.into(),
            relation_type,
            evidence: Vec::new(),
            confidence: 0.0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Add evidence and recompute confidence with diminishing returns:
    /// `min(1.0, max_evidence_confidence + 0.1 * (n - 1))`, boost capped
    /// at 0.5
    pub fn add_evidence(&mut self, evidence: RelationshipEvidence) {
        self.evidence.push(evidence);
        self.updated_at = Utc::now();

        let base = self
            .evidence
            .iter()
            .map(|e| e.confidence)
            .fold(0.0_f64, f64::max);
        let boost = MAX_EVIDENCE_BOOST
            .min((self.evidence.len().saturating_sub(1)) as f64 * EVIDENCE_BOOST_STEP);
        self.confidence = (base + boost).min(1.0);
    }
}

/// A relationship prepared for graph storage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredRelationship {
    pub source_id: String,
    pub target_id: String,
    pub relation_type: RelationType,
    pub confidence: f64,
    pub evidence_count: usize,
    pub evidence: Vec<RelationshipEvidence>,
}

/// Lightweight keyword view handed to the relationship manager
#[derive(Debug, Clone)]
pub struct KeywordRef {
    pub id: String,
    pub canonical_text: String,
    pub keyword_type: KeywordType,
}

/// Detects and accumulates relationships for one document at a time.
///
/// Edges are keyed by the full `(source, target, type)` triple, so a pair
/// of keywords can carry, say, a RELATED and a HIERARCHICAL edge at once.
pub struct RelationshipManager {
    relationships: HashMap<(String, String, RelationType), KeywordRelationship>,
    keyword_types: HashMap<String, KeywordType>,
    similarity: Option<std::sync::Arc<dyn SimilarityModel>>,
    segmenter: Option<std::sync::Arc<dyn SentenceSegmenter>>,
}

impl RelationshipManager {
    pub fn new() -> Self {
        Self {
            relationships: HashMap::new(),
            keyword_types: HashMap::new(),
            similarity: None,
            segmenter: None,
        }
    }

    pub fn with_similarity_model(mut self, model: std::sync::Arc<dyn SimilarityModel>) -> Self {
        self.similarity = Some(model);
        self
    }

    pub fn with_segmenter(mut self, segmenter: std::sync::Arc<dyn SentenceSegmenter>) -> Self {
        self.segmenter = Some(segmenter);
        self
    }

    pub fn register_keyword(&mut self, keyword_id: &str, keyword_type: KeywordType) {
        self.keyword_types
            .insert(keyword_id.to_string(), keyword_type);
    }

    /// Run all detection passes for one document.
    ///
    /// Previous state is cleared first; the manager only ever holds edges
    /// for the current document.
    pub fn detect_relationships(&mut self, keywords: &[KeywordRef], content: &str, document_id: &str) {
        self.relationships.clear();

        if keywords.len() < 2 {
            return;
        }
        if document_id.is_empty() {
            warn!("missing document id, skipping relationship detection");
            return;
        }

        for keyword in keywords {
            self.register_keyword(&keyword.id, keyword.keyword_type);
        }

        debug!(
            document_id,
            keyword_count = keywords.len(),
            "detecting keyword relationships"
        );

        self.detect_semantic(keywords);
        self.detect_contextual(keywords, content);
        self.detect_hierarchical(keywords);
    }

    /// Pairwise similarity via the injected model. RELATED above 0.80,
    /// SYNONYM above 0.95, at most five edges per keyword.
    fn detect_semantic(&mut self, keywords: &[KeywordRef]) {
        let Some(model) = self.similarity.clone() else {
            return;
        };

        let mut edge_counts: HashMap<String, usize> = HashMap::new();

        for (i, source) in keywords.iter().enumerate() {
            for target in keywords.iter().skip(i + 1) {
                let source_count = edge_counts.get(&source.id).copied().unwrap_or(0);
                let target_count = edge_counts.get(&target.id).copied().unwrap_or(0);
                if source_count >= MAX_RELATIONSHIPS_PER_KEYWORD
                    || target_count >= MAX_RELATIONSHIPS_PER_KEYWORD
                {
                    continue;
                }

                let similarity = model.similarity(&source.canonical_text, &target.canonical_text);
                if similarity <= SIMILARITY_THRESHOLD {
                    continue;
                }

                let relation_type = if similarity > SYNONYM_THRESHOLD {
                    RelationType::Synonym
                } else {
                    RelationType::Related
                };

                let mut metadata = HashMap::new();
                metadata.insert("detection_method".to_string(), json!("semantic_similarity"));
                metadata.insert("similarity".to_string(), json!(similarity));

                let evidence = RelationshipEvidence {
                    sentence_text: format!(
                        "Semantic relationship: {} ~ {}",
                        source.canonical_text, target.canonical_text
                    ),
                    sentence_id: 0,
                    source_position: (0, source.canonical_text.len()),
                    target_position: (0, target.canonical_text.len()),
                    confidence: similarity,
                    metadata,
                };

                self.add_relationship(&source.id, &target.id, relation_type, evidence);
                *edge_counts.entry(source.id.clone()).or_default() += 1;
                *edge_counts.entry(target.id.clone()).or_default() += 1;
            }
        }
    }

    /// Sentence co-occurrence with proximity scoring
    /// `1 / (|pos_source - pos_target| + 1)`; only the best sentence per
    /// pair becomes evidence.
    fn detect_contextual(&mut self, keywords: &[KeywordRef], content: &str) {
        let Some(segmenter) = &self.segmenter else {
            return;
        };

        let sentences = segmenter.split(content);
        if sentences.is_empty() {
            return;
        }

        for (i, source) in keywords.iter().enumerate() {
            for target in keywords.iter().skip(i + 1) {
                let source_lower = source.canonical_text.to_lowercase();
                let target_lower = target.canonical_text.to_lowercase();

                let mut best: Option<(usize, &str, f64, usize, usize)> = None;
                for (sentence_id, sentence) in sentences.iter().enumerate() {
                    let lower = sentence.to_lowercase();
                    let (Some(source_pos), Some(target_pos)) =
                        (lower.find(&source_lower), lower.find(&target_lower))
                    else {
                        continue;
                    };

                    let proximity = 1.0 / (source_pos.abs_diff(target_pos) as f64 + 1.0);
                    if best.map_or(true, |(_, _, p, _, _)| proximity > p) {
                        best = Some((sentence_id, sentence, proximity, source_pos, target_pos));
                    }
                }

                if let Some((sentence_id, sentence, proximity, source_pos, target_pos)) = best {
                    let mut metadata = HashMap::new();
                    metadata.insert("detection_method".to_string(), json!("sentence_proximity"));
                    metadata.insert("distance_score".to_string(), json!(proximity));

                    let evidence = RelationshipEvidence {
                        sentence_text: sentence.to_string(),
                        sentence_id,
                        source_position: (source_pos, source_pos + source_lower.len()),
                        target_position: (target_pos, target_pos + target_lower.len()),
                        confidence: proximity,
                        metadata,
                    };
                    self.add_relationship(&source.id, &target.id, RelationType::Related, evidence);
                }
            }
        }
    }

    /// Substring containment; CONCEPT containing TERM becomes HIERARCHICAL,
    /// anything else RELATED
    fn detect_hierarchical(&mut self, keywords: &[KeywordRef]) {
        for (i, source) in keywords.iter().enumerate() {
            for target in keywords.iter().skip(i + 1) {
                let source_text = &source.canonical_text;
                let target_text = &target.canonical_text;

                if !source_text.contains(target_text.as_str())
                    && !target_text.contains(source_text.as_str())
                {
                    continue;
                }

                let relation_type = if source.keyword_type == KeywordType::Concept
                    && target.keyword_type == KeywordType::Term
                {
                    RelationType::Hierarchical
                } else {
                    RelationType::Related
                };

                let mut metadata = HashMap::new();
                metadata.insert("detection_method".to_string(), json!("substring_hierarchy"));
                metadata.insert(
                    "source_type".to_string(),
                    json!(source.keyword_type.as_str()),
                );
                metadata.insert(
                    "target_type".to_string(),
                    json!(target.keyword_type.as_str()),
                );

                let evidence = RelationshipEvidence {
                    sentence_text: format!("{source_text} contains or extends {target_text}"),
                    sentence_id: 0,
                    source_position: (0, source_text.len()),
                    target_position: (0, target_text.len()),
                    confidence: 0.8,
                    metadata,
                };
                self.add_relationship(&source.id, &target.id, relation_type, evidence);
            }
        }
    }

    /// Add or extend a relationship.
    ///
    /// Symmetric types are stored with `source_id < target_id`; duplicate
    /// `(source, target, type)` edges merge by concatenating evidence,
    /// which recomputes confidence.
    pub fn add_relationship(
        &mut self,
        source_id: &str,
        target_id: &str,
        relation_type: RelationType,
        mut evidence: RelationshipEvidence,
    ) {
        self.keyword_types
            .entry(source_id.to_string())
            .or_insert(KeywordType::Term);
        self.keyword_types
            .entry(target_id.to_string())
            .or_insert(KeywordType::Term);

        let (source_id, target_id) = if relation_type.is_symmetric() && source_id > target_id {
            std::mem::swap(&mut evidence.source_position, &mut evidence.target_position);
            (target_id.to_string(), source_id.to_string())
        } else {
            (source_id.to_string(), target_id.to_string())
        };

        let key = (source_id.clone(), target_id.clone(), relation_type);
        let relationship = self
            .relationships
            .entry(key)
            .or_insert_with(|| KeywordRelationship::new(source_id, target_id, relation_type));
        relationship.add_evidence(evidence);
    }

    /// Look up a relationship of the given type, checking the reverse
    /// direction for symmetric types
    pub fn get_relationship(
        &self,
        source_id: &str,
        target_id: &str,
        relation_type: RelationType,
    ) -> Option<&KeywordRelationship> {
        if let Some(rel) = self.relationships.get(&(
            source_id.to_string(),
            target_id.to_string(),
            relation_type,
        )) {
            return Some(rel);
        }
        if !relation_type.is_symmetric() {
            return None;
        }
        self.relationships.get(&(
            target_id.to_string(),
            source_id.to_string(),
            relation_type,
        ))
    }

    /// All relationships between two keywords, regardless of type; the
    /// reverse direction matches for symmetric types
    pub fn relationships_between(
        &self,
        source_id: &str,
        target_id: &str,
    ) -> Vec<&KeywordRelationship> {
        self.relationships
            .values()
            .filter(|rel| {
                (rel.source_id == source_id && rel.target_id == target_id)
                    || (rel.relation_type.is_symmetric()
                        && rel.source_id == target_id
                        && rel.target_id == source_id)
            })
            .collect()
    }

    /// All relationships involving the keyword, at or above the confidence
    /// floor
    pub fn relationships_for_keyword(
        &self,
        keyword_id: &str,
        min_confidence: f64,
    ) -> Vec<&KeywordRelationship> {
        self.relationships
            .values()
            .filter(|rel| rel.confidence >= min_confidence)
            .filter(|rel| {
                rel.source_id == keyword_id
                    || (rel.target_id == keyword_id && rel.relation_type.is_symmetric())
            })
            .collect()
    }

    pub fn keyword_type(&self, keyword_id: &str) -> Option<KeywordType> {
        self.keyword_types.get(keyword_id).copied()
    }

    /// Emit edges whose aggregated confidence meets the threshold, each
    /// with its evidence preserved
    pub fn prepare_for_storage(&self, min_confidence: f64) -> Vec<StoredRelationship> {
        let mut stored: Vec<StoredRelationship> = self
            .relationships
            .values()
            .filter(|rel| rel.confidence >= min_confidence)
            .map(|rel| StoredRelationship {
                source_id: rel.source_id.clone(),
                target_id: rel.target_id.clone(),
                relation_type: rel.relation_type,
                confidence: rel.confidence,
                evidence_count: rel.evidence.len(),
                evidence: rel.evidence.clone(),
            })
            .collect();
        stored.sort_by(|a, b| {
            (&a.source_id, &a.target_id, a.relation_type.as_str())
                .cmp(&(&b.source_id, &b.target_id, b.relation_type.as_str()))
        });
        stored
    }
}

impl Default for RelationshipManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedSimilarity(f64);

    impl SimilarityModel for FixedSimilarity {
        fn similarity(&self, _a: &str, _b: &str) -> f64 {
            self.0
        }
    }

    struct PeriodSegmenter;

    impl SentenceSegmenter for PeriodSegmenter {
        fn split(&self, content: &str) -> Vec<String> {
            content
                .split('.')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        }
    }

    fn keyword(id: &str, text: &str, keyword_type: KeywordType) -> KeywordRef {
        KeywordRef {
            id: id.to_string(),
            canonical_text: text.to_string(),
            keyword_type,
        }
    }

    fn evidence(confidence: f64) -> RelationshipEvidence {
        RelationshipEvidence {
            sentence_text: "text".to_string(),
            sentence_id: 0,
            source_position: (0, 4),
            target_position: (5, 9),
            confidence,
            metadata: HashMap::new(),
        }
    }

    #[test]
    fn test_confidence_diminishing_returns() {
        let mut rel = KeywordRelationship::new("kw_a", "kw_b", RelationType::Related);
        rel.add_evidence(evidence(0.6));
        assert!((rel.confidence - 0.6).abs() < 1e-9);

        rel.add_evidence(evidence(0.4));
        assert!((rel.confidence - 0.7).abs() < 1e-9);

        rel.add_evidence(evidence(0.5));
        assert!((rel.confidence - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_confidence_monotone_and_capped() {
        let mut rel = KeywordRelationship::new("kw_a", "kw_b", RelationType::Related);
        let mut previous = 0.0;
        for _ in 0..12 {
            rel.add_evidence(evidence(0.9));
            assert!(rel.confidence >= previous);
            assert!(rel.confidence <= 1.0);
            previous = rel.confidence;
        }
        // boost saturates at 0.5 over the best evidence
        assert!((rel.confidence - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_symmetric_endpoints_canonicalized() {
        let mut manager = RelationshipManager::new();
        let mut ev = evidence(0.7);
        ev.source_position = (10, 14);
        ev.target_position = (0, 4);
        manager.add_relationship("kw_b", "kw_a", RelationType::Related, ev);

        let rel = manager
            .get_relationship("kw_a", "kw_b", RelationType::Related)
            .unwrap();
        assert_eq!(rel.source_id, "kw_a");
        assert_eq!(rel.target_id, "kw_b");
        // positions swapped along with the endpoints
        assert_eq!(rel.evidence[0].source_position, (0, 4));
        assert_eq!(rel.evidence[0].target_position, (10, 14));
    }

    #[test]
    fn test_directed_endpoints_preserved() {
        let mut manager = RelationshipManager::new();
        manager.add_relationship("kw_b", "kw_a", RelationType::Hierarchical, evidence(0.8));
        let rel = manager
            .get_relationship("kw_b", "kw_a", RelationType::Hierarchical)
            .unwrap();
        assert_eq!(rel.source_id, "kw_b");
        // reverse lookup does not match a directed edge
        assert!(manager
            .get_relationship("kw_a", "kw_b", RelationType::Hierarchical)
            .is_none());
    }

    #[test]
    fn test_duplicate_edges_merge_evidence() {
        let mut manager = RelationshipManager::new();
        manager.add_relationship("kw_a", "kw_b", RelationType::Related, evidence(0.6));
        manager.add_relationship("kw_b", "kw_a", RelationType::Related, evidence(0.5));

        let rel = manager
            .get_relationship("kw_a", "kw_b", RelationType::Related)
            .unwrap();
        assert_eq!(rel.evidence.len(), 2);
        assert!((rel.confidence - 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_distinct_types_between_same_pair_coexist() {
        // a contextual RELATED edge and a directed HIERARCHICAL edge on
        // the same ascending-ordered pair must not collapse into one
        let mut manager = RelationshipManager::new().with_segmenter(std::sync::Arc::new(PeriodSegmenter));
        let keywords = vec![
            keyword("kw_a", "graph database systems", KeywordType::Concept),
            keyword("kw_b", "graph database", KeywordType::Term),
        ];
        let content = "Graph database systems extend the plain graph database.";
        manager.detect_relationships(&keywords, content, "doc-1");

        let related = manager
            .get_relationship("kw_a", "kw_b", RelationType::Related)
            .expect("contextual edge");
        assert_eq!(related.relation_type, RelationType::Related);

        let hierarchical = manager
            .get_relationship("kw_a", "kw_b", RelationType::Hierarchical)
            .expect("hierarchical edge");
        assert_eq!(hierarchical.relation_type, RelationType::Hierarchical);

        assert_eq!(manager.relationships_between("kw_a", "kw_b").len(), 2);
    }

    #[test]
    fn test_hierarchical_detection() {
        let mut manager = RelationshipManager::new();
        let keywords = vec![
            keyword("kw_concept", "graph database systems", KeywordType::Concept),
            keyword("kw_term", "graph database", KeywordType::Term),
        ];
        manager.detect_relationships(&keywords, "", "doc-1");

        let rel = manager
            .get_relationship("kw_concept", "kw_term", RelationType::Hierarchical)
            .expect("hierarchical edge");
        assert_eq!(rel.relation_type, RelationType::Hierarchical);
    }

    #[test]
    fn test_contextual_detection_picks_best_sentence() {
        let mut manager = RelationshipManager::new().with_segmenter(std::sync::Arc::new(PeriodSegmenter));
        let keywords = vec![
            keyword("kw_a", "neo4j", KeywordType::Entity),
            keyword("kw_b", "cypher", KeywordType::Term),
        ];
        let content = "Neo4j is queried with the language called Cypher. Neo4j Cypher is compact.";
        manager.detect_relationships(&keywords, content, "doc-1");

        let rel = manager
            .get_relationship("kw_a", "kw_b", RelationType::Related)
            .expect("edge");
        assert_eq!(rel.relation_type, RelationType::Related);
        // the closer co-occurrence wins
        assert!(rel.evidence[0].sentence_text.contains("compact"));
    }

    #[test]
    fn test_semantic_synonym_threshold() {
        let mut manager =
            RelationshipManager::new().with_similarity_model(std::sync::Arc::new(FixedSimilarity(0.97)));
        let keywords = vec![
            keyword("kw_a", "automobile", KeywordType::Term),
            keyword("kw_b", "car", KeywordType::Term),
        ];
        manager.detect_relationships(&keywords, "", "doc-1");
        let rel = manager
            .get_relationship("kw_a", "kw_b", RelationType::Synonym)
            .unwrap();
        assert_eq!(rel.relation_type, RelationType::Synonym);
    }

    #[test]
    fn test_semantic_edge_cap() {
        let mut manager =
            RelationshipManager::new().with_similarity_model(std::sync::Arc::new(FixedSimilarity(0.9)));
        let keywords: Vec<KeywordRef> = (0..8)
            .map(|i| keyword(&format!("kw_{i}"), &format!("term {i}"), KeywordType::Term))
            .collect();
        manager.detect_relationships(&keywords, "", "doc-1");

        for kw in &keywords {
            let count = manager.relationships_for_keyword(&kw.id, 0.0).len();
            assert!(count <= MAX_RELATIONSHIPS_PER_KEYWORD);
        }
    }

    #[test]
    fn test_prepare_for_storage_filters_by_confidence() {
        let mut manager = RelationshipManager::new();
        manager.add_relationship("kw_a", "kw_b", RelationType::Related, evidence(0.9));
        manager.add_relationship("kw_a", "kw_c", RelationType::Related, evidence(0.2));

        let stored = manager.prepare_for_storage(0.5);
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].evidence_count, 1);
        assert!(stored[0].confidence >= 0.5);
    }

    #[test]
    fn test_single_keyword_produces_nothing() {
        let mut manager = RelationshipManager::new();
        let keywords = vec![keyword("kw_a", "alone", KeywordType::Term)];
        manager.detect_relationships(&keywords, "alone in a sentence", "doc-1");
        assert!(manager.prepare_for_storage(0.0).is_empty());
    }
}
