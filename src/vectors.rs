//! Qdrant-backed vector store for the knowledge collection.
//!
//! One collection holds every rendered document; point ids are derived from
//! the source row so a re-sync overwrites rather than duplicates. Payloads
//! carry enough to answer "where did this text come from" without a second
//! database read.

use qdrant_client::qdrant::{
    value::Kind, Condition, CountPointsBuilder, CreateCollectionBuilder, Distance, Filter,
    PointStruct, ScoredPoint, SearchPointsBuilder, UpsertPointsBuilder, VectorParamsBuilder,
};
use qdrant_client::{Payload, Qdrant};
use serde_json::json;
use tracing::info;

use crate::ai::{DocKind, KnowledgeDoc};
use crate::error::AppError;

pub const COLLECTION: &str = "knowledge";

pub struct VectorStore {
    client: Qdrant,
}

/// A retrieved document with its cosine similarity.
#[derive(Debug, Clone)]
pub struct ScoredDoc {
    pub kind: DocKind,
    pub entity_id: i64,
    pub university_id: i64,
    pub text: String,
    pub score: f32,
}

/// Stable point id per source row. Kinds get disjoint id spaces so a program
/// and a university with the same row id never collide.
fn point_id(kind: DocKind, entity_id: i64) -> u64 {
    let kind_index = match kind {
        DocKind::University => 0,
        DocKind::Program => 1,
    };

    entity_id as u64 * 2 + kind_index
}

fn payload_str(point: &ScoredPoint, key: &str) -> Option<String> {
    match point.payload.get(key)?.kind.as_ref()? {
        Kind::StringValue(s) => Some(s.clone()),
        _ => None,
    }
}

fn payload_int(point: &ScoredPoint, key: &str) -> Option<i64> {
    match point.payload.get(key)?.kind.as_ref()? {
        Kind::IntegerValue(n) => Some(*n),
        _ => None,
    }
}

fn scored_doc(point: &ScoredPoint) -> Option<ScoredDoc> {
    let kind = payload_str(point, "kind")?.parse().ok()?;

    Some(ScoredDoc {
        kind,
        entity_id: payload_int(point, "entity_id")?,
        university_id: payload_int(point, "university_id")?,
        text: payload_str(point, "text")?,
        score: point.score,
    })
}

impl VectorStore {
    pub fn connect(url: &str) -> Result<Self, AppError> {
        let client = Qdrant::from_url(url).build()?;
        Ok(Self { client })
    }

    /// Drop and re-create the collection. Sync always starts from scratch so
    /// rows deleted from the database disappear from retrieval too.
    pub async fn rebuild(&self, dims: usize) -> Result<(), AppError> {
        if self.client.collection_exists(COLLECTION).await? {
            self.client.delete_collection(COLLECTION).await?;
        }

        self.client
            .create_collection(
                CreateCollectionBuilder::new(COLLECTION)
                    .vectors_config(VectorParamsBuilder::new(dims as u64, Distance::Cosine)),
            )
            .await?;

        info!(collection = COLLECTION, dims, "rebuilt vector collection");
        Ok(())
    }

    pub async fn upsert(
        &self,
        docs: &[KnowledgeDoc],
        embeddings: Vec<Vec<f32>>,
    ) -> Result<usize, AppError> {
        if docs.len() != embeddings.len() {
            return Err(AppError::VectorStore(format!(
                "Document/embedding count mismatch: {} vs {}",
                docs.len(),
                embeddings.len()
            )));
        }

        let points: Vec<PointStruct> = docs
            .iter()
            .zip(embeddings)
            .map(|(doc, vector)| {
                let payload: Payload = json!({
                    "kind": doc.kind.to_string(),
                    "entity_id": doc.entity_id,
                    "university_id": doc.university_id,
                    "text": doc.text,
                })
                .try_into()
                .map_err(|e| AppError::VectorStore(format!("Invalid payload: {e}")))?;

                Ok(PointStruct::new(
                    point_id(doc.kind, doc.entity_id),
                    vector,
                    payload,
                ))
            })
            .collect::<Result<_, AppError>>()?;

        let count = points.len();
        self.client
            .upsert_points(UpsertPointsBuilder::new(COLLECTION, points).wait(true))
            .await?;

        Ok(count)
    }

    pub async fn search(
        &self,
        vector: Vec<f32>,
        limit: u64,
        kind: Option<DocKind>,
    ) -> Result<Vec<ScoredDoc>, AppError> {
        let mut request = SearchPointsBuilder::new(COLLECTION, vector, limit).with_payload(true);

        if let Some(kind) = kind {
            request = request.filter(Filter::must([Condition::matches(
                "kind",
                kind.to_string(),
            )]));
        }

        let response = self.client.search_points(request).await?;
        Ok(response.result.iter().filter_map(scored_doc).collect())
    }

    pub async fn count(&self) -> Result<u64, AppError> {
        let response = self
            .client
            .count(CountPointsBuilder::new(COLLECTION).exact(true))
            .await?;

        Ok(response.result.map(|r| r.count).unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qdrant_client::qdrant::Value;
    use std::collections::HashMap;

    #[test]
    fn point_ids_never_collide_across_kinds() {
        assert_ne!(
            point_id(DocKind::University, 5),
            point_id(DocKind::Program, 5)
        );
        assert_eq!(point_id(DocKind::University, 5), 10);
        assert_eq!(point_id(DocKind::Program, 5), 11);
    }

    fn point_with(payload: HashMap<String, Value>, score: f32) -> ScoredPoint {
        ScoredPoint {
            payload,
            score,
            ..Default::default()
        }
    }

    fn string_value(s: &str) -> Value {
        Value {
            kind: Some(Kind::StringValue(s.to_string())),
        }
    }

    fn int_value(n: i64) -> Value {
        Value {
            kind: Some(Kind::IntegerValue(n)),
        }
    }

    #[test]
    fn parses_a_complete_payload() {
        let mut payload = HashMap::new();
        payload.insert("kind".to_string(), string_value("program"));
        payload.insert("entity_id".to_string(), int_value(42));
        payload.insert("university_id".to_string(), int_value(7));
        payload.insert("text".to_string(), string_value("Computer Science, BSc"));

        let doc = scored_doc(&point_with(payload, 0.83)).unwrap();

        assert_eq!(doc.kind, DocKind::Program);
        assert_eq!(doc.entity_id, 42);
        assert_eq!(doc.university_id, 7);
        assert_eq!(doc.text, "Computer Science, BSc");
        assert!((doc.score - 0.83).abs() < f32::EPSILON);
    }

    #[test]
    fn malformed_payload_is_skipped() {
        let mut payload = HashMap::new();
        payload.insert("kind".to_string(), string_value("spacecraft"));
        payload.insert("entity_id".to_string(), int_value(1));
        payload.insert("university_id".to_string(), int_value(1));
        payload.insert("text".to_string(), string_value("x"));
        assert!(scored_doc(&point_with(payload, 0.5)).is_none());

        let mut payload = HashMap::new();
        payload.insert("kind".to_string(), string_value("university"));
        // entity_id stored as a string instead of an integer
        payload.insert("entity_id".to_string(), string_value("1"));
        payload.insert("university_id".to_string(), int_value(1));
        payload.insert("text".to_string(), string_value("x"));
        assert!(scored_doc(&point_with(payload, 0.5)).is_none());
    }
}
