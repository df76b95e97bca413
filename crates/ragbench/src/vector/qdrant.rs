use std::{collections::HashMap, time::Instant};

use async_trait::async_trait;
use qdrant_client::{
    qdrant::{
        self, value::Kind, Condition, CountPointsBuilder, CreateCollection,
        DeletePointsBuilder, Filter, PointStruct, SearchParams, SearchPoints, UpsertPoints,
        VectorParams,
    },
    Payload, Qdrant,
};
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    config::QdrantSettings,
    error::{RagError, RagResult},
    models::{collection_name, Distance},
    passage::{Passage, RelevanceKey, ScoredPassage},
    vector::VectorBackend,
};

/// Qdrant collection holding one embedding model's vectors under one
/// distance metric. Passages are stored as point payloads.
pub struct QdrantBackend {
    client: Qdrant,
    collection_name: String,
    distance: Distance,
    ef_search: u64,
}

impl QdrantBackend {
    pub fn connect(settings: &QdrantSettings, model_name: &str) -> RagResult<Self> {
        let client = Qdrant::from_url(&settings.uri)
            .build()
            .map_err(|err| RagError::backend("qdrant.connect", err))?;
        Ok(Self::with_client(client, settings, model_name))
    }

    pub fn with_client(client: Qdrant, settings: &QdrantSettings, model_name: &str) -> Self {
        Self {
            client,
            collection_name: collection_name(model_name, settings.distance),
            distance: settings.distance,
            ef_search: settings.ef_search,
        }
    }

    pub fn distance(&self) -> Distance {
        self.distance
    }

    fn qdrant_distance(&self) -> qdrant::Distance {
        match self.distance {
            Distance::Cosine => qdrant::Distance::Cosine,
            Distance::Euclid => qdrant::Distance::Euclid,
        }
    }

    /// Qdrant reports Euclidean distance (lower is closer); flip it so every
    /// backend hands out higher-is-better scores.
    fn native_score(&self, raw: f32) -> f32 {
        match self.distance {
            Distance::Cosine => raw,
            Distance::Euclid => -raw,
        }
    }

    fn dataset_condition(dataset_key: &str) -> Condition {
        Condition::matches("dataset_key", dataset_key.to_string())
    }

    fn to_point(passage: &Passage, vector: Vec<f32>) -> RagResult<PointStruct> {
        let payload = Payload::try_from(serde_json::to_value(passage)?)
            .map_err(|err| RagError::backend("qdrant.payload", err))?;
        Ok(PointStruct::new(Uuid::new_v4().to_string(), vector, payload))
    }
}

#[async_trait]
impl VectorBackend for QdrantBackend {
    fn collection_name(&self) -> &str {
        &self.collection_name
    }

    async fn ensure_collection(&self, dimension: u64) -> RagResult<()> {
        let exists = self
            .client
            .collection_exists(&self.collection_name)
            .await
            .map_err(|err| RagError::backend("qdrant.collection_exists", err))?;
        if exists {
            return Ok(());
        }

        self.client
            .create_collection(CreateCollection {
                collection_name: self.collection_name.clone(),
                vectors_config: Some(qdrant::VectorsConfig {
                    config: Some(qdrant::vectors_config::Config::Params(VectorParams {
                        size: dimension,
                        distance: self.qdrant_distance() as i32,
                        ..Default::default()
                    })),
                }),
                ..Default::default()
            })
            .await
            .map_err(|err| RagError::backend("qdrant.create_collection", err))?;
        info!(
            collection = %self.collection_name,
            dimension,
            distance = %self.distance,
            "Created vector collection"
        );
        Ok(())
    }

    async fn search(
        &self,
        vector: Vec<f32>,
        dataset_key: &str,
        limit: usize,
    ) -> RagResult<Vec<ScoredPassage>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let start = Instant::now();
        let response = self
            .client
            .search_points(SearchPoints {
                collection_name: self.collection_name.clone(),
                vector,
                limit: limit as u64,
                params: Some(SearchParams {
                    hnsw_ef: Some(self.ef_search),
                    ..Default::default()
                }),
                filter: Some(Filter::must([Self::dataset_condition(dataset_key)])),
                with_payload: Some(qdrant::WithPayloadSelector {
                    selector_options: Some(qdrant::with_payload_selector::SelectorOptions::Enable(
                        true,
                    )),
                }),
                ..Default::default()
            })
            .await
            .map_err(|err| RagError::backend("qdrant.search", err))?;

        let mut hits = Vec::with_capacity(response.result.len());
        for point in response.result {
            let passage = payload_to_passage(point.payload)?;
            hits.push(ScoredPassage::new(passage, self.native_score(point.score)));
        }
        debug!(
            collection = %self.collection_name,
            dataset_key,
            hits = hits.len(),
            elapsed_ms = start.elapsed().as_millis(),
            "Vector search completed"
        );
        Ok(hits)
    }

    async fn upsert(&self, points: Vec<(Passage, Vec<f32>)>) -> RagResult<()> {
        if points.is_empty() {
            return Ok(());
        }
        let points = points
            .into_iter()
            .map(|(passage, vector)| Self::to_point(&passage, vector))
            .collect::<RagResult<Vec<_>>>()?;
        self.client
            .upsert_points(UpsertPoints {
                collection_name: self.collection_name.clone(),
                wait: Some(true),
                points,
                ..Default::default()
            })
            .await
            .map_err(|err| RagError::backend("qdrant.upsert", err))?;
        Ok(())
    }

    async fn delete_dataset(&self, dataset_key: &str) -> RagResult<()> {
        self.client
            .delete_points(
                DeletePointsBuilder::new(&self.collection_name)
                    .points(Filter::must([Self::dataset_condition(dataset_key)]))
                    .wait(true),
            )
            .await
            .map_err(|err| RagError::backend("qdrant.delete", err))?;
        info!(collection = %self.collection_name, dataset_key, "Deleted vector dataset");
        Ok(())
    }

    async fn count(&self, key: RelevanceKey, ids: &[String], dataset_key: &str) -> RagResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let filter = Filter::must([
            Condition::matches(key.field_path(), ids.to_vec()),
            Self::dataset_condition(dataset_key),
        ]);
        let response = self
            .client
            .count(
                CountPointsBuilder::new(&self.collection_name)
                    .filter(filter)
                    .exact(true),
            )
            .await
            .map_err(|err| RagError::backend("qdrant.count", err))?;
        Ok(response.result.map(|result| result.count).unwrap_or_default())
    }
}

fn payload_to_passage(payload: HashMap<String, qdrant::Value>) -> RagResult<Passage> {
    let object: serde_json::Map<String, serde_json::Value> = payload
        .into_iter()
        .map(|(key, value)| (key, value_to_json(value)))
        .collect();
    serde_json::from_value(serde_json::Value::Object(object))
        .map_err(|err| RagError::invalid_response("qdrant.payload", err.to_string()))
}

fn value_to_json(value: qdrant::Value) -> serde_json::Value {
    match value.kind {
        Some(Kind::NullValue(_)) | None => serde_json::Value::Null,
        Some(Kind::BoolValue(flag)) => serde_json::Value::Bool(flag),
        Some(Kind::IntegerValue(number)) => serde_json::Value::from(number),
        Some(Kind::DoubleValue(number)) => serde_json::Number::from_f64(number)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Some(Kind::StringValue(text)) => serde_json::Value::String(text),
        Some(Kind::ListValue(list)) => {
            serde_json::Value::Array(list.values.into_iter().map(value_to_json).collect())
        }
        Some(Kind::StructValue(object)) => serde_json::Value::Object(
            object
                .fields
                .into_iter()
                .map(|(key, value)| (key, value_to_json(value)))
                .collect(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use qdrant_client::qdrant::{ListValue, Struct};
    use serde_json::json;

    use super::*;

    fn string(text: &str) -> qdrant::Value {
        qdrant::Value {
            kind: Some(Kind::StringValue(text.to_string())),
        }
    }

    #[test]
    fn payload_converts_back_to_passage() {
        let mut metadata = HashMap::new();
        metadata.insert("passage_id".to_string(), string("src-3"));
        let mut payload = HashMap::new();
        payload.insert("id".to_string(), string("p1"));
        payload.insert("title".to_string(), string("Tytuł"));
        payload.insert("context".to_string(), string("Treść"));
        payload.insert(
            "start_index".to_string(),
            qdrant::Value {
                kind: Some(Kind::IntegerValue(12)),
            },
        );
        payload.insert("dataset".to_string(), string("ipipan/polqa"));
        payload.insert("dataset_key".to_string(), string("ipipan-polqa-500"));
        payload.insert(
            "metadata".to_string(),
            qdrant::Value {
                kind: Some(Kind::StructValue(Struct { fields: metadata })),
            },
        );

        let passage = payload_to_passage(payload).unwrap();
        assert_eq!(passage.id, "p1");
        assert_eq!(passage.start_index, 12);
        assert_eq!(passage.source_passage_id().as_deref(), Some("src-3"));
    }

    #[test]
    fn payload_missing_fields_is_invalid_response() {
        let mut payload = HashMap::new();
        payload.insert("id".to_string(), string("p1"));
        assert!(matches!(
            payload_to_passage(payload),
            Err(RagError::InvalidResponse { stage: "qdrant.payload", .. })
        ));
    }

    #[test]
    fn nested_values_convert_to_json() {
        let list = qdrant::Value {
            kind: Some(Kind::ListValue(ListValue {
                values: vec![string("a"), qdrant::Value { kind: Some(Kind::BoolValue(true)) }],
            })),
        };
        assert_eq!(value_to_json(list), json!(["a", true]));
        assert_eq!(value_to_json(qdrant::Value { kind: None }), json!(null));
    }

    #[tokio::test]
    async fn euclid_scores_are_flipped() {
        let client = Qdrant::from_url("http://localhost:6334").build().unwrap();
        let settings = QdrantSettings {
            distance: Distance::Euclid,
            ..QdrantSettings::default()
        };
        let backend = QdrantBackend::with_client(client, &settings, "BAAI/bge-m3");
        assert_eq!(backend.collection_name(), "BAAI-bge-m3-Euclid");
        assert!(backend.native_score(0.2) > backend.native_score(0.9));
    }
}
