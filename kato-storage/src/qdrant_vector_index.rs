//! Qdrant-backed `VectorIndexStore` adapter, for durable deployments.
//!
//! Token resolution itself stays a pure, deterministic function of the input
//! vector (`Quantizer::token`; determinism does not bend to whatever an ANN
//! index happens to return). Qdrant is used only to persist the
//! first-sighted vector for each cell, so a restarted process - or an
//! operator's dashboard - can recover which centroid a `VCTR|...` token was
//! minted from.

use crate::quantize::Quantizer;
use crate::traits::VectorIndexStore;
use async_trait::async_trait;
use kato_core::{KatoError, Result};
use qdrant_client::qdrant::{
    CreateCollectionBuilder, Distance, PointStruct, UpsertPointsBuilder, VectorParamsBuilder,
};
use qdrant_client::Qdrant;
use sha1::{Digest, Sha1};

pub struct QdrantVectorIndex {
    client: Qdrant,
    collection: String,
    quantizer: Quantizer,
}

/// Derive a Qdrant point id deterministically from the resolved symbol, the
/// same content-addressing approach `canon.rs`/`quantize.rs` use elsewhere.
/// Repeat sightings of an already-seen symbol land on the same point id, so
/// `upsert_points` overwrites it in place instead of inserting a duplicate -
/// the "first sighting only" contract in `traits.rs` holds without a
/// round-trip existence check.
fn point_id_for(symbol: &str) -> u64 {
    let mut hasher = Sha1::new();
    hasher.update(symbol.as_bytes());
    let digest = hasher.finalize();
    u64::from_be_bytes(digest[0..8].try_into().expect("sha1 digest is >= 8 bytes"))
}

impl QdrantVectorIndex {
    pub async fn connect(url: &str, collection: &str, vector_size: u64) -> Result<Self> {
        let client = Qdrant::from_url(url)
            .build()
            .map_err(|e| KatoError::storage_unavailable(format!("qdrant connect: {e}")))?;

        if !client
            .collection_exists(collection)
            .await
            .map_err(|e| KatoError::storage_unavailable(format!("collection_exists: {e}")))?
        {
            client
                .create_collection(
                    CreateCollectionBuilder::new(collection)
                        .vectors_config(VectorParamsBuilder::new(vector_size, Distance::Cosine)),
                )
                .await
                .map_err(|e| KatoError::storage_unavailable(format!("create_collection: {e}")))?;
        }

        Ok(Self {
            client,
            collection: collection.to_string(),
            quantizer: Quantizer::default(),
        })
    }
}

#[async_trait]
impl VectorIndexStore for QdrantVectorIndex {
    async fn resolve(&self, vector: &[f32]) -> Result<String> {
        Ok(self.quantizer.token(vector))
    }

    async fn upsert(&self, vector: &[f32], symbol: &str) -> Result<()> {
        let point_id = point_id_for(symbol);
        let point = PointStruct::new(
            point_id,
            vector.to_vec(),
            [("symbol".to_string(), symbol.into())]
                .into_iter()
                .collect::<std::collections::HashMap<_, _>>(),
        );
        self.client
            .upsert_points(UpsertPointsBuilder::new(self.collection.clone(), vec![point]))
            .await
            .map_err(|e| KatoError::storage_unavailable(format!("upsert_points: {e}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_id_is_stable_and_distinguishes_symbols() {
        assert_eq!(point_id_for("VCTR|abc"), point_id_for("VCTR|abc"));
        assert_ne!(point_id_for("VCTR|abc"), point_id_for("VCTR|def"));
    }
}
