use std::sync::Arc;

use sqlx::PgPool;

use crate::config::Config;
use crate::db::init_pool;
use crate::embeddings::{Embedder, OpenAiEmbedder};
use crate::error::AppError;
use crate::llm::ChatClient;
use crate::vectors::VectorStore;
use crate::websearch::SearchClient;

/// Shared handles for every request. Construction is synchronous; the pool
/// and the vector client connect on first use.
pub struct AppState {
    pub config: Config,
    pub db: PgPool,
    pub vectors: VectorStore,
    pub embedder: Box<dyn Embedder>,
    pub llm: ChatClient,
    pub websearch: SearchClient,
}

impl AppState {
    pub fn new(config: Config) -> Result<Arc<Self>, AppError> {
        let db = init_pool(&config.database_url)?;
        let vectors = VectorStore::connect(&config.qdrant_url)?;
        let embedder = Box::new(OpenAiEmbedder::new(
            config.openai_endpoint.clone(),
            config.openai_api_key.clone(),
            config.embed_model.clone(),
            config.embed_dimensions,
        ));
        let llm = ChatClient::new(
            config.openai_endpoint.clone(),
            config.openai_api_key.clone(),
            config.openai_model.clone(),
        );
        let websearch = SearchClient::new(
            config.search_endpoint.clone(),
            config.search_api_key.clone(),
        );

        Ok(Arc::new(Self {
            config,
            db,
            vectors,
            embedder,
            llm,
            websearch,
        }))
    }
}
