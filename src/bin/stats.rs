use docrag::store::{QdrantStore, VectorStore};
use docrag::Config;
use docrag::index::IndexCoordinator;
use std::sync::Arc;

/// Report vector-store health and index sizes for the configured corpus.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let config = Config::load()?;

    let store: Arc<dyn VectorStore> = Arc::new(
        QdrantStore::connect(
            &config.vector_store.url,
            &config.vector_store.collection,
            config.vector_store.vector_size,
        )
        .await?,
    );

    store.ping().await?;
    println!("Vector store: OK ({})", config.vector_store.url);
    println!("Collection:   {}", config.vector_store.collection);
    println!("Points:       {}", store.count().await?);

    let coordinator = IndexCoordinator::new(store, &config.docrag.snapshot_dir);
    match coordinator.load_snapshot().await {
        Ok(()) => {
            println!("BM25 chunks:  {} (snapshot)", coordinator.bm25_len().await);
            if let Some(saved_at) = coordinator.bm25_read(None).await?.snapshot_saved_at() {
                println!("Snapshot age: saved {}", saved_at);
            }
        }
        Err(e) => {
            println!("BM25 snapshot unusable: {}", e);
            coordinator.load_or_rebuild().await?;
            println!("BM25 chunks:  {} (rebuilt)", coordinator.bm25_len().await);
        }
    }

    match coordinator.verify().await {
        Ok(()) => println!("Consistency:  BM25 and vector store agree"),
        Err(e) => println!("Consistency:  MISMATCH - {}", e),
    }

    Ok(())
}
