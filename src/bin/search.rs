use clap::Parser;
use docrag::cache::EmbeddingCache;
use docrag::models::{HttpCrossEncoder, HttpEmbedder, HttpLlm};
use docrag::store::QdrantStore;
use docrag::{Config, RetrievalEngine, SearchOptions};
use std::sync::Arc;
use std::time::Instant;

/// Query the indexed corpus through the full retrieval pipeline.
#[derive(Parser)]
#[command(name = "search")]
struct Args {
    /// The question to retrieve context for
    query: String,

    /// Restrict retrieval to these document ids (repeatable)
    #[arg(long = "doc-id")]
    doc_ids: Vec<String>,

    /// Number of results to return (defaults to the configured value)
    #[arg(long)]
    top_k: Option<usize>,

    /// Generate LLM paraphrases of the query before retrieval
    #[arg(long)]
    expand: bool,

    /// Also synthesize a grounded answer from the retrieved sources
    #[arg(long)]
    answer: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let args = Args::parse();
    let config = Config::load()?;

    let store = Arc::new(
        QdrantStore::connect(
            &config.vector_store.url,
            &config.vector_store.collection,
            config.vector_store.vector_size,
        )
        .await?,
    );

    let embedder = Arc::new(
        HttpEmbedder::new(
            &config.embeddings.endpoint,
            Config::api_key(&config.embeddings.api_key_env),
            &config.embeddings.model,
            config.vector_store.vector_size,
            config.embeddings.batch_size,
        )?
        .with_cache(Arc::new(EmbeddingCache::new(
            config.embeddings.cache_capacity,
        ))),
    );
    let cross_encoder = Arc::new(HttpCrossEncoder::new(
        &config.cross_encoder.endpoint,
        Config::api_key(&config.cross_encoder.api_key_env),
        &config.cross_encoder.model,
    )?);
    let llm = Arc::new(HttpLlm::new(
        &config.llm.endpoint,
        Config::api_key(&config.llm.api_key_env),
        &config.llm.model,
    )?);

    let engine = RetrievalEngine::new(
        store,
        embedder,
        cross_encoder,
        llm,
        &config.docrag.snapshot_dir,
        config.retrieval.clone(),
    );
    engine.coordinator().load_or_rebuild().await?;

    let opts = SearchOptions {
        top_k: args.top_k,
        doc_ids: (!args.doc_ids.is_empty()).then_some(args.doc_ids),
        use_query_expansion: args.expand.then_some(true),
        ..Default::default()
    };

    let start = Instant::now();
    let envelope = if args.answer {
        let grounded = engine.answer_question(&args.query, &opts).await?;
        println!("Answer:\n{}\n", grounded.answer);
        grounded.envelope
    } else {
        engine.retrieve(&args.query, &opts).await?
    };
    let latency = start.elapsed();

    println!("Query: \"{}\"\n", args.query);
    if envelope.sources.is_empty() {
        println!("No results.");
    } else {
        for (rank, source) in envelope.sources.iter().enumerate() {
            println!(
                "#{} [{}] {} (chunk {}, score {:.3})",
                rank + 1,
                source.payload.doc_id,
                source.payload.doc_title,
                source.payload.chunk_index,
                source.score
            );
            // Preview only; the engine never truncates source text
            let preview: String = source.payload.text.chars().take(200).collect();
            let ellipsis = if source.payload.text.chars().count() > 200 {
                "..."
            } else {
                ""
            };
            println!("   {}{}\n", preview, ellipsis);
        }
    }

    println!("Retrieved: {}", envelope.retrieved_count);
    if envelope.low_confidence {
        match envelope.top_score {
            Some(top) => println!("Low confidence (top score {:.3})", top),
            None => println!("Low confidence (no candidates)"),
        }
    }
    println!("Latency: {:?}", latency);

    Ok(())
}
