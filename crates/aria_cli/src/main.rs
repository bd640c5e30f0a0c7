mod console;
mod generate;
mod ingest;
mod plugins;

use anyhow::Result;
use aria_assistant::{Controller, UpdateManager};
use aria_core::AriaConfig;
use aria_memory::{Embedder, KnowledgeStore, LearningStore, TextEmbedder};
use clap::Parser;
use console::{ConsoleListener, ConsoleSpeaker};
use ingest::DocsIngestSource;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the config file
    #[arg(short, long, default_value = "aria.toml")]
    config: String,

    /// Path to the learning database (overrides config)
    #[arg(long)]
    db: Option<String>,

    /// Path to the knowledge snapshot directory (overrides config)
    #[arg(long)]
    knowledge_dir: Option<String>,

    /// Start in text mode: responses are printed instead of spoken
    #[arg(long)]
    text: bool,

    /// Skip loading the embedding model (retrieval disabled)
    #[arg(long)]
    no_embeddings: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let mut config = AriaConfig::load_or_default(&args.config);
    if let Some(db) = args.db {
        config.store.db_path = db;
    }
    if let Some(dir) = args.knowledge_dir {
        config.store.knowledge_dir = dir;
    }

    info!("Connecting to learning store at {}", config.store.db_path);
    let learning = Arc::new(LearningStore::new(&config.store.db_path).await?);

    let embedder: Option<Arc<dyn Embedder>> = if args.no_embeddings {
        None
    } else {
        match TextEmbedder::new() {
            Ok(model) => Some(Arc::new(model)),
            Err(e) => {
                warn!("Embedding model unavailable, retrieval disabled: {}", e);
                None
            }
        }
    };
    let knowledge = Arc::new(KnowledgeStore::open(&config.store.knowledge_dir, embedder)?);
    let stats = knowledge.stats().await;
    info!(
        "Knowledge base ready: {} documents, model loaded: {}",
        stats.total_documents, stats.model_loaded
    );

    let generator = generate::build(&config.generation)?;
    let registry = plugins::default_registry()?;
    let docs_dir = format!("{}/docs", config.store.knowledge_dir);

    let mut controller = Controller::new(
        config,
        Arc::new(ConsoleListener::new()),
        Arc::new(ConsoleSpeaker),
        generator,
        registry,
        learning,
        knowledge.clone(),
    )?;

    let mut updates = UpdateManager::new();
    updates.register(Arc::new(DocsIngestSource::new(knowledge, &docs_dir)));
    controller.set_update_manager(updates);

    if args.text {
        controller.session().write().await.show_on_screen = true;
    }

    println!("Aria is standing by. Say \"hey aria\" to begin, or \"exit\" inside a session to quit.");
    controller.run().await
}
