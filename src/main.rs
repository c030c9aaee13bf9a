use std::env;
use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, Result};
use passage_retrieval::config::Config;
use passage_retrieval::llm::{Llm, LlmConfig};
use passage_retrieval::logging::init_tracing;
use passage_retrieval::providers::{EmbeddingProvider, Ingestor, OpenAiEmbedder, PageIngestor, PagedTextDir};
use passage_retrieval::{ContextBudgeter, CorpusStore, Retriever};
use tokio::io::{AsyncBufReadExt, BufReader};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let mut config = Config::from_env().context("failed to load configuration")?;
    if let Some(dir) = env::args().nth(1) {
        config.data_dir = dir.into();
    }

    let embedder: Arc<dyn EmbeddingProvider> = Arc::new(OpenAiEmbedder::new(&config));
    let ingestor: Arc<dyn Ingestor> = Arc::new(PageIngestor::new(&config, embedder.clone()));
    let corpus = CorpusStore::from_snapshot(config.snapshot_path(), Some(ingestor));
    let pages = Arc::new(PagedTextDir::new(&config.data_dir));
    let retriever = Retriever::new(embedder, pages, corpus, config.cache_capacity)?;
    let budgeter = ContextBudgeter::new(config.context_tokens(), config.max_context_entries);

    let llm = match Llm::new(LlmConfig::from(&config)) {
        Ok(llm) => Some(llm),
        Err(e) => {
            eprintln!("Answer generation disabled: {}", e);
            None
        }
    };

    println!("Using corpus in '{}'", config.data_dir.display());
    println!("Enter your questions (:clear drops caches, :reload rebuilds the corpus, Ctrl+D exits)");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break; // EOF (Ctrl+D)
        };
        let query = line.trim();
        match query {
            "" => continue,
            ":clear" => {
                retriever.clear_all_caches();
                println!("Caches cleared\n");
                continue;
            }
            ":reload" => {
                match retriever.reload_corpus().await {
                    Ok(count) => println!("Corpus rebuilt with {} passages\n", count),
                    Err(e) => eprintln!("Error: {}\n", e),
                }
                continue;
            }
            _ => {}
        }

        let results = match retriever
            .retrieve(query, config.top_n, config.similarity_threshold)
            .await
        {
            Ok(results) => results,
            Err(e) => {
                eprintln!("Error: {}\n", e);
                continue;
            }
        };

        for (i, result) in results.iter().enumerate() {
            let snippet: String = result.text.chars().take(150).collect();
            println!(
                "{}. {} page {} (score {:.4})\n   {}...",
                i + 1,
                result.source,
                result.id,
                result.score,
                snippet.trim()
            );
        }

        let (context, used) = budgeter.assemble(&results);
        println!("[{} of {} passages fit the context budget]", used, results.len());

        if let Some(llm) = &llm {
            print!("\nThinking...");
            std::io::stdout().flush()?;
            match llm.generate_response(query, &context).await {
                Ok(response) => println!("\r{}\n", response),
                Err(e) => eprintln!("\rError: {:#}\n", e),
            }
        } else {
            println!();
        }
    }

    Ok(())
}
