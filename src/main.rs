mod walk;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::Parser;
use reposage_core::{Config, RepoAssistant, open_vector_store};
use reposage_llm::openai::OpenAiProvider;

#[derive(Parser, Debug)]
#[command(
    name = "reposage",
    about = "Index a local repository and answer a question about it"
)]
struct Cli {
    /// Repository root to index
    repo: PathBuf,

    /// Question or modification request
    question: String,

    /// Configuration file, defaults to $REPOSAGE_CONFIG or config/default.toml
    #[arg(long)]
    config: Option<PathBuf>,

    /// Session id the index and conversation memory are stored under
    #[arg(long, default_value = "local")]
    session: String,

    /// Print the selected context instead of calling the completion model
    #[arg(long, default_value_t = false)]
    context_only: bool,

    /// Treat the question as a code modification request
    #[arg(long, default_value_t = false)]
    modify: bool,

    /// Skip files larger than this many bytes
    #[arg(long, default_value_t = 1_000_000)]
    max_file_bytes: u64,
}

fn resolve_config_path(cli: &Cli) -> PathBuf {
    if let Some(path) = &cli.config {
        return path.clone();
    }
    if let Ok(path) = std::env::var("REPOSAGE_CONFIG") {
        return PathBuf::from(path);
    }
    PathBuf::from("config/default.toml")
}

fn init_subscriber() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn build_providers(config: &Config) -> anyhow::Result<(OpenAiProvider, OpenAiProvider)> {
    let api_key = config
        .llm
        .api_key
        .as_ref()
        .map(|k| k.expose().to_owned())
        .unwrap_or_default();
    if api_key.is_empty() && config.llm.base_url.contains("api.openai.com") {
        bail!("no API key configured, set REPOSAGE_OPENAI_API_KEY or llm.api_key");
    }
    let provider = OpenAiProvider::new(
        api_key,
        config.llm.base_url.clone(),
        config.llm.model.clone(),
        config.llm.embedding_model.clone(),
    )
    .with_max_retries(config.llm.max_retries);
    let index_provider = provider
        .clone()
        .with_model(config.llm.tag_model().to_owned());
    Ok((provider, index_provider))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_subscriber();
    let cli = Cli::parse();

    let config_path = resolve_config_path(&cli);
    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    let files = walk::collect_files(&cli.repo, cli.max_file_bytes)
        .with_context(|| format!("failed to read repository {}", cli.repo.display()))?;
    if files.is_empty() {
        bail!("no readable source files under {}", cli.repo.display());
    }
    tracing::info!(files = files.len(), repo = %cli.repo.display(), "repository loaded");

    let (provider, index_provider) = build_providers(&config)?;
    let store = open_vector_store(&config.vector_store).context("failed to open vector store")?;
    let assistant = RepoAssistant::new(Arc::new(provider), store, &config)
        .with_index_provider(Arc::new(index_provider));

    let report = assistant
        .build(&cli.session, files)
        .await
        .context("failed to build repository index")?;
    tracing::info!(
        chunks = report.chunk_count,
        failed_embeddings = report.failed_embeddings,
        failed_tags = report.failed_tags,
        duration_ms = report.duration_ms,
        "index built"
    );

    if cli.context_only {
        let answer = assistant.answer_query(&cli.session, &cli.question).await?;
        println!("{}", answer.context_used);
        tracing::info!(
            chunks = answer.chunk_ids.len(),
            used_tokens = answer.used_tokens,
            budget = answer.budget,
            "context selected"
        );
    } else if cli.modify {
        let edit = assistant.modify(&cli.session, &cli.question).await?;
        match edit.file_name {
            Some(name) => println!("// FILE: {name}\n{}", edit.code),
            None => println!("{}", edit.code),
        }
    } else {
        let answer = assistant.ask(&cli.session, &cli.question).await?;
        println!("{}", answer.text);
    }
    Ok(())
}
