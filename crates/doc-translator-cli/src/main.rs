//! Document Translator CLI - Command line tool for translating office and PDF documents.

use anyhow::{Context, Result};
use clap::Parser;
use doc_translator_core::config::{
    ENV_CONTAINER_NAME, ENV_STORAGE_CONNECTION_STRING, ENV_TRANSLATOR_ENDPOINT, ENV_TRANSLATOR_KEY,
};
use doc_translator_core::languages::supported_languages;
use doc_translator_core::{
    AppConfig, BatchId, BatchOrchestrator, BatchResult, Lang, LoopbackTranslator, MemoryBlobStore,
    TaskStatus, UploadedDocument, default_target_index,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "doc-translate")]
#[command(author, version, about = "Translate office and PDF documents", long_about = None)]
struct Args {
    /// Input documents (pdf, docx, pptx, xlsx, ...)
    #[arg(required_unless_present = "list_languages")]
    inputs: Vec<PathBuf>,

    /// Target language code, repeatable (e.g. -t fr -t zh-Hans)
    #[arg(short = 't', long = "target", required_unless_present = "list_languages")]
    targets: Vec<String>,

    /// Output file or directory (default: current directory)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Reuse the id of an earlier batch to retry it
    #[arg(long)]
    batch_id: Option<String>,

    /// Config file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Azure storage connection string
    #[arg(long, env = ENV_STORAGE_CONNECTION_STRING, hide_env_values = true)]
    connection_string: Option<String>,

    /// Blob container for temporary files
    #[arg(long, env = ENV_CONTAINER_NAME)]
    container: Option<String>,

    /// Azure Translator resource key
    #[arg(long, env = ENV_TRANSLATOR_KEY, hide_env_values = true)]
    translator_key: Option<String>,

    /// Azure Translator resource endpoint
    #[arg(long, env = ENV_TRANSLATOR_ENDPOINT)]
    translator_endpoint: Option<String>,

    /// Number of tasks processed at the same time
    #[arg(long)]
    concurrency: Option<usize>,

    /// Print the supported target languages and exit
    #[arg(long)]
    list_languages: bool,

    /// Run the pipeline offline against an in-memory store
    #[arg(long)]
    dry_run: bool,
}

fn apply_args(config: &mut AppConfig, args: &Args) {
    if let Some(ref conn) = args.connection_string {
        config.storage.connection_string = Some(conn.clone());
    }
    if let Some(ref container) = args.container {
        config.storage.container_name.clone_from(container);
    }
    if let Some(ref key) = args.translator_key {
        config.translator.api_key = Some(key.clone());
    }
    if let Some(ref endpoint) = args.translator_endpoint {
        config.translator.endpoint = Some(endpoint.clone());
    }
    if let Some(n) = args.concurrency {
        config.orchestrator.max_concurrent_tasks = n;
    }
}

/// Where to write the artifact: into `output` when it is a directory,
/// at `output` otherwise, or into the current directory
fn output_path(output: Option<&Path>, filename: &str) -> PathBuf {
    match output {
        Some(path) if path.is_dir() => path.join(filename),
        Some(path) => path.to_path_buf(),
        None => PathBuf::from(filename),
    }
}

#[allow(clippy::print_stdout)]
async fn list_languages(config: &AppConfig) {
    let options = supported_languages(config).await;
    let default = default_target_index(&options);

    for (i, option) in options.iter().enumerate() {
        let marker = if i == default { "*" } else { " " };
        println!("{marker} {:<10} {}", option.code, option.label);
    }
}

#[allow(clippy::print_stdout)]
fn print_failures(result: &BatchResult) {
    for task in result.tasks.iter().filter(|t| t.status == TaskStatus::Failed) {
        if let Some(line) = task.error_line() {
            println!("  failed: {line}");
        }
    }
    // Batch-level errors have no task attached
    for error in result.errors.iter().skip(result.failed_count()) {
        println!("  error: {error}");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (before parsing args so env vars are available)
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Setup logging
    let log_level = match args.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    // Load or create config
    let mut config = if let Some(config_path) = &args.config {
        AppConfig::from_file(config_path).context("Failed to load config file")?
    } else {
        AppConfig::load()
    };
    apply_args(&mut config, &args);

    if args.list_languages {
        list_languages(&config).await;
        return Ok(());
    }

    // Load input documents
    let documents = args
        .inputs
        .iter()
        .map(|path| {
            info!("Loading document: {}", path.display());
            UploadedDocument::from_file(path)
                .with_context(|| format!("Failed to load document: {}", path.display()))
        })
        .collect::<Result<Vec<_>>>()?;
    let languages: Vec<Lang> = args.targets.iter().map(|t| Lang::new(t.trim())).collect();

    let batch_id = match args.batch_id {
        Some(ref id) => BatchId::parse(id).context("Invalid --batch-id")?,
        None => BatchId::new_v4(),
    };

    // Setup progress bar
    let pb = ProgressBar::new(0);
    // Template is hardcoded and valid, unwrap is safe
    #[allow(clippy::unwrap_used)]
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} tasks ({eta})")
            .unwrap()
            .progress_chars("#>-"),
    );
    let bar = pb.clone();
    #[allow(clippy::cast_possible_truncation)]
    let on_progress = move |done: usize, total: usize| {
        bar.set_length(total as u64);
        bar.set_position(done as u64);
    };

    // Create orchestrator
    let orchestrator = if args.dry_run {
        info!("Dry run: using in-memory storage and loopback translation");
        let store = Arc::new(MemoryBlobStore::new(config.storage.container_name.clone()));
        let translator = Arc::new(LoopbackTranslator::new(store.clone()));
        BatchOrchestrator::new(store, translator, config)
    } else {
        BatchOrchestrator::from_config(config).context("Failed to initialize translator")?
    }
    .with_progress(on_progress);

    info!(
        "Batch {} with {}: {} document(s), {} language(s)",
        batch_id,
        orchestrator.translator_name(),
        documents.len(),
        languages.len()
    );

    let result = orchestrator
        .submit(batch_id, &documents, &languages)
        .await
        .context("Failed to submit batch")?;

    pb.finish_and_clear();

    // CLI output is intentional
    #[allow(clippy::print_stdout)]
    {
        println!(
            "Batch {}: {} succeeded, {} failed",
            result.batch_id,
            result.succeeded_count(),
            result.failed_count()
        );
    }
    print_failures(&result);

    let Some(ref artifact) = result.artifact else {
        anyhow::bail!("Batch failed; retry with --batch-id {}", result.batch_id);
    };

    let path = output_path(args.output.as_deref(), &artifact.filename);
    std::fs::write(&path, &artifact.bytes)
        .with_context(|| format!("Failed to write output: {}", path.display()))?;

    #[allow(clippy::print_stdout)]
    {
        let kind = if artifact.is_archive { "archive" } else { "document" };
        println!("Translated {kind} saved to: {}", path.display());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_parse() {
        let args = Args::try_parse_from([
            "doc-translate",
            "a.pdf",
            "b.docx",
            "-t",
            "fr",
            "--target",
            "zh-Hans",
            "--concurrency",
            "2",
        ])
        .unwrap();
        assert_eq!(args.inputs.len(), 2);
        assert_eq!(args.targets, vec!["fr", "zh-Hans"]);
        assert_eq!(args.concurrency, Some(2));
    }

    #[test]
    fn test_targets_required() {
        assert!(Args::try_parse_from(["doc-translate", "a.pdf"]).is_err());
        assert!(Args::try_parse_from(["doc-translate", "--list-languages"]).is_ok());
    }

    #[test]
    fn test_apply_args() {
        let args = Args::try_parse_from([
            "doc-translate",
            "a.pdf",
            "-t",
            "fr",
            "--container",
            "scratch",
            "--translator-endpoint",
            "https://example.cognitiveservices.azure.com",
        ])
        .unwrap();
        let mut config = AppConfig::default();
        apply_args(&mut config, &args);
        assert_eq!(config.storage.container_name, "scratch");
        assert_eq!(
            config.translator.endpoint.as_deref(),
            Some("https://example.cognitiveservices.azure.com")
        );
    }

    #[test]
    fn test_output_path() {
        let dir = std::env::temp_dir();
        assert_eq!(output_path(Some(&dir), "x_FR.pdf"), dir.join("x_FR.pdf"));
        assert_eq!(
            output_path(Some(Path::new("out/custom.zip")), "ignored.zip"),
            PathBuf::from("out/custom.zip")
        );
        assert_eq!(output_path(None, "x_FR.pdf"), PathBuf::from("x_FR.pdf"));
    }
}
