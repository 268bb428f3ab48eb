use std::env;
use std::process::ExitCode;
use std::str::FromStr;

use tracing_subscriber::EnvFilter;

use memindex_core::config::Config;
use memindex_core::types::SearchMode;
use memindex_hybrid::{IndexReport, RetrievalIndex};

const USAGE: &str = "Usage: memindex <index|rebuild|search|context|stats|check> [args...]

  index                          index new and changed memory files
  rebuild                        drop everything and re-index the workspace
  search <query> [-k N] [--mode lexical|semantic|hybrid] [--json]
  context <query>                print the memory block an agent would receive
  stats                          print index statistics
  check                          verify document records against stored chunks

Configuration: config.toml / config.<RUST_ENV>.toml [index] table, APP_INDEX__* env vars.
Global flags: --progress";

struct SearchArgs {
    query: String,
    k: usize,
    mode: Option<SearchMode>,
    json: bool,
}

fn parse_search(args: &[String]) -> anyhow::Result<SearchArgs> {
    let mut parsed = SearchArgs { query: String::new(), k: 5, mode: None, json: false };
    let mut words = Vec::new();
    let mut it = args.iter();
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "-k" => {
                let v = it.next().ok_or_else(|| anyhow::anyhow!("-k needs a number"))?;
                parsed.k = v.parse().map_err(|_| anyhow::anyhow!("invalid -k value '{}'", v))?;
            }
            "--mode" => {
                let v = it.next().ok_or_else(|| anyhow::anyhow!("--mode needs a value"))?;
                parsed.mode = Some(SearchMode::from_str(v)?);
            }
            "--json" => parsed.json = true,
            _ => words.push(arg.clone()),
        }
    }
    parsed.query = words.join(" ");
    if parsed.query.trim().is_empty() {
        anyhow::bail!("search needs a query\n\n{}", USAGE);
    }
    Ok(parsed)
}

fn print_report(action: &str, report: &IndexReport) {
    println!(
        "✅ {}: {} files seen, {} indexed ({} chunks), {} unchanged, {} removed",
        action, report.files_seen, report.files_indexed, report.chunks_indexed, report.files_unchanged, report.files_removed
    );
    if report.embedding_failures > 0 {
        println!("⚠️  {} chunks stored without embeddings", report.embedding_failures);
    }
    for (file, reason) in &report.failures {
        println!("⚠️  skipped {}: {}", file, reason);
    }
}

async fn run(cmd: &str, args: &[String], progress: bool) -> anyhow::Result<ExitCode> {
    let config = Config::load().map_err(|e| {
        eprintln!("Error loading config: {}", e);
        e
    })?;
    let mut index_config = config.index_config()?;
    index_config.show_progress |= progress;
    let default_mode = index_config.default_mode;
    tracing::info!(command = cmd, workspace = %index_config.workspace, "memindex starting");

    let index = RetrievalIndex::from_config(index_config)?;
    index.init().await?;

    let code = match cmd {
        "index" => {
            print_report("Indexed", &index.index_workspace().await?);
            ExitCode::SUCCESS
        }
        "rebuild" => {
            print_report("Rebuilt", &index.rebuild().await?);
            ExitCode::SUCCESS
        }
        "search" => {
            let search = parse_search(args)?;
            let mode = search.mode.unwrap_or(default_mode);
            let results = index.search(&search.query, search.k, mode).await?;
            if search.json {
                println!("{}", serde_json::to_string_pretty(&results)?);
            } else {
                println!("🔍 {} results for \"{}\" ({})", results.len(), search.query, mode);
                for (i, r) in results.iter().enumerate() {
                    println!("\n  {}. score={:.5}  {:?}  {}", i + 1, r.score, r.matched, r.citation());
                    for line in r.text.lines() {
                        println!("     {}", line);
                    }
                }
            }
            ExitCode::SUCCESS
        }
        "context" => {
            let query = args.join(" ");
            if let Some(block) = index.memory_context(&query).await? {
                println!("{}", block);
            }
            ExitCode::SUCCESS
        }
        "stats" => {
            println!("{}", serde_json::to_string_pretty(&index.stats()?)?);
            ExitCode::SUCCESS
        }
        "check" => {
            let report = index.check_consistency()?;
            if report.is_consistent() {
                println!("✅ index is consistent");
                ExitCode::SUCCESS
            } else {
                for id in &report.missing_chunks {
                    println!("missing chunk: {}", id);
                }
                for id in &report.orphan_chunks {
                    println!("orphan chunk: {}", id);
                }
                println!("❌ index is inconsistent; run `memindex rebuild`");
                ExitCode::from(2)
            }
        }
        other => {
            eprintln!("Unknown command: {}\n\n{}", other, USAGE);
            ExitCode::FAILURE
        }
    };
    index.close().await?;
    Ok(code)
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let mut args: Vec<String> = env::args().skip(1).collect();
    let progress = args.iter().any(|a| a == "--progress");
    args.retain(|a| a != "--progress");
    if args.is_empty() {
        eprintln!("{}", USAGE);
        return Ok(ExitCode::FAILURE);
    }
    let cmd = args.remove(0);
    run(&cmd, &args, progress).await
}
