use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context};
use chrono::NaiveDate;
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Deserialize;
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

use paperdb_core::config::EngineConfig;
use paperdb_core::facet::FacetPredicate;
use paperdb_core::traits::QueryExpander;
use paperdb_core::types::{Document, DocMeta, FusionPolicy, FusionWeights, Query};
use paperdb_hybrid::HybridEngine;
use paperdb_llm::{build_embedder, FakeExpander, OllamaExpander};
use paperdb_text::TantivyChunkIndex;
use paperdb_vector::LanceVectorIndex;

type Engine = HybridEngine<TantivyChunkIndex, LanceVectorIndex>;

/// One record of the arXiv metadata dump.
#[derive(Debug, Deserialize)]
struct ArxivRecord {
    id: String,
    title: String,
    #[serde(rename = "abstract")]
    summary: String,
    #[serde(default)]
    authors: Vec<String>,
    primary_category: String,
    published: String,
}

impl ArxivRecord {
    fn into_document(self) -> anyhow::Result<Document> {
        let date_part = self
            .published
            .get(0..10)
            .ok_or_else(|| anyhow!("record '{}': bad published date '{}'", self.id, self.published))?;
        let published = NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
            .with_context(|| format!("record '{}': bad published date", self.id))?;
        Ok(Document {
            text: self.summary,
            meta: DocMeta {
                title: self.title,
                authors: self.authors,
                category: self.primary_category,
                published,
            },
            id: self.id,
        })
    }
}

fn usage() -> ! {
    eprintln!(
        "Usage: paperdb <command> [args]\n\
         \n\
         Commands:\n\
         \x20 ingest <dir-or-file>      index arXiv JSON records\n\
         \x20 query \"<text>\" [flags]    hybrid search\n\
         \x20 facets \"<text>\"           category counts for a query\n\
         \n\
         Query flags:\n\
         \x20 --top-k <n>               number of results\n\
         \x20 --category <cat>          exact category filter (repeatable)\n\
         \x20 --author <name>           author substring filter\n\
         \x20 --from <yyyy-mm-dd>       published on or after\n\
         \x20 --to <yyyy-mm-dd>         published on or before\n\
         \x20 --policy <minmax|rrf>     fusion policy override\n\
         \x20 --semantic <w>            semantic weight (lexical gets 1-w)"
    );
    process::exit(1)
}

async fn build_engine(config: &EngineConfig) -> anyhow::Result<Engine> {
    let lexical = TantivyChunkIndex::open(&config.tantivy_index_dir())?;
    let vector = LanceVectorIndex::open(
        &config.lancedb_dir(),
        &config.data.table_name,
        config.embedding.dim,
    )
    .await?;
    let embedder = build_embedder(&config.embedding)?;
    let expander: Arc<dyn QueryExpander> = if config.embedding.provider == "fake" {
        Arc::new(FakeExpander::new(Vec::<String>::new()))
    } else {
        Arc::new(OllamaExpander::new(&config.embedding.base_url, &config.expansion)?)
    };
    Ok(HybridEngine::new(lexical, vector, embedder, expander, config.clone())?)
}

fn load_records(path: &Path) -> anyhow::Result<Vec<Document>> {
    let mut files: Vec<PathBuf> = Vec::new();
    if path.is_dir() {
        for entry in WalkDir::new(path).into_iter().filter_map(|e| e.ok()) {
            if entry.file_type().is_file()
                && entry.path().extension().is_some_and(|ext| ext == "json")
            {
                files.push(entry.path().to_path_buf());
            }
        }
        files.sort();
    } else {
        files.push(path.to_path_buf());
    }
    if files.is_empty() {
        bail!("no .json files under {}", path.display());
    }

    let mut docs = Vec::new();
    for file in &files {
        let raw = fs::read_to_string(file)
            .with_context(|| format!("reading {}", file.display()))?;
        let records: Vec<ArxivRecord> = serde_json::from_str(&raw)
            .with_context(|| format!("parsing {}", file.display()))?;
        for record in records {
            docs.push(record.into_document()?);
        }
    }
    Ok(docs)
}

async fn cmd_ingest(config: &EngineConfig, args: &[String]) -> anyhow::Result<()> {
    let path = args.first().map(PathBuf::from).unwrap_or_else(|| usage());
    let docs = load_records(&path)?;
    println!("Ingesting {} documents from {}", docs.len(), path.display());

    let engine = build_engine(config).await?;
    let pb = ProgressBar::new(docs.len() as u64);
    pb.set_style(
        ProgressStyle::with_template("{bar:40} {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    pb.enable_steady_tick(std::time::Duration::from_millis(200));

    let mut indexed = 0usize;
    let mut failed = 0usize;
    // The bar advances as each document finishes, not when the whole
    // batch is done.
    let mut outcomes = std::pin::pin!(engine.ingest_all(docs));
    while let Some((doc_id, outcome)) = outcomes.next().await {
        pb.inc(1);
        match outcome {
            Ok(report) => {
                indexed += 1;
                tracing::debug!(doc_id = %doc_id, chunks = report.chunks, "indexed");
            }
            Err(e) => {
                failed += 1;
                pb.suspend(|| eprintln!("failed to index '{doc_id}': {e}"));
            }
        }
    }
    pb.finish_and_clear();
    println!("Indexed {indexed} documents, {failed} failed");
    Ok(())
}

struct QueryArgs {
    text: String,
    top_k: Option<usize>,
    categories: Vec<String>,
    author: Option<String>,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    policy: Option<FusionPolicy>,
    semantic_weight: Option<f32>,
}

fn parse_query_args(args: &[String]) -> anyhow::Result<QueryArgs> {
    let mut parsed = QueryArgs {
        text: args.first().cloned().unwrap_or_else(|| usage()),
        top_k: None,
        categories: Vec::new(),
        author: None,
        from: None,
        to: None,
        policy: None,
        semantic_weight: None,
    };
    let mut it = args[1..].iter();
    while let Some(flag) = it.next() {
        let mut value = || {
            it.next()
                .cloned()
                .ok_or_else(|| anyhow!("flag {flag} needs a value"))
        };
        match flag.as_str() {
            "--top-k" => parsed.top_k = Some(value()?.parse()?),
            "--category" => parsed.categories.push(value()?),
            "--author" => parsed.author = Some(value()?),
            "--from" => parsed.from = Some(value()?.parse()?),
            "--to" => parsed.to = Some(value()?.parse()?),
            "--policy" => {
                parsed.policy = Some(match value()?.as_str() {
                    "minmax" => FusionPolicy::WeightedMinMax,
                    "rrf" => FusionPolicy::ReciprocalRank,
                    other => bail!("unknown policy '{other}' (expected minmax or rrf)"),
                })
            }
            "--semantic" => parsed.semantic_weight = Some(value()?.parse()?),
            other => bail!("unknown flag '{other}'"),
        }
    }
    Ok(parsed)
}

fn build_filter(parsed: &QueryArgs) -> Option<FacetPredicate> {
    let mut clauses = Vec::new();
    match parsed.categories.len() {
        0 => {}
        1 => clauses.push(FacetPredicate::Eq {
            field: "category".to_string(),
            value: parsed.categories[0].clone(),
        }),
        _ => clauses.push(FacetPredicate::In {
            field: "category".to_string(),
            values: parsed.categories.clone(),
        }),
    }
    if let Some(author) = &parsed.author {
        clauses.push(FacetPredicate::Eq {
            field: "author".to_string(),
            value: author.clone(),
        });
    }
    if parsed.from.is_some() || parsed.to.is_some() {
        clauses.push(FacetPredicate::DateRange { from: parsed.from, to: parsed.to });
    }
    match clauses.len() {
        0 => None,
        1 => clauses.pop(),
        _ => Some(FacetPredicate::And { clauses }),
    }
}

async fn cmd_query(config: &EngineConfig, args: &[String]) -> anyhow::Result<()> {
    let parsed = parse_query_args(args)?;
    let engine = build_engine(config).await?;

    let query = Query {
        text: parsed.text.clone(),
        filter: build_filter(&parsed),
        top_k: parsed.top_k,
        weights: parsed.semantic_weight.map(|w| FusionWeights {
            semantic: w,
            lexical: 1.0 - w,
        }),
        policy: parsed.policy,
    };
    let results = engine.search(&query).await?;
    if results.is_empty() {
        println!("No results");
        return Ok(());
    }
    for r in &results {
        let snippet: String = r.text.chars().take(160).collect();
        println!(
            "{:>2}. [{:.4}] {} ({}, {}, {})",
            r.rank,
            r.fused_score,
            r.title,
            r.category,
            r.published,
            r.authors.join("; "),
        );
        println!(
            "      chunk {}  semantic {:?}  lexical {:?}",
            r.chunk_id, r.semantic_score, r.lexical_score
        );
        println!("      {snippet}");
    }
    Ok(())
}

async fn cmd_facets(config: &EngineConfig, args: &[String]) -> anyhow::Result<()> {
    let terms = args.first().cloned().unwrap_or_else(|| usage());
    let engine = build_engine(config).await?;
    let counts = engine.lexical().facet_counts(&terms)?;
    if counts.is_empty() {
        println!("No matching documents");
        return Ok(());
    }
    for (facet, count) in counts {
        println!("{count:>8}  {facet}");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut args: Vec<String> = env::args().skip(1).collect();
    if args.is_empty() {
        usage();
    }
    let cmd = args.remove(0);
    let config = EngineConfig::load()?;

    match cmd.as_str() {
        "ingest" => cmd_ingest(&config, &args).await,
        "query" => cmd_query(&config, &args).await,
        "facets" => cmd_facets(&config, &args).await,
        _ => {
            eprintln!("Unknown command: {cmd}");
            usage()
        }
    }
}
