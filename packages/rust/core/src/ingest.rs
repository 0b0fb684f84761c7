//! Phase 1: ingestion pipeline — search arXiv, extract text, chunk, index.
//!
//! Per-paper failures are recovered locally: one bad paper is logged and
//! skipped, never aborting the rest of the run. Connection-level failures
//! surfaced by the tool manager stay fatal.

use std::time::{Duration, Instant};

use serde_json::{Value, json};
use tracing::{info, instrument, warn};

use arxivist_chunking::ChunkPlan;
use arxivist_mcp::ToolInvoker;
use arxivist_mcp::catalog::{ARXIV, PINECONE};
use arxivist_shared::{AppConfig, ArxivistError, Chunk, ChunkMeta, Paper, Result};

use crate::progress::ProgressReporter;

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// Summary of a completed ingestion run.
#[derive(Debug)]
pub struct IngestionOutcome {
    /// Papers returned by the search, before the max-papers cut.
    pub papers_found: usize,
    /// Papers whose text made it into the upserted chunks.
    pub papers_ingested: usize,
    /// Papers skipped after a per-paper failure.
    pub papers_skipped: usize,
    /// Chunks upserted to the vector store.
    pub chunk_count: usize,
    /// Whether this run created the index.
    pub index_created: bool,
    /// Per-paper failures as (paper id or title, error message).
    pub errors: Vec<(String, String)>,
    /// Total elapsed time.
    pub elapsed: Duration,
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Run the ingestion pipeline.
///
/// 1. Search for papers on the configured topic
/// 2. Download/read each paper, chunk its text (per-paper fault isolation)
/// 3. Ensure the vector index exists
/// 4. Upsert all chunks in one batch
///
/// Zero search results or zero chunks end the phase early with a successful
/// outcome; there is nothing to index, which is not an error.
#[instrument(skip_all, fields(topic = %config.search.topic))]
pub async fn run_ingestion(
    tools: &dyn ToolInvoker,
    config: &AppConfig,
    progress: &dyn ProgressReporter,
) -> Result<IngestionOutcome> {
    let start = Instant::now();

    // --- Search ---
    progress.phase("Searching arXiv");
    let papers = search_papers(tools, config).await?;
    info!(found = papers.len(), "search complete");

    if papers.is_empty() {
        warn!("no papers found, ending ingestion early");
        return Ok(IngestionOutcome {
            papers_found: 0,
            papers_ingested: 0,
            papers_skipped: 0,
            chunk_count: 0,
            index_created: false,
            errors: Vec::new(),
            elapsed: start.elapsed(),
        });
    }

    // --- Download, extract, chunk ---
    let to_process = &papers[..papers.len().min(config.search.max_papers)];
    let total = to_process.len();
    let mut all_chunks: Vec<Chunk> = Vec::new();
    let mut papers_ingested = 0;
    let mut errors: Vec<(String, String)> = Vec::new();

    for (i, paper) in to_process.iter().enumerate() {
        progress.paper_processed(&paper.title, i + 1, total);

        match process_paper(tools, paper).await {
            Ok(chunks) => {
                info!(paper = %paper.title, chunks = chunks.len(), "paper chunked");
                papers_ingested += 1;
                all_chunks.extend(chunks);
            }
            Err(e) => {
                warn!(paper = %paper.title, error = %e, "processing failed, skipping paper");
                errors.push((paper_label(paper), e.to_string()));
            }
        }
    }

    info!(chunks = all_chunks.len(), "chunking complete");

    if all_chunks.is_empty() {
        warn!("no chunks produced, ending ingestion early");
        return Ok(IngestionOutcome {
            papers_found: papers.len(),
            papers_ingested,
            papers_skipped: errors.len(),
            chunk_count: 0,
            index_created: false,
            errors,
            elapsed: start.elapsed(),
        });
    }

    // --- Ensure index ---
    progress.phase("Checking vector index");
    let index_created = ensure_index(tools, config).await?;

    // --- Upsert ---
    progress.phase("Upserting chunks");
    upsert_chunks(tools, config, &all_chunks).await?;

    let outcome = IngestionOutcome {
        papers_found: papers.len(),
        papers_ingested,
        papers_skipped: errors.len(),
        chunk_count: all_chunks.len(),
        index_created,
        errors,
        elapsed: start.elapsed(),
    };

    info!(
        papers_found = outcome.papers_found,
        papers_ingested = outcome.papers_ingested,
        papers_skipped = outcome.papers_skipped,
        chunks = outcome.chunk_count,
        index_created = outcome.index_created,
        elapsed_ms = outcome.elapsed.as_millis(),
        "ingestion complete"
    );

    Ok(outcome)
}

// ---------------------------------------------------------------------------
// Search
// ---------------------------------------------------------------------------

/// Query the literature-search collaborator for papers on the topic.
async fn search_papers(tools: &dyn ToolInvoker, config: &AppConfig) -> Result<Vec<Paper>> {
    let mut args = json!({
        "query": config.search.topic,
        "max_results": config.search.max_papers,
    });
    if !config.search.categories.is_empty() {
        args["categories"] = json!(config.search.categories);
    }

    let output = tools.call_tool(ARXIV, "search_papers", args).await?;
    Ok(parse_papers(output.first_text().unwrap_or("")))
}

/// Decode a search reply: a bare JSON array of papers or an object with a
/// `papers` array. Anything else counts as zero results, logged so a
/// misbehaving search server stays visible.
fn parse_papers(payload: &str) -> Vec<Paper> {
    let value: Value = match serde_json::from_str(payload) {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, "search payload is not JSON, treating as zero results");
            return Vec::new();
        }
    };

    let entries = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("papers") {
            Some(Value::Array(items)) => items,
            _ => {
                warn!("search payload has no papers array");
                return Vec::new();
            }
        },
        _ => return Vec::new(),
    };

    entries
        .into_iter()
        .filter_map(|item| serde_json::from_value(item).ok())
        .collect()
}

// ---------------------------------------------------------------------------
// Per-paper processing
// ---------------------------------------------------------------------------

/// Fetch one paper's text and split it into metadata-tagged chunks.
///
/// The download step is advisory; the paper may already be in the search
/// server's local storage, so a failed download still proceeds to the read.
/// A missing id or empty text fails this paper only.
async fn process_paper(tools: &dyn ToolInvoker, paper: &Paper) -> Result<Vec<Chunk>> {
    let paper_id = paper
        .id
        .as_deref()
        .ok_or_else(|| ArxivistError::parse("paper entry has no id"))?;

    if let Err(e) = tools
        .call_tool(ARXIV, "download_paper", json!({ "paper_id": paper_id }))
        .await
    {
        warn!(paper_id, error = %e, "download failed, reading anyway");
    }

    let output = tools
        .call_tool(ARXIV, "read_paper", json!({ "paper_id": paper_id }))
        .await?;
    let text = output.first_text().unwrap_or("");
    if text.is_empty() {
        return Err(ArxivistError::parse(format!(
            "no text extracted for paper {paper_id}"
        )));
    }

    let chunks = arxivist_chunking::split(text, &ChunkPlan::default())
        .into_iter()
        .enumerate()
        .map(|(i, text)| Chunk {
            text,
            metadata: ChunkMeta {
                paper_id: paper_id.to_string(),
                title: paper.title.clone(),
                authors: paper.authors.clone(),
                chunk_index: i,
            },
        })
        .collect();

    Ok(chunks)
}

/// Identifier used in the outcome's error list.
fn paper_label(paper: &Paper) -> String {
    paper.id.clone().unwrap_or_else(|| paper.title.clone())
}

// ---------------------------------------------------------------------------
// Vector index
// ---------------------------------------------------------------------------

/// Probe for the index and create it when the probe fails.
///
/// The probe cannot distinguish "absent" from a transport fault, so its
/// failure is logged with the cause rather than read silently as absence.
/// A create refusal that reports prior existence is success: two runs racing
/// past the probe must not fail the loser. Returns whether this call created
/// the index.
async fn ensure_index(tools: &dyn ToolInvoker, config: &AppConfig) -> Result<bool> {
    let index_name = &config.pinecone.index_name;

    match tools
        .call_tool(
            PINECONE,
            "describe-index-stats",
            json!({ "index_name": index_name }),
        )
        .await
    {
        Ok(_) => {
            info!(index = %index_name, "index exists");
            return Ok(false);
        }
        Err(e) => {
            warn!(index = %index_name, error = %e, "index probe failed, attempting create");
        }
    }

    let create = tools
        .call_tool(
            PINECONE,
            "create-index-for-model",
            json!({
                "index_name": index_name,
                "model": config.pinecone.embedding_model,
                "dimension": config.pinecone.dimension,
                "metric": config.pinecone.metric,
            }),
        )
        .await;

    match create {
        Ok(_) => {
            info!(index = %index_name, "index created");
            Ok(true)
        }
        Err(e) if reports_existing_index(&e.to_string()) => {
            info!(index = %index_name, "index already exists");
            Ok(false)
        }
        Err(e) => Err(e),
    }
}

/// Whether a create failure message says the index is already there.
fn reports_existing_index(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("already exists") || lower.contains("already_exists")
}

/// Upsert every chunk in one batch, keyed `chunk_<i>` over the aggregate.
/// The store embeds the carried text itself.
async fn upsert_chunks(
    tools: &dyn ToolInvoker,
    config: &AppConfig,
    chunks: &[Chunk],
) -> Result<()> {
    let records: Vec<Value> = chunks
        .iter()
        .enumerate()
        .map(|(i, chunk)| {
            json!({
                "id": format!("chunk_{i}"),
                "text": chunk.text,
                "metadata": chunk.metadata,
            })
        })
        .collect();

    tools
        .call_tool(
            PINECONE,
            "upsert-records",
            json!({
                "index_name": config.pinecone.index_name,
                "records": records,
            }),
        )
        .await?;

    info!(records = chunks.len(), "upsert complete");
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;

    use async_trait::async_trait;

    use arxivist_mcp::ToolOutput;

    use crate::progress::SilentProgress;

    /// Scripted invoker: replies are queued per (server, tool); every call
    /// is recorded for assertions. Unscripted calls succeed with `{}`.
    #[derive(Default)]
    struct StubInvoker {
        calls: Mutex<Vec<(String, String, Value)>>,
        replies: Mutex<HashMap<(String, String), VecDeque<Result<ToolOutput>>>>,
    }

    impl StubInvoker {
        fn reply(&self, server: &str, tool: &str, reply: Result<ToolOutput>) -> &Self {
            self.replies
                .lock()
                .unwrap()
                .entry((server.into(), tool.into()))
                .or_default()
                .push_back(reply);
            self
        }

        fn reply_text(&self, server: &str, tool: &str, payload: &str) -> &Self {
            self.reply(server, tool, Ok(ToolOutput::text(payload)))
        }

        fn reply_err(&self, server: &str, tool: &str, message: &str) -> &Self {
            self.reply(server, tool, Err(ArxivistError::tool_call(server, tool, message)))
        }

        fn calls_to(&self, server: &str, tool: &str) -> Vec<Value> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|(s, t, _)| s == server && t == tool)
                .map(|(_, _, args)| args.clone())
                .collect()
        }

        fn server_call_count(&self, server: &str) -> usize {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|(s, _, _)| s == server)
                .count()
        }
    }

    #[async_trait]
    impl ToolInvoker for StubInvoker {
        async fn call_tool(&self, server: &str, tool: &str, arguments: Value) -> Result<ToolOutput> {
            self.calls
                .lock()
                .unwrap()
                .push((server.to_string(), tool.to_string(), arguments));
            if let Some(queue) = self
                .replies
                .lock()
                .unwrap()
                .get_mut(&(server.to_string(), tool.to_string()))
            {
                if let Some(reply) = queue.pop_front() {
                    return reply;
                }
            }
            Ok(ToolOutput::text("{}"))
        }
    }

    fn paper_entry(id: &str, title: &str) -> Value {
        json!({ "id": id, "title": title, "authors": ["A. Author"] })
    }

    fn array_payload(entries: &[Value]) -> String {
        Value::Array(entries.to_vec()).to_string()
    }

    #[tokio::test]
    async fn zero_search_results_end_ingestion_early() {
        let tools = StubInvoker::default();
        tools.reply_text(ARXIV, "search_papers", "[]");

        let outcome = run_ingestion(&tools, &AppConfig::default(), &SilentProgress)
            .await
            .unwrap();

        assert_eq!(outcome.papers_found, 0);
        assert_eq!(outcome.chunk_count, 0);
        assert!(!outcome.index_created);
        assert!(outcome.errors.is_empty());
        // Nothing to index: the vector store is never touched
        assert_eq!(tools.server_call_count(PINECONE), 0);
    }

    #[tokio::test]
    async fn malformed_search_payload_counts_as_zero_results() {
        let tools = StubInvoker::default();
        tools.reply_text(ARXIV, "search_papers", "Error: rate limited, try later");

        let outcome = run_ingestion(&tools, &AppConfig::default(), &SilentProgress)
            .await
            .unwrap();

        assert_eq!(outcome.papers_found, 0);
        assert_eq!(tools.server_call_count(PINECONE), 0);
    }

    #[tokio::test]
    async fn search_args_carry_categories_only_when_configured() {
        let tools = StubInvoker::default();
        tools.reply_text(ARXIV, "search_papers", "[]");
        let mut config = AppConfig::default();
        run_ingestion(&tools, &config, &SilentProgress).await.unwrap();

        let searches = tools.calls_to(ARXIV, "search_papers");
        assert_eq!(searches[0]["query"], config.search.topic);
        assert_eq!(searches[0]["max_results"], config.search.max_papers);
        assert!(searches[0].get("categories").is_none());

        tools.reply_text(ARXIV, "search_papers", "[]");
        config.search.categories = vec!["cs.CL".into(), "cs.LG".into()];
        run_ingestion(&tools, &config, &SilentProgress).await.unwrap();

        let searches = tools.calls_to(ARXIV, "search_papers");
        assert_eq!(searches[1]["categories"], json!(["cs.CL", "cs.LG"]));
    }

    #[test]
    fn search_payload_fixtures_parse_in_both_shapes() {
        let wrapped = std::fs::read_to_string("../../../fixtures/json/search-papers.fixture.json")
            .expect("wrapped search fixture");
        let papers = parse_papers(&wrapped);
        assert_eq!(papers.len(), 2);
        assert_eq!(papers[0].id.as_deref(), Some("2401.01234v1"));
        // Second entry uses the entry_id/url aliases
        assert_eq!(papers[1].id.as_deref(), Some("2310.05678v2"));
        assert!(papers[1].source_url.as_deref().unwrap().contains("arxiv.org"));

        let bare = std::fs::read_to_string("../../../fixtures/json/search-papers-array.fixture.json")
            .expect("bare search fixture");
        let papers = parse_papers(&bare);
        assert_eq!(papers.len(), 2);
        assert_eq!(papers[1].title, "Unknown");
    }

    #[tokio::test]
    async fn failing_paper_is_skipped_and_rest_survive() {
        let tools = StubInvoker::default();
        tools.reply_text(
            ARXIV,
            "search_papers",
            &array_payload(&[
                paper_entry("p1", "First"),
                paper_entry("p2", "Second"),
                paper_entry("p3", "Third"),
            ]),
        );
        tools.reply_text(ARXIV, "read_paper", "first paper text");
        tools.reply_err(ARXIV, "read_paper", "pdf conversion crashed");
        tools.reply_text(ARXIV, "read_paper", "third paper text");

        let outcome = run_ingestion(&tools, &AppConfig::default(), &SilentProgress)
            .await
            .unwrap();

        assert_eq!(outcome.papers_found, 3);
        assert_eq!(outcome.papers_ingested, 2);
        assert_eq!(outcome.papers_skipped, 1);
        assert_eq!(outcome.chunk_count, 2);
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].0, "p2");
        assert!(outcome.errors[0].1.contains("pdf conversion crashed"));

        // The upsert batch holds only the surviving papers' chunks, with
        // sequential ids over the aggregate
        let upserts = tools.calls_to(PINECONE, "upsert-records");
        assert_eq!(upserts.len(), 1);
        let records = upserts[0]["records"].as_array().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["id"], "chunk_0");
        assert_eq!(records[0]["metadata"]["paper_id"], "p1");
        assert_eq!(records[1]["id"], "chunk_1");
        assert_eq!(records[1]["metadata"]["paper_id"], "p3");
    }

    #[tokio::test]
    async fn paper_without_id_is_recorded_and_skipped() {
        let tools = StubInvoker::default();
        tools.reply_text(
            ARXIV,
            "search_papers",
            &array_payload(&[json!({ "title": "No Id Here" })]),
        );

        let outcome = run_ingestion(&tools, &AppConfig::default(), &SilentProgress)
            .await
            .unwrap();

        assert_eq!(outcome.papers_ingested, 0);
        assert_eq!(outcome.papers_skipped, 1);
        assert_eq!(outcome.errors[0].0, "No Id Here");
        assert!(outcome.errors[0].1.contains("no id"));
        // No text was ever requested for it
        assert!(tools.calls_to(ARXIV, "read_paper").is_empty());
    }

    #[tokio::test]
    async fn download_failure_does_not_skip_the_paper() {
        let tools = StubInvoker::default();
        tools.reply_text(
            ARXIV,
            "search_papers",
            &array_payload(&[paper_entry("p1", "First")]),
        );
        tools.reply_err(ARXIV, "download_paper", "mirror unreachable");
        tools.reply_text(ARXIV, "read_paper", "cached text survives");

        let outcome = run_ingestion(&tools, &AppConfig::default(), &SilentProgress)
            .await
            .unwrap();

        assert_eq!(outcome.papers_ingested, 1);
        assert!(outcome.errors.is_empty());
        assert_eq!(outcome.chunk_count, 1);
    }

    #[tokio::test]
    async fn empty_paper_text_is_a_per_paper_failure() {
        let tools = StubInvoker::default();
        tools.reply_text(
            ARXIV,
            "search_papers",
            &array_payload(&[paper_entry("p1", "First")]),
        );
        tools.reply_text(ARXIV, "read_paper", "");

        let outcome = run_ingestion(&tools, &AppConfig::default(), &SilentProgress)
            .await
            .unwrap();

        assert_eq!(outcome.papers_skipped, 1);
        assert_eq!(outcome.chunk_count, 0);
        // Early exit before any vector store work
        assert_eq!(tools.server_call_count(PINECONE), 0);
    }

    #[tokio::test]
    async fn max_papers_bounds_processing() {
        let tools = StubInvoker::default();
        tools.reply_text(
            ARXIV,
            "search_papers",
            &array_payload(&[
                paper_entry("p1", "A"),
                paper_entry("p2", "B"),
                paper_entry("p3", "C"),
                paper_entry("p4", "D"),
            ]),
        );
        tools.reply_text(ARXIV, "read_paper", "text one");
        tools.reply_text(ARXIV, "read_paper", "text two");

        let mut config = AppConfig::default();
        config.search.max_papers = 2;

        let outcome = run_ingestion(&tools, &config, &SilentProgress).await.unwrap();

        assert_eq!(outcome.papers_found, 4);
        assert_eq!(outcome.papers_ingested, 2);
        assert_eq!(tools.calls_to(ARXIV, "read_paper").len(), 2);
    }

    #[tokio::test]
    async fn long_texts_chunk_with_paper_scoped_indexes() {
        let tools = StubInvoker::default();
        tools.reply_text(
            ARXIV,
            "search_papers",
            &array_payload(&[paper_entry("p1", "Long Paper")]),
        );
        tools.reply_text(ARXIV, "read_paper", &"x".repeat(1200));

        let outcome = run_ingestion(&tools, &AppConfig::default(), &SilentProgress)
            .await
            .unwrap();

        // 1200 chars, size 1000, overlap 200: windows at 0 and 800
        assert_eq!(outcome.chunk_count, 2);
        let upserts = tools.calls_to(PINECONE, "upsert-records");
        let records = upserts[0]["records"].as_array().unwrap();
        assert_eq!(records[0]["metadata"]["chunk_index"], 0);
        assert_eq!(records[1]["metadata"]["chunk_index"], 1);
        assert_eq!(records[0]["text"].as_str().unwrap().len(), 1000);
        assert_eq!(records[1]["text"].as_str().unwrap().len(), 400);
    }

    #[tokio::test]
    async fn upsert_batch_carries_index_name_and_metadata() {
        let tools = StubInvoker::default();
        tools.reply_text(
            ARXIV,
            "search_papers",
            &array_payload(&[paper_entry("p1", "First")]),
        );
        tools.reply_text(ARXIV, "read_paper", "some text");

        let config = AppConfig::default();
        run_ingestion(&tools, &config, &SilentProgress).await.unwrap();

        let upserts = tools.calls_to(PINECONE, "upsert-records");
        assert_eq!(upserts[0]["index_name"], config.pinecone.index_name);
        let record = &upserts[0]["records"][0];
        assert_eq!(record["text"], "some text");
        assert_eq!(record["metadata"]["title"], "First");
        assert_eq!(record["metadata"]["authors"], json!(["A. Author"]));
    }

    #[tokio::test]
    async fn probe_success_skips_index_create() {
        let tools = StubInvoker::default();
        tools.reply_text(PINECONE, "describe-index-stats", r#"{"totalRecordCount": 42}"#);

        let created = ensure_index(&tools, &AppConfig::default()).await.unwrap();

        assert!(!created);
        assert!(tools.calls_to(PINECONE, "create-index-for-model").is_empty());
    }

    #[tokio::test]
    async fn probe_failure_triggers_index_create() {
        let tools = StubInvoker::default();
        tools.reply_err(PINECONE, "describe-index-stats", "index not found");

        let config = AppConfig::default();
        let created = ensure_index(&tools, &config).await.unwrap();

        assert!(created);
        let creates = tools.calls_to(PINECONE, "create-index-for-model");
        assert_eq!(creates.len(), 1);
        assert_eq!(creates[0]["index_name"], config.pinecone.index_name);
        assert_eq!(creates[0]["model"], config.pinecone.embedding_model);
        assert_eq!(creates[0]["dimension"], config.pinecone.dimension);
        assert_eq!(creates[0]["metric"], config.pinecone.metric);
    }

    #[tokio::test]
    async fn create_refusal_for_existing_index_is_success() {
        let tools = StubInvoker::default();
        tools.reply_err(PINECONE, "describe-index-stats", "transient probe error");
        tools.reply_err(
            PINECONE,
            "create-index-for-model",
            "index arxiv-papers already exists",
        );

        let created = ensure_index(&tools, &AppConfig::default()).await.unwrap();
        assert!(!created);
    }

    #[tokio::test]
    async fn create_failure_aborts_the_run() {
        let tools = StubInvoker::default();
        tools.reply_text(
            ARXIV,
            "search_papers",
            &array_payload(&[paper_entry("p1", "First")]),
        );
        tools.reply_text(ARXIV, "read_paper", "some text");
        tools.reply_err(PINECONE, "describe-index-stats", "index not found");
        tools.reply_err(PINECONE, "create-index-for-model", "pod quota exceeded");

        let err = run_ingestion(&tools, &AppConfig::default(), &SilentProgress)
            .await
            .unwrap_err();

        assert!(err.to_string().contains("pod quota exceeded"));
        assert!(tools.calls_to(PINECONE, "upsert-records").is_empty());
    }

    #[tokio::test]
    async fn ensure_index_creates_at_most_once_across_runs() {
        let tools = StubInvoker::default();
        // First run: probe fails, create succeeds. Second run: probe sees it.
        tools.reply_err(PINECONE, "describe-index-stats", "index not found");
        tools.reply_text(PINECONE, "describe-index-stats", r#"{"totalRecordCount": 3}"#);

        let config = AppConfig::default();
        assert!(ensure_index(&tools, &config).await.unwrap());
        assert!(!ensure_index(&tools, &config).await.unwrap());

        assert_eq!(tools.calls_to(PINECONE, "create-index-for-model").len(), 1);
    }
}
