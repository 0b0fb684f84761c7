//! Phase 2: query pipeline — retrieve context, synthesize, log, persist.
//!
//! The answer always reaches the caller and the answer document: retrieval
//! misses fall back to a fixed no-context answer, completion failures become
//! an error answer, and a failed Notion log is a warning in the outcome.
//! Only the final `write_file` is load-bearing enough to fail the phase.

use std::time::{Duration, Instant};

use chrono::{DateTime, Local, Utc};
use serde_json::{Value, json};
use tracing::{info, instrument, warn};

use arxivist_mcp::ToolInvoker;
use arxivist_mcp::catalog::{COMPLETION, FILESYSTEM, NOTION, PINECONE};
use arxivist_shared::{AppConfig, ContextMatch, Interaction, Result, SourceRef, notion_database_id};

use crate::progress::ProgressReporter;

/// Matches requested from the vector store per query.
pub const TOP_K: usize = 5;
/// Answer returned verbatim when retrieval produced no usable context.
pub const NO_CONTEXT_ANSWER: &str =
    "I couldn't find relevant information in the database to answer your question.";
/// System message sent with every completion request.
const SYSTEM_PROMPT: &str = "You are a helpful research assistant.";
/// Notion rich_text blocks cap out at 2000 characters.
const NOTION_TEXT_LIMIT: usize = 2000;
/// Sources listed on the logged interaction page.
const LOGGED_SOURCES: usize = 3;
/// Answer document path, relative to the filesystem server's root.
const ANSWER_PATH: &str = "answer.md";

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// Summary of a completed query run.
#[derive(Debug)]
pub struct QueryOutcome {
    /// The synthesized (or fallback) answer.
    pub answer: String,
    /// Matches returned by the vector store.
    pub matches: usize,
    /// Sources cited on the interaction log, at most [`LOGGED_SOURCES`].
    pub sources: Vec<SourceRef>,
    /// Best-effort steps that failed without aborting the run.
    pub warnings: Vec<String>,
    /// Total elapsed time.
    pub elapsed: Duration,
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Run the query pipeline.
///
/// 1. Retrieve the top matches for the query
/// 2. Synthesize an answer over the grounding context (skipped when empty)
/// 3. Log the interaction to Notion, best-effort
/// 4. Persist the answer document, required
#[instrument(skip_all, fields(query = %query))]
pub async fn run_query(
    tools: &dyn ToolInvoker,
    config: &AppConfig,
    query: &str,
    progress: &dyn ProgressReporter,
) -> Result<QueryOutcome> {
    let start = Instant::now();
    let mut warnings = Vec::new();

    // --- Retrieve ---
    progress.phase("Retrieving context");
    let matches = retrieve_matches(tools, config, query).await?;
    info!(matches = matches.len(), "context retrieved");

    // --- Synthesize ---
    progress.phase("Generating answer");
    let context = build_context(&matches);
    let answer = if context.is_empty() {
        info!("no grounding context, using the fallback answer");
        NO_CONTEXT_ANSWER.to_string()
    } else {
        synthesize(tools, config, query, &context).await
    };
    info!(chars = answer.len(), "answer ready");

    // --- Log interaction ---
    progress.phase("Logging interaction");
    let interaction = Interaction {
        query: query.to_string(),
        answer: answer.clone(),
        sources: top_sources(&matches),
        timestamp: Utc::now(),
    };
    if let Err(reason) = log_interaction(tools, config, &interaction).await {
        warn!(reason, "interaction log failed");
        warnings.push(reason);
    }

    // --- Persist answer ---
    progress.phase("Saving answer");
    save_answer(tools, config, &answer).await?;

    let outcome = QueryOutcome {
        answer,
        matches: matches.len(),
        sources: interaction.sources,
        warnings,
        elapsed: start.elapsed(),
    };

    info!(
        matches = outcome.matches,
        sources = outcome.sources.len(),
        warnings = outcome.warnings.len(),
        elapsed_ms = outcome.elapsed.as_millis(),
        "query complete"
    );

    Ok(outcome)
}

// ---------------------------------------------------------------------------
// Retrieval
// ---------------------------------------------------------------------------

/// Ask the vector store for the closest chunks; the store embeds the query
/// text itself.
async fn retrieve_matches(
    tools: &dyn ToolInvoker,
    config: &AppConfig,
    query: &str,
) -> Result<Vec<ContextMatch>> {
    let output = tools
        .call_tool(
            PINECONE,
            "query-index",
            json!({
                "index_name": config.pinecone.index_name,
                "query": query,
                "top_k": TOP_K,
                "include_metadata": true,
            }),
        )
        .await?;

    Ok(parse_matches(output.first_text().unwrap_or("")))
}

/// Decode a retrieval reply: a bare JSON array of matches or an object with
/// a `matches` array. Anything else counts as zero matches, which downstream
/// turns into the fallback answer.
fn parse_matches(payload: &str) -> Vec<ContextMatch> {
    let value: Value = match serde_json::from_str(payload) {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, "retrieval payload is not JSON, treating as zero matches");
            return Vec::new();
        }
    };

    let entries = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("matches") {
            Some(Value::Array(items)) => items,
            _ => {
                warn!("retrieval payload has no matches array");
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
// Synthesis
// ---------------------------------------------------------------------------

/// Grounding context: one `[Source: <title>]` block per match that carries
/// text, separated by blank lines. Matches without text contribute nothing.
fn build_context(matches: &[ContextMatch]) -> String {
    matches
        .iter()
        .filter_map(|m| {
            let text = m.text.as_deref().filter(|t| !t.is_empty())?;
            Some(format!("[Source: {}]\n{}", m.title(), text))
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn build_prompt(topic: &str, context: &str, query: &str) -> String {
    format!(
        "You are a helpful AI assistant that answers questions based on academic papers about {topic}.\n\
         \n\
         Use ONLY the context provided below to answer the question. If the context doesn't contain enough information, say so.\n\
         \n\
         CONTEXT:\n\
         {context}\n\
         \n\
         QUESTION: {query}\n\
         \n\
         Provide a concise, well-cited answer. Include paper titles when referencing information."
    )
}

/// Ask the completion collaborator for an answer over the context. A failed
/// or empty completion degrades to an error answer so the run still produces
/// and persists a document.
async fn synthesize(
    tools: &dyn ToolInvoker,
    config: &AppConfig,
    query: &str,
    context: &str,
) -> String {
    let prompt = build_prompt(&config.search.topic, context, query);
    let result = tools
        .call_tool(
            COMPLETION,
            "complete",
            json!({
                "model": config.completion.model,
                "messages": [
                    { "role": "system", "content": SYSTEM_PROMPT },
                    { "role": "user", "content": prompt },
                ],
                "temperature": config.completion.temperature,
                "max_tokens": config.completion.max_tokens,
            }),
        )
        .await;

    match result {
        Ok(output) => match output.first_text() {
            Some(text) if !text.is_empty() => text.to_string(),
            _ => "Error generating answer: completion returned no text".to_string(),
        },
        Err(e) => format!("Error generating answer: {e}"),
    }
}

// ---------------------------------------------------------------------------
// Interaction log
// ---------------------------------------------------------------------------

/// First retrieval matches as citation lines, whether or not they carried
/// text into the context.
fn top_sources(matches: &[ContextMatch]) -> Vec<SourceRef> {
    matches
        .iter()
        .take(LOGGED_SOURCES)
        .map(|m| SourceRef {
            title: m.title().to_string(),
            chunk_index: m.chunk_index(),
        })
        .collect()
}

/// Create the interaction page in the configured Notion database. The
/// returned error string becomes an outcome warning, never a run failure.
async fn log_interaction(
    tools: &dyn ToolInvoker,
    config: &AppConfig,
    interaction: &Interaction,
) -> std::result::Result<(), String> {
    let Some(database_id) = notion_database_id(config) else {
        return Err("no Notion database id configured, skipping interaction log".to_string());
    };

    tools
        .call_tool(
            NOTION,
            "notion_create_page",
            json!({
                "parent": { "database_id": database_id },
                "properties": interaction_properties(interaction),
            }),
        )
        .await
        .map(|_| ())
        .map_err(|e| e.to_string())
}

/// Database page properties for one interaction.
fn interaction_properties(interaction: &Interaction) -> Value {
    let sources = interaction
        .sources
        .iter()
        .map(|s| format!("- {} (Chunk {})", s.title, s.chunk_index))
        .collect::<Vec<_>>()
        .join("\n");

    json!({
        "Query": { "title": [{ "text": { "content": interaction.query } }] },
        "Timestamp": { "date": { "start": interaction.timestamp.to_rfc3339() } },
        "Answer": {
            "rich_text": [{ "text": { "content": truncate_chars(&interaction.answer, NOTION_TEXT_LIMIT) } }]
        },
        "Sources": { "rich_text": [{ "text": { "content": sources } }] },
    })
}

fn truncate_chars(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}

// ---------------------------------------------------------------------------
// Answer persistence
// ---------------------------------------------------------------------------

/// Write the answer document through the filesystem server. This is the
/// run's one required artifact, so failure propagates.
async fn save_answer(tools: &dyn ToolInvoker, config: &AppConfig, answer: &str) -> Result<()> {
    let content = answer_document(&config.search.topic, answer, Local::now());
    tools
        .call_tool(
            FILESYSTEM,
            "write_file",
            json!({ "path": ANSWER_PATH, "content": content }),
        )
        .await?;

    info!(path = ANSWER_PATH, "answer saved");
    Ok(())
}

fn answer_document(topic: &str, answer: &str, generated: DateTime<Local>) -> String {
    format!(
        "# Query Results\n\
         **Generated**: {}\n\
         **Topic**: {topic}\n\
         \n\
         ## Answer\n\
         \n\
         {answer}\n\
         \n\
         ---\n\
         *Generated by Arxivist*\n",
        generated.format("%Y-%m-%d %H:%M:%S")
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
