//! Descriptors for the external tool servers the pipeline drives.
//!
//! Commands and arguments mirror each server's published launch
//! instructions; credentials are forwarded from the process environment by
//! variable name and never read from config files.

use std::collections::BTreeMap;

use arxivist_shared::{AppConfig, Result, ToolServer, resolve_path};

pub const ARXIV: &str = "arxiv";
pub const FIRECRAWL: &str = "firecrawl";
pub const PINECONE: &str = "pinecone";
pub const NOTION: &str = "notion";
pub const FILESYSTEM: &str = "filesystem";
pub const COMPLETION: &str = "completion";

/// Build the full server catalog from config, in connect order.
///
/// Paths are expanded here so every subprocess sees absolute directories.
pub fn default_servers(config: &AppConfig) -> Result<Vec<ToolServer>> {
    let data_dir = resolve_path(&config.paths.data_dir)?;
    let papers_dir = data_dir.join("arxiv-papers");
    let papers_dir = papers_dir.to_string_lossy().into_owned();
    let outputs_dir = resolve_path(&config.paths.outputs_dir)?
        .to_string_lossy()
        .into_owned();

    let servers = vec![
        ToolServer {
            name: ARXIV.to_string(),
            command: "uv".to_string(),
            args: vec![
                "tool".to_string(),
                "run".to_string(),
                "arxiv-mcp-server".to_string(),
                "--storage-path".to_string(),
                papers_dir.clone(),
            ],
            env: BTreeMap::from([("ARXIV_STORAGE_PATH".to_string(), papers_dir)]),
        },
        ToolServer {
            name: FIRECRAWL.to_string(),
            command: "npx".to_string(),
            args: vec!["-y".to_string(), "firecrawl-mcp".to_string()],
            env: forwarded_env(&[&config.firecrawl.api_key_env]),
        },
        ToolServer {
            name: PINECONE.to_string(),
            command: "npx".to_string(),
            args: vec!["-y".to_string(), "@pinecone-database/mcp".to_string()],
            env: forwarded_env(&[&config.pinecone.api_key_env]),
        },
        ToolServer {
            name: NOTION.to_string(),
            command: "npx".to_string(),
            args: vec!["-y".to_string(), "@notionhq/notion-mcp-server".to_string()],
            env: forwarded_env(&[&config.notion.token_env]),
        },
        ToolServer {
            name: FILESYSTEM.to_string(),
            command: "npx".to_string(),
            args: vec![
                "-y".to_string(),
                "@modelcontextprotocol/server-filesystem".to_string(),
                outputs_dir,
            ],
            env: BTreeMap::new(),
        },
        ToolServer {
            name: COMPLETION.to_string(),
            command: config.completion.command.clone(),
            args: config.completion.args.clone(),
            env: forwarded_env(&[&config.completion.api_key_env]),
        },
    ];

    Ok(servers)
}

/// Copy the named variables out of the process environment, skipping any
/// that are unset or empty.
fn forwarded_env(names: &[&str]) -> BTreeMap<String, String> {
    let mut env = BTreeMap::new();
    for name in names {
        if let Ok(value) = std::env::var(name) {
            if !value.is_empty() {
                env.insert(name.to_string(), value);
            }
        }
    }
    env
}
