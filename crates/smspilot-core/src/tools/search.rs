use async_trait::async_trait;
use regex::{Regex, RegexBuilder};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use walkdir::{DirEntry, WalkDir};

use super::{str_arg, Tool, ToolError};
use crate::context::ToolContext;
use crate::formatter::safe_truncate;

const SKIPPED_DIRS: &[&str] = &[
    ".git", "target", "node_modules", "__pycache__", "venv", ".venv", "dist", "build", ".idea", ".vscode",
];
const MAX_FILE_BYTES: u64 = 1024 * 1024;
const DEFAULT_MAX_RESULTS: usize = 20;
const MAX_RESULTS_CAP: usize = 100;

fn is_skipped(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .map(|name| SKIPPED_DIRS.contains(&name) || name.starts_with('.'))
            .unwrap_or(false)
}

fn workspace_files(root: &Path) -> impl Iterator<Item = DirEntry> {
    WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| !is_skipped(e))
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
}

#[derive(Debug, Serialize)]
struct SearchMatch {
    file: String,
    line: usize,
    text: String,
}

pub struct SearchCodeTool {
    ctx: Arc<ToolContext>,
}

impl SearchCodeTool {
    pub fn new(ctx: Arc<ToolContext>) -> Self {
        Self { ctx }
    }
}

/// Regex when the query is one, otherwise a literal; case-insensitive either way.
fn build_pattern(query: &str) -> Result<Regex, ToolError> {
    RegexBuilder::new(query)
        .case_insensitive(true)
        .build()
        .or_else(|_| {
            RegexBuilder::new(&regex::escape(query))
                .case_insensitive(true)
                .build()
        })
        .map_err(|e| ToolError::InvalidArguments(format!("bad query: {}", e)))
}

fn search(ctx: &ToolContext, pattern: &Regex, max_results: usize) -> (Vec<SearchMatch>, bool) {
    let mut matches = Vec::new();
    for entry in workspace_files(ctx.workspace()) {
        if entry.metadata().map(|m| m.len() > MAX_FILE_BYTES).unwrap_or(true) {
            continue;
        }
        // non UTF-8 files are treated as binary
        let Ok(content) = std::fs::read_to_string(entry.path()) else {
            continue;
        };
        for (idx, line) in content.lines().enumerate() {
            if pattern.is_match(line) {
                if matches.len() == max_results {
                    return (matches, true);
                }
                matches.push(SearchMatch {
                    file: ctx.display(entry.path()),
                    line: idx + 1,
                    text: safe_truncate(line.trim(), 160).to_string(),
                });
            }
        }
    }
    (matches, false)
}

#[async_trait]
impl Tool for SearchCodeTool {
    fn name(&self) -> &str {
        "search_code"
    }

    fn description(&self) -> &str {
        "Search text files in the workspace for a regex or literal, returning file and line of each match"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Regex or literal text" },
                "max_results": { "type": "integer", "description": "Maximum matches (default 20, at most 100)" }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let query = str_arg(&args, "query")?.to_string();
        let max_results = args
            .get("max_results")
            .and_then(Value::as_u64)
            .map(|n| (n as usize).clamp(1, MAX_RESULTS_CAP))
            .unwrap_or(DEFAULT_MAX_RESULTS);
        let pattern = build_pattern(&query)?;

        let ctx = self.ctx.clone();
        let (matches, truncated) = tokio::task::spawn_blocking(move || search(&ctx, &pattern, max_results))
            .await
            .map_err(|e| ToolError::Failed(format!("search task failed: {}", e)))?;

        let summary = match matches.first() {
            None => format!("No matches for \"{}\"", query),
            Some(first) => format!(
                "{}{} matches for \"{}\", first in {}:{}",
                matches.len(),
                if truncated { "+" } else { "" },
                query,
                first.file,
                first.line
            ),
        };
        Ok(json!({
            "query": query,
            "matches": matches,
            "truncated": truncated,
            "summary": summary,
        }))
    }
}

#[derive(Debug, Default, Serialize)]
struct CodebaseStats {
    files: usize,
    directories: usize,
    lines: usize,
    test_files: usize,
    top_extensions: Vec<(String, usize)>,
    largest_files: Vec<(String, u64)>,
}

fn is_test_file(path: &Path) -> bool {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("")
        .to_lowercase();
    name.starts_with("test_")
        || name.contains("_test.")
        || name.contains(".test.")
        || name.contains(".spec.")
        || path.components().any(|c| c.as_os_str() == "tests")
}

fn analyze(ctx: &ToolContext) -> CodebaseStats {
    let mut stats = CodebaseStats::default();
    let mut extensions: HashMap<String, usize> = HashMap::new();
    let mut sizes: Vec<(String, u64)> = Vec::new();

    let walker = WalkDir::new(ctx.workspace())
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| !is_skipped(e))
        .filter_map(Result::ok);
    for entry in walker {
        if entry.depth() == 0 {
            continue;
        }
        if entry.file_type().is_dir() {
            stats.directories += 1;
            continue;
        }
        if !entry.file_type().is_file() {
            continue;
        }
        stats.files += 1;
        let relative = ctx.display(entry.path());
        if is_test_file(Path::new(&relative)) {
            stats.test_files += 1;
        }
        let ext = entry
            .path()
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_else(|| "(none)".to_string());
        *extensions.entry(ext).or_default() += 1;

        let len = entry.metadata().map(|m| m.len()).unwrap_or(0);
        if len <= MAX_FILE_BYTES {
            if let Ok(content) = std::fs::read_to_string(entry.path()) {
                stats.lines += content.lines().count();
            }
        }
        sizes.push((relative, len));
    }

    let mut extensions: Vec<_> = extensions.into_iter().collect();
    extensions.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    extensions.truncate(5);
    stats.top_extensions = extensions;

    sizes.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    sizes.truncate(5);
    stats.largest_files = sizes;
    stats
}

pub struct AnalyzeCodebaseTool {
    ctx: Arc<ToolContext>,
}

impl AnalyzeCodebaseTool {
    pub fn new(ctx: Arc<ToolContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Tool for AnalyzeCodebaseTool {
    fn name(&self) -> &str {
        "analyze_codebase"
    }

    fn description(&self) -> &str {
        "Summarize the workspace: file, directory, line and test counts, top extensions and largest files"
    }

    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _args: Value) -> Result<Value, ToolError> {
        let ctx = self.ctx.clone();
        let stats = tokio::task::spawn_blocking(move || analyze(&ctx))
            .await
            .map_err(|e| ToolError::Failed(format!("analysis task failed: {}", e)))?;

        let mut summary = format!(
            "{} files in {} directories, {} lines, {} test files",
            stats.files, stats.directories, stats.lines, stats.test_files
        );
        if let Some((name, size)) = stats.largest_files.first() {
            summary.push_str(&format!("; largest {} ({} KB)", name, size / 1024));
        }

        let mut value = serde_json::to_value(&stats).map_err(anyhow::Error::from)?;
        value["summary"] = Value::from(summary);
        Ok(value)
    }
}
