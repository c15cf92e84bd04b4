//! Tool definitions and execution.
//!
//! The model sees a set of named tools; every request is parsed into a
//! closed enum plus a typed argument struct, so dispatch is exhaustive at
//! compile time. Handlers return short human-readable strings (prefixed
//! `Error: ...` on failure) that are fed back as tool-result messages.

use crate::llm::{parse_tool_arguments, ToolCallPayload};
use crate::store::{GoalKind, MemoryStore, SoulFile};
use crate::vault;
use crate::{MemoriaError, Result};
use serde::Deserialize;
use serde_json::{json, Value};

/// Every operation the model can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolName {
    ReadCoreMemory,
    UpdateCoreMemory,
    ReadMemory,
    WriteMemory,
    AddGoal,
    ArchiveMemory,
    ReadArchive,
    SearchVault,
    CreateMemoryNote,
    ReadMemoryNote,
    UpdateMemoryNote,
    ListMemoryNotes,
    DeleteMemoryNote,
    UpdateSoul,
    LogObservation,
    ResolveObservation,
}

impl ToolName {
    pub fn parse(name: &str) -> Option<Self> {
        serde_json::from_value(Value::String(name.to_string())).ok()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ReadCoreMemory => "read_core_memory",
            Self::UpdateCoreMemory => "update_core_memory",
            Self::ReadMemory => "read_memory",
            Self::WriteMemory => "write_memory",
            Self::AddGoal => "add_goal",
            Self::ArchiveMemory => "archive_memory",
            Self::ReadArchive => "read_archive",
            Self::SearchVault => "search_vault",
            Self::CreateMemoryNote => "create_memory_note",
            Self::ReadMemoryNote => "read_memory_note",
            Self::UpdateMemoryNote => "update_memory_note",
            Self::ListMemoryNotes => "list_memory_notes",
            Self::DeleteMemoryNote => "delete_memory_note",
            Self::UpdateSoul => "update_soul",
            Self::LogObservation => "log_observation",
            Self::ResolveObservation => "resolve_observation",
        }
    }
}

// ─── Typed arguments ────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ContentArgs {
    content: String,
}

#[derive(Debug, Deserialize)]
struct PathArgs {
    path: String,
}

#[derive(Debug, Deserialize)]
struct WriteMemoryArgs {
    path: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct AddGoalArgs {
    goal: String,
    timeline: String,
    #[serde(default)]
    goal_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ArchiveArgs {
    content: String,
    #[serde(default)]
    date: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ReadArchiveArgs {
    #[serde(default)]
    date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchVaultArgs {
    query: String,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    folder: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreateNoteArgs {
    title: String,
    content: String,
    #[serde(default)]
    subfolder: Option<String>,
    #[serde(default)]
    topics: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct FilenameArgs {
    filename: String,
}

#[derive(Debug, Deserialize)]
struct UpdateNoteArgs {
    filename: String,
    new_content: String,
    #[serde(default)]
    topics: Option<Vec<String>>,
    #[serde(default)]
    append: bool,
}

#[derive(Debug, Default, Deserialize)]
struct ListNotesArgs {
    #[serde(default)]
    subfolder: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UpdateSoulArgs {
    #[serde(default = "default_soul_file")]
    file: String,
    content: String,
}

fn default_soul_file() -> String {
    "soul".to_string()
}

#[derive(Debug, Deserialize)]
struct LogObservationArgs {
    text: String,
}

#[derive(Debug, Deserialize)]
struct ResolveObservationArgs {
    identifier: String,
    reason: String,
}

fn parse_args<T: serde::de::DeserializeOwned>(args: &Value) -> Result<T> {
    serde_json::from_value(args.clone())
        .map_err(|e| MemoriaError::Validation(format!("invalid arguments: {}", e)))
}

// ─── Execution ──────────────────────────────────────────────────────

/// Execute one model-requested tool call and return the result string fed
/// back to the model. Never panics, never propagates: failures come back
/// as `Error: ...`.
pub async fn execute_tool(store: &MemoryStore, name: &str, args: &Value) -> String {
    let Some(tool) = ToolName::parse(name) else {
        return format!("Unknown tool: {}", name);
    };
    match dispatch(store, tool, args).await {
        Ok(result) => result,
        Err(e) => e.to_tool_result(),
    }
}

/// Convenience wrapper for a full tool-call payload.
pub async fn execute_tool_call(store: &MemoryStore, call: &ToolCallPayload) -> String {
    let args = parse_tool_arguments(call);
    execute_tool(store, &call.function.name, &args).await
}

async fn dispatch(store: &MemoryStore, tool: ToolName, args: &Value) -> Result<String> {
    match tool {
        ToolName::ReadCoreMemory => {
            let content = store.read_core_memory().await?;
            if content.is_empty() {
                Ok("(Core memory is empty.)".to_string())
            } else {
                Ok(content)
            }
        }
        ToolName::UpdateCoreMemory => {
            let args: ContentArgs = parse_args(args)?;
            let tokens = store.update_core_memory(&args.content).await?;
            Ok(format!("Core memory updated ({} tokens).", tokens))
        }
        ToolName::ReadMemory => {
            let args: PathArgs = parse_args(args)?;
            let content = store.read_memory_file(&args.path).await?;
            if content.is_empty() {
                Ok(format!(
                    "(No content at '{}'. Check the memory map for available files.)",
                    args.path
                ))
            } else {
                Ok(format!("**{}**\n\n{}", args.path, content))
            }
        }
        ToolName::WriteMemory => {
            let args: WriteMemoryArgs = parse_args(args)?;
            if args.content.trim().is_empty() {
                return Err(MemoriaError::Validation("content is required".to_string()));
            }
            let path = store.write_memory_file(&args.path, &args.content).await?;
            Ok(format!("Updated {}.", path))
        }
        ToolName::AddGoal => {
            let args: AddGoalArgs = parse_args(args)?;
            let kind = match args.goal_type.as_deref() {
                Some("future") => GoalKind::Future,
                _ => GoalKind::Current,
            };
            store.append_goal(kind, &args.goal, &args.timeline).await?;
            Ok(format!(
                "Goal added to {}.",
                match kind {
                    GoalKind::Current => "current-goals",
                    GoalKind::Future => "future-plans",
                }
            ))
        }
        ToolName::ArchiveMemory => {
            let args: ArchiveArgs = parse_args(args)?;
            let path = store
                .archive_memory(&args.content, args.date.as_deref())
                .await?;
            Ok(format!("Archived to {}.", path))
        }
        ToolName::ReadArchive => {
            let args: ReadArchiveArgs = parse_args(args).unwrap_or_default();
            store.read_archive(args.date.as_deref()).await
        }
        ToolName::SearchVault => {
            let args: SearchVaultArgs = parse_args(args)?;
            let outcome = vault::search_vault(
                store.vault_path(),
                &args.query,
                &args.tags,
                args.folder.as_deref(),
            )?;
            Ok(vault::format_results(&args.query, &outcome))
        }
        ToolName::CreateMemoryNote => {
            let args: CreateNoteArgs = parse_args(args)?;
            let path = store
                .create_note(
                    &args.title,
                    &args.content,
                    args.subfolder.as_deref(),
                    &args.topics,
                )
                .await?;
            Ok(format!("Created note: {}", path))
        }
        ToolName::ReadMemoryNote => {
            let args: FilenameArgs = parse_args(args)?;
            let note = store.read_note(&args.filename).await?;
            let mut out = format!("**{}**\n\n", note.filepath);
            if let Some(created) = &note.metadata.created {
                out.push_str(&format!("Created: {}\n", created));
            }
            if let Some(updated) = &note.metadata.updated {
                out.push_str(&format!("Updated: {}\n", updated));
            }
            if !note.metadata.topics.is_empty() {
                out.push_str(&format!("Topics: {}\n", note.metadata.topics.join(", ")));
            }
            out.push('\n');
            out.push_str(&note.content);
            Ok(out)
        }
        ToolName::UpdateMemoryNote => {
            let args: UpdateNoteArgs = parse_args(args)?;
            let path = store
                .update_note(
                    &args.filename,
                    &args.new_content,
                    args.topics.as_deref(),
                    args.append,
                )
                .await?;
            let verb = if args.append { "Appended to" } else { "Updated" };
            Ok(format!("{} note: {}", verb, path))
        }
        ToolName::ListMemoryNotes => {
            let args: ListNotesArgs = parse_args(args).unwrap_or_default();
            let notes = store.list_notes(args.subfolder.as_deref()).await?;
            if notes.is_empty() {
                return Ok("No memory notes found.".to_string());
            }
            let mut lines = vec![format!("Found {} memory note(s):", notes.len())];
            for note in notes {
                lines.push(format!("\n- **{}**", note.filepath));
                if !note.topics.is_empty() {
                    lines.push(format!("  Topics: {}", note.topics.join(", ")));
                }
                if let Some(updated) = note.updated {
                    lines.push(format!("  Updated: {}", updated));
                }
            }
            Ok(lines.join("\n"))
        }
        ToolName::DeleteMemoryNote => {
            let args: FilenameArgs = parse_args(args)?;
            let path = store.delete_note(&args.filename).await?;
            Ok(format!("Deleted note: {}", path))
        }
        ToolName::UpdateSoul => {
            let args: UpdateSoulArgs = parse_args(args)?;
            let file = SoulFile::parse(&args.file).ok_or_else(|| {
                MemoriaError::Validation(format!(
                    "unknown soul file '{}' - valid names: soul, opinions, unresolved",
                    args.file
                ))
            })?;
            let tokens = store.update_soul_file(file, &args.content).await?;
            Ok(format!("Soul updated ({} tokens).", tokens))
        }
        ToolName::LogObservation => {
            let args: LogObservationArgs = parse_args(args)?;
            let outcome = store.log_observation(&args.text).await?;
            Ok(format!(
                "Observation logged ({} entries, ~{} tokens).",
                outcome.entries, outcome.tokens
            ))
        }
        ToolName::ResolveObservation => {
            let args: ResolveObservationArgs = parse_args(args)?;
            let timestamp = store
                .resolve_observation(&args.identifier, &args.reason)
                .await?;
            Ok(format!("Resolved observation from [{}].", timestamp))
        }
    }
}

// ─── Schemas ────────────────────────────────────────────────────────

fn schema(name: &str, description: &str, properties: Value, required: &[&str]) -> Value {
    json!({
        "type": "function",
        "function": {
            "name": name,
            "description": description,
            "parameters": {
                "type": "object",
                "properties": properties,
                "required": required,
            },
        }
    })
}

/// Tool schemas for interactive chat.
pub fn chat_tool_schemas() -> Vec<Value> {
    let mut tools = consolidation_tool_schemas();
    tools.extend([
        schema(
            "search_vault",
            "Search the user's vault for notes matching a query. Last resort - check memory files first.",
            json!({
                "query": {"type": "string", "description": "Text to search for in note titles and content"},
                "tags": {"type": "array", "items": {"type": "string"}, "description": "Optional tags to filter by"},
                "folder": {"type": "string", "description": "Optional folder to limit the search"},
            }),
            &["query"],
        ),
        schema(
            "create_memory_note",
            "Create a new note for long-form information that deserves its own file (topics, people, projects).",
            json!({
                "title": {"type": "string", "description": "Note title (becomes the filename)"},
                "content": {"type": "string", "description": "Note content in markdown"},
                "subfolder": {"type": "string", "description": "Optional subfolder, e.g. 'topics' or 'people'"},
                "topics": {"type": "array", "items": {"type": "string"}, "description": "Optional topic tags"},
            }),
            &["title", "content"],
        ),
        schema(
            "read_memory_note",
            "Read an existing memory note, including its metadata.",
            json!({
                "filename": {"type": "string", "description": "Filename relative to the notes folder"},
            }),
            &["filename"],
        ),
        schema(
            "update_memory_note",
            "Update an existing memory note. Replaces content by default; set append=true to add to the end.",
            json!({
                "filename": {"type": "string", "description": "Filename relative to the notes folder"},
                "new_content": {"type": "string", "description": "Content to write"},
                "topics": {"type": "array", "items": {"type": "string"}, "description": "Optional updated topic tags"},
                "append": {"type": "boolean", "description": "Append instead of replacing. Default false."},
            }),
            &["filename", "new_content"],
        ),
        schema(
            "list_memory_notes",
            "List notes in the notes folder, for discovering what exists.",
            json!({
                "subfolder": {"type": "string", "description": "Optional subfolder to list"},
            }),
            &[],
        ),
        schema(
            "delete_memory_note",
            "Delete a memory note. Use sparingly - only when explicitly requested or clearly wrong.",
            json!({
                "filename": {"type": "string", "description": "Filename relative to the notes folder"},
            }),
            &["filename"],
        ),
        schema(
            "log_observation",
            "Log one timestamped observation about the user - a pattern, a contradiction, something that surprised you. One entry per call.",
            json!({
                "text": {"type": "string", "description": "The observation, a single paragraph"},
            }),
            &["text"],
        ),
        schema(
            "resolve_observation",
            "Mark an earlier observation as no longer applying. Matches by timestamp or text fragment. Observations are never deleted, only resolved.",
            json!({
                "identifier": {"type": "string", "description": "Timestamp fragment or text fragment of the entry"},
                "reason": {"type": "string", "description": "Why it no longer applies"},
            }),
            &["identifier", "reason"],
        ),
    ]);
    tools
}

/// Tool schemas for end-of-session consolidation: the memory surface only.
pub fn consolidation_tool_schemas() -> Vec<Value> {
    vec![
        schema(
            "read_core_memory",
            "Read current core working memory (~500 token summary loaded every conversation).",
            json!({}),
            &[],
        ),
        schema(
            "update_core_memory",
            "Rewrite core working memory. Keep only the most relevant facts; compress to stay under the limit.",
            json!({
                "content": {"type": "string", "description": "Full new content for core memory (markdown)"},
            }),
            &["content"],
        ),
        schema(
            "read_memory",
            "Read structured memory files. Pass a file path to read one file, or a directory path to read all files in it. Paths per the memory map, e.g. 'context/work/projects'.",
            json!({
                "path": {"type": "string", "description": "Path such as 'context/personal' or 'timelines/current-goals'"},
            }),
            &["path"],
        ),
        schema(
            "write_memory",
            "Write or update a structured memory file (full replacement). Creates the file and parents if needed. For core memory use update_core_memory instead.",
            json!({
                "path": {"type": "string", "description": "Path such as 'context/work/projects'"},
                "content": {"type": "string", "description": "New markdown content for the file"},
            }),
            &["path", "content"],
        ),
        schema(
            "add_goal",
            "Append a goal with its timeline to the goal tracker without touching existing entries.",
            json!({
                "goal": {"type": "string", "description": "The goal"},
                "timeline": {"type": "string", "description": "When it should happen"},
                "goal_type": {"type": "string", "enum": ["current", "future"], "description": "Which timeline file. Default current."},
            }),
            &["goal", "timeline"],
        ),
        schema(
            "archive_memory",
            "Append content to the monthly archive. Use for conversation summaries or info rotated out of active memory.",
            json!({
                "content": {"type": "string", "description": "Content to archive"},
                "date": {"type": "string", "description": "Optional YYYY-MM; default is the current month"},
            }),
            &["content"],
        ),
        schema(
            "read_archive",
            "Read archived conversation summaries. Pass a month (YYYY-MM), or omit to list available months.",
            json!({
                "date": {"type": "string", "description": "Month to read (YYYY-MM)"},
            }),
            &[],
        ),
        schema(
            "update_soul",
            "Rewrite one of your soul files: 'soul' (self-concept), 'opinions', or 'unresolved'. Write in first person; preserve what still feels true. Observations are managed by log_observation instead.",
            json!({
                "file": {"type": "string", "enum": ["soul", "opinions", "unresolved"], "description": "Which soul file. Default 'soul'."},
                "content": {"type": "string", "description": "Full new content (markdown, first person)"},
            }),
            &["content"],
        ),
    ]
}
