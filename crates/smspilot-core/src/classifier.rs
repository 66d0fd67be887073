//! Command classifier - free text to an `Intent`, never an error.
//!
//! Order of attempts:
//! 1. oracle reply parsed as JSON (code fences stripped, embedded object found)
//! 2. `action: xyz` structure or keywords in the oracle reply
//! 3. `Clarify`
//!
//! When the oracle errors or overruns its budget the classifier does not retry;
//! keywords in the raw command text decide, else `Clarify`.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use crate::ai::{extract_json_object, strip_json_code_fence, PromptsConfig, TextOracle};
use crate::command::{Command, Intent, IntentKind};
use crate::formatter::safe_truncate;

static ACTION_FIELD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)["']?action["']?\s*[:=]\s*["']?([A-Za-z_\- ]+?)["',\n}]"#)
        .expect("valid action pattern")
});

static FILE_PATH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(?:^|[\s`'(])((?:[\w.\-]+/)*[\w\-]+\.(?:py|rs|js|jsx|ts|tsx|json|md|txt|html|css|go|java|c|cpp|h|hpp|toml|yaml|yml|sh|rb|php|sql|csv|xml))\b",
    )
    .expect("valid file path pattern")
});

static BACKTICKED: Lazy<Regex> = Lazy::new(|| Regex::new(r"`([^`]+)`").expect("valid backtick pattern"));

static RUN_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:please\s+)?(?:run|execute|exec)\s+(?:the\s+)?(?:command\s+)?(.+)$")
        .expect("valid run pattern")
});

static SEARCH_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)^(?:please\s+)?(?:search|grep|look)\s+(?:the\s+code(?:base)?\s+)?(?:for\s+)?["']?(.+?)["']?$"#)
        .expect("valid search pattern")
});

/// Programs a bare message may start with to count as a shell command.
const SHELL_PROGRAMS: &[&str] = &[
    "git ", "python ", "python3 ", "pip ", "node ", "npm ", "cargo ", "ls ", "dir ", "grep ",
];

/// Lenient view of the oracle's JSON object.
#[derive(Debug, Default, Deserialize)]
struct RawAction {
    #[serde(default)]
    action: Option<String>,
    #[serde(default)]
    command: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    file_path: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    query: Option<String>,
    #[serde(default)]
    shell_command: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

pub struct CommandClassifier {
    oracle: Arc<dyn TextOracle>,
    prompts: PromptsConfig,
    timeout: Duration,
}

impl CommandClassifier {
    pub fn new(oracle: Arc<dyn TextOracle>, prompts: PromptsConfig, timeout: Duration) -> Self {
        Self {
            oracle,
            prompts,
            timeout,
        }
    }

    pub async fn classify(&self, command: &Command) -> Intent {
        self.classify_within(command, self.timeout).await
    }

    /// Like [`classify`](Self::classify), with the oracle budget capped at `limit`.
    pub async fn classify_within(&self, command: &Command, limit: Duration) -> Intent {
        let budget = self.timeout.min(limit);
        let text = command.text.trim();
        if text.is_empty() {
            return Intent::clarify(text);
        }

        let prompt = self
            .prompts
            .classifier_template()
            .render(&crate::prompt_vars!("message" => text));
        let reply = tokio::time::timeout(
            budget,
            self.oracle.complete(Some(&self.prompts.classifier_system), &prompt),
        )
        .await;

        let intent = match reply {
            Ok(Ok(reply)) => {
                tracing::debug!(command_id = %command.id, "oracle reply: {}", safe_truncate(&reply, 300));
                parse_reply(&reply, text)
            }
            Ok(Err(e)) => {
                tracing::warn!(command_id = %command.id, "oracle failed, using keywords: {}", e);
                keyword_intent(text).unwrap_or_else(|| Intent::clarify(text))
            }
            Err(_) => {
                tracing::warn!(
                    command_id = %command.id,
                    timeout_ms = budget.as_millis() as u64,
                    "oracle timed out, using keywords"
                );
                keyword_intent(text).unwrap_or_else(|| Intent::clarify(text))
            }
        };

        tracing::info!(command_id = %command.id, intent = %intent.kind, "classified command");
        intent
    }
}

/// Interpret an oracle reply for the given command text.
pub fn parse_reply(reply: &str, text: &str) -> Intent {
    let stripped = strip_json_code_fence(reply);
    let raw = serde_json::from_str::<RawAction>(stripped).ok().or_else(|| {
        extract_json_object(stripped).and_then(|obj| serde_json::from_str::<RawAction>(obj).ok())
    });

    if let Some(raw) = raw {
        if let Some(kind) = raw.action.as_deref().and_then(IntentKind::from_label) {
            return intent_from_raw(kind, raw, text);
        }
    }

    if let Some(kind) = ACTION_FIELD
        .captures(reply)
        .and_then(|caps| IntentKind::from_label(&caps[1]))
    {
        return intent_from_raw(kind, RawAction::default(), text);
    }

    keyword_intent(reply).unwrap_or_else(|| Intent::clarify(text))
}

fn intent_from_raw(kind: IntentKind, raw: RawAction, text: &str) -> Intent {
    if kind == IntentKind::Clarify {
        return Intent::clarify(text);
    }

    let instruction = non_empty(raw.command.clone()).unwrap_or_else(|| text.to_string());
    let file_path = non_empty(raw.file_path).or_else(|| find_file_path(text));
    let query = match kind {
        IntentKind::SearchCode => non_empty(raw.query)
            .or_else(|| search_query(text))
            .or_else(|| non_empty(raw.command.clone())),
        _ => non_empty(raw.query),
    };
    let shell_command = match kind {
        IntentKind::RunCommand => non_empty(raw.shell_command)
            .or_else(|| shell_command(text))
            .or_else(|| non_empty(raw.command.clone()).filter(|c| looks_like_shell(c))),
        _ => non_empty(raw.shell_command),
    };

    let mut intent = Intent::new(kind, &instruction, "");
    intent.file_path = file_path;
    intent.content = non_empty(raw.content).filter(|_| kind == IntentKind::CreateFile);
    intent.query = query;
    intent.shell_command = shell_command;
    intent.description = non_empty(raw.description).unwrap_or_else(|| default_description(&intent));
    intent
}

/// Keyword and structure matching, used when the oracle is no help.
pub fn keyword_intent(text: &str) -> Option<Intent> {
    let text = text.trim();
    let lower = text.to_lowercase();
    if lower.is_empty() {
        return None;
    }

    let kind = if let Some(cmd) = shell_command(text) {
        let intent = Intent::new(IntentKind::RunCommand, text, "").with_shell_command(&cmd);
        return Some(with_default_description(intent));
    } else if ["analyze", "analyse", "large files", "largest files", "how many files", "count tests", "how many tests", "codebase stats"]
        .iter()
        .any(|k| lower.contains(k))
    {
        IntentKind::Analyze
    } else if let Some(query) = search_query(text) {
        let intent = Intent::new(IntentKind::SearchCode, text, "").with_query(&query);
        return Some(with_default_description(intent));
    } else if lower.starts_with("open ") || lower.starts_with("show me ") || lower.starts_with("show ") {
        IntentKind::OpenFile
    } else if ["create", "make a", "make me", "write a", "write me", "new file", "generate", "build a"]
        .iter()
        .any(|k| lower.contains(k))
    {
        IntentKind::CreateFile
    } else if ["edit", "change", "modify", "refactor", "fix", "rename", "update", "add a", "add an"]
        .iter()
        .any(|k| lower.contains(k))
    {
        IntentKind::EditFile
    } else {
        return None;
    };

    if kind == IntentKind::OpenFile && find_file_path(text).is_none() {
        return None;
    }

    let mut intent = Intent::new(kind, text, "");
    intent.file_path = find_file_path(text);
    Some(with_default_description(intent))
}

fn with_default_description(mut intent: Intent) -> Intent {
    intent.description = default_description(&intent);
    intent
}

fn default_description(intent: &Intent) -> String {
    let file = intent.file_path.as_deref();
    match intent.kind {
        IntentKind::CreateFile => match file {
            Some(f) => format!("Creating {}", f),
            None => "Creating a new file".to_string(),
        },
        IntentKind::EditFile => match file {
            Some(f) => format!("Editing {}", f),
            None => "Editing code".to_string(),
        },
        IntentKind::OpenFile => match file {
            Some(f) => format!("Opening {}", f),
            None => "Opening a file".to_string(),
        },
        IntentKind::SearchCode => match intent.query.as_deref() {
            Some(q) => format!("Searching for \"{}\"", q),
            None => "Searching the codebase".to_string(),
        },
        IntentKind::RunCommand => match intent.shell_command.as_deref() {
            Some(c) => format!("Running `{}`", c),
            None => "Running a command".to_string(),
        },
        IntentKind::Analyze => "Analyzing the codebase".to_string(),
        IntentKind::Clarify => "Request was not understood".to_string(),
    }
}

fn find_file_path(text: &str) -> Option<String> {
    FILE_PATH.captures(text).map(|caps| caps[1].to_string())
}

fn looks_like_shell(text: &str) -> bool {
    let lower = text.trim().to_lowercase();
    SHELL_PROGRAMS
        .iter()
        .any(|p| lower.starts_with(p) || lower == p.trim_end())
}

fn shell_command(text: &str) -> Option<String> {
    if let Some(caps) = RUN_PREFIX.captures(text.trim()) {
        let rest = caps[1].trim();
        let cmd = BACKTICKED
            .captures(rest)
            .map(|c| c[1].to_string())
            .unwrap_or_else(|| rest.trim_matches(|c| c == '"' || c == '\'').to_string());
        if looks_like_shell(&cmd) {
            return Some(cmd);
        }
        return None;
    }
    if let Some(caps) = BACKTICKED.captures(text) {
        if looks_like_shell(&caps[1]) {
            return Some(caps[1].to_string());
        }
    }
    looks_like_shell(text).then(|| text.trim().to_string())
}

fn search_query(text: &str) -> Option<String> {
    SEARCH_PREFIX
        .captures(text.trim())
        .map(|caps| caps[1].trim().to_string())
        .filter(|q| !q.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    enum Reply {
        Text(&'static str),
        Error,
        Hang,
    }

    struct StubOracle(Reply);

    #[async_trait]
    impl TextOracle for StubOracle {
        async fn complete(&self, _system: Option<&str>, prompt: &str) -> anyhow::Result<String> {
            assert!(!prompt.contains("{{message}}"));
            match &self.0 {
                Reply::Text(t) => Ok(t.to_string()),
                Reply::Error => Err(anyhow::anyhow!("503 from provider")),
                Reply::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(String::new())
                }
            }
        }
    }

    fn classifier(reply: Reply) -> CommandClassifier {
        CommandClassifier::new(
            Arc::new(StubOracle(reply)),
            PromptsConfig::default(),
            Duration::from_secs(5),
        )
    }

    fn cmd(text: &str) -> Command {
        Command::new(text, "+15550001111", "+15550002222")
    }

    #[tokio::test]
    async fn parses_oracle_json() {
        let c = classifier(Reply::Text(
            r#"{"action": "create_file", "command": "Create a Python script that prints hello world", "description": "Creating a Python hello world script", "file_path": "hello.py"}"#,
        ));
        let intent = c.classify(&cmd("Create a hello world script")).await;
        assert_eq!(intent.kind, IntentKind::CreateFile);
        assert_eq!(intent.file_path.as_deref(), Some("hello.py"));
        assert_eq!(intent.description, "Creating a Python hello world script");
        assert_eq!(intent.instruction, "Create a Python script that prints hello world");
    }

    #[tokio::test]
    async fn strips_fences_and_maps_aliases() {
        let c = classifier(Reply::Text(
            "```json\n{\"action\": \"execute_command\", \"command\": \"git status\", \"description\": \"Checking git\"}\n```",
        ));
        let intent = c.classify(&cmd("what's the git status")).await;
        assert_eq!(intent.kind, IntentKind::RunCommand);
        assert_eq!(intent.shell_command.as_deref(), Some("git status"));
    }

    #[tokio::test]
    async fn finds_json_inside_prose() {
        let c = classifier(Reply::Text(
            r#"Here you go: {"action": "search", "query": "def main", "description": "Searching"} done"#,
        ));
        let intent = c.classify(&cmd("where is main defined")).await;
        assert_eq!(intent.kind, IntentKind::SearchCode);
        assert_eq!(intent.query.as_deref(), Some("def main"));
    }

    #[tokio::test]
    async fn non_json_reply_uses_structure_then_keywords() {
        let c = classifier(Reply::Text("action: open_file\nfile: app.py"));
        let intent = c.classify(&cmd("open app.py please")).await;
        assert_eq!(intent.kind, IntentKind::OpenFile);
        assert_eq!(intent.file_path.as_deref(), Some("app.py"));

        let c = classifier(Reply::Text("I would analyze the codebase for you."));
        let intent = c.classify(&cmd("stats?")).await;
        assert_eq!(intent.kind, IntentKind::Analyze);
    }

    #[tokio::test]
    async fn unhelpful_reply_is_clarify() {
        let c = classifier(Reply::Text("Sorry, I am not sure."));
        let intent = c.classify(&cmd("blorp")).await;
        assert_eq!(intent.kind, IntentKind::Clarify);
        assert_eq!(intent.instruction, "blorp");
    }

    #[tokio::test]
    async fn oracle_error_degrades_to_keywords_on_raw_text() {
        let c = classifier(Reply::Error);
        let intent = c.classify(&cmd("run git log --oneline")).await;
        assert_eq!(intent.kind, IntentKind::RunCommand);
        assert_eq!(intent.shell_command.as_deref(), Some("git log --oneline"));

        let intent = c.classify(&cmd("lorem ipsum")).await;
        assert_eq!(intent.kind, IntentKind::Clarify);
    }

    #[tokio::test(start_paused = true)]
    async fn oracle_timeout_degrades_without_retry() {
        let c = classifier(Reply::Hang);
        let intent = c.classify(&cmd("create a calculator in calc.py")).await;
        assert_eq!(intent.kind, IntentKind::CreateFile);
        assert_eq!(intent.file_path.as_deref(), Some("calc.py"));
        assert_eq!(intent.description, "Creating calc.py");
    }

    #[tokio::test]
    async fn oracle_clarify_action_is_clarify() {
        let c = classifier(Reply::Text(r#"{"action": "error", "description": "not a request"}"#));
        let intent = c.classify(&cmd("hi there")).await;
        assert_eq!(intent.kind, IntentKind::Clarify);
    }

    #[test]
    fn keyword_matching_table() {
        let cases = [
            ("search for TODO", Some(IntentKind::SearchCode)),
            ("find large files", Some(IntentKind::Analyze)),
            ("`npm test`", Some(IntentKind::RunCommand)),
            ("open src/main.rs", Some(IntentKind::OpenFile)),
            ("open the pod bay doors", None),
            ("fix the bug in utils.py", Some(IntentKind::EditFile)),
            ("run rm -rf /", None),
            ("good morning", None),
        ];
        for (text, expected) in cases {
            assert_eq!(keyword_intent(text).map(|i| i.kind), expected, "{}", text);
        }
        assert_eq!(
            keyword_intent("open src/main.rs").and_then(|i| i.file_path),
            Some("src/main.rs".to_string())
        );
    }
}
