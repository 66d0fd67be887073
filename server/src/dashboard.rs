use maud::{html, Markup, PreEscaped, DOCTYPE};
use smspilot_core::db::{LogEntry, LogStats};

const STYLE: &str = "body{font-family:system-ui,sans-serif;margin:2rem;color:#222}\
table{border-collapse:collapse;width:100%}td,th{border-bottom:1px solid #ddd;padding:.4rem;text-align:left;vertical-align:top}\
.stats span{display:inline-block;margin-right:2rem;font-size:1.2rem}\
.completed{color:#1a7f37}.predicted{color:#9a6700}.failed{color:#cf222e}";

/// Last four digits only.
fn mask_number(number: &str) -> String {
    let digits: Vec<char> = number.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() <= 4 {
        return number.to_string();
    }
    let tail: String = digits[digits.len() - 4..].iter().collect();
    format!("***{}", tail)
}

fn entry_row(entry: &LogEntry) -> Markup {
    html! {
        tr {
            td { (entry.received_at.format("%Y-%m-%d %H:%M:%S").to_string()) }
            td { (mask_number(&entry.sender)) }
            td { (entry.command) }
            td { (entry.intent) }
            td { (entry.channel.as_deref().unwrap_or("-")) }
            td class=(entry.status) { (entry.status) }
            td { (entry.reply) }
        }
    }
}

pub fn render(stats: &LogStats, entries: &[LogEntry]) -> String {
    let markup = html! {
        (DOCTYPE)
        html lang="en" {
            head {
                meta charset="utf-8";
                title { "SMSPilot" }
                style { (PreEscaped(STYLE)) }
            }
            body {
                h1 { "SMSPilot" }
                div class="stats" {
                    span { "Messages: " (stats.total_messages) }
                    span { "Completed: " (stats.successful_actions) }
                    span { "Failed: " (stats.errors) }
                }
                h2 { "Recent commands" }
                table {
                    tr {
                        th { "Received" }
                        th { "From" }
                        th { "Command" }
                        th { "Intent" }
                        th { "Channel" }
                        th { "Status" }
                        th { "Reply" }
                    }
                    @for entry in entries {
                        (entry_row(entry))
                    }
                    @if entries.is_empty() {
                        tr { td colspan="7" { "No messages yet." } }
                    }
                }
            }
        }
    };
    markup.into_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn entry(sender: &str, command: &str) -> LogEntry {
        LogEntry {
            id: 1,
            command_id: "c".into(),
            received_at: Utc::now(),
            sender: sender.into(),
            command: command.into(),
            intent: "create_file".into(),
            channel: Some("tool_protocol".into()),
            status: "completed".into(),
            summary: "s".into(),
            reply: "Done".into(),
            attempts: serde_json::json!([]),
        }
    }

    #[test]
    fn masks_numbers_and_escapes_text() {
        let html = render(
            &LogStats::default(),
            &[entry("+15550001234", "create <b>x</b>.py")],
        );

        assert!(html.contains("***1234"));
        assert!(!html.contains("+15550001234"));
        assert!(html.contains("create &lt;b&gt;x&lt;/b&gt;.py"));
        assert!(!html.contains("<b>x</b>"));
        assert!(html.contains("class=\"completed\""));
    }

    #[test]
    fn empty_log_says_so() {
        let stats = LogStats {
            total_messages: 3,
            successful_actions: 2,
            errors: 1,
        };
        let html = render(&stats, &[]);
        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("No messages yet."));
        assert!(html.contains("Messages: 3"));
    }
}
