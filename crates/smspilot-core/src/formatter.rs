//! Reply formatting - one SMS, never over the carrier's body ceiling.

use crate::dispatch::{ExecutionSummary, SummaryStatus};

/// Carrier ceiling for a single message body, in characters.
pub const DEFAULT_MAX_REPLY_CHARS: usize = 1600;

/// Marker appended when a reply had to be cut.
pub const ELLIPSIS: &str = "...";

/// Longest prefix of `s` with at most `max_chars` characters, cut on a char boundary.
pub fn safe_truncate(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Last `max_chars` characters of `s`.
pub fn truncate_tail(s: &str, max_chars: usize) -> String {
    let count = s.chars().count();
    if count <= max_chars {
        return s.to_string();
    }
    s.chars().skip(count - max_chars).collect()
}

/// Collapse whitespace runs and cut to `max_chars`, ending in [`ELLIPSIS`] when cut.
pub fn fit_to_limit(text: &str, max_chars: usize) -> String {
    let collapsed = text
        .lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n");

    if collapsed.chars().count() <= max_chars {
        return collapsed;
    }

    let marker_len = ELLIPSIS.chars().count();
    if max_chars <= marker_len {
        return safe_truncate(ELLIPSIS, max_chars).to_string();
    }
    let kept = safe_truncate(&collapsed, max_chars - marker_len).trim_end();
    format!("{}{}", kept, ELLIPSIS)
}

#[derive(Debug, Clone, Copy)]
pub struct ReplyFormatter {
    max_chars: usize,
}

impl Default for ReplyFormatter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_REPLY_CHARS)
    }
}

impl ReplyFormatter {
    pub fn new(max_chars: usize) -> Self {
        Self { max_chars }
    }

    pub fn max_chars(&self) -> usize {
        self.max_chars
    }

    pub fn format(&self, summary: &ExecutionSummary) -> String {
        let body = match summary.status {
            SummaryStatus::Completed => format!("Done: {}", summary.description),
            SummaryStatus::Predicted | SummaryStatus::Failed => summary.description.clone(),
        };
        fit_to_limit(&body, self.max_chars)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{ChannelKind, ErrorKind};

    fn summary(status: SummaryStatus, description: &str) -> ExecutionSummary {
        ExecutionSummary {
            status,
            channel: Some(ChannelKind::ToolProtocol),
            description: description.to_string(),
            last_error: None,
        }
    }

    #[test]
    fn short_reply_is_untouched_apart_from_whitespace() {
        let formatter = ReplyFormatter::new(160);
        let reply = formatter.format(&summary(SummaryStatus::Completed, "Created   hello.py\n\n via tool server"));
        assert_eq!(reply, "Done: Created hello.py\nvia tool server");
    }

    #[test]
    fn long_reply_is_cut_with_ellipsis_within_ceiling() {
        let formatter = ReplyFormatter::new(50);
        let long = "word ".repeat(100);
        let reply = formatter.format(&summary(SummaryStatus::Failed, &long));
        assert!(reply.chars().count() <= 50);
        assert!(reply.ends_with(ELLIPSIS));
    }

    #[test]
    fn multibyte_text_never_exceeds_ceiling() {
        for max in [1, 2, 3, 4, 10, 37] {
            let text = "✅ 完成 emoji 🚀 ".repeat(20);
            let out = fit_to_limit(&text, max);
            assert!(out.chars().count() <= max, "max={} out={}", max, out);
        }
    }

    #[test]
    fn failed_summary_keeps_plain_description() {
        let mut s = summary(SummaryStatus::Failed, "Could not complete \"x\" (last error: timed out)");
        s.last_error = Some(ErrorKind::Timeout);
        assert_eq!(
            ReplyFormatter::default().format(&s),
            "Could not complete \"x\" (last error: timed out)"
        );
    }

    #[test]
    fn tail_and_head_truncation() {
        assert_eq!(safe_truncate("héllo", 2), "hé");
        assert_eq!(safe_truncate("hi", 5), "hi");
        assert_eq!(truncate_tail("abcdef", 3), "def");
        assert_eq!(truncate_tail("ab", 3), "ab");
    }
}
