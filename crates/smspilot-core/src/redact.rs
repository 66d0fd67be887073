//! Scrubs credentials out of provider error bodies and tool output before they are logged.

use once_cell::sync::Lazy;
use regex::Regex;

const REDACTED: &str = "[REDACTED]";

static BEARER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)(bearer\s+)[^\s"',]+"#).expect("valid bearer pattern"));

static BASIC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)(authorization:\s*basic\s+)[A-Za-z0-9+/=]+"#).expect("valid basic pattern"));

static API_KEY_HEADER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)(x-(?:goog-)?api-key["']?\s*[:=]\s*["']?)[^\s"',]+"#).expect("valid header pattern")
});

static KEY_QUERY_PARAM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"([?&](?:key|api_key|token)=)[^&\s"']+"#).expect("valid query pattern"));

static INCORRECT_KEY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(Incorrect API key provided:\s*)[^\s"'.]+"#).expect("valid provider message pattern")
});

static SK_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(sk-(?:ant-)?)[A-Za-z0-9_\-]{6,}").expect("valid sk pattern"));

static GOOGLE_KEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bAIza[0-9A-Za-z_\-]{20,}").expect("valid google key pattern"));

static JSON_SECRET_FIELD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"("(?:api_key|apiKey|auth_token|authToken|password|secret)"\s*:\s*")[^"]*(")"#)
        .expect("valid json field pattern")
});

pub fn redact_secrets(input: &str) -> String {
    let s = BEARER.replace_all(input, format!("${{1}}{}", REDACTED).as_str());
    let s = BASIC.replace_all(&s, format!("${{1}}{}", REDACTED).as_str());
    let s = API_KEY_HEADER.replace_all(&s, format!("${{1}}{}", REDACTED).as_str());
    let s = KEY_QUERY_PARAM.replace_all(&s, format!("${{1}}{}", REDACTED).as_str());
    let s = INCORRECT_KEY.replace_all(&s, format!("${{1}}{}", REDACTED).as_str());
    let s = SK_TOKEN.replace_all(&s, format!("${{1}}{}", REDACTED).as_str());
    let s = GOOGLE_KEY.replace_all(&s, REDACTED);
    let s = JSON_SECRET_FIELD.replace_all(&s, format!("${{1}}{}${{2}}", REDACTED).as_str());
    s.into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redacts_incorrect_api_key_message() {
        let input = r#"Incorrect API key provided: sk-abc123DEF456. You can find your API key"#;
        let out = redact_secrets(input);
        assert!(!out.contains("abc123"));
        assert!(out.contains(REDACTED));
        assert!(out.ends_with("You can find your API key"));
    }

    #[test]
    fn redacts_bearer_token() {
        let out = redact_secrets("Authorization: Bearer sk-aaaabbbbccccdddd");
        assert!(!out.contains("aaaabbbb"));
        assert!(out.contains("Bearer [REDACTED]"));
    }

    #[test]
    fn redacts_gemini_key_in_url_and_header() {
        let out = redact_secrets(
            "POST https://generativelanguage.googleapis.com/v1beta/models/x:generateContent?key=AIzaSyA1234567890abcdefghijk&alt=json",
        );
        assert!(!out.contains("AIzaSy"));
        assert!(out.contains("?key=[REDACTED]&alt=json"));

        let out = redact_secrets("x-goog-api-key: secretvalue123");
        assert_eq!(out, "x-goog-api-key: [REDACTED]");
    }

    #[test]
    fn redacts_json_secret_fields() {
        let out = redact_secrets(r#"{"api_key": "abc", "auth_token":"def", "model":"m"}"#);
        assert_eq!(
            out,
            r#"{"api_key": "[REDACTED]", "auth_token":"[REDACTED]", "model":"m"}"#
        );
    }

    #[test]
    fn leaves_plain_text_alone() {
        let input = "Created hello.py with 3 lines";
        assert_eq!(redact_secrets(input), input);
    }
}
