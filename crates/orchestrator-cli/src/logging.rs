//! Logging setup and the redaction layer. `EnvFilter` driven by
//! `LOG_LEVEL` via `tracing_subscriber::fmt()...with_env_filter(...)`.
//! Sensitive field values are masked with a fixed placeholder before any
//! line reaches stdout.

use std::io::{self, Write};

use tracing_subscriber::fmt::writer::MakeWriter;
use tracing_subscriber::EnvFilter;

const REDACTED: &str = "[REDACTED]";

const SENSITIVE_KEYS: &[&str] = &[
    "apikey",
    "token",
    "password",
    "secret",
    "authorization",
    "credentials",
    "anthropic_api_key",
    "config.anthropicapikey",
];

/// True if `key` names a credential, case-insensitively and ignoring `_`
/// separators, so `apiKey`, `api_key`, and `config.anthropicApiKey` all
/// match without enumerating every spelling.
fn is_sensitive_key(key: &str) -> bool {
    let normalized: String = key.chars().filter(|c| *c != '_').collect::<String>().to_lowercase();
    SENSITIVE_KEYS
        .iter()
        .any(|k| normalized.contains(&k.chars().filter(|c| *c != '_').collect::<String>()))
}

/// Scan a formatted log line for `key=value` or `key: value` pairs whose
/// key is sensitive and replace the value with `[REDACTED]`. Runs on the
/// fully rendered line rather than at the field-value level, so it also
/// catches secrets embedded inside a free-text message.
pub fn redact_line(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut rest = line;
    loop {
        let Some(eq_or_colon) = rest.find(['=', ':']) else {
            out.push_str(rest);
            break;
        };
        let key_start = rest[..eq_or_colon]
            .rfind(|c: char| c.is_whitespace() || c == ',' || c == '{')
            .map(|i| i + 1)
            .unwrap_or(0);
        let key = &rest[key_start..eq_or_colon];
        out.push_str(&rest[..eq_or_colon + 1]);

        if is_sensitive_key(key) {
            let value_start = eq_or_colon + 1;
            let value_end = rest[value_start..]
                .find(|c: char| c.is_whitespace() || c == ',' || c == '}')
                .map(|i| value_start + i)
                .unwrap_or(rest.len());
            out.push_str(REDACTED);
            rest = &rest[value_end..];
        } else {
            rest = &rest[eq_or_colon + 1..];
        }
    }
    out
}

/// A `std::io::Write` sink that buffers bytes until a newline, redacts the
/// completed line, and forwards it downstream. `tracing-subscriber` writes
/// one formatted event per `write` call but offers no hook into the
/// formatted string itself, so redaction happens one layer down, at the
/// writer the formatter targets.
struct RedactingWriter<W> {
    inner: W,
    buf: Vec<u8>,
}

impl<W: Write> Write for RedactingWriter<W> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(data);
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            let text = String::from_utf8_lossy(&line);
            self.inner.write_all(redact_line(text.trim_end_matches('\n')).as_bytes())?;
            self.inner.write_all(b"\n")?;
        }
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[derive(Clone, Default)]
struct RedactingMakeWriter;

impl<'a> MakeWriter<'a> for RedactingMakeWriter {
    type Writer = RedactingWriter<io::Stdout>;

    fn make_writer(&'a self) -> Self::Writer {
        RedactingWriter {
            inner: io::stdout(),
            buf: Vec::new(),
        }
    }
}

/// Initializes the global `tracing` subscriber. `LOG_LEVEL` overrides the
/// default `info` filter; every rendered line passes through the redaction
/// layer regardless of level.
pub fn init() {
    let filter = EnvFilter::try_from_env("LOG_LEVEL").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(RedactingMakeWriter)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redacts_api_key_assignment() {
        let line = r#"msg="calling anthropic" apiKey=sk-ant-abc123 session_id=42"#;
        let redacted = redact_line(line);
        assert!(!redacted.contains("sk-ant-abc123"));
        assert!(redacted.contains("session_id=42"));
    }

    #[test]
    fn redacts_nested_config_key() {
        let line = "config.anthropicApiKey=secretvalue status=ok";
        let redacted = redact_line(line);
        assert!(!redacted.contains("secretvalue"));
        assert!(redacted.contains("status=ok"));
    }

    #[test]
    fn leaves_ordinary_fields_untouched() {
        let line = "session_id=abc status=success tool_call_count=3";
        assert_eq!(redact_line(line), line);
    }

    #[test]
    fn is_sensitive_key_matches_underscored_and_camel_variants() {
        assert!(is_sensitive_key("apiKey"));
        assert!(is_sensitive_key("api_key"));
        assert!(is_sensitive_key("ANTHROPIC_API_KEY"));
        assert!(!is_sensitive_key("session_id"));
    }
}
