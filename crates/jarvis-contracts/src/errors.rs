use thiserror::Error;

/// Longest slice of untrusted classifier output carried inside an error.
pub const ERROR_SNIPPET_MAX_CHARS: usize = 200;

/// Failures `Router::route` can surface. The router never silently defaults
/// to a capability; graceful degradation lives one layer up, in the
/// orchestration machine.
#[derive(Debug, Error)]
pub enum RouteError {
    #[error("input was empty after cleaning")]
    EmptyInput,

    #[error("rate limit exceeded: {limit} requests per {window_seconds}s")]
    RateLimited { limit: usize, window_seconds: u64 },

    #[error("classifier output unparseable after {attempts} attempts: {snippet}")]
    ClassificationParse { attempts: usize, snippet: String },

    #[error("classifier selected unknown capability '{name}'")]
    UnknownCapability { name: String },

    #[error("classifier gateway failed: {detail}")]
    Gateway { detail: String },
}

/// Truncate untrusted text for embedding in errors and event payloads.
pub fn snippet(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.chars().count() <= ERROR_SNIPPET_MAX_CHARS {
        return trimmed.to_string();
    }
    let mut cut: String = trimmed.chars().take(ERROR_SNIPPET_MAX_CHARS).collect();
    cut.push('…');
    cut
}

#[cfg(test)]
mod tests {
    use super::{snippet, RouteError, ERROR_SNIPPET_MAX_CHARS};

    #[test]
    fn snippet_keeps_short_text_untouched() {
        assert_eq!(snippet("  hello  "), "hello");
    }

    #[test]
    fn snippet_truncates_on_char_boundaries() {
        let long = "é".repeat(ERROR_SNIPPET_MAX_CHARS + 50);
        let cut = snippet(&long);
        assert_eq!(cut.chars().count(), ERROR_SNIPPET_MAX_CHARS + 1);
        assert!(cut.ends_with('…'));
    }

    #[test]
    fn errors_render_their_context() {
        let err = RouteError::RateLimited {
            limit: 10,
            window_seconds: 60,
        };
        assert_eq!(err.to_string(), "rate limit exceeded: 10 requests per 60s");

        let err = RouteError::UnknownCapability {
            name: "NONEXISTENT".to_string(),
        };
        assert!(err.to_string().contains("NONEXISTENT"));
    }
}
