//! Token smoothing: removes the consecutive duplicate words streaming STT
//! services occasionally emit ("the the weather").

/// Collapse adjacent tokens whose normalized forms match.
///
/// Tokens are kept verbatim (casing and punctuation preserved); only the
/// comparison uses the normalized form. Scoped to a single utterance: each
/// interim hypothesis is an independent restatement, so no state crosses
/// calls. Idempotent.
pub fn smooth(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut prev: Option<String> = None;

    for token in text.split_whitespace() {
        let normalized = normalize(token);
        if prev.as_deref() == Some(normalized.as_str()) {
            continue;
        }
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(token);
        prev = Some(normalized);
    }

    out
}

/// Lowercased token with leading/trailing non-alphanumerics stripped.
fn normalize(token: &str) -> String {
    token
        .trim_matches(|c: char| !c.is_alphanumeric())
        .to_lowercase()
}
