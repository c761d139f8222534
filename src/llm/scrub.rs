use std::borrow::Cow;

const MAX_API_ERROR_CHARS: usize = 200;
const REDACTED: &str = "[REDACTED]";

/// Prefixes whose trailing token is itself the secret.
const TOKEN_PREFIXES: [&str; 6] = ["AIza", "ya29.", "AKIA", "ASIA", "eyJ", "sk-"];

/// Markers followed by a secret value.
const VALUE_MARKERS: [&str; 12] = [
    "Authorization: Bearer ",
    "authorization: bearer ",
    "x-pan-token: ",
    "x-goog-api-key: ",
    "key=",
    "api_key=",
    "password=",
    "\"api_key\":\"",
    "\"token\":\"",
    "\"password\":\"",
    "\"secret\":\"",
    "\"database_url\":\"",
];

fn is_secret_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':' | '+' | '/' | '=')
}

/// Replace the token following every occurrence of `marker` (marker included).
fn redact_after(text: &mut String, marker: &str) {
    let mut cursor = 0;
    while let Some(rel) = text[cursor..].find(marker) {
        let start = cursor + rel;
        let value_start = start + marker.len();
        let value_len: usize = text[value_start..]
            .chars()
            .take_while(|c| is_secret_char(*c))
            .map(char::len_utf8)
            .sum();

        if value_len == 0 {
            cursor = value_start;
            continue;
        }

        text.replace_range(start..value_start + value_len, REDACTED);
        cursor = start + REDACTED.len();
    }
}

/// Redact API keys, bearer tokens and credential fields from free text.
pub fn scrub_secret_patterns(input: &str) -> Cow<'_, str> {
    let hit = TOKEN_PREFIXES
        .iter()
        .chain(VALUE_MARKERS.iter())
        .any(|pattern| input.contains(pattern));
    if !hit {
        return Cow::Borrowed(input);
    }

    let mut scrubbed = input.to_string();
    for pattern in TOKEN_PREFIXES.iter().chain(VALUE_MARKERS.iter()) {
        redact_after(&mut scrubbed, pattern);
    }
    Cow::Owned(scrubbed)
}

/// Scrub and truncate upstream error text before it reaches logs or clients.
pub fn sanitize_api_error(input: &str) -> String {
    let scrubbed = scrub_secret_patterns(input);
    if scrubbed.chars().count() <= MAX_API_ERROR_CHARS {
        return scrubbed.into_owned();
    }

    let truncated: String = scrubbed.chars().take(MAX_API_ERROR_CHARS).collect();
    format!("{truncated}...")
}
