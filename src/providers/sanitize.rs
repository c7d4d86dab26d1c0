// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Credential redaction for messages that leave the process.

use once_cell::sync::Lazy;
use regex::Regex;

/// Replacement text for redacted secrets.
pub const REDACTED: &str = "[REDACTED]";

static API_KEY: Lazy<Regex> = Lazy::new(|| Regex::new(r"sk-[A-Za-z0-9]{16,}").unwrap());
static BEARER: Lazy<Regex> = Lazy::new(|| Regex::new(r"Bearer\s+[A-Za-z0-9\-._~+/]+=*").unwrap());
static BASIC: Lazy<Regex> = Lazy::new(|| Regex::new(r"Basic\s+[A-Za-z0-9\-._~+/]+=*").unwrap());
static PASSWORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(password|passwd|pwd)([:=])\s*[^,;]+").unwrap());
static CARD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(?:\d{4}[- ]?){3}\d{4}\b").unwrap());

/// Replace API keys, authorization tokens, passwords and card numbers with `[REDACTED]`.
///
/// Applying it twice gives the same result as applying it once.
pub fn sanitize(message: &str) -> String {
    let out = BEARER.replace_all(message, REDACTED);
    let out = BASIC.replace_all(&out, REDACTED);
    let out = API_KEY.replace_all(&out, REDACTED);
    let out = PASSWORD.replace_all(&out, format!("${{1}}${{2}}{REDACTED}").as_str());
    CARD.replace_all(&out, REDACTED).into_owned()
}
