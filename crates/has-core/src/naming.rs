//! Component name resolution.
//!
//! Turns a repository URL (and optionally a context directory) into a
//! DNS-1123 label usable as a Component name, optionally de-duplicated against
//! names that already exist.

use rand::Rng;
use regex::Regex;
use std::sync::LazyLock;

use crate::{Error, Result};

/// Maximum length of a DNS-1123 label.
pub const MAX_NAME_LENGTH: usize = 63;

/// Names are cut here so a `-xxxx` suffix still fits.
const TRUNCATED_LENGTH: usize = 58;

/// Bound on suffix attempts; a predicate that always reports a collision
/// must not spin forever.
pub const MAX_UNIQUE_ATTEMPTS: usize = 16;

const SUFFIX_LENGTH: usize = 4;
const SUFFIX_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

static DNS1123_LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?$").unwrap());

/// Input to [`resolve_component_name`].
#[derive(Debug, Clone, Default)]
pub struct NameRequest<'a> {
    pub repo_url: &'a str,
    pub context: Option<&'a str>,
    /// Prefix the context and suffix on collision instead of returning a
    /// stable name.
    pub unique: bool,
}

/// True when `name` is a valid DNS-1123 label.
pub fn is_dns1123_label(name: &str) -> bool {
    name.len() <= MAX_NAME_LENGTH && DNS1123_LABEL.is_match(name)
}

/// Last path segment of a repository URL, without a trailing slash or `.git`.
pub fn repository_segment(repo_url: &str) -> &str {
    let trimmed = repo_url.trim().trim_end_matches('/');
    let segment = trimmed.rsplit('/').next().unwrap_or(trimmed);
    let segment = segment.rsplit(':').next().unwrap_or(segment);
    segment.strip_suffix(".git").unwrap_or(segment)
}

/// Lowercase, map separators to `-`, drop everything outside `[a-z0-9-]`.
fn sanitize(base: &str) -> String {
    let mut out = String::with_capacity(base.len());
    for c in base.chars() {
        let c = c.to_ascii_lowercase();
        match c {
            'a'..='z' | '0'..='9' => out.push(c),
            '-' | '/' | '_' | '.' | ' ' => {
                if !out.ends_with('-') {
                    out.push('-');
                }
            }
            _ => {}
        }
    }
    out.trim_matches('-').to_string()
}

/// Four random lowercase alphanumerics for disambiguating generated names.
pub fn random_suffix() -> String {
    let mut rng = rand::rng();
    (0..SUFFIX_LENGTH)
        .map(|_| SUFFIX_CHARSET[rng.random_range(0..SUFFIX_CHARSET.len())] as char)
        .collect()
}

/// Base name before collision handling.
pub fn base_component_name(request: &NameRequest<'_>) -> String {
    let segment = repository_segment(request.repo_url);
    let context = request
        .context
        .map(crate::api::component::normalize_context)
        .unwrap_or_default();

    let mut name = if request.unique && !context.is_empty() {
        format!("{}-{}", context, segment)
    } else {
        segment.to_string()
    };

    if !is_dns1123_label(&name) {
        name = sanitize(&name);
    }
    if name.is_empty() {
        name = "component".to_string();
    }
    if name.chars().all(|c| c.is_ascii_digit()) {
        name = format!("comp-{}", name);
    }
    if name.len() > TRUNCATED_LENGTH {
        name.truncate(TRUNCATED_LENGTH);
        name = name.trim_end_matches('-').to_string();
    }
    name
}

/// Resolve a Component name.
///
/// With `unique` set, `exists` is consulted and a random `-xxxx` suffix is
/// appended until it reports the name free, up to [`MAX_UNIQUE_ATTEMPTS`].
pub fn resolve_component_name<F>(request: &NameRequest<'_>, exists: F) -> Result<String>
where
    F: Fn(&str) -> bool,
{
    let base = base_component_name(request);
    if !request.unique || !exists(&base) {
        return Ok(base);
    }

    for _ in 0..MAX_UNIQUE_ATTEMPTS {
        let candidate = format!("{}-{}", base, random_suffix());
        if !exists(&candidate) {
            return Ok(candidate);
        }
    }

    Err(Error::Conflict(format!(
        "unable to find a free name for {} after {} attempts",
        base, MAX_UNIQUE_ATTEMPTS
    )))
}
