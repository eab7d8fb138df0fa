//! Output naming: timestamped, filesystem-safe file names derived from prompts.

use std::fmt::Display;

use chrono::{DateTime, TimeZone};

/// Upper bound on slug length, in characters
pub const MAX_SLUG_CHARS: usize = 60;

const UNSAFE_CHARS: &[char] = &['/', '\\', '?', '%', '*', ':', '|', '"', '<', '>'];

/// Reduce a prompt to a short, filesystem-safe slug.
///
/// Whitespace runs collapse to one space, the result is truncated to
/// [`MAX_SLUG_CHARS`], unsafe and control characters are dropped and spaces
/// become underscores.
pub fn slugify(prompt: &str) -> String {
    let collapsed = prompt.split_whitespace().collect::<Vec<_>>().join(" ");
    let truncated: String = collapsed.chars().take(MAX_SLUG_CHARS).collect();

    let cleaned: String = truncated
        .chars()
        .filter(|c| !c.is_control() && !UNSAFE_CHARS.contains(c))
        .collect();

    let slug = cleaned.trim_end_matches(['.', ' ']).trim().replace(' ', "_");
    if slug.is_empty() { "untitled".to_string() } else { slug }
}

/// `YYYY-MM-DD_HH-MM-SS__<slug>.mp4`
pub fn output_filename<Tz>(prompt: &str, at: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    format!("{}__{}.mp4", at.format("%Y-%m-%d_%H-%M-%S"), slugify(prompt))
}
