//! Tolerant M3U parser
//!
//! Pairs each `#EXTINF` metadata line with the next `http` line and turns the
//! pair into a [`Channel`]. Nothing here fails: missing fields fall back to
//! fixed defaults and anything unrecognised is skipped.

use lazy_static::lazy_static;
use regex::Regex;

use crate::models::{Channel, PLACEHOLDER_LOGO, UNNAMED_CHANNEL};

const EXTINF_TAG: &str = "#EXTINF";
const STREAM_SCHEME_PREFIX: &str = "http";

lazy_static! {
    /// `tvg-logo="..."`, only as a whole attribute name
    static ref TVG_LOGO_REGEX: Regex = Regex::new(r#"(?:^|[\s:])tvg-logo="([^"]*)""#).unwrap();
    /// `tvg-name="..."`, only as a whole attribute name
    static ref TVG_NAME_REGEX: Regex = Regex::new(r#"(?:^|[\s:])tvg-name="([^"]*)""#).unwrap();
}

/// Metadata from an `#EXTINF` line still waiting for its stream URL
#[derive(Debug)]
struct PendingChannel {
    name: String,
    logo_url: String,
}

/// Result of one parse pass
#[derive(Debug, Default)]
pub struct ParsedPlaylist {
    pub channels: Vec<Channel>,
    /// `#EXTINF` entries that never got a stream URL
    pub dropped_entries: usize,
}

fn capture_attr<'a>(regex: &Regex, line: &'a str) -> Option<&'a str> {
    regex
        .captures(line)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Channel logo from `tvg-logo` as written, or the placeholder when the attribute is absent
fn extract_logo(line: &str) -> String {
    capture_attr(&TVG_LOGO_REGEX, line)
        .unwrap_or(PLACEHOLDER_LOGO)
        .to_string()
}

/// Channel name: `tvg-name`, then the text after the last comma (the whole
/// line when there is no comma), then the sentinel
fn extract_name(line: &str) -> String {
    if let Some(name) = capture_attr(&TVG_NAME_REGEX, line)
        .map(str::trim)
        .filter(|name| !name.is_empty())
    {
        return name.to_string();
    }

    let title = match line.rfind(',') {
        Some(comma) => line[comma + 1..].trim(),
        None => line.trim(),
    };

    Some(title)
        .filter(|title| !title.is_empty())
        .unwrap_or(UNNAMED_CHANNEL)
        .to_string()
}

fn parse_extinf(line: &str) -> PendingChannel {
    PendingChannel {
        name: extract_name(line),
        logo_url: extract_logo(line),
    }
}

/// Parse playlist text into channels, in document order.
///
/// Ids are `br_1..br_n` over the channels that survive, so they stay dense even
/// when entries without a URL are dropped.
pub fn parse_playlist(content: &str) -> ParsedPlaylist {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);

    let mut parsed = ParsedPlaylist::default();
    let mut pending: Option<PendingChannel> = None;

    for line in content.lines() {
        let line = line.trim();

        if line.starts_with(EXTINF_TAG) {
            if pending.replace(parse_extinf(line)).is_some() {
                parsed.dropped_entries += 1;
            }
            continue;
        }

        if line.starts_with(STREAM_SCHEME_PREFIX) {
            if let Some(entry) = pending.take() {
                let id = Channel::id_for_position(parsed.channels.len() + 1);
                parsed.channels.push(Channel {
                    id,
                    name: entry.name,
                    logo_url: entry.logo_url,
                    stream_url: line.to_string(),
                });
            }
        }
    }

    if pending.is_some() {
        parsed.dropped_entries += 1;
    }

    parsed
}
