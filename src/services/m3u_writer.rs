//! M3U re-export of the catalog
//!
//! Every entry points at this server's `/play/<id>` route instead of the
//! upstream URL, so playback always goes through the redirect endpoint.

use std::fmt::Write;

use crate::models::Channel;

pub const M3U_HEADER: &str = "#EXTM3U";

/// Render `channels` as M3U with stream lines rooted at `base_url`
pub fn render_m3u(channels: &[Channel], base_url: &str) -> String {
    let base_url = base_url.trim_end_matches('/');
    let mut out = String::with_capacity(M3U_HEADER.len() + 1 + channels.len() * 160);
    out.push_str(M3U_HEADER);
    out.push('\n');

    for channel in channels {
        // Writing into a String cannot fail
        let _ = write!(
            out,
            "#EXTINF:-1 tvg-logo=\"{}\",{}\n{}/play/{}\n",
            channel.logo_url, channel.name, base_url, channel.id
        );
    }

    out
}
