//! Resolve the YouTube video id a client will play from a relayed URL.

use std::sync::LazyLock;

use regex::Regex;

static VIDEO_ID_PATTERNS: LazyLock<[Regex; 5]> = LazyLock::new(|| {
    [
        r"(?i)v=([A-Za-z0-9_-]{6,})",
        r"(?i)youtu\.be/([A-Za-z0-9_-]{6,})",
        r"(?i)youtube\.com/embed/([A-Za-z0-9_-]{6,})",
        r"(?i)youtube\.com/shorts/([A-Za-z0-9_-]{6,})",
        r"(?i)youtube\.com/live/([A-Za-z0-9_-]{6,})",
    ]
    .map(|pattern| Regex::new(pattern).unwrap())
});

/// Extract the video id from watch, short-link, embed, shorts and live URLs.
pub fn youtube_video_id(url: &str) -> Option<&str> {
    let url = url.trim();
    VIDEO_ID_PATTERNS
        .iter()
        .find_map(|re| re.captures(url))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn watch_url() {
        assert_eq!(
            youtube_video_id("https://www.youtube.com/watch?v=dQw4w9WgXcQ&t=42"),
            Some("dQw4w9WgXcQ")
        );
    }

    #[test]
    fn short_link_embed_shorts_live() {
        assert_eq!(youtube_video_id("https://youtu.be/dQw4w9WgXcQ"), Some("dQw4w9WgXcQ"));
        assert_eq!(
            youtube_video_id("https://www.youtube.com/embed/abc_DEF-12"),
            Some("abc_DEF-12")
        );
        assert_eq!(
            youtube_video_id("https://youtube.com/shorts/Short123"),
            Some("Short123")
        );
        assert_eq!(youtube_video_id("https://youtube.com/live/LiveId99"), Some("LiveId99"));
    }

    #[test]
    fn trims_whitespace() {
        assert_eq!(youtube_video_id("  https://youtu.be/abcdef  "), Some("abcdef"));
    }

    #[test]
    fn rejects_short_or_foreign_ids() {
        assert_eq!(youtube_video_id("https://youtu.be/abc"), None);
        assert_eq!(youtube_video_id("https://vimeo.com/123456789"), None);
        assert_eq!(youtube_video_id(""), None);
    }
}
