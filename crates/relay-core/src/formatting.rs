//! Telegram HTML helpers.

use crate::domain::UserId;

/// Telegram message text limit.
pub const TEXT_LIMIT: usize = 4096;
/// Telegram media caption limit.
pub const CAPTION_LIMIT: usize = 1024;

const ELLIPSIS: &str = "...";

/// Length as Telegram counts it (UTF-16 code units).
pub fn telegram_len(s: &str) -> usize {
    s.encode_utf16().count()
}

fn escape_char(c: char) -> Option<&'static str> {
    match c {
        '&' => Some("&amp;"),
        '<' => Some("&lt;"),
        '>' => Some("&gt;"),
        '"' => Some("&quot;"),
        _ => None,
    }
}

/// Escape HTML special characters for Telegram HTML parse mode.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match escape_char(c) {
            Some(entity) => out.push_str(entity),
            None => out.push(c),
        }
    }
    out
}

/// Escape `text` and cut it so the escaped result fits in `budget` Telegram units,
/// appending `...` when cut. Entities are never split.
pub fn escape_html_within(text: &str, budget: usize) -> String {
    let escaped = escape_html(text);
    if telegram_len(&escaped) <= budget {
        return escaped;
    }

    let room = budget.saturating_sub(ELLIPSIS.len());
    let mut out = String::new();
    let mut used = 0;
    for c in text.chars() {
        let piece_len = match escape_char(c) {
            Some(entity) => entity.len(),
            None => c.len_utf16(),
        };
        if used + piece_len > room {
            break;
        }
        used += piece_len;
        match escape_char(c) {
            Some(entity) => out.push_str(entity),
            None => out.push(c),
        }
    }
    out.push_str(ELLIPSIS);
    out
}

/// Deep link that opens a private chat with `user_id`.
pub fn user_deep_link(user_id: UserId) -> String {
    format!("tg://user?id={}", user_id.0)
}

/// Truncate to `max_chars` characters, appending `...` when cut.
pub fn truncate_chars(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    format!("{}...", s.chars().take(max_chars).collect::<String>())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_markup_characters() {
        assert_eq!(
            escape_html(r#"<b>"Tom & Jerry"</b>"#),
            "&lt;b&gt;&quot;Tom &amp; Jerry&quot;&lt;/b&gt;"
        );
    }

    #[test]
    fn truncates_on_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 10), "héllo");
        assert_eq!(truncate_chars("héllo", 2), "hé...");
    }

    #[test]
    fn escaped_text_is_bounded_without_splitting_entities() {
        assert_eq!(escape_html_within("a<b", 20), "a&lt;b");

        // 3 chars of `<` escape to 12 units; only one entity fits before the ellipsis.
        assert_eq!(escape_html_within("<<<", 9), "&lt;...");

        let long = "<".repeat(TEXT_LIMIT);
        let bounded = escape_html_within(&long, TEXT_LIMIT - 100);
        assert!(telegram_len(&bounded) <= TEXT_LIMIT - 100);
        assert!(bounded.ends_with("&lt;..."));
    }

    #[test]
    fn telegram_len_counts_utf16_units() {
        assert_eq!(telegram_len("abc"), 3);
        assert_eq!(telegram_len("📢 "), 3);
    }

    #[test]
    fn deep_link_format() {
        assert_eq!(user_deep_link(UserId(42)), "tg://user?id=42");
    }
}
