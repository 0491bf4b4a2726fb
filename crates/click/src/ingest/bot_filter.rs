/// Bounded set of known crawler tokens, substring-matched against a
/// lower-cased user-agent string.
const BOT_TOKENS: &[&str] = &[
    "bot",
    "spider",
    "crawl",
    "slurp",
    "googlebot",
    "bingbot",
    "yandexbot",
    "duckduckbot",
    "baiduspider",
    "facebookexternalhit",
    "ia_archiver",
    "ahrefsbot",
    "semrushbot",
    "mj12bot",
    "petalbot",
    "headlesschrome",
];

/// Empty user-agent is considered a bot (§4.B step 1).
pub fn is_bot(user_agent: Option<&str>) -> bool {
    let Some(ua) = user_agent else {
        return true;
    };
    if ua.trim().is_empty() {
        return true;
    }
    let lower = ua.to_lowercase();
    BOT_TOKENS.iter().any(|token| lower.contains(token))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_ua_is_bot() {
        assert!(is_bot(None));
        assert!(is_bot(Some("")));
        assert!(is_bot(Some("   ")));
    }

    #[test]
    fn known_bot_ua_detected() {
        assert!(is_bot(Some("Googlebot/2.1 (+http://www.google.com/bot.html)")));
        assert!(is_bot(Some("Mozilla/5.0 (compatible; bingbot/2.0)")));
    }

    #[test]
    fn normal_browser_ua_not_bot() {
        assert!(!is_bot(Some("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36")));
    }
}
