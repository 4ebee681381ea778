//! User-agent classification
//!
//! Maps a raw `User-Agent` header to a browser label and an OS label using
//! ordered substring tables. The first rule with a matching token wins, so
//! the order of each table is part of its meaning: Chrome user agents carry
//! a `Safari` token and Android ones carry `Linux`.

/// Label used whenever no rule matches or the header is missing
pub const UNKNOWN: &str = "Unknown";

/// A single classification rule: the label applies when any token occurs
/// in the user agent.
#[derive(Debug, Clone, Copy)]
pub struct Rule {
    pub label: &'static str,
    pub tokens: &'static [&'static str],
}

impl Rule {
    fn matches(&self, user_agent: &str) -> bool {
        self.tokens.iter().any(|token| user_agent.contains(token))
    }
}

pub const BROWSER_RULES: &[Rule] = &[
    Rule { label: "Firefox", tokens: &["Firefox"] },
    Rule { label: "Chrome", tokens: &["Chrome"] },
    Rule { label: "Safari", tokens: &["Safari"] },
    Rule { label: "Edge", tokens: &["Edge"] },
    Rule { label: "Internet Explorer", tokens: &["MSIE", "Trident"] },
];

pub const OS_RULES: &[Rule] = &[
    Rule { label: "Windows", tokens: &["Windows"] },
    Rule { label: "MacOS", tokens: &["Mac"] },
    Rule { label: "Linux", tokens: &["Linux"] },
    Rule { label: "Android", tokens: &["Android"] },
    Rule { label: "iOS", tokens: &["iPhone", "iPad"] },
];

/// Classification result for one user agent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Client {
    pub browser: &'static str,
    pub os: &'static str,
}

/// Evaluate `rules` top-down and return the first matching label
pub fn first_match(rules: &[Rule], user_agent: &str) -> &'static str {
    rules
        .iter()
        .find(|rule| rule.matches(user_agent))
        .map(|rule| rule.label)
        .unwrap_or(UNKNOWN)
}

/// Classify a user agent. Total and deterministic.
pub fn classify(user_agent: Option<&str>) -> Client {
    let user_agent = user_agent.unwrap_or_default();
    Client {
        browser: first_match(BROWSER_RULES, user_agent),
        os: first_match(OS_RULES, user_agent),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHROME_ANDROID: &str = "Mozilla/5.0 (Linux; Android 13; Pixel 7) AppleWebKit/537.36 \
        (KHTML, like Gecko) Chrome/120.0.0.0 Mobile Safari/537.36";
    const SAFARI_IPHONE: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) \
        AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Mobile/15E148 Safari/604.1";
    const FIREFOX_WINDOWS: &str =
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0";
    const IE11: &str = "Mozilla/5.0 (Windows NT 10.0; Trident/7.0; rv:11.0) like Gecko";

    #[test]
    fn chrome_wins_over_safari_token() {
        let client = classify(Some(CHROME_ANDROID));
        assert_eq!(client.browser, "Chrome");
        // Linux precedes Android in the table
        assert_eq!(client.os, "Linux");
    }

    #[test]
    fn iphone_matches_mac_token_first() {
        let client = classify(Some(SAFARI_IPHONE));
        assert_eq!(client.browser, "Safari");
        assert_eq!(client.os, "MacOS");
    }

    #[test]
    fn bare_device_tokens() {
        assert_eq!(classify(Some("iPad")).os, "iOS");
        assert_eq!(classify(Some("Android")).os, "Android");
        assert_eq!(classify(Some("Edge/91.0.864.59")).browser, "Edge");
    }

    #[test]
    fn desktop_browsers() {
        assert_eq!(
            classify(Some(FIREFOX_WINDOWS)),
            Client { browser: "Firefox", os: "Windows" }
        );
        assert_eq!(
            classify(Some(IE11)),
            Client { browser: "Internet Explorer", os: "Windows" }
        );
        assert_eq!(classify(Some("Mozilla/4.0 (compatible; MSIE 8.0)")).browser, "Internet Explorer");
    }

    #[test]
    fn unmatched_and_missing_are_unknown() {
        let unknown = Client { browser: UNKNOWN, os: UNKNOWN };
        assert_eq!(classify(None), unknown);
        assert_eq!(classify(Some("")), unknown);
        assert_eq!(classify(Some("curl/8.4.0")), unknown);
    }

    #[test]
    fn matching_is_case_sensitive() {
        assert_eq!(classify(Some("firefox windows")).browser, UNKNOWN);
    }

    #[test]
    fn deterministic() {
        for ua in [CHROME_ANDROID, SAFARI_IPHONE, FIREFOX_WINDOWS, IE11, "x"] {
            assert_eq!(classify(Some(ua)), classify(Some(ua)));
        }
    }
}
