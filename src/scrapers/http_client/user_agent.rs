//! The `User-Agent` sent by scraper traffic.
//!
//! The setting is free text with two reserved words: `firefox` and `chrome`
//! select a current desktop browser string, since many sites serve reduced
//! pages to unknown agents.

pub const USER_AGENT: &str = concat!("metascrape/", env!("CARGO_PKG_VERSION"));

const FIREFOX: &str = "Mozilla/5.0 (X11; Linux x86_64; rv:133.0) Gecko/20100101 Firefox/133.0";
const CHROME: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

pub fn resolve_user_agent(setting: Option<&str>) -> String {
    let Some(setting) = setting.map(str::trim).filter(|s| !s.is_empty()) else {
        return USER_AGENT.to_string();
    };
    match setting.to_ascii_lowercase().as_str() {
        "firefox" => FIREFOX.to_string(),
        "chrome" => CHROME.to_string(),
        _ => setting.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unset_uses_crate_agent() {
        assert_eq!(resolve_user_agent(None), USER_AGENT);
        assert_eq!(resolve_user_agent(Some("  ")), USER_AGENT);
    }

    #[test]
    fn test_browser_presets() {
        assert!(resolve_user_agent(Some("Firefox")).contains("Gecko/20100101"));
        assert!(resolve_user_agent(Some("chrome")).contains("Chrome/"));
        assert_eq!(resolve_user_agent(Some("MyBot/1.0")), "MyBot/1.0");
    }
}
