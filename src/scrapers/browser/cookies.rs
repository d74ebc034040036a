//! Driver cookie injection for browser sessions.

use crate::scrapers::definition::{CookieEntry, CookieSet};

/// A cookie ready to hand to the browser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowserCookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
}

fn host_of(url: &str) -> Option<String> {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
}

impl BrowserCookie {
    /// Domain defaults to the cookie URL's host, path to `/`.
    fn from_entry(set: &CookieSet, entry: &CookieEntry) -> Option<Self> {
        if entry.name.is_empty() {
            return None;
        }
        let domain = entry
            .domain
            .clone()
            .filter(|d| !d.is_empty())
            .or_else(|| host_of(&set.cookie_url))?;

        Some(Self {
            name: entry.name.clone(),
            value: entry.value.clone(),
            domain,
            path: entry
                .path
                .clone()
                .filter(|p| !p.is_empty())
                .unwrap_or_else(|| "/".to_string()),
        })
    }
}

/// Flatten cookie sets, skipping unnamed cookies and ones with no domain.
pub fn browser_cookies(sets: &[CookieSet]) -> Vec<BrowserCookie> {
    sets.iter()
        .flat_map(|set| set.cookies.iter().map(move |entry| (set, entry)))
        .filter_map(|(set, entry)| {
            let cookie = BrowserCookie::from_entry(set, entry);
            if cookie.is_none() {
                tracing::warn!("Skipping cookie '{}' for {}", entry.name, set.cookie_url);
            }
            cookie
        })
        .collect()
}

#[cfg(feature = "browser")]
pub(crate) async fn inject_cookies(page: &chromiumoxide::Page, cookies: &[BrowserCookie]) {
    use chromiumoxide::cdp::browser_protocol::network::CookieParam;

    for cookie in cookies {
        let param = CookieParam::builder()
            .name(cookie.name.as_str())
            .value(cookie.value.as_str())
            .domain(cookie.domain.as_str())
            .path(cookie.path.as_str())
            .build();

        match param {
            Ok(param) => {
                if let Err(e) = page.set_cookie(param).await {
                    tracing::warn!("Failed to set cookie {}: {}", cookie.name, e);
                }
            }
            Err(e) => {
                tracing::warn!("Failed to build cookie {}: {}", cookie.name, e);
            }
        }
    }
}
