//! Search bar parsing: prefix-routed providers, URL detection and the Enter-key
//! redirect decision.

use std::sync::LazyLock;

use regex::Regex;

use crate::models::SearchQuery;

/// Prefix that selects the local app/bookmark filter instead of a web search.
pub const LOCAL_PREFIX: &str = "l";

static PREFIX_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^/([a-z]+) (.+)$").unwrap());

static URL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(https?://)?(([a-z\d]([a-z\d-]*[a-z\d])?\.)+[a-z]{2,}|localhost|(\d{1,3}\.){3}\d{1,3})(:\d+)?(/[-a-z\d%_.~+@]*)*(\?[;&a-z\d%_.~+=-]*)?(#[-a-z\d_]*)?$",
    )
    .unwrap()
});

static SCHEME_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^https?://").unwrap());

/// Providers available without any configuration.
pub fn builtin_queries() -> Vec<SearchQuery> {
    [
        ("Disroot", "ds", "https://search.disroot.org/?q="),
        ("DuckDuckGo", "d", "https://duckduckgo.com/?q="),
        ("Google", "g", "https://www.google.com/search?q="),
        ("IMDb", "im", "https://www.imdb.com/find?q="),
        ("Reddit", "r", "https://www.reddit.com/search?q="),
        ("Spotify", "sp", "https://open.spotify.com/search/"),
        ("The Movie Database", "mv", "https://www.themoviedb.org/search?query="),
        ("YouTube", "yt", "https://www.youtube.com/results?search_query="),
        ("Local search", LOCAL_PREFIX, ""),
    ]
    .into_iter()
    .map(|(name, prefix, template)| SearchQuery {
        name: name.to_string(),
        prefix: prefix.to_string(),
        template: template.to_string(),
    })
    .collect()
}

/// The slice of settings the search bar reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchSettings {
    pub default_provider: String,
    pub secondary_provider: String,
    pub same_tab: bool,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            default_provider: LOCAL_PREFIX.to_string(),
            secondary_provider: "d".to_string(),
            same_tab: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedSearch {
    pub is_local: bool,
    pub is_url: bool,
    pub same_tab: bool,
    /// Query text after the prefix, percent-encoded.
    pub encoded_query: String,
    /// Query text after the prefix, as typed.
    pub raw_query: String,
    pub primary: Option<SearchQuery>,
    pub secondary: Option<SearchQuery>,
}

pub fn parse(input: &str, settings: &SearchSettings, custom: &[SearchQuery]) -> ParsedSearch {
    let providers: Vec<SearchQuery> = builtin_queries()
        .into_iter()
        .chain(custom.iter().cloned())
        .collect();
    let find = |prefix: &str| providers.iter().find(|q| q.prefix == prefix).cloned();

    let (prefix, raw_query) = match PREFIX_REGEX.captures(input) {
        Some(caps) => (caps[1].to_string(), caps[2].to_string()),
        None => (settings.default_provider.clone(), input.to_string()),
    };

    let primary = find(&prefix);
    ParsedSearch {
        is_local: primary.is_some() && prefix == LOCAL_PREFIX,
        is_url: URL_REGEX.is_match(input.trim()),
        same_tab: settings.same_tab,
        encoded_query: encode_component(&raw_query),
        raw_query,
        primary,
        secondary: find(&settings.secondary_provider),
    }
}

/// Split a URL into the text shown on a card and the URL to open.
/// Inputs without a scheme are opened over plain http.
pub fn url_parser(input: &str) -> (String, String) {
    let (display, full) = if SCHEME_REGEX.is_match(input) {
        let display = input.split_once("://").map(|(_, rest)| rest).unwrap_or(input);
        (display.to_string(), input.to_string())
    } else {
        (input.to_string(), format!("http://{}", input))
    };
    let display = display.strip_suffix('/').unwrap_or(&display).to_string();
    (display, full)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchAction {
    Notify(String),
    Redirect { url: String, same_tab: bool },
    Nothing,
}

/// What pressing Enter does for `input`.
///
/// `first_app` and `first_bookmark` are the URLs of the first local results,
/// if the local filter produced any.
pub fn resolve(
    input: &str,
    parsed: &ParsedSearch,
    first_app: Option<&str>,
    first_bookmark: Option<&str>,
) -> SearchAction {
    let Some(primary) = &parsed.primary else {
        return SearchAction::Notify("Prefix not found".to_string());
    };
    let same_tab = parsed.same_tab;

    if parsed.is_url {
        return SearchAction::Redirect {
            url: url_parser(input.trim()).1,
            same_tab,
        };
    }

    if parsed.is_local {
        if let Some(url) = first_app.or(first_bookmark) {
            return SearchAction::Redirect {
                url: url.to_string(),
                same_tab,
            };
        }
        if parsed.raw_query.trim_start_matches(' ').is_empty() {
            return SearchAction::Nothing;
        }
        let template = if primary.prefix == LOCAL_PREFIX {
            parsed.secondary.as_ref().map(|q| q.template.as_str())
        } else {
            Some(primary.template.as_str())
        };
        return match template {
            Some(template) => SearchAction::Redirect {
                url: format!("{}{}", template, parsed.encoded_query),
                same_tab,
            },
            None => SearchAction::Notify("Prefix not found".to_string()),
        };
    }

    SearchAction::Redirect {
        url: format!("{}{}", primary.template, parsed.encoded_query),
        same_tab,
    }
}

/// Percent-encode a query for appending to a provider template. Spaces
/// become `%20`; a literal `+` is already `%2B` at this point.
fn encode_component(raw: &str) -> String {
    url::form_urlencoded::byte_serialize(raw.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}
