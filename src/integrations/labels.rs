//! Label and annotation parsing for discovered services.
//!
//! A container (or ingress) declares one or more apps through
//! semicolon-delimited labels under a provider namespace:
//!
//! ```text
//! flame.type     = "application"
//! flame.name     = "Grafana;Prometheus"
//! flame.url      = "http://grafana.lan;http://prom.lan"
//! flame.category = "Monitoring"
//! flame.order    = "1;2"
//! flame.icon     = "chart-line;custom"
//! ```
//!
//! Lists are zipped by position. A missing name or url falls back to the
//! first element; a missing category, order or icon falls back to the
//! provider default.

use std::collections::HashMap;
use std::sync::LazyLock;

use flame_common::{DEFAULT_INTEGRATION_ORDER, DOCKER_CATEGORY_ID, KUBERNETES_CATEGORY_ID};
use regex::Regex;

pub type Labels = HashMap<String, String>;

static TRAEFIK_V1_RULE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^traefik.*.frontend.rule").unwrap());
static TRAEFIK_V2_RULE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^traefik.*?\.rule").unwrap());
static BACKTICK_HOST: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"`([a-zA-Z0-9.\-]+)`").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    Docker,
    Kubernetes,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Docker => "docker",
            Self::Kubernetes => "kubernetes",
        }
    }

    /// Label key prefix the provider's declarations live under.
    pub fn namespace(&self) -> &'static str {
        match self {
            Self::Docker => "flame.",
            Self::Kubernetes => "flame.pawelmalak/",
        }
    }

    /// Icon given to discovered apps that declare none.
    pub fn sentinel_icon(&self) -> &'static str {
        self.as_str()
    }

    pub fn default_category_id(&self) -> i64 {
        match self {
            Self::Docker => DOCKER_CATEGORY_ID,
            Self::Kubernetes => KUBERNETES_CATEGORY_ID,
        }
    }

    fn label<'a>(&self, labels: &'a Labels, key: &str) -> Option<&'a str> {
        labels
            .get(&format!("{}{}", self.namespace(), key))
            .map(String::as_str)
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One app declared by a container or ingress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    pub name: String,
    pub url: String,
    pub icon: String,
    /// Category name from the labels; `None` means the provider's default category.
    pub category: Option<String>,
    pub order_id: i64,
}

/// Infer `flame.url` from Traefik router rules.
///
/// v1 `Host:a,b` rules become `https://a;https://b`; v2 rules with backtick
/// hosts become `http://host` entries. Labels are visited in key order and
/// the first rule that yields a URL wins.
pub fn traefik_url(labels: &Labels) -> Option<String> {
    let mut keys: Vec<&String> = labels.keys().collect();
    keys.sort();
    for key in keys {
        let value = &labels[key];
        if !value.contains("Host") {
            continue;
        }
        if TRAEFIK_V1_RULE.is_match(key) {
            if let Some((_, hosts)) = value.split_once("Host:") {
                let urls: Vec<String> = hosts
                    .split(',')
                    .map(str::trim)
                    .filter(|h| !h.is_empty())
                    .map(|h| format!("https://{}", h))
                    .collect();
                if !urls.is_empty() {
                    return Some(urls.join(";"));
                }
            }
        } else if TRAEFIK_V2_RULE.is_match(key) {
            let urls: Vec<String> = BACKTICK_HOST
                .captures_iter(value)
                .map(|caps| format!("http://{}", &caps[1]))
                .collect();
            if !urls.is_empty() {
                return Some(urls.join(";"));
            }
        }
    }
    None
}

/// Parse every app declared in one label set.
///
/// Entries without a name, without a url, or whose type does not start with
/// `app` declare nothing. Only Docker falls back to Traefik rules for the url.
pub fn parse_declarations(labels: &Labels, provider: Provider) -> Vec<Declaration> {
    let is_app = provider
        .label(labels, "type")
        .is_some_and(|t| t.starts_with("app"));
    let Some(names) = provider.label(labels, "name") else {
        return Vec::new();
    };
    if !is_app {
        return Vec::new();
    }
    let url = match provider.label(labels, "url") {
        Some(url) => url.to_string(),
        None if provider == Provider::Docker => match traefik_url(labels) {
            Some(url) => url,
            None => return Vec::new(),
        },
        None => return Vec::new(),
    };

    let names: Vec<&str> = names.split(';').collect();
    let urls: Vec<&str> = url.split(';').collect();
    let split = |key: &str| -> Vec<&str> {
        provider
            .label(labels, key)
            .map(|v| v.split(';').collect())
            .unwrap_or_default()
    };
    let categories = split("category");
    let orders = split("order");
    let icons = split("icon");

    let at = |list: &[&str], i: usize| -> Option<String> {
        list.get(i)
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    (0..names.len())
        .filter_map(|i| {
            let name = at(&names, i).or_else(|| at(&names, 0))?;
            let url = at(&urls, i).or_else(|| at(&urls, 0))?;
            Some(Declaration {
                name,
                url,
                icon: at(&icons, i).unwrap_or_else(|| provider.sentinel_icon().to_string()),
                category: at(&categories, i),
                order_id: at(&orders, i)
                    .and_then(|o| o.parse().ok())
                    .unwrap_or(DEFAULT_INTEGRATION_ORDER),
            })
        })
        .collect()
}
