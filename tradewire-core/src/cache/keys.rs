//! Cache key namespaces and lifetimes for backend payloads.
//!
//! Composite keys join a namespace and a parameter with `_`, so a whole
//! namespace can be swept with [`TtlCache::invalidate_prefix`](super::TtlCache::invalidate_prefix)
//! using the namespace plus the separator.

use std::time::Duration;

pub const SEPARATOR: char = '_';

pub const MARKET_OVERVIEW: &str = "market_overview";
pub const DAILY_PICKS: &str = "daily_picks";
pub const SCREENER: &str = "screener";
pub const QUOTE: &str = "quote";
pub const SIGNALS: &str = "signals";
pub const NEWS: &str = "news";
pub const PORTFOLIO: &str = "portfolio";
pub const IPO_LIST: &str = "ipo_list";
pub const IPO_STATS: &str = "ipo_stats";
pub const ALERTS: &str = "alerts";
pub const BACKTEST: &str = "backtest";
pub const INDICATOR: &str = "indicator";
pub const CHAT_ROOMS: &str = "chat_rooms";
pub const PERFORMANCE: &str = "performance";

pub const TTL_MARKET_OVERVIEW: Duration = Duration::from_secs(60);
pub const TTL_DAILY_PICKS: Duration = Duration::from_secs(300);
pub const TTL_SCREENER: Duration = Duration::from_secs(180);
pub const TTL_QUOTE: Duration = Duration::from_secs(30);
pub const TTL_SIGNALS: Duration = Duration::from_secs(120);
pub const TTL_NEWS: Duration = Duration::from_secs(600);
pub const TTL_PORTFOLIO: Duration = Duration::from_secs(60);
pub const TTL_IPO: Duration = Duration::from_secs(300);
pub const TTL_ALERTS: Duration = Duration::from_secs(120);
pub const TTL_BACKTEST: Duration = Duration::from_secs(600);
pub const TTL_INDICATORS: Duration = Duration::from_secs(120);
pub const TTL_CHAT_ROOMS: Duration = Duration::from_secs(60);
pub const TTL_PERFORMANCE: Duration = Duration::from_secs(300);

/// Join a namespace and parameters: `compose("indicator", &["rsi", "AAPL"])`
/// yields `indicator_rsi_AAPL`.
pub fn compose(namespace: &str, parts: &[&str]) -> String {
    let extra: usize = parts.iter().map(|p| p.len() + 1).sum();
    let mut key = String::with_capacity(namespace.len() + extra);
    key.push_str(namespace);
    for part in parts {
        key.push(SEPARATOR);
        key.push_str(part);
    }
    key
}

/// Prefix matching every composite key in `namespace`.
pub fn prefix(namespace: &str) -> String {
    format!("{}{}", namespace, SEPARATOR)
}

pub fn quote(symbol: &str) -> String {
    compose(QUOTE, &[symbol])
}

pub fn signals(symbol: &str) -> String {
    compose(SIGNALS, &[symbol])
}

pub fn news(category: &str) -> String {
    compose(NEWS, &[category])
}

pub fn indicator(kind: &str, symbol: &str) -> String {
    compose(INDICATOR, &[kind, symbol])
}

pub fn daily_picks(strategy: &str) -> String {
    compose(DAILY_PICKS, &[strategy])
}
