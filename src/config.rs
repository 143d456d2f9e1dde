use std::env;
use std::str::FromStr;

/// Runtime settings shared by every handler. Built once at startup and
/// handed to the pipeline through `AppState`.
#[derive(Debug, Clone)]
pub struct Config {
    pub nft_transfers_url: String,
    pub ft_transfers_url: String,
    pub reputation_url: String,
    pub default_limit: u32,
    pub default_skip: u64,
    /// Upper bound on upstream pages fetched for one request
    pub max_pages: usize,
    /// Fail the request when the bulk reputation lookup fails
    pub reputation_required: bool,
    /// Single-token reputation lookups allowed per request
    pub fallback_lookup_limit: usize,
    pub ft_default_wallet: String,
    pub ft_default_symbol: String,
    pub server_host: String,
    pub server_port: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            nft_transfers_url: "https://dialog-tbot.com/history/nft-transfers/".to_string(),
            ft_transfers_url: "https://dialog-tbot.com/history/ft-transfers/".to_string(),
            reputation_url: "https://dialog-tbot.com/reputation/".to_string(),
            default_limit: 200,
            default_skip: 0,
            max_pages: 500,
            reputation_required: false,
            fallback_lookup_limit: 50,
            ft_default_wallet: "oao_north.near".to_string(),
            ft_default_symbol: "GRECHA".to_string(),
            server_host: "0.0.0.0".to_string(),
            server_port: "8081".to_string(),
        }
    }
}

impl Config {
    /// Reads overrides from the process environment on top of the defaults
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            nft_transfers_url: env::var("NFT_TRANSFERS_URL").unwrap_or(defaults.nft_transfers_url),
            ft_transfers_url: env::var("FT_TRANSFERS_URL").unwrap_or(defaults.ft_transfers_url),
            reputation_url: env::var("REPUTATION_URL").unwrap_or(defaults.reputation_url),
            default_limit: parse_var("DEFAULT_LIMIT", defaults.default_limit),
            default_skip: parse_var("DEFAULT_SKIP", defaults.default_skip),
            max_pages: parse_var("MAX_PAGES", defaults.max_pages),
            reputation_required: parse_var("REPUTATION_REQUIRED", defaults.reputation_required),
            fallback_lookup_limit: parse_var("FALLBACK_LOOKUP_LIMIT", defaults.fallback_lookup_limit),
            ft_default_wallet: env::var("FT_DEFAULT_WALLET").unwrap_or(defaults.ft_default_wallet),
            ft_default_symbol: env::var("FT_DEFAULT_SYMBOL").unwrap_or(defaults.ft_default_symbol),
            server_host: env::var("SERVER_HOST").unwrap_or(defaults.server_host),
            server_port: env::var("SERVER_PORT").unwrap_or(defaults.server_port),
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}

fn parse_var<T: FromStr + Copy + std::fmt::Debug>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!("Ignoring invalid {}={:?}, using {:?}", key, raw, default);
            default
        }),
        Err(_) => default,
    }
}
