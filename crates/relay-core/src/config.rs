use std::{collections::HashSet, env, fs, path::Path, time::Duration};

use crate::{errors::Error, Result};

pub const DEFAULT_WELCOME_TEXT: &str =
    "👋 Welcome! I'm the support assistant. Send your message here and the team will reply.";

/// Typed configuration for the relay.
#[derive(Clone, Debug)]
pub struct Config {
    // Core
    pub telegram_bot_token: String,
    pub admin_ids: HashSet<i64>,
    /// Chat that receives relayed user messages. `None` means relaying is off.
    pub forward_chat_id: Option<i64>,

    // Store
    pub redis_addr: String,
    pub redis_password: Option<String>,
    pub redis_db: i64,
    pub store_timeout: Duration,

    // Behavior
    pub blocked_page_size: usize,
    pub welcome_default_text: String,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));

        let telegram_bot_token = env_str("TELEGRAM_BOT_TOKEN").unwrap_or_default();
        if telegram_bot_token.trim().is_empty() {
            return Err(Error::Config(
                "TELEGRAM_BOT_TOKEN environment variable is required".to_string(),
            ));
        }

        let admin_ids: HashSet<i64> = parse_csv_i64(env_str("ADMIN_IDS")).into_iter().collect();
        if admin_ids.is_empty() {
            tracing::warn!("ADMIN_IDS is not set; no one can use admin commands");
        }

        let forward_chat_id = env_i64("FORWARD_TO_ADMIN_ID").filter(|id| *id != 0);

        let redis_addr = env_str("REDIS_ADDR")
            .and_then(non_empty)
            .unwrap_or_else(|| "127.0.0.1:6379".to_string());
        let redis_password = env_str("REDIS_PASSWORD").and_then(non_empty);
        let redis_db = env_i64("REDIS_DB").unwrap_or(0);
        let store_timeout = Duration::from_millis(env_u64("STORE_TIMEOUT_MS").unwrap_or(5_000));

        let blocked_page_size = env_usize("BLOCKED_PAGE_SIZE").unwrap_or(10).max(1);
        let welcome_default_text = env_str("WELCOME_DEFAULT_TEXT")
            .and_then(non_empty)
            .unwrap_or_else(|| DEFAULT_WELCOME_TEXT.to_string());

        Ok(Self {
            telegram_bot_token,
            admin_ids,
            forward_chat_id,
            redis_addr,
            redis_password,
            redis_db,
            store_timeout,
            blocked_page_size,
            welcome_default_text,
        })
    }
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        env::set_var(key, val);
    }
}

fn env_u64(key: &str) -> Option<u64> {
    env_str(key).and_then(|s| s.trim().parse::<u64>().ok())
}

fn env_i64(key: &str) -> Option<i64> {
    env_str(key).and_then(|s| s.trim().parse::<i64>().ok())
}

fn env_usize(key: &str) -> Option<usize> {
    env_str(key).and_then(|s| s.trim().parse::<usize>().ok())
}

fn parse_csv_i64(v: Option<String>) -> Vec<i64> {
    v.unwrap_or_default()
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse::<i64>().ok())
        .collect()
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
