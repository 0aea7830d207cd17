//! Redis adapter for the relay's `KvStore` port.
//!
//! One multiplexed connection is shared by every caller; each command runs
//! under the configured deadline.

use std::{future::Future, time::Duration};

use async_trait::async_trait;
use redis::{
    aio::MultiplexedConnection, AsyncCommands, ConnectionAddr, ConnectionInfo,
    RedisConnectionInfo,
};

use relay_core::{config::Config, errors::Error, store::KvStore, Result};

#[derive(Clone)]
pub struct RedisStore {
    conn: MultiplexedConnection,
    timeout: Duration,
}

const DEFAULT_PORT: u16 = 6379;

/// `host[:port]`, with IPv6 hosts in brackets.
fn split_addr(addr: &str) -> Result<(String, u16)> {
    let addr = addr.trim();
    // A bare IPv6 literal has colons but no port.
    let has_port = |host: &str| host.ends_with(']') || !host.contains(':');
    let (host, port) = match addr.rsplit_once(':') {
        Some((host, port)) if has_port(host) => {
            let port = port
                .parse::<u16>()
                .map_err(|_| Error::Config(format!("invalid redis port in {addr}")))?;
            (host, port)
        }
        _ => (addr, DEFAULT_PORT),
    };
    let host = host.trim_start_matches('[').trim_end_matches(']');
    if host.is_empty() {
        return Err(Error::Config(format!("invalid redis address {addr}")));
    }
    Ok((host.to_string(), port))
}

/// The password is carried as a field, never spliced into a URL, so any byte
/// sequence is accepted.
fn connection_info(addr: &str, password: Option<&str>, db: i64) -> Result<ConnectionInfo> {
    let (host, port) = split_addr(addr)?;
    Ok(ConnectionInfo {
        addr: ConnectionAddr::Tcp(host, port),
        redis: RedisConnectionInfo {
            db,
            password: password.filter(|p| !p.is_empty()).map(str::to_string),
            ..Default::default()
        },
    })
}

fn store_err(e: redis::RedisError) -> Error {
    Error::Store(e.to_string())
}

impl RedisStore {
    /// Connects and verifies the server answers PING. Any failure here is fatal
    /// for the caller.
    pub async fn connect(cfg: &Config) -> Result<Self> {
        let info = connection_info(&cfg.redis_addr, cfg.redis_password.as_deref(), cfg.redis_db)?;
        let client = redis::Client::open(info)
            .map_err(|e| Error::Config(format!("invalid redis settings: {e}")))?;

        let conn = tokio::time::timeout(cfg.store_timeout, client.get_multiplexed_tokio_connection())
            .await
            .map_err(|_| Error::Store(format!("redis connect to {} timed out", cfg.redis_addr)))?
            .map_err(store_err)?;

        let store = Self {
            conn,
            timeout: cfg.store_timeout,
        };

        let mut conn = store.conn.clone();
        let pong: String = store
            .deadline(async move { redis::cmd("PING").query_async(&mut conn).await })
            .await?;
        tracing::info!(addr = %cfg.redis_addr, db = cfg.redis_db, reply = %pong, "connected to redis");

        Ok(store)
    }

    async fn deadline<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = redis::RedisResult<T>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(res) => res.map_err(store_err),
            Err(_) => Err(Error::Store(format!(
                "redis call exceeded {}ms",
                self.timeout.as_millis()
            ))),
        }
    }
}

#[async_trait]
impl KvStore for RedisStore {
    async fn add_member(&self, set_key: &str, member: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        self.deadline(conn.sadd::<_, _, ()>(set_key, member)).await
    }

    async fn remove_member(&self, set_key: &str, member: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        self.deadline(conn.srem::<_, _, ()>(set_key, member)).await
    }

    async fn is_member(&self, set_key: &str, member: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        self.deadline(conn.sismember(set_key, member)).await
    }

    async fn members(&self, set_key: &str) -> Result<Vec<String>> {
        let mut conn = self.conn.clone();
        self.deadline(conn.smembers(set_key)).await
    }

    async fn set_string(&self, key: &str, value: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        self.deadline(conn.set::<_, _, ()>(key, value)).await
    }

    async fn get_string(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        self.deadline(conn.get(key)).await
    }

    async fn set_hash_fields(&self, key: &str, fields: &[(&str, &str)]) -> Result<()> {
        if fields.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.clone();
        self.deadline(conn.hset_multiple::<_, _, _, ()>(key, fields))
            .await
    }

    async fn get_hash_fields(&self, key: &str, fields: &[&str]) -> Result<Vec<Option<String>>> {
        if fields.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.conn.clone();
        // HMGET keeps the reply aligned with the requested fields, nil where absent.
        self.deadline(async move {
            redis::cmd("HMGET")
                .arg(key)
                .arg(fields)
                .query_async(&mut conn)
                .await
        })
        .await
    }
}
