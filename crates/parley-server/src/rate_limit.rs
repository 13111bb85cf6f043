//! Per-IP token bucket applied to every HTTP request, websocket upgrades
//! included. Frames on an established connection are not rate limited.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{ConnectInfo, State},
    http::{Request, StatusCode},
    middleware::Next,
    response::Response,
};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::ServerConfig;

#[derive(Debug, Clone)]
struct Bucket {
    tokens: f64,
    refilled_at: Instant,
}

impl Bucket {
    fn full(burst: f64) -> Self {
        Self {
            tokens: burst,
            refilled_at: Instant::now(),
        }
    }

    fn take(&mut self, per_sec: f64, burst: f64) -> bool {
        let now = Instant::now();
        let elapsed = now.duration_since(self.refilled_at).as_secs_f64();
        self.refilled_at = now;
        self.tokens = (self.tokens + elapsed * per_sec).min(burst);

        if self.tokens < 1.0 {
            return false;
        }
        self.tokens -= 1.0;
        true
    }
}

#[derive(Clone)]
pub struct RateLimiter {
    buckets: Arc<Mutex<HashMap<IpAddr, Bucket>>>,
    per_sec: f64,
    burst: f64,
}

impl RateLimiter {
    pub fn new(per_sec: f64, burst: f64) -> Self {
        Self {
            buckets: Arc::new(Mutex::new(HashMap::new())),
            per_sec,
            burst,
        }
    }

    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new(config.rate_limit_per_sec, config.rate_limit_burst)
    }

    /// Spend one token for `ip`. Returns false when the bucket is empty.
    pub async fn check(&self, ip: IpAddr) -> bool {
        let mut buckets = self.buckets.lock().await;
        buckets
            .entry(ip)
            .or_insert_with(|| Bucket::full(self.burst))
            .take(self.per_sec, self.burst)
    }

    /// Forget buckets untouched for longer than `max_idle`.
    pub async fn purge_stale(&self, max_idle: Duration) -> usize {
        let mut buckets = self.buckets.lock().await;
        let before = buckets.len();
        let now = Instant::now();
        buckets.retain(|_, bucket| now.duration_since(bucket.refilled_at) < max_idle);
        before - buckets.len()
    }

    /// Run [`RateLimiter::purge_stale`] every `every` in the background.
    pub fn spawn_purge_task(&self, every: Duration, max_idle: Duration) -> JoinHandle<()> {
        let limiter = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                let purged = limiter.purge_stale(max_idle).await;
                if purged > 0 {
                    debug!(purged, "Purged idle rate limit buckets");
                }
            }
        })
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::from_config(&ServerConfig::default())
    }
}

pub async fn rate_limit_middleware(
    State(limiter): State<RateLimiter>,
    req: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    if let Some(ip) = client_ip(&req) {
        if !limiter.check(ip).await {
            warn!(ip = %ip, path = %req.uri().path(), "Rate limit exceeded");
            return Err(StatusCode::TOO_MANY_REQUESTS);
        }
    }

    Ok(next.run(req).await)
}

/// Peer address first, then `X-Forwarded-For`, then `X-Real-IP`.
fn client_ip<B>(req: &Request<B>) -> Option<IpAddr> {
    if let Some(ConnectInfo(addr)) = req.extensions().get::<ConnectInfo<SocketAddr>>() {
        return Some(addr.ip());
    }

    let header = |name: &str| req.headers().get(name).and_then(|v| v.to_str().ok());

    header("x-forwarded-for")
        .and_then(|v| v.split(',').next())
        .and_then(|first| first.trim().parse().ok())
        .or_else(|| header("x-real-ip").and_then(|v| v.trim().parse().ok()))
}
