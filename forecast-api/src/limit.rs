//! Fixed-window request limiting per client address.

use std::{
    collections::HashMap,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    sync::{Arc, Mutex, PoisonError},
    time::{Duration, Instant},
};

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header::RETRY_AFTER},
    middleware::Next,
    response::{IntoResponse, Response},
};
use forecast_core::RateLimitConfig;

pub const LIMITED_MESSAGE: &str = "Too many requests, please try again later";

/// Outcome of counting one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed { remaining: u32, reset: Duration },
    Limited { reset: Duration },
}

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    hits: u32,
}

#[derive(Debug)]
struct Clients {
    windows: HashMap<IpAddr, Window>,
    last_sweep: Instant,
}

#[derive(Debug)]
pub struct RateLimiter {
    window: Duration,
    max_requests: u32,
    clients: Mutex<Clients>,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            window: config.window(),
            max_requests: config.max_requests,
            clients: Mutex::new(Clients { windows: HashMap::new(), last_sweep: Instant::now() }),
        }
    }

    /// Count one request from `client` at `now`.
    pub fn check(&self, client: IpAddr, now: Instant) -> Decision {
        let mut clients = self.clients.lock().unwrap_or_else(PoisonError::into_inner);

        // Forget clients whose window ran out, at most once per window.
        if now.duration_since(clients.last_sweep) >= self.window {
            clients.windows.retain(|_, w| now.duration_since(w.started) < self.window);
            clients.last_sweep = now;
        }

        let window = clients.windows.entry(client).or_insert(Window { started: now, hits: 0 });
        if now.duration_since(window.started) >= self.window {
            *window = Window { started: now, hits: 0 };
        }

        let reset = self.window.saturating_sub(now.duration_since(window.started));
        if window.hits >= self.max_requests {
            return Decision::Limited { reset };
        }

        window.hits += 1;
        Decision::Allowed { remaining: self.max_requests - window.hits, reset }
    }
}

/// Middleware rejecting clients over budget with 429. Every response carries
/// the `RateLimit-*` headers.
pub async fn limit_requests(
    State(limiter): State<Arc<RateLimiter>>,
    req: Request,
    next: Next,
) -> Response {
    let client = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED), |info| info.0.ip());

    match limiter.check(client, Instant::now()) {
        Decision::Allowed { remaining, reset } => {
            let mut res = next.run(req).await;
            set_headers(res.headers_mut(), limiter.max_requests, remaining, reset);
            res
        }
        Decision::Limited { reset } => {
            tracing::warn!(%client, "rate limit exceeded");
            let mut res = (StatusCode::TOO_MANY_REQUESTS, LIMITED_MESSAGE).into_response();
            set_headers(res.headers_mut(), limiter.max_requests, 0, reset);
            res.headers_mut().insert(RETRY_AFTER, HeaderValue::from(whole_secs(reset)));
            res
        }
    }
}

fn set_headers(headers: &mut HeaderMap, limit: u32, remaining: u32, reset: Duration) {
    headers.insert(HeaderName::from_static("ratelimit-limit"), HeaderValue::from(limit));
    headers.insert(HeaderName::from_static("ratelimit-remaining"), HeaderValue::from(remaining));
    headers.insert(HeaderName::from_static("ratelimit-reset"), HeaderValue::from(whole_secs(reset)));
}

/// Seconds, rounded up.
fn whole_secs(d: Duration) -> u64 {
    d.as_secs() + u64::from(d.subsec_nanos() > 0)
}
