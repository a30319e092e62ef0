//! Resilience proxy — the only component that talks to the public internet.
//!
//! Caches responses (5 minute TTL), retries failed upstream calls up to
//! 3 attempts, keeps a bounded error log and running request counters,
//! and reports exhausted failures as sentinel-prefixed strings rather
//! than panics so callers can distinguish "proxy degraded" from "provider
//! returned valid empty data".

use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Mutex;
use std::time::Duration;

/// Fixed marker prefixing every degraded-proxy response. Callers must
/// treat any payload starting with this as a failure regardless of
/// transport-level status.
pub const SENTINEL: &str = "PROXY_ERR:";

/// Cache entries older than this are inert (served fresh instead).
pub const CACHE_TTL_MS: i64 = 5 * 60 * 1000;

const MAX_ATTEMPTS: u32 = 3;
const ERROR_LOG_CAPACITY: usize = 100;
const ERROR_LOG_MAX_AGE_MS: i64 = 24 * 3600 * 1000;
const CONSECUTIVE_ERROR_RESET: u32 = 10;

/// True iff `payload` is a sentinel error rather than upstream data.
pub fn is_sentinel(payload: &str) -> bool {
    payload.starts_with(SENTINEL)
}

/// HTTP method of an outbound call. Part of the cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Get => write!(f, "GET"),
            Self::Post => write!(f, "POST"),
        }
    }
}

/// Upstream transport seam. Production uses ureq; tests stub this.
/// `auth` is an Authorization header value, attached when present.
pub trait Transport: Send + Sync {
    fn get(&self, url: &str, auth: Option<&str>) -> Result<String, String>;
    fn post(&self, url: &str, body: &str, auth: Option<&str>) -> Result<String, String>;
}

/// Blocking ureq transport with a fixed User-Agent and per-call timeout.
pub struct UreqTransport;

const USER_AGENT: &str = "HalalCompass/0.3 (halal-place-finder)";
const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(12);

/// Host the stored third-party credential is attached to. The credential
/// never goes anywhere else and never appears in responses.
const PLACE_INDEX_HOST: &str = "api.foursquare.com";

impl Transport for UreqTransport {
    fn get(&self, url: &str, auth: Option<&str>) -> Result<String, String> {
        let mut req = ureq::get(url)
            .set("User-Agent", USER_AGENT)
            .timeout(UPSTREAM_TIMEOUT);
        if let Some(token) = auth {
            req = req.set("Authorization", token);
        }
        req.call()
            .map_err(|e| e.to_string())?
            .into_string()
            .map_err(|e| e.to_string())
    }

    fn post(&self, url: &str, body: &str, auth: Option<&str>) -> Result<String, String> {
        let mut req = ureq::post(url)
            .set("User-Agent", USER_AGENT)
            .timeout(UPSTREAM_TIMEOUT);
        if let Some(token) = auth {
            req = req.set("Authorization", token);
        }
        req.send_string(body)
            .map_err(|e| e.to_string())?
            .into_string()
            .map_err(|e| e.to_string())
    }
}

/// One cached upstream response.
#[derive(Debug, Clone, Serialize)]
pub struct CacheEntry {
    pub payload: String,
    pub stored_at: i64,
}

/// One failed upstream attempt.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorLogEntry {
    pub timestamp: i64,
    pub message: String,
}

/// Running counters for the lifetime of the proxy.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct RequestStats {
    pub total: u64,
    pub succeeded: u64,
    pub failed: u64,
}

struct ProxyInner {
    cache: HashMap<String, CacheEntry>,
    error_log: VecDeque<ErrorLogEntry>,
    stats: RequestStats,
    consecutive_errors: u32,
    credential: Option<String>,
}

/// The caching/retrying outbound HTTP proxy. All mutable state sits
/// behind one mutex so provider fan-out threads and server handlers can
/// share a reference.
pub struct ResilienceProxy {
    inner: Mutex<ProxyInner>,
    transport: Box<dyn Transport>,
    clock: Box<dyn Fn() -> i64 + Send + Sync>,
}

impl ResilienceProxy {
    pub fn new(transport: Box<dyn Transport>) -> Self {
        Self::with_clock(transport, Box::new(|| chrono::Utc::now().timestamp_millis()))
    }

    /// Build with a custom clock (for TTL tests).
    pub fn with_clock(
        transport: Box<dyn Transport>,
        clock: Box<dyn Fn() -> i64 + Send + Sync>,
    ) -> Self {
        Self {
            inner: Mutex::new(ProxyInner {
                cache: HashMap::new(),
                error_log: VecDeque::new(),
                stats: RequestStats::default(),
                consecutive_errors: 0,
                credential: None,
            }),
            transport,
            clock,
        }
    }

    fn cache_key(method: Method, url: &str, body: Option<&str>) -> String {
        match body {
            Some(b) => format!("{} {} {}", method, url, b),
            None => format!("{} {}", method, url),
        }
    }

    /// Cache-first upstream call with bounded retry. On exhaustion the
    /// `Err` string carries the [`SENTINEL`] prefix; this method never
    /// panics on upstream failure.
    pub fn call(&self, method: Method, url: &str, body: Option<&str>) -> Result<String, String> {
        let key = Self::cache_key(method, url, body);
        let now = (self.clock)();

        {
            let inner = self.inner.lock().unwrap();
            if let Some(entry) = inner.cache.get(&key) {
                if now - entry.stored_at < CACHE_TTL_MS {
                    return Ok(entry.payload.clone());
                }
                // Expired entries are inert until overwritten.
            }
        }

        {
            let mut inner = self.inner.lock().unwrap();
            inner.stats.total += 1;
        }

        let auth = if url.contains(PLACE_INDEX_HOST) {
            self.inner.lock().unwrap().credential.clone()
        } else {
            None
        };

        let mut last_error = String::new();
        for attempt in 1..=MAX_ATTEMPTS {
            let result = match method {
                Method::Get => self.transport.get(url, auth.as_deref()),
                Method::Post => self.transport.post(url, body.unwrap_or(""), auth.as_deref()),
            };

            match result {
                Ok(payload) => {
                    let mut inner = self.inner.lock().unwrap();
                    inner.stats.succeeded += 1;
                    inner.consecutive_errors = 0;
                    inner.cache.insert(
                        key,
                        CacheEntry {
                            payload: payload.clone(),
                            stored_at: (self.clock)(),
                        },
                    );
                    return Ok(payload);
                }
                Err(e) => {
                    last_error = e;
                    self.record_failure(method, url, attempt, &last_error);
                }
            }
        }

        {
            let mut inner = self.inner.lock().unwrap();
            inner.stats.failed += 1;
        }
        Err(format!(
            "{} {} {} failed after {} attempts: {}",
            SENTINEL, method, url, MAX_ATTEMPTS, last_error
        ))
    }

    /// Proxy boundary: GET returning either the upstream body or a
    /// sentinel-prefixed error string.
    pub fn proxy_get(&self, url: &str) -> String {
        self.call(Method::Get, url, None).unwrap_or_else(|e| e)
    }

    /// Proxy boundary: POST returning either the upstream body or a
    /// sentinel-prefixed error string.
    pub fn proxy_post(&self, url: &str, body: &str) -> String {
        self.call(Method::Post, url, Some(body)).unwrap_or_else(|e| e)
    }

    fn record_failure(&self, method: Method, url: &str, attempt: u32, error: &str) {
        let now = (self.clock)();
        let mut inner = self.inner.lock().unwrap();

        inner.consecutive_errors += 1;
        if inner.consecutive_errors >= CONSECUTIVE_ERROR_RESET {
            // Diagnostic counter, not a gate: reset instead of tripping open.
            inner.consecutive_errors = 0;
        }

        // Lazy eviction: age out first, then cap.
        while let Some(front) = inner.error_log.front() {
            if now - front.timestamp > ERROR_LOG_MAX_AGE_MS {
                inner.error_log.pop_front();
            } else {
                break;
            }
        }
        if inner.error_log.len() >= ERROR_LOG_CAPACITY {
            inner.error_log.pop_front();
        }
        inner.error_log.push_back(ErrorLogEntry {
            timestamp: now,
            message: format!("{} {} attempt {}: {}", method, url, attempt, error),
        });
    }

    /// Store (or clear, with None) the third-party credential attached to
    /// place-index calls.
    pub fn set_credential(&self, credential: Option<String>) {
        self.inner.lock().unwrap().credential = credential.filter(|c| !c.is_empty());
    }

    /// Whether a place-index credential is configured.
    pub fn credential_set(&self) -> bool {
        self.inner.lock().unwrap().credential.is_some()
    }

    /// Drop cache keys with the given literal prefix (all keys if None).
    pub fn clear_cache(&self, prefix: Option<&str>) -> usize {
        let mut inner = self.inner.lock().unwrap();
        match prefix {
            None => {
                let n = inner.cache.len();
                inner.cache.clear();
                n
            }
            Some(p) => {
                let before = inner.cache.len();
                inner.cache.retain(|k, _| !k.starts_with(p));
                before - inner.cache.len()
            }
        }
    }

    // ─── Read-only diagnostics ───────────────────────────────────

    pub fn cache_snapshot(&self) -> Vec<(String, CacheEntry)> {
        let inner = self.inner.lock().unwrap();
        let mut entries: Vec<_> = inner
            .cache
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    pub fn cache_len(&self) -> usize {
        self.inner.lock().unwrap().cache.len()
    }

    pub fn cache_ttl_ms(&self) -> i64 {
        CACHE_TTL_MS
    }

    /// Milliseconds of validity left for a cached key, if present and live.
    pub fn time_remaining_ms(&self, key: &str) -> Option<i64> {
        let inner = self.inner.lock().unwrap();
        let entry = inner.cache.get(key)?;
        let remaining = CACHE_TTL_MS - ((self.clock)() - entry.stored_at);
        (remaining > 0).then_some(remaining)
    }

    pub fn error_log(&self) -> Vec<ErrorLogEntry> {
        self.inner.lock().unwrap().error_log.iter().cloned().collect()
    }

    pub fn error_count(&self) -> usize {
        self.inner.lock().unwrap().error_log.len()
    }

    pub fn stats(&self) -> RequestStats {
        self.inner.lock().unwrap().stats
    }

    pub fn consecutive_errors(&self) -> u32 {
        self.inner.lock().unwrap().consecutive_errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
    use std::sync::Arc;

    struct StubTransport {
        calls: AtomicU32,
        responses: Box<dyn Fn(u32) -> Result<String, String> + Send + Sync>,
    }

    impl StubTransport {
        fn new(
            responses: Box<dyn Fn(u32) -> Result<String, String> + Send + Sync>,
        ) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicU32::new(0),
                responses,
            })
        }
    }

    impl Transport for Arc<StubTransport> {
        fn get(&self, _url: &str, _auth: Option<&str>) -> Result<String, String> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            (self.responses)(n)
        }

        fn post(&self, url: &str, _body: &str, auth: Option<&str>) -> Result<String, String> {
            self.get(url, auth)
        }
    }

    fn manual_clock() -> (Arc<AtomicI64>, Box<dyn Fn() -> i64 + Send + Sync>) {
        let t = Arc::new(AtomicI64::new(0));
        let t2 = Arc::clone(&t);
        (t, Box::new(move || t2.load(Ordering::SeqCst)))
    }

    #[test]
    fn test_cache_hit_skips_network() {
        let stub = StubTransport::new(Box::new(|_| Ok("payload".into())));
        let proxy = ResilienceProxy::new(Box::new(Arc::clone(&stub)));

        assert_eq!(proxy.proxy_get("http://x/a"), "payload");
        assert_eq!(proxy.proxy_get("http://x/a"), "payload");
        assert_eq!(stub.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_cache_ttl_boundary() {
        let stub = StubTransport::new(Box::new(|n| Ok(format!("v{}", n))));
        let (t, clock) = manual_clock();
        let proxy = ResilienceProxy::with_clock(Box::new(Arc::clone(&stub)), clock);

        assert_eq!(proxy.proxy_get("http://x/a"), "v0");

        // 4 min 59 s later: still cached.
        t.store(4 * 60_000 + 59_000, Ordering::SeqCst);
        assert_eq!(proxy.proxy_get("http://x/a"), "v0");
        assert_eq!(stub.calls.load(Ordering::SeqCst), 1);

        // 5 min 01 s later: expired, fetched fresh.
        t.store(5 * 60_000 + 1_000, Ordering::SeqCst);
        assert_eq!(proxy.proxy_get("http://x/a"), "v1");
        assert_eq!(stub.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_retry_three_attempts_then_sentinel() {
        let stub = StubTransport::new(Box::new(|_| Err("connection refused".into())));
        let proxy = ResilienceProxy::new(Box::new(Arc::clone(&stub)));

        let out = proxy.proxy_get("http://x/a");
        assert!(is_sentinel(&out), "got {}", out);
        assert_eq!(stub.calls.load(Ordering::SeqCst), 3);
        assert_eq!(proxy.error_count(), 3);

        let stats = proxy.stats();
        assert_eq!(stats.total, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.succeeded, 0);
    }

    #[test]
    fn test_success_after_transient_failure() {
        let stub = StubTransport::new(Box::new(|n| {
            if n < 2 {
                Err("timeout".into())
            } else {
                Ok("recovered".into())
            }
        }));
        let proxy = ResilienceProxy::new(Box::new(Arc::clone(&stub)));

        assert_eq!(proxy.proxy_get("http://x/a"), "recovered");
        assert_eq!(proxy.consecutive_errors(), 0);
        let stats = proxy.stats();
        assert_eq!(stats.total, 1);
        assert_eq!(stats.succeeded, 1);
        assert_eq!(stats.failed, 0);
    }

    #[test]
    fn test_consecutive_error_counter_self_resets() {
        let stub = StubTransport::new(Box::new(|_| Err("down".into())));
        let proxy = ResilienceProxy::new(Box::new(Arc::clone(&stub)));

        // 3 calls * 3 attempts = 9 consecutive failures.
        for i in 0..3 {
            let out = proxy.proxy_get(&format!("http://x/{}", i));
            assert!(is_sentinel(&out));
        }
        assert_eq!(proxy.consecutive_errors(), 9);

        // The 10th failed attempt trips the self-reset back to zero.
        let _ = proxy.proxy_get("http://x/3");
        assert!(proxy.consecutive_errors() < 10);
    }

    #[test]
    fn test_error_log_capacity() {
        let stub = StubTransport::new(Box::new(|_| Err("down".into())));
        let proxy = ResilienceProxy::new(Box::new(Arc::clone(&stub)));

        // 40 exhausted calls * 3 attempts = 120 entries written, 100 kept.
        for i in 0..40 {
            let _ = proxy.proxy_get(&format!("http://x/{}", i));
        }
        assert_eq!(proxy.error_count(), 100);

        // Oldest entries were the ones evicted.
        let log = proxy.error_log();
        assert!(log[0].message.contains("http://x/6"), "got {}", log[0].message);
    }

    #[test]
    fn test_error_log_age_eviction() {
        let stub = StubTransport::new(Box::new(|_| Err("down".into())));
        let (t, clock) = manual_clock();
        let proxy = ResilienceProxy::with_clock(Box::new(Arc::clone(&stub)), clock);

        let _ = proxy.proxy_get("http://x/old");
        assert_eq!(proxy.error_count(), 3);

        // 25 hours later, the next failed write ages out the old entries.
        t.store(25 * 3600 * 1000, Ordering::SeqCst);
        let _ = proxy.proxy_get("http://x/new");
        assert_eq!(proxy.error_count(), 3);
        assert!(proxy.error_log()[0].message.contains("http://x/new"));
    }

    #[test]
    fn test_clear_cache_by_prefix() {
        let stub = StubTransport::new(Box::new(|_| Ok("ok".into())));
        let proxy = ResilienceProxy::new(Box::new(Arc::clone(&stub)));

        let _ = proxy.proxy_get("http://a/1");
        let _ = proxy.proxy_get("http://a/2");
        let _ = proxy.proxy_get("http://b/1");
        assert_eq!(proxy.cache_len(), 3);

        let removed = proxy.clear_cache(Some("GET http://a/"));
        assert_eq!(removed, 2);
        assert_eq!(proxy.cache_len(), 1);

        let removed = proxy.clear_cache(None);
        assert_eq!(removed, 1);
        assert_eq!(proxy.cache_len(), 0);
    }

    #[test]
    fn test_time_remaining() {
        let stub = StubTransport::new(Box::new(|_| Ok("ok".into())));
        let (t, clock) = manual_clock();
        let proxy = ResilienceProxy::with_clock(Box::new(Arc::clone(&stub)), clock);

        let _ = proxy.proxy_get("http://x/a");
        t.store(60_000, Ordering::SeqCst);
        let remaining = proxy.time_remaining_ms("GET http://x/a").unwrap();
        assert_eq!(remaining, CACHE_TTL_MS - 60_000);
        assert!(proxy.time_remaining_ms("GET http://x/missing").is_none());
    }

    #[test]
    fn test_credential_attached_only_to_place_index() {
        struct AuthSpy(Mutex<Vec<(String, Option<String>)>>);
        impl Transport for Arc<AuthSpy> {
            fn get(&self, url: &str, auth: Option<&str>) -> Result<String, String> {
                self.0
                    .lock()
                    .unwrap()
                    .push((url.to_string(), auth.map(String::from)));
                Ok("ok".into())
            }
            fn post(&self, url: &str, _body: &str, auth: Option<&str>) -> Result<String, String> {
                self.get(url, auth)
            }
        }

        let spy = Arc::new(AuthSpy(Mutex::new(Vec::new())));
        let proxy = ResilienceProxy::new(Box::new(Arc::clone(&spy)));
        proxy.set_credential(Some("fsq-secret".into()));

        let _ = proxy.proxy_get("https://api.foursquare.com/v3/places/search?q=halal");
        let _ = proxy.proxy_get("https://overpass-api.de/api/interpreter");

        let seen = spy.0.lock().unwrap();
        assert_eq!(seen[0].1.as_deref(), Some("fsq-secret"));
        assert_eq!(seen[1].1, None);
    }

    #[test]
    fn test_post_body_part_of_cache_key() {
        let stub = StubTransport::new(Box::new(|n| Ok(format!("v{}", n))));
        let proxy = ResilienceProxy::new(Box::new(Arc::clone(&stub)));

        let a = proxy.proxy_post("http://x/q", "body-one");
        let b = proxy.proxy_post("http://x/q", "body-two");
        assert_ne!(a, b);
        assert_eq!(proxy.proxy_post("http://x/q", "body-one"), a);
        assert_eq!(stub.calls.load(Ordering::SeqCst), 2);
    }
}
