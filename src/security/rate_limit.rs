use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use log::warn;

/// Sliding-window request limiter keyed by client address.
#[derive(Debug)]
pub struct RateLimiter {
    requests: Mutex<HashMap<String, Vec<Instant>>>,
    max_requests: u32,
    window: Duration,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            requests: Mutex::new(HashMap::new()),
            max_requests,
            window,
        }
    }

    /// Records a request for `key` and reports whether it is within the
    /// limit. Rejected requests are not recorded.
    pub async fn check(&self, key: &str) -> bool {
        let mut requests = self.requests.lock().await;
        let now = Instant::now();

        self.cleanup_old_requests(&mut requests, now);

        let key_requests = requests.entry(key.to_string()).or_default();
        if key_requests.len() >= self.max_requests as usize {
            warn!("Rate limit exceeded for {}", key);
            return false;
        }

        key_requests.push(now);
        true
    }

    fn cleanup_old_requests(&self, requests: &mut HashMap<String, Vec<Instant>>, now: Instant) {
        let Some(window_start) = now.checked_sub(self.window) else {
            return;
        };
        for timestamps in requests.values_mut() {
            timestamps.retain(|&time| time > window_start);
        }
        requests.retain(|_, timestamps| !timestamps.is_empty());
    }
}
