use std::sync::atomic::{AtomicUsize, Ordering};

/// Round-robin proxy selection, moving to the next proxy every
/// `rotate_every` requests.
#[derive(Debug)]
pub struct ProxyRotator {
    proxies: Vec<String>,
    rotate_every: usize,
    requests: AtomicUsize,
}

impl ProxyRotator {
    #[must_use]
    pub fn new(proxies: Vec<String>, rotate_every: usize) -> Self {
        Self {
            proxies,
            rotate_every: rotate_every.max(1),
            requests: AtomicUsize::new(0),
        }
    }

    /// Proxy for the next request, or `None` for a direct connection.
    pub fn pick(&self) -> Option<&str> {
        if self.proxies.is_empty() {
            return None;
        }
        let n = self.requests.fetch_add(1, Ordering::Relaxed);
        let idx = (n / self.rotate_every) % self.proxies.len();
        Some(self.proxies[idx].as_str())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.proxies.is_empty()
    }
}
