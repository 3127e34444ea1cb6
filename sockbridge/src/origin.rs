//! Origin allow-list applied to incoming requests before they reach the bridge.
//!
//! Entries are given as one space separated string. `host:80` is shorthand
//! for `http://host` and `host:443` for `https://host`; anything else is
//! matched verbatim against the request's `Origin` header.
use sockbridge_io::RwLock;
use sockbridge_logging::debug;
use std::sync::Arc;

pub const ALLOW_ORIGIN: &str = "Access-Control-Allow-Origin";
pub const ALLOW_CREDENTIALS: &str = "Access-Control-Allow-Credentials";
pub const ALLOW_HEADERS: &str = "Access-Control-Allow-Headers";

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OriginPolicy {
    allowed: Vec<String>,
}

impl OriginPolicy {
    pub fn parse(origins: &str) -> Self {
        let allowed = origins
            .split(' ')
            .filter(|entry| !entry.is_empty())
            .map(expand_entry)
            .collect();

        Self { allowed }
    }

    /// An empty policy rejects every origin
    pub fn deny_all() -> Self {
        Self::default()
    }

    pub fn is_allowed(&self, origin: &str) -> bool {
        self.allowed.iter().any(|allowed| allowed == origin)
    }

    /// Headers to attach to the response for `origin`, or `None` if the
    /// request must be refused
    pub fn cors_headers(&self, origin: &str) -> Option<[(&'static str, String); 3]> {
        if !self.is_allowed(origin) {
            debug!(target: "sockbridge", "Rejecting request from origin {origin:?}");
            return None;
        }

        Some([
            (ALLOW_ORIGIN, origin.to_string()),
            (ALLOW_CREDENTIALS, "true".to_string()),
            (ALLOW_HEADERS, "Content-Type".to_string()),
        ])
    }

    pub fn allowed(&self) -> &[String] {
        &self.allowed
    }
}

fn expand_entry(entry: &str) -> String {
    if let Some(host) = entry.strip_suffix(":80") {
        format!("http://{host}")
    } else if let Some(host) = entry.strip_suffix(":443") {
        format!("https://{host}")
    } else {
        entry.to_string()
    }
}

/// An [`OriginPolicy`] that may be replaced while requests are being checked.
/// Readers see either the old or the new list, never a mix
#[derive(Default)]
pub struct SharedOriginPolicy {
    inner: RwLock<Arc<OriginPolicy>>,
}

impl SharedOriginPolicy {
    pub fn new(policy: OriginPolicy) -> Self {
        Self {
            inner: RwLock::new(Arc::new(policy)),
        }
    }

    pub fn replace(&self, policy: OriginPolicy) {
        debug!(target: "sockbridge", "Replacing origin policy: {:?}", policy.allowed());
        *self.inner.write() = Arc::new(policy);
    }

    pub fn current(&self) -> Arc<OriginPolicy> {
        self.inner.read().clone()
    }

    pub fn is_allowed(&self, origin: &str) -> bool {
        self.inner.read().is_allowed(origin)
    }

    pub fn cors_headers(&self, origin: &str) -> Option<[(&'static str, String); 3]> {
        self.current().cors_headers(origin)
    }
}
