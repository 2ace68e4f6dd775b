//! 세션 마커 - 프로세스 수명 동안만 유지되는 플래그
//!
//! Markers live in a process-global registry. They survive dropping and
//! re-creating any component inside the same process, and disappear when the
//! process exits. Nothing is ever written to disk.

use std::collections::HashSet;
use std::sync::{Mutex, OnceLock};
use tracing::debug;

static SESSION_MARKERS: OnceLock<Mutex<HashSet<String>>> = OnceLock::new();

fn registry() -> &'static Mutex<HashSet<String>> {
    SESSION_MARKERS.get_or_init(|| Mutex::new(HashSet::new()))
}

/// Handle to one named marker in the process-global registry.
#[derive(Debug, Clone)]
pub struct SessionMarkers {
    namespace: String,
}

impl SessionMarkers {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// 마커 존재 여부
    pub fn is_set(&self) -> bool {
        registry()
            .lock()
            .map(|set| set.contains(&self.namespace))
            .unwrap_or(false)
    }

    /// 마커 설정 (이미 있으면 no-op)
    pub fn set(&self) {
        if let Ok(mut set) = registry().lock() {
            if set.insert(self.namespace.clone()) {
                debug!(namespace = %self.namespace, "Session marker set");
            }
        }
    }

    /// 마커 제거
    pub fn clear(&self) {
        if let Ok(mut set) = registry().lock() {
            if set.remove(&self.namespace) {
                debug!(namespace = %self.namespace, "Session marker cleared");
            }
        }
    }
}
