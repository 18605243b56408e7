use crate::clock::Clock;
use chrono::{DateTime, Duration, Utc};
use std::sync::{Arc, Mutex};

/// Cache lifetime for a bearer token. The provider issues 3600s tokens; the
/// cached copy expires first so a token is never used right at its edge.
pub const TOKEN_TTL_SECS: i64 = 3300;

pub fn token_ttl() -> Duration {
    Duration::seconds(TOKEN_TTL_SECS)
}

/// Time-bounded slot for the provider bearer token.
pub trait TokenStore: Send + Sync {
    fn get(&self) -> Option<String>;
    fn put(&self, token: String, ttl: Duration);
    fn evict(&self);
}

struct CachedToken {
    value: String,
    expires_at: DateTime<Utc>,
}

/// In-process store; enough for a single process. Several processes sharing
/// a token would need a shared store behind the same trait.
pub struct MemoryTokenStore {
    clock: Arc<dyn Clock>,
    slot: Mutex<Option<CachedToken>>,
}

impl MemoryTokenStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            slot: Mutex::new(None),
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn get(&self) -> Option<String> {
        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        match slot.as_ref() {
            Some(cached) if cached.expires_at > self.clock.now() => Some(cached.value.clone()),
            Some(_) => {
                *slot = None;
                None
            }
            None => None,
        }
    }

    fn put(&self, token: String, ttl: Duration) {
        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        *slot = Some(CachedToken {
            value: token,
            expires_at: self.clock.now() + ttl,
        });
    }

    fn evict(&self) {
        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        *slot = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    struct StepClock(Mutex<DateTime<Utc>>);

    impl Clock for StepClock {
        fn now(&self) -> DateTime<Utc> {
            *self.0.lock().unwrap()
        }
    }

    #[test]
    fn token_expires_after_ttl() {
        let t0 = Utc.with_ymd_and_hms(2025, 10, 22, 12, 0, 0).unwrap();
        let clock = Arc::new(StepClock(Mutex::new(t0)));
        let store = MemoryTokenStore::new(clock.clone());
        assert_eq!(store.get(), None);

        store.put("tok".into(), token_ttl());
        *clock.0.lock().unwrap() = t0 + Duration::seconds(3299);
        assert_eq!(store.get().as_deref(), Some("tok"));

        *clock.0.lock().unwrap() = t0 + Duration::seconds(3300);
        assert_eq!(store.get(), None);
    }

    #[test]
    fn evict_drops_token_early() {
        let store = MemoryTokenStore::new(Arc::new(crate::clock::SystemClock));
        store.put("tok".into(), token_ttl());
        store.evict();
        assert_eq!(store.get(), None);
    }
}
