use chrono::Utc;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Length of every secret id minted by this crate.
pub const ID_LENGTH: usize = 26;

/// Wall-clock source in integer milliseconds since the Unix epoch.
///
/// Injected into the service so tests can pin time; production wiring uses
/// [`SystemClock`].
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;
}

/// Production clock backed by the system wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// Deterministic clock for tests. Settable and advanceable.
#[derive(Debug)]
pub struct FixedClock {
    now: AtomicI64,
}

impl FixedClock {
    pub fn new(now_millis: i64) -> Arc<Self> {
        Arc::new(Self {
            now: AtomicI64::new(now_millis),
        })
    }

    pub fn set(&self, now_millis: i64) {
        self.now.store(now_millis, Ordering::SeqCst);
    }

    pub fn advance(&self, delta_millis: i64) {
        self.now.fetch_add(delta_millis, Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now_millis(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Source of opaque record identifiers, collision-free within a deployment.
pub trait IdSource: Send + Sync {
    fn new_id(&self) -> String;
}

/// Random ids derived from UUIDv4, truncated to [`ID_LENGTH`] hex characters
/// (104 bits of entropy).
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomIds;

impl IdSource for RandomIds {
    fn new_id(&self) -> String {
        let mut id = Uuid::new_v4().simple().to_string();
        id.truncate(ID_LENGTH);
        id
    }
}

/// Predictable ids for tests: `sec0000...01`, `sec0000...02`, ...
#[derive(Debug, Default)]
pub struct SequentialIds {
    next: AtomicU64,
}

impl IdSource for SequentialIds {
    fn new_id(&self) -> String {
        let n = self.next.fetch_add(1, Ordering::SeqCst) + 1;
        format!("sec{:0width$}", n, width = ID_LENGTH - 3)
    }
}
