//! Injectable clock (spec §5): all wall-clock reads go through this trait so
//! stagnation detection and the Progressive Guidance Escalator's time
//! windows can be driven deterministically in tests — the teacher's pattern
//! of threading `Instant`/`Duration` explicitly rather than calling
//! `Instant::now()` inside the structs that need it (see `CostTracker`,
//! `DoomLoopTracker` in `codingbuddy-agent/src/tool_loop/safety.rs`).

/// Milliseconds since an arbitrary but fixed epoch, monotonically
/// non-decreasing for one clock instance.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

/// Real wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// A manually-advanced clock for tests.
#[derive(Debug, Default)]
pub struct FakeClock {
    now: std::sync::atomic::AtomicU64,
}

impl FakeClock {
    #[must_use]
    pub fn new(start_ms: u64) -> Self {
        Self {
            now: std::sync::atomic::AtomicU64::new(start_ms),
        }
    }

    pub fn advance(&self, ms: u64) {
        self.now.fetch_add(ms, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn set(&self, ms: u64) {
        self.now.store(ms, std::sync::atomic::Ordering::SeqCst);
    }
}

impl Clock for FakeClock {
    fn now_ms(&self) -> u64 {
        self.now.load(std::sync::atomic::Ordering::SeqCst)
    }
}
