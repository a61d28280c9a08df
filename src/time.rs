use serde::{Deserialize, Serialize};

pub const NS_PER_SEC: i64 = 1_000_000_000;

/// Integer PTP timestamp as carried in frames.
///
/// Frame timestamps are always the floor of the syntonized counters; any
/// sub-nanosecond fraction stays behind in the RTC.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timestamp {
    pub sec: u64,
    pub ns: u32,
}

impl Timestamp {
    pub fn new(sec: u64, ns: u32) -> Self {
        debug_assert!((ns as i64) < NS_PER_SEC);
        Timestamp { sec, ns }
    }

    /// Unwrapped total nanoseconds (sec * 1e9 + ns).
    pub fn total_ns(&self) -> i64 {
        self.sec as i64 * NS_PER_SEC + self.ns as i64
    }
}

/// Difference of two ns fields with a single wrap correction.
///
/// Used where the protocol subtracts raw ns fields of timestamps that are
/// known to be less than one second apart (Pdelay turnarounds).
pub fn wrapped_ns_diff(a_ns: u32, b_ns: u32) -> i64 {
    let d = a_ns as i64 - b_ns as i64;
    if d < 0 {
        d + NS_PER_SEC
    } else {
        d
    }
}

/// The slave's time-offset register.
///
/// The register holds integer nanoseconds; `ns` is kept in [0, 1e9) by
/// carry/borrow into `sec`, so negative offsets are expressed through a
/// negative `sec`. Synchronized time = syntonized counters + this register.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeOffset {
    pub sec: i64,
    pub ns: i64,
}

impl TimeOffset {
    pub fn new(sec: i64, ns: i64) -> Self {
        let mut off = TimeOffset { sec, ns };
        off.normalize();
        off
    }

    pub fn total_ns(&self) -> i64 {
        self.sec * NS_PER_SEC + self.ns
    }

    /// Replace the register contents (stage-1 and stage-4 writes).
    pub fn overwrite(&mut self, sec: i64, ns: i64) {
        self.sec = sec;
        self.ns = ns;
        self.normalize();
    }

    /// Add integer nanoseconds (slope corrections).
    pub fn add_ns(&mut self, delta: i64) {
        self.ns += delta;
        self.normalize();
    }

    fn normalize(&mut self) {
        while self.ns < 0 {
            self.ns += NS_PER_SEC;
            self.sec -= 1;
        }
        while self.ns >= NS_PER_SEC {
            self.ns -= NS_PER_SEC;
            self.sec += 1;
        }
    }
}
