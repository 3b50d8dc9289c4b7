//! Resource version generation.
//!
//! Resource versions are 63-bit Snowflake-style IDs:
//!
//! ```text
//! | 41 bits: ms since epoch | 10 bits: node | 12 bits: sequence |
//! ```
//!
//! - **Epoch**: 2010-11-04 01:42:54.657 UTC, the common Snowflake epoch
//! - **Node**: configured per process, or random when unset
//! - **Sequence**: counter within one millisecond
//!
//! Versions are strictly increasing per generator. Generators in different
//! processes are not coordinated, so versions are only roughly ordered
//! across writers.

use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;

/// Custom epoch in milliseconds since the Unix epoch.
pub const EPOCH_MS: i64 = 1_288_834_974_657;

const NODE_BITS: u32 = 10;
const SEQUENCE_BITS: u32 = 12;

/// Bit offset of the timestamp portion.
pub const TIME_SHIFT: u32 = NODE_BITS + SEQUENCE_BITS;

/// Highest valid node ID.
pub const MAX_NODE_ID: u16 = (1 << NODE_BITS) - 1;

const SEQUENCE_MASK: i64 = (1 << SEQUENCE_BITS) - 1;

struct State {
    last_timestamp: i64,
    sequence: i64,
}

/// Mints strictly increasing resource versions for one process.
pub struct RvGenerator {
    node: i64,
    state: Mutex<State>,
}

impl RvGenerator {
    /// Generator for the given node. IDs above `MAX_NODE_ID` are masked.
    pub fn new(node_id: u16) -> Self {
        Self {
            node: i64::from(node_id & MAX_NODE_ID),
            state: Mutex::new(State {
                last_timestamp: 0,
                sequence: 0,
            }),
        }
    }

    /// Generator with a random node ID.
    pub fn with_random_node() -> Self {
        Self::new(rand::random::<u16>() & MAX_NODE_ID)
    }

    pub fn node_id(&self) -> u16 {
        self.node as u16
    }

    /// Mint the next resource version.
    ///
    /// A clock that moves backwards keeps the previous timestamp. When the
    /// sequence overflows the timestamp is advanced by one millisecond
    /// rather than waiting for the clock.
    pub fn next(&self) -> i64 {
        let now = (Utc::now().timestamp_millis() - EPOCH_MS).max(0);
        let mut state = self.state.lock();

        if now > state.last_timestamp {
            state.last_timestamp = now;
            state.sequence = 0;
        } else {
            state.sequence += 1;
            if state.sequence > SEQUENCE_MASK {
                state.last_timestamp += 1;
                state.sequence = 0;
            }
        }

        (state.last_timestamp << TIME_SHIFT) | (self.node << SEQUENCE_BITS) | state.sequence
    }
}

/// Wall-clock time embedded in a resource version.
pub fn rv_time(rv: i64) -> DateTime<Utc> {
    let ms = (rv >> TIME_SHIFT) + EPOCH_MS;
    Utc.timestamp_millis_opt(ms)
        .single()
        .unwrap_or_default()
}

/// Lowest resource version that can be minted at `time`.
pub fn rv_from_time(time: DateTime<Utc>) -> i64 {
    (time.timestamp_millis() - EPOCH_MS).max(0) << TIME_SHIFT
}

/// Width of a time span measured in resource versions.
pub fn span_from_duration(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis())
        .unwrap_or(i64::MAX >> TIME_SHIFT)
        .min(i64::MAX >> TIME_SHIFT)
        << TIME_SHIFT
}
