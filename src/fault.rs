//! Deliberate channel impairment for exercising recovery paths.
//!
//! The transport underneath is ordinary UDP, which on a loopback or LAN link
//! is far too well-behaved to ever corrupt a frame.  To prove the
//! retransmission machinery works, the sending side can route every
//! post-handshake transmission through a [`FaultInjector`] that decides
//! whether the frame goes out with its checksum field zeroed
//! ([`crate::frame::Frame::encode_corrupted`]).
//!
//! # Fault model
//!
//! | fault               | knob          | effect on the wire                |
//! |---------------------|---------------|-----------------------------------|
//! | checksum corruption | `percent`     | stored checksum zeroed; receiver discards the frame |
//!
//! Corruption is drawn fresh for every transmission, retransmissions
//! included, so a frame corrupted on its first flight can go out clean on a
//! later one.  Connection requests and acknowledgments never pass through an
//! injector: only confirmed-connection data traffic is impaired.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Decides, per outbound transmission, whether the frame's checksum field is
/// zeroed on the wire.
pub trait FaultInjector: Send {
    /// `true` when the next transmission must carry a zeroed checksum.
    fn corrupt_next(&mut self) -> bool;
}

/// Pass-through injector: every frame goes out intact.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoFaults;

impl FaultInjector for NoFaults {
    fn corrupt_next(&mut self) -> bool {
        false
    }
}

/// Corrupts a fixed percentage of transmissions.
///
/// A draw of `0..100` is compared against `percent`, so `0` never fires and
/// `100` fires on every single transmission.
#[derive(Debug)]
pub struct RandomCorruption {
    percent: u8,
    rng: StdRng,
}

impl RandomCorruption {
    /// Corrupt `percent` out of every 100 transmissions, seeded from entropy.
    pub fn new(percent: u8) -> Self {
        Self::seeded(percent, rand::rng().random())
    }

    /// Deterministic variant for reproducible runs.
    pub fn seeded(percent: u8, seed: u64) -> Self {
        debug_assert!(percent <= 100);
        Self {
            percent,
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl FaultInjector for RandomCorruption {
    fn corrupt_next(&mut self) -> bool {
        self.rng.random_range(0..100u8) < self.percent
    }
}
