//! Deterministic simulation RNG with capturable state.
//!
//! # Determinism strategy
//!
//! All randomness in the engine (Poisson sampling during macro→micro
//! conversion, boundary arrivals) flows through one [`SimRng`] owned by the
//! simulator and only used from the single-threaded micro phase.  The
//! generator is `ChaCha8Rng`, whose complete state is `(seed, stream,
//! word_pos)`; [`RngState`] captures exactly that triple so a snapshot can
//! resume the stream bit-for-bit.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

// ── RngState ──────────────────────────────────────────────────────────────────

/// Full internal state of a [`SimRng`].
///
/// The 128-bit word position is split into two halves so the state
/// serializes through any serde format without 128-bit integer support.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RngState {
    pub seed:        [u8; 32],
    pub stream:      u64,
    pub word_pos_hi: u64,
    pub word_pos_lo: u64,
}

// ── SimRng ────────────────────────────────────────────────────────────────────

/// Simulation-level RNG.
///
/// Used only in single-threaded contexts.
#[derive(Clone, Debug)]
pub struct SimRng(ChaCha8Rng);

impl SimRng {
    pub fn new(seed: u64) -> Self {
        SimRng(ChaCha8Rng::seed_from_u64(seed))
    }

    /// Capture the full generator state.
    pub fn state(&self) -> RngState {
        let word_pos = self.0.get_word_pos();
        RngState {
            seed:        self.0.get_seed(),
            stream:      self.0.get_stream(),
            word_pos_hi: (word_pos >> 64) as u64,
            word_pos_lo: word_pos as u64,
        }
    }

    /// Rebuild a generator that continues exactly where `state` was taken.
    pub fn from_state(state: &RngState) -> Self {
        let mut rng = ChaCha8Rng::from_seed(state.seed);
        rng.set_stream(state.stream);
        rng.set_word_pos(((state.word_pos_hi as u128) << 64) | state.word_pos_lo as u128);
        SimRng(rng)
    }

    /// Uniform variate in the half-open interval `(0, 1]`.
    ///
    /// Excluding zero keeps `-ln(u)` finite.
    #[inline]
    pub fn uniform_open0(&mut self) -> f64 {
        1.0 - self.0.r#gen::<f64>()
    }

    /// Unit-rate exponential variate.
    #[inline]
    pub fn exponential(&mut self) -> f64 {
        -self.uniform_open0().ln()
    }
}
