use std::path::PathBuf;

use thiserror::Error;

/// Fatal conditions surfaced at the driver boundary. Recoverable
/// conditions (neighbour buffer overflow, gather radius too small) are
/// handled locally and never reach this type.
#[derive(Debug, Error)]
pub enum SimError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error(
        "neighbour buffers exhausted at step {step}: {requested} entries requested, \
         doubling cap is {cap}"
    )]
    NeighborBufferExhausted {
        step: usize,
        requested: usize,
        cap: usize,
    },

    #[error(
        "ghost tail overflow at step {step}: {required} ghost slots required but only \
         {available} available; increase Nhydromax"
    )]
    GhostOverflow {
        step: usize,
        required: usize,
        available: usize,
    },

    #[error(
        "smoothing length iteration diverged for particle {particle} at step {step} \
         (h = {h}, rho = {rho})"
    )]
    HIterationDiverged {
        step: usize,
        particle: usize,
        h: f64,
        rho: f64,
    },

    #[error(
        "non-positive reconstructed state for particle {particle} at step {step} \
         (rho = {rho}, press = {press})"
    )]
    NonPositiveState {
        step: usize,
        particle: usize,
        rho: f64,
        press: f64,
    },

    #[error("i/o failure on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("interrupted by user")]
    Interrupted,
}

impl SimError {
    /// Process exit code for this error kind.
    pub fn exit_code(&self) -> i32 {
        match self {
            SimError::Config(_) => 1,
            SimError::Io { .. } => 2,
            SimError::HIterationDiverged { .. } | SimError::NonPositiveState { .. } => 3,
            SimError::NeighborBufferExhausted { .. } | SimError::GhostOverflow { .. } => 4,
            SimError::Interrupted => 0,
        }
    }
}
