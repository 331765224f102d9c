pub mod sampler;

// Re-export verification types
pub use sampler::{VerificationReport, WipeVerifier, MAX_SAMPLES, MIN_SAMPLE_SPACING};
