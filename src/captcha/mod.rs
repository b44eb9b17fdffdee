//! Challenge detection and resolution
//!
//! Passive detection of visual challenges on a loaded page, token acquisition
//! through an external solving service, and in-page solution injection.

mod detector;
mod solver;
mod types;

pub use detector::{detect_and_solve, CHALLENGE_SELECTORS};
pub use solver::CaptchaSolver;
pub use types::{CaptchaError, CaptchaToken, ChallengeKind, ChallengeOutcome, ChallengeRequest};
