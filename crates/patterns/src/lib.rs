//! Online tactical pattern detectors.
//!
//! - [`AmbushDetector`]: recognises gate camps from a short window of one
//!   system's kills.
//! - [`WarTracker`]: remembers which entity pairs are fighting an ongoing war,
//!   inferred from repeated kills or registered from an authoritative source.
//!
//! Both are pure computation over data the caller pulls from the store. Neither
//! errors on empty input.

pub mod ambush;
pub mod war;

pub use ambush::{AmbushAssessment, AmbushConfig, AmbushDetector, Confidence, WarFilteredAmbush};
pub use war::{
    kill_parties, KillParties, PairKey, WarCheck, WarConfig, WarObservation, WarRelationship,
    WarSource, WarTracker,
};
