pub mod identity;
pub mod profile;

pub use identity::{DisplayInfo, Identity};
pub use profile::{Certification, NewProfile, Profile, ProfilePatch, ProfileSeed};
