//! Wire protocol: frame encoding/decoding and reply status triage

pub mod classifier;
pub mod frame;
