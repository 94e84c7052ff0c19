//! Test support for the veriface pipeline: synthetic frames with known gate
//! behavior and scripted sessions/ports, so every stage is exercisable
//! without model binaries.

mod builders;
mod mocks;

pub use builders::SyntheticFrameBuilder;
pub use mocks::{
    MockByteSource, MockEmbeddingStore, MockFaceCrop, MockKeySource, MockRemoteVerify,
    ScriptedSession,
};
