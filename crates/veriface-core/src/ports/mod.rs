//! Ports: the collaborator interfaces the core consumes.

mod embedding_store;
mod face_crop;
mod model_source;
mod remote;

pub use embedding_store::{EmbeddingStore, EnrolledRecord};
pub use face_crop::{FaceCropOutcome, FaceCropProvider};
pub use model_source::{KeySource, ModelByteSource};
pub use remote::{RemoteDetails, RemoteResponse, RemoteVerdict, RemoteVerifyApi};
