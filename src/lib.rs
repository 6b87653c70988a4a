pub mod config;
pub mod entities;
pub mod error;
pub mod models;
pub mod routes;
pub mod services;

pub use error::AppError;
pub use models::{UploadSession, UploadStatus};
pub use services::chunk_assembler::ChunkAssembler;
