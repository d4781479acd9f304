pub mod export;
mod gateway;
mod manager;

pub use export::{
    ExportError, ExportService, ExportedClip, FfmpegTranscoder, Transcoder, TrimRequest,
};
pub use gateway::{LibraryError, PersistenceGateway, DEFAULT_RETENTION_DAYS};
pub use manager::LibraryManager;
