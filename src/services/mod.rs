pub mod directory;
pub mod media;
pub mod pipeline;

pub use directory::{PgUserDirectory, StaticUserDirectory, UserDirectory, UserProfile};
pub use media::{AttachmentUpload, MediaStore, MemoryMediaStore, S3MediaStore};
pub use pipeline::{MessagePipeline, OutgoingMessage};
