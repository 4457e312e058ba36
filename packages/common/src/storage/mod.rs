mod error;
mod key;
mod traits;

pub mod filesystem;

pub use error::BlobError;
pub use key::BlobKey;
pub use traits::{BlobStore, BoxReader};
