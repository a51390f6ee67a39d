pub mod error;
pub mod key;

pub use error::{Error, Result};
pub use key::{format_key, is_embedding_key, CompositeKey};
