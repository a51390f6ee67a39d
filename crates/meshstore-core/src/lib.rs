pub mod cache_store;
pub mod document_service_store;
pub mod embedded_document_store;
pub mod embedded_file_store;
pub mod factory;
pub mod hybrid_store;
pub mod in_memory_store;
pub mod key_format;
pub mod migrations;
pub mod providers;
pub mod relational_vector_store;
pub mod similarity;
pub mod traits;

pub use cache_store::CacheStore;
pub use document_service_store::DocumentServiceStore;
pub use embedded_document_store::EmbeddedDocumentStore;
pub use embedded_file_store::EmbeddedFileStore;
pub use factory::StoreFactory;
pub use hybrid_store::HybridStore;
pub use in_memory_store::InMemoryStore;
pub use relational_vector_store::RelationalVectorStore;
pub use traits::{DocumentFields, FieldValue, MemoryStore, VectorSearchProvider};
