//! Concrete `VectorSearchProvider` implementations. Each provider is
//! feature-gated on its client crate except the two HTTP-only providers,
//! which only need `reqwest` — already a mandatory dependency of this
//! crate for `DocumentServiceStore`.

#[cfg(feature = "provider-redis")]
pub mod cache_native;
#[cfg(feature = "provider-qdrant")]
pub mod vector_db;

pub mod ai_native;
pub mod http_vector_db;

#[cfg(feature = "provider-redis")]
pub use cache_native::CacheNativeProvider;
pub use ai_native::AiNativeProvider;
pub use http_vector_db::HttpVectorDbProvider;
#[cfg(feature = "provider-qdrant")]
pub use vector_db::VectorDbProvider;
