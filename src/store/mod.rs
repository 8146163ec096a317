pub mod cache;
pub mod document;
pub mod gateway;

pub use cache::PriceCache;
pub use document::{DocumentStore, MemoryStore};
pub use gateway::{PersistSummary, StoreGateway};
