pub mod extract;
pub mod fixture;
pub mod http;
pub mod traits;

pub use extract::{Listing, SelectorExtractor, SelectorSet};
pub use fixture::{FailingSource, FixtureSource};
pub use http::HttpSource;
pub use traits::{Extractor, PriceSource};
