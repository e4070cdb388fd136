//! Research material sources: web search, page extraction and local files.

pub mod bocha;
pub mod extract;
pub mod files;
pub mod search;

pub use bocha::{BochaConfig, BochaSearch};
pub use extract::{
    ContentExtractor, DirectExtractor, ExtractFormat, ParallelExtractor, build_extractor,
};
pub use files::{chunk_text, read_files};
pub use search::{Freshness, SearchHit, SearchProvider, SearchResult};
