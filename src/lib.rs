//! tunedex: a music library catalog with fuzzy search.
//!
//! Two stores are kept in step:
//! - PrimaryStore (SQLite): full track metadata keyed by path
//! - SearchIndex (tantivy): lower-cased artist/album/title for fuzzy lookup
//!
//! The Synchronizer rebuilds and resyncs them in bulk, the Librarian applies
//! single-file changes while watching, and the Searcher answers queries.

pub mod config;
pub mod engine;
pub mod error;
pub mod librarian;
pub mod service;
pub mod state;
pub mod storage;

pub use config::{Settings, StalePolicy};
pub use engine::searcher::{AlbumGroup, ArtistGroup, SearchHit, SearchSummary};
pub use engine::synchronizer::SyncReport;
pub use error::{Result, TunedexError};
pub use librarian::FsChange;
pub use service::Tunedex;
pub use state::{Catalog, SharedCatalog, SyncPhase};
pub use storage::TrackRecord;
