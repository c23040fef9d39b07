pub mod access_log;
pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod flow;
pub mod matcher;
pub mod store;
pub mod vector;

pub use access_log::{AccessLog, Action};
pub use db::Db;
pub use error::{Error, Result};
pub use flow::Recognizer;
pub use matcher::{MatchResult, DEFAULT_THRESHOLD};
pub use store::{FaceRecord, FaceStore};
pub use vector::EMBEDDING_DIM;
