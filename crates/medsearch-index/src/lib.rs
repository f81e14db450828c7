//! medsearch-index
//!
//! The immutable disease index. `store` loads the columnar bundle (a LanceDB
//! directory with a `diseases` table and an optional `idf` table) into an
//! [`IndexStore`]; `writer` materialises such a bundle from in-memory records.

pub mod schema;
pub mod store;
pub mod table;
pub mod writer;

pub use store::{EmbeddingMatrix, IndexStore};
pub use writer::write_index;
