//! Folio: index a document into a vector store and answer questions with
//! keyword-verified retrieval.

pub mod config;
pub mod embeddings;
pub mod loader;
pub mod rag;
pub mod store;
