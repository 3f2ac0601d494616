//! # pdfrag
//!
//! Ingest PDF documents, embed their text, and answer natural-language
//! questions grounded in the retrieved pages, with citations.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────────┐   ┌──────────┐
//! │   PDFs   │──▶│   Pipeline     │──▶│  SQLite   │
//! │  (text)  │   │ Chunk + Embed │   │ documents │
//! └──────────┘   └───────────────┘   │  chunks   │
//!                                    └────┬─────┘
//!                                         │ cosine top-k
//!                                         ▼
//!                 question ──▶ embed ──▶ context ──▶ grounded answer
//!                                                    [Title, page N]
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! pdfrag init                       # create database
//! pdfrag ingest ./docs              # ingest every PDF under ./docs
//! pdfrag ask "What is the warranty period?"
//! pdfrag documents                  # list what is stored
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`extract`] | PDF page-text extraction |
//! | [`chunk`] | Page-aware text chunking |
//! | [`embedding`] | Embedding gateway and vector utilities |
//! | [`store`] | SQLite persistence and similarity search |
//! | [`context`] | Context assembly with provenance tags |
//! | [`answer`] | Grounded answer generation and citation validation |
//! | [`ingest`] | Ingestion batch driver |
//! | [`query`] | Question-answering pipeline |

pub mod answer;
pub mod chunk;
pub mod config;
pub mod context;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod ingest;
pub mod models;
pub mod query;
pub mod store;
