//! # ChartSift
//!
//! A clinical-note ingestion and retrieval pipeline for FHIR data.
//!
//! ChartSift walks directories of FHIR R4 bundle files, extracts narrative
//! notes from document and report resources, cleans away synthetic-template
//! boilerplate, chunks and embeds the remaining text, and stores everything
//! in SQLite. At query time it assembles a patient-scoped context block by
//! cosine similarity, falling back to the most recent notes when similarity
//! search comes up empty.
//!
//! ## Quick Start
//!
//! ```bash
//! chartsift init                          # create database
//! chartsift ingest ./bundles              # ingest FHIR bundles
//! chartsift context "diabetes management" --patient patient-1
//! chartsift stats                         # store summary
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`bundle`] | FHIR bundle resource model |
//! | [`extract`] | Note extraction from bundle resources |
//! | [`sanitize`] | Template and markup removal |
//! | [`chunk`] | Overlapping text chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`store`] | SQLite vector store |
//! | [`context`] | Retrieval and context assembly |
//! | [`ingest`] | Ingestion pipeline |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod bundle;
pub mod chunk;
pub mod config;
pub mod context;
pub mod db;
pub mod embedding;
pub mod extract;
pub mod ingest;
pub mod migrate;
pub mod models;
pub mod sanitize;
pub mod stats;
pub mod store;
