// src/lib.rs

//! Courier: syndication feed ingestion.
//!
//! Crawls registered feeds on a schedule with conditional requests, stores
//! normalized entries, and pushes changed entries to a search index.

pub mod error;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod storage;
pub mod utils;
