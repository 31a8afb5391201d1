//! Equicast Core — bar data, providers, cache, indicators, features, and the classifier.
//!
//! This crate holds everything that works on a single ticker at a time:
//! - Domain types (raw and cleaned bars, series, prediction records)
//! - Data providers (Yahoo chart API, local CSV directory) behind one trait
//! - Column normalization and the exchange-suffix fallback adapter
//! - Parquet bar cache, one file per (kind, ticker)
//! - Technical indicators as pure functions over bar slices
//! - Feature engine producing fixed-shape feature rows with a direction label
//! - Gradient-boosted tree classifier, evaluation metrics, model artifact

pub mod data;
pub mod domain;
pub mod features;
pub mod indicators;
pub mod model;
