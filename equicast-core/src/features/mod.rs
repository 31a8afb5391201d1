//! Feature engine: bars in, fixed-shape labelled feature rows out.

pub mod config;
pub mod engine;
pub mod label;
pub mod row;
pub mod schema;

pub use config::{FeatureConfig, FeatureConfigError};
pub use engine::{compute, FeatureFrame, LabelMode};
pub use label::{forward_return, label_direction};
pub use row::{FeatureRow, FEATURE_COUNT};
pub use schema::{AlignedRow, FeatureSchema, SchemaCheck, SchemaMismatch, FEATURE_SCHEMA_VERSION};
