//! Shared types for the pre-generation workspace.
//!
//! # Invariants
//! - Cell coordinates are integer grid addresses, never world positions.
//! - A `RegionId` is only ever referenced here, never created or destroyed.

pub mod types;

pub use types::{
    Bounds, CellCoord, GenerationKind, GenerationMode, RegionId, ThrottleConfig,
    UnknownGenerationKind,
};
