//! Nutrition analysis normalization.
//!
//! The vision model's output shape is not guaranteed. This module turns it
//! into a [`NutritionRecord`] with fixed field types, bounds and defaults.

pub mod coerce;
pub mod normalizer;
pub mod record;
pub mod render;

pub use normalizer::{NotFood, Normalized, normalize};
pub use record::{ImageRef, NormalizedAnalysis, NutritionRecord};
