//! Utility Library - generic containers used by the loader

pub mod registry;
