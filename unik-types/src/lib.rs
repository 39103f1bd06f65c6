//! unik-types - Shared types for the unik provisioning core
//!
//! This crate contains the persisted entity model (images, instances,
//! volumes) and the error type used across the provisioning crates.
//! It has no behavior beyond value semantics, wire-compatible
//! serialization, and diagnostics rendering.

pub mod entities;
pub mod errors;

pub use entities::{
    DeviceMapping, Image, ImageFormat, Infrastructure, Instance, InstanceState, RawImage, RunSpec,
    StageSpec, StorageDriver, Volume, VsphereNetworkType, XenVirtualizationType,
};
pub use errors::{UnikError, UnikResult};
