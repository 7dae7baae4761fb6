//! Job output descriptors and their resolution into viewable resources.
//!
//! A finished job describes its result files as a sequence of output
//! descriptors. This crate turns that description, together with the
//! viewer's current selection, into the locators a volume renderer loads.
//! Everything here is pure; fetching lives in `mri-sr-client`.

pub mod descriptor;
pub mod locator;
pub mod resolver;
pub mod selection;
pub mod view;

pub use descriptor::{OutputDescriptor, OutputSet, OutputVariant};
pub use locator::{FILES_PREFIX, ResourceLocator, normalize_reference};
pub use resolver::{OutputSource, ResolvedResources, ResolvedSource, Unavailable, resolve};
pub use selection::{DEFAULT_OPACITY, ViewSelection};
pub use view::ViewMode;
