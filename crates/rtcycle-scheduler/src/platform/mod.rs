//! OS layer: readiness multiplexer, timer descriptors, clocks and thread setup.

#[cfg(target_os = "linux")]
mod linux;

#[cfg(target_os = "linux")]
pub(crate) use linux::*;

#[cfg(not(target_os = "linux"))]
mod fallback;

#[cfg(not(target_os = "linux"))]
pub(crate) use fallback::*;
