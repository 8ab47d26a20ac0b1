//! jflash-jlink - SEGGER J-Link probe backend
//!
//! Binds the closed-source `JLinkARM` shared library at runtime with
//! `libloading` and implements [`jflash_core::backend::ProbeBackend`] by
//! sequencing its C entry points. There is no link-time dependency on
//! the SEGGER SDK: the workspace builds everywhere, and the library is
//! located (well-known install paths, or `JFLASH_JLINK_LIB`) only when a
//! backend is constructed.
//!
//! All retry, timeout and lifecycle policy lives in `jflash-core`; this
//! crate is a straight call sequencer.

mod api;
mod backend;

pub use backend::{JlinkBackend, LIBRARY_ENV};
