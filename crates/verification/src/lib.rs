//! Verification utilities for blur-wgpu
//!
//! This crate checks the wgpu device against the software reference device by
//! blurring the same image on both and comparing the surfaces.

pub mod compare;
pub mod engine;
