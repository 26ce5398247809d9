//! Utilities shared by the authentication resolver crates.

#![warn(clippy::pedantic)]

/// Module for injectable wall-clock sources
pub mod clock;

/// Module for JWT utilities (size limits, unverified decoding, time claims)
pub mod jwt;

/// Module for secret types that prevent accidental logging
pub mod secret;
