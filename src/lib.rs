//! # panicqr
//!
//! A QR code encoder that never allocates, for emitting diagnostic payloads from places where
//! allocation is not an option: panic handlers, fault handlers, early boot code.
//!
//! `panicqr` encodes a payload into a QR Code Model 2 symbol (versions 1 to 40) using only the
//! buffers the caller hands in. To stay small and predictable it supports a single error
//! correction level (Low) and a single mask (checkerboard), and it never picks a version on its
//! own during encoding.
//!
//! ## Features
//!
//! - Binary segments, and a dense numeric segment that packs 13 bits into 4 decimal digits so a
//!   payload can be appended to a URL at about 2.5% overhead.
//! - No allocation, no recursion, bounded stack usage in the encoder.
//! - Every buffer and capacity check happens before anything is written.
//! - Rendering to PNG, SVG, in-memory image buffers or the console with the `render` feature
//!   (enabled by default).
//! - Safe Rust implementation with no unsafe code.
//!
//! ## Installation
//!
//! Add to your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! panicqr = { version = "0.1", default-features = false } # encoder only
//! ```
//!
//! ## Example
//!
//! Encode a crash report behind a URL:
//!
//! ```rust
//! use panicqr::{generate, max_data_size, Version};
//!
//! let url = "https://example.com/crash?z=";
//! let report = b"panicked at src/main.rs:12:5: index out of bounds";
//!
//! let mut image = [0u8; Version::MAX.image_len()];
//! let mut tmp = [0u8; Version::MAX.work_len()];
//!
//! assert!(report.len() <= max_data_size(5, url.len()));
//! let width = generate(Some(url), report, 5, &mut image, &mut tmp);
//! assert_eq!(width, 37);
//! ```
//!
//! Render it as an in-memory image buffer:
//!
//! ```rust
//! use panicqr::helper::generate_image_buffer;
//!
//! let img = generate_image_buffer(None, b"Hello, World!", 2, 4).unwrap();
//! assert_eq!(img.width(), (25 + 8) * 4);
//! ```
//!
//! ## Modules
//!
//! - [`qrcode`]: Core QR code encoding functionality.
//! - [`helper`]: Utilities for rendering QR codes in various formats.

pub mod qrcode;
#[cfg(feature = "render")]
pub mod helper;

pub use qrcode::{fit_version, generate, generate_in_place, max_data_size, Segment, Version};
