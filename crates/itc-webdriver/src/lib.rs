//! ITC WebDriver - browser backend for the image-target compiler
//!
//! Implements [`itc_core::SurfaceFactory`] on top of any W3C WebDriver
//! server. Every surface is a fresh browser session whose blank top-level
//! page hosts the tool in an off-screen iframe carrying the requested
//! sandbox attribute.
//!
//! # Example
//!
//! ```rust,ignore
//! use itc_core::{CompilerConfig, ImageTargetCompiler};
//! use itc_webdriver::{WebDriverConfig, WebDriverSurfaceFactory};
//! use std::sync::Arc;
//!
//! let factory = WebDriverSurfaceFactory::new(WebDriverConfig::new("http://localhost:9515"));
//! let compiler = ImageTargetCompiler::new(CompilerConfig::new(), Arc::new(factory));
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod client;
pub mod config;
pub mod error;
mod scripts;
pub mod surface;

pub use client::{FrameTarget, WebDriverClient};
pub use config::{Browser, WebDriverConfig};
pub use error::WebDriverError;
pub use surface::{WebDriverSurface, WebDriverSurfaceFactory};
