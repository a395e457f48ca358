//! monterm - terminal runtime for a live resource-monitoring dashboard
//!
//! monterm supplies the two layers every dashboard screen is built on:
//!
//! - **object**: class descriptors and explicit per-class dispatch
//!   (display, delete, compare) for list rows, meters and screens
//! - **crt**: the terminal runtime; raw mode, key remapping, input timing,
//!   signal-safe teardown and the semantic color registry
//!
//! # Quick Start
//!
//! ```no_run
//! use monterm::crt::{color::ColorScheme, Crt};
//! use monterm::object::{self, ListItem};
//! use monterm::rich_string::RichString;
//!
//! let mut crt = Crt::init(15, ColorScheme::DEFAULT)?;
//! let item = ListItem::new("sshd", 1);
//! let mut line = RichString::new();
//! object::display(&item, &mut line);
//! crt.draw(0, 0, &line)?;
//! crt.refresh()?;
//! let _key = crt.read_key()?;
//! crt.done();
//! # Ok::<(), monterm::error::CrtError>(())
//! ```

#[cfg(not(unix))]
compile_error!("monterm requires a Unix terminal");

pub mod config;
pub mod crt;
pub mod error;
pub mod object;
pub mod rich_string;
