//! autoclick-platform: platform-specific I/O boundary for autoclick.
//!
//! This crate provides:
//! - Input injection (mouse click simulation) via `enigo`, behind the
//!   core crate's `ClickInjector`/`CursorProbe` traits
//! - The process-global input hook via `rdev`, feeding key edges to
//!   the hotkey trigger and pointer presses to the location picker
//!
//! ## Module Structure
//!
//! - `error` - Common error types
//! - `injector` - Input injection (shared implementation using enigo)
//! - `hook` - Global input event hook with subscriber fan-out

mod error;
mod hook;
mod injector;

pub use error::{PlatformError, PlatformResult};
pub use hook::{global_input_hook, InputHook};
pub use injector::{EnigoInjector, NoopInjector};
