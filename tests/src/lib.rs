//! # Courier Test Suite
//!
//! Cross-crate scenarios that need a requester, a responder and a broker
//! at the same time.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! └── integration/
//!     ├── fixtures.rs        # Shared wiring
//!     ├── greetings_e2e.rs   # Greetings call, timeout, many callers
//!     ├── races.rs           # Replies racing publish and deadline
//!     └── delivery.rs        # Publish failure, dead letters, late responder
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p cr-tests
//! cargo test -p cr-tests integration::races::
//! ```

pub mod integration;
