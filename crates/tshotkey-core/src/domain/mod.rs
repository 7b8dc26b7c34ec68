//! Domain entities for tshotkeytrigger.
//!
//! # What lives here (for beginners)
//!
//! The domain layer holds the rules of a trigger run and nothing else:
//!
//! - **`credential`** – the API key type and the port through which it is
//!   loaded and saved.  The port is a trait; the file-backed implementation
//!   lives in the binary crate.
//! - **`error`** – the exit-code taxonomy every failure is mapped onto.
//! - **`session`** – the connection lifecycle state machine.  It never touches
//!   a socket itself: the transport calls into it with events and it answers
//!   through the [`session::Transport`] trait.
//!
//! Nothing in this module performs I/O, so every rule can be unit-tested with
//! mocks.

pub mod credential;
pub mod error;
pub mod session;
