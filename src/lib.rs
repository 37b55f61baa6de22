//! Deskmate: a personal assistant over your inbox, calendar and tasks.
//!
//! Signs in against a Google account, gathers unread mail, upcoming
//! events and pending tasks, and answers questions through a hosted
//! language model. When the model has enough detail it asks for a
//! calendar event or a task, which the dispatcher creates on the user's
//! behalf.
//!
//! See `DESIGN.md` for the architecture notes.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod credentials;
pub mod logging;

pub mod google;
pub mod providers;

pub mod assistant;
pub mod context;
pub mod conversation;
pub mod session;

pub mod format;
