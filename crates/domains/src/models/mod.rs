//! # Domain Models
//!
//! These structs represent the core entities of learnhub.
//! We use UUID v7 for time-ordered, globally unique identification.

mod comment;
mod content;
mod engagement;
mod session;
mod user;

pub use comment::*;
pub use content::*;
pub use engagement::*;
pub use session::*;
pub use user::*;
