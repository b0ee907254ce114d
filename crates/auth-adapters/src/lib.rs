//! # auth-adapters
//!
//! Argon2 password hashing and random session tokens.

mod hasher;
mod token;

pub use hasher::Argon2PasswordHasher;
pub use token::RandomTokenGenerator;
