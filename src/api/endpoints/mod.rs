//! API endpoint handlers.

pub mod health;
pub mod patients;
pub mod sync;
