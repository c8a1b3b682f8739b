//! SeaORM entities.

pub mod identity;
pub mod session;
