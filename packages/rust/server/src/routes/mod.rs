//! Route handlers, one module per resource.

pub mod assistant;
pub mod cards;
pub mod decks;
pub mod health;
pub mod users;
