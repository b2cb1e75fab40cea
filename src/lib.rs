//! Ordered regex routing.
//!
//! A [`Router`] tries each of its patterns against the path of an incoming
//! URL, in the order they were given, and returns the service of the first
//! one that matches along with the URL rewritten relative to the match.

mod router;

pub use router::{Match, Router};
