//! Gig records and the REST repository client.

pub mod client;
pub mod models;

pub use client::{GigClient, GigRepository};
pub use models::{Assignment, GentState, Gig, GigList, GigPatch, GigSeed, Identity};
