//! HTTP handlers for the QuickCash API

pub mod admin;
pub mod loans;
pub mod payments;

pub use admin::*;
pub use loans::*;
pub use payments::*;
