//! Use cases over the domain ports.
//!
//! Services open a unit of work per operation. The `*_in` functions run inside
//! a caller's unit so a provider callback can commit a payment transition and
//! the boxes it triggers together.

pub mod allocator;
pub mod engine;
pub mod inventory;
pub mod ledger;
pub mod payments;
pub mod providers;
pub mod subscriptions;
