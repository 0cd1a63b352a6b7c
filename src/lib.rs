//! Virtual trading backend: users hold a simulated cash balance and trade
//! against live market prices. The core is the order execution and ledger
//! engine; everything else is a thin surface around it.

pub mod api;
pub mod charges;
pub mod error;
pub mod execution;
pub mod ledger;
pub mod oracle;
pub mod persistence;
pub mod positions;
pub mod types;
