//! Database query functions organized by table.

pub mod chunks;
pub mod payments;
pub mod placements;
pub mod shields;
pub mod stamps;
pub mod wallets;
