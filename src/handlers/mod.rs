pub mod allocation;
pub mod general;
pub mod scores;
pub mod transfer;
