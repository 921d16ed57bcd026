#![no_std]
#![allow(async_fn_in_trait)]

pub mod boot;
pub mod contract;
pub mod identity;
pub mod lifecycle;
pub mod mqtt;
pub mod platform;
pub mod retry;
pub mod selftest;
pub mod session;

#[cfg(test)]
pub(crate) mod testutil;

pub use boot::{maintain, run_boot, BootBudgets, BootConfig, BootSession, Capabilities, Services};
pub use lifecycle::StatusPhase;
