//! Edit the launch options Steam stores for a game on the active local account.
//!
//! The pieces, leaf first: [`vdf`] reads and writes Steam's text config format,
//! [`process`] checks whether the Steam client is running, [`account`] finds the
//! account that logged in last, [`gate`] holds the operator until Steam is closed and
//! [`patch`] does the backup-then-rewrite of `localconfig.vdf`.

pub mod account;
pub mod config;
pub mod error;
pub mod gate;
pub mod patch;
pub mod process;
pub mod report;
pub mod vdf;
