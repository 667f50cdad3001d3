#![cfg_attr(not(any(test, feature = "test")), no_std)]

#[doc(hidden)]
pub mod imp;
mod logger;

pub use ksync_core::critical;

pub use self::{
    imp::{set_console, Output},
    logger::init as init_logger,
};
