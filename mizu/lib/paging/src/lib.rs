#![cfg_attr(not(test), no_std)]

mod addr;
mod consts;
mod kseg;
mod mask;
mod order;

pub use self::{addr::*, consts::*, kseg::*, mask::*, order::*};
