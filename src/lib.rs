#![doc = include_str!("../README.md")]
#![deny(missing_docs)]
extern crate bitcoin;

pub mod coins;
pub mod config;
pub mod error;
pub mod estimate;
pub mod selection;
pub mod session;
pub mod utill;
pub mod view;
