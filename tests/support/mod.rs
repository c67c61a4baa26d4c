#![allow(dead_code)]

pub mod chain;
pub mod fixtures;
pub mod port;
pub mod server;
pub mod wait;
