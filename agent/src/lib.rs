//! fwflash library
//!
//! HTTP agent that writes uploaded AVR firmware to a board through avrdude.

pub mod app;
pub mod errors;
pub mod filesys;
pub mod firmware;
pub mod flash;
pub mod hardware;
pub mod logs;
pub mod server;
pub mod storage;
pub mod utils;
