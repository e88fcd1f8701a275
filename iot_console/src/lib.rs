//! Internal modules for the IoT session console.
//!
//! This library provides command parsing, backend wiring, logging setup and
//! the interactive console used by the iot_console binary.

pub mod backend;
pub mod commands;
pub mod console;
pub mod logging;
