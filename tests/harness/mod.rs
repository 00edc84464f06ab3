//! Shared helpers for the integration tests.
//!
//! [`TestServer`] runs a `WebSocketServer` on a random loopback port.
//! [`RawPeer`] speaks bytes directly, for peers that misbehave on purpose.

#![allow(dead_code)]

mod client;
mod server;

pub use client::RawPeer;
pub use server::{RawServer, TestServer, echo};

use std::time::Duration;

/// Upper bound for anything a test waits on.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Build an unmasked server-to-client frame.
pub fn server_frame(opcode: u8, payload: &[u8]) -> Vec<u8> {
    assert!(payload.len() <= 125, "test frames are small");
    let mut frame = vec![0x80 | opcode, payload.len() as u8];
    frame.extend_from_slice(payload);
    frame
}

/// Build a masked client-to-server frame.
pub fn client_frame(opcode: u8, payload: &[u8]) -> Vec<u8> {
    assert!(payload.len() <= 125, "test frames are small");
    let mask = [0x11, 0x22, 0x33, 0x44];
    let mut frame = vec![0x80 | opcode, 0x80 | payload.len() as u8];
    frame.extend_from_slice(&mask);
    frame.extend(payload.iter().enumerate().map(|(i, b)| b ^ mask[i % 4]));
    frame
}
