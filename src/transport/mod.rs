//! Transport module - the byte stream under the serial API.
//!
//! Any full-duplex async byte stream works: a serial port, a TCP bridge to
//! one, or an in-memory `tokio::io::duplex` pipe in tests.

use tokio::io::{AsyncRead, AsyncWrite};

#[cfg(feature = "serial")]
mod serial;

#[cfg(feature = "serial")]
pub use serial::{open_serial, BAUD_RATE};

/// Byte stream a [`Controller`](crate::Controller) can run over.
pub trait Transport: AsyncRead + AsyncWrite + Send + 'static {}

impl<T> Transport for T where T: AsyncRead + AsyncWrite + Send + 'static {}
