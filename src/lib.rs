//! Ussdwire is a client-side implementation of the length-prefixed
//! XML-over-TCP protocol spoken by carrier USSD gateways, covering frame
//! parsing, packet validation, the login handshake, and response
//! construction.
//!
//! ## Quick Start
//!
//! Ussdwire provides two interfaces: [`UssdClient`] and [`UssdStream`].
//!
//! * [`UssdClient`]
//!
//!   The `UssdClient` is a deterministic state machine implementation of
//!   the protocol logic, following the sans-I/O principle. It does not
//!   include any network I/O code or spawn internal threads: wire bytes go
//!   in through [`UssdClient::feed`], decoded protocol events come out of
//!   [`UssdClient::poll_event`], and queued outbound packets are drained
//!   with [`UssdClient::write_wire`].
//!
//!   When using `UssdClient`, it needs to be bound to a reliable, ordered
//!   stream such as a [`TcpStream`]; the [`UssdClient::read_wire`] pump
//!   accepts any [`Read`] implementation. `UssdClient` does not restrict
//!   the type of underlying transport, but gateways speak TCP.
//!
//! * [`UssdStream`]
//!
//!   For convenient use in asynchronous scenarios, Ussdwire provides a
//!   ready-to-use asynchronous connection based on tokio. It offers a
//!   future-based API: [`UssdStream::next_event`] drives the connection
//!   until the gateway produces something worth acting on. `UssdStream`
//!   requires the underlying transport to implement the [`AsyncRead`] and
//!   [`AsyncWrite`] traits and the `tokio-stream-impl` feature to be
//!   enabled.
//!
//! ## Protocol Shape
//!
//! Every frame on the wire is a 32-byte header (a 16-byte opaque session
//! id plus a 16-character zero-padded decimal total length) followed by a
//! flat XML document whose root tag names the packet type. The client
//! authenticates with an `AUTHRequest` immediately after connecting; the
//! gateway then initiates `USSDRequest` exchanges which the caller answers
//! through [`UssdResponse`] values. Either side may probe the other with
//! enquire-link heartbeats.
//!
//! Inbound packets are validated against a strict per-type field schema.
//! Invalid packets are logged and dropped without closing the connection;
//! only an unparseable byte stream is fatal. See the [`error`] module for
//! the full taxonomy.
//!
//! ## Configuration
//!
//! Ussdwire provides the [`Config`] struct to set up the gateway account
//! used by [`UssdClient`] and [`UssdStream`]: the account credentials and
//! the gateway-assigned application id. Note that the wire protocol
//! transmits credentials as plaintext XML; if the link to the gateway is
//! untrusted, wrap the TCP stream in a transport-level encryption layer.
//!
//! For detailed configuration options, refer to the documentation of the
//! [`config`] module.
//!
//! [`Read`]: std::io::Read
//! [`TcpStream`]: std::net::TcpStream
//! [`AsyncRead`]: tokio::io::AsyncRead
//! [`AsyncWrite`]: tokio::io::AsyncWrite
//! [`UssdClient`]: UssdClient
//! [`UssdStream`]: UssdStream
#![warn(missing_debug_implementations, missing_docs, unreachable_pub)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![forbid(unsafe_code)]

pub mod config;
pub mod error;

mod codec;
mod framing;
mod packet;
mod specification;
mod state_machine;

#[cfg(feature = "tokio-stream-impl")]
#[cfg_attr(docsrs, doc(cfg(feature = "tokio-stream-impl")))]
mod tokio_stream_impl;

pub use config::Config;
pub use error::Error;

pub use packet::{
    AuthRequest, AuthResponse, EnquireLinkRequest, EnquireLinkResponse, Packet, SessionId,
    UssdRequest, UssdResponse,
};
pub use state_machine::{Event, UssdClient};
#[cfg(feature = "tokio-stream-impl")]
pub use tokio_stream_impl::UssdStream;

#[cfg(test)]
mod test {
    use std::io::{self, ErrorKind, Read, Write};

    /// In-memory transport double for exercising the wire pumps: reads
    /// drain the front of `buf`, an empty buffer reads as `WouldBlock`,
    /// and writes append.
    #[derive(Debug, Default)]
    pub(crate) struct MockStream {
        pub(crate) buf: Vec<u8>,
    }

    impl Read for MockStream {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.buf.is_empty() {
                return Err(io::Error::new(ErrorKind::WouldBlock, "empty buffer"));
            }
            let n = core::cmp::min(buf.len(), self.buf.len());
            buf[..n].copy_from_slice(&self.buf[..n]);
            self.buf = self.buf.split_off(n);
            Ok(n)
        }
    }

    impl Write for MockStream {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.buf.extend(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }
}
