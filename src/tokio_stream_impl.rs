use std::io::{self, ErrorKind};

use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    time::{Duration, timeout},
};

use crate::{
    config::Config,
    packet::{SessionId, UssdResponse},
    state_machine::{Event, UssdClient},
};

/// Asynchronous USSD gateway connection based on the `Tokio` runtime.
///
/// [`UssdStream`] wraps a [`UssdClient`] around an underlying transport
/// implementing [`AsyncRead`] and [`AsyncWrite`] (e.g. [`TcpStream`]) and
/// drives it with a future-based API: [`next_event`] flushes queued
/// outbound packets, reads from the transport, and resolves with the next
/// protocol [`Event`].
///
/// The login packet queued at construction is transmitted by the first
/// call that touches the wire, so a freshly connected stream only needs
/// `next_event` to be awaited for the handshake to proceed.
///
/// [`TcpStream`]: tokio::net::TcpStream
/// [`next_event`]: UssdStream::next_event
#[derive(Debug)]
pub struct UssdStream<IO> {
    stream: IO,
    client: UssdClient,
}

impl<IO> UssdStream<IO> {
    /// Creates a new [`UssdStream`] instance from the underlying `stream`
    /// and the given `config`.
    ///
    /// For details on constructing `config`, refer to the [`config`]
    /// module.
    ///
    /// [`config`]: crate::config
    pub fn with_config_in(config: Config, stream: IO) -> Self {
        Self {
            stream,
            client: UssdClient::with_config(config),
        }
    }

    /// Creates a new [`UssdStream`] instance from the underlying `stream`,
    /// the given `config` and a 32-byte random seed.
    ///
    /// This method can be used when you need deterministic construction,
    /// e.g. in tests. For general use the `with_config_in` method is
    /// recommended: ids must not collide across connections.
    pub fn with_config_and_random_in(config: Config, random: [u8; 32], stream: IO) -> Self {
        Self {
            stream,
            client: UssdClient::with_config_and_random(config, random),
        }
    }

    /// Returns true once the gateway has acknowledged the login.
    pub fn is_authenticated(&self) -> bool {
        self.client.is_authenticated()
    }

    /// Returns a reference to the internal stream.
    pub fn inner_stream(&self) -> &IO {
        &self.stream
    }

    /// Returns a mutable reference to the inner stream.
    pub fn inner_stream_mut(&mut self) -> &mut IO {
        &mut self.stream
    }
}

impl<IO> UssdStream<IO>
where
    IO: AsyncRead + AsyncWrite + Unpin,
{
    /// Drives the connection until the next protocol event.
    ///
    /// Queued outbound packets (the login on the first call, enquire-link
    /// replies afterwards) are flushed before each read. Resolves with
    /// `Ok(None)` when the gateway closes the connection cleanly.
    ///
    /// # Errors
    ///
    /// Transport errors are propagated as-is. Protocol errors arrive as an
    /// [`io::Error`] of kind `Other` wrapping an [`Error`]; both are
    /// fatal, and the connection should be dropped.
    ///
    /// [`Error`]: crate::error::Error
    pub async fn next_event(&mut self) -> io::Result<Option<Event>> {
        loop {
            if let Some(event) = self.client.poll_event() {
                return Ok(Some(event));
            }
            self.flush_outbound().await?;
            let mut chunk = [0u8; 4096];
            let n = self.stream.read(&mut chunk).await?;
            if n == 0 {
                return Ok(None);
            }
            self.client.feed(&chunk[..n])?;
        }
    }

    /// Like [`next_event`], but gives up after `limit` of wire silence.
    ///
    /// A timeout resolves to an [`io::Error`] of kind `TimedOut`. The
    /// dropped read future may have flushed a partial packet, so a timed
    /// out stream must not be reused; probe a suspect but live peer with
    /// [`send_enquire_link`] before its idle limit instead.
    ///
    /// [`next_event`]: UssdStream::next_event
    /// [`send_enquire_link`]: UssdStream::send_enquire_link
    pub async fn next_event_or_timeout(&mut self, limit: Duration) -> io::Result<Option<Event>> {
        match timeout(limit, self.next_event()).await {
            Ok(result) => result,
            Err(_) => Err(io::Error::new(ErrorKind::TimedOut, "gateway idle timeout")),
        }
    }

    /// Transmits a `USSDResponse` answering a gateway-initiated request.
    ///
    /// # Errors
    ///
    /// Contract violations (response before login, empty required field)
    /// are surfaced as an [`io::Error`] of kind `Other` without touching
    /// the wire; transport errors are propagated as-is.
    pub async fn send_response(
        &mut self,
        session_id: SessionId,
        response: UssdResponse,
    ) -> io::Result<()> {
        self.client.send_ussd_response(session_id, response)?;
        self.flush_outbound().await
    }

    /// Transmits an enquire-link heartbeat.
    ///
    /// The gateway's answer is surfaced by [`next_event`] as
    /// [`Event::EnquireLinkAcked`].
    ///
    /// [`next_event`]: UssdStream::next_event
    pub async fn send_enquire_link(&mut self) -> io::Result<()> {
        self.client.send_enquire_link();
        self.flush_outbound().await
    }

    async fn flush_outbound(&mut self) -> io::Result<()> {
        let pending = self.client.take_outbound();
        if pending.is_empty() {
            return Ok(());
        }
        self.stream.write_all(&pending).await?;
        self.stream.flush().await
    }
}
