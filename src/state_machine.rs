use std::{
    collections::VecDeque,
    io::{self, Read, Write},
};

use rand::{
    Rng, SeedableRng, TryRngCore,
    rngs::{OsRng, StdRng},
};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    codec,
    config::Config,
    error::{ContractViolation, Error, FrameError, RejectReason},
    framing::{Frame, FrameReader},
    packet::{
        AuthRequest, EnquireLinkRequest, EnquireLinkResponse, Packet, SessionId, UssdRequest,
        UssdResponse,
    },
};

/// Something the gateway told us that the calling layer needs to act on.
#[derive(Clone, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum Event {
    /// The login handshake completed; data traffic may now flow.
    Authenticated,

    /// A validated inbound USSD request, ready for the external message
    /// pipeline. `EndofSession` is already defaulted.
    UssdReceived {
        /// The session id to echo when replying.
        session_id: SessionId,
        /// The validated request fields.
        request: UssdRequest,
    },

    /// The gateway answered an enquire link, proving the peer is alive.
    EnquireLinkAcked,
}

/// A deterministic state machine implementation of the client side of the
/// XML-over-TCP USSD gateway protocol, following the sans-I/O principle.
///
/// The client does not include any network I/O code. Bytes from the wire
/// go in through [`feed`] (or the [`read_wire`] pump), decoded protocol
/// events come out of [`poll_event`], and bytes to transmit accumulate in
/// an internal buffer drained by [`write_wire`]:
///
/// ```text
///      Protocol events                      Wire bytes
///      ===============                      ==========
///    poll_event()       +---------------+      feed() / read_wire()
///                       |               |
///            <----------+               <----------+
///                       |   UssdClient  |
///            +---------->               +---------->
///                       |               |
///    send_*()           +---------------+      write_wire()
/// ```
///
/// Construction immediately queues the `AUTHRequest` login packet, so the
/// first `write_wire` after connecting transmits the handshake. No inbound
/// `USSDRequest` is surfaced until the gateway's `AUTHResponse` arrives.
///
/// Fatal framing or codec errors poison the client: the frame stream has
/// no resynchronization mechanism, so the owning layer must drop the
/// connection and let its supervisor decide on reconnection.
///
/// [`feed`]: UssdClient::feed
/// [`read_wire`]: UssdClient::read_wire
/// [`write_wire`]: UssdClient::write_wire
/// [`poll_event`]: UssdClient::poll_event
#[derive(Debug)]
pub struct UssdClient {
    config: Config,
    auth_state: AuthState,
    reader: FrameReader,
    outbound: Vec<u8>,
    events: VecDeque<Event>,
    poisoned: bool,
    rng: StdRng,
}

impl UssdClient {
    /// Creates a new `UssdClient` with the specified `config` and queues
    /// the login packet.
    ///
    /// For details on constructing `config`, refer to the [`config`]
    /// module.
    ///
    /// [`config`]: crate::config
    pub fn with_config(config: Config) -> Self {
        let mut random = [0u8; 32];
        OsRng
            .try_fill_bytes(&mut random)
            .expect("system random source failure");
        Self::with_config_and_random(config, random)
    }

    /// Creates a new `UssdClient` with the specified `config` and a
    /// 32-byte random seed for session and request id generation.
    ///
    /// This method can be used when you need to deterministically
    /// construct a `UssdClient`, e.g. in tests. For general use the
    /// `with_config` method is recommended: ids must not collide across
    /// connections.
    pub fn with_config_and_random(config: Config, random: [u8; 32]) -> Self {
        let mut client = Self {
            config,
            auth_state: AuthState::Unauthenticated,
            reader: FrameReader::new(),
            outbound: Vec::new(),
            events: VecDeque::new(),
            poisoned: false,
            rng: StdRng::from_seed(random),
        };
        client.queue_login();
        client
    }

    /// Feeds a chunk of wire bytes into the client.
    ///
    /// Chunks may be of arbitrary size: a single chunk can hold several
    /// frames, and a frame may span many chunks. Every complete frame is
    /// decoded, validated, and dispatched before this call returns;
    /// resulting events are queued for [`poll_event`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Frame`] when the stream can no longer be parsed.
    /// This is fatal: the client is poisoned and all further calls fail
    /// with [`FrameError::StreamCorrupted`]. Schema rejections, unknown
    /// packet types, and pre-login data requests are not errors; they are
    /// logged and the packets dropped, and processing continues.
    ///
    /// [`poll_event`]: UssdClient::poll_event
    pub fn feed(&mut self, chunk: &[u8]) -> Result<(), Error> {
        if self.poisoned {
            return Err(FrameError::StreamCorrupted.into());
        }
        self.reader.push(chunk);
        loop {
            match self.reader.next_frame() {
                Ok(Some(frame)) => {
                    if let Err(e) = self.handle_frame(frame) {
                        self.poisoned = true;
                        return Err(e.into());
                    }
                }
                Ok(None) => return Ok(()),
                Err(e) => {
                    self.poisoned = true;
                    return Err(e.into());
                }
            }
        }
    }

    /// Takes the next queued protocol event, if any.
    pub fn poll_event(&mut self) -> Option<Event> {
        self.events.pop_front()
    }

    /// Returns true once the gateway has acknowledged the login.
    pub fn is_authenticated(&self) -> bool {
        self.auth_state == AuthState::Authenticated
    }

    /// Queues a `USSDResponse` answering a gateway-initiated request.
    ///
    /// The response is framed with the *same* session id as the request it
    /// answers; the gateway uses the id to correlate the exchange.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Contract`] if the login handshake has not
    /// completed or a required field is empty. Nothing is queued in either
    /// case; this signals a bug in the calling layer, not a network
    /// condition.
    pub fn send_ussd_response(
        &mut self,
        session_id: SessionId,
        response: UssdResponse,
    ) -> Result<(), Error> {
        if self.auth_state != AuthState::Authenticated {
            return Err(ContractViolation::ResponseBeforeLogin.into());
        }
        response.check_required_fields().map_err(Error::Contract)?;
        self.queue_packet(&session_id, &Packet::UssdResponse(response));
        Ok(())
    }

    /// Queues an enquire-link heartbeat with fresh session and request
    /// ids.
    ///
    /// The gateway answers with an `ENQResponse`, surfaced as
    /// [`Event::EnquireLinkAcked`]. The protocol itself specifies no
    /// heartbeat cadence; the calling layer decides when to probe a
    /// silent peer.
    pub fn send_enquire_link(&mut self) {
        let request = EnquireLinkRequest::with_request_id(self.fresh_request_id());
        let session_id = SessionId::fresh(&mut self.rng);
        self.queue_packet(&session_id, &Packet::EnquireLinkRequest(request));
    }

    /// Reads wire bytes from the `wire` into the client, returning how
    /// many bytes were read.
    ///
    /// A return of `Ok(0)` indicates the peer closed the connection;
    /// buffered partial frame state is meaningless from then on, as the
    /// protocol has no resumption mechanism.
    ///
    /// # Errors
    ///
    /// I/O errors from the `wire` (including `WouldBlock`) are propagated
    /// as-is and are recoverable by calling again. Protocol errors are
    /// returned as an [`io::Error`] of kind `Other` wrapping an
    /// [`Error`]; these are fatal.
    pub fn read_wire(&mut self, wire: &mut dyn Read) -> io::Result<usize> {
        let mut chunk = [0u8; 4096];
        let n = wire.read(&mut chunk)?;
        if n == 0 {
            return Ok(0);
        }
        self.feed(&chunk[..n])?;
        Ok(n)
    }

    /// Writes queued outbound packets to the `wire`, returning how many
    /// bytes were written.
    ///
    /// Returns `Ok(0)` when nothing is pending. Partial writes retain the
    /// unwritten tail for the next call.
    pub fn write_wire(&mut self, wire: &mut dyn Write) -> io::Result<usize> {
        let mut written = 0;
        while !self.outbound.is_empty() {
            match wire.write(&self.outbound) {
                Ok(0) => break,
                Ok(n) => {
                    self.outbound.drain(..n);
                    written += n;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(written)
    }

    #[cfg(feature = "tokio-stream-impl")]
    pub(crate) fn take_outbound(&mut self) -> Vec<u8> {
        core::mem::take(&mut self.outbound)
    }

    fn queue_login(&mut self) {
        let login = AuthRequest {
            request_id: self.fresh_request_id(),
            username: self.config.username.clone(),
            password: self.config.password.clone(),
            application_id: self.config.application_id.clone(),
        };
        // Login is client-initiated, so the session id is a fresh token;
        // the gateway does not correlate it with anything.
        let session_id = SessionId::fresh(&mut self.rng);
        self.queue_packet(&session_id, &Packet::AuthRequest(login));
    }

    fn queue_packet(&mut self, session_id: &SessionId, packet: &Packet) {
        let fields = packet.wire_fields();
        self.outbound
            .extend_from_slice(&codec::encode_frame(session_id, packet.tag(), &fields));
    }

    fn fresh_request_id(&mut self) -> String {
        Uuid::from_bytes(self.rng.random()).simple().to_string()
    }

    fn handle_frame(&mut self, frame: Frame) -> Result<(), FrameError> {
        let (tag, fields) = codec::decode_body(&frame.body)?;
        match Packet::from_wire(&tag, &fields) {
            Ok(packet) => self.dispatch(frame.session_id, packet),
            Err(reason) => {
                // No NACK semantics exist; the peer is never told.
                warn!(session_id = ?frame.session_id, %reason, "dropping invalid packet");
            }
        }
        Ok(())
    }

    fn dispatch(&mut self, session_id: SessionId, packet: Packet) {
        match packet {
            Packet::AuthResponse(response) => match self.auth_state {
                AuthState::Unauthenticated => {
                    self.auth_state = AuthState::Authenticated;
                    debug!(auth_msg = %response.auth_msg, "login handshake completed");
                    self.events.push_back(Event::Authenticated);
                }
                AuthState::Authenticated => {
                    warn!("dropping AUTHResponse on an already authenticated connection");
                }
            },
            Packet::UssdRequest(request) => {
                if self.auth_state == AuthState::Unauthenticated {
                    // Ordering guarantee: no application payload reaches
                    // the external pipeline before login completes.
                    warn!(
                        reason = %RejectReason::NotAuthenticated,
                        "dropping USSDRequest received before login completed",
                    );
                    return;
                }
                self.events.push_back(Event::UssdReceived {
                    session_id,
                    request,
                });
            }
            Packet::EnquireLinkRequest(request) => {
                debug!(request_id = %request.request_id, "answering enquire link");
                let reply = EnquireLinkResponse::answering(&request);
                self.queue_packet(&session_id, &Packet::EnquireLinkResponse(reply));
            }
            Packet::EnquireLinkResponse(_) => {
                self.events.push_back(Event::EnquireLinkAcked);
            }
            // Client-originated types; the gateway never sends them.
            Packet::AuthRequest(_) | Packet::UssdResponse(_) => {
                warn!(tag = packet.tag(), "dropping packet type the gateway should not send");
            }
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum AuthState {
    Unauthenticated,
    Authenticated,
}
