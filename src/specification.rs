//! The informal specification of the XML-over-TCP USSD gateway protocol.

// Frame layout:
// ```text
// | session_id | total_length |    body    |
// |    16B     |     16B      |  variable  |
// |       <- header ->        |
// |               <- frame ->              |
// ```
//
// `session_id` is an opaque 16-byte correlation token; it is carried
// verbatim and never interpreted as text.
//
// `total_length` is the length of the whole frame (header included),
// encoded as a base-10 ASCII string left-padded with zeros to 16 bytes.
//
// The body is an XML document. Its root tag names the packet type and its
// direct children are flat name/text field pairs.
pub(crate) const SESSION_ID_LEN: usize = 16;
pub(crate) const LENGTH_FIELD_LEN: usize = 16;
pub(crate) const HEADER_LEN: usize = SESSION_ID_LEN + LENGTH_FIELD_LEN;

// The gateway documentation places no bound on the declared frame length,
// but a 16-digit decimal field can claim petabytes. Anything past this cap
// is treated as stream corruption rather than buffered.
pub(crate) const BODY_MAX_LEN: usize = 65536;

// Data requests and responses carry a 'dcs' (data coding scheme) field.
// '15' is ASCII and is the only value the gateway documentation mentions.
pub(crate) const DATA_CODING_SCHEME: &str = "15";

// The 'phase' field is mandatory and fixed to '2'. The gateway
// documentation offers no other values.
pub(crate) const PHASE: &str = "2";

// 'msgtype' on an outbound USSDResponse: '2' keeps the session open,
// '6' terminates it.
pub(crate) const MSGTYPE_CONTINUE: &str = "2";
pub(crate) const MSGTYPE_END: &str = "6";

pub(crate) const END_OF_SESSION_CONTINUE: &str = "0";
pub(crate) const END_OF_SESSION_END: &str = "1";

// 'enqCmd' values for the enquire-link exchange.
pub(crate) const ENQUIRE_LINK_CMD: &str = "ENQUIRELINK";
pub(crate) const ENQUIRE_LINK_RSP_CMD: &str = "ENQUIRELINKRSP";
