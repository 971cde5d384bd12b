use core::fmt;

use rand::{Rng, rngs::StdRng};

use crate::{
    error::{ContractViolation, RejectReason},
    specification::{
        DATA_CODING_SCHEME, END_OF_SESSION_CONTINUE, END_OF_SESSION_END, ENQUIRE_LINK_CMD,
        ENQUIRE_LINK_RSP_CMD, MSGTYPE_CONTINUE, MSGTYPE_END, PHASE, SESSION_ID_LEN,
    },
};

pub(crate) const AUTH_REQUEST_TAG: &str = "AUTHRequest";
pub(crate) const AUTH_RESPONSE_TAG: &str = "AUTHResponse";
pub(crate) const USSD_REQUEST_TAG: &str = "USSDRequest";
pub(crate) const USSD_RESPONSE_TAG: &str = "USSDResponse";
pub(crate) const ENQ_REQUEST_TAG: &str = "ENQRequest";
pub(crate) const ENQ_RESPONSE_TAG: &str = "ENQResponse";

/// A 16-byte opaque token correlating one request/response exchange.
///
/// The client generates fresh random ids for packets it initiates and
/// echoes the id it received when answering a gateway-initiated request.
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct SessionId([u8; SESSION_ID_LEN]);

impl SessionId {
    /// Generates a fresh random session id.
    pub(crate) fn fresh(rng: &mut StdRng) -> Self {
        Self(rng.random())
    }

    /// Returns the raw 16 bytes of the id.
    pub fn as_bytes(&self) -> &[u8; SESSION_ID_LEN] {
        &self.0
    }
}

impl From<[u8; SESSION_ID_LEN]> for SessionId {
    fn from(bytes: [u8; SESSION_ID_LEN]) -> Self {
        Self(bytes)
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionId(")?;
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        write!(f, ")")
    }
}

/// The closed set of packet types this client exchanges with the gateway.
///
/// The variant is determined by the XML root tag; each variant carries its
/// own validated field schema.
#[derive(Clone, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum Packet {
    /// Client-initiated login request.
    AuthRequest(AuthRequest),
    /// Gateway reply completing the login handshake.
    AuthResponse(AuthResponse),
    /// Gateway-initiated interactive session data request.
    UssdRequest(UssdRequest),
    /// Client reply to a [`UssdRequest`].
    UssdResponse(UssdResponse),
    /// Enquire-link heartbeat request.
    EnquireLinkRequest(EnquireLinkRequest),
    /// Enquire-link heartbeat reply.
    EnquireLinkResponse(EnquireLinkResponse),
}

/// Login request fields, transmitted as plaintext XML.
///
/// Plaintext credentials are a property of the wire protocol, not of this
/// client; layer transport encryption underneath if the link needs it.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AuthRequest {
    /// Fresh random request id.
    pub request_id: String,
    /// Gateway account name.
    pub username: String,
    /// Gateway account password.
    pub password: String,
    /// Gateway-assigned application id.
    pub application_id: String,
}

/// Login response fields.
///
/// Beyond its structural validity, the payload is not interpreted: any
/// well-formed `AUTHResponse` completes the handshake.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AuthResponse {
    /// Echo of the login request id.
    pub request_id: String,
    /// Free-form gateway status text.
    pub auth_msg: String,
}

/// A validated inbound USSD data request.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct UssdRequest {
    /// Gateway-assigned request id.
    pub request_id: String,
    /// Subscriber number the session belongs to.
    pub msisdn: String,
    /// Gateway-assigned client id, echoed in the response.
    pub client_id: String,
    /// The star code the subscriber dialled.
    pub star_code: String,
    /// Message type indicator.
    pub msgtype: String,
    /// Protocol phase, fixed to `"2"` by the gateway.
    pub phase: String,
    /// Data coding scheme of `userdata`.
    pub dcs: String,
    /// The subscriber's input text.
    pub userdata: String,
    /// `"1"` when this request terminates the session. Defaulted to `"1"`
    /// when the gateway omits the field.
    pub end_of_session: String,
}

/// An outbound USSD data response.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct UssdResponse {
    /// Echo of the request id being answered.
    pub request_id: String,
    /// Subscriber number, echoed from the request.
    pub msisdn: String,
    /// Star code, echoed from the request.
    pub star_code: String,
    /// Client id, echoed from the request.
    pub client_id: String,
    /// Protocol phase. Defaults to `"2"`.
    pub phase: String,
    /// Message type: `"2"` continues the session, `"6"` ends it.
    pub msgtype: String,
    /// Data coding scheme. Defaults to `"15"` (ASCII).
    pub dcs: String,
    /// The text to present to the subscriber.
    pub userdata: String,
    /// `"0"` to continue the session, `"1"` to end it.
    pub end_of_session: String,
}

/// Enquire-link heartbeat request fields.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EnquireLinkRequest {
    /// Fresh random request id.
    pub request_id: String,
    /// Enquire-link command, `"ENQUIRELINK"`.
    pub enq_cmd: String,
}

/// Enquire-link heartbeat reply fields.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EnquireLinkResponse {
    /// Echo of the enquire-link request id.
    pub request_id: String,
    /// Enquire-link command, `"ENQUIRELINKRSP"`.
    pub enq_cmd: String,
}

impl Packet {
    /// The XML root tag for this packet type.
    pub fn tag(&self) -> &'static str {
        match self {
            Packet::AuthRequest(_) => AUTH_REQUEST_TAG,
            Packet::AuthResponse(_) => AUTH_RESPONSE_TAG,
            Packet::UssdRequest(_) => USSD_REQUEST_TAG,
            Packet::UssdResponse(_) => USSD_RESPONSE_TAG,
            Packet::EnquireLinkRequest(_) => ENQ_REQUEST_TAG,
            Packet::EnquireLinkResponse(_) => ENQ_RESPONSE_TAG,
        }
    }

    /// Parses and validates a decoded body against the tag's field schema.
    ///
    /// The schema is a strict allowlist: a packet carrying any field
    /// outside its type's mandatory and optional sets is rejected, as is
    /// one missing a mandatory field. An inbound `USSDRequest` with no
    /// `EndofSession` has it defaulted to `"1"`.
    pub fn from_wire(tag: &str, fields: &[(String, String)]) -> Result<Packet, RejectReason> {
        match tag {
            AUTH_REQUEST_TAG => {
                validate_fields(
                    AUTH_REQUEST_TAG,
                    fields,
                    &["requestId", "userName", "passWord", "applicationId"],
                    &[],
                )?;
                Ok(Packet::AuthRequest(AuthRequest {
                    request_id: take(fields, "requestId"),
                    username: take(fields, "userName"),
                    password: take(fields, "passWord"),
                    application_id: take(fields, "applicationId"),
                }))
            }
            AUTH_RESPONSE_TAG => {
                validate_fields(AUTH_RESPONSE_TAG, fields, &["requestId", "authMsg"], &[])?;
                Ok(Packet::AuthResponse(AuthResponse {
                    request_id: take(fields, "requestId"),
                    auth_msg: take(fields, "authMsg"),
                }))
            }
            USSD_REQUEST_TAG => {
                validate_fields(
                    USSD_REQUEST_TAG,
                    fields,
                    &[
                        "requestId", "msisdn", "clientId", "starCode", "msgtype", "phase",
                        "dcs", "userdata",
                    ],
                    &["EndofSession"],
                )?;
                let end_of_session = match lookup(fields, "EndofSession") {
                    Some(value) => value.to_owned(),
                    // Absent EndofSession means the gateway considers the
                    // session over.
                    None => END_OF_SESSION_END.to_owned(),
                };
                Ok(Packet::UssdRequest(UssdRequest {
                    request_id: take(fields, "requestId"),
                    msisdn: take(fields, "msisdn"),
                    client_id: take(fields, "clientId"),
                    star_code: take(fields, "starCode"),
                    msgtype: take(fields, "msgtype"),
                    phase: take(fields, "phase"),
                    dcs: take(fields, "dcs"),
                    userdata: take(fields, "userdata"),
                    end_of_session,
                }))
            }
            USSD_RESPONSE_TAG => {
                validate_fields(
                    USSD_RESPONSE_TAG,
                    fields,
                    &[
                        "requestId", "msisdn", "starCode", "clientId", "phase", "msgtype",
                        "dcs", "userdata", "EndofSession",
                    ],
                    &[],
                )?;
                Ok(Packet::UssdResponse(UssdResponse {
                    request_id: take(fields, "requestId"),
                    msisdn: take(fields, "msisdn"),
                    star_code: take(fields, "starCode"),
                    client_id: take(fields, "clientId"),
                    phase: take(fields, "phase"),
                    msgtype: take(fields, "msgtype"),
                    dcs: take(fields, "dcs"),
                    userdata: take(fields, "userdata"),
                    end_of_session: take(fields, "EndofSession"),
                }))
            }
            ENQ_REQUEST_TAG => {
                validate_fields(ENQ_REQUEST_TAG, fields, &["requestId", "enqCmd"], &[])?;
                Ok(Packet::EnquireLinkRequest(EnquireLinkRequest {
                    request_id: take(fields, "requestId"),
                    enq_cmd: take(fields, "enqCmd"),
                }))
            }
            ENQ_RESPONSE_TAG => {
                validate_fields(ENQ_RESPONSE_TAG, fields, &["requestId", "enqCmd"], &[])?;
                Ok(Packet::EnquireLinkResponse(EnquireLinkResponse {
                    request_id: take(fields, "requestId"),
                    enq_cmd: take(fields, "enqCmd"),
                }))
            }
            _ => Err(RejectReason::UnknownPacketType {
                tag: tag.to_owned(),
            }),
        }
    }

    /// The ordered wire field list for this packet.
    ///
    /// Order is significant: the gateway expects fields in exactly this
    /// sequence even though XML does not require it.
    pub fn wire_fields(&self) -> Vec<(&'static str, &str)> {
        match self {
            Packet::AuthRequest(p) => vec![
                ("requestId", p.request_id.as_str()),
                ("userName", p.username.as_str()),
                ("passWord", p.password.as_str()),
                ("applicationId", p.application_id.as_str()),
            ],
            Packet::AuthResponse(p) => vec![
                ("requestId", p.request_id.as_str()),
                ("authMsg", p.auth_msg.as_str()),
            ],
            Packet::UssdRequest(p) => vec![
                ("requestId", p.request_id.as_str()),
                ("msisdn", p.msisdn.as_str()),
                ("clientId", p.client_id.as_str()),
                ("starCode", p.star_code.as_str()),
                ("msgtype", p.msgtype.as_str()),
                ("phase", p.phase.as_str()),
                ("dcs", p.dcs.as_str()),
                ("userdata", p.userdata.as_str()),
                ("EndofSession", p.end_of_session.as_str()),
            ],
            Packet::UssdResponse(p) => vec![
                ("requestId", p.request_id.as_str()),
                ("msisdn", p.msisdn.as_str()),
                ("starCode", p.star_code.as_str()),
                ("clientId", p.client_id.as_str()),
                ("phase", p.phase.as_str()),
                ("msgtype", p.msgtype.as_str()),
                ("dcs", p.dcs.as_str()),
                ("userdata", p.userdata.as_str()),
                ("EndofSession", p.end_of_session.as_str()),
            ],
            Packet::EnquireLinkRequest(p) => vec![
                ("requestId", p.request_id.as_str()),
                ("enqCmd", p.enq_cmd.as_str()),
            ],
            Packet::EnquireLinkResponse(p) => vec![
                ("requestId", p.request_id.as_str()),
                ("enqCmd", p.enq_cmd.as_str()),
            ],
        }
    }
}

impl UssdResponse {
    /// Builds a response with the protocol's derived-field rules applied.
    ///
    /// `end_session` selects `msgtype` (`"6"`/`"2"`) and `EndofSession`
    /// (`"1"`/`"0"`); `phase` and `dcs` take their protocol-fixed defaults.
    /// Use the `with_*` setters to override any of the derived fields.
    pub fn new(
        request_id: impl Into<String>,
        msisdn: impl Into<String>,
        star_code: impl Into<String>,
        client_id: impl Into<String>,
        userdata: impl Into<String>,
        end_session: bool,
    ) -> Self {
        let (msgtype, end_of_session) = if end_session {
            (MSGTYPE_END, END_OF_SESSION_END)
        } else {
            (MSGTYPE_CONTINUE, END_OF_SESSION_CONTINUE)
        };
        Self {
            request_id: request_id.into(),
            msisdn: msisdn.into(),
            star_code: star_code.into(),
            client_id: client_id.into(),
            phase: PHASE.to_owned(),
            msgtype: msgtype.to_owned(),
            dcs: DATA_CODING_SCHEME.to_owned(),
            userdata: userdata.into(),
            end_of_session: end_of_session.to_owned(),
        }
    }

    /// Builds a response answering `request`, echoing its correlation
    /// fields.
    pub fn reply_to(request: &UssdRequest, userdata: impl Into<String>, end_session: bool) -> Self {
        Self::new(
            request.request_id.clone(),
            request.msisdn.clone(),
            request.star_code.clone(),
            request.client_id.clone(),
            userdata,
            end_session,
        )
    }

    /// Overrides the derived `msgtype` field.
    pub fn with_msgtype(mut self, msgtype: impl Into<String>) -> Self {
        self.msgtype = msgtype.into();
        self
    }

    /// Overrides the default `phase` field.
    pub fn with_phase(mut self, phase: impl Into<String>) -> Self {
        self.phase = phase.into();
        self
    }

    /// Overrides the default `dcs` field.
    pub fn with_dcs(mut self, dcs: impl Into<String>) -> Self {
        self.dcs = dcs.into();
        self
    }

    /// Overrides the derived `EndofSession` field.
    pub fn with_end_of_session(mut self, end_of_session: impl Into<String>) -> Self {
        self.end_of_session = end_of_session.into();
        self
    }

    /// Checks that every field the gateway requires is present.
    ///
    /// An empty correlation or control field is a bug in the calling
    /// layer; the packet is never transmitted. `userdata` may be empty.
    pub(crate) fn check_required_fields(&self) -> Result<(), ContractViolation> {
        for (field, value) in [
            ("requestId", &self.request_id),
            ("msisdn", &self.msisdn),
            ("starCode", &self.star_code),
            ("clientId", &self.client_id),
            ("phase", &self.phase),
            ("msgtype", &self.msgtype),
            ("dcs", &self.dcs),
            ("EndofSession", &self.end_of_session),
        ] {
            if value.is_empty() {
                return Err(ContractViolation::EmptyField { field });
            }
        }
        Ok(())
    }
}

impl EnquireLinkRequest {
    pub(crate) fn with_request_id(request_id: String) -> Self {
        Self {
            request_id,
            enq_cmd: ENQUIRE_LINK_CMD.to_owned(),
        }
    }
}

impl EnquireLinkResponse {
    /// Answers an inbound enquire link, echoing its request id.
    pub(crate) fn answering(request: &EnquireLinkRequest) -> Self {
        Self {
            request_id: request.request_id.clone(),
            enq_cmd: ENQUIRE_LINK_RSP_CMD.to_owned(),
        }
    }
}

/// Applies the strict-allowlist schema rule.
///
/// Unexpected fields are checked before missing ones so the reject reason
/// points at protocol drift first.
fn validate_fields(
    tag: &'static str,
    fields: &[(String, String)],
    mandatory: &[&str],
    optional: &[&str],
) -> Result<(), RejectReason> {
    let unexpected: Vec<String> = fields
        .iter()
        .map(|(name, _)| name)
        .filter(|name| {
            !mandatory.contains(&name.as_str()) && !optional.contains(&name.as_str())
        })
        .cloned()
        .collect();
    if !unexpected.is_empty() {
        return Err(RejectReason::UnexpectedFields {
            tag,
            fields: unexpected,
        });
    }

    let missing: Vec<String> = mandatory
        .iter()
        .filter(|name| !fields.iter().any(|(n, _)| n == *name))
        .map(|name| (*name).to_owned())
        .collect();
    if !missing.is_empty() {
        return Err(RejectReason::MissingFields {
            tag,
            fields: missing,
        });
    }

    Ok(())
}

// A duplicated name resolves to its last occurrence, the value a
// map-insertion read of the same body would see.
fn lookup<'a>(fields: &'a [(String, String)], name: &str) -> Option<&'a str> {
    fields
        .iter()
        .rev()
        .find(|(n, _)| n == name)
        .map(|(_, v)| v.as_str())
}

/// Like [`lookup`], for fields validation has already proven present.
fn take(fields: &[(String, String)], name: &str) -> String {
    lookup(fields, name)
        .expect("field presence was validated")
        .to_owned()
}

#[cfg(test)]
mod test {
    use super::*;

    fn ussd_request_fields() -> Vec<(String, String)> {
        [
            ("requestId", "1291850641"),
            ("msisdn", "27845440001"),
            ("clientId", "441"),
            ("starCode", "120"),
            ("msgtype", "1"),
            ("phase", "2"),
            ("dcs", "15"),
            ("userdata", "*120*44#"),
        ]
        .iter()
        .map(|(n, v)| (n.to_string(), v.to_string()))
        .collect()
    }

    #[test]
    fn test_ussd_request_accepted_with_all_mandatory_fields() {
        let packet = Packet::from_wire(USSD_REQUEST_TAG, &ussd_request_fields()).unwrap();
        let Packet::UssdRequest(request) = packet else {
            panic!("wrong variant");
        };
        assert_eq!(request.msisdn, "27845440001");
        assert_eq!(request.userdata, "*120*44#");
    }

    #[test]
    fn test_ussd_request_defaults_end_of_session() {
        let packet = Packet::from_wire(USSD_REQUEST_TAG, &ussd_request_fields()).unwrap();
        let Packet::UssdRequest(request) = packet else {
            panic!("wrong variant");
        };
        assert_eq!(request.end_of_session, "1");
    }

    #[test]
    fn test_ussd_request_explicit_end_of_session_is_kept() {
        let mut fields = ussd_request_fields();
        fields.push(("EndofSession".to_string(), "0".to_string()));
        let Packet::UssdRequest(request) =
            Packet::from_wire(USSD_REQUEST_TAG, &fields).unwrap()
        else {
            panic!("wrong variant");
        };
        assert_eq!(request.end_of_session, "0");
    }

    #[test]
    fn test_ussd_request_missing_mandatory_field_is_rejected() {
        let fields: Vec<_> = ussd_request_fields()
            .into_iter()
            .filter(|(n, _)| n != "msisdn")
            .collect();
        assert_eq!(
            Packet::from_wire(USSD_REQUEST_TAG, &fields),
            Err(RejectReason::MissingFields {
                tag: USSD_REQUEST_TAG,
                fields: vec!["msisdn".to_string()],
            })
        );
    }

    #[test]
    fn test_ussd_request_unexpected_field_is_rejected() {
        let mut fields = ussd_request_fields();
        fields.push(("foo".to_string(), "bar".to_string()));
        assert_eq!(
            Packet::from_wire(USSD_REQUEST_TAG, &fields),
            Err(RejectReason::UnexpectedFields {
                tag: USSD_REQUEST_TAG,
                fields: vec!["foo".to_string()],
            })
        );
    }

    #[test]
    fn test_duplicated_field_resolves_to_last_value() {
        let mut fields = ussd_request_fields();
        fields.push(("userdata".to_string(), "second".to_string()));
        let Packet::UssdRequest(request) =
            Packet::from_wire(USSD_REQUEST_TAG, &fields).unwrap()
        else {
            panic!("wrong variant");
        };
        assert_eq!(request.userdata, "second");
    }

    #[test]
    fn test_auth_response_schema_is_strict() {
        let ok = vec![
            ("requestId".to_string(), "abc".to_string()),
            ("authMsg".to_string(), "SUCCESS".to_string()),
        ];
        assert!(matches!(
            Packet::from_wire(AUTH_RESPONSE_TAG, &ok),
            Ok(Packet::AuthResponse(_))
        ));

        let mut extra = ok.clone();
        extra.push(("sessionToken".to_string(), "x".to_string()));
        assert!(matches!(
            Packet::from_wire(AUTH_RESPONSE_TAG, &extra),
            Err(RejectReason::UnexpectedFields { .. })
        ));
    }

    #[test]
    fn test_unknown_tag_is_rejected() {
        assert_eq!(
            Packet::from_wire("PINGRequest", &[]),
            Err(RejectReason::UnknownPacketType {
                tag: "PINGRequest".to_string(),
            })
        );
    }

    #[test]
    fn test_response_derived_fields_for_end_of_session() {
        let response = UssdResponse::new("1", "27845440001", "120", "441", "Bye", true);
        assert_eq!(response.msgtype, "6");
        assert_eq!(response.end_of_session, "1");
        assert_eq!(response.phase, "2");
        assert_eq!(response.dcs, "15");
    }

    #[test]
    fn test_response_derived_fields_for_continued_session() {
        let response = UssdResponse::new("1", "27845440001", "120", "441", "Pick:", false);
        assert_eq!(response.msgtype, "2");
        assert_eq!(response.end_of_session, "0");
    }

    #[test]
    fn test_response_explicit_overrides_win() {
        let response = UssdResponse::new("1", "27845440001", "120", "441", "Hi", true)
            .with_msgtype("2")
            .with_end_of_session("0")
            .with_dcs("0")
            .with_phase("1");
        assert_eq!(response.msgtype, "2");
        assert_eq!(response.end_of_session, "0");
        assert_eq!(response.dcs, "0");
        assert_eq!(response.phase, "1");
    }

    #[test]
    fn test_response_wire_field_order_is_fixed() {
        let response = UssdResponse::new("1", "2", "3", "4", "Hi", true);
        let names: Vec<_> = Packet::UssdResponse(response)
            .wire_fields()
            .iter()
            .map(|(n, _)| *n)
            .collect();
        assert_eq!(
            names,
            [
                "requestId", "msisdn", "starCode", "clientId", "phase", "msgtype", "dcs",
                "userdata", "EndofSession",
            ]
        );
    }

    #[test]
    fn test_response_empty_required_field_fails_fast() {
        let response = UssdResponse::new("", "27845440001", "120", "441", "Hi", true);
        assert_eq!(
            response.check_required_fields(),
            Err(ContractViolation::EmptyField { field: "requestId" })
        );
        // Empty userdata is a legal response payload.
        let response = UssdResponse::new("1", "27845440001", "120", "441", "", true);
        assert_eq!(response.check_required_fields(), Ok(()));
    }

    #[test]
    fn test_enquire_link_reply_echoes_request_id() {
        let request = EnquireLinkRequest {
            request_id: "abc123".to_string(),
            enq_cmd: ENQUIRE_LINK_CMD.to_string(),
        };
        let reply = EnquireLinkResponse::answering(&request);
        assert_eq!(reply.request_id, "abc123");
        assert_eq!(reply.enq_cmd, ENQUIRE_LINK_RSP_CMD);
    }
}
