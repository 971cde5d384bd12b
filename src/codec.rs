use quick_xml::{Reader, escape::escape, events::Event as XmlEvent};

use crate::{
    error::FrameError,
    packet::SessionId,
    specification::{BODY_MAX_LEN, HEADER_LEN, LENGTH_FIELD_LEN, SESSION_ID_LEN},
};

/// A decoded fixed-size frame header.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct FrameHeader {
    pub(crate) session_id: SessionId,
    pub(crate) body_len: usize,
}

/// Decodes the 32-byte frame header.
///
/// The session id is taken verbatim; the length field must be exactly
/// 16 ASCII decimal digits giving the total frame length, header included.
pub(crate) fn decode_header(buf: &[u8]) -> Result<FrameHeader, FrameError> {
    debug_assert_eq!(buf.len(), HEADER_LEN);

    let session_id = SessionId::from(
        <[u8; SESSION_ID_LEN]>::try_from(&buf[..SESSION_ID_LEN]).unwrap(),
    );

    let field = &buf[SESSION_ID_LEN..HEADER_LEN];
    if !field.iter().all(|b| b.is_ascii_digit()) {
        return Err(FrameError::LengthNotDecimal {
            received: String::from_utf8_lossy(field).into_owned(),
        });
    }
    // 16 decimal digits always fit in a u64.
    let declared: u64 = core::str::from_utf8(field)
        .expect("ASCII digits are valid UTF-8")
        .parse()
        .expect("ASCII digits parse as u64");

    if declared < HEADER_LEN as u64 {
        return Err(FrameError::LengthUnderflow {
            declared: declared as usize,
        });
    }
    let body_len = declared - HEADER_LEN as u64;
    if body_len > BODY_MAX_LEN as u64 {
        return Err(FrameError::BodyTooLarge {
            declared: body_len as usize,
        });
    }

    Ok(FrameHeader {
        session_id,
        body_len: body_len as usize,
    })
}

/// Encodes the 32-byte frame header for a body of `body_len` bytes.
pub(crate) fn encode_header(session_id: &SessionId, body_len: usize) -> [u8; HEADER_LEN] {
    let mut out = [0u8; HEADER_LEN];
    out[..SESSION_ID_LEN].copy_from_slice(session_id.as_bytes());
    let total = HEADER_LEN + body_len;
    let digits = format!("{:0width$}", total, width = LENGTH_FIELD_LEN);
    out[SESSION_ID_LEN..].copy_from_slice(digits.as_bytes());
    out
}

/// Encodes a packet body: a root element named `tag` with one child
/// element per `(name, value)` pair, in the given order.
///
/// Field order is preserved on the wire; the gateway is order-sensitive
/// even though XML itself is not.
pub(crate) fn encode_body(tag: &str, fields: &[(&str, &str)]) -> Vec<u8> {
    let mut out = Vec::with_capacity(64 + tag.len() * 2);
    out.push(b'<');
    out.extend_from_slice(tag.as_bytes());
    out.push(b'>');
    for (name, value) in fields {
        out.push(b'<');
        out.extend_from_slice(name.as_bytes());
        out.push(b'>');
        out.extend_from_slice(escape(*value).as_bytes());
        out.extend_from_slice(b"</");
        out.extend_from_slice(name.as_bytes());
        out.push(b'>');
    }
    out.extend_from_slice(b"</");
    out.extend_from_slice(tag.as_bytes());
    out.push(b'>');
    out
}

/// Decodes a packet body into `(packet_type, ordered field list)`.
///
/// Empty elements decode to empty values. Anything other than the flat
/// root-plus-field-children shape is rejected.
pub(crate) fn decode_body(body: &[u8]) -> Result<(String, Vec<(String, String)>), FrameError> {
    let mut reader = Reader::from_reader(body);

    let mut root: Option<String> = None;
    let mut closed_root = false;
    let mut current: Option<(String, String)> = None;
    let mut fields: Vec<(String, String)> = Vec::new();

    loop {
        match reader.read_event() {
            Err(e) => {
                return Err(FrameError::MalformedXml {
                    detail: e.to_string(),
                });
            }
            Ok(XmlEvent::Start(e)) => {
                let name = element_name(e.name().as_ref())?;
                if closed_root {
                    return Err(FrameError::UnexpectedXml {
                        detail: format!("element {} after the document root closed", name),
                    });
                }
                if root.is_none() {
                    root = Some(name);
                } else if current.is_none() {
                    current = Some((name, String::new()));
                } else {
                    return Err(FrameError::UnexpectedXml {
                        detail: format!("nested element {} inside a field", name),
                    });
                }
            }
            Ok(XmlEvent::Empty(e)) => {
                let name = element_name(e.name().as_ref())?;
                if closed_root {
                    return Err(FrameError::UnexpectedXml {
                        detail: format!("element {} after the document root closed", name),
                    });
                }
                if root.is_none() {
                    // An empty root carries no fields.
                    root = Some(name);
                    closed_root = true;
                } else if current.is_none() {
                    fields.push((name, String::new()));
                } else {
                    return Err(FrameError::UnexpectedXml {
                        detail: format!("nested element {} inside a field", name),
                    });
                }
            }
            Ok(XmlEvent::Text(t)) => {
                let text = t.unescape().map_err(|e| FrameError::MalformedXml {
                    detail: e.to_string(),
                })?;
                // Text outside a field element (e.g. whitespace around
                // children) carries no protocol meaning.
                if let Some((_, value)) = current.as_mut() {
                    value.push_str(&text);
                }
            }
            Ok(XmlEvent::CData(t)) => {
                let bytes = t.into_inner();
                let text =
                    core::str::from_utf8(&bytes).map_err(|e| FrameError::MalformedXml {
                        detail: e.to_string(),
                    })?;
                if let Some((_, value)) = current.as_mut() {
                    value.push_str(text);
                }
            }
            Ok(XmlEvent::End(_)) => match current.take() {
                Some(field) => fields.push(field),
                None => closed_root = true,
            },
            Ok(XmlEvent::Eof) => {
                let Some(tag) = root else {
                    return Err(FrameError::MalformedXml {
                        detail: "empty body".to_owned(),
                    });
                };
                if !closed_root || current.is_some() {
                    return Err(FrameError::MalformedXml {
                        detail: "truncated document".to_owned(),
                    });
                }
                return Ok((tag, fields));
            }
            // Declarations, comments and processing instructions carry no
            // protocol meaning.
            Ok(_) => {}
        }
    }
}

/// Serializes a complete frame: header followed by the XML body.
pub(crate) fn encode_frame(session_id: &SessionId, tag: &str, fields: &[(&str, &str)]) -> Vec<u8> {
    let body = encode_body(tag, fields);
    let header = encode_header(session_id, body.len());
    let mut frame = Vec::with_capacity(HEADER_LEN + body.len());
    frame.extend_from_slice(&header);
    frame.extend_from_slice(&body);
    frame
}

fn element_name(raw: &[u8]) -> Result<String, FrameError> {
    core::str::from_utf8(raw)
        .map(str::to_owned)
        .map_err(|e| FrameError::MalformedXml {
            detail: e.to_string(),
        })
}

#[cfg(test)]
mod test {
    use super::*;

    fn sid(byte: u8) -> SessionId {
        SessionId::from([byte; SESSION_ID_LEN])
    }

    #[test]
    fn test_header_round_trip() {
        for body_len in [0usize, 1, 52, 1024, BODY_MAX_LEN] {
            let header = encode_header(&sid(0xab), body_len);
            let decoded = decode_header(&header).unwrap();
            assert_eq!(decoded.session_id, sid(0xab));
            assert_eq!(decoded.body_len, body_len);
        }
    }

    #[test]
    fn test_header_length_is_zero_padded_ascii() {
        let header = encode_header(&sid(0x01), 20);
        assert_eq!(&header[..SESSION_ID_LEN], &[0x01; SESSION_ID_LEN]);
        assert_eq!(&header[SESSION_ID_LEN..], b"0000000000000052");
    }

    #[test]
    fn test_header_session_id_is_opaque() {
        // Session ids are raw bytes, not text; decoding must carry them
        // through untouched.
        let mut raw = [0u8; SESSION_ID_LEN];
        raw[0] = 0x00;
        raw[1] = 0xff;
        raw[2] = b'<';
        let header = encode_header(&SessionId::from(raw), 0);
        let decoded = decode_header(&header).unwrap();
        assert_eq!(decoded.session_id.as_bytes(), &raw);
    }

    #[test]
    fn test_header_rejects_non_decimal_length() {
        let mut header = encode_header(&sid(0), 10);
        header[SESSION_ID_LEN] = b'x';
        assert!(matches!(
            decode_header(&header),
            Err(FrameError::LengthNotDecimal { .. })
        ));
    }

    #[test]
    fn test_header_rejects_negative_effective_length() {
        let mut header = [0u8; HEADER_LEN];
        header[SESSION_ID_LEN..].copy_from_slice(b"0000000000000031");
        assert!(matches!(
            decode_header(&header),
            Err(FrameError::LengthUnderflow { declared: 31 })
        ));
    }

    #[test]
    fn test_header_rejects_oversized_body() {
        let mut header = [0u8; HEADER_LEN];
        header[SESSION_ID_LEN..].copy_from_slice(b"9999999999999999");
        assert!(matches!(
            decode_header(&header),
            Err(FrameError::BodyTooLarge { .. })
        ));
    }

    #[test]
    fn test_body_round_trip_preserves_order_and_values() {
        let fields = [
            ("requestId", "1291850641"),
            ("msisdn", "27845440001"),
            ("userdata", "*120*44#"),
            ("EndofSession", ""),
        ];
        let body = encode_body("USSDRequest", &fields);
        let (tag, decoded) = decode_body(&body).unwrap();
        assert_eq!(tag, "USSDRequest");
        let expected: Vec<(String, String)> = fields
            .iter()
            .map(|(n, v)| (n.to_string(), v.to_string()))
            .collect();
        assert_eq!(decoded, expected);
    }

    #[test]
    fn test_body_escapes_markup_in_values() {
        let fields = [("userdata", "a<b&c>\"d\"")];
        let body = encode_body("USSDResponse", &fields);
        let (_, decoded) = decode_body(&body).unwrap();
        assert_eq!(decoded[0].1, "a<b&c>\"d\"");
    }

    #[test]
    fn test_body_preserves_surrounding_whitespace_in_values() {
        // Field values travel verbatim; subscriber-visible text must not
        // be trimmed in transit.
        let fields = [("userdata", " hi "), ("prompt", "   ")];
        let body = encode_body("USSDResponse", &fields);
        let (_, decoded) = decode_body(&body).unwrap();
        assert_eq!(decoded[0].1, " hi ");
        assert_eq!(decoded[1].1, "   ");
    }

    #[test]
    fn test_body_ignores_whitespace_between_elements() {
        let body = b"<USSDRequest>\n  <requestId>1</requestId>\n  <userdata> hi </userdata>\n</USSDRequest>";
        let (tag, fields) = decode_body(body).unwrap();
        assert_eq!(tag, "USSDRequest");
        assert_eq!(
            fields,
            vec![
                ("requestId".to_string(), "1".to_string()),
                ("userdata".to_string(), " hi ".to_string()),
            ]
        );
    }

    #[test]
    fn test_body_empty_element_decodes_to_empty_value() {
        let (tag, fields) = decode_body(b"<AUTHResponse><requestId/><authMsg></authMsg></AUTHResponse>").unwrap();
        assert_eq!(tag, "AUTHResponse");
        assert_eq!(
            fields,
            vec![
                ("requestId".to_string(), String::new()),
                ("authMsg".to_string(), String::new()),
            ]
        );
    }

    #[test]
    fn test_body_without_fields() {
        let (tag, fields) = decode_body(b"<AUTHResponse></AUTHResponse>").unwrap();
        assert_eq!(tag, "AUTHResponse");
        assert!(fields.is_empty());
    }

    #[test]
    fn test_body_rejects_malformed_xml() {
        for body in [
            &b"<USSDRequest><requestId>1"[..],
            &b"not xml at all"[..],
            &b""[..],
        ] {
            assert!(matches!(
                decode_body(body),
                Err(FrameError::MalformedXml { .. })
            ));
        }
    }

    #[test]
    fn test_body_rejects_nested_elements() {
        let body = b"<USSDRequest><requestId><inner>1</inner></requestId></USSDRequest>";
        assert!(matches!(
            decode_body(body),
            Err(FrameError::UnexpectedXml { .. })
        ));
    }

    #[test]
    fn test_frame_encoding_declares_total_length() {
        let frame = encode_frame(&sid(7), "AUTHRequest", &[("requestId", "abc")]);
        let decoded = decode_header(&frame[..HEADER_LEN]).unwrap();
        assert_eq!(decoded.body_len, frame.len() - HEADER_LEN);
        let (tag, fields) = decode_body(&frame[HEADER_LEN..]).unwrap();
        assert_eq!(tag, "AUTHRequest");
        assert_eq!(fields, vec![("requestId".to_string(), "abc".to_string())]);
    }
}
