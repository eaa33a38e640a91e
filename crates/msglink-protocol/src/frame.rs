//! The frame envelope exchanged with the server.

use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::PROTOCOL_VERSION;
use crate::error::{ProtocolError, ProtocolResult};

/// Correlation id carried by unsolicited server pushes.
pub const PUSH_CORRELATION_ID: u32 = 0;

/// A typed request the server understands.
///
/// `NAME` is the command tag put on the frame; `Response` is the sum type the
/// server answers with for this command family.
pub trait Command: Serialize {
    /// Command tag.
    const NAME: &'static str;

    /// Decoded response type.
    type Response: DeserializeOwned;
}

/// One framed unit on the main connection.
///
/// The body is opaque at this layer: it holds the JSON encoding of a command
/// or a response and is carried base64-encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    /// Protocol version (always "1" for v1).
    pub protocol_version: String,
    /// Account the frame is addressed as.
    pub account: u64,
    /// Correlation id pairing a response with its request.
    pub correlation_id: u32,
    /// Command tag.
    pub command: String,
    /// Encoded payload.
    #[serde(with = "body")]
    pub body: Vec<u8>,
}

impl Frame {
    /// Creates a frame with the current protocol version.
    pub fn new(
        account: u64,
        correlation_id: u32,
        command: impl Into<String>,
        body: Vec<u8>,
    ) -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION.to_string(),
            account,
            correlation_id,
            command: command.into(),
            body,
        }
    }

    /// Encodes `command` into a request frame.
    pub fn request<C: Command>(account: u64, correlation_id: u32, command: &C) -> ProtocolResult<Self> {
        let body = serde_json::to_vec(command)?;
        Ok(Self::new(account, correlation_id, C::NAME, body))
    }

    /// Encodes `response` into a frame answering `request`.
    pub fn response_to<T: Serialize>(request: &Frame, response: &T) -> ProtocolResult<Self> {
        let body = serde_json::to_vec(response)?;
        Ok(Self::new(
            request.account,
            request.correlation_id,
            request.command.clone(),
            body,
        ))
    }

    /// Decodes the body as `T`.
    pub fn decode_body<T: DeserializeOwned>(&self) -> ProtocolResult<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Returns true for unsolicited server pushes.
    pub fn is_push(&self) -> bool {
        self.correlation_id == PUSH_CORRELATION_ID
    }

    /// Checks that this frame uses a compatible protocol version.
    pub fn ensure_compatible(&self) -> ProtocolResult<()> {
        if self.protocol_version == PROTOCOL_VERSION {
            Ok(())
        } else {
            Err(ProtocolError::UnsupportedVersion(self.protocol_version.clone()))
        }
    }
}

mod body {
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Echo {
        value: u32,
    }

    impl Command for Echo {
        const NAME: &'static str = "test.Echo";
        type Response = Echo;
    }

    #[test]
    fn request_frame_carries_command_tag() {
        let frame = Frame::request(10001, 3, &Echo { value: 9 }).unwrap();
        assert_eq!(frame.command, "test.Echo");
        assert_eq!(frame.correlation_id, 3);
        assert_eq!(frame.decode_body::<Echo>().unwrap(), Echo { value: 9 });
    }

    #[test]
    fn body_is_base64_on_the_wire() {
        let frame = Frame::new(1, 2, "cmd", b"{}".to_vec());
        let json = serde_json::to_string(&frame).unwrap();
        insta::assert_snapshot!(json, @r#"{"protocol_version":"1","account":1,"correlation_id":2,"command":"cmd","body":"e30="}"#);
    }

    #[test]
    fn response_keeps_correlation() {
        let request = Frame::request(7, 42, &Echo { value: 1 }).unwrap();
        let response = Frame::response_to(&request, &Echo { value: 2 }).unwrap();
        assert_eq!(response.correlation_id, 42);
        assert_eq!(response.command, "test.Echo");
        assert!(!response.is_push());
    }

    #[test]
    fn malformed_body_is_an_error() {
        let frame = Frame::new(1, 2, "cmd", b"not json".to_vec());
        assert!(matches!(
            frame.decode_body::<Echo>(),
            Err(ProtocolError::Serialization(_))
        ));
    }

    #[test]
    fn version_check() {
        let mut frame = Frame::new(1, 0, "push", Vec::new());
        assert!(frame.ensure_compatible().is_ok());
        assert!(frame.is_push());
        frame.protocol_version = "0".into();
        assert!(matches!(
            frame.ensure_compatible(),
            Err(ProtocolError::UnsupportedVersion(v)) if v == "0"
        ));
    }
}
