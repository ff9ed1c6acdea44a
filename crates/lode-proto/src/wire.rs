// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Encode/decode seam for the JSON wire.
//!
//! Decoding validates the protocol version so a stale client is answered
//! with a typed error instead of silently misinterpreted fields.

use thiserror::Error;

use crate::{ClientMessage, ServerMessage, PROTOCOL_VERSION};

/// Wire-level failures.
#[derive(Debug, Error)]
pub enum WireError {
    /// The payload was not valid JSON for any known message.
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
    /// The message's `ver` does not match [`PROTOCOL_VERSION`].
    #[error("protocol version mismatch: got {got}, want {want}")]
    VersionMismatch {
        /// Version the peer sent.
        got: u32,
        /// Version this build speaks.
        want: u32,
    },
}

fn client_version(msg: &ClientMessage) -> u32 {
    match msg {
        ClientMessage::Input { ver, .. }
        | ClientMessage::Path { ver, .. }
        | ClientMessage::CancelPath { ver }
        | ClientMessage::Action { ver, .. }
        | ClientMessage::Heartbeat { ver, .. }
        | ClientMessage::Console { ver, .. }
        | ClientMessage::KeyframeRequest { ver, .. }
        | ClientMessage::KeyframeCadence { ver, .. } => *ver,
    }
}

/// Decodes and version-checks one client message.
///
/// # Errors
/// [`WireError`] on malformed JSON or a version mismatch.
pub fn decode_client_message(raw: &str) -> Result<ClientMessage, WireError> {
    let msg: ClientMessage = serde_json::from_str(raw)?;
    let got = client_version(&msg);
    if got != PROTOCOL_VERSION {
        return Err(WireError::VersionMismatch {
            got,
            want: PROTOCOL_VERSION,
        });
    }
    Ok(msg)
}

/// Encodes one server message.
///
/// # Errors
/// [`WireError::Malformed`] when serialization fails (broadcast restores
/// drained journal state and retries next tick).
pub fn encode_server_message(msg: &ServerMessage) -> Result<String, WireError> {
    Ok(serde_json::to_string(msg)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_mismatch_is_rejected() {
        let raw = r#"{"type":"cancelPath","ver":99}"#;
        let err = decode_client_message(raw).unwrap_err();
        assert!(matches!(
            err,
            WireError::VersionMismatch { got: 99, want: PROTOCOL_VERSION }
        ));
    }

    #[test]
    fn unknown_type_is_malformed() {
        let raw = r#"{"type":"teleport","ver":1}"#;
        assert!(matches!(
            decode_client_message(raw),
            Err(WireError::Malformed(_))
        ));
    }

    #[test]
    fn heartbeat_decodes() {
        let raw = r#"{"type":"heartbeat","ver":1,"sentAt":123456}"#;
        let msg = decode_client_message(raw).unwrap();
        assert_eq!(
            msg,
            ClientMessage::Heartbeat {
                ver: 1,
                sent_at: 123456
            }
        );
    }
}
