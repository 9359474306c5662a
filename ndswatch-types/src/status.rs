//! Status document - the decoded output of `ndsctl json`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::DecimalText;

/// State string nodogsplash reports for clients that passed the splash page.
pub const AUTHENTICATED_STATE: &str = "Authenticated";

/// Errors produced while decoding a status document.
#[derive(Debug, thiserror::Error)]
pub enum StatusError {
    /// The document was not valid status JSON.
    #[error("Failed to decode status document: {0}")]
    Decode(#[from] serde_json::Error),
}

/// One client known to the captive portal.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ClientSession {
    /// Session identifier.
    #[serde(default)]
    pub id: DecimalText,

    /// Client IP address.
    #[serde(default, rename = "ip")]
    pub ip_address: String,

    /// Client hardware (MAC) address, as reported.
    #[serde(default, rename = "mac")]
    pub mac_address: String,

    /// Unix time the session was added.
    #[serde(default, rename = "added")]
    pub start_time: DecimalText,

    /// Unix time of the last activity.
    #[serde(default, rename = "active")]
    pub active_time: DecimalText,

    /// Seconds since the session was added.
    #[serde(default)]
    pub duration: DecimalText,

    /// Opaque session token.
    #[serde(default)]
    pub token: String,

    /// Session state, e.g. `Authenticated` or `Preauthenticated`.
    #[serde(default)]
    pub state: String,

    /// Cumulative download in KiB.
    #[serde(default, rename = "downloaded")]
    pub download_kib: DecimalText,

    /// Cumulative upload in KiB.
    #[serde(default, rename = "uploaded")]
    pub upload_kib: DecimalText,
}

impl ClientSession {
    /// Whether the state string is exactly `Authenticated`.
    ///
    /// Any other value, including an empty one, counts as pre-auth.
    pub fn is_authenticated(&self) -> bool {
        self.state == AUTHENTICATED_STATE
    }

    /// Download counter converted to bytes.
    ///
    /// `None` when the counter is not an unsigned integer or the byte count
    /// would overflow.
    pub fn download_bytes(&self) -> Option<u64> {
        kib_to_bytes(&self.download_kib)
    }

    /// Upload counter converted to bytes.
    pub fn upload_bytes(&self) -> Option<u64> {
        kib_to_bytes(&self.upload_kib)
    }
}

fn kib_to_bytes(kib: &DecimalText) -> Option<u64> {
    kib.to_u64()?.checked_mul(1024)
}

/// A full decoded status response.
///
/// Replaced on every probe cycle; nothing holds on to it afterwards.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StatusSnapshot {
    /// Client count as reported by ndsctl (decimal text).
    #[serde(default, rename = "client_list_length")]
    pub client_count: DecimalText,

    /// Sessions keyed by session identifier.
    #[serde(default)]
    pub clients: BTreeMap<String, ClientSession>,
}

impl StatusSnapshot {
    /// Decode raw `ndsctl json` output.
    ///
    /// A malformed document fails as a whole; individual numeric fields are
    /// never validated here.
    pub fn parse(raw: &[u8]) -> Result<Self, StatusError> {
        Ok(serde_json::from_slice(raw)?)
    }

    /// Number of sessions in the snapshot.
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Whether no clients are connected.
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Iterate over sessions in identifier order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &ClientSession)> {
        self.clients.iter()
    }

    /// Count sessions by state: `(authenticated, pre_auth)`.
    pub fn state_counts(&self) -> (u64, u64) {
        self.clients.values().fold((0, 0), |(auth, pre), session| {
            if session.is_authenticated() {
                (auth + 1, pre)
            } else {
                (auth, pre + 1)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_document() -> &'static str {
        r#"{
            "client_list_length": "2",
            "clients": {
                "1": {
                    "id": 1,
                    "ip": "192.168.1.20",
                    "mac": "aa:bb:cc:dd:ee:01",
                    "added": 1604700000,
                    "active": 1604700100,
                    "duration": 100,
                    "token": "deadbeef",
                    "state": "Authenticated",
                    "downloaded": 10,
                    "uploaded": 20
                },
                "2": {
                    "id": 2,
                    "ip": "192.168.1.21",
                    "mac": "aa:bb:cc:dd:ee:02",
                    "added": 1604700050,
                    "active": 1604700060,
                    "duration": 10,
                    "token": "cafebabe",
                    "state": "Preauthenticated",
                    "downloaded": "0",
                    "uploaded": "0"
                }
            }
        }"#
    }

    #[test]
    fn test_parse_document() {
        let snapshot = StatusSnapshot::parse(sample_document().as_bytes()).unwrap();
        assert_eq!(snapshot.client_count.as_str(), "2");
        assert_eq!(snapshot.len(), 2);

        let first = &snapshot.clients["1"];
        assert_eq!(first.ip_address, "192.168.1.20");
        assert_eq!(first.mac_address, "aa:bb:cc:dd:ee:01");
        assert_eq!(first.start_time.as_str(), "1604700000");
        assert!(first.is_authenticated());
        assert_eq!(first.download_bytes(), Some(10 * 1024));
        assert_eq!(first.upload_bytes(), Some(20 * 1024));

        assert_eq!(snapshot.state_counts(), (1, 1));
    }

    #[test]
    fn test_parse_malformed_document() {
        let err = StatusSnapshot::parse(b"ndsctl: nodogsplash probably not started").unwrap_err();
        assert!(matches!(err, StatusError::Decode(_)));
    }

    #[test]
    fn test_bad_field_does_not_abort_document() {
        let raw = r#"{"client_list_length":"1","clients":{"7":{"id":7,"state":"Authenticated","downloaded":"lots","uploaded":[1]}}}"#;
        let snapshot = StatusSnapshot::parse(raw.as_bytes()).unwrap();
        let session = &snapshot.clients["7"];
        assert_eq!(session.download_bytes(), None);
        assert_eq!(session.upload_bytes(), None);
    }

    #[test]
    fn test_empty_client_list() {
        let snapshot = StatusSnapshot::parse(br#"{"client_list_length":"0","clients":{}}"#).unwrap();
        assert!(snapshot.is_empty());
        assert_eq!(snapshot.state_counts(), (0, 0));
    }

    #[test]
    fn test_state_match_is_case_sensitive() {
        let mut snapshot = StatusSnapshot::default();
        for (id, state) in [("1", "Authenticated"), ("2", "authenticated"), ("3", "")] {
            snapshot.clients.insert(
                id.to_string(),
                ClientSession {
                    state: state.to_string(),
                    ..Default::default()
                },
            );
        }
        assert_eq!(snapshot.state_counts(), (1, 2));
    }

    #[test]
    fn test_byte_conversion_overflow() {
        let session = ClientSession {
            download_kib: DecimalText::from(u64::MAX),
            ..Default::default()
        };
        assert_eq!(session.download_bytes(), None);
    }
}
