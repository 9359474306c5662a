//! Conversion of a status snapshot into a metric batch.

use ndswatch_types::{MetricBatch, MetricPoint, StatusSnapshot, Tags};
use tracing::debug;

/// Tag carrying the portal name on every point.
pub const PORTAL_TAG: &str = "Captive Portal";

pub const DOWNLOAD_BYTES: &str = "Download_Bytes";
pub const UPLOAD_BYTES: &str = "Upload_Bytes";
pub const AUTHENTICATED: &str = "Authenticated";
pub const PRE_AUTH: &str = "PreAuth";
pub const NDS_ERROR: &str = "NdsError";
/// Cycle duration in milliseconds (NDSmonitor wrote nanoseconds).
pub const PROBE_TIME: &str = "ProbeTime";

/// Builds metric batches for one portal.
#[derive(Debug, Clone)]
pub struct Extractor {
    portal_name: String,
    database: String,
}

impl Extractor {
    pub fn new(portal_name: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            portal_name: portal_name.into(),
            database: database.into(),
        }
    }

    /// Tags shared by the aggregate points.
    pub fn portal_tags(&self) -> Tags {
        let mut tags = Tags::new();
        tags.insert(PORTAL_TAG.to_string(), self.portal_name.clone());
        tags
    }

    /// Derive the batch for one probe cycle.
    ///
    /// When `service_down` is set the snapshot is ignored and only
    /// `NdsError=1` is emitted. Otherwise every authenticated session with
    /// usable counters contributes a download and an upload point, followed
    /// by the `Authenticated`, `PreAuth` and `NdsError=0` aggregates.
    pub fn extract(
        &self,
        snapshot: &StatusSnapshot,
        service_down: bool,
        timestamp_secs: u64,
    ) -> MetricBatch {
        let mut batch = MetricBatch::new(self.database.clone());
        let point = |measurement: &str, tags: Tags, value: u64| {
            MetricPoint::with_timestamp(measurement, tags, value, timestamp_secs)
        };

        if service_down {
            batch.push(point(NDS_ERROR, self.portal_tags(), 1));
            return batch;
        }

        for (key, session) in snapshot.iter() {
            if !session.is_authenticated() {
                continue;
            }
            let (Some(down), Some(up)) = (session.download_bytes(), session.upload_bytes()) else {
                debug!(
                    session = %key,
                    downloaded = %session.download_kib,
                    uploaded = %session.upload_kib,
                    "Skipping traffic points for session with unusable counters"
                );
                continue;
            };

            let mut tags = self.portal_tags();
            tags.insert("Mac_Address".to_string(), session.mac_address.to_uppercase());
            tags.insert("Ip_Address".to_string(), session.ip_address.clone());
            tags.insert("ID".to_string(), session.id.to_string());
            tags.insert("Token".to_string(), session.token.clone());
            tags.insert("Auth".to_string(), session.state.clone());

            batch.push(point(DOWNLOAD_BYTES, tags.clone(), down));
            batch.push(point(UPLOAD_BYTES, tags, up));
        }

        let (authenticated, pre_auth) = snapshot.state_counts();
        batch.push(point(AUTHENTICATED, self.portal_tags(), authenticated));
        batch.push(point(PRE_AUTH, self.portal_tags(), pre_auth));
        batch.push(point(NDS_ERROR, self.portal_tags(), 0));
        batch
    }

    /// The self-monitoring point, in milliseconds.
    pub fn probe_time(&self, millis: u64, timestamp_secs: u64) -> MetricPoint {
        MetricPoint::with_timestamp(PROBE_TIME, self.portal_tags(), millis, timestamp_secs)
    }
}
