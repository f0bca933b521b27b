//! Entry points for one analytics or service event.

use std::sync::Arc;
use std::time::Instant;

use tracing::{error, info, warn};
use uuid::Uuid;

use crate::dedup::DuplicateDetector;
use crate::envelope::AnalyticsEvent;
use crate::error::IngestError;
use crate::identity::{self, LEGACY_PLACEHOLDER_TENANT};
use crate::ingest_errors::IngestErrorSink;
use crate::metrics::IngestMetrics;
use crate::projector::Projector;
use crate::rollups::ViewerRollups;
use crate::store::AnalyticsStore;
use crate::trigger::MistTrigger;

/// What happened to an event that did not fail. Every variant means the
/// message is done and its offset can be committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Processed,
    /// Known type with nothing to project, or an unknown type.
    Skipped,
    /// Failed an identity check; audited to `ingest_errors`.
    Dropped,
    /// Already written by an earlier delivery.
    Duplicate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalyticsEventType {
    ViewerConnect,
    ViewerDisconnect,
    StreamBuffer,
    StreamEnd,
    PushRewrite,
    PlayRewrite,
    StreamSource,
    PushEnd,
    PushOutStart,
    StreamTrackList,
    StreamBandwidth,
    RecordingComplete,
    RecordingSegment,
    StreamLifecycleUpdate,
    NodeLifecycleUpdate,
    ClientLifecycleUpdate,
    LoadBalancing,
    ClipLifecycle,
    DvrLifecycle,
    VodLifecycle,
    StorageLifecycle,
    StorageSnapshot,
    ProcessBilling,
    ApiRequestBatch,
    FederationEvent,
}

impl AnalyticsEventType {
    pub fn parse(event_type: &str) -> Option<Self> {
        let parsed = match event_type {
            "viewer_connect" => Self::ViewerConnect,
            "viewer_disconnect" => Self::ViewerDisconnect,
            "stream_buffer" => Self::StreamBuffer,
            "stream_end" => Self::StreamEnd,
            "push_rewrite" => Self::PushRewrite,
            "play_rewrite" => Self::PlayRewrite,
            "stream_source" => Self::StreamSource,
            "push_end" => Self::PushEnd,
            "push_out_start" => Self::PushOutStart,
            "stream_track_list" => Self::StreamTrackList,
            "stream_bandwidth" => Self::StreamBandwidth,
            "recording_complete" => Self::RecordingComplete,
            "recording_segment" => Self::RecordingSegment,
            "stream_lifecycle_update" => Self::StreamLifecycleUpdate,
            "node_lifecycle_update" => Self::NodeLifecycleUpdate,
            "client_lifecycle_update" => Self::ClientLifecycleUpdate,
            "load_balancing" => Self::LoadBalancing,
            "clip_lifecycle" => Self::ClipLifecycle,
            "dvr_lifecycle" => Self::DvrLifecycle,
            "vod_lifecycle" => Self::VodLifecycle,
            "storage_lifecycle" => Self::StorageLifecycle,
            "storage_snapshot" => Self::StorageSnapshot,
            "process_billing" => Self::ProcessBilling,
            "api_request_batch" => Self::ApiRequestBatch,
            "federation_event" => Self::FederationEvent,
            _ => return None,
        };
        Some(parsed)
    }

    /// Event shapes that predate strict tenant enforcement.
    pub fn allows_legacy_tenant(self) -> bool {
        matches!(self, Self::ProcessBilling | Self::StorageLifecycle)
    }
}

/// Per-event values every transformer needs.
pub(crate) struct Scope<'a> {
    pub event: &'a AnalyticsEvent,
    pub event_id: Uuid,
    pub tenant_id: Uuid,
}

pub struct IngestHandler {
    pub(crate) projector: Projector,
    pub(crate) dedup: DuplicateDetector,
    pub(crate) errors: IngestErrorSink,
    pub(crate) rollups: Arc<dyn ViewerRollups>,
    pub(crate) metrics: IngestMetrics,
    legacy_tenant_fallback: bool,
}

impl IngestHandler {
    pub fn new(
        store: Arc<dyn AnalyticsStore>,
        rollups: Arc<dyn ViewerRollups>,
        metrics: IngestMetrics,
    ) -> Self {
        let projector = Projector::new(store.clone(), metrics.clone());
        Self {
            dedup: DuplicateDetector::new(store, metrics.clone()),
            errors: IngestErrorSink::new(projector.clone()),
            projector,
            rollups,
            metrics,
            legacy_tenant_fallback: false,
        }
    }

    /// Lets `process_billing` and `storage_lifecycle` events without a tenant
    /// through under the placeholder tenant instead of dropping them.
    pub fn with_legacy_tenant_fallback(mut self, enabled: bool) -> Self {
        self.legacy_tenant_fallback = enabled;
        self
    }

    pub async fn handle_analytics_event(
        &self,
        event: &AnalyticsEvent,
    ) -> Result<Disposition, IngestError> {
        let start = Instant::now();
        let event_type = event.event_type.as_str();
        self.metrics.event(event_type, "received");

        let kind = AnalyticsEventType::parse(event_type);

        let tenant_id = match identity::parse_identity(&event.tenant_id) {
            Some(tenant_id) => tenant_id,
            None => {
                self.metrics.event(event_type, "tenant_missing");
                match kind {
                    Some(kind) if self.legacy_tenant_fallback && kind.allows_legacy_tenant() => {
                        warn!(
                            event_type,
                            event_id = %event.event_id,
                            "Attributing event to legacy placeholder tenant"
                        );
                        LEGACY_PLACEHOLDER_TENANT
                    }
                    _ => {
                        warn!(
                            event_type,
                            event_id = %event.event_id,
                            tenant_id = %event.tenant_id,
                            "Dropping event with missing or invalid tenant_id"
                        );
                        self.errors
                            .record(event, "", "missing_or_invalid_tenant_id", None)
                            .await;
                        self.metrics.event(event_type, "dropped");
                        return Ok(Disposition::Dropped);
                    }
                }
            }
        };

        let Some(kind) = kind else {
            info!(event_type, event_id = %event.event_id, "Unknown event type, skipping");
            self.metrics.event(event_type, "skipped");
            return Ok(Disposition::Skipped);
        };

        let scope = Scope {
            event,
            event_id: identity::uuid_or_nil(&event.event_id),
            tenant_id,
        };

        match self.route(kind, &scope).await {
            Ok(Disposition::Processed) => {
                self.metrics.event(event_type, "processed");
                self.metrics
                    .processing_duration(&event.source, start.elapsed());
                Ok(Disposition::Processed)
            }
            Ok(Disposition::Duplicate) => {
                self.metrics.event(event_type, "duplicate");
                Ok(Disposition::Duplicate)
            }
            Ok(other) => Ok(other),
            Err(err) => {
                self.errors
                    .record(event, "", "handler_error", Some(&err))
                    .await;
                error!(
                    event_type,
                    event_id = %event.event_id,
                    error = %err,
                    "Failed to process event"
                );
                self.metrics.event(event_type, "error");
                Err(err)
            }
        }
    }

    async fn route(
        &self,
        kind: AnalyticsEventType,
        scope: &Scope<'_>,
    ) -> Result<Disposition, IngestError> {
        use AnalyticsEventType as T;

        match kind {
            T::ViewerConnect => self.process_viewer_connection(scope, true).await,
            T::ViewerDisconnect => self.process_viewer_connection(scope, false).await,
            T::StreamBuffer => self.process_stream_buffer(scope).await,
            T::StreamEnd => self.process_stream_end(scope).await,
            T::PushRewrite => self.process_push_rewrite(scope).await,
            T::StreamTrackList => self.process_track_list(scope).await,
            T::StreamBandwidth => self.process_stream_bandwidth(scope).await,
            T::StreamLifecycleUpdate => self.process_stream_lifecycle(scope).await,
            T::NodeLifecycleUpdate => self.process_node_lifecycle(scope).await,
            T::ClientLifecycleUpdate => self.process_client_lifecycle(scope).await,
            T::LoadBalancing => self.process_load_balancing(scope).await,
            T::ClipLifecycle => self.process_clip_lifecycle(scope).await,
            T::DvrLifecycle => self.process_dvr_lifecycle(scope).await,
            T::VodLifecycle => self.process_vod_lifecycle(scope).await,
            T::StorageLifecycle => self.process_storage_lifecycle(scope).await,
            T::StorageSnapshot => self.process_storage_snapshot(scope).await,
            T::ProcessBilling => self.process_billing(scope).await,
            T::ApiRequestBatch => self.process_api_request_batch(scope).await,
            T::FederationEvent => self.process_federation_event(scope).await,
            T::PlayRewrite
            | T::StreamSource
            | T::PushEnd
            | T::PushOutStart
            | T::RecordingComplete
            | T::RecordingSegment => Ok(self.skip(scope.event, "non_canonical_stream_event")),
        }
    }

    pub(crate) fn skip(&self, event: &AnalyticsEvent, reason: &str) -> Disposition {
        info!(
            event_type = %event.event_type,
            event_id = %event.event_id,
            reason,
            "Skipping event"
        );
        self.metrics.event(&event.event_type, "skipped");
        Disposition::Skipped
    }

    /// Validates the trigger's stream id. An invalid id is audited and the
    /// event dropped; `None` tells the caller to return [`Disposition::Dropped`].
    pub(crate) async fn require_stream_id(
        &self,
        scope: &Scope<'_>,
        trigger: &MistTrigger,
    ) -> Option<Uuid> {
        let raw = trigger.stream_id();
        if let Some(stream_id) = identity::parse_identity(raw) {
            return Some(stream_id);
        }

        warn!(
            event_type = %scope.event.event_type,
            event_id = %scope.event.event_id,
            stream_id = raw,
            "Dropping event with missing or invalid stream_id"
        );
        self.errors
            .record(scope.event, raw, "missing_or_invalid_stream_id", None)
            .await;
        self.metrics.event(&scope.event.event_type, "dropped");
        None
    }
}
