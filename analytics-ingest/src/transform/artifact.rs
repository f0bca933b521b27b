//! Clips, DVR recordings and VOD uploads share one state table and one history
//! table, told apart by `content_type`.

use time::OffsetDateTime;

use crate::decode::decode_trigger;
use crate::error::IngestError;
use crate::handler::{Disposition, IngestHandler, Scope};
use crate::identity::{self, normalize_internal_name};
use crate::store::rows::{ArtifactEventRow, ArtifactStateRow};
use crate::trigger::{DvrStatus, MistTrigger, VodStatus};

use super::{
    expect_payload, non_empty, non_empty_opt, non_zero, saturating_u8, stage_name, unix_seconds,
};

/// Columns common to every artifact projection.
struct ArtifactIdentity {
    tenant_id: uuid::Uuid,
    stream_id: uuid::Uuid,
    request_id: String,
    internal_name: String,
    filename: Option<String>,
    content_type: &'static str,
    stage: String,
}

impl ArtifactIdentity {
    fn state(&self, requested_at: OffsetDateTime) -> ArtifactStateRow {
        ArtifactStateRow {
            tenant_id: self.tenant_id,
            stream_id: self.stream_id,
            request_id: self.request_id.clone(),
            internal_name: self.internal_name.clone(),
            filename: self.filename.clone(),
            content_type: self.content_type.to_string(),
            stage: self.stage.clone(),
            progress_percent: 0,
            error_message: None,
            requested_at,
            started_at: None,
            completed_at: None,
            clip_start_unix: None,
            clip_stop_unix: None,
            segment_count: None,
            manifest_path: None,
            file_path: None,
            s3_url: None,
            size_bytes: None,
            processing_node_id: None,
            updated_at: requested_at,
            expires_at: None,
        }
    }

    fn event(&self, timestamp: OffsetDateTime, trigger: &MistTrigger) -> ArtifactEventRow {
        ArtifactEventRow {
            timestamp,
            tenant_id: self.tenant_id,
            stream_id: self.stream_id,
            internal_name: self.internal_name.clone(),
            cluster_id: trigger.cluster_id.clone(),
            origin_cluster_id: trigger.origin_cluster_id.clone(),
            filename: self.filename.clone(),
            request_id: self.request_id.clone(),
            stage: self.stage.clone(),
            content_type: self.content_type.to_string(),
            start_unix: None,
            stop_unix: None,
            ingest_node_id: None,
            percent: None,
            message: None,
            file_path: None,
            s3_url: None,
            size_bytes: None,
            expires_at: None,
        }
    }
}

impl IngestHandler {
    pub(crate) async fn process_clip_lifecycle(
        &self,
        scope: &Scope<'_>,
    ) -> Result<Disposition, IngestError> {
        let mut trigger = decode_trigger(&scope.event.data)?;
        let Some(stream_id) = self.require_stream_id(scope, &trigger).await else {
            return Ok(Disposition::Dropped);
        };
        let clip = expect_payload!(trigger, ClipLifecycleData, "clip_lifecycle");

        // The clip hash is the canonical artifact key.
        let request_id = if clip.clip_hash.is_empty() {
            clip.request_id.clone()
        } else {
            clip.clip_hash.clone()
        };
        let artifact = ArtifactIdentity {
            tenant_id: scope.tenant_id,
            stream_id,
            request_id,
            internal_name: normalize_internal_name(&clip.internal_name).to_string(),
            filename: None,
            content_type: "clip",
            stage: stage_name(clip.stage.wire_name(), "STAGE_"),
        };

        let ts = scope.event.timestamp;
        let start_unix = clip.start_unix.and_then(non_zero);
        let stop_unix = clip.stop_unix.and_then(non_zero);
        let error = non_empty_opt(clip.error.as_deref());
        let file_path = non_empty_opt(clip.file_path.as_deref());
        let s3_url = non_empty_opt(clip.s3_url.as_deref());
        let size_bytes = clip.size_bytes.and_then(non_zero);
        let node_id = non_empty_opt(clip.node_id.as_deref());
        let expires_at = clip.expires_at.and_then(non_zero);

        let mut state = artifact.state(ts);
        state.progress_percent = clip.progress_percent.map_or(0, saturating_u8);
        state.error_message = error.clone();
        state.started_at = unix_seconds(clip.started_at);
        state.completed_at = unix_seconds(clip.completed_at);
        state.clip_start_unix = start_unix;
        state.clip_stop_unix = stop_unix;
        state.file_path = file_path.clone();
        state.s3_url = s3_url.clone();
        state.size_bytes = size_bytes;
        state.processing_node_id = node_id.clone();
        state.expires_at = unix_seconds(expires_at);

        let mut event = artifact.event(ts, &trigger);
        event.start_unix = start_unix;
        event.stop_unix = stop_unix;
        event.ingest_node_id = node_id;
        event.percent = clip.progress_percent.and_then(non_zero).map(saturating_u8);
        event.message = error;
        event.file_path = file_path;
        event.s3_url = s3_url;
        event.size_bytes = size_bytes;
        event.expires_at = expires_at;

        self.projector
            .write_all(vec![state.into(), event.into()])
            .await?;
        Ok(Disposition::Processed)
    }

    pub(crate) async fn process_dvr_lifecycle(
        &self,
        scope: &Scope<'_>,
    ) -> Result<Disposition, IngestError> {
        let mut trigger = decode_trigger(&scope.event.data)?;
        let Some(stream_id) = self.require_stream_id(scope, &trigger).await else {
            return Ok(Disposition::Dropped);
        };
        let dvr = expect_payload!(trigger, DvrLifecycleData, "dvr_lifecycle");

        let artifact = ArtifactIdentity {
            tenant_id: identity::resolve_tenant(scope.tenant_id, dvr.tenant_id.as_deref()),
            stream_id,
            request_id: dvr.dvr_hash.clone(),
            internal_name: dvr
                .internal_name
                .as_deref()
                .map(normalize_internal_name)
                .unwrap_or_default()
                .to_string(),
            filename: None,
            content_type: "dvr",
            stage: dvr_stage(dvr.status).to_string(),
        };

        let ts = scope.event.timestamp;
        let started_at = dvr.started_at.and_then(non_zero);
        let ended_at = dvr.ended_at.and_then(non_zero);
        let manifest_path = non_empty_opt(dvr.manifest_path.as_deref());
        let size_bytes = dvr.size_bytes.and_then(non_zero);
        let error = non_empty_opt(dvr.error.as_deref());
        let expires_at = dvr.expires_at.and_then(non_zero);

        let mut state = artifact.state(ts);
        state.error_message = error.clone();
        state.started_at = unix_seconds(started_at);
        state.completed_at = unix_seconds(ended_at);
        state.segment_count = dvr.segment_count.and_then(non_zero);
        state.manifest_path = manifest_path.clone();
        // A recording's playable file is its manifest.
        state.file_path = manifest_path.clone();
        state.size_bytes = size_bytes;
        state.processing_node_id = non_empty(&trigger.node_id);
        state.expires_at = unix_seconds(expires_at);

        let mut event = artifact.event(ts, &trigger);
        event.start_unix = started_at;
        event.stop_unix = ended_at;
        event.ingest_node_id = Some(trigger.node_id.clone());
        event.file_path = manifest_path;
        event.size_bytes = size_bytes;
        event.message = error;
        event.expires_at = expires_at;

        self.projector
            .write_all(vec![state.into(), event.into()])
            .await?;
        Ok(Disposition::Processed)
    }

    /// VOD uploads go straight to object storage, so there is no stream to
    /// require; the upload hash doubles as the internal name.
    pub(crate) async fn process_vod_lifecycle(
        &self,
        scope: &Scope<'_>,
    ) -> Result<Disposition, IngestError> {
        let mut trigger = decode_trigger(&scope.event.data)?;
        let vod = expect_payload!(trigger, VodLifecycleData, "vod_lifecycle");

        let artifact = ArtifactIdentity {
            tenant_id: identity::resolve_tenant(scope.tenant_id, vod.tenant_id.as_deref()),
            stream_id: identity::uuid_or_nil(trigger.stream_id()),
            request_id: vod.vod_hash.clone(),
            internal_name: vod.vod_hash.clone(),
            filename: non_empty_opt(vod.filename.as_deref()),
            content_type: "vod",
            stage: vod_stage(vod.status).to_string(),
        };

        let ts = scope.event.timestamp;
        let error = non_empty_opt(vod.error.as_deref());
        let file_path = non_empty_opt(vod.file_path.as_deref());
        let s3_url = non_empty_opt(vod.s3_url.as_deref());
        let size_bytes = vod.size_bytes.and_then(non_zero);
        let node_id = non_empty_opt(vod.node_id.as_deref());
        let expires_at = vod.expires_at.and_then(non_zero);

        let mut state = artifact.state(ts);
        state.error_message = error.clone();
        state.started_at = unix_seconds(vod.started_at);
        state.completed_at = unix_seconds(vod.completed_at);
        state.file_path = file_path.clone();
        state.s3_url = s3_url.clone();
        state.size_bytes = size_bytes;
        state.processing_node_id = node_id.clone();
        state.expires_at = unix_seconds(expires_at);

        let mut event = artifact.event(ts, &trigger);
        event.ingest_node_id = node_id;
        event.file_path = file_path;
        event.s3_url = s3_url;
        event.size_bytes = size_bytes;
        event.message = error;
        event.expires_at = expires_at;

        self.projector
            .write_all(vec![state.into(), event.into()])
            .await?;
        Ok(Disposition::Processed)
    }
}

fn dvr_stage(status: DvrStatus) -> &'static str {
    match status {
        DvrStatus::Started => "started",
        DvrStatus::Recording => "recording",
        DvrStatus::Stopped => "stopped",
        DvrStatus::Failed => "failed",
        DvrStatus::Deleted => "deleted",
        DvrStatus::Unspecified => "unknown",
    }
}

fn vod_stage(status: VodStatus) -> &'static str {
    match status {
        VodStatus::Requested => "requested",
        VodStatus::Uploading => "uploading",
        VodStatus::Processing => "processing",
        VodStatus::Completed => "completed",
        VodStatus::Failed => "failed",
        VodStatus::Deleted => "deleted",
        VodStatus::Unspecified => "unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unspecified_statuses_map_to_unknown() {
        assert_eq!(dvr_stage(DvrStatus::Unspecified), "unknown");
        assert_eq!(vod_stage(VodStatus::Unspecified), "unknown");
        assert_eq!(dvr_stage(DvrStatus::Recording), "recording");
        assert_eq!(vod_stage(VodStatus::Completed), "completed");
    }
}
