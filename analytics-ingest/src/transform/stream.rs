use tracing::warn;

use crate::decode::decode_trigger;
use crate::error::IngestError;
use crate::handler::{Disposition, IngestHandler, Scope};
use crate::identity::{self, normalize_internal_name};
use crate::store::rows::{StreamEventLogRow, StreamHealthSampleRow, StreamStateRow, TrackListRow};
use crate::store::Table;
use crate::trigger::{primary_tracks, StreamTrack};

use super::{
    bitrate_kbps, buffer_health, derive_buffer_state, event_data, expect_payload, flag, non_empty,
    non_empty_opt, non_zero, positive_u16, positive_u32, saturating_u16, saturating_u8,
    track_metadata_json, unix_seconds,
};

const LIVE: &str = "live";

impl IngestHandler {
    /// Writes `stream_state_current`, then `stream_event_log`, then
    /// `stream_health_samples`.
    pub(crate) async fn process_stream_lifecycle(
        &self,
        scope: &Scope<'_>,
    ) -> Result<Disposition, IngestError> {
        let mut trigger = decode_trigger(&scope.event.data)?;
        let Some(stream_id) = identity::parse_identity(trigger.stream_id()) else {
            warn!(
                event_id = %scope.event.event_id,
                stream_id = trigger.stream_id(),
                "Skipping stream lifecycle update without a valid stream_id"
            );
            return Ok(Disposition::Skipped);
        };
        let update = expect_payload!(trigger, StreamLifecycleUpdate, "stream_lifecycle_update");

        let ts = scope.event.timestamp;
        let internal_name = normalize_internal_name(&update.internal_name).to_string();
        let status = non_empty(&update.status).unwrap_or_else(|| LIVE.to_string());
        let buffer_state = derive_buffer_state(&update.buffer_state, update.buffer_ms);

        let state = StreamStateRow {
            tenant_id: scope.tenant_id,
            stream_id,
            internal_name: internal_name.clone(),
            node_id: trigger.node_id.clone(),
            status: status.clone(),
            buffer_state: buffer_state.clone().unwrap_or_default(),
            current_viewers: update.total_viewers,
            total_inputs: saturating_u16(update.total_inputs),
            uploaded_bytes: update.uploaded_bytes,
            downloaded_bytes: update.downloaded_bytes,
            viewer_seconds: update.viewer_seconds,
            has_issues: flag(update.has_issues),
            issues_description: non_empty(&update.issues_description),
            track_count: non_zero(update.track_count).map(saturating_u16),
            quality_tier: non_empty(&update.quality_tier),
            primary_width: non_zero(update.primary_width).map(saturating_u16),
            primary_height: non_zero(update.primary_height).map(saturating_u16),
            primary_fps: non_zero(update.primary_fps),
            primary_codec: non_empty(&update.primary_codec),
            primary_bitrate: non_zero(update.primary_bitrate),
            packets_sent: update.packets_sent,
            packets_lost: update.packets_lost,
            packets_retransmitted: update.packets_retransmitted,
            started_at: unix_seconds(update.started_at),
            updated_at: ts,
        };

        let mut log = StreamEventLogRow::new(
            ts,
            scope.event_id,
            scope.tenant_id,
            stream_id,
            internal_name.clone(),
            "stream_lifecycle",
        );
        log.node_id = trigger.node_id.clone();
        log.cluster_id = trigger.cluster_id.clone();
        log.status = Some(status);
        log.buffer_state = non_empty(&update.buffer_state);
        log.downloaded_bytes = Some(update.downloaded_bytes);
        log.uploaded_bytes = Some(update.uploaded_bytes);
        log.total_viewers = Some(update.total_viewers);
        log.total_inputs = Some(saturating_u16(update.total_inputs));
        log.total_outputs = Some(0);
        log.viewer_seconds = Some(update.viewer_seconds);
        log.has_issues = state.has_issues;
        log.issues_description = state.issues_description.clone();
        log.track_count = state.track_count;
        log.quality_tier = state.quality_tier.clone();
        log.primary_width = state.primary_width;
        log.primary_height = state.primary_height;
        log.primary_fps = state.primary_fps;
        log.event_data = event_data(&update);

        let buffer_size = non_zero(update.buffer_ms);
        let mut health = StreamHealthSampleRow::new(
            ts,
            scope.tenant_id,
            stream_id,
            internal_name,
            trigger.node_id,
        );
        health.buffer_state = buffer_state;
        health.has_issues = state.has_issues;
        health.issues_description = state.issues_description.clone();
        health.track_count = state.track_count;
        health.track_metadata = track_metadata_json(&update.track_details_json);
        health.bitrate = state.primary_bitrate;
        health.fps = state.primary_fps;
        health.width = state.primary_width;
        health.height = state.primary_height;
        health.codec = state.primary_codec.clone();
        health.quality_tier = state.quality_tier.clone();
        health.buffer_size = buffer_size;
        health.buffer_health = buffer_health(buffer_size, update.max_keepaway_ms);
        health.audio_channels = non_zero(update.audio_channels).map(saturating_u8);
        health.audio_sample_rate = non_zero(update.audio_sample_rate);
        health.audio_codec = non_empty(&update.audio_codec);
        health.audio_bitrate = non_zero(update.audio_bitrate);

        self.projector
            .write_all(vec![state.into(), log.into(), health.into()])
            .await?;
        Ok(Disposition::Processed)
    }

    pub(crate) async fn process_stream_buffer(
        &self,
        scope: &Scope<'_>,
    ) -> Result<Disposition, IngestError> {
        let mut trigger = decode_trigger(&scope.event.data)?;
        let Some(stream_id) = self.require_stream_id(scope, &trigger).await else {
            return Ok(Disposition::Dropped);
        };
        if self
            .dedup
            .seen(Table::StreamEventLog, scope.event_id, &scope.event.event_type)
            .await
        {
            return Ok(Disposition::Duplicate);
        }
        let buffer = expect_payload!(trigger, StreamBuffer, "stream_buffer");

        let ts = scope.event.timestamp;
        let internal_name = normalize_internal_name(&buffer.stream_name).to_string();
        let (video, audio) = primary_tracks(&buffer.tracks);
        let video = video.map(VideoMetrics::from_track).unwrap_or_default();

        let mut log = StreamEventLogRow::new(
            ts,
            scope.event_id,
            scope.tenant_id,
            stream_id,
            internal_name.clone(),
            "stream_buffer",
        );
        log.node_id = trigger.node_id.clone();
        log.cluster_id = trigger.cluster_id.clone();
        log.status = Some(LIVE.to_string());
        log.buffer_state = non_empty(&buffer.buffer_state);
        log.has_issues = flag(buffer.has_issues);
        log.issues_description = non_empty(&buffer.issues_description);
        log.track_count = non_zero(buffer.track_count).map(saturating_u16);
        log.quality_tier = non_empty(&buffer.quality_tier);
        log.primary_width = video.width;
        log.primary_height = video.height;
        log.primary_fps = video.fps;
        log.event_data = event_data(&buffer);

        let mut health = StreamHealthSampleRow::new(
            ts,
            scope.tenant_id,
            stream_id,
            internal_name,
            trigger.node_id,
        );
        health.buffer_state = non_empty(&buffer.buffer_state);
        health.has_issues = log.has_issues;
        health.issues_description = log.issues_description.clone();
        health.track_count = log.track_count;
        if !buffer.tracks.is_empty() {
            health.track_metadata = event_data(&serde_json::json!({ "tracks": &buffer.tracks }));
        }
        health.bitrate = video.bitrate;
        health.fps = video.fps;
        health.width = video.width;
        health.height = video.height;
        health.codec = video.codec;
        health.quality_tier = log.quality_tier.clone();
        health.frame_ms_max = video.frame_ms_max;
        health.frame_ms_min = video.frame_ms_min;
        health.keyframe_ms_max = video.keyframe_ms_max;
        health.keyframe_ms_min = video.keyframe_ms_min;
        health.frame_jitter_ms = non_zero(buffer.stream_jitter_ms).map(|j| j as f32);
        health.frames_max = video.frames_max;
        health.frames_min = video.frames_min;
        health.gop_size = video.gop_size;
        health.buffer_size = buffer.stream_buffer_ms;
        health.buffer_health = buffer_health(buffer.stream_buffer_ms, buffer.max_keepaway_ms);
        if let Some(audio) = audio {
            health.audio_channels = positive_u32(audio.channels).map(saturating_u8);
            health.audio_sample_rate = positive_u32(audio.sample_rate);
            health.audio_codec = non_empty(&audio.codec);
            health.audio_bitrate = positive_u32(audio.bitrate_kbps);
        }

        self.projector
            .write_all(vec![log.into(), health.into()])
            .await?;
        Ok(Disposition::Processed)
    }

    pub(crate) async fn process_stream_end(
        &self,
        scope: &Scope<'_>,
    ) -> Result<Disposition, IngestError> {
        let mut trigger = decode_trigger(&scope.event.data)?;
        let Some(stream_id) = self.require_stream_id(scope, &trigger).await else {
            return Ok(Disposition::Dropped);
        };
        if self
            .dedup
            .seen(Table::StreamEventLog, scope.event_id, &scope.event.event_type)
            .await
        {
            return Ok(Disposition::Duplicate);
        }
        let end = expect_payload!(trigger, StreamEnd, "stream_end");

        let mut log = StreamEventLogRow::new(
            scope.event.timestamp,
            scope.event_id,
            scope.tenant_id,
            stream_id,
            normalize_internal_name(&end.stream_name).to_string(),
            "stream_end",
        );
        log.node_id = trigger.node_id;
        log.cluster_id = trigger.cluster_id;
        log.status = Some(String::from("offline"));
        log.downloaded_bytes = end.downloaded_bytes;
        log.uploaded_bytes = end.uploaded_bytes;
        log.total_viewers = end.total_viewers;
        log.total_inputs = end.total_inputs.map(saturating_u16);
        log.total_outputs = end.total_outputs.map(saturating_u16);
        log.viewer_seconds = end.viewer_seconds;
        log.event_data = event_data(&end);

        self.projector.write(log).await?;
        Ok(Disposition::Processed)
    }

    /// A publisher connecting. Recorded even without a stream id, since the
    /// stream may not be registered yet when the push arrives.
    pub(crate) async fn process_push_rewrite(
        &self,
        scope: &Scope<'_>,
    ) -> Result<Disposition, IngestError> {
        let mut trigger = decode_trigger(&scope.event.data)?;
        let push = expect_payload!(trigger, PushRewrite, "push_rewrite");

        let (latitude, longitude) = publisher_location(
            (push.publisher_latitude, push.publisher_longitude),
            (push.latitude, push.longitude),
        );

        let mut log = StreamEventLogRow::new(
            scope.event.timestamp,
            scope.event_id,
            scope.tenant_id,
            identity::uuid_or_nil(trigger.stream_id()),
            normalize_internal_name(&push.stream_name).to_string(),
            "stream_start",
        );
        log.node_id = trigger.node_id;
        log.cluster_id = trigger.cluster_id;
        log.status = Some(LIVE.to_string());
        log.stream_key = non_empty(&push.stream_name);
        log.request_url = non_empty(&push.push_url);
        log.protocol = non_empty_opt(push.protocol.as_deref());
        log.latitude = latitude;
        log.longitude = longitude;
        log.country_code = non_empty_opt(push.publisher_country_code.as_deref());
        log.city = non_empty_opt(push.publisher_city.as_deref());
        log.event_data = event_data(&push);

        self.projector.write(log).await?;
        Ok(Disposition::Processed)
    }

    pub(crate) async fn process_track_list(
        &self,
        scope: &Scope<'_>,
    ) -> Result<Disposition, IngestError> {
        let mut trigger = decode_trigger(&scope.event.data)?;
        let Some(stream_id) = self.require_stream_id(scope, &trigger).await else {
            return Ok(Disposition::Dropped);
        };
        if self
            .dedup
            .seen_in_any(
                &[Table::TrackListEvents, Table::StreamEventLog],
                scope.event_id,
                &scope.event.event_type,
            )
            .await
        {
            return Ok(Disposition::Duplicate);
        }
        let tracks = expect_payload!(trigger, TrackList, "stream_track_list");

        let ts = scope.event.timestamp;
        let internal_name = normalize_internal_name(&tracks.stream_name).to_string();

        let list = TrackListRow {
            timestamp: ts,
            event_id: scope.event_id,
            tenant_id: scope.tenant_id,
            stream_id,
            internal_name: internal_name.clone(),
            node_id: trigger.node_id.clone(),
            track_list: event_data(&tracks.tracks),
            track_count: saturating_u16(tracks.total_tracks),
            video_track_count: non_zero(tracks.video_track_count).map(saturating_u16),
            audio_track_count: non_zero(tracks.audio_track_count).map(saturating_u16),
            primary_width: non_zero(tracks.primary_width).map(saturating_u16),
            primary_height: non_zero(tracks.primary_height).map(saturating_u16),
            primary_fps: non_zero(tracks.primary_fps),
            primary_video_codec: non_empty(&tracks.primary_video_codec),
            primary_video_bitrate: non_zero(tracks.primary_video_bitrate),
            quality_tier: non_empty(&tracks.quality_tier),
            primary_audio_channels: non_zero(tracks.primary_audio_channels).map(saturating_u8),
            primary_audio_sample_rate: non_zero(tracks.primary_audio_sample_rate),
            primary_audio_codec: non_empty(&tracks.primary_audio_codec),
            primary_audio_bitrate: non_zero(tracks.primary_audio_bitrate),
        };

        let mut log = StreamEventLogRow::new(
            ts,
            scope.event_id,
            scope.tenant_id,
            stream_id,
            internal_name,
            "track_list_update",
        );
        log.node_id = trigger.node_id;
        log.cluster_id = trigger.cluster_id;
        log.status = Some(LIVE.to_string());
        log.track_count = non_zero(list.track_count);
        log.quality_tier = list.quality_tier.clone();
        log.primary_width = list.primary_width;
        log.primary_height = list.primary_height;
        log.primary_fps = list.primary_fps;
        log.event_data = event_data(&tracks);

        self.projector.write_all(vec![list.into(), log.into()]).await?;
        Ok(Disposition::Processed)
    }

    pub(crate) async fn process_stream_bandwidth(
        &self,
        scope: &Scope<'_>,
    ) -> Result<Disposition, IngestError> {
        let mut trigger = decode_trigger(&scope.event.data)?;
        let Some(stream_id) = self.require_stream_id(scope, &trigger).await else {
            return Ok(Disposition::Dropped);
        };
        if self
            .dedup
            .seen(Table::StreamEventLog, scope.event_id, &scope.event.event_type)
            .await
        {
            return Ok(Disposition::Duplicate);
        }
        let bandwidth = expect_payload!(trigger, StreamBandwidth, "stream_bandwidth");

        let mut log = StreamEventLogRow::new(
            scope.event.timestamp,
            scope.event_id,
            scope.tenant_id,
            stream_id,
            normalize_internal_name(&bandwidth.stream_name).to_string(),
            "stream_bandwidth",
        );
        log.node_id = trigger.node_id;
        log.cluster_id = trigger.cluster_id;
        log.status = Some(LIVE.to_string());
        log.bandwidth_kbps = Some(bitrate_kbps(bandwidth.current_bytes_per_second));
        log.uploaded_bytes = bandwidth.total_bytes_up;
        log.downloaded_bytes = bandwidth.total_bytes_down;
        log.event_data = event_data(&bandwidth);

        self.projector.write(log).await?;
        Ok(Disposition::Processed)
    }
}

/// Video-track columns shared by the event log and health sample.
#[derive(Default)]
struct VideoMetrics {
    bitrate: Option<u32>,
    fps: Option<f32>,
    width: Option<u16>,
    height: Option<u16>,
    codec: Option<String>,
    frame_ms_max: Option<f32>,
    frame_ms_min: Option<f32>,
    keyframe_ms_max: Option<f32>,
    keyframe_ms_min: Option<f32>,
    frames_max: Option<u32>,
    frames_min: Option<u32>,
    gop_size: Option<u16>,
}

impl VideoMetrics {
    fn from_track(track: &StreamTrack) -> Self {
        let positive = |v: f64| (v > 0.0).then_some(v as f32);
        Self {
            bitrate: positive_u32(track.bitrate_kbps),
            fps: positive(track.fps),
            width: positive_u16(track.width),
            height: positive_u16(track.height),
            codec: non_empty(&track.codec),
            frame_ms_max: positive(track.frame_ms_max),
            frame_ms_min: positive(track.frame_ms_min),
            keyframe_ms_max: positive(track.keyframe_ms_max),
            keyframe_ms_min: positive(track.keyframe_ms_min),
            frames_max: positive_u32(track.frames_max),
            frames_min: positive_u32(track.frames_min),
            // Frames between keyframes.
            gop_size: positive_u16(track.frames_max),
        }
    }
}

/// Publisher coordinates win when set; the ingest node's are the fallback.
fn publisher_location(
    publisher: (Option<f64>, Option<f64>),
    node: (Option<f64>, Option<f64>),
) -> (Option<f64>, Option<f64>) {
    let set = |v: Option<f64>| v.filter(|v| *v != 0.0);
    match (set(publisher.0), set(publisher.1)) {
        (Some(lat), Some(lon)) => (Some(lat), Some(lon)),
        _ => (set(node.0), set(node.1)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gop_size_comes_from_max_frames() {
        let track = StreamTrack {
            track_type: "video".to_string(),
            frames_max: 60,
            frames_min: 30,
            fps: 29.97,
            ..Default::default()
        };
        let metrics = VideoMetrics::from_track(&track);
        assert_eq!(metrics.gop_size, Some(60));
        assert_eq!(metrics.frames_min, Some(30));
        assert_eq!(metrics.bitrate, None);
        assert!(metrics.fps.is_some());
    }

    #[test]
    fn publisher_location_preference() {
        assert_eq!(
            publisher_location((Some(1.5), Some(2.5)), (Some(9.0), Some(9.0))),
            (Some(1.5), Some(2.5))
        );
        assert_eq!(
            publisher_location((Some(0.0), Some(0.0)), (Some(9.0), Some(8.0))),
            (Some(9.0), Some(8.0))
        );
        assert_eq!(publisher_location((None, None), (None, None)), (None, None));
    }
}
