//! Row types for every destination table. Field order matches column order.

use clickhouse::Row;
use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Row, Debug, Clone, Serialize)]
pub struct ViewerConnectionRow {
    #[serde(with = "clickhouse::serde::uuid")]
    pub event_id: Uuid,
    #[serde(with = "clickhouse::serde::time::datetime64::millis")]
    pub timestamp: OffsetDateTime,
    #[serde(with = "clickhouse::serde::uuid")]
    pub tenant_id: Uuid,
    #[serde(with = "clickhouse::serde::uuid")]
    pub stream_id: Uuid,
    pub internal_name: String,
    pub session_id: String,
    pub connection_addr: String,
    pub connector: String,
    pub node_id: String,
    pub cluster_id: String,
    pub origin_cluster_id: String,
    pub request_url: Option<String>,
    pub country_code: String,
    pub city: String,
    pub latitude: f64,
    pub longitude: f64,
    pub client_bucket_h3: Option<u64>,
    pub client_bucket_res: Option<u8>,
    pub node_bucket_h3: Option<u64>,
    pub node_bucket_res: Option<u8>,
    pub event_type: String,
    pub session_duration: u32,
    pub bytes_transferred: u64,
}

#[derive(Row, Debug, Clone, Serialize)]
pub struct StreamStateRow {
    #[serde(with = "clickhouse::serde::uuid")]
    pub tenant_id: Uuid,
    #[serde(with = "clickhouse::serde::uuid")]
    pub stream_id: Uuid,
    pub internal_name: String,
    pub node_id: String,
    pub status: String,
    pub buffer_state: String,
    pub current_viewers: u32,
    pub total_inputs: u16,
    pub uploaded_bytes: u64,
    pub downloaded_bytes: u64,
    pub viewer_seconds: u64,
    pub has_issues: Option<u8>,
    pub issues_description: Option<String>,
    pub track_count: Option<u16>,
    pub quality_tier: Option<String>,
    pub primary_width: Option<u16>,
    pub primary_height: Option<u16>,
    pub primary_fps: Option<f32>,
    pub primary_codec: Option<String>,
    pub primary_bitrate: Option<u32>,
    pub packets_sent: Option<u64>,
    pub packets_lost: Option<u64>,
    pub packets_retransmitted: Option<u64>,
    #[serde(with = "clickhouse::serde::time::datetime::option")]
    pub started_at: Option<OffsetDateTime>,
    #[serde(with = "clickhouse::serde::time::datetime64::millis")]
    pub updated_at: OffsetDateTime,
}

/// One row of the append-only stream history. Every stream event shape shares
/// this table; columns a given event has no data for stay null.
#[derive(Row, Debug, Clone, Serialize)]
pub struct StreamEventLogRow {
    #[serde(with = "clickhouse::serde::time::datetime64::millis")]
    pub timestamp: OffsetDateTime,
    #[serde(with = "clickhouse::serde::uuid")]
    pub event_id: Uuid,
    #[serde(with = "clickhouse::serde::uuid")]
    pub tenant_id: Uuid,
    #[serde(with = "clickhouse::serde::uuid")]
    pub stream_id: Uuid,
    pub internal_name: String,
    pub node_id: String,
    pub cluster_id: String,
    pub event_type: String,
    pub status: Option<String>,
    pub buffer_state: Option<String>,
    pub downloaded_bytes: Option<u64>,
    pub uploaded_bytes: Option<u64>,
    pub total_viewers: Option<u32>,
    pub total_inputs: Option<u16>,
    pub total_outputs: Option<u16>,
    pub viewer_seconds: Option<u64>,
    pub has_issues: Option<u8>,
    pub issues_description: Option<String>,
    pub track_count: Option<u16>,
    pub quality_tier: Option<String>,
    pub primary_width: Option<u16>,
    pub primary_height: Option<u16>,
    pub primary_fps: Option<f32>,
    pub stream_key: Option<String>,
    pub request_url: Option<String>,
    pub protocol: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub country_code: Option<String>,
    pub city: Option<String>,
    pub bandwidth_kbps: Option<u64>,
    pub event_data: String,
}

impl StreamEventLogRow {
    /// A row with identity columns set and every optional column empty.
    pub fn new(
        timestamp: OffsetDateTime,
        event_id: Uuid,
        tenant_id: Uuid,
        stream_id: Uuid,
        internal_name: String,
        event_type: &str,
    ) -> Self {
        Self {
            timestamp,
            event_id,
            tenant_id,
            stream_id,
            internal_name,
            node_id: String::new(),
            cluster_id: String::new(),
            event_type: event_type.to_string(),
            status: None,
            buffer_state: None,
            downloaded_bytes: None,
            uploaded_bytes: None,
            total_viewers: None,
            total_inputs: None,
            total_outputs: None,
            viewer_seconds: None,
            has_issues: None,
            issues_description: None,
            track_count: None,
            quality_tier: None,
            primary_width: None,
            primary_height: None,
            primary_fps: None,
            stream_key: None,
            request_url: None,
            protocol: None,
            latitude: None,
            longitude: None,
            country_code: None,
            city: None,
            bandwidth_kbps: None,
            event_data: String::from("{}"),
        }
    }
}

#[derive(Row, Debug, Clone, Serialize)]
pub struct StreamHealthSampleRow {
    #[serde(with = "clickhouse::serde::time::datetime64::millis")]
    pub timestamp: OffsetDateTime,
    #[serde(with = "clickhouse::serde::uuid")]
    pub tenant_id: Uuid,
    #[serde(with = "clickhouse::serde::uuid")]
    pub stream_id: Uuid,
    pub internal_name: String,
    pub node_id: String,
    pub buffer_state: Option<String>,
    pub has_issues: Option<u8>,
    pub issues_description: Option<String>,
    pub track_count: Option<u16>,
    pub track_metadata: String,
    pub bitrate: Option<u32>,
    pub fps: Option<f32>,
    pub width: Option<u16>,
    pub height: Option<u16>,
    pub codec: Option<String>,
    pub quality_tier: Option<String>,
    pub frame_ms_max: Option<f32>,
    pub frame_ms_min: Option<f32>,
    pub keyframe_ms_max: Option<f32>,
    pub keyframe_ms_min: Option<f32>,
    pub frame_jitter_ms: Option<f32>,
    pub frames_max: Option<u32>,
    pub frames_min: Option<u32>,
    pub gop_size: Option<u16>,
    pub buffer_size: Option<u32>,
    pub buffer_health: Option<f32>,
    pub audio_channels: Option<u8>,
    pub audio_sample_rate: Option<u32>,
    pub audio_codec: Option<String>,
    pub audio_bitrate: Option<u32>,
}

impl StreamHealthSampleRow {
    pub fn new(
        timestamp: OffsetDateTime,
        tenant_id: Uuid,
        stream_id: Uuid,
        internal_name: String,
        node_id: String,
    ) -> Self {
        Self {
            timestamp,
            tenant_id,
            stream_id,
            internal_name,
            node_id,
            buffer_state: None,
            has_issues: None,
            issues_description: None,
            track_count: None,
            track_metadata: String::from("{}"),
            bitrate: None,
            fps: None,
            width: None,
            height: None,
            codec: None,
            quality_tier: None,
            frame_ms_max: None,
            frame_ms_min: None,
            keyframe_ms_max: None,
            keyframe_ms_min: None,
            frame_jitter_ms: None,
            frames_max: None,
            frames_min: None,
            gop_size: None,
            buffer_size: None,
            buffer_health: None,
            audio_channels: None,
            audio_sample_rate: None,
            audio_codec: None,
            audio_bitrate: None,
        }
    }
}

#[derive(Row, Debug, Clone, Serialize)]
pub struct TrackListRow {
    #[serde(with = "clickhouse::serde::time::datetime64::millis")]
    pub timestamp: OffsetDateTime,
    #[serde(with = "clickhouse::serde::uuid")]
    pub event_id: Uuid,
    #[serde(with = "clickhouse::serde::uuid")]
    pub tenant_id: Uuid,
    #[serde(with = "clickhouse::serde::uuid")]
    pub stream_id: Uuid,
    pub internal_name: String,
    pub node_id: String,
    pub track_list: String,
    pub track_count: u16,
    pub video_track_count: Option<u16>,
    pub audio_track_count: Option<u16>,
    pub primary_width: Option<u16>,
    pub primary_height: Option<u16>,
    pub primary_fps: Option<f32>,
    pub primary_video_codec: Option<String>,
    pub primary_video_bitrate: Option<u32>,
    pub quality_tier: Option<String>,
    pub primary_audio_channels: Option<u8>,
    pub primary_audio_sample_rate: Option<u32>,
    pub primary_audio_codec: Option<String>,
    pub primary_audio_bitrate: Option<u32>,
}

#[derive(Row, Debug, Clone, Serialize)]
pub struct RoutingDecisionRow {
    #[serde(with = "clickhouse::serde::time::datetime64::millis")]
    pub timestamp: OffsetDateTime,
    #[serde(with = "clickhouse::serde::uuid")]
    pub tenant_id: Uuid,
    #[serde(with = "clickhouse::serde::uuid")]
    pub stream_id: Uuid,
    pub internal_name: String,
    pub selected_node: String,
    pub status: String,
    pub details: String,
    pub score: i64,
    pub client_ip: String,
    pub client_country: String,
    pub client_latitude: f64,
    pub client_longitude: f64,
    pub client_bucket_h3: Option<u64>,
    pub client_bucket_res: Option<u8>,
    pub node_latitude: f64,
    pub node_longitude: f64,
    pub node_name: String,
    pub node_bucket_h3: Option<u64>,
    pub node_bucket_res: Option<u8>,
    pub selected_node_id: Option<String>,
    pub routing_distance_km: Option<f64>,
    #[serde(with = "clickhouse::serde::uuid::option")]
    pub stream_tenant_id: Option<Uuid>,
    pub cluster_id: String,
    pub latency_ms: f32,
    pub candidates_count: Option<i32>,
    pub event_type: Option<String>,
    pub source: Option<String>,
}

#[derive(Row, Debug, Clone, Serialize)]
pub struct ClientQoeSampleRow {
    #[serde(with = "clickhouse::serde::time::datetime64::millis")]
    pub timestamp: OffsetDateTime,
    #[serde(with = "clickhouse::serde::uuid")]
    pub tenant_id: Uuid,
    #[serde(with = "clickhouse::serde::uuid")]
    pub stream_id: Uuid,
    pub internal_name: String,
    pub session_id: String,
    pub node_id: String,
    pub protocol: String,
    pub host: String,
    pub connection_time: Option<u32>,
    pub position: Option<f32>,
    pub bandwidth_in: Option<u64>,
    pub bandwidth_out: Option<u64>,
    pub bytes_downloaded: Option<u64>,
    pub bytes_uploaded: Option<u64>,
    pub packets_sent: Option<u64>,
    pub packets_lost: Option<u64>,
    pub packets_retransmitted: Option<u64>,
    pub connection_quality: Option<f32>,
}

#[derive(Row, Debug, Clone, Serialize)]
pub struct NodeStateRow {
    #[serde(with = "clickhouse::serde::uuid")]
    pub tenant_id: Uuid,
    pub cluster_id: String,
    pub node_id: String,
    pub cpu_percent: f32,
    pub ram_used_bytes: u64,
    pub ram_total_bytes: u64,
    pub disk_used_bytes: u64,
    pub disk_total_bytes: u64,
    pub up_speed: u64,
    pub down_speed: u64,
    pub active_streams: u32,
    pub is_healthy: u8,
    pub latitude: f64,
    pub longitude: f64,
    pub location: String,
    pub metadata: String,
    #[serde(with = "clickhouse::serde::time::datetime64::millis")]
    pub updated_at: OffsetDateTime,
}

#[derive(Row, Debug, Clone, Serialize)]
pub struct NodeMetricsSampleRow {
    #[serde(with = "clickhouse::serde::time::datetime64::millis")]
    pub timestamp: OffsetDateTime,
    #[serde(with = "clickhouse::serde::uuid")]
    pub tenant_id: Uuid,
    pub cluster_id: String,
    pub node_id: String,
    pub cpu_usage: f32,
    pub ram_max: u64,
    pub ram_current: u64,
    pub shm_total_bytes: u64,
    pub shm_used_bytes: u64,
    pub disk_total: u64,
    pub disk_used: u64,
    pub bandwidth_in: u64,
    pub bandwidth_out: u64,
    pub up_speed: u64,
    pub down_speed: u64,
    pub connections_current: u32,
    pub stream_count: u32,
    pub is_healthy: u8,
    pub latitude: f64,
    pub longitude: f64,
    pub metadata: String,
}

/// Current state of a clip, DVR recording or VOD upload.
#[derive(Row, Debug, Clone, Serialize)]
pub struct ArtifactStateRow {
    #[serde(with = "clickhouse::serde::uuid")]
    pub tenant_id: Uuid,
    #[serde(with = "clickhouse::serde::uuid")]
    pub stream_id: Uuid,
    pub request_id: String,
    pub internal_name: String,
    pub filename: Option<String>,
    pub content_type: String,
    pub stage: String,
    pub progress_percent: u8,
    pub error_message: Option<String>,
    #[serde(with = "clickhouse::serde::time::datetime64::millis")]
    pub requested_at: OffsetDateTime,
    #[serde(with = "clickhouse::serde::time::datetime::option")]
    pub started_at: Option<OffsetDateTime>,
    #[serde(with = "clickhouse::serde::time::datetime::option")]
    pub completed_at: Option<OffsetDateTime>,
    pub clip_start_unix: Option<i64>,
    pub clip_stop_unix: Option<i64>,
    pub segment_count: Option<u32>,
    pub manifest_path: Option<String>,
    pub file_path: Option<String>,
    pub s3_url: Option<String>,
    pub size_bytes: Option<u64>,
    pub processing_node_id: Option<String>,
    #[serde(with = "clickhouse::serde::time::datetime64::millis")]
    pub updated_at: OffsetDateTime,
    #[serde(with = "clickhouse::serde::time::datetime::option")]
    pub expires_at: Option<OffsetDateTime>,
}

#[derive(Row, Debug, Clone, Serialize)]
pub struct ArtifactEventRow {
    #[serde(with = "clickhouse::serde::time::datetime64::millis")]
    pub timestamp: OffsetDateTime,
    #[serde(with = "clickhouse::serde::uuid")]
    pub tenant_id: Uuid,
    #[serde(with = "clickhouse::serde::uuid")]
    pub stream_id: Uuid,
    pub internal_name: String,
    pub cluster_id: String,
    pub origin_cluster_id: String,
    pub filename: Option<String>,
    pub request_id: String,
    pub stage: String,
    pub content_type: String,
    pub start_unix: Option<i64>,
    pub stop_unix: Option<i64>,
    pub ingest_node_id: Option<String>,
    pub percent: Option<u8>,
    pub message: Option<String>,
    pub file_path: Option<String>,
    pub s3_url: Option<String>,
    pub size_bytes: Option<u64>,
    pub expires_at: Option<i64>,
}

#[derive(Row, Debug, Clone, Serialize)]
pub struct StorageEventRow {
    #[serde(with = "clickhouse::serde::time::datetime64::millis")]
    pub timestamp: OffsetDateTime,
    #[serde(with = "clickhouse::serde::uuid")]
    pub tenant_id: Uuid,
    #[serde(with = "clickhouse::serde::uuid")]
    pub stream_id: Uuid,
    pub internal_name: String,
    pub asset_hash: String,
    pub action: String,
    pub asset_type: String,
    pub size_bytes: u64,
    pub s3_url: Option<String>,
    pub local_path: Option<String>,
    pub node_id: String,
    pub duration_ms: Option<i64>,
    pub warm_duration_ms: Option<i64>,
    pub error: Option<String>,
}

#[derive(Row, Debug, Clone, Serialize)]
pub struct StorageSnapshotRow {
    #[serde(with = "clickhouse::serde::time::datetime64::millis")]
    pub timestamp: OffsetDateTime,
    pub node_id: String,
    #[serde(with = "clickhouse::serde::uuid")]
    pub tenant_id: Uuid,
    pub storage_scope: String,
    pub total_bytes: u64,
    pub file_count: u32,
    pub dvr_bytes: u64,
    pub clip_bytes: u64,
    pub vod_bytes: u64,
    pub frozen_dvr_bytes: u64,
    pub frozen_clip_bytes: u64,
    pub frozen_vod_bytes: u64,
}

#[derive(Row, Debug, Clone, Serialize)]
pub struct ProcessingEventRow {
    #[serde(with = "clickhouse::serde::time::datetime64::millis")]
    pub timestamp: OffsetDateTime,
    #[serde(with = "clickhouse::serde::uuid")]
    pub tenant_id: Uuid,
    pub node_id: String,
    #[serde(with = "clickhouse::serde::uuid")]
    pub stream_id: Uuid,
    pub internal_name: String,
    pub process_type: String,
    pub track_type: String,
    pub duration_ms: i64,
    pub input_codec: Option<String>,
    pub output_codec: Option<String>,
    pub segment_number: Option<i64>,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub rendition_count: Option<i32>,
    pub broadcaster_url: Option<String>,
    pub upload_time_us: Option<i64>,
    pub livepeer_session_id: Option<String>,
    pub segment_start_ms: Option<i64>,
    pub input_bytes: Option<i64>,
    pub output_bytes_total: Option<i64>,
    pub attempt_count: Option<i32>,
    pub turnaround_ms: Option<i64>,
    pub speed_factor: Option<f64>,
    pub renditions_json: Option<String>,
    pub input_frames: Option<i64>,
    pub output_frames: Option<i64>,
    pub decode_us_per_frame: Option<i64>,
    pub transform_us_per_frame: Option<i64>,
    pub encode_us_per_frame: Option<i64>,
    pub is_final: Option<u8>,
    pub input_frames_delta: Option<i64>,
    pub output_frames_delta: Option<i64>,
    pub input_bytes_delta: Option<i64>,
    pub output_bytes_delta: Option<i64>,
    pub input_width: Option<i32>,
    pub input_height: Option<i32>,
    pub output_width: Option<i32>,
    pub output_height: Option<i32>,
    pub input_fpks: Option<i32>,
    pub output_fps_measured: Option<f64>,
    pub sample_rate: Option<i32>,
    pub channels: Option<i32>,
    pub source_timestamp_ms: Option<i64>,
    pub sink_timestamp_ms: Option<i64>,
    pub source_advanced_ms: Option<i64>,
    pub sink_advanced_ms: Option<i64>,
    pub rtf_in: Option<f64>,
    pub rtf_out: Option<f64>,
    pub pipeline_lag_ms: Option<i64>,
    pub output_bitrate_bps: Option<i64>,
}

#[derive(Row, Debug, Clone, Serialize)]
pub struct ApiRequestRow {
    #[serde(with = "clickhouse::serde::time::datetime64::millis")]
    pub timestamp: OffsetDateTime,
    #[serde(with = "clickhouse::serde::uuid")]
    pub tenant_id: Uuid,
    pub source_node: String,
    pub auth_type: String,
    pub operation_name: Option<String>,
    pub operation_type: String,
    pub request_count: u32,
    pub error_count: u32,
    pub total_duration_ms: u64,
    pub total_complexity: u32,
    pub user_hashes: Vec<u64>,
    pub token_hashes: Vec<u64>,
}

#[derive(Row, Debug, Clone, Serialize)]
pub struct ApiEventRow {
    #[serde(with = "clickhouse::serde::uuid")]
    pub tenant_id: Uuid,
    pub event_type: String,
    pub source: String,
    #[serde(with = "clickhouse::serde::uuid::option")]
    pub user_id: Option<Uuid>,
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    pub details: String,
    #[serde(with = "clickhouse::serde::time::datetime64::millis")]
    pub timestamp: OffsetDateTime,
}

#[derive(Row, Debug, Clone, Serialize)]
pub struct TenantAcquisitionRow {
    #[serde(with = "clickhouse::serde::time::datetime64::millis")]
    pub timestamp: OffsetDateTime,
    #[serde(with = "clickhouse::serde::uuid")]
    pub tenant_id: Uuid,
    #[serde(with = "clickhouse::serde::uuid::option")]
    pub user_id: Option<Uuid>,
    pub signup_channel: String,
    pub signup_method: String,
    pub utm_source: Option<String>,
    pub utm_medium: Option<String>,
    pub utm_campaign: Option<String>,
    pub utm_content: Option<String>,
    pub utm_term: Option<String>,
    pub http_referer: Option<String>,
    pub landing_page: Option<String>,
    pub referral_code: Option<String>,
    pub is_agent: u8,
    pub event_data: String,
}

#[derive(Row, Debug, Clone, Serialize)]
pub struct FederationEventRow {
    #[serde(with = "clickhouse::serde::time::datetime64::millis")]
    pub timestamp: OffsetDateTime,
    #[serde(with = "clickhouse::serde::uuid")]
    pub event_id: Uuid,
    #[serde(with = "clickhouse::serde::uuid")]
    pub tenant_id: Uuid,
    pub event_type: String,
    pub local_cluster: String,
    pub remote_cluster: String,
    pub peer_cluster: Option<String>,
    #[serde(with = "clickhouse::serde::uuid::option")]
    pub stream_id: Option<Uuid>,
    pub internal_name: Option<String>,
    pub role: Option<String>,
    pub latency_ms: Option<f32>,
    pub time_to_live_ms: Option<f32>,
    pub queried_clusters: Option<u32>,
    pub responding_clusters: Option<u32>,
    pub total_candidates: Option<u32>,
    pub best_remote_score: Option<u64>,
    pub blocked_cluster: Option<String>,
    pub existing_replication_cluster: Option<String>,
    pub local_lat: Option<f64>,
    pub local_lon: Option<f64>,
    pub remote_lat: Option<f64>,
    pub remote_lon: Option<f64>,
}

#[derive(Row, Debug, Clone, Serialize)]
pub struct IngestErrorRow {
    #[serde(with = "clickhouse::serde::time::datetime64::millis")]
    pub received_at: OffsetDateTime,
    pub event_id: String,
    pub event_type: String,
    pub source: String,
    pub tenant_id: String,
    pub stream_id: String,
    pub error: String,
    pub payload_json: String,
}
