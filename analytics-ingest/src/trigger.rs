//! Typed trigger payloads carried inside an analytics event's data map.
//!
//! Field names follow protobuf JSON (lowerCamelCase); the decoder rewrites
//! proto names onto them before these types see the map. 64-bit integers accept
//! both strings and numbers. Fields where zero is a real sample are `Option`s
//! so that "absent" and "zero" stay distinct all the way to the row.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::proto_json::{self, proto_enum};

/// The envelope fields of a trigger. The payload variant is decoded on its own
/// by [`crate::decode::decode_trigger`].
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MistTrigger {
    pub trigger_type: String,
    pub node_id: String,
    #[serde(with = "proto_json::int64")]
    pub timestamp: i64,
    pub blocking: bool,
    pub request_id: String,
    pub cluster_id: String,
    pub origin_cluster_id: String,
    pub stream_id: Option<String>,
    pub tenant_id: Option<String>,
    #[serde(skip)]
    pub payload: Option<TriggerPayload>,
}

impl MistTrigger {
    pub fn stream_id(&self) -> &str {
        self.stream_id.as_deref().unwrap_or_default()
    }
}

/// Payloads that are accepted on the wire but carry nothing this service projects.
pub type OpaquePayload = Map<String, Value>;

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum TriggerPayload {
    ViewerConnect(ViewerConnectTrigger),
    ViewerDisconnect(ViewerDisconnectTrigger),
    StreamBuffer(StreamBufferTrigger),
    StreamEnd(StreamEndTrigger),
    PushRewrite(PushRewriteTrigger),
    PushOutStart(OpaquePayload),
    PushEnd(OpaquePayload),
    TrackList(StreamTrackListTrigger),
    StreamBandwidth(StreamBandwidthTrigger),
    RecordingComplete(OpaquePayload),
    RecordingSegment(OpaquePayload),
    PlayRewrite(OpaquePayload),
    StreamSource(OpaquePayload),
    StreamLifecycleUpdate(StreamLifecycleUpdate),
    NodeLifecycleUpdate(NodeLifecycleUpdate),
    ClientLifecycleUpdate(ClientLifecycleUpdate),
    LoadBalancingData(LoadBalancingData),
    ClipLifecycleData(ClipLifecycleData),
    DvrLifecycleData(DvrLifecycleData),
    VodLifecycleData(VodLifecycleData),
    StorageSnapshot(StorageSnapshot),
    StorageLifecycleData(StorageLifecycleData),
    ProcessBilling(ProcessBillingEvent),
    ApiRequestBatch(ApiRequestBatch),
    FederationEventData(FederationEventData),
}

impl TriggerPayload {
    /// JSON names of the payload fields. Proto names are folded onto these first.
    pub const KEYS: [&'static str; 25] = [
        "viewerConnect",
        "viewerDisconnect",
        "streamBuffer",
        "streamEnd",
        "pushRewrite",
        "pushOutStart",
        "pushEnd",
        "trackList",
        "streamBandwidth",
        "recordingComplete",
        "recordingSegment",
        "playRewrite",
        "streamSource",
        "streamLifecycleUpdate",
        "nodeLifecycleUpdate",
        "clientLifecycleUpdate",
        "loadBalancingData",
        "clipLifecycleData",
        "dvrLifecycleData",
        "vodLifecycleData",
        "storageSnapshot",
        "storageLifecycleData",
        "processBilling",
        "apiRequestBatch",
        "federationEventData",
    ];

    pub fn kind(&self) -> &'static str {
        match self {
            Self::ViewerConnect(_) => "viewer_connect",
            Self::ViewerDisconnect(_) => "viewer_disconnect",
            Self::StreamBuffer(_) => "stream_buffer",
            Self::StreamEnd(_) => "stream_end",
            Self::PushRewrite(_) => "push_rewrite",
            Self::PushOutStart(_) => "push_out_start",
            Self::PushEnd(_) => "push_end",
            Self::TrackList(_) => "stream_track_list",
            Self::StreamBandwidth(_) => "stream_bandwidth",
            Self::RecordingComplete(_) => "recording_complete",
            Self::RecordingSegment(_) => "recording_segment",
            Self::PlayRewrite(_) => "play_rewrite",
            Self::StreamSource(_) => "stream_source",
            Self::StreamLifecycleUpdate(_) => "stream_lifecycle_update",
            Self::NodeLifecycleUpdate(_) => "node_lifecycle_update",
            Self::ClientLifecycleUpdate(_) => "client_lifecycle_update",
            Self::LoadBalancingData(_) => "load_balancing",
            Self::ClipLifecycleData(_) => "clip_lifecycle",
            Self::DvrLifecycleData(_) => "dvr_lifecycle",
            Self::VodLifecycleData(_) => "vod_lifecycle",
            Self::StorageSnapshot(_) => "storage_snapshot",
            Self::StorageLifecycleData(_) => "storage_lifecycle",
            Self::ProcessBilling(_) => "process_billing",
            Self::ApiRequestBatch(_) => "api_request_batch",
            Self::FederationEventData(_) => "federation_event",
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GeoBucket {
    #[serde(with = "proto_json::uint64")]
    pub h3_index: u64,
    pub resolution: u32,
}

impl GeoBucket {
    /// `(h3, resolution)` for a populated bucket. A zero index means no bucket.
    pub fn cell(bucket: Option<&GeoBucket>) -> (Option<u64>, Option<u8>) {
        match bucket {
            Some(b) if b.h3_index != 0 => (Some(b.h3_index), u8::try_from(b.resolution).ok()),
            _ => (None, None),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ViewerConnectTrigger {
    pub stream_name: String,
    pub host: String,
    pub connector: String,
    pub request_url: String,
    pub session_id: String,
    pub client_country: String,
    pub client_city: String,
    pub client_latitude: f64,
    pub client_longitude: f64,
    pub client_bucket: Option<GeoBucket>,
    pub node_bucket: Option<GeoBucket>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ViewerDisconnectTrigger {
    pub session_id: String,
    pub stream_name: String,
    pub connector: String,
    pub host: String,
    #[serde(with = "proto_json::int64")]
    pub duration: i64,
    #[serde(with = "proto_json::int64")]
    pub up_bytes: i64,
    #[serde(with = "proto_json::int64")]
    pub down_bytes: i64,
    pub tags: Vec<String>,
    pub node_id: String,
    #[serde(with = "proto_json::opt_uint64")]
    pub seconds_connected: Option<u64>,
    pub country_code: String,
    pub city: String,
    pub latitude: f64,
    pub longitude: f64,
    pub client_bucket: Option<GeoBucket>,
    pub node_bucket: Option<GeoBucket>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StreamTrack {
    pub track_name: String,
    pub codec: String,
    pub track_type: String,
    pub bitrate_kbps: i32,
    #[serde(with = "proto_json::int64")]
    pub bitrate_bps: i64,
    pub buffer: i32,
    pub jitter: i32,
    pub width: i32,
    pub height: i32,
    pub fps: f64,
    pub has_bframes: bool,
    pub resolution: String,
    pub channels: i32,
    pub sample_rate: i32,
    pub frames_max: i32,
    pub frames_min: i32,
    pub frame_ms_max: f64,
    pub frame_ms_min: f64,
    pub keyframe_ms_max: f64,
    pub keyframe_ms_min: f64,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StreamBufferTrigger {
    pub stream_name: String,
    pub buffer_state: String,
    pub stream_buffer_ms: Option<u32>,
    pub stream_jitter_ms: u32,
    pub max_keepaway_ms: u32,
    pub has_issues: bool,
    pub issues_description: String,
    pub track_count: u32,
    pub quality_tier: String,
    pub tracks: Vec<StreamTrack>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StreamEndTrigger {
    pub stream_name: String,
    #[serde(with = "proto_json::opt_uint64")]
    pub downloaded_bytes: Option<u64>,
    #[serde(with = "proto_json::opt_uint64")]
    pub uploaded_bytes: Option<u64>,
    pub total_viewers: Option<u32>,
    pub total_inputs: Option<u32>,
    pub total_outputs: Option<u32>,
    #[serde(with = "proto_json::opt_uint64")]
    pub viewer_seconds: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PushRewriteTrigger {
    pub push_url: String,
    pub hostname: String,
    pub stream_name: String,
    pub protocol: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub publisher_latitude: Option<f64>,
    pub publisher_longitude: Option<f64>,
    pub publisher_country_code: Option<String>,
    pub publisher_city: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StreamTrackListTrigger {
    pub stream_name: String,
    pub tracks: Vec<StreamTrack>,
    pub total_tracks: u32,
    pub video_track_count: u32,
    pub audio_track_count: u32,
    pub primary_width: u32,
    pub primary_height: u32,
    pub primary_fps: f32,
    pub primary_video_codec: String,
    pub primary_video_bitrate: u32,
    pub quality_tier: String,
    pub primary_audio_channels: u32,
    pub primary_audio_sample_rate: u32,
    pub primary_audio_codec: String,
    pub primary_audio_bitrate: u32,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StreamBandwidthTrigger {
    pub stream_name: String,
    #[serde(with = "proto_json::uint64")]
    pub current_bytes_per_second: u64,
    #[serde(with = "proto_json::opt_uint64")]
    pub total_bytes_up: Option<u64>,
    #[serde(with = "proto_json::opt_uint64")]
    pub total_bytes_down: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StreamLifecycleUpdate {
    pub node_id: String,
    pub internal_name: String,
    pub status: String,
    pub buffer_state: String,
    #[serde(with = "proto_json::uint64")]
    pub uploaded_bytes: u64,
    #[serde(with = "proto_json::uint64")]
    pub downloaded_bytes: u64,
    #[serde(with = "proto_json::uint64")]
    pub viewer_seconds: u64,
    pub total_viewers: u32,
    pub total_inputs: u32,
    #[serde(with = "proto_json::opt_int64")]
    pub started_at: Option<i64>,
    pub has_issues: bool,
    pub issues_description: String,
    pub track_count: u32,
    pub quality_tier: String,
    pub primary_width: u32,
    pub primary_height: u32,
    pub primary_fps: f32,
    pub primary_codec: String,
    pub primary_bitrate: u32,
    #[serde(with = "proto_json::opt_uint64")]
    pub packets_sent: Option<u64>,
    #[serde(with = "proto_json::opt_uint64")]
    pub packets_lost: Option<u64>,
    #[serde(with = "proto_json::opt_uint64")]
    pub packets_retransmitted: Option<u64>,
    pub buffer_ms: u32,
    pub max_keepaway_ms: u32,
    pub track_details_json: String,
    pub audio_channels: u32,
    pub audio_sample_rate: u32,
    pub audio_codec: String,
    pub audio_bitrate: u32,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NodeLifecycleUpdate {
    pub node_id: String,
    pub cpu_tenths: u32,
    #[serde(with = "proto_json::uint64")]
    pub ram_max: u64,
    #[serde(with = "proto_json::uint64")]
    pub ram_current: u64,
    #[serde(with = "proto_json::uint64")]
    pub shm_total_bytes: u64,
    #[serde(with = "proto_json::uint64")]
    pub shm_used_bytes: u64,
    #[serde(with = "proto_json::uint64")]
    pub disk_total_bytes: u64,
    #[serde(with = "proto_json::uint64")]
    pub disk_used_bytes: u64,
    #[serde(with = "proto_json::uint64")]
    pub bandwidth_in_total: u64,
    #[serde(with = "proto_json::uint64")]
    pub bandwidth_out_total: u64,
    #[serde(with = "proto_json::uint64")]
    pub up_speed: u64,
    #[serde(with = "proto_json::uint64")]
    pub down_speed: u64,
    pub connections_current: u32,
    pub active_streams: u32,
    pub is_healthy: bool,
    pub latitude: f64,
    pub longitude: f64,
    pub location: String,
    pub capabilities: Option<Value>,
    pub limits: Option<Value>,
    #[serde(with = "proto_json::uint64")]
    pub bw_limit: u64,
    pub base_url: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ClientLifecycleUpdate {
    pub internal_name: String,
    pub session_id: String,
    pub protocol: String,
    pub host: String,
    pub connection_time: Option<u32>,
    pub position: Option<f32>,
    #[serde(with = "proto_json::opt_uint64")]
    pub bandwidth_in_bps: Option<u64>,
    #[serde(with = "proto_json::opt_uint64")]
    pub bandwidth_out_bps: Option<u64>,
    #[serde(with = "proto_json::opt_uint64")]
    pub bytes_downloaded: Option<u64>,
    #[serde(with = "proto_json::opt_uint64")]
    pub bytes_uploaded: Option<u64>,
    #[serde(with = "proto_json::opt_uint64")]
    pub packets_sent: Option<u64>,
    #[serde(with = "proto_json::opt_uint64")]
    pub packets_lost: Option<u64>,
    #[serde(with = "proto_json::opt_uint64")]
    pub packets_retransmitted: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LoadBalancingData {
    pub selected_node: String,
    pub status: String,
    pub details: String,
    #[serde(with = "proto_json::int64")]
    pub score: i64,
    pub client_ip: String,
    pub client_country: String,
    pub latitude: f64,
    pub longitude: f64,
    pub node_latitude: f64,
    pub node_longitude: f64,
    pub node_name: String,
    pub internal_name: String,
    pub cluster_id: String,
    pub latency_ms: f32,
    pub event_type: String,
    pub source: String,
    pub selected_node_id: Option<String>,
    pub routing_distance_km: Option<f64>,
    pub stream_tenant_id: Option<String>,
    pub candidates_count: Option<i32>,
    pub client_bucket: Option<GeoBucket>,
    pub node_bucket: Option<GeoBucket>,
}

proto_enum! {
    pub enum ClipStage {
        Unspecified = 0 => "STAGE_UNSPECIFIED",
        Requested = 1 => "STAGE_REQUESTED",
        Queued = 2 => "STAGE_QUEUED",
        Progress = 3 => "STAGE_PROGRESS",
        Done = 4 => "STAGE_DONE",
        Failed = 5 => "STAGE_FAILED",
        Deleted = 6 => "STAGE_DELETED",
    }
}

proto_enum! {
    pub enum DvrStatus {
        Unspecified = 0 => "STATUS_UNSPECIFIED",
        Started = 1 => "STATUS_STARTED",
        Recording = 2 => "STATUS_RECORDING",
        Stopped = 3 => "STATUS_STOPPED",
        Failed = 4 => "STATUS_FAILED",
        Deleted = 5 => "STATUS_DELETED",
    }
}

proto_enum! {
    pub enum VodStatus {
        Unspecified = 0 => "STATUS_UNSPECIFIED",
        Requested = 1 => "STATUS_REQUESTED",
        Uploading = 2 => "STATUS_UPLOADING",
        Processing = 3 => "STATUS_PROCESSING",
        Completed = 4 => "STATUS_COMPLETED",
        Failed = 5 => "STATUS_FAILED",
        Deleted = 6 => "STATUS_DELETED",
    }
}

proto_enum! {
    pub enum StorageAction {
        Unspecified = 0 => "ACTION_UNSPECIFIED",
        Cached = 1 => "ACTION_CACHED",
        CacheStarted = 2 => "ACTION_CACHE_STARTED",
        Evicted = 3 => "ACTION_EVICTED",
        Synced = 4 => "ACTION_SYNCED",
        SyncStarted = 5 => "ACTION_SYNC_STARTED",
    }
}

proto_enum! {
    pub enum FederationEventType {
        Unspecified = 0 => "FEDERATION_EVENT_TYPE_UNSPECIFIED",
        PeerConnected = 1 => "PEER_CONNECTED",
        PeerDisconnected = 2 => "PEER_DISCONNECTED",
        StreamAdvertised = 3 => "STREAM_ADVERTISED",
        RemoteRouteSelected = 4 => "REMOTE_ROUTE_SELECTED",
        ReplicationStarted = 5 => "REPLICATION_STARTED",
        ReplicationStopped = 6 => "REPLICATION_STOPPED",
        ReplicationLoopPrevented = 7 => "REPLICATION_LOOP_PREVENTED",
        QueryTimeout = 8 => "QUERY_TIMEOUT",
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ClipLifecycleData {
    pub stage: ClipStage,
    pub clip_hash: String,
    pub request_id: String,
    pub internal_name: String,
    pub tenant_id: Option<String>,
    pub progress_percent: Option<u32>,
    pub error: Option<String>,
    #[serde(with = "proto_json::opt_int64")]
    pub started_at: Option<i64>,
    #[serde(with = "proto_json::opt_int64")]
    pub completed_at: Option<i64>,
    #[serde(with = "proto_json::opt_int64")]
    pub start_unix: Option<i64>,
    #[serde(with = "proto_json::opt_int64")]
    pub stop_unix: Option<i64>,
    pub file_path: Option<String>,
    pub s3_url: Option<String>,
    #[serde(with = "proto_json::opt_uint64")]
    pub size_bytes: Option<u64>,
    pub node_id: Option<String>,
    #[serde(with = "proto_json::opt_int64")]
    pub expires_at: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DvrLifecycleData {
    pub status: DvrStatus,
    pub dvr_hash: String,
    pub internal_name: Option<String>,
    pub tenant_id: Option<String>,
    #[serde(with = "proto_json::opt_int64")]
    pub started_at: Option<i64>,
    #[serde(with = "proto_json::opt_int64")]
    pub ended_at: Option<i64>,
    pub segment_count: Option<u32>,
    pub manifest_path: Option<String>,
    #[serde(with = "proto_json::opt_uint64")]
    pub size_bytes: Option<u64>,
    pub error: Option<String>,
    #[serde(with = "proto_json::opt_int64")]
    pub expires_at: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct VodLifecycleData {
    pub status: VodStatus,
    pub vod_hash: String,
    pub tenant_id: Option<String>,
    pub filename: Option<String>,
    pub error: Option<String>,
    #[serde(with = "proto_json::opt_int64")]
    pub started_at: Option<i64>,
    #[serde(with = "proto_json::opt_int64")]
    pub completed_at: Option<i64>,
    pub file_path: Option<String>,
    pub s3_url: Option<String>,
    #[serde(with = "proto_json::opt_uint64")]
    pub size_bytes: Option<u64>,
    pub node_id: Option<String>,
    #[serde(with = "proto_json::opt_int64")]
    pub expires_at: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StorageSnapshot {
    pub node_id: String,
    #[serde(with = "proto_json::int64")]
    pub timestamp: i64,
    pub storage_scope: String,
    pub usage: Vec<TenantStorageUsage>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TenantStorageUsage {
    pub tenant_id: String,
    #[serde(with = "proto_json::uint64")]
    pub total_bytes: u64,
    pub file_count: u32,
    #[serde(with = "proto_json::uint64")]
    pub dvr_bytes: u64,
    #[serde(with = "proto_json::uint64")]
    pub clip_bytes: u64,
    #[serde(with = "proto_json::uint64")]
    pub vod_bytes: u64,
    #[serde(with = "proto_json::uint64")]
    pub frozen_dvr_bytes: u64,
    #[serde(with = "proto_json::uint64")]
    pub frozen_clip_bytes: u64,
    #[serde(with = "proto_json::uint64")]
    pub frozen_vod_bytes: u64,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StorageLifecycleData {
    pub action: StorageAction,
    pub asset_type: String,
    pub asset_hash: String,
    pub internal_name: Option<String>,
    pub tenant_id: Option<String>,
    #[serde(with = "proto_json::uint64")]
    pub size_bytes: u64,
    pub s3_url: Option<String>,
    pub local_path: Option<String>,
    #[serde(with = "proto_json::opt_int64")]
    pub duration_ms: Option<i64>,
    #[serde(with = "proto_json::opt_int64")]
    pub warm_duration_ms: Option<i64>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProcessBillingEvent {
    pub node_id: String,
    pub stream_name: String,
    pub process_type: String,
    pub track_type: String,
    #[serde(with = "proto_json::int64")]
    pub duration_ms: i64,
    pub tenant_id: Option<String>,
    pub input_codec: Option<String>,
    pub output_codec: Option<String>,
    #[serde(with = "proto_json::opt_int64")]
    pub segment_number: Option<i64>,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub rendition_count: Option<i32>,
    pub broadcaster_url: Option<String>,
    #[serde(with = "proto_json::opt_int64")]
    pub upload_time_us: Option<i64>,
    pub livepeer_session_id: Option<String>,
    #[serde(with = "proto_json::opt_int64")]
    pub segment_start_ms: Option<i64>,
    #[serde(with = "proto_json::opt_int64")]
    pub input_bytes: Option<i64>,
    #[serde(with = "proto_json::opt_int64")]
    pub output_bytes_total: Option<i64>,
    pub attempt_count: Option<i32>,
    #[serde(with = "proto_json::opt_int64")]
    pub turnaround_ms: Option<i64>,
    pub speed_factor: Option<f64>,
    pub renditions_json: Option<String>,
    #[serde(with = "proto_json::opt_int64")]
    pub input_frames: Option<i64>,
    #[serde(with = "proto_json::opt_int64")]
    pub output_frames: Option<i64>,
    #[serde(with = "proto_json::opt_int64")]
    pub decode_us_per_frame: Option<i64>,
    #[serde(with = "proto_json::opt_int64")]
    pub transform_us_per_frame: Option<i64>,
    #[serde(with = "proto_json::opt_int64")]
    pub encode_us_per_frame: Option<i64>,
    pub is_final: Option<bool>,
    #[serde(with = "proto_json::opt_int64")]
    pub input_frames_delta: Option<i64>,
    #[serde(with = "proto_json::opt_int64")]
    pub output_frames_delta: Option<i64>,
    #[serde(with = "proto_json::opt_int64")]
    pub input_bytes_delta: Option<i64>,
    #[serde(with = "proto_json::opt_int64")]
    pub output_bytes_delta: Option<i64>,
    pub input_width: Option<i32>,
    pub input_height: Option<i32>,
    pub output_width: Option<i32>,
    pub output_height: Option<i32>,
    pub input_fpks: Option<i32>,
    pub output_fps_measured: Option<f64>,
    pub sample_rate: Option<i32>,
    pub channels: Option<i32>,
    #[serde(with = "proto_json::opt_int64")]
    pub source_timestamp_ms: Option<i64>,
    #[serde(with = "proto_json::opt_int64")]
    pub sink_timestamp_ms: Option<i64>,
    #[serde(with = "proto_json::opt_int64")]
    pub source_advanced_ms: Option<i64>,
    #[serde(with = "proto_json::opt_int64")]
    pub sink_advanced_ms: Option<i64>,
    pub rtf_in: Option<f64>,
    pub rtf_out: Option<f64>,
    #[serde(with = "proto_json::opt_int64")]
    pub pipeline_lag_ms: Option<i64>,
    #[serde(with = "proto_json::opt_int64")]
    pub output_bitrate_bps: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ApiRequestBatch {
    #[serde(with = "proto_json::int64")]
    pub timestamp: i64,
    pub source_node: String,
    pub aggregates: Vec<ApiRequestAggregate>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ApiRequestAggregate {
    pub tenant_id: String,
    pub auth_type: String,
    pub operation_name: String,
    pub operation_type: String,
    pub request_count: u32,
    pub error_count: u32,
    #[serde(with = "proto_json::uint64")]
    pub total_duration_ms: u64,
    pub total_complexity: u32,
    #[serde(with = "proto_json::vec_uint64")]
    pub user_hashes: Vec<u64>,
    #[serde(with = "proto_json::vec_uint64")]
    pub token_hashes: Vec<u64>,
    #[serde(with = "proto_json::int64")]
    pub timestamp: i64,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FederationEventData {
    pub event_type: FederationEventType,
    pub local_cluster: String,
    pub remote_cluster: String,
    pub peer_cluster: Option<String>,
    pub tenant_id: Option<String>,
    pub stream_name: Option<String>,
    pub stream_id: Option<String>,
    pub latency_ms: Option<f32>,
    pub time_to_live_ms: Option<f32>,
    pub queried_clusters: Option<u32>,
    pub responding_clusters: Option<u32>,
    pub total_candidates: Option<u32>,
    #[serde(with = "proto_json::opt_uint64")]
    pub best_remote_score: Option<u64>,
    pub role: Option<String>,
    pub blocked_cluster: Option<String>,
    pub existing_replication_cluster: Option<String>,
    pub local_lat: Option<f64>,
    pub local_lon: Option<f64>,
    pub remote_lat: Option<f64>,
    pub remote_lon: Option<f64>,
}

/// First video and first audio track in list order.
pub fn primary_tracks(tracks: &[StreamTrack]) -> (Option<&StreamTrack>, Option<&StreamTrack>) {
    let video = tracks.iter().find(|t| t.track_type == "video");
    let audio = tracks.iter().find(|t| t.track_type == "audio");
    (video, audio)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn track(kind: &str, codec: &str) -> StreamTrack {
        StreamTrack {
            track_type: kind.to_string(),
            codec: codec.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn primary_tracks_takes_first_of_each_kind() {
        let tracks = vec![
            track("audio", "AAC"),
            track("meta", "JSON"),
            track("video", "H264"),
            track("video", "VP9"),
            track("audio", "opus"),
        ];
        let (video, audio) = primary_tracks(&tracks);
        assert_eq!(video.map(|t| t.codec.as_str()), Some("H264"));
        assert_eq!(audio.map(|t| t.codec.as_str()), Some("AAC"));
    }

    #[test]
    fn primary_tracks_handles_missing_kinds() {
        let tracks = vec![track("meta", "JSON")];
        assert!(matches!(primary_tracks(&tracks), (None, None)));
    }

    #[test]
    fn payload_keys_match_variant_names() {
        for key in TriggerPayload::KEYS {
            let mut wrapped = Map::new();
            wrapped.insert(key.to_string(), json!({}));
            let parsed: Result<TriggerPayload, _> = serde_json::from_value(Value::Object(wrapped));
            assert!(parsed.is_ok(), "{key} should deserialize as a payload variant");
        }
    }

    #[test]
    fn geo_bucket_zero_index_is_empty() {
        let empty = GeoBucket {
            h3_index: 0,
            resolution: 7,
        };
        let set = GeoBucket {
            h3_index: 613_196_570_331_971_583,
            resolution: 8,
        };
        assert_eq!(GeoBucket::cell(Some(&empty)), (None, None));
        assert_eq!(GeoBucket::cell(None), (None, None));
        assert_eq!(
            GeoBucket::cell(Some(&set)),
            (Some(613_196_570_331_971_583), Some(8))
        );
    }
}
