use tracing::debug;

use crate::decode::decode_trigger;
use crate::error::IngestError;
use crate::handler::{Disposition, IngestHandler, Scope};
use crate::identity::{self, normalize_internal_name};
use crate::store::rows::ProcessingEventRow;

use super::{expect_payload, non_empty, non_empty_opt, non_zero};

impl IngestHandler {
    /// Transcode and processing usage, one row per report.
    pub(crate) async fn process_billing(
        &self,
        scope: &Scope<'_>,
    ) -> Result<Disposition, IngestError> {
        let mut trigger = decode_trigger(&scope.event.data)?;
        let p = expect_payload!(trigger, ProcessBilling, "process_billing");

        let internal_name = normalize_internal_name(&p.stream_name).to_string();
        let track_type = non_empty(&p.track_type).unwrap_or_else(|| String::from("unknown"));
        let some_i32 = |v: Option<i32>| v.and_then(non_zero);
        let some_i64 = |v: Option<i64>| v.and_then(non_zero);
        let some_f64 = |v: Option<f64>| v.and_then(non_zero);

        let row = ProcessingEventRow {
            timestamp: scope.event.timestamp,
            tenant_id: identity::resolve_tenant(scope.tenant_id, p.tenant_id.as_deref()),
            node_id: p.node_id.clone(),
            stream_id: identity::uuid_or_nil(trigger.stream_id()),
            internal_name: internal_name.clone(),
            process_type: p.process_type.clone(),
            track_type,
            duration_ms: p.duration_ms,
            input_codec: non_empty_opt(p.input_codec.as_deref()),
            output_codec: non_empty_opt(p.output_codec.as_deref()),
            segment_number: some_i64(p.segment_number),
            width: some_i32(p.width),
            height: some_i32(p.height),
            rendition_count: some_i32(p.rendition_count),
            broadcaster_url: non_empty_opt(p.broadcaster_url.as_deref()),
            upload_time_us: some_i64(p.upload_time_us),
            livepeer_session_id: non_empty_opt(p.livepeer_session_id.as_deref()),
            segment_start_ms: some_i64(p.segment_start_ms),
            input_bytes: some_i64(p.input_bytes),
            output_bytes_total: some_i64(p.output_bytes_total),
            attempt_count: some_i32(p.attempt_count),
            turnaround_ms: some_i64(p.turnaround_ms),
            speed_factor: some_f64(p.speed_factor),
            renditions_json: non_empty_opt(p.renditions_json.as_deref()),
            input_frames: some_i64(p.input_frames),
            output_frames: some_i64(p.output_frames),
            decode_us_per_frame: some_i64(p.decode_us_per_frame),
            transform_us_per_frame: some_i64(p.transform_us_per_frame),
            encode_us_per_frame: some_i64(p.encode_us_per_frame),
            // Unlike the counters, `false` here is a real answer.
            is_final: p.is_final.map(u8::from),
            input_frames_delta: some_i64(p.input_frames_delta),
            output_frames_delta: some_i64(p.output_frames_delta),
            input_bytes_delta: some_i64(p.input_bytes_delta),
            output_bytes_delta: some_i64(p.output_bytes_delta),
            input_width: some_i32(p.input_width),
            input_height: some_i32(p.input_height),
            output_width: some_i32(p.output_width),
            output_height: some_i32(p.output_height),
            input_fpks: some_i32(p.input_fpks),
            output_fps_measured: some_f64(p.output_fps_measured),
            sample_rate: some_i32(p.sample_rate),
            channels: some_i32(p.channels),
            source_timestamp_ms: some_i64(p.source_timestamp_ms),
            sink_timestamp_ms: some_i64(p.sink_timestamp_ms),
            source_advanced_ms: some_i64(p.source_advanced_ms),
            sink_advanced_ms: some_i64(p.sink_advanced_ms),
            rtf_in: some_f64(p.rtf_in),
            rtf_out: some_f64(p.rtf_out),
            pipeline_lag_ms: some_i64(p.pipeline_lag_ms),
            output_bitrate_bps: some_i64(p.output_bitrate_bps),
        };

        self.projector.write(row).await?;
        debug!(
            stream = %internal_name,
            process_type = %p.process_type,
            duration_ms = p.duration_ms,
            "Recorded processing usage"
        );
        Ok(Disposition::Processed)
    }
}
