// Duration extraction for captured network events.
//
// Capture paths differ in which timestamp fields they populate, so the
// estimator walks a fixed fallback chain and tags every result with the
// rule that produced it. Estimated values are synthetic and must stay
// distinguishable from measured ones downstream.

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Base network latency assumed when no timing fields survived capture.
const BASE_LATENCY_MS: f64 = 50.0;

/// Which rule of the fallback chain produced a duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimingMethod {
    /// Wall-clock capture timestamps (`end_time - start_time`).
    WallClock,
    /// Browser network-stack timestamps.
    NetworkTimestamps,
    /// Second-resolution request/response pair, scaled to milliseconds.
    RequestSeconds,
    /// `finished - started` lifecycle timestamps.
    LifecycleTimestamps,
    /// Protocol timing sub-object (`receive_headers_end - request_time`).
    ProtocolTiming,
    /// No usable fields; value synthesized from payload size plus jitter.
    Estimated,
}

impl TimingMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimingMethod::WallClock => "wall_clock",
            TimingMethod::NetworkTimestamps => "network_timestamps",
            TimingMethod::RequestSeconds => "request_seconds",
            TimingMethod::LifecycleTimestamps => "lifecycle_timestamps",
            TimingMethod::ProtocolTiming => "protocol_timing",
            TimingMethod::Estimated => "estimated",
        }
    }
}

/// A duration in milliseconds tagged with how it was obtained.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Timing {
    pub ms: u64,
    pub method: TimingMethod,
}

impl Timing {
    pub fn is_estimated(&self) -> bool {
        self.method == TimingMethod::Estimated
    }
}

/// Protocol-level timing sub-object, present on some response events.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ProtocolTiming {
    pub request_time: f64,
    pub receive_headers_end: f64,
}

/// Raw timing fields as captured off the wire. Every field is optional;
/// the estimator picks the first rule whose inputs are present.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawTiming {
    /// Wall-clock capture timestamps, milliseconds since epoch.
    pub start_time: Option<f64>,
    pub end_time: Option<f64>,
    /// Network-stack timestamps, milliseconds.
    pub network_request_time: Option<f64>,
    pub network_end_time: Option<f64>,
    /// Request/response pair in seconds.
    pub request_time: Option<f64>,
    pub response_received_time: Option<f64>,
    /// Lifecycle timestamps, milliseconds.
    pub started: Option<f64>,
    pub finished: Option<f64>,
    pub protocol_timing: Option<ProtocolTiming>,
    pub transfer_size: Option<u64>,
    pub resource_size: Option<u64>,
}

impl RawTiming {
    /// Fill any fields this record is missing from `other`. Used when a
    /// response event arrives carrying fields the request event lacked.
    pub fn merge(&mut self, other: &RawTiming) {
        self.start_time = self.start_time.or(other.start_time);
        self.end_time = self.end_time.or(other.end_time);
        self.network_request_time = self.network_request_time.or(other.network_request_time);
        self.network_end_time = self.network_end_time.or(other.network_end_time);
        self.request_time = self.request_time.or(other.request_time);
        self.response_received_time = self.response_received_time.or(other.response_received_time);
        self.started = self.started.or(other.started);
        self.finished = self.finished.or(other.finished);
        self.protocol_timing = self.protocol_timing.or(other.protocol_timing);
        self.transfer_size = self.transfer_size.or(other.transfer_size);
        self.resource_size = self.resource_size.or(other.resource_size);
    }
}

/// Map a raw event record to a single positive duration. Never fails:
/// when every timestamp pair is absent the duration is synthesized from
/// payload size, and a non-positive measured result is replaced by a
/// small random value so threshold comparisons never see zero.
pub fn estimate_duration(raw: &RawTiming) -> Timing {
    let measured = if let (Some(start), Some(end)) = (raw.start_time, raw.end_time) {
        Some((end - start, TimingMethod::WallClock))
    } else if let (Some(start), Some(end)) = (raw.network_request_time, raw.network_end_time) {
        Some((end - start, TimingMethod::NetworkTimestamps))
    } else if let (Some(req), Some(resp)) = (raw.request_time, raw.response_received_time) {
        Some(((resp - req) * 1000.0, TimingMethod::RequestSeconds))
    } else if let (Some(started), Some(finished)) = (raw.started, raw.finished) {
        Some((finished - started, TimingMethod::LifecycleTimestamps))
    } else {
        raw.protocol_timing.map(|t| {
            (
                t.receive_headers_end - t.request_time,
                TimingMethod::ProtocolTiming,
            )
        })
    };

    match measured {
        Some((ms, method)) => finalize(ms, method),
        None => {
            let size = raw.transfer_size.or(raw.resource_size).unwrap_or(0) as f64;
            let payload_cost = (size / 1000.0).clamp(10.0, 500.0);
            let jitter = rand::rng().random_range(0.0..=100.0);
            finalize(BASE_LATENCY_MS + payload_cost + jitter, TimingMethod::Estimated)
        }
    }
}

fn finalize(ms: f64, method: TimingMethod) -> Timing {
    if ms <= 0.0 {
        // Clock skew or a degenerate capture. Substitute a small synthetic
        // value and tag it, so consumers never see a zero duration.
        Timing {
            ms: rand::rng().random_range(20..=100),
            method: TimingMethod::Estimated,
        }
    } else {
        Timing {
            ms: ms.round() as u64,
            method,
        }
    }
}
