// Copyright (c) 2023 The TQUIC Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! TCP Jersey congestion control.
//!
//! Jersey keeps the NewReno window growth and replaces the loss response: the
//! sender estimates the available bandwidth (ABE) from the rate at which
//! segments are acknowledged, and after a loss sets ssthresh to the window
//! that this bandwidth sustains over one RTT.
//!
//! The estimate is a time-sliding window average sampled at most once per
//! RTT:
//!
//! ```text
//! Rn = (Tw * Rn-1 + Ln) / ((tn - tn-1) + Tw),    Tw = K * RTT
//! ```
//!
//! where `Ln` is the amount of data acknowledged since the previous sample.
//!
//! See K. Xu, Y. Tian, N. Ansari, "TCP-Jersey for wireless IP communications",
//! IEEE JSAC, vol. 22, no. 4, 2004.

use std::cmp;
use std::sync::Arc;
use std::time::Duration;

use log::*;
use strum_macros::Display;
use strum_macros::EnumString;

use super::CongestionController;
use crate::clock::Clock;
use crate::connection::tcb::TcpSocketState;
use crate::trace::TraceCallback;
use crate::trace::TracedValue;
use crate::Config;

/// Default multiplier applied to the RTT to get the estimation window Tw.
pub const DEFAULT_WINDOW_MULTIPLIER: u32 = 1;

/// Variant of the algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum ProfileType {
    /// Plain Jersey.
    #[default]
    Jersey,

    /// Jersey reacting to congestion warnings marked by routers.
    JerseyCw,
}

/// Filter applied to the bandwidth samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum FlowType {
    /// Samples are used as they are.
    #[default]
    None,

    /// Samples are smoothed by a Tustin filter.
    Tustin,
}

/// Jersey Configuration.
#[derive(Debug, Clone)]
pub struct JerseyConfig {
    /// Multiplier K of the estimation window, Tw = K * RTT.
    k: u32,

    /// Algorithm variant.
    profile_type: ProfileType,

    /// Sample filter.
    flow_type: FlowType,
}

impl JerseyConfig {
    pub fn new(k: u32, profile_type: ProfileType, flow_type: FlowType) -> Self {
        Self {
            k: cmp::max(k, 1),
            profile_type,
            flow_type,
        }
    }

    pub fn from(conf: &Config) -> Self {
        Self::new(
            conf.jersey_window_multiplier,
            conf.jersey_profile_type,
            conf.jersey_flow_type,
        )
    }

    /// Update the window multiplier. Zero is raised to one.
    pub fn set_window_multiplier(&mut self, k: u32) -> &mut Self {
        self.k = cmp::max(k, 1);
        self
    }

    /// Return the window multiplier.
    pub fn window_multiplier(&self) -> u32 {
        self.k
    }
}

impl Default for JerseyConfig {
    fn default() -> Self {
        Self::new(
            DEFAULT_WINDOW_MULTIPLIER,
            ProfileType::default(),
            FlowType::default(),
        )
    }
}

/// Jersey congestion control algorithm.
///
/// Cloning a `Jersey` copies all of its estimator state; subscribers of the
/// bandwidth trace are not copied.
#[derive(Debug, Clone)]
pub struct Jersey {
    /// Configuration.
    config: JerseyConfig,

    /// Available bandwidth estimate in bytes per second.
    current_bw: TracedValue<f64>,

    /// Throughput measured over the last sampling interval, bytes per second.
    last_sample_bw: f64,

    /// Estimate before the last sampling boundary, bytes per second.
    last_bw: f64,

    /// Segments acknowledged since the last sampling boundary.
    acked_segments: u32,

    /// Time of the last sampling boundary.
    last_sample_time: Duration,

    /// Time of the previous acknowledgment.
    last_ack_time: Duration,

    /// Whether acknowledged segments are pending for the next sample.
    is_counting: bool,

    /// Time source.
    clock: Arc<dyn Clock>,
}

impl Jersey {
    pub fn new(config: JerseyConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            current_bw: TracedValue::new(0.0),
            last_sample_bw: 0.0,
            last_bw: 0.0,
            acked_segments: 0,
            last_sample_time: Duration::ZERO,
            last_ack_time: Duration::ZERO,
            is_counting: false,
            clock,
        }
    }

    /// Available bandwidth estimate in bytes per second.
    pub fn current_bw(&self) -> f64 {
        self.current_bw.get()
    }

    /// Throughput of the last sampling interval in bytes per second.
    pub fn last_sample_bw(&self) -> f64 {
        self.last_sample_bw
    }

    /// Estimate before the last sampling boundary.
    pub fn last_bw(&self) -> f64 {
        self.last_bw
    }

    /// Segments acknowledged since the last sampling boundary.
    pub fn acked_segments(&self) -> u32 {
        self.acked_segments
    }

    /// Time of the last sampling boundary.
    pub fn last_sample_time(&self) -> Duration {
        self.last_sample_time
    }

    /// Time of the last processed acknowledgment.
    pub fn last_ack_time(&self) -> Duration {
        self.last_ack_time
    }

    /// Whether segments were acknowledged since the last sampling boundary.
    pub fn is_counting(&self) -> bool {
        self.is_counting
    }

    /// Configured variant.
    pub fn profile_type(&self) -> ProfileType {
        self.config.profile_type
    }

    /// Configured sample filter.
    pub fn flow_type(&self) -> FlowType {
        self.config.flow_type
    }

    /// Update the available bandwidth estimate.
    ///
    /// The estimate is resampled once a full `rtt` has passed since the
    /// previous sample; otherwise only the acknowledgment time moves.
    fn update_bandwidth(&mut self, rtt: Duration, segment_size: u32) {
        debug_assert!(!rtt.is_zero());

        let now = self.clock.now();
        let tw = rtt.saturating_mul(self.config.k).as_secs_f64();
        let delta = now.saturating_sub(self.last_ack_time).as_secs_f64();
        self.last_ack_time = now;

        if now.saturating_sub(self.last_sample_time) < rtt {
            return;
        }

        let acked_bytes = self.acked_segments as f64 * segment_size as f64;
        let prev_bw = self.current_bw.get();

        self.last_bw = prev_bw;
        if delta > 0.0 {
            self.last_sample_bw = acked_bytes / delta;
        }
        self.current_bw.set((tw * prev_bw + acked_bytes) / (delta + tw));
        self.last_sample_time = now;
        self.acked_segments = 0;
        self.is_counting = false;

        trace!(
            "{} sample now={:?} tw={} delta={} acked_bytes={} bw {} -> {}",
            self.name(),
            now,
            tw,
            delta,
            acked_bytes,
            prev_bw,
            self.current_bw.get()
        );
    }
}

impl CongestionController for Jersey {
    fn name(&self) -> &str {
        "JERSEY"
    }

    fn pkts_acked(&mut self, tcb: &TcpSocketState, segments_acked: u32, rtt: Duration) {
        if rtt.is_zero() {
            warn!("{} RTT measured is zero, sample discarded", self.name());
            return;
        }

        self.acked_segments = self.acked_segments.saturating_add(segments_acked);
        if segments_acked > 0 {
            self.is_counting = true;
        }

        self.update_bandwidth(rtt, tcb.segment_size);
    }

    fn ssthresh(&self, tcb: &TcpSocketState, bytes_in_flight: u32) -> u32 {
        let segment_size = tcb.segment_size;
        let rtt = tcb.min_rtt();
        let bw = self.current_bw.get();

        // Optimal window in whole segments: ownd = RTT * ABE / seg_size
        let ownd = if segment_size == 0 {
            0
        } else {
            (rtt.as_secs_f64() * bw / segment_size as f64) as u32
        };
        let ssthresh = cmp::max(
            segment_size.saturating_mul(2),
            ownd.saturating_mul(segment_size),
        );

        trace!(
            "{} ssthresh bw={} min_rtt={:?} last_rtt={:?} ownd={} ssthresh={}",
            self.name(),
            bw,
            rtt,
            tcb.last_rtt(),
            ownd,
            ssthresh
        );
        ssthresh
    }

    fn fork(&self) -> Box<dyn CongestionController> {
        debug!("{} forked, bw={}", self.name(), self.current_bw.get());
        Box::new(self.clone())
    }

    fn bandwidth_estimate(&self) -> Option<f64> {
        Some(self.current_bw.get())
    }

    fn connect_bandwidth_trace(&mut self, cb: TraceCallback<f64>) -> bool {
        self.current_bw.connect(cb);
        debug!(
            "{} bandwidth trace connected, {} subscribers",
            self.name(),
            self.current_bw.subscribers()
        );
        true
    }
}
