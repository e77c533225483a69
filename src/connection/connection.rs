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

//! The congestion side of a TCP connection.
//!
//! A `Connection` owns the control block and the congestion controller, and
//! translates transport events into controller calls. It decides when to
//! enter and leave loss recovery; the controller decides how far the window
//! falls and how fast it grows back.

use std::cmp;
use std::sync::Arc;
use std::time::Duration;

use log::*;
use serde::Serialize;

use self::tcb::TcpSocketState;
use crate::clock::Clock;
use crate::congestion_control::build_congestion_controller;
use crate::congestion_control::CongestionController;
use crate::trace::TraceCallback;
use crate::Config;
use crate::Error;
use crate::Result;

/// Congestion statistics of a connection.
#[derive(Debug, Default, Clone, Serialize)]
pub struct CongestionStats {
    /// Total bytes sent.
    pub bytes_sent_in_total: u64,

    /// Total bytes acked.
    pub bytes_acked_in_total: u64,

    /// Total bytes lost.
    pub bytes_lost_in_total: u64,

    /// Total acknowledgment events.
    pub ack_event_count: u64,

    /// Total loss events which started a recovery period.
    pub loss_event_count: u64,

    /// Maximum congestion window in bytes.
    pub max_cwnd: u32,

    /// Minimum congestion window in bytes.
    pub min_cwnd: u32,
}

/// The congestion state of a TCP connection.
#[derive(Debug)]
pub struct Connection {
    /// Unique trace id for debug logging.
    trace_id: String,

    /// Transmission control block.
    tcb: TcpSocketState,

    /// Congestion controller.
    cc: Box<dyn CongestionController>,

    /// Whether the connection is in loss recovery.
    in_recovery: bool,

    /// Congestion statistics.
    stats: CongestionStats,

    /// Configuration used to build the connection, kept for forking.
    config: Config,

    /// Time source shared with the controller.
    clock: Arc<dyn Clock>,
}

impl Connection {
    pub fn new(conf: &Config, clock: Arc<dyn Clock>) -> Self {
        let tcb = TcpSocketState::from_config(conf);
        let cc = build_congestion_controller(conf, clock.clone());
        Self::with_controller(conf, tcb, cc, clock)
    }

    fn with_controller(
        conf: &Config,
        tcb: TcpSocketState,
        cc: Box<dyn CongestionController>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let stats = CongestionStats {
            max_cwnd: tcb.cwnd,
            min_cwnd: tcb.cwnd,
            ..CongestionStats::default()
        };

        Self {
            trace_id: String::from("tcp"),
            tcb,
            cc,
            in_recovery: false,
            stats,
            config: conf.clone(),
            clock,
        }
    }

    /// Set the unique trace id for debug logging.
    pub fn set_trace_id(&mut self, trace_id: &str) {
        self.trace_id = trace_id.to_string();
    }

    /// Return the unique trace id.
    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    /// Create the connection state for a connection accepted by a listener.
    ///
    /// The accepted connection starts from a fresh control block and an
    /// independent copy of the listener's controller.
    pub fn fork(&self) -> Connection {
        let tcb = TcpSocketState::new(
            self.tcb.segment_size,
            self.tcb.initial_cwnd,
            self.config.slow_start_thresh,
        );
        let mut conn =
            Self::with_controller(&self.config, tcb, self.cc.fork(), self.clock.clone());
        conn.trace_id = format!("{}-forked", self.trace_id);

        debug!("{} forked as {}", self.trace_id, conn.trace_id);
        conn
    }

    /// Callback after a segment was sent out.
    pub fn on_sent(&mut self, sent_bytes: u32) {
        self.tcb.bytes_in_flight = self.tcb.bytes_in_flight.saturating_add(sent_bytes);
        self.stats.bytes_sent_in_total = self
            .stats
            .bytes_sent_in_total
            .saturating_add(sent_bytes as u64);
    }

    /// Callback after an acknowledgment covering `segments_acked` new
    /// segments, with the RTT sample it produced.
    pub fn on_ack(&mut self, segments_acked: u32, rtt: Duration) {
        let acked_bytes = segments_acked.saturating_mul(self.tcb.segment_size);
        self.tcb.bytes_in_flight = self.tcb.bytes_in_flight.saturating_sub(acked_bytes);
        self.tcb.update_rtt(rtt);

        self.stats.ack_event_count += 1;
        self.stats.bytes_acked_in_total = self
            .stats
            .bytes_acked_in_total
            .saturating_add(acked_bytes as u64);

        self.cc.pkts_acked(&self.tcb, segments_acked, rtt);

        if !self.in_recovery {
            self.cc.increase_window(&mut self.tcb, segments_acked);
            self.stats.max_cwnd = cmp::max(self.stats.max_cwnd, self.tcb.cwnd);
        }

        trace!(
            "{} on_ack segments_acked={} rtt={:?} cwnd={} ssthresh={} inflight={}",
            self.trace_id,
            segments_acked,
            rtt,
            self.tcb.cwnd,
            self.tcb.ssthresh,
            self.tcb.bytes_in_flight
        );
    }

    /// Callback after `lost_bytes` were declared lost.
    ///
    /// The first loss starts a recovery period in which the window is set to
    /// the controller's slow start threshold. Further losses within the same
    /// period only update the data in flight.
    pub fn on_loss(&mut self, lost_bytes: u32) {
        let bytes_in_flight = self.tcb.bytes_in_flight;
        self.tcb.bytes_in_flight = bytes_in_flight.saturating_sub(lost_bytes);
        self.stats.bytes_lost_in_total = self
            .stats
            .bytes_lost_in_total
            .saturating_add(lost_bytes as u64);

        if self.in_recovery {
            trace!("{} loss during recovery ignored", self.trace_id);
            return;
        }

        let ssthresh = self.cc.ssthresh(&self.tcb, bytes_in_flight);
        self.tcb.ssthresh = ssthresh;
        self.tcb.cwnd = ssthresh;
        self.in_recovery = true;

        self.stats.loss_event_count += 1;
        self.stats.min_cwnd = cmp::min(self.stats.min_cwnd, self.tcb.cwnd);

        debug!(
            "{} enter recovery {} ssthresh={} bw={:?}",
            self.trace_id,
            self.cc.name(),
            ssthresh,
            self.cc.bandwidth_estimate()
        );
    }

    /// Leave loss recovery once the lost data has been repaired.
    pub fn exit_recovery(&mut self) -> Result<()> {
        if !self.in_recovery {
            return Err(Error::InvalidState("not in recovery".into()));
        }

        self.in_recovery = false;
        debug!("{} exit recovery cwnd={}", self.trace_id, self.tcb.cwnd);
        Ok(())
    }

    /// Subscribe to changes of the controller's bandwidth estimate.
    pub fn connect_bandwidth_trace(&mut self, cb: TraceCallback<f64>) -> Result<()> {
        if self.cc.connect_bandwidth_trace(cb) {
            Ok(())
        } else {
            Err(Error::InvalidOperation(format!(
                "{} does not estimate bandwidth",
                self.cc.name()
            )))
        }
    }

    /// Check if in loss recovery.
    pub fn in_recovery(&self) -> bool {
        self.in_recovery
    }

    /// Check if in slow start.
    pub fn in_slow_start(&self) -> bool {
        self.tcb.in_slow_start()
    }

    /// Current congestion window in bytes.
    pub fn congestion_window(&self) -> u32 {
        self.tcb.cwnd
    }

    /// Current slow start threshold in bytes.
    pub fn ssthresh(&self) -> u32 {
        self.tcb.ssthresh
    }

    /// Bytes in flight.
    pub fn bytes_in_flight(&self) -> u32 {
        self.tcb.bytes_in_flight
    }

    /// Whether the window allows sending another segment.
    pub fn can_send(&self) -> bool {
        self.tcb.bytes_in_flight.saturating_add(self.tcb.segment_size) <= self.tcb.cwnd
    }

    /// Return the control block.
    pub fn tcb(&self) -> &TcpSocketState {
        &self.tcb
    }

    /// Return the congestion controller.
    pub fn congestion_controller(&self) -> &dyn CongestionController {
        self.cc.as_ref()
    }

    /// Congestion stats.
    pub fn stats(&self) -> &CongestionStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::CongestionControlAlgorithm;
    use std::sync::Mutex;

    fn new_conn(algor: CongestionControlAlgorithm) -> (Connection, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        let mut conf = Config::default();
        conf.set_segment_size(1000).unwrap();
        conf.set_initial_congestion_window(2);
        conf.set_congestion_control_algorithm(algor);

        (Connection::new(&conf, clock.clone()), clock)
    }

    #[test]
    fn connection_init() {
        let (conn, _) = new_conn(CongestionControlAlgorithm::Jersey);
        assert_eq!(conn.congestion_window(), 2000);
        assert_eq!(conn.ssthresh(), u32::MAX);
        assert_eq!(conn.bytes_in_flight(), 0);
        assert!(conn.in_slow_start());
        assert!(!conn.in_recovery());
        assert!(conn.can_send());
        assert_eq!(conn.congestion_controller().name(), "JERSEY");
        assert_eq!(conn.stats().max_cwnd, 2000);
        assert_eq!(conn.trace_id(), "tcp");
    }

    #[test]
    fn connection_sent_and_acked() {
        let (mut conn, clock) = new_conn(CongestionControlAlgorithm::Jersey);
        let rtt = Duration::from_millis(100);

        conn.on_sent(1000);
        conn.on_sent(1000);
        assert_eq!(conn.bytes_in_flight(), 2000);
        assert!(!conn.can_send());

        clock.set(Duration::from_millis(100));
        conn.on_ack(2, rtt);
        assert_eq!(conn.bytes_in_flight(), 0);
        assert_eq!(conn.congestion_window(), 4000);
        assert_eq!(conn.tcb().last_rtt(), rtt);
        assert_eq!(conn.stats().bytes_sent_in_total, 2000);
        assert_eq!(conn.stats().bytes_acked_in_total, 2000);
        assert_eq!(conn.stats().ack_event_count, 1);
        assert_eq!(conn.stats().max_cwnd, 4000);

        // (0 + 2 * 1000) / (0.1 + 0.1)
        let bw = conn.congestion_controller().bandwidth_estimate().unwrap();
        assert!((bw - 10000.0).abs() < 1e-6);
    }

    #[test]
    fn connection_recovery_cycle() {
        let (mut conn, clock) = new_conn(CongestionControlAlgorithm::Jersey);
        let rtt = Duration::from_millis(100);

        // Grow the window and the bandwidth estimate over a few RTTs.
        for i in 1..=5_u64 {
            let cwnd = conn.congestion_window();
            let segments = cwnd / 1000;
            conn.on_sent(cwnd);
            clock.set(Duration::from_millis(100 * i));
            conn.on_ack(segments, rtt);
        }
        assert_eq!(conn.congestion_window(), 64000);

        let bw = conn.congestion_controller().bandwidth_estimate().unwrap();
        assert!(bw > 0.0);

        conn.on_sent(10000);
        conn.on_loss(1000);
        assert!(conn.in_recovery());
        assert_eq!(conn.stats().loss_event_count, 1);
        assert_eq!(conn.bytes_in_flight(), 9000);

        let ownd = (0.1 * bw / 1000.0) as u32;
        let expected = cmp::max(2000, ownd * 1000);
        assert_eq!(conn.ssthresh(), expected);
        assert_eq!(conn.congestion_window(), expected);
        assert_eq!(conn.stats().min_cwnd, cmp::min(2000, expected));

        // A second loss in the same recovery period leaves the window alone.
        conn.on_loss(1000);
        assert_eq!(conn.stats().loss_event_count, 1);
        assert_eq!(conn.congestion_window(), expected);
        assert_eq!(conn.stats().bytes_lost_in_total, 2000);

        // No growth while in recovery.
        clock.set(Duration::from_millis(650));
        conn.on_ack(2, rtt);
        assert_eq!(conn.congestion_window(), expected);

        assert_eq!(conn.exit_recovery(), Ok(()));
        assert!(!conn.in_recovery());
        assert_eq!(
            conn.exit_recovery(),
            Err(Error::InvalidState("not in recovery".into()))
        );

        // Congestion avoidance after recovery.
        clock.set(Duration::from_millis(700));
        conn.on_ack(1, rtt);
        assert!(conn.congestion_window() > expected);
        assert!(!conn.in_slow_start());
    }

    #[test]
    fn connection_loss_with_queueing_delay() {
        let (mut conn, clock) = new_conn(CongestionControlAlgorithm::Jersey);

        // Tw = 0.1s, delta = 0.1s: 20 * 1000 / 0.2 = 100000 bytes/s.
        conn.on_sent(21000);
        clock.set(Duration::from_millis(100));
        conn.on_ack(20, Duration::from_millis(100));

        // Queueing inflates the latest sample.
        clock.set(Duration::from_millis(150));
        conn.on_ack(1, Duration::from_millis(400));
        assert_eq!(conn.tcb().last_rtt(), Duration::from_millis(400));
        assert_eq!(conn.tcb().min_rtt(), Duration::from_millis(100));

        // ownd = 0.1 * 100000 / 1000 = 10 segments.
        conn.on_loss(1000);
        assert_eq!(conn.ssthresh(), 10000);
        assert_eq!(conn.congestion_window(), 10000);
    }

    #[test]
    fn connection_new_reno_loss() {
        let (mut conn, clock) = new_conn(CongestionControlAlgorithm::NewReno);

        conn.on_sent(2000);
        clock.set(Duration::from_millis(100));
        conn.on_ack(2, Duration::from_millis(100));
        assert_eq!(conn.congestion_window(), 4000);

        conn.on_sent(4000);
        conn.on_loss(1000);
        assert_eq!(conn.ssthresh(), 2000);
        assert_eq!(conn.congestion_window(), 2000);
    }

    #[test]
    fn connection_zero_rtt_sample() {
        let (mut conn, clock) = new_conn(CongestionControlAlgorithm::Jersey);

        conn.on_sent(2000);
        clock.set(Duration::from_millis(100));
        conn.on_ack(2, Duration::ZERO);

        // The window still grows, the estimator and the RTT ignore the sample.
        assert_eq!(conn.congestion_window(), 4000);
        assert_eq!(conn.tcb().last_rtt(), Duration::ZERO);
        assert_eq!(
            conn.congestion_controller().bandwidth_estimate(),
            Some(0.0)
        );
    }

    #[test]
    fn connection_fork() {
        let (mut listener, clock) = new_conn(CongestionControlAlgorithm::Jersey);
        listener.set_trace_id("listener");

        listener.on_sent(2000);
        clock.set(Duration::from_millis(100));
        listener.on_ack(2, Duration::from_millis(100));
        let bw = listener.congestion_controller().bandwidth_estimate();

        let mut accepted = listener.fork();
        assert_eq!(accepted.trace_id(), "listener-forked");
        assert_eq!(listener.congestion_window(), 4000);
        assert_eq!(accepted.congestion_window(), listener.tcb().initial_cwnd);
        assert_eq!(accepted.congestion_window(), 2000);
        assert_eq!(accepted.bytes_in_flight(), 0);
        assert_eq!(accepted.stats().ack_event_count, 0);
        assert_eq!(accepted.congestion_controller().bandwidth_estimate(), bw);

        accepted.on_sent(3000);
        clock.set(Duration::from_millis(300));
        accepted.on_ack(3, Duration::from_millis(100));
        assert_ne!(accepted.congestion_controller().bandwidth_estimate(), bw);
        assert_eq!(listener.congestion_controller().bandwidth_estimate(), bw);
    }

    #[test]
    fn connection_bandwidth_trace() {
        let (mut conn, clock) = new_conn(CongestionControlAlgorithm::Jersey);
        let values = Arc::new(Mutex::new(Vec::new()));

        let v = values.clone();
        conn.connect_bandwidth_trace(Box::new(move |_, new| v.lock().unwrap().push(new)))
            .unwrap();

        conn.on_sent(2000);
        clock.set(Duration::from_millis(100));
        conn.on_ack(2, Duration::from_millis(100));
        assert_eq!(values.lock().unwrap().len(), 1);

        let (mut conn, _) = new_conn(CongestionControlAlgorithm::NewReno);
        assert!(conn.connect_bandwidth_trace(Box::new(|_, _| {})).is_err());
    }
}

pub mod tcb;
