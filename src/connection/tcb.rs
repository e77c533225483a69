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

use std::cmp;
use std::time::Duration;

use crate::Config;

/// Transmission control block: the connection state shared between the
/// transport and its congestion controller.
#[derive(Debug, Clone)]
pub struct TcpSocketState {
    /// Segment size in bytes.
    pub segment_size: u32,

    /// Congestion window in bytes.
    pub cwnd: u32,

    /// Slow start threshold in bytes.
    pub ssthresh: u32,

    /// Initial congestion window in bytes.
    pub initial_cwnd: u32,

    /// Bytes sent but not yet acknowledged or declared lost.
    pub bytes_in_flight: u32,

    /// The most recent RTT sample.
    last_rtt: Duration,

    /// The minimum RTT observed on the connection.
    min_rtt: Option<Duration>,
}

impl TcpSocketState {
    pub fn new(segment_size: u32, initial_cwnd: u32, ssthresh: u32) -> Self {
        Self {
            segment_size,
            cwnd: initial_cwnd,
            ssthresh,
            initial_cwnd,
            bytes_in_flight: 0,
            last_rtt: Duration::ZERO,
            min_rtt: None,
        }
    }

    pub fn from_config(conf: &Config) -> Self {
        let segment_size = conf.segment_size;
        let initial_cwnd = conf
            .initial_congestion_window
            .saturating_mul(segment_size);

        Self::new(segment_size, initial_cwnd, conf.slow_start_thresh)
    }

    /// Return the latest rtt sample, zero before any sample.
    pub fn last_rtt(&self) -> Duration {
        self.last_rtt
    }

    /// Return the minimum RTT observed so far, zero before any sample.
    pub fn min_rtt(&self) -> Duration {
        self.min_rtt.unwrap_or(Duration::ZERO)
    }

    /// Record an RTT sample. Zero samples carry no information and are
    /// ignored.
    pub fn update_rtt(&mut self, rtt: Duration) {
        if rtt.is_zero() {
            return;
        }

        self.last_rtt = rtt;
        self.min_rtt = Some(match self.min_rtt {
            Some(min_rtt) => cmp::min(min_rtt, rtt),
            None => rtt,
        });
    }

    /// Set the minimum RTT directly, e.g. from a previous connection to the
    /// same peer.
    pub fn set_min_rtt(&mut self, rtt: Duration) {
        self.min_rtt = Some(rtt);
    }

    /// Check if in slow start.
    pub fn in_slow_start(&self) -> bool {
        self.cwnd < self.ssthresh
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial() {
        let tcb = TcpSocketState::new(1000, 10000, u32::MAX);
        assert_eq!(tcb.cwnd, 10000);
        assert_eq!(tcb.initial_cwnd, 10000);
        assert_eq!(tcb.last_rtt(), Duration::ZERO);
        assert_eq!(tcb.min_rtt(), Duration::ZERO);
        assert!(tcb.in_slow_start());
    }

    #[test]
    fn from_config() {
        let conf = Config::default();
        let tcb = TcpSocketState::from_config(&conf);
        assert_eq!(tcb.segment_size, conf.segment_size);
        assert_eq!(
            tcb.cwnd,
            conf.segment_size * conf.initial_congestion_window
        );
        assert_eq!(tcb.ssthresh, conf.slow_start_thresh);
    }

    #[test]
    fn update_rtt() {
        let mut tcb = TcpSocketState::new(1000, 10000, u32::MAX);

        tcb.update_rtt(Duration::from_millis(200));
        assert_eq!(tcb.last_rtt(), Duration::from_millis(200));
        assert_eq!(tcb.min_rtt(), Duration::from_millis(200));

        tcb.update_rtt(Duration::from_millis(100));
        tcb.update_rtt(Duration::from_millis(300));
        assert_eq!(tcb.last_rtt(), Duration::from_millis(300));
        assert_eq!(tcb.min_rtt(), Duration::from_millis(100));

        // Zero samples are ignored.
        tcb.update_rtt(Duration::ZERO);
        assert_eq!(tcb.last_rtt(), Duration::from_millis(300));
        assert_eq!(tcb.min_rtt(), Duration::from_millis(100));
    }

    #[test]
    fn set_min_rtt() {
        let mut tcb = TcpSocketState::new(1000, 10000, u32::MAX);
        tcb.set_min_rtt(Duration::from_millis(40));
        assert_eq!(tcb.min_rtt(), Duration::from_millis(40));
        assert_eq!(tcb.last_rtt(), Duration::ZERO);

        tcb.update_rtt(Duration::from_millis(60));
        assert_eq!(tcb.min_rtt(), Duration::from_millis(40));
    }
}
