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

#![allow(unused_variables)]

use core::str::FromStr;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::clock::Clock;
use crate::connection::tcb::TcpSocketState;
use crate::trace::TraceCallback;
use crate::Config;
use crate::Error;
use crate::Result;
pub use jersey::FlowType;
pub use jersey::Jersey;
pub use jersey::JerseyConfig;
pub use jersey::ProfileType;
pub use jersey::DEFAULT_WINDOW_MULTIPLIER;
pub use new_reno::NewReno;

/// Available congestion control algorithm
#[repr(C)]
#[derive(Eq, PartialEq, Debug, Clone, Copy, Default)]
pub enum CongestionControlAlgorithm {
    /// NewReno grows the window exponentially in slow start and linearly in
    /// congestion avoidance, and halves the data in flight on loss.
    NewReno,

    /// Jersey keeps NewReno's window growth but sets the slow start threshold
    /// after a loss from an estimate of the available bandwidth, so the
    /// window is cut to what the path can actually sustain.
    #[default]
    Jersey,
}

impl FromStr for CongestionControlAlgorithm {
    type Err = Error;

    fn from_str(algor: &str) -> Result<CongestionControlAlgorithm> {
        if algor.eq_ignore_ascii_case("newreno") || algor.eq_ignore_ascii_case("new_reno") {
            Ok(CongestionControlAlgorithm::NewReno)
        } else if algor.eq_ignore_ascii_case("jersey") {
            Ok(CongestionControlAlgorithm::Jersey)
        } else {
            Err(Error::InvalidConfig("unknown".into()))
        }
    }
}

/// Congestion control interfaces shared by different algorithms.
///
/// The transport owns the congestion state machine and calls into the
/// controller on each event. Controllers only adjust the window growth and
/// the slow start threshold.
pub trait CongestionController: Send {
    /// Name of congestion control algorithm.
    fn name(&self) -> &str;

    /// Callback after segments were acknowledged, with the RTT sample taken
    /// from this acknowledgment.
    fn pkts_acked(&mut self, tcb: &TcpSocketState, segments_acked: u32, rtt: Duration) {}

    /// Slow start threshold in bytes to use after a loss event.
    fn ssthresh(&self, tcb: &TcpSocketState, bytes_in_flight: u32) -> u32;

    /// Grow the congestion window after an acknowledgment.
    fn increase_window(&mut self, tcb: &mut TcpSocketState, segments_acked: u32) {
        new_reno::increase_window(tcb, segments_acked)
    }

    /// Duplicate the controller for a connection accepted by a listener.
    fn fork(&self) -> Box<dyn CongestionController>;

    /// Current available bandwidth estimate in bytes per second.
    /// If the algorithm does not estimate bandwidth, return None.
    fn bandwidth_estimate(&self) -> Option<f64> {
        None
    }

    /// Subscribe to changes of the bandwidth estimate. Return false if the
    /// algorithm does not estimate bandwidth.
    fn connect_bandwidth_trace(&mut self, cb: TraceCallback<f64>) -> bool {
        false
    }
}

impl fmt::Debug for dyn CongestionController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "congestion controller {}.", self.name())
    }
}

/// Build a congestion controller.
pub fn build_congestion_controller(
    conf: &Config,
    clock: Arc<dyn Clock>,
) -> Box<dyn CongestionController> {
    match conf.congestion_control_algorithm {
        CongestionControlAlgorithm::NewReno => Box::new(NewReno::new()),
        CongestionControlAlgorithm::Jersey => {
            Box::new(Jersey::new(JerseyConfig::from(conf), clock))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    #[test]
    fn congestion_control_name() {
        let cases = [
            ("newreno", Ok(CongestionControlAlgorithm::NewReno)),
            ("NewReno", Ok(CongestionControlAlgorithm::NewReno)),
            ("new_reno", Ok(CongestionControlAlgorithm::NewReno)),
            ("jersey", Ok(CongestionControlAlgorithm::Jersey)),
            ("Jersey", Ok(CongestionControlAlgorithm::Jersey)),
            ("JERSEY", Ok(CongestionControlAlgorithm::Jersey)),
            ("jresey", Err(Error::InvalidConfig("unknown".into()))),
        ];

        for (name, algor) in cases {
            assert_eq!(CongestionControlAlgorithm::from_str(name), algor);
        }
    }

    #[test]
    fn build_controllers() {
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::default());
        let mut conf = Config::default();

        let cc = build_congestion_controller(&conf, clock.clone());
        assert_eq!(cc.name(), "JERSEY");
        assert_eq!(cc.bandwidth_estimate(), Some(0.0));
        assert_eq!(format!("{:?}", cc), "congestion controller JERSEY.");

        conf.set_congestion_control_algorithm(CongestionControlAlgorithm::NewReno);
        let mut cc = build_congestion_controller(&conf, clock);
        assert_eq!(cc.name(), "NEW_RENO");
        assert_eq!(cc.bandwidth_estimate(), None);
        assert!(!cc.connect_bandwidth_trace(Box::new(|_, _| {})));
    }
}

mod jersey;
mod new_reno;
