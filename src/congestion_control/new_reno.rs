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

//! NewReno window growth.
//!
//! See <https://www.rfc-editor.org/rfc/rfc5681.html> and
//! <https://www.rfc-editor.org/rfc/rfc6582.html>.

use std::cmp;

use log::*;

use super::CongestionController;
use crate::connection::tcb::TcpSocketState;

/// Grow the window in slow start by one segment per acked segment, without
/// exceeding ssthresh. Return the acked segments left over once ssthresh has
/// been reached.
fn slow_start(tcb: &mut TcpSocketState, segments_acked: u32) -> u32 {
    if segments_acked == 0 {
        return 0;
    }

    let old_cwnd = tcb.cwnd;
    let inc = segments_acked.saturating_mul(tcb.segment_size);
    tcb.cwnd = cmp::min(old_cwnd.saturating_add(inc), tcb.ssthresh);

    let used = (tcb.cwnd - old_cwnd) / tcb.segment_size;
    segments_acked.saturating_sub(used)
}

/// Grow the window in congestion avoidance by roughly one segment per RTT.
fn congestion_avoidance(tcb: &mut TcpSocketState, segments_acked: u32) {
    if segments_acked == 0 {
        return;
    }

    // cwnd += SMSS*SMSS/cwnd, at least one byte.
    let seg = tcb.segment_size as f64;
    let adder = (seg * seg / tcb.cwnd.max(1) as f64).max(1.0);
    tcb.cwnd = tcb.cwnd.saturating_add(adder as u32);
}

/// The default window growth shared by every controller.
pub(super) fn increase_window(tcb: &mut TcpSocketState, segments_acked: u32) {
    if tcb.segment_size == 0 {
        return;
    }

    let mut segments_acked = segments_acked;
    if tcb.in_slow_start() {
        segments_acked = slow_start(tcb, segments_acked);
    }

    if !tcb.in_slow_start() {
        congestion_avoidance(tcb, segments_acked);
    }

    trace!(
        "increase_window cwnd={} ssthresh={} segments_acked={}",
        tcb.cwnd,
        tcb.ssthresh,
        segments_acked
    );
}

/// NewReno congestion control algorithm.
#[derive(Debug, Default, Clone)]
pub struct NewReno;

impl NewReno {
    pub fn new() -> Self {
        Self
    }
}

impl CongestionController for NewReno {
    fn name(&self) -> &str {
        "NEW_RENO"
    }

    fn ssthresh(&self, tcb: &TcpSocketState, bytes_in_flight: u32) -> u32 {
        // ssthresh = max(FlightSize / 2, 2*SMSS)
        cmp::max(tcb.segment_size.saturating_mul(2), bytes_in_flight / 2)
    }

    fn fork(&self) -> Box<dyn CongestionController> {
        Box::new(self.clone())
    }
}
