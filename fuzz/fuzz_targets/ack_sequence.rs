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

#![no_main]

use std::sync::Arc;
use std::time::Duration;

use lazy_static::lazy_static;
use libfuzzer_sys::fuzz_target;

use tcp_jersey::clock::ManualClock;
use tcp_jersey::Config;
use tcp_jersey::Connection;

lazy_static! {
    static ref CONFIG: Config = {
        let mut conf = Config::new();
        conf.set_segment_size(1460).unwrap();
        conf.set_jersey_window_multiplier(4).unwrap();
        conf
    };
}

// Each event is six bytes: acked segments, RTT in milliseconds, time since the
// previous event in milliseconds and an action byte.
fuzz_target!(|data: &[u8]| {
    let clock = Arc::new(ManualClock::default());
    let mut conn = Connection::new(&CONFIG, clock.clone());
    let floor = 2 * CONFIG.segment_size;

    for ev in data.chunks_exact(6) {
        let segments = ev[0] as u32;
        let rtt = Duration::from_millis(u16::from_be_bytes([ev[1], ev[2]]) as u64);
        let dt = Duration::from_millis(u16::from_be_bytes([ev[3], ev[4]]) as u64);

        clock.advance(dt);
        conn.on_sent(segments * CONFIG.segment_size);
        conn.on_ack(segments, rtt);

        match ev[5] % 4 {
            0 => conn.on_loss(CONFIG.segment_size),
            1 => {
                conn.exit_recovery().ok();
            }
            _ => (),
        }

        let cc = conn.congestion_controller();
        let bw = cc.bandwidth_estimate().unwrap();
        assert!(bw.is_finite() && bw >= 0.0);
        assert!(cc.ssthresh(conn.tcb(), conn.bytes_in_flight()) >= floor);
    }
});
