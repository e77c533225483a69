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

//! A single bottleneck link simulation for congestion controllers.

use std::cmp;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use clap::builder::PossibleValue;
use clap::ValueEnum;
use log::debug;
use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use serde::Serialize;

use tcp_jersey::clock::Clock;
use tcp_jersey::clock::ManualClock;
use tcp_jersey::CongestionStats;
use tcp_jersey::Config;
use tcp_jersey::Connection;

pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;

/// Output formats of the simulation records.
#[derive(Clone, Copy, Default, PartialEq, Debug)]
pub enum OutputFormat {
    /// One human readable line per record.
    #[default]
    Text,

    /// One JSON object per record.
    Json,
}

impl ValueEnum for OutputFormat {
    fn to_possible_value(&self) -> Option<PossibleValue> {
        Some(match self {
            Self::Text => PossibleValue::new("text"),
            Self::Json => PossibleValue::new("json"),
        })
    }

    fn value_variants<'a>() -> &'a [Self] {
        &[Self::Text, Self::Json]
    }
}

/// Parameters of the bottleneck link.
#[derive(Clone, Debug)]
pub struct LinkConfig {
    /// Link capacity in bytes per second.
    pub capacity: f64,

    /// Propagation RTT without queueing.
    pub base_rtt: Duration,

    /// Queue size in bytes. Segments arriving at a full queue are dropped.
    pub buffer: u64,

    /// Upper bound of the random delay added to each acknowledgment.
    pub jitter: Duration,

    /// Seed of the jitter generator.
    pub seed: u64,
}

/// Something observed during the simulation.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Record {
    /// The bandwidth estimate changed.
    Bandwidth { time: f64, old: f64, new: f64 },

    /// A loss started a recovery period.
    Loss { time: f64, ssthresh: u32, bw: Option<f64> },

    /// The recovery period ended.
    Recovered { time: f64, cwnd: u32 },

    /// Final statistics.
    Stats { time: f64, stats: CongestionStats },
}

impl Record {
    /// Format the record.
    pub fn format(&self, format: OutputFormat) -> Result<String> {
        if format == OutputFormat::Json {
            return Ok(serde_json::to_string(self)?);
        }

        Ok(match self {
            Record::Bandwidth { time, old, new } => {
                format!("{:.6} abe {:.1} -> {:.1}", time, old, new)
            }
            Record::Loss { time, ssthresh, bw } => {
                format!("{:.6} loss ssthresh={} bw={:?}", time, ssthresh, bw)
            }
            Record::Recovered { time, cwnd } => {
                format!("{:.6} recovered cwnd={}", time, cwnd)
            }
            Record::Stats { time, stats } => format!("{:.6} stats {:?}", time, stats),
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum Event {
    /// Acknowledgment of a segment, carrying its RTT sample.
    Ack { seq: u64, rtt: Duration },

    /// Detection of a dropped segment.
    Loss { seq: u64 },
}

/// A sender pushing a bulk transfer through a drop-tail bottleneck.
pub struct Simulator {
    link: LinkConfig,
    conn: Connection,
    clock: Arc<ManualClock>,
    rng: StdRng,

    /// Pending events ordered by time.
    events: BinaryHeap<Reverse<(Duration, u64, Event)>>,

    /// Tie breaker of events at the same time.
    event_seq: u64,

    /// Sequence number of the next segment.
    next_seq: u64,

    /// Time the link finishes transmitting the queued segments.
    link_free: Duration,

    /// Segments sent before this sequence number belong to the recovery
    /// period.
    recovery_point: u64,

    /// Records produced since the last drain.
    records: Arc<Mutex<Vec<Record>>>,
}

impl Simulator {
    pub fn new(conf: &Config, link: LinkConfig) -> Result<Self> {
        if !link.capacity.is_finite() || link.capacity <= 0.0 {
            return Err(format!("invalid link capacity {}", link.capacity).into());
        }

        let clock = Arc::new(ManualClock::default());
        let mut conn = Connection::new(conf, clock.clone());
        conn.set_trace_id("sim");

        let records = Arc::new(Mutex::new(Vec::new()));
        let r = records.clone();
        let c = clock.clone();
        // Controllers without an estimate simply produce no bandwidth records.
        conn.connect_bandwidth_trace(Box::new(move |old, new| {
            if let Ok(mut r) = r.lock() {
                r.push(Record::Bandwidth {
                    time: c.now().as_secs_f64(),
                    old,
                    new,
                });
            }
        }))
        .ok();

        let rng = StdRng::seed_from_u64(link.seed);
        Ok(Self {
            link,
            conn,
            clock,
            rng,
            events: BinaryHeap::new(),
            event_seq: 0,
            next_seq: 0,
            link_free: Duration::ZERO,
            recovery_point: 0,
            records,
        })
    }

    fn schedule(&mut self, time: Duration, event: Event) {
        self.event_seq += 1;
        self.events.push(Reverse((time, self.event_seq, event)));
    }

    /// Send as many segments as the congestion window allows.
    fn fill_window(&mut self) {
        let now = self.clock.now();
        let segment_size = self.conn.tcb().segment_size;
        let tx_time = Duration::from_secs_f64(segment_size as f64 / self.link.capacity);

        while self.conn.can_send() {
            let seq = self.next_seq;
            self.next_seq += 1;

            self.link_free = cmp::max(self.link_free, now);
            let queued = (self.link_free - now).as_secs_f64() * self.link.capacity;

            if queued as u64 + segment_size as u64 > self.link.buffer {
                // Dropped at the queue, noticed about one RTT later.
                self.schedule(now + self.link.base_rtt, Event::Loss { seq });
            } else {
                self.link_free += tx_time;
                let jitter = self.jitter();
                let ack_time = self.link_free + self.link.base_rtt + jitter;
                self.schedule(
                    ack_time,
                    Event::Ack {
                        seq,
                        rtt: ack_time - now,
                    },
                );
            }

            self.conn.on_sent(segment_size);
        }
    }

    fn jitter(&mut self) -> Duration {
        let max = self.link.jitter.as_micros() as u64;
        if max == 0 {
            return Duration::ZERO;
        }
        Duration::from_micros(self.rng.gen_range(0..=max))
    }

    /// Run the transfer for `duration`, handing every record to `output`.
    pub fn run<F>(&mut self, duration: Duration, mut output: F) -> Result<()>
    where
        F: FnMut(&Record) -> Result<()>,
    {
        self.fill_window();

        while let Some(Reverse((time, _, event))) = self.events.pop() {
            if time > duration {
                break;
            }
            self.clock.set(time);

            match event {
                Event::Ack { seq, rtt } => {
                    self.conn.on_ack(1, rtt);

                    if self.conn.in_recovery() && seq >= self.recovery_point {
                        self.conn.exit_recovery()?;
                        self.push(Record::Recovered {
                            time: time.as_secs_f64(),
                            cwnd: self.conn.congestion_window(),
                        });
                    }
                }

                Event::Loss { seq } => {
                    let in_recovery = self.conn.in_recovery();
                    self.conn.on_loss(self.conn.tcb().segment_size);

                    if !in_recovery {
                        self.recovery_point = self.next_seq;
                        self.push(Record::Loss {
                            time: time.as_secs_f64(),
                            ssthresh: self.conn.ssthresh(),
                            bw: self.conn.congestion_controller().bandwidth_estimate(),
                        });
                        debug!("segment {} lost, recovery until {}", seq, self.recovery_point);
                    }
                }
            }

            self.fill_window();
            self.drain(&mut output)?;
        }

        self.push(Record::Stats {
            time: self.clock.now().as_secs_f64(),
            stats: self.conn.stats().clone(),
        });
        self.drain(&mut output)
    }

    fn push(&self, record: Record) {
        if let Ok(mut r) = self.records.lock() {
            r.push(record);
        }
    }

    fn drain<F>(&self, output: &mut F) -> Result<()>
    where
        F: FnMut(&Record) -> Result<()>,
    {
        let records = match self.records.lock() {
            Ok(mut r) => std::mem::take(&mut *r),
            Err(_) => return Err("records lock poisoned".into()),
        };

        for record in records.iter() {
            output(record)?;
        }
        Ok(())
    }

    /// Return the simulated connection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link() -> LinkConfig {
        LinkConfig {
            capacity: 125_000.0,
            base_rtt: Duration::from_millis(100),
            buffer: 20_000,
            jitter: Duration::ZERO,
            seed: 1,
        }
    }

    #[test]
    fn simulate_jersey() -> Result<()> {
        let mut conf = Config::new();
        conf.set_segment_size(1000)?;

        let mut sim = Simulator::new(&conf, link())?;
        let mut records = Vec::new();
        sim.run(Duration::from_secs(10), |r| {
            records.push(r.clone());
            Ok(())
        })?;

        assert!(records
            .iter()
            .any(|r| matches!(r, Record::Bandwidth { .. })));
        assert!(records.iter().any(|r| matches!(r, Record::Loss { .. })));
        assert!(matches!(records.last(), Some(Record::Stats { .. })));

        let bw = sim
            .connection()
            .congestion_controller()
            .bandwidth_estimate()
            .unwrap();
        assert!(bw > 0.0);
        assert!(sim.connection().stats().loss_event_count > 0);
        Ok(())
    }

    #[test]
    fn simulate_new_reno() -> Result<()> {
        let mut conf = Config::new();
        conf.set_congestion_control_algorithm_name("newreno")?;

        let mut sim = Simulator::new(&conf, link())?;
        let mut bandwidth_records = 0;
        sim.run(Duration::from_secs(5), |r| {
            if let Record::Bandwidth { .. } = r {
                bandwidth_records += 1;
            }
            Ok(())
        })?;

        assert_eq!(bandwidth_records, 0);
        assert!(sim.connection().stats().loss_event_count > 0);
        Ok(())
    }

    #[test]
    fn record_format() -> Result<()> {
        let r = Record::Recovered {
            time: 1.5,
            cwnd: 4000,
        };
        assert_eq!(r.format(OutputFormat::Text)?, "1.500000 recovered cwnd=4000");
        assert_eq!(
            r.format(OutputFormat::Json)?,
            r#"{"event":"recovered","time":1.5,"cwnd":4000}"#
        );
        Ok(())
    }
}
