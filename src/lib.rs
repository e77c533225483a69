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

//! An implementation of TCP Jersey congestion control.
//!
//! Jersey estimates the available bandwidth of a path from the rate at which
//! acknowledgments arrive, and uses that estimate to choose the slow start
//! threshold after a loss. Window growth is inherited from NewReno.
//!
//! The crate does not implement TCP itself. A transport drives a
//! [`CongestionController`] through its callbacks, or uses [`Connection`] which
//! wires the callbacks to a control block and a simple loss recovery cycle.
//!
//! ## Get started
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//! use tcp_jersey::clock::ManualClock;
//! use tcp_jersey::{Config, Connection};
//!
//! let clock = Arc::new(ManualClock::default());
//! let mut conf = Config::new();
//! conf.set_jersey_window_multiplier(4)?;
//!
//! let mut conn = Connection::new(&conf, clock.clone());
//! conn.on_sent(conf.segment_size);
//! clock.advance(Duration::from_millis(100));
//! conn.on_ack(1, Duration::from_millis(100));
//! assert!(conn.congestion_controller().bandwidth_estimate().unwrap() > 0.0);
//! # Ok::<(), tcp_jersey::error::Error>(())
//! ```

use std::cmp;

use crate::congestion_control::FlowType;
use crate::congestion_control::ProfileType;

/// Default segment size in bytes.
pub const DEFAULT_SEGMENT_SIZE: u32 = 536;

/// Default initial congestion window in segments.
pub const DEFAULT_INITIAL_CONGESTION_WINDOW: u32 = 10;

/// Result type for congestion control operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Configurations about congestion control.
#[derive(Debug, Clone)]
pub struct Config {
    /// The congestion control algorithm used for a connection.
    pub congestion_control_algorithm: CongestionControlAlgorithm,

    /// The segment size in bytes.
    pub segment_size: u32,

    /// The initial congestion window in segments.
    pub initial_congestion_window: u32,

    /// The initial threshold for slow start in bytes.
    pub slow_start_thresh: u32,

    /// Multiplier K of Jersey's bandwidth estimation window, Tw = K * RTT.
    pub jersey_window_multiplier: u32,

    /// Jersey variant.
    pub jersey_profile_type: ProfileType,

    /// Jersey sample filter.
    pub jersey_flow_type: FlowType,
}

impl Config {
    /// Create default configuration.
    ///
    /// The configuration may be customized by calling related set methods.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the congestion control algorithm.
    /// The default value is Jersey.
    pub fn set_congestion_control_algorithm(&mut self, v: CongestionControlAlgorithm) {
        self.congestion_control_algorithm = v;
    }

    /// Set the congestion control algorithm by name.
    pub fn set_congestion_control_algorithm_name(&mut self, v: &str) -> Result<()> {
        self.congestion_control_algorithm = v.parse()?;
        Ok(())
    }

    /// Set the segment size in bytes. It must be positive.
    /// The default value is `536`.
    pub fn set_segment_size(&mut self, v: u32) -> Result<()> {
        if v == 0 {
            return Err(Error::InvalidConfig("segment size".into()));
        }
        self.segment_size = v;
        Ok(())
    }

    /// Set the initial congestion window in segments. Zero is raised to one.
    /// The default value is `10`.
    pub fn set_initial_congestion_window(&mut self, v: u32) {
        self.initial_congestion_window = cmp::max(v, 1);
    }

    /// Set the initial slow start threshold in bytes.
    /// The default value is `u32::MAX`.
    pub fn set_slow_start_thresh(&mut self, v: u32) {
        self.slow_start_thresh = v;
    }

    /// Set the multiplier K of Jersey's estimation window. It must be
    /// positive. The default value is `1`.
    pub fn set_jersey_window_multiplier(&mut self, v: u32) -> Result<()> {
        if v == 0 {
            return Err(Error::InvalidConfig("jersey window multiplier".into()));
        }
        self.jersey_window_multiplier = v;
        Ok(())
    }

    /// Set the Jersey variant by name.
    pub fn set_jersey_profile_type(&mut self, v: &str) -> Result<()> {
        self.jersey_profile_type = v
            .parse()
            .map_err(|_| Error::InvalidConfig(format!("jersey profile type {}", v)))?;
        Ok(())
    }

    /// Set the Jersey sample filter by name.
    pub fn set_jersey_flow_type(&mut self, v: &str) -> Result<()> {
        self.jersey_flow_type = v
            .parse()
            .map_err(|_| Error::InvalidConfig(format!("jersey flow type {}", v)))?;
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Config {
        Config {
            congestion_control_algorithm: CongestionControlAlgorithm::Jersey,
            segment_size: DEFAULT_SEGMENT_SIZE,
            initial_congestion_window: DEFAULT_INITIAL_CONGESTION_WINDOW,
            slow_start_thresh: u32::MAX,
            jersey_window_multiplier: congestion_control::DEFAULT_WINDOW_MULTIPLIER,
            jersey_profile_type: ProfileType::default(),
            jersey_flow_type: FlowType::default(),
        }
    }
}


pub use crate::congestion_control::build_congestion_controller;
pub use crate::congestion_control::CongestionControlAlgorithm;
pub use crate::congestion_control::CongestionController;
pub use crate::connection::tcb::TcpSocketState;
pub use crate::connection::CongestionStats;
pub use crate::connection::Connection;
pub use crate::error::Error;

#[path = "connection/connection.rs"]
pub mod connection;

#[path = "congestion_control/congestion_control.rs"]
pub mod congestion_control;

pub mod clock;
pub mod error;
pub mod trace;
