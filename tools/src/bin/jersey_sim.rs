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

//! A bulk transfer over a simulated bottleneck, printing the bandwidth
//! estimate and the slow start threshold chosen at each loss.

use std::io::Write;
use std::time::Duration;

use clap::Parser;
use log::info;

use tcp_jersey::CongestionControlAlgorithm;
use tcp_jersey::Config;
use tcp_jersey_tools::LinkConfig;
use tcp_jersey_tools::OutputFormat;
use tcp_jersey_tools::Result;
use tcp_jersey_tools::Simulator;

#[derive(Parser, Debug)]
#[clap(name = "jersey_sim")]
pub struct SimOpt {
    /// Log level, support OFF/ERROR/WARN/INFO/DEBUG/TRACE.
    #[clap(long, default_value = "INFO")]
    pub log_level: log::LevelFilter,

    /// Congestion control algorithm.
    #[clap(long, default_value = "JERSEY")]
    pub congestion_control_algor: CongestionControlAlgorithm,

    /// Segment size in bytes.
    #[clap(long, default_value = "1460", value_name = "NUM")]
    pub segment_size: u32,

    /// Initial congestion window in segments.
    #[clap(long, default_value = "10", value_name = "NUM")]
    pub initial_congestion_window: u32,

    /// Multiplier of the RTT giving Jersey's estimation window.
    #[clap(long, default_value = "1", value_name = "NUM")]
    pub window_multiplier: u32,

    /// Jersey variant.
    #[clap(long, default_value = "jersey", value_name = "STR")]
    pub profile_type: String,

    /// Jersey sample filter.
    #[clap(long, default_value = "none", value_name = "STR")]
    pub flow_type: String,

    /// Bottleneck capacity in kilobits per second.
    #[clap(long, default_value = "10000", value_name = "KBPS")]
    pub capacity: u64,

    /// Propagation RTT in milliseconds.
    #[clap(long, default_value = "100", value_name = "TIME")]
    pub rtt: u64,

    /// Bottleneck queue size in bytes.
    #[clap(long, default_value = "131072", value_name = "NUM")]
    pub buffer: u64,

    /// Maximum random delay added to acknowledgments, in milliseconds.
    #[clap(long, default_value = "0", value_name = "TIME")]
    pub jitter: u64,

    /// Seed of the jitter generator.
    #[clap(long, default_value = "0", value_name = "NUM")]
    pub seed: u64,

    /// Simulated duration in seconds.
    #[clap(long, default_value = "30", value_name = "TIME")]
    pub duration: u64,

    /// Output format.
    #[clap(long, default_value = "text")]
    pub format: OutputFormat,
}

fn main() -> Result<()> {
    let option = SimOpt::parse();

    // Initialize logging.
    env_logger::builder().filter_level(option.log_level).init();

    let mut conf = Config::new();
    conf.set_congestion_control_algorithm(option.congestion_control_algor);
    conf.set_segment_size(option.segment_size)?;
    conf.set_initial_congestion_window(option.initial_congestion_window);
    conf.set_jersey_window_multiplier(option.window_multiplier)?;
    conf.set_jersey_profile_type(&option.profile_type)?;
    conf.set_jersey_flow_type(&option.flow_type)?;

    let link = LinkConfig {
        capacity: option.capacity as f64 * 1000.0 / 8.0,
        base_rtt: Duration::from_millis(option.rtt),
        buffer: option.buffer,
        jitter: Duration::from_millis(option.jitter),
        seed: option.seed,
    };
    info!("simulating {:?} over {:?}", conf, link);

    let mut sim = Simulator::new(&conf, link)?;
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    sim.run(Duration::from_secs(option.duration), |record| {
        writeln!(out, "{}", record.format(option.format)?)?;
        Ok(())
    })?;

    Ok(())
}
