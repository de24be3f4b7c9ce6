// SPDX-License-Identifier: GPL-2.0
//
// scx_cass: capacity-aware wakeup CPU selection

use clap::Parser;
use scx_cass::run;
use scx_cass::Opts;

fn main() -> anyhow::Result<()> {
    let opts = Opts::parse();

    let llv = match opts.verbose {
        0 => simplelog::LevelFilter::Info,
        1 => simplelog::LevelFilter::Debug,
        _ => simplelog::LevelFilter::Trace,
    };

    let mut lcfg = simplelog::ConfigBuilder::new();
    let _ = lcfg.set_time_offset_to_local();
    simplelog::TermLogger::init(
        llv,
        lcfg.set_time_level(simplelog::LevelFilter::Error)
            .set_location_level(simplelog::LevelFilter::Off)
            .set_target_level(simplelog::LevelFilter::Off)
            .set_thread_level(simplelog::LevelFilter::Off)
            .build(),
        simplelog::TerminalMode::Stderr,
        simplelog::ColorChoice::Auto,
    )?;

    run(opts)
}
