use argh::FromArgs;
use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use lidarloc::{
    l3d::io::pcd::read_pcd,
    messages::{Stamp, StampedCloud},
    replay::{read_fixes, scan_paths, stamp_from_stem, FixSchedule},
    sink::LogSink,
    LocalizerConfig, LocalizerNode,
};

#[derive(FromArgs)]
/// Replay a recorded drive through the localizer
struct Args {
    /// path to the JSON configuration, defaults are used when omitted
    #[argh(option)]
    config: Option<PathBuf>,

    /// path to the reference map PCD file
    #[argh(option)]
    map: PathBuf,

    /// directory with one PCD file per scan
    #[argh(option)]
    scans: PathBuf,

    /// CSV file of position fixes with columns sec,nanosec,x,y,z
    #[argh(option)]
    fixes: PathBuf,

    /// path of the trajectory log, overrides the configuration
    #[argh(option)]
    output: Option<PathBuf>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args: Args = argh::from_env();

    let mut config = match &args.config {
        Some(path) => LocalizerConfig::from_file(path)?,
        None => LocalizerConfig::default(),
    };
    if let Some(output) = args.output {
        config.result_save_path = output;
    }

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = Arc::clone(&running);
        ctrlc::set_handler(move || running.store(false, Ordering::SeqCst))?;
    }

    let mut node = LocalizerNode::from_config(&config, Arc::new(LogSink))?;

    let map_feeder = {
        let inputs = node.readiness_inputs();
        let map_frame = config.map_frame.clone();
        let path = args.map.clone();
        std::thread::spawn(move || -> Result<(), lidarloc::l3d::io::pcd::PcdError> {
            let cloud = read_pcd(&path)?;
            inputs.on_map(StampedCloud {
                stamp: Stamp::default(),
                frame_id: map_frame,
                cloud,
            });
            Ok(())
        })
    };

    let mut fixes = FixSchedule::new(read_fixes(std::fs::File::open(&args.fixes)?)?);
    if fixes.remaining() == 0 {
        return Err("no position fix to seed the localizer".into());
    }

    let paths = scan_paths(&args.scans)?;
    log::info!("replaying {} scans from {}", paths.len(), args.scans.display());

    // scans are queued with back pressure, the map must be delivered first
    match map_feeder.join() {
        Ok(result) => result?,
        Err(_) => return Err("map reader panicked".into()),
    }

    for (index, path) in paths.iter().enumerate() {
        if !running.load(Ordering::SeqCst) {
            log::warn!("interrupted, stopping the replay");
            break;
        }
        let cloud = match read_pcd(path) {
            Ok(cloud) => cloud,
            Err(e) => {
                log::error!("skipping {}: {e}", path.display());
                continue;
            }
        };
        let stamp = stamp_from_stem(path).unwrap_or(Stamp::new(index as i64, 0));
        for fix in fixes.due(stamp) {
            node.on_fix(fix);
        }
        node.on_scan_blocking(StampedCloud {
            stamp,
            frame_id: config.lidar_frame.clone(),
            cloud,
        })?;
    }

    if running.load(Ordering::SeqCst) {
        node.shutdown()?;
    } else {
        node.abort()?;
    }
    log::info!("trajectory written to {}", config.result_save_path.display());

    Ok(())
}
