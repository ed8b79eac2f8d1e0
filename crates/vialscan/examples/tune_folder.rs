use std::error::Error;
use std::path::Path;

use vialscan::{ParamId, ProgressEvent, TuningSession};

fn main() -> Result<(), Box<dyn Error>> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 3 {
        eprintln!("Usage: {} <image_dir> <target_count> [iterations]", args[0]);
        std::process::exit(2);
    }

    let target: i64 = args[2].parse()?;
    let session = TuningSession::new();
    let n = session.load_images(Path::new(&args[1]), target)?;
    println!("Loaded {n} images, target {target} each.");

    let mut config = session.optimizer_config();
    if let Some(iters) = args.get(3) {
        config.max_iterations = iters.parse()?;
    }
    session.set_optimizer_config(config)?;
    session.unlock_only(&[
        ParamId::BrightnessPercentile,
        ParamId::MinBlobArea,
        ParamId::BlurSize,
    ])?;

    let handle = session.start_optimization()?;
    for event in handle.events() {
        println!("{}", event.message());
        if matches!(event, ProgressEvent::Finished(_)) {
            break;
        }
    }
    handle.join();

    println!();
    print!("{}", session.export_snippet());
    Ok(())
}
