//! Detect and remove a watermark from a single image.
//!
//! Usage:
//! ```sh
//! cargo run --example remove_watermark -- input.jpg output.jpg [mask.png]
//! ```

use std::env;
use std::path::Path;
use std::process;

use watermark_inpaint::WatermarkEngine;

fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        eprintln!("Usage: {} <input> <output> [mask]", args[0]);
        process::exit(1);
    }

    let input = Path::new(&args[1]);
    let output = Path::new(&args[2]);
    let mask = args.get(3).map(Path::new);

    let engine = WatermarkEngine::default();
    let result = engine.process_file(input, output, mask);

    if !result.success {
        eprintln!("Error: {}", result.message);
        process::exit(1);
    } else if result.skipped {
        println!("Unchanged: {}", result.message);
    } else {
        println!("Done: {}", result.message);
    }
}
