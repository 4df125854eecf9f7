//! Lowercase -> uppercase -> hash pipeline
//!
//! Reads words from stdin, pushes them through three chained circuits and
//! prints the SHA-256 of each upper-cased word. Rejected words are reported
//! with the status code an HTTP front end would return.
//!
//! Usage: cargo run --example case_hash [config.toml]
//!        (Then type words and press Ctrl-D to finish)
//!        RUST_LOG=circuit_pipeline=debug shows every admission decision.

use circuit_pipeline::{
    Admission, CircuitConfig, HashStage, LowercaseStage, PipelineBuilder, PipelineConfig,
    Stage, UppercaseStage,
};
use std::io::{self, BufRead};
use std::time::Duration;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("info".parse()?),
        )
        .with_target(false)
        .try_init();

    let config = match std::env::args().nth(1) {
        Some(path) => PipelineConfig::from_file(path)?,
        None => PipelineConfig {
            circuits: vec![
                CircuitConfig::new("lowercase"),
                CircuitConfig::new("uppercase"),
                CircuitConfig::new("hash"),
            ],
            ..PipelineConfig::default()
        },
    };

    let running = PipelineBuilder::from_config(config)
        .build()?
        .start(|idx| -> Box<dyn Stage> {
            match idx {
                0 => Box::new(LowercaseStage),
                1 => Box::new(UppercaseStage),
                _ => Box::new(HashStage),
            }
        })?;

    let mut sent = 0usize;
    for line in io::stdin().lock().lines() {
        for word in line?.split_whitespace() {
            match running.input().fill(word) {
                Admission::Rejected => {
                    eprintln!("{word}: {}", Admission::Rejected.status_code());
                }
                _ => sent += 1,
            }
        }
    }

    let output = running.output();
    let mut printed = 0usize;
    while printed < sent {
        while let Some(digest) = output.try_deplete() {
            println!("{digest}");
            printed += 1;
        }
        // A quiet second means the remaining words were dropped on the way.
        if printed < sent && !output.await_attention().wait_timeout(Duration::from_secs(1))? {
            break;
        }
    }

    println!();
    print!("{}", running.stats().summary());
    running.shutdown()?;
    Ok(())
}
