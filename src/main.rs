// src/main.rs
//
// scene-replay: feed recorded detection dumps through the spatial pipeline
// and print what the scene model would tell a conversation layer. Dumps are
// JSON arrays of frames (see source::FrameDetections); a directory of dumps
// is replayed file by file.

use anyhow::Result;
use spatial_scene::{find_dump_files, Config, ReplaySource, ScenePipeline};
use std::path::{Path, PathBuf};
use tracing::{error, info};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "spatial_scene=info,scene_replay=info".to_string()),
        )
        .init();

    info!("Spatial scene replay starting");

    let config = match Path::new("config.yaml").exists() {
        true => {
            let config = Config::load("config.yaml")?;
            info!("Configuration loaded from config.yaml");
            config
        }
        false => {
            info!("No config.yaml found, using defaults");
            Config::default()
        }
    };

    let input = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("dumps"));

    let dumps = if input.is_file() {
        vec![input.clone()]
    } else {
        find_dump_files(&input)?
    };

    if dumps.is_empty() {
        error!("No detection dumps found under {}", input.display());
        return Ok(());
    }

    info!("Replaying {} dump(s)", dumps.len());

    for (idx, dump_path) in dumps.iter().enumerate() {
        info!(
            "Replaying dump {}/{}: {}",
            idx + 1,
            dumps.len(),
            dump_path.display()
        );

        match replay_dump(dump_path, config.clone()) {
            Ok(()) => info!("Dump replayed successfully"),
            Err(err) => error!("Replay failed for {}: {:#}", dump_path.display(), err),
        }
    }

    Ok(())
}

fn replay_dump(path: &Path, config: Config) -> Result<()> {
    let mut source = ReplaySource::from_file(path)?;
    let mut pipeline = ScenePipeline::new(config);

    let frames = pipeline.run(&mut source)?;
    let query = pipeline.query();

    let summary = query.summary();
    info!(
        "Final scene (snapshot v{}): {} object(s) after {} frame(s)",
        summary.version, summary.total_objects, frames
    );
    for (label, count) in &summary.label_counts {
        info!("  {} x{}", label, count);
    }

    for fact in query.describe_scene() {
        info!(
            "  {} {} {} (confidence {:.2})",
            fact.subject_label,
            fact.kind.as_str(),
            fact.object_label,
            fact.confidence
        );
    }

    let metrics = pipeline.metrics().summary();
    info!(
        "Pipeline metrics: {}",
        serde_json::to_string(&metrics).unwrap_or_else(|_| "<unserializable>".to_string())
    );

    Ok(())
}
