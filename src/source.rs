// src/source.rs
//
// Where frames of detections come from. The live detector sits behind the
// same trait the replay tooling uses, so the pipeline cannot tell recorded
// dumps from a camera feed.

use crate::types::RawDetection;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;
use walkdir::WalkDir;

/// One frame's worth of raw detector output.
#[derive(Debug, Clone, Deserialize)]
pub struct FrameDetections {
    pub frame_id: u64,
    pub timestamp_ms: f64,
    pub detections: Vec<RawDetection>,
}

/// Supplies frames to the pipeline.
///
/// `Ok(None)` is a clean end of stream. `Err` means the detector itself is
/// unavailable and the pipeline must halt, a different failure class from
/// malformed per-frame data, which is dropped and counted downstream and
/// never surfaces here.
pub trait DetectionSource {
    fn next_frame(&mut self) -> Result<Option<FrameDetections>>;
}

/// Replays a recorded detection dump (a JSON array of frames).
pub struct ReplaySource {
    frames: std::vec::IntoIter<FrameDetections>,
}

impl ReplaySource {
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read detection dump {}", path.display()))?;
        let frames: Vec<FrameDetections> = serde_json::from_str(&contents)
            .with_context(|| format!("malformed detection dump {}", path.display()))?;
        info!("Loaded {} frame(s) from {}", frames.len(), path.display());
        Ok(Self::from_frames(frames))
    }

    pub fn from_frames(frames: Vec<FrameDetections>) -> Self {
        Self {
            frames: frames.into_iter(),
        }
    }
}

impl DetectionSource for ReplaySource {
    fn next_frame(&mut self) -> Result<Option<FrameDetections>> {
        Ok(self.frames.next())
    }
}

/// All `.json` detection dumps under a directory, sorted for reproducible
/// replay order.
pub fn find_dump_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut dumps = Vec::new();
    for entry in WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some("json") {
            dumps.push(path.to_path_buf());
        }
    }
    dumps.sort();
    info!("Found {} detection dump(s) in {}", dumps.len(), dir.display());
    Ok(dumps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const DUMP: &str = r#"[
        {"frame_id": 1, "timestamp_ms": 0.0, "detections": [
            {"class": "book", "confidence": 0.9, "bbox": [0.40, 0.50, 0.60, 0.70]}
        ]},
        {"frame_id": 2, "timestamp_ms": 33.3, "detections": []}
    ]"#;

    #[test]
    fn test_replay_source_yields_frames_in_order() {
        let frames: Vec<FrameDetections> = serde_json::from_str(DUMP).unwrap();
        let mut source = ReplaySource::from_frames(frames);
        let first = source.next_frame().unwrap().unwrap();
        assert_eq!(first.frame_id, 1);
        assert_eq!(first.detections.len(), 1);
        assert_eq!(first.detections[0].label, "book");
        let second = source.next_frame().unwrap().unwrap();
        assert_eq!(second.frame_id, 2);
        assert!(source.next_frame().unwrap().is_none());
    }

    #[test]
    fn test_from_file_and_dump_discovery() {
        let dir = tempfile::tempdir().unwrap();
        let dump_path = dir.path().join("kitchen.json");
        let mut file = fs::File::create(&dump_path).unwrap();
        file.write_all(DUMP.as_bytes()).unwrap();
        fs::File::create(dir.path().join("notes.txt")).unwrap();

        let dumps = find_dump_files(dir.path()).unwrap();
        assert_eq!(dumps, vec![dump_path.clone()]);

        let mut source = ReplaySource::from_file(&dump_path).unwrap();
        assert_eq!(source.next_frame().unwrap().unwrap().frame_id, 1);
    }

    #[test]
    fn test_malformed_dump_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let dump_path = dir.path().join("broken.json");
        fs::write(&dump_path, "not json").unwrap();
        assert!(ReplaySource::from_file(&dump_path).is_err());
    }
}
