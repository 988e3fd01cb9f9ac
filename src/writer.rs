use std::{
    fs::File,
    io::{self, BufWriter},
    path::{Path, PathBuf},
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use log::info;
use serde_jsonlines::JsonLinesWriter;

use crate::{Gt7Error, laps::Lap};

pub const LAP_FILE_EXTENSION: &str = "laps";
const APP_DIR: &str = "gt7-telemetry";

/// A lap file found on disk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LapFile {
    pub path: PathBuf,
    pub size: u64,
}

/// Directory lap files go to when the config does not name one.
pub fn default_laps_dir() -> Option<PathBuf> {
    Some(dirs::data_dir()?.join(APP_DIR).join("laps"))
}

/// Writes `laps` to `path`, one JSON object per line, keeping their order.
pub fn save_laps(path: &Path, laps: &[Arc<Lap>]) -> Result<(), Gt7Error> {
    let laps_file = File::create(path).map_err(|e| Gt7Error::WriterError { source: e })?;
    let mut laps_writer = JsonLinesWriter::new(BufWriter::new(laps_file));
    laps_writer
        .write_all(laps.iter().map(|lap| &**lap))
        .map_err(|e| Gt7Error::WriterError { source: e })?;
    laps_writer
        .flush()
        .map_err(|e| Gt7Error::WriterError { source: e })?;
    info!("Saved {} laps to {}", laps.len(), path.display());
    Ok(())
}

/// Saves `laps` in `dir` under a `<unix-seconds>_<car-id>.laps` name and
/// returns the path of the new file.
pub fn save_laps_to_dir(dir: &Path, laps: &[Arc<Lap>]) -> Result<PathBuf, Gt7Error> {
    std::fs::create_dir_all(dir).map_err(|e| Gt7Error::WriterError { source: e })?;
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    let car_id = laps.first().map_or(0, |lap| lap.car_id);
    let path = dir.join(format!("{}_{}.{}", timestamp, car_id, LAP_FILE_EXTENSION));
    save_laps(&path, laps)?;
    Ok(path)
}

/// Reads back a file written by [`save_laps`].
pub fn load_laps(path: &Path) -> Result<Vec<Lap>, Gt7Error> {
    serde_jsonlines::json_lines(path)
        .map_err(|e| Gt7Error::LapLoaderError { source: e })?
        .collect::<Result<Vec<Lap>, io::Error>>()
        .map_err(|e| match e.kind() {
            io::ErrorKind::InvalidData | io::ErrorKind::UnexpectedEof => Gt7Error::InvalidLapFile {
                path: path.display().to_string(),
            },
            _ => Gt7Error::LapLoaderError { source: e },
        })
}

/// Lap files in `dir`, newest first. File names start with their creation
/// time, so a reverse name order puts the newest file first.
pub fn list_lap_files(dir: &Path) -> Result<Vec<LapFile>, Gt7Error> {
    let entries = std::fs::read_dir(dir).map_err(|e| Gt7Error::LapLoaderError { source: e })?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| Gt7Error::LapLoaderError { source: e })?;
        let path = entry.path();
        if path.extension().is_none_or(|ext| ext != LAP_FILE_EXTENSION) {
            continue;
        }
        let size = entry
            .metadata()
            .map_err(|e| Gt7Error::LapLoaderError { source: e })?
            .len();
        files.push(LapFile { path, size });
    }
    files.sort_by(|a, b| b.path.cmp(&a.path));
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn lap(number: i16, car_id: i32) -> Arc<Lap> {
        Arc::new(Lap {
            number,
            car_id,
            lap_finish_time: 60_000. + f64::from(number),
            ..Default::default()
        })
    }

    #[test]
    fn test_save_and_load_keeps_order() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("session.laps");
        save_laps(&path, &[lap(3, 12), lap(2, 12), lap(1, 12)]).unwrap();

        let loaded = load_laps(&path).unwrap();
        let numbers: Vec<i16> = loaded.iter().map(|l| l.number).collect();
        assert_eq!(numbers, vec![3, 2, 1]);
        assert_eq!(loaded[0].lap_finish_time, 60_003.);
    }

    #[test]
    fn test_save_to_dir_names_file_after_car() {
        let dir = TempDir::new().unwrap();
        let laps_dir = dir.path().join("laps");
        let path = save_laps_to_dir(&laps_dir, &[lap(1, 3344)]).unwrap();
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.ends_with("_3344.laps"));
        assert_eq!(load_laps(&path).unwrap().len(), 1);
    }

    #[test]
    fn test_load_invalid_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.laps");
        std::fs::write(&path, "{\"number\": 1}\nnot json\n").unwrap();
        assert!(matches!(
            load_laps(&path),
            Err(Gt7Error::InvalidLapFile { .. })
        ));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            load_laps(&dir.path().join("missing.laps")),
            Err(Gt7Error::LapLoaderError { .. })
        ));
    }

    #[test]
    fn test_list_lap_files() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("1700000000_1.laps"), "").unwrap();
        std::fs::write(dir.path().join("1800000000_1.laps"), "{}\n").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "").unwrap();

        let files = list_lap_files(dir.path()).unwrap();
        assert_eq!(files.len(), 2);
        assert!(files[0].path.ends_with("1800000000_1.laps"));
        assert_eq!(files[0].size, 3);
        assert_eq!(files[1].size, 0);
    }
}
