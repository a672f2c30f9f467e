use std::fs::File;
use std::io::{BufWriter, Seek, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use calib_capture_core::CalibrationHandoff;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::transcript::write_transcript;

pub const RESULTS_TXT_ENTRY: &str = "results.txt";
pub const RESULTS_JSON_ENTRY: &str = "results.json";
pub const SAMPLES_DIR: &str = "samples";

#[derive(thiserror::Error, Debug)]
pub enum ExportError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Zip(#[from] zip::result::ZipError),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Archive entry name of the `index`-th sample image.
pub fn sample_entry_name(index: usize) -> String {
    format!("{SAMPLES_DIR}/sample-{index}.png")
}

/// Default archive file name, stamped with whole seconds since the epoch.
pub fn archive_file_name(at: SystemTime) -> String {
    let secs = at
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    format!("calibration-results-{secs}.zip")
}

/// Write the transcript, the JSON result and every sample PNG into a zip.
///
/// PNG payloads are already compressed, so every entry is stored as-is.
pub fn write_archive<W: Write + Seek>(
    writer: W,
    handoff: &CalibrationHandoff,
) -> Result<W, ExportError> {
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    let mut zip = ZipWriter::new(writer);

    zip.start_file(RESULTS_TXT_ENTRY, options)?;
    zip.write_all(write_transcript(&handoff.result).as_bytes())?;

    zip.start_file(RESULTS_JSON_ENTRY, options)?;
    serde_json::to_writer_pretty(&mut zip, &handoff.result)?;

    zip.add_directory(SAMPLES_DIR, options)?;
    for (i, thumb) in handoff.thumbnails.iter().enumerate() {
        zip.start_file(sample_entry_name(i), options)?;
        zip.write_all(thumb.png_bytes())?;
    }

    log::debug!(
        "archived {} samples (reprojection error {:.4})",
        handoff.sample_count(),
        handoff.result.reprojection_error
    );
    Ok(zip.finish()?)
}

/// Save the archive under `dir` with [`archive_file_name`] and return its path.
pub fn save_archive(dir: impl AsRef<Path>, handoff: &CalibrationHandoff) -> Result<PathBuf, ExportError> {
    let path = dir.as_ref().join(archive_file_name(SystemTime::now()));
    let file = BufWriter::new(File::create(&path)?);
    let mut out = write_archive(file, handoff)?;
    out.flush()?;
    log::info!("wrote {}", path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Read};
    use std::time::Duration;

    use calib_capture_core::{CalibrationResult, DistortionCoefficients, Thumbnail};
    use image::{Rgba, RgbaImage};
    use nalgebra::{Matrix3, Vector3};
    use zip::ZipArchive;

    fn handoff(n: usize) -> CalibrationHandoff {
        let thumbnails = (0..n)
            .map(|i| {
                let img = RgbaImage::from_pixel(4, 3, Rgba([i as u8 * 40, 10, 20, 255]));
                Thumbnail::encode(&img).expect("encode")
            })
            .collect();
        CalibrationHandoff {
            result: CalibrationResult {
                reprojection_error: 0.25,
                intrinsics: Matrix3::new(700.0, 0.0, 320.0, 0.0, 700.0, 240.0, 0.0, 0.0, 1.0),
                distortion: DistortionCoefficients([0.01, -0.02, 0.0, 0.0, 0.003]),
                rotation_vectors: vec![Vector3::new(0.1, 0.2, 0.3); n],
                translation_vectors: vec![Vector3::new(0.0, 0.0, 0.5); n],
            },
            thumbnails,
        }
    }

    fn read_entry(archive: &mut ZipArchive<Cursor<Vec<u8>>>, name: &str) -> Vec<u8> {
        let mut entry = archive.by_name(name).expect("entry");
        let mut buf = Vec::new();
        entry.read_to_end(&mut buf).expect("read entry");
        buf
    }

    #[test]
    fn archive_contains_results_and_every_sample() {
        let h = handoff(3);
        let bytes = write_archive(Cursor::new(Vec::new()), &h)
            .expect("archive")
            .into_inner();
        let mut archive = ZipArchive::new(Cursor::new(bytes)).expect("open");

        let txt = String::from_utf8(read_entry(&mut archive, RESULTS_TXT_ENTRY)).expect("utf8");
        assert_eq!(crate::parse_transcript(&txt).expect("transcript"), h.result);

        let json = read_entry(&mut archive, RESULTS_JSON_ENTRY);
        let parsed: CalibrationResult = serde_json::from_slice(&json).expect("json");
        assert_eq!(parsed, h.result);

        for (i, thumb) in h.thumbnails.iter().enumerate() {
            assert_eq!(read_entry(&mut archive, &sample_entry_name(i)), thumb.png_bytes());
        }
        assert!(archive.by_name(&sample_entry_name(3)).is_err());
    }

    #[test]
    fn entry_and_file_names() {
        assert_eq!(sample_entry_name(0), "samples/sample-0.png");
        assert_eq!(sample_entry_name(12), "samples/sample-12.png");
        let at = UNIX_EPOCH + Duration::from_millis(1_700_000_000_900);
        assert_eq!(archive_file_name(at), "calibration-results-1700000000.zip");
    }

    #[test]
    fn save_archive_writes_into_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = save_archive(dir.path(), &handoff(1)).expect("save");
        assert_eq!(path.parent(), Some(dir.path()));
        let name = path.file_name().and_then(|n| n.to_str()).expect("name");
        assert!(name.starts_with("calibration-results-") && name.ends_with(".zip"));

        let archive = ZipArchive::new(File::open(&path).expect("open")).expect("zip");
        assert!(archive.file_names().any(|n| n == RESULTS_TXT_ENTRY));
    }
}
