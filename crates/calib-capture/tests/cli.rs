mod common;

use std::fs;
use std::path::Path;

use assert_cmd::Command;
use calib_capture::core::Thumbnail;
use calib_capture::SessionConfig;
use image::{Rgba, RgbaImage};
use predicates::prelude::*;

fn cli() -> Command {
    Command::cargo_bin("calib-capture").expect("binary")
}

fn write_results(dir: &Path, poses: usize) -> std::path::PathBuf {
    let path = dir.join("results.json");
    let json = serde_json::to_string_pretty(&common::calibration(poses, 0.27)).expect("json");
    fs::write(&path, json).expect("write results");
    path
}

fn write_samples(dir: &Path, n: usize) -> std::path::PathBuf {
    let samples = dir.join("samples");
    fs::create_dir(&samples).expect("samples dir");
    for i in 0..n {
        let img = RgbaImage::from_pixel(8, 6, Rgba([i as u8 * 30, 0, 0, 255]));
        let png = Thumbnail::encode(&img).expect("encode");
        fs::write(samples.join(format!("sample-{i}.png")), png.png_bytes()).expect("write png");
    }
    samples
}

#[test]
fn config_writes_the_defaults() {
    let dir = tempfile::tempdir().expect("tempdir");
    let out = dir.path().join("session.json");
    cli()
        .args(["config", "--out"])
        .arg(&out)
        .assert()
        .success();
    let written = SessionConfig::load_json(&out).expect("load");
    assert_eq!(written, SessionConfig::default());
}

#[test]
fn summary_prints_the_transcript() {
    let dir = tempfile::tempdir().expect("tempdir");
    let results = write_results(dir.path(), 2);
    cli()
        .arg("summary")
        .arg(&results)
        .assert()
        .success()
        .stdout(predicate::str::starts_with("* Reprojection error:\n0.27\n"))
        .stdout(predicate::str::contains("* Camera matrix:"))
        .stdout(predicate::str::contains("* Translation vectors:"));
}

#[test]
fn summary_of_missing_file_fails() {
    let dir = tempfile::tempdir().expect("tempdir");
    cli()
        .arg("summary")
        .arg(dir.path().join("absent.json"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("error:"));
}

#[test]
fn package_bundles_results_and_samples() {
    let dir = tempfile::tempdir().expect("tempdir");
    let results = write_results(dir.path(), 3);
    let samples = write_samples(dir.path(), 3);
    let out = dir.path().join("bundle.zip");

    cli()
        .arg("package")
        .arg(&results)
        .arg("--samples")
        .arg(&samples)
        .arg("--out")
        .arg(&out)
        .assert()
        .success();

    let archive = zip::ZipArchive::new(fs::File::open(&out).expect("open")).expect("zip");
    let mut names: Vec<&str> = archive.file_names().collect();
    names.sort_unstable();
    for expected in [
        "results.json",
        "results.txt",
        "samples/sample-0.png",
        "samples/sample-1.png",
        "samples/sample-2.png",
    ] {
        assert!(names.contains(&expected), "missing {expected} in {names:?}");
    }
}

#[test]
fn package_refuses_mismatched_sample_count() {
    let dir = tempfile::tempdir().expect("tempdir");
    let results = write_results(dir.path(), 3);
    let samples = write_samples(dir.path(), 2);

    cli()
        .arg("package")
        .arg(&results)
        .arg("--samples")
        .arg(&samples)
        .arg("--out")
        .arg(dir.path().join("bundle.zip"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("3 rotation"));
}
