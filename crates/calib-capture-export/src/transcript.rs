//! Plain-text transcript of a calibration result.
//!
//! Layout (one section per field, in this order):
//!
//! ```text
//! * Reprojection error:
//! 0.42
//!
//! * Camera matrix:
//! [ 800 , 0 , 320 ,
//!   0 , 810 , 240 ,
//!   0 , 0 , 1 ]
//!
//! * Distortion coefficients:
//! [ 0.1 , -0.05 , 0.001 , 0.002 , 0 ]
//!
//! * Rotation vectors:
//! [ [ 0.1 , 0.2 , 0.3 ] ,
//!   [ 0.4 , 0.5 , 0.6 ] ]
//!
//! * Translation vectors:
//! [ ]
//! ```

use std::fmt::Write as _;

use calib_capture_core::{CalibrationResult, DistortionCoefficients};
use nalgebra::{Matrix3, Vector3};

const REPROJECTION: &str = "Reprojection error";
const CAMERA_MATRIX: &str = "Camera matrix";
const DISTORTION: &str = "Distortion coefficients";
const ROTATIONS: &str = "Rotation vectors";
const TRANSLATIONS: &str = "Translation vectors";

const SECTIONS: [&str; 5] = [REPROJECTION, CAMERA_MATRIX, DISTORTION, ROTATIONS, TRANSLATIONS];

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TranscriptError {
    #[error("missing section `{0}`")]
    MissingSection(&'static str),
    #[error("section `{0}` appears more than once")]
    DuplicateSection(String),
    #[error("unknown section `{0}`")]
    UnknownSection(String),
    #[error("value outside of any section: `{0}`")]
    StrayLine(String),
    #[error("section `{section}`: `{token}` is not a number")]
    InvalidNumber { section: &'static str, token: String },
    #[error("section `{section}`: expected {expected} values, found {found}")]
    WrongLength {
        section: &'static str,
        expected: usize,
        found: usize,
    },
}

/// Render `result` as a transcript.
pub fn write_transcript(result: &CalibrationResult) -> String {
    let mut out = String::new();

    header(&mut out, REPROJECTION);
    let _ = writeln!(out, "{}", result.reprojection_error);

    out.push('\n');
    header(&mut out, CAMERA_MATRIX);
    for r in 0..3 {
        let lead = if r == 0 { "[ " } else { "  " };
        let tail = if r == 2 { " ]" } else { " ," };
        let m = &result.intrinsics;
        let _ = writeln!(
            out,
            "{lead}{} , {} , {}{tail}",
            m[(r, 0)],
            m[(r, 1)],
            m[(r, 2)]
        );
    }

    out.push('\n');
    header(&mut out, DISTORTION);
    let coeffs: Vec<String> = result
        .distortion
        .as_slice()
        .iter()
        .map(|v| v.to_string())
        .collect();
    let _ = writeln!(out, "[ {} ]", coeffs.join(" , "));

    out.push('\n');
    header(&mut out, ROTATIONS);
    write_vectors(&mut out, &result.rotation_vectors);

    out.push('\n');
    header(&mut out, TRANSLATIONS);
    write_vectors(&mut out, &result.translation_vectors);

    out
}

fn header(out: &mut String, name: &str) {
    let _ = writeln!(out, "* {name}:");
}

fn write_vectors(out: &mut String, vectors: &[Vector3<f64>]) {
    if vectors.is_empty() {
        out.push_str("[ ]\n");
        return;
    }
    let last = vectors.len() - 1;
    for (i, v) in vectors.iter().enumerate() {
        let lead = if i == 0 { "[ " } else { "  " };
        let tail = if i == last { " ]" } else { " ," };
        let _ = writeln!(out, "{lead}[ {} , {} , {} ]{tail}", v.x, v.y, v.z);
    }
}

/// Parse a transcript produced by [`write_transcript`].
pub fn parse_transcript(text: &str) -> Result<CalibrationResult, TranscriptError> {
    let mut bodies: [Option<String>; 5] = Default::default();
    let mut current: Option<usize> = None;

    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(name) = trimmed
            .strip_prefix("* ")
            .and_then(|rest| rest.strip_suffix(':'))
        {
            let idx = SECTIONS
                .iter()
                .position(|s| *s == name)
                .ok_or_else(|| TranscriptError::UnknownSection(name.to_string()))?;
            if bodies[idx].is_some() {
                return Err(TranscriptError::DuplicateSection(name.to_string()));
            }
            bodies[idx] = Some(String::new());
            current = Some(idx);
            continue;
        }
        let Some(idx) = current else {
            return Err(TranscriptError::StrayLine(trimmed.to_string()));
        };
        if let Some(body) = bodies[idx].as_mut() {
            body.push_str(trimmed);
            body.push(' ');
        }
    }

    let values = |idx: usize| -> Result<Vec<f64>, TranscriptError> {
        let section = SECTIONS[idx];
        let body = bodies[idx]
            .as_deref()
            .ok_or(TranscriptError::MissingSection(section))?;
        parse_numbers(section, body)
    };

    let reprojection = exact::<1>(REPROJECTION, values(0)?)?;
    let matrix = exact::<9>(CAMERA_MATRIX, values(1)?)?;
    let distortion = exact::<{ DistortionCoefficients::LEN }>(DISTORTION, values(2)?)?;
    let rotation_vectors = triples(ROTATIONS, values(3)?)?;
    let translation_vectors = triples(TRANSLATIONS, values(4)?)?;

    Ok(CalibrationResult {
        reprojection_error: reprojection[0],
        intrinsics: Matrix3::from_row_slice(&matrix),
        distortion: DistortionCoefficients(distortion),
        rotation_vectors,
        translation_vectors,
    })
}

fn parse_numbers(section: &'static str, body: &str) -> Result<Vec<f64>, TranscriptError> {
    body.split(|c: char| c == '[' || c == ']' || c == ',' || c.is_whitespace())
        .filter(|tok| !tok.is_empty())
        .map(|tok| {
            tok.parse::<f64>()
                .map_err(|_| TranscriptError::InvalidNumber {
                    section,
                    token: tok.to_string(),
                })
        })
        .collect()
}

fn exact<const N: usize>(
    section: &'static str,
    values: Vec<f64>,
) -> Result<[f64; N], TranscriptError> {
    let found = values.len();
    values.try_into().map_err(|_| TranscriptError::WrongLength {
        section,
        expected: N,
        found,
    })
}

fn triples(section: &'static str, values: Vec<f64>) -> Result<Vec<Vector3<f64>>, TranscriptError> {
    if values.len() % 3 != 0 {
        return Err(TranscriptError::WrongLength {
            section,
            expected: values.len().div_ceil(3) * 3,
            found: values.len(),
        });
    }
    Ok(values
        .chunks_exact(3)
        .map(|c| Vector3::new(c[0], c[1], c[2]))
        .collect())
}
