//! Upload validation and simulated computer-vision annotations for photo diagnosis.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const MAX_IMAGE_BYTES: u64 = 5 * 1024 * 1024;

const BODY_PARTS: [&str; 5] = ["chest", "abdomen", "head", "limbs", "spine"];
const ANOMALIES: [&str; 5] = ["inflammation", "lesion", "fracture", "mass", "fluid"];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImageUpload {
    pub file_name: String,
    pub mime_type: String,
    pub size_bytes: u64,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ImageError {
    #[error("Image is {0} bytes; the limit is 5MB")]
    TooLarge(u64),

    #[error("Unsupported file type '{0}'; please select an image file")]
    NotAnImage(String),
}

pub fn validate_upload(upload: &ImageUpload) -> Result<(), ImageError> {
    if upload.size_bytes > MAX_IMAGE_BYTES {
        return Err(ImageError::TooLarge(upload.size_bytes));
    }
    if !upload.mime_type.starts_with("image/") {
        return Err(ImageError::NotAnImage(upload.mime_type.clone()));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnnotationKind {
    BodyPart,
    Anomaly,
    Normal,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImageAnnotation {
    pub kind: AnnotationKind,
    pub label: String,
    pub confidence: f32,
}

impl ImageAnnotation {
    pub fn render(&self) -> String {
        format!(
            "{} detected with {:.1}% confidence",
            self.label,
            self.confidence * 100.0
        )
    }
}

/// Annotations for an upload: one body part, one possible anomaly, one
/// normal-tissue finding. The picks are derived from the file name so the
/// same upload always yields the same annotations.
pub fn annotate(upload: &ImageUpload) -> Vec<ImageAnnotation> {
    let seed: usize = upload.file_name.bytes().map(usize::from).sum();
    let body_part = BODY_PARTS[seed % BODY_PARTS.len()];
    let anomaly = ANOMALIES[(seed / BODY_PARTS.len()) % ANOMALIES.len()];

    vec![
        ImageAnnotation {
            kind: AnnotationKind::BodyPart,
            label: body_part.to_string(),
            confidence: 0.92,
        },
        ImageAnnotation {
            kind: AnnotationKind::Anomaly,
            label: format!("Possible {}", anomaly),
            confidence: 0.78,
        },
        ImageAnnotation {
            kind: AnnotationKind::Normal,
            label: "Normal tissue".to_string(),
            confidence: 0.95,
        },
    ]
}

pub fn annotation_text(annotations: &[ImageAnnotation]) -> String {
    annotations
        .iter()
        .map(ImageAnnotation::render)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Image description passed to the image-analysis prompt.
pub fn describe(file_name: &str, annotation_text: &str) -> String {
    format!(
        "Medical image analysis for {}. Computer vision detected: {}",
        file_name, annotation_text
    )
}
