//! Form validation run before any collaborator is contacted.
use std::collections::BTreeMap;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{NaiveDate, NaiveTime};
use serde::Serialize;
use validator::{Validate, ValidationErrors};

use crate::models::{ImageUpload, IntakeForm, SignupRequest};

/// Upload ceiling for machine photos. Files of this size or larger are refused.
pub const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

pub const ACCEPTED_IMAGE_TYPES: [&str; 3] = ["image/jpeg", "image/png", "image/jpg"];

const IMAGE_TOO_LARGE: &str = "Image must be less than 10MB";
const IMAGE_WRONG_TYPE: &str = "Image must be a JPEG or PNG file";
const IMAGE_UNREADABLE: &str = "Image could not be read";
const DATE_MESSAGE: &str = "Please select a preferred date";
const TIME_MESSAGE: &str = "Please select a preferred time";

/// Per-field messages, first failure wins for each field.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, String>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(field: &str, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0.entry(field.to_string()).or_insert_with(|| message.into());
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    fn into_result(self) -> Result<(), FieldErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl From<ValidationErrors> for FieldErrors {
    fn from(errors: ValidationErrors) -> Self {
        let mut fields = FieldErrors::new();
        for (field, errs) in errors.field_errors() {
            if let Some(first) = errs.first() {
                let message = first
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("Invalid value for {}", field));
                fields.add(&field, message);
            }
        }
        fields
    }
}

fn collect(result: Result<(), ValidationErrors>) -> FieldErrors {
    match result {
        Ok(()) => FieldErrors::new(),
        Err(errors) => errors.into(),
    }
}

/// Image bytes that passed the type and size checks.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedImage {
    pub bytes: Vec<u8>,
    pub content_type: String,
    pub extension: String,
}

/// An intake form with every field parsed into its typed form.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedIntake {
    pub machine_model: String,
    pub issue_description: String,
    pub preferred_date: NaiveDate,
    pub preferred_time: NaiveTime,
    pub image: Option<DecodedImage>,
}

pub fn validate_intake(form: IntakeForm) -> Result<ValidatedIntake, FieldErrors> {
    let form = IntakeForm {
        machine_model: form.machine_model.trim().to_string(),
        issue_description: form.issue_description.trim().to_string(),
        preferred_date: form.preferred_date.trim().to_string(),
        preferred_time: form.preferred_time.trim().to_string(),
        image: form.image,
    };

    let mut errors = collect(form.validate());

    let preferred_date = parse_date(&form.preferred_date);
    if preferred_date.is_none() {
        errors.add("preferred_date", DATE_MESSAGE);
    }
    let preferred_time = parse_time(&form.preferred_time);
    if preferred_time.is_none() {
        errors.add("preferred_time", TIME_MESSAGE);
    }

    let image = match form.image.as_ref() {
        Some(upload) => match decode_image(upload) {
            Ok(image) => Some(image),
            Err(message) => {
                errors.add("image", message);
                None
            }
        },
        None => None,
    };

    errors.into_result()?;

    match (preferred_date, preferred_time) {
        (Some(preferred_date), Some(preferred_time)) => Ok(ValidatedIntake {
            machine_model: form.machine_model,
            issue_description: form.issue_description,
            preferred_date,
            preferred_time,
            image,
        }),
        _ => Err(FieldErrors::single("preferred_date", DATE_MESSAGE)),
    }
}

pub fn validate_signup(form: &SignupRequest) -> Result<(), FieldErrors> {
    collect(form.validate()).into_result()
}

fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()
}

fn parse_time(value: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(value, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
        .ok()
}

pub fn check_image_size(len: usize) -> Result<(), &'static str> {
    if len >= MAX_IMAGE_BYTES {
        Err(IMAGE_TOO_LARGE)
    } else {
        Ok(())
    }
}

fn decode_image(upload: &ImageUpload) -> Result<DecodedImage, &'static str> {
    let content_type = upload.content_type.trim().to_ascii_lowercase();
    if !ACCEPTED_IMAGE_TYPES.contains(&content_type.as_str()) {
        return Err(IMAGE_WRONG_TYPE);
    }

    let payload = match upload.data.split_once(";base64,") {
        Some((header, rest)) if header.starts_with("data:") => rest,
        _ => upload.data.as_str(),
    };
    let payload = payload.trim();

    // Reject from the encoded length first so oversized uploads are never decoded.
    check_image_size((payload.len() / 4 * 3).saturating_sub(padding(payload)))?;

    let bytes = STANDARD.decode(payload).map_err(|_| IMAGE_UNREADABLE)?;
    if bytes.is_empty() {
        return Err(IMAGE_UNREADABLE);
    }
    check_image_size(bytes.len())?;

    Ok(DecodedImage {
        bytes,
        extension: image_extension(&upload.file_name, &content_type),
        content_type,
    })
}

fn padding(payload: &str) -> usize {
    if payload.len() % 4 != 0 {
        return 0;
    }
    payload.bytes().rev().take_while(|b| *b == b'=').count().min(2)
}

fn image_extension(file_name: &str, content_type: &str) -> String {
    let from_name = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| matches!(ext.as_str(), "jpg" | "jpeg" | "png"));
    from_name.unwrap_or_else(|| match content_type {
        "image/png" => "png".to_string(),
        _ => "jpg".to_string(),
    })
}
