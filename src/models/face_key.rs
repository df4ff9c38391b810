//! Face crop key grammar.
//!
//! The faces bucket has no metadata store: a crop's identity state and
//! provenance live entirely in its key,
//!
//! ```text
//! {label}-{face_uuid}___{photo_id}
//! ```
//!
//! * `label` is `unlabeled` or a name of 1..=64 lowercase Unicode
//!   alphanumerics, at most 150 bytes of UTF-8. Names never contain `-` or `_`.
//! * `face_uuid` is 32 lowercase hex characters.
//! * `photo_id` is everything after the first `___`. Since neither label nor
//!   uuid can contain `_`, that first `___` is always the separator and photo
//!   ids may themselves contain underscores.
//!
//! Every reader and writer of face keys goes through [`FaceKey`]; nothing else
//! splits key strings.

use std::fmt;
use std::str::FromStr;

use uuid::Uuid;

use crate::error::{PipelineError, Result};

pub const UNLABELED: &str = "unlabeled";
pub const LABEL_SEPARATOR: char = '-';
pub const PHOTO_SEPARATOR: &str = "___";
pub const MAX_NAME_CHARS: usize = 64;
/// Keeps `{name}-{uuid}___{sha256 hex}.jpeg` within a 255-byte object key.
pub const MAX_NAME_BYTES: usize = 150;
const UUID_LEN: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Label {
    Unlabeled,
    Named(String),
}

impl Label {
    /// Normalizes an operator-supplied name: trimmed, lower-cased, validated.
    pub fn named(raw: &str) -> Result<Label> {
        let name = raw.trim().to_lowercase();
        if name.is_empty() {
            return Err(PipelineError::InvalidName("name is empty".into()));
        }
        if name.chars().count() > MAX_NAME_CHARS {
            return Err(PipelineError::InvalidName(format!(
                "name longer than {MAX_NAME_CHARS} characters"
            )));
        }
        if name.len() > MAX_NAME_BYTES {
            return Err(PipelineError::InvalidName(format!(
                "name longer than {MAX_NAME_BYTES} bytes"
            )));
        }
        if let Some(c) = name.chars().find(|c| !c.is_alphanumeric()) {
            return Err(PipelineError::InvalidName(format!("{name:?} contains {c:?}")));
        }
        if name == UNLABELED {
            return Err(PipelineError::InvalidName(format!("{UNLABELED:?} is reserved")));
        }
        Ok(Label::Named(name))
    }

    pub fn as_str(&self) -> &str {
        match self {
            Label::Unlabeled => UNLABELED,
            Label::Named(name) => name,
        }
    }

    pub fn is_unlabeled(&self) -> bool {
        matches!(self, Label::Unlabeled)
    }

    /// Listing prefix selecting every crop carrying this label.
    pub fn prefix(&self) -> String {
        format!("{}{}", self.as_str(), LABEL_SEPARATOR)
    }

    fn parse(raw: &str) -> Result<Label> {
        if raw == UNLABELED {
            return Ok(Label::Unlabeled);
        }
        // Stored names are already normalized; anything else is not ours.
        match Label::named(raw) {
            Ok(label) if label.as_str() == raw => Ok(label),
            _ => Err(PipelineError::InvalidKey(format!("bad label {raw:?}"))),
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FaceKey {
    label: Label,
    face_uuid: String,
    photo_id: String,
}

impl FaceKey {
    /// Fresh key for a newly extracted crop: unlabeled, random 128-bit token.
    pub fn unlabeled(photo_id: &str) -> Result<FaceKey> {
        let photo_id = validate_photo_id(photo_id)?;
        Ok(FaceKey {
            label: Label::Unlabeled,
            face_uuid: Uuid::new_v4().simple().to_string(),
            photo_id: photo_id.to_string(),
        })
    }

    pub fn parse(key: &str) -> Result<FaceKey> {
        let bad = |why: &str| PipelineError::InvalidKey(format!("{key:?}: {why}"));

        let (head, photo_id) = key
            .split_once(PHOTO_SEPARATOR)
            .ok_or_else(|| bad("missing ___ separator"))?;
        let (label, face_uuid) = head
            .split_once(LABEL_SEPARATOR)
            .ok_or_else(|| bad("missing label separator"))?;

        let label = Label::parse(label)?;
        validate_uuid(face_uuid).map_err(|_| bad("bad face uuid"))?;
        validate_photo_id(photo_id).map_err(|_| bad("empty photo id"))?;

        Ok(FaceKey {
            label,
            face_uuid: face_uuid.to_string(),
            photo_id: photo_id.to_string(),
        })
    }

    pub fn label(&self) -> &Label {
        &self.label
    }

    pub fn face_uuid(&self) -> &str {
        &self.face_uuid
    }

    pub fn photo_id(&self) -> &str {
        &self.photo_id
    }

    /// Same crop under a different label; uuid and provenance are kept.
    pub fn relabeled(&self, label: Label) -> FaceKey {
        FaceKey {
            label,
            face_uuid: self.face_uuid.clone(),
            photo_id: self.photo_id.clone(),
        }
    }

    /// Listing prefix that matches exactly the crop `face_uuid` under `label`.
    pub fn crop_prefix(label: &Label, face_uuid: &str) -> Result<String> {
        validate_uuid(face_uuid)?;
        Ok(format!("{}{}{}", label.prefix(), face_uuid, PHOTO_SEPARATOR))
    }
}

impl fmt::Display for FaceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}{}{}",
            self.label, LABEL_SEPARATOR, self.face_uuid, PHOTO_SEPARATOR, self.photo_id
        )
    }
}

impl FromStr for FaceKey {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        FaceKey::parse(s)
    }
}

pub fn validate_uuid(face_uuid: &str) -> Result<()> {
    let ok = face_uuid.len() == UUID_LEN
        && face_uuid
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
    if ok {
        Ok(())
    } else {
        Err(PipelineError::InvalidKey(format!("bad face uuid {face_uuid:?}")))
    }
}

fn validate_photo_id(photo_id: &str) -> Result<&str> {
    if photo_id.is_empty() {
        return Err(PipelineError::InvalidKey("empty photo id".into()));
    }
    Ok(photo_id)
}
