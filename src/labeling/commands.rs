use std::fmt;

use serde::Serialize;
use tracing::error;

use crate::error::PipelineError;
use crate::labeling;
use crate::store::BlobStore;

/// An operator command, as typed into the chat front end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    NextFace,
    Find(String),
    Name { face_uuid: String, name: String },
    Usage(&'static str),
    Unknown,
}

impl Command {
    pub fn parse(text: &str) -> Command {
        let text = text.trim();
        let (head, rest) = match text.split_once(char::is_whitespace) {
            Some((head, rest)) => (head, rest.trim()),
            None => (text, ""),
        };
        // "/find@SomeBot" style addressing
        let head = head.split('@').next().unwrap_or(head);
        match head {
            "/start" => Command::Start,
            "/getface" | "/getfaces" => Command::NextFace,
            "/find" if rest.is_empty() => Command::Usage("/find <name>"),
            "/find" => Command::Find(rest.to_string()),
            "/name" => match rest.split_once(char::is_whitespace) {
                Some((face_uuid, name)) if !name.trim().is_empty() => Command::Name {
                    face_uuid: face_uuid.to_string(),
                    name: name.trim().to_string(),
                },
                _ => Command::Usage("/name <face id> <name>"),
            },
            _ => Command::Unknown,
        }
    }
}

/// What the front end shows the operator. `NothingPending` and `NoPhotos` are
/// ordinary empty results; only `Failure` signals an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Reply {
    Greeting,
    Face { key: String, face_uuid: String },
    NothingPending,
    Photos { name: String, photo_ids: Vec<String> },
    NoPhotos { name: String },
    Named { key: String },
    UnknownFace { face_uuid: String },
    InvalidName,
    Usage { hint: String },
    UnknownCommand,
    Failure,
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Greeting => write!(f, "Face tagging bot. Send a photo, then /getface to name the people in it."),
            Reply::Face { face_uuid, .. } => {
                write!(f, "Who is this? Reply with /name {face_uuid} <name>")
            }
            Reply::NothingPending => write!(f, "No new faces to name."),
            Reply::Photos { name, photo_ids } => {
                write!(f, "{} photo(s) of {name}:", photo_ids.len())?;
                for id in photo_ids {
                    write!(f, "\n{id}")?;
                }
                Ok(())
            }
            Reply::NoPhotos { name } => write!(f, "No photos of {name} yet."),
            Reply::Named { key } => write!(f, "Saved as {key}."),
            Reply::UnknownFace { face_uuid } => {
                write!(f, "Face {face_uuid} is unknown or already named.")
            }
            Reply::InvalidName => write!(f, "Names may only contain letters and digits."),
            Reply::Usage { hint } => write!(f, "Usage: {hint}"),
            Reply::UnknownCommand => write!(f, "Unknown command. Try /getface or /find <name>."),
            Reply::Failure => write!(f, "Something went wrong, please try again later."),
        }
    }
}

fn failure(command: &Command, e: PipelineError) -> Reply {
    error!(?command, "labeling command failed: {}", e);
    Reply::Failure
}

pub async fn dispatch(faces: &dyn BlobStore, command: Command) -> Reply {
    match &command {
        Command::Start => Reply::Greeting,
        Command::NextFace => match labeling::next_unlabeled(faces).await {
            Ok(Some(key)) => Reply::Face {
                face_uuid: key.face_uuid().to_string(),
                key: key.to_string(),
            },
            Ok(None) => Reply::NothingPending,
            Err(e) => failure(&command, e),
        },
        Command::Find(name) => match labeling::photos_for(faces, name).await {
            Ok(photo_ids) if photo_ids.is_empty() => Reply::NoPhotos { name: name.to_lowercase() },
            Ok(photo_ids) => Reply::Photos { name: name.to_lowercase(), photo_ids },
            Err(PipelineError::InvalidName(_)) => Reply::InvalidName,
            Err(e) => failure(&command, e),
        },
        Command::Name { face_uuid, name } => match labeling::rename(faces, face_uuid, name).await {
            Ok(key) => Reply::Named { key: key.to_string() },
            Err(PipelineError::NotFound(_)) => Reply::UnknownFace { face_uuid: face_uuid.clone() },
            Err(PipelineError::InvalidName(_)) => Reply::InvalidName,
            Err(e) => failure(&command, e),
        },
        Command::Usage(hint) => Reply::Usage { hint: hint.to_string() },
        Command::Unknown => Reply::UnknownCommand,
    }
}
