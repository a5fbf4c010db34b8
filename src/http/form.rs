//! Decodes the multipart track form sent by create and update requests

use std::{collections::HashMap, io::Read};

use rouille::{Request, input::multipart::get_multipart_input};

use crate::{
    domain::track::{Category, TrackDto},
    error::CatalogError,
    http::error::ApiError,
};

/// name of the multipart part carrying the audio file
pub const FILE_PART: &str = "file";

#[derive(Debug)]
pub struct FilePart {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug)]
pub struct TrackForm {
    pub dto: TrackDto,
    /// `None` when no file part was sent or it was empty
    pub file: Option<FilePart>,
}

pub fn parse_track_form(request: &Request) -> Result<TrackForm, ApiError> {
    let mut multipart = get_multipart_input(request)
        .map_err(|e| ApiError::BadRequest(format!("expected multipart/form-data body: {e}")))?;

    let mut fields = HashMap::new();
    let mut file = None;

    while let Some(mut field) = multipart.next() {
        let name = field.headers.name.to_string();
        let mut bytes = Vec::new();
        field
            .data
            .read_to_end(&mut bytes)
            .map_err(|e| ApiError::BadRequest(format!("failed to read part '{name}': {e}")))?;

        if name == FILE_PART {
            let file_name = field.headers.filename.clone().unwrap_or_default();
            if !bytes.is_empty() {
                file = Some(FilePart { file_name, bytes });
            }
        } else {
            let text = String::from_utf8(bytes)
                .map_err(|_| ApiError::BadRequest(format!("part '{name}' is not valid UTF-8")))?;
            fields.insert(name, text);
        }
    }

    Ok(TrackForm {
        dto: fields_to_dto(fields)?,
        file,
    })
}

/// Builds the transfer shape from text parts.
///
/// Empty optional parts count as absent. Missing required parts are left
/// `None` for the catalog to reject.
pub fn fields_to_dto(mut fields: HashMap<String, String>) -> Result<TrackDto, CatalogError> {
    let mut take = |key: &str| fields.remove(key).filter(|v| !v.trim().is_empty());

    let category = take("category")
        .map(|c| c.trim().parse::<Category>())
        .transpose()?;
    let duration = take("duration")
        .map(|d| {
            d.trim()
                .parse::<u32>()
                .map_err(|_| CatalogError::validation(format!("invalid duration '{d}'")))
        })
        .transpose()?;

    Ok(TrackDto {
        id: None,
        title: take("title"),
        artist: take("artist"),
        description: take("description"),
        duration,
        category,
        file_size: None,
        file_url: None,
        cover_image: take("coverImage"),
    })
}
