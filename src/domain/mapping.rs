//! Conversion between the persisted [`Track`] and the caller-facing [`TrackDto`].
//!
//! Both directions destructure their input completely, so a field added to
//! either struct fails to compile here until it is mapped.

use crate::{
    domain::track::{MAX_DESCRIPTION_CHARS, StoredFile, Track, TrackDto},
    error::CatalogError,
};

pub fn to_dto(track: &Track) -> TrackDto {
    let Track {
        id,
        title,
        artist,
        description,
        category,
        duration,
        file,
        cover_image,
        created_at: _,
        updated_at: _,
    } = track;

    TrackDto {
        id: *id,
        title: Some(title.clone()),
        artist: Some(artist.clone()),
        description: description.clone(),
        duration: Some(*duration),
        category: Some(*category),
        file_size: file.as_ref().map(|f| f.size),
        file_url: file.as_ref().map(|f| f.url.clone()),
        cover_image: cover_image.clone(),
    }
}

/// Builds a record from the transfer shape.
///
/// Timestamps are left at zero, the repository fills them on save.
pub fn to_record(dto: TrackDto) -> Result<Track, CatalogError> {
    let TrackDto {
        id,
        title,
        artist,
        description,
        duration,
        category,
        file_size,
        file_url,
        cover_image,
    } = dto;

    let title = required_text("title", title)?;
    let artist = required_text("artist", artist)?;
    let category = category.ok_or_else(|| CatalogError::validation("category is required"))?;
    check_description(description.as_deref())?;

    let file = match (file_url, file_size) {
        (Some(url), Some(size)) => Some(StoredFile { url, size }),
        (None, None) => None,
        _ => {
            return Err(CatalogError::validation(
                "fileUrl and fileSize must be set together",
            ));
        }
    };

    Ok(Track {
        id,
        title,
        artist,
        description,
        category,
        duration: duration.unwrap_or(0),
        file,
        cover_image,
        created_at: 0,
        updated_at: 0,
    })
}

/// Checks the fields a create or update needs, without building a record.
pub fn validate_metadata(dto: &TrackDto) -> Result<(), CatalogError> {
    required_text("title", dto.title.clone())?;
    required_text("artist", dto.artist.clone())?;
    if dto.category.is_none() {
        return Err(CatalogError::validation("category is required"));
    }
    check_description(dto.description.as_deref())
}

/// Overwrites every metadata field of `track` from `dto`. File fields and id are untouched.
pub fn apply_metadata(track: &mut Track, dto: &TrackDto) -> Result<(), CatalogError> {
    validate_metadata(dto)?;

    track.title = required_text("title", dto.title.clone())?;
    track.artist = required_text("artist", dto.artist.clone())?;
    track.description = dto.description.clone();
    if let Some(category) = dto.category {
        track.category = category;
    }
    track.duration = dto.duration.unwrap_or(0);
    track.cover_image = dto.cover_image.clone();
    Ok(())
}

fn required_text(field: &str, value: Option<String>) -> Result<String, CatalogError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(CatalogError::validation(format!("{field} is required"))),
    }
}

fn check_description(description: Option<&str>) -> Result<(), CatalogError> {
    match description {
        Some(d) if d.chars().count() > MAX_DESCRIPTION_CHARS => Err(CatalogError::validation(
            format!("description exceeds {MAX_DESCRIPTION_CHARS} characters"),
        )),
        _ => Ok(()),
    }
}
