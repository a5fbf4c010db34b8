use std::time::SystemTime;

use anyhow::anyhow;
use rusqlite::{OptionalExtension, Row, ToSql, params, params_from_iter};

use crate::{
    domain::{
        page::{Page, PageRequest},
        track::{Category, StoredFile, Track, TrackId},
    },
    error::CatalogError,
    storage::{
        db::{self, system_time_to_i64},
        schema::{FOLD_CASE, columns::*, tables::*},
    },
};

/// Persistence-facing query surface over track records
pub trait TrackRepository {
    /// Inserts a track without id, updates the row of a track with one.
    ///
    /// Returns the stored track with id and timestamps filled in.
    fn save(&mut self, track: Track) -> Result<Track, CatalogError>;

    fn find_by_id(&self, id: TrackId) -> Result<Option<Track>, CatalogError>;

    fn exists_by_id(&self, id: TrackId) -> Result<bool, CatalogError>;

    fn delete_by_id(&mut self, id: TrackId) -> Result<(), CatalogError>;

    fn find_all(&self, page: PageRequest) -> Result<Page<Track>, CatalogError>;

    fn find_by_category(
        &self,
        category: Category,
        page: PageRequest,
    ) -> Result<Page<Track>, CatalogError>;

    /// case-insensitive substring match on title
    fn find_by_title(&self, title: &str, page: PageRequest) -> Result<Page<Track>, CatalogError>;

    fn find_by_title_and_category(
        &self,
        title: &str,
        category: Category,
        page: PageRequest,
    ) -> Result<Page<Track>, CatalogError>;
}

/// [`TrackRepository`] backed by a SQLite connection
pub struct SqliteTrackRepository {
    pub(crate) db: rusqlite::Connection,
}

impl SqliteTrackRepository {
    /// when called, opens a data base connection
    pub fn new(config: &crate::config::Database) -> Result<Self, CatalogError> {
        Ok(Self::from_existing_conn(db::open(config)?))
    }

    pub fn from_existing_conn(db: rusqlite::Connection) -> Self {
        Self { db }
    }

    fn insert(&mut self, mut track: Track, now: i64) -> Result<Track, CatalogError> {
        let (file_url, file_size) = file_columns(&track)?;

        self.db.execute(
            &format!(
                "INSERT INTO {TRACKS} ({TITLE}, {ARTIST}, {DESCRIPTION}, {CATEGORY}, {DURATION},
                 {FILE_URL}, {FILE_SIZE}, {COVER_IMAGE}, {CREATED_AT}, {UPDATED_AT})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)"
            ),
            params![
                track.title,
                track.artist,
                track.description,
                track.category.as_str(),
                track.duration,
                file_url,
                file_size,
                track.cover_image,
                now,
            ],
        )?;

        track.id = Some(TrackId(self.db.last_insert_rowid()));
        track.created_at = now;
        track.updated_at = now;
        Ok(track)
    }

    fn update(&mut self, id: TrackId, mut track: Track, now: i64) -> Result<Track, CatalogError> {
        let (file_url, file_size) = file_columns(&track)?;
        let tx = self.db.transaction()?;

        let changed = tx.execute(
            &format!(
                "UPDATE {TRACKS} SET {TITLE} = ?1, {ARTIST} = ?2, {DESCRIPTION} = ?3,
                 {CATEGORY} = ?4, {DURATION} = ?5, {FILE_URL} = ?6, {FILE_SIZE} = ?7,
                 {COVER_IMAGE} = ?8, {UPDATED_AT} = ?9
                 WHERE {ID} = ?10"
            ),
            params![
                track.title,
                track.artist,
                track.description,
                track.category.as_str(),
                track.duration,
                file_url,
                file_size,
                track.cover_image,
                now,
                id.0,
            ],
        )?;
        if changed == 0 {
            return Err(CatalogError::NotFound(id));
        }

        let created_at: i64 = tx.query_row(
            &format!("SELECT {CREATED_AT} FROM {TRACKS} WHERE {ID} = ?1"),
            params![id.0],
            |row| row.get(0),
        )?;
        tx.commit()?;

        track.created_at = created_at;
        track.updated_at = now;
        Ok(track)
    }

    /// runs a filtered, id-ordered page query plus the matching count
    fn query_page(
        &self,
        filter: &str,
        args: &[&dyn ToSql],
        page: PageRequest,
    ) -> Result<Page<Track>, CatalogError> {
        let total: i64 = self.db.query_row(
            &format!("SELECT COUNT(*) FROM {TRACKS} {filter}"),
            params_from_iter(args.iter()),
            |row| row.get(0),
        )?;

        let limit = i64::from(page.size);
        let offset = i64::try_from(page.offset())
            .map_err(|_| CatalogError::validation("page index out of range"))?;

        let mut paged_args: Vec<&dyn ToSql> = args.to_vec();
        paged_args.push(&limit);
        paged_args.push(&offset);

        let mut stmt = self.db.prepare(&format!(
            "SELECT {} FROM {TRACKS} {filter} ORDER BY {ID} ASC LIMIT ? OFFSET ?",
            select_columns()
        ))?;
        let rows = stmt
            .query_map(params_from_iter(paged_args.iter()), row_to_parts)?
            .collect::<Result<Vec<_>, _>>()?;

        let content = rows
            .into_iter()
            .map(RowParts::into_track)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Page::new(content, page, u64::try_from(total).unwrap_or(0)))
    }
}

impl TrackRepository for SqliteTrackRepository {
    fn save(&mut self, track: Track) -> Result<Track, CatalogError> {
        let now = system_time_to_i64(SystemTime::now()).map_err(CatalogError::Internal)?;
        match track.id {
            None => self.insert(track, now),
            Some(id) => self.update(id, track, now),
        }
    }

    fn find_by_id(&self, id: TrackId) -> Result<Option<Track>, CatalogError> {
        let parts = self
            .db
            .query_row(
                &format!(
                    "SELECT {} FROM {TRACKS} WHERE {ID} = ?1",
                    select_columns()
                ),
                params![id.0],
                row_to_parts,
            )
            .optional()?;

        parts.map(RowParts::into_track).transpose()
    }

    fn exists_by_id(&self, id: TrackId) -> Result<bool, CatalogError> {
        Ok(self.db.query_row(
            &format!("SELECT EXISTS(SELECT 1 FROM {TRACKS} WHERE {ID} = ?1)"),
            params![id.0],
            |row| row.get(0),
        )?)
    }

    fn delete_by_id(&mut self, id: TrackId) -> Result<(), CatalogError> {
        self.db.execute(
            &format!("DELETE FROM {TRACKS} WHERE {ID} = ?1"),
            params![id.0],
        )?;
        Ok(())
    }

    fn find_all(&self, page: PageRequest) -> Result<Page<Track>, CatalogError> {
        self.query_page("", &[], page)
    }

    fn find_by_category(
        &self,
        category: Category,
        page: PageRequest,
    ) -> Result<Page<Track>, CatalogError> {
        self.query_page(
            &format!("WHERE {CATEGORY} = ?"),
            &[&category.as_str()],
            page,
        )
    }

    fn find_by_title(&self, title: &str, page: PageRequest) -> Result<Page<Track>, CatalogError> {
        let needle = title.to_lowercase();
        self.query_page(
            &format!("WHERE instr({FOLD_CASE}({TITLE}), ?) > 0"),
            &[&needle],
            page,
        )
    }

    fn find_by_title_and_category(
        &self,
        title: &str,
        category: Category,
        page: PageRequest,
    ) -> Result<Page<Track>, CatalogError> {
        let needle = title.to_lowercase();
        self.query_page(
            &format!("WHERE instr({FOLD_CASE}({TITLE}), ?) > 0 AND {CATEGORY} = ?"),
            &[&needle, &category.as_str()],
            page,
        )
    }
}

fn select_columns() -> String {
    [
        ID,
        TITLE,
        ARTIST,
        DESCRIPTION,
        CATEGORY,
        DURATION,
        FILE_URL,
        FILE_SIZE,
        COVER_IMAGE,
        CREATED_AT,
        UPDATED_AT,
    ]
    .join(", ")
}

fn file_columns(track: &Track) -> Result<(Option<&str>, Option<i64>), CatalogError> {
    match &track.file {
        Some(StoredFile { url, size }) => {
            let size = i64::try_from(*size)
                .map_err(|_| CatalogError::Internal(anyhow!("file size {size} out of range")))?;
            Ok((Some(url.as_str()), Some(size)))
        }
        None => Ok((None, None)),
    }
}

/// raw column values, converted to a [`Track`] outside of rusqlite's row callback
struct RowParts {
    id: i64,
    title: String,
    artist: String,
    description: Option<String>,
    category: String,
    duration: u32,
    file_url: Option<String>,
    file_size: Option<i64>,
    cover_image: Option<String>,
    created_at: i64,
    updated_at: i64,
}

fn row_to_parts(row: &Row<'_>) -> rusqlite::Result<RowParts> {
    Ok(RowParts {
        id: row.get(0)?,
        title: row.get(1)?,
        artist: row.get(2)?,
        description: row.get(3)?,
        category: row.get(4)?,
        duration: row.get(5)?,
        file_url: row.get(6)?,
        file_size: row.get(7)?,
        cover_image: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

impl RowParts {
    fn into_track(self) -> Result<Track, CatalogError> {
        let id = TrackId(self.id);
        let category = self.category.parse::<Category>().map_err(|_| {
            CatalogError::Internal(anyhow!(
                "table {TRACKS} contains invalid category '{}' for track {id}",
                self.category
            ))
        })?;

        let file = match (self.file_url, self.file_size) {
            (Some(url), Some(size)) => Some(StoredFile {
                url,
                size: u64::try_from(size).map_err(|_| {
                    CatalogError::Internal(anyhow!("negative file size for track {id}"))
                })?,
            }),
            _ => None,
        };

        Ok(Track {
            id: Some(id),
            title: self.title,
            artist: self.artist,
            description: self.description,
            category,
            duration: self.duration,
            file,
            cover_image: self.cover_image,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}
