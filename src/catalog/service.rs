use std::io::BufRead;

use log::{info, warn};

use crate::{
    domain::{
        mapping,
        page::{Page, PageRequest},
        track::{Category, StoredFile, Track, TrackDto, TrackId},
    },
    error::CatalogError,
    storage::{blob::BlobStore, repository::TrackRepository},
};

/// An uploaded file as handed over by the boundary layer
#[derive(Debug)]
pub struct Upload<R> {
    /// name the client gave the file, only its extension is kept
    pub file_name: String,
    pub content: R,
}

impl<R> Upload<R> {
    pub fn new(file_name: impl Into<String>, content: R) -> Self {
        Self {
            file_name: file_name.into(),
            content,
        }
    }
}

/// Which repository query a search runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchPredicate<'a> {
    All,
    Category(Category),
    Title(&'a str),
    TitleAndCategory(&'a str, Category),
}

impl<'a> SearchPredicate<'a> {
    /// Picks the query purely from which parameters are present.
    ///
    /// A blank title counts as absent. Any other title is passed on untouched.
    pub fn select(title: Option<&'a str>, category: Option<Category>) -> Self {
        let title = title.filter(|t| !t.trim().is_empty());
        match (title, category) {
            (Some(title), Some(category)) => SearchPredicate::TitleAndCategory(title, category),
            (Some(title), None) => SearchPredicate::Title(title),
            (None, Some(category)) => SearchPredicate::Category(category),
            (None, None) => SearchPredicate::All,
        }
    }
}

/// Main structure that implements all catalog logic
pub struct CatalogService<R> {
    repo: R,
    blobs: BlobStore,
}

impl<R: TrackRepository> CatalogService<R> {
    pub fn new(repo: R, blobs: BlobStore) -> Self {
        Self { repo, blobs }
    }

    #[cfg(test)]
    pub fn repository(&self) -> &R {
        &self.repo
    }

    #[cfg(test)]
    pub fn blobs(&self) -> &BlobStore {
        &self.blobs
    }

    /// persists a track without touching the blob store
    pub fn create(&mut self, dto: TrackDto) -> Result<TrackDto, CatalogError> {
        let mut track = mapping::to_record(dto)?;
        track.id = None;

        let saved = self.repo.save(track)?;
        info!("created track {}", display_id(saved.id));
        Ok(mapping::to_dto(&saved))
    }

    /// stores the upload first, then persists the track pointing at it
    ///
    /// When persisting fails the freshly written blob is removed again.
    pub fn create_with_file<B: BufRead>(
        &mut self,
        mut dto: TrackDto,
        upload: Upload<B>,
    ) -> Result<TrackDto, CatalogError> {
        mapping::validate_metadata(&dto)?;

        let stored = self.blobs.store(upload.content, &upload.file_name)?;
        dto.file_url = Some(stored.url.clone());
        dto.file_size = Some(stored.size);

        let saved = mapping::to_record(dto).and_then(|mut track| {
            track.id = None;
            self.repo.save(track)
        });

        match saved {
            Ok(saved) => {
                info!(
                    "created track {} with file {}",
                    display_id(saved.id),
                    stored.url
                );
                Ok(mapping::to_dto(&saved))
            }
            Err(e) => {
                self.discard_blob(&stored);
                Err(e)
            }
        }
    }

    pub fn show(&self, id: TrackId) -> Result<TrackDto, CatalogError> {
        self.find_record(id).map(|track| mapping::to_dto(&track))
    }

    /// the stored record including fields the transfer shape leaves out
    pub fn find_record(&self, id: TrackId) -> Result<Track, CatalogError> {
        self.repo.find_by_id(id)?.ok_or(CatalogError::NotFound(id))
    }

    /// overwrites the metadata of an existing track, file fields stay as they are
    pub fn update(&mut self, id: TrackId, dto: TrackDto) -> Result<TrackDto, CatalogError> {
        let mut track = self.find_record(id)?;
        mapping::apply_metadata(&mut track, &dto)?;

        let saved = self.repo.save(track)?;
        info!("updated track {id}");
        Ok(mapping::to_dto(&saved))
    }

    /// like [`Self::update`], and replaces the file when a non-empty upload is given
    pub fn update_with_file<B: BufRead>(
        &mut self,
        id: TrackId,
        dto: TrackDto,
        upload: Option<Upload<B>>,
    ) -> Result<TrackDto, CatalogError> {
        let mut track = self.find_record(id)?;
        mapping::apply_metadata(&mut track, &dto)?;

        let stored = match upload {
            Some(mut upload) => {
                if upload.content.fill_buf()?.is_empty() {
                    None
                } else {
                    Some(self.blobs.store(upload.content, &upload.file_name)?)
                }
            }
            None => None,
        };
        if let Some(stored) = &stored {
            track.file = Some(stored.clone());
        }

        match self.repo.save(track) {
            Ok(saved) => {
                info!(
                    "updated track {id}{}",
                    if stored.is_some() { " with new file" } else { "" }
                );
                Ok(mapping::to_dto(&saved))
            }
            Err(e) => {
                if let Some(stored) = &stored {
                    self.discard_blob(stored);
                }
                Err(e)
            }
        }
    }

    /// removes the record only; its blob stays in the content directory
    pub fn delete(&mut self, id: TrackId) -> Result<(), CatalogError> {
        if !self.repo.exists_by_id(id)? {
            return Err(CatalogError::NotFound(id));
        }
        self.repo.delete_by_id(id)?;
        info!("deleted track {id}");
        Ok(())
    }

    pub fn search(
        &self,
        title: Option<&str>,
        category: Option<Category>,
        page: PageRequest,
    ) -> Result<Page<TrackDto>, CatalogError> {
        let found = match SearchPredicate::select(title, category) {
            SearchPredicate::TitleAndCategory(title, category) => {
                self.repo.find_by_title_and_category(title, category, page)?
            }
            SearchPredicate::Title(title) => self.repo.find_by_title(title, page)?,
            SearchPredicate::Category(category) => self.repo.find_by_category(category, page)?,
            SearchPredicate::All => self.repo.find_all(page)?,
        };

        Ok(found.map(|track| mapping::to_dto(&track)))
    }

    fn discard_blob(&self, stored: &StoredFile) {
        if let Err(e) = self.blobs.remove(stored) {
            warn!("failed to remove orphaned blob {}: {e}", stored.url);
        }
    }
}

fn display_id(id: Option<TrackId>) -> String {
    id.map(|id| id.to_string()).unwrap_or_else(|| "?".into())
}
