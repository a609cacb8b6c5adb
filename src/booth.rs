use crate::catalog::{Catalog, OutfitCatalogEntry};
use crate::config::Layout;
use crate::error::{BoothError, Result};
use crate::export::{self, Download, Printer};
use crate::face::FaceEngine;
use crate::orchestrator;
use crate::sampler;
use crate::session::{CapturedPhoto, SampledReference, Session, Stage, SwapResult};
use image::RgbImage;
use rand::Rng;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{Level, debug, info, span, warn};

#[derive(Debug, Clone)]
pub struct OutfitCard {
    pub entry: OutfitCatalogEntry,
    pub selected: bool,
}

/// Everything a front end needs to draw one pass of the booth.
#[derive(Debug, Clone)]
pub struct View {
    pub cards: Vec<OutfitCard>,
    pub preview: Option<PathBuf>,
    pub photo: Option<PathBuf>,
    pub reference: Option<SampledReference>,
    pub result: Option<PathBuf>,
    pub stage: Stage,
    pub warnings: Vec<String>,
}

/// The fitting workflow: Select Outfit -> Capture Photo -> Sample Reference ->
/// Execute Swap. Holds the services; the per-user [`Session`] is passed in to
/// every stage.
pub struct Booth<'a, E: FaceEngine + ?Sized, P: Printer> {
    layout: Layout,
    catalog: Catalog,
    engine: &'a E,
    printer: P,
}

impl<'a, E: FaceEngine + ?Sized, P: Printer> Booth<'a, E, P> {
    pub fn new(layout: Layout, engine: &'a E, printer: P) -> Self {
        let catalog = Catalog::new(layout.refs.clone());
        Booth {
            layout,
            catalog,
            engine,
            printer,
        }
    }

    /// Re-evaluates the workflow against the current filesystem and session.
    /// When an outfit and a photo are both present and no reference is pinned
    /// yet, one is drawn and pinned so later renders and the swap agree on it.
    pub fn render<R: Rng + ?Sized>(&self, session: &mut Session, rng: &mut R) -> Result<View> {
        let span = span!(Level::DEBUG, "render");
        let _guard = span.enter();

        let mut warnings = Vec::new();
        let entries = self.catalog.scan()?;
        if entries.is_empty() {
            let e = BoothError::CatalogEmpty(self.catalog.root().to_path_buf());
            warn!("{e}");
            warnings.push(format!("{e}. Create folders like outfit_1, outfit_2, ..."));
        }

        let chosen = session.current().map(String::from);
        let preview = match &chosen {
            Some(id) => self.catalog.find_representative(id)?,
            None => None,
        };

        if let Some(reference) = session.reference() {
            if !self.still_listed(reference)? {
                warn!("Pinned reference {:?} is gone, drawing again", reference.path);
                session.clear_reference();
            }
        }

        let unpinned = session.photo().is_some() && session.reference().is_none();
        if let (Some(id), true) = (&chosen, unpinned) {
            match sampler::sample(&self.catalog, id, rng) {
                Ok(reference) => {
                    info!("Pinned reference {:?} for {id}", reference.path);
                    session.pin_reference(reference);
                }
                Err(e @ BoothError::NoCandidatesInOutfit(_)) => {
                    warn!("{e}");
                    warnings.push(e.to_string());
                }
                Err(e) => return Err(e),
            }
        }

        let cards = entries
            .into_iter()
            .map(|entry| OutfitCard {
                selected: chosen.as_deref() == Some(entry.id.as_str()),
                entry,
            })
            .collect();

        Ok(View {
            cards,
            preview,
            photo: session.photo().map(|p| p.saved_path.clone()),
            reference: session.reference().cloned(),
            result: session.result().map(|r| r.saved_path.clone()),
            stage: session.stage(),
            warnings,
        })
    }

    pub fn select(&self, session: &mut Session, outfit_id: &str) {
        session.select(outfit_id);
    }

    /// Stores a captured frame in the single upload slot.
    pub fn capture(&self, session: &mut Session, img: &RgbImage) -> Result<()> {
        let saved_path = self.layout.user_photo();
        export::write_jpeg(img, &saved_path)?;
        let raw_bytes = fs::read(&saved_path)?;
        debug!("Saved {} byte photo to {saved_path:?}", raw_bytes.len());

        session.set_photo(CapturedPhoto {
            raw_bytes,
            saved_path,
        });
        Ok(())
    }

    pub fn capture_file(&self, session: &mut Session, path: &Path) -> Result<()> {
        let img = image::open(path)?.into_rgb8();
        self.capture(session, &img)
    }

    /// Draws a new reference for the current outfit, replacing the pinned one.
    pub fn reshuffle<R: Rng + ?Sized>(
        &self,
        session: &mut Session,
        rng: &mut R,
    ) -> Result<SampledReference> {
        let outfit = session.current().ok_or(BoothError::NoOutfitSelected)?.to_string();
        if session.photo().is_none() {
            return Err(BoothError::NoPhotoCaptured);
        }
        let reference = sampler::sample(&self.catalog, &outfit, rng)?;
        session.pin_reference(reference.clone());
        Ok(reference)
    }

    /// Runs the swap on the pinned reference. Failures leave the session as it
    /// was so the user can retake the photo or pick another outfit.
    pub fn swap(&self, session: &mut Session) -> Result<SwapResult> {
        let outfit = session.current().ok_or(BoothError::NoOutfitSelected)?;
        let photo = session.photo().ok_or(BoothError::NoPhotoCaptured)?;
        let reference = session
            .reference()
            .ok_or_else(|| BoothError::NoCandidatesInOutfit(outfit.to_string()))?;
        if !self.still_listed(reference)? {
            return Err(BoothError::NoCandidatesInOutfit(outfit.to_string()));
        }

        let result = orchestrator::execute(
            self.engine,
            &photo.saved_path,
            &reference.path,
            &self.layout.result(),
        )?;
        session.set_result(result.clone());
        Ok(result)
    }

    /// The folder may have been emptied or removed since the reference was drawn.
    fn still_listed(&self, reference: &SampledReference) -> Result<bool> {
        let candidates = self.catalog.list_candidates(&reference.source_outfit_id)?;
        Ok(candidates.contains(&reference.path))
    }

    pub fn print(&self, session: &Session) -> Result<()> {
        let result = session.result().ok_or(BoothError::NoResult)?;
        self.printer.print(&result.saved_path)
    }

    pub fn download(&self, session: &Session) -> Result<Download> {
        let result = session.result().ok_or(BoothError::NoResult)?;
        export::offer_download(&result.saved_path)
    }
}
