use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Image extensions accepted in an outfit folder, in representative lookup priority.
pub const ACCEPTED_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "webp"];

const REPRESENTATIVE_STEM: &str = "ref_1";
const OUTFIT_PREFIX: &str = "outfit_";

#[derive(Debug, Clone)]
pub struct OutfitCatalogEntry {
    pub id: String,
    pub directory_path: PathBuf,
    pub candidate_images: Vec<PathBuf>,
    pub representative: Option<PathBuf>,
}

impl OutfitCatalogEntry {
    pub fn display_name(&self) -> String {
        display_name(&self.id)
    }

    pub fn is_usable(&self) -> bool {
        !self.candidate_images.is_empty()
    }
}

/// Read-only view over `refs/<outfit_id>/*`. Every call hits the filesystem, so
/// folders added or removed while the booth runs show up on the next scan.
#[derive(Debug, Clone)]
pub struct Catalog {
    root: PathBuf,
}

impl Catalog {
    pub fn new(root: impl Into<PathBuf>) -> Catalog {
        Catalog { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn outfit_dir(&self, outfit_id: &str) -> PathBuf {
        self.root.join(outfit_id)
    }

    /// Immediate subdirectories of the catalog root, sorted by name.
    pub fn list_outfits(&self) -> io::Result<Vec<String>> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!("Catalog root {:?} does not exist", self.root);
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };

        let mut outfits = Vec::new();
        for entry in entries {
            let entry = entry?;
            // Follows symlinks, so linked outfit folders count.
            if !entry.path().is_dir() {
                continue;
            }
            match entry.file_name().into_string() {
                Ok(name) => outfits.push(name),
                Err(name) => warn!("Skipping outfit folder with non UTF-8 name {name:?}"),
            }
        }
        outfits.sort();

        debug!("Found {} outfits under {:?}", outfits.len(), self.root);
        Ok(outfits)
    }

    /// `ref_1.<ext>` in extension priority order, else the first accepted image by name.
    pub fn find_representative(&self, outfit_id: &str) -> io::Result<Option<PathBuf>> {
        let dir = self.outfit_dir(outfit_id);
        for ext in ACCEPTED_EXTENSIONS {
            let path = dir.join(format!("{REPRESENTATIVE_STEM}.{ext}"));
            if path.is_file() {
                return Ok(Some(path));
            }
        }

        let mut names: Vec<String> = self
            .accepted_files(&dir)?
            .into_iter()
            .filter_map(|p| p.file_name().and_then(|n| n.to_str()).map(String::from))
            .collect();
        names.sort();

        Ok(names.into_iter().next().map(|name| dir.join(name)))
    }

    /// Every accepted image in the outfit folder, in directory enumeration order.
    /// A folder that has disappeared since it was selected lists as empty.
    pub fn list_candidates(&self, outfit_id: &str) -> io::Result<Vec<PathBuf>> {
        self.accepted_files(&self.outfit_dir(outfit_id))
    }

    pub fn scan(&self) -> io::Result<Vec<OutfitCatalogEntry>> {
        let mut entries = Vec::new();
        for id in self.list_outfits()? {
            let candidate_images = self.list_candidates(&id)?;
            if candidate_images.is_empty() {
                warn!("Outfit {id} has no reference images");
            }
            entries.push(OutfitCatalogEntry {
                directory_path: self.outfit_dir(&id),
                representative: self.find_representative(&id)?,
                candidate_images,
                id,
            });
        }
        Ok(entries)
    }

    fn accepted_files(&self, dir: &Path) -> io::Result<Vec<PathBuf>> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.path().is_file() {
                continue;
            }
            let name = entry.file_name();
            if name.to_str().is_some_and(has_accepted_extension) {
                files.push(entry.path());
            }
        }
        Ok(files)
    }
}

pub fn has_accepted_extension(file_name: &str) -> bool {
    let lower = file_name.to_lowercase();
    ACCEPTED_EXTENSIONS
        .iter()
        .any(|ext| lower.ends_with(&format!(".{ext}")))
}

/// `outfit_3` reads as "Outfit 3"; anything else is shown as-is.
pub fn display_name(outfit_id: &str) -> String {
    match outfit_id.strip_prefix(OUTFIT_PREFIX) {
        Some(n) => match n.parse::<u64>() {
            Ok(n) => format!("Outfit {n}"),
            Err(_) => outfit_id.to_string(),
        },
        None => outfit_id.to_string(),
    }
}
