use std::path::PathBuf;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct CapturedPhoto {
    pub raw_bytes: Vec<u8>,
    pub saved_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampledReference {
    pub source_outfit_id: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct SwapResult {
    pub image_bytes: Vec<u8>,
    pub saved_path: PathBuf,
}

/// Where the booth is in Select Outfit -> Capture Photo -> Sample Reference -> Execute Swap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    SelectOutfit,
    CapturePhoto,
    SampleReference,
    ExecuteSwap,
    Done,
}

/// State for one kiosk user. Nothing here is global: every stage receives the
/// session it works on.
#[derive(Debug, Clone, Default)]
pub struct Session {
    chosen_outfit: Option<String>,
    photo: Option<CapturedPhoto>,
    reference: Option<SampledReference>,
    result: Option<SwapResult>,
}

impl Session {
    pub fn new() -> Session {
        Session::default()
    }

    /// Last click wins. Picking a different outfit drops the pinned reference and
    /// any result produced from it.
    pub fn select(&mut self, outfit_id: &str) {
        if self.chosen_outfit.as_deref() != Some(outfit_id) {
            self.reference = None;
            self.result = None;
        }
        debug!("Selected outfit {outfit_id}");
        self.chosen_outfit = Some(outfit_id.to_string());
    }

    pub fn current(&self) -> Option<&str> {
        self.chosen_outfit.as_deref()
    }

    /// A new capture replaces the previous photo and unpins the reference, so the
    /// next render draws a fresh one.
    pub fn set_photo(&mut self, photo: CapturedPhoto) {
        self.reference = None;
        self.result = None;
        self.photo = Some(photo);
    }

    pub fn photo(&self) -> Option<&CapturedPhoto> {
        self.photo.as_ref()
    }

    pub fn pin_reference(&mut self, reference: SampledReference) {
        self.result = None;
        self.reference = Some(reference);
    }

    pub fn clear_reference(&mut self) {
        self.reference = None;
    }

    /// The pinned reference, only while it still belongs to the selected outfit.
    pub fn reference(&self) -> Option<&SampledReference> {
        self.reference
            .as_ref()
            .filter(|r| Some(r.source_outfit_id.as_str()) == self.current())
    }

    pub fn set_result(&mut self, result: SwapResult) {
        self.result = Some(result);
    }

    pub fn result(&self) -> Option<&SwapResult> {
        self.result.as_ref()
    }

    pub fn stage(&self) -> Stage {
        match (self.current(), &self.photo, self.reference(), &self.result) {
            (None, _, _, _) => Stage::SelectOutfit,
            (Some(_), None, _, _) => Stage::CapturePhoto,
            (Some(_), Some(_), None, _) => Stage::SampleReference,
            (Some(_), Some(_), Some(_), None) => Stage::ExecuteSwap,
            (Some(_), Some(_), Some(_), Some(_)) => Stage::Done,
        }
    }
}
