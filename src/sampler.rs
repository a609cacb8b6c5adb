use crate::catalog::Catalog;
use crate::error::{BoothError, Result};
use crate::session::SampledReference;
use rand::Rng;
use rand::seq::SliceRandom;
use tracing::debug;

/// Draws one reference image uniformly from the outfit's current candidates.
pub fn sample<R: Rng + ?Sized>(
    catalog: &Catalog,
    outfit_id: &str,
    rng: &mut R,
) -> Result<SampledReference> {
    let candidates = catalog.list_candidates(outfit_id)?;
    let path = candidates
        .choose(rng)
        .cloned()
        .ok_or_else(|| BoothError::NoCandidatesInOutfit(outfit_id.to_string()))?;

    debug!("Sampled {path:?} from {} candidates of {outfit_id}", candidates.len());
    Ok(SampledReference {
        source_outfit_id: outfit_id.to_string(),
        path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::collections::HashMap;
    use std::fs;

    #[test]
    fn samples_are_members_and_roughly_uniform() -> Result<()> {
        let root = tempfile::tempdir()?;
        let dir = root.path().join("outfit_1");
        fs::create_dir_all(&dir)?;
        for name in ["ref_1.jpg", "ref_2.jpg", "ref_3.png", "ref_4.webp"] {
            fs::write(dir.join(name), b"img")?;
        }
        fs::write(dir.join("notes.txt"), b"no")?;

        let catalog = Catalog::new(root.path());
        let candidates = catalog.list_candidates("outfit_1")?;
        let mut rng = StdRng::seed_from_u64(7);
        let mut counts: HashMap<_, usize> = HashMap::new();

        let draws = 4000;
        for _ in 0..draws {
            let pick = sample(&catalog, "outfit_1", &mut rng)?;
            assert_eq!(pick.source_outfit_id, "outfit_1");
            assert!(candidates.contains(&pick.path));
            *counts.entry(pick.path).or_default() += 1;
        }

        assert_eq!(counts.len(), 4);
        for (path, n) in counts {
            assert!((800..1200).contains(&n), "{path:?} drawn {n} times");
        }
        Ok(())
    }

    #[test]
    fn empty_outfit_is_reported() -> Result<()> {
        let root = tempfile::tempdir()?;
        fs::create_dir_all(root.path().join("outfit_1"))?;
        let catalog = Catalog::new(root.path());

        let err = sample(&catalog, "outfit_1", &mut StdRng::seed_from_u64(1)).unwrap_err();
        assert!(matches!(err, BoothError::NoCandidatesInOutfit(id) if id == "outfit_1"));
        Ok(())
    }
}
