use std::{
    collections::HashSet,
    fs,
    io::{self, ErrorKind},
    path::Path,
};

use crate::offer::Offer;

/// How many offers the archive keeps by default.
pub const DEFAULT_LIMIT: usize = 5000;

/// Every offer ever published, newest first, for the archive page and the feed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct History {
    offers: Vec<Offer>,
}

/// Key two offers are considered the same by.
fn key(offer: &Offer) -> &str {
    offer.id.as_deref().unwrap_or(&offer.url)
}

impl History {
    #[must_use]
    pub fn new(offers: Vec<Offer>) -> Self {
        Self { offers }
    }

    /// Load from disk. A missing or broken file is an empty history.
    pub fn load(path: &Path) -> Self {
        Self::new(load_offers(path))
    }

    pub fn save(&self, path: &Path) -> io::Result<()> {
        save_offers(path, &self.offers)
    }

    #[must_use]
    pub fn offers(&self) -> &[Offer] {
        &self.offers
    }

    #[must_use]
    pub fn newest(&self) -> Option<&Offer> {
        self.offers.first()
    }

    /// Put `fresh` offers (newest first) on top, dropping older copies of the same offers,
    /// and keep at most `limit`.
    pub fn merge(&mut self, fresh: &[Offer], limit: usize) {
        let mut seen = HashSet::new();
        let merged: Vec<Offer> = fresh
            .iter()
            .chain(self.offers.iter())
            .filter(|offer| seen.insert(key(offer)))
            .take(limit)
            .cloned()
            .collect();

        log::debug!(
            "History now has {} offers (was {})",
            merged.len(),
            self.offers.len()
        );
        self.offers = merged;
    }
}

/// Read a JSON list of offers. Never fails: problems are logged and yield an empty list.
pub fn load_offers(path: &Path) -> Vec<Offer> {
    let data = match fs::read_to_string(path) {
        Ok(data) => data,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            log::info!("No offers at {}, starting empty", path.display());
            return Vec::new();
        }
        Err(e) => {
            log::warn!("Failed to read {}: {}", path.display(), e);
            return Vec::new();
        }
    };

    serde_json::from_str(&data).unwrap_or_else(|e| {
        log::warn!("{} is not a valid offer list, ignoring it: {}", path.display(), e);
        Vec::new()
    })
}

/// Write a JSON list of offers, creating parent directories as needed.
pub fn save_offers(path: &Path, offers: &[Offer]) -> io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    fs::write(path, serde_json::to_string_pretty(offers)?)?;
    log::debug!("Saved {} offers to {}", offers.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    fn offer(id: Option<&str>, url: &str) -> Offer {
        Offer {
            title: url.to_string(),
            url: url.to_string(),
            price: String::new(),
            image: None,
            id: id.map(ToString::to_string),
            created_at: None,
        }
    }

    #[test]
    fn merge_puts_fresh_first_and_dedups() {
        let mut history = History::new(vec![
            offer(Some("ch_2"), "https://a.it/2"),
            offer(Some("ch_1"), "https://a.it/1"),
            offer(None, "https://a.it/old"),
        ]);

        history.merge(
            &[
                offer(Some("ch_3"), "https://a.it/3"),
                offer(Some("ch_1"), "https://a.it/1-again"),
                offer(None, "https://a.it/old"),
            ],
            DEFAULT_LIMIT,
        );

        let urls: Vec<_> = history.offers().iter().map(|o| o.url.as_str()).collect();
        assert_eq!(
            urls,
            [
                "https://a.it/3",
                "https://a.it/1-again",
                "https://a.it/old",
                "https://a.it/2"
            ]
        );
    }

    #[test]
    fn merge_is_capped() {
        let mut history = History::default();
        for round in 0..3 {
            let fresh: Vec<_> = (0..4)
                .map(|i| offer(Some(&format!("ch_{round}_{i}")), "https://a.it"))
                .collect();
            history.merge(&fresh, 6);
        }
        assert_eq!(history.offers().len(), 6);
        assert_eq!(history.newest().unwrap().id.as_deref(), Some("ch_2_0"));
    }

    #[test]
    fn load_fails_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        assert_eq!(History::load(&path), History::default());

        fs::write(&path, "{ not json").unwrap();
        assert_eq!(History::load(&path), History::default());
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("history.json");
        let history = History::new(vec![offer(Some("ch_1"), "https://a.it/1")]);
        history.save(&path).unwrap();
        assert_eq!(History::load(&path), history);
    }
}
