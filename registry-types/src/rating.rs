//! Rating Buffer (C2): a rotating per-user rating store with average.
//!
//! Transliterated from `original_source/registry/services/rating_service.py`
//! (`update_rating_details`/`calculate_average_rating`): a user who has
//! already rated updates their entry in place, preserving its position; a
//! new rating appends and, past the 100-entry cap, evicts the oldest.

use crate::error::GatewayError;
use serde::{Deserialize, Serialize};

pub const MAX_RATINGS: usize = 100;
pub const MIN_RATING: u8 = 1;
pub const MAX_RATING: u8 = 5;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RatingEntry {
    pub user: String,
    pub rating: u8,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RatingBuffer {
    entries: Vec<RatingEntry>,
}

impl RatingBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[RatingEntry] {
        &self.entries
    }

    /// Submits a rating from `user`. Updates in place if `user` already has
    /// an entry (without reordering); otherwise appends and, past
    /// [`MAX_RATINGS`], drops the oldest entry.
    pub fn submit(&mut self, user: &str, rating: u8) -> Result<(), GatewayError> {
        if !(MIN_RATING..=MAX_RATING).contains(&rating) {
            return Err(GatewayError::invalid(format!(
                "rating must be between {MIN_RATING} and {MAX_RATING} (inclusive)"
            )));
        }

        if let Some(entry) = self.entries.iter_mut().find(|e| e.user == user) {
            entry.rating = rating;
            return Ok(());
        }

        self.entries.push(RatingEntry {
            user: user.to_string(),
            rating,
        });
        if self.entries.len() > MAX_RATINGS {
            self.entries.remove(0);
        }
        Ok(())
    }

    /// `(num_stars, entries[:100])` — the average rating (0.0 when empty)
    /// and the (already-capped) entry list.
    pub fn summary(&self) -> (f64, &[RatingEntry]) {
        (self.num_stars(), &self.entries)
    }

    pub fn num_stars(&self) -> f64 {
        if self.entries.is_empty() {
            return 0.0;
        }
        let sum: u32 = self.entries.iter().map(|e| e.rating as u32).sum();
        sum as f64 / self.entries.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_in_place_preserves_position() {
        let mut buf = RatingBuffer::new();
        buf.submit("a", 3).unwrap();
        buf.submit("b", 4).unwrap();
        buf.submit("a", 5).unwrap();
        assert_eq!(
            buf.entries(),
            &[
                RatingEntry { user: "a".into(), rating: 5 },
                RatingEntry { user: "b".into(), rating: 4 },
            ]
        );
    }

    #[test]
    fn rejects_out_of_range() {
        let mut buf = RatingBuffer::new();
        assert!(buf.submit("a", 0).is_err());
        assert!(buf.submit("a", 6).is_err());
    }

    #[test]
    fn rotates_past_100_entries() {
        let mut buf = RatingBuffer::new();
        for i in 0..100 {
            buf.submit(&format!("u{i}"), 5).unwrap();
        }
        assert_eq!(buf.num_stars(), 5.0);
        buf.submit("u100", 1).unwrap();
        assert_eq!(buf.entries().len(), 100);
        assert!(!buf.entries().iter().any(|e| e.user == "u0"));
        let expected = (99.0 * 5.0 + 1.0) / 100.0;
        assert!((buf.num_stars() - expected).abs() < 1e-9);
        assert!((buf.num_stars() - 4.96).abs() < 1e-9);
    }
}
