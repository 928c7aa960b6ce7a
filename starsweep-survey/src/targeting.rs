//! Weighted-random target selection
//!
//! Draws catalog identifiers from a small set of priority ranges, each
//! weighted by how likely its targets are to have usable observations.
//! A fixed ~10% of draws instead sample uniformly from the full catalog
//! span so low-priority regions are never permanently ignored.
//!
//! Draws are independent; no state is kept between them. Repeats are
//! expected and filtered downstream by the tracker.

use rand::Rng;

use starsweep_common::config::TargetingConfig;
use starsweep_common::TargetId;

/// Stateless weighted selector over catalog-number ranges
pub struct TargetSelector {
    /// Each priority range repeated `round(weight * 10)` times
    table: Vec<(u64, u64)>,
    wildcard_probability: f64,
    full_range: (u64, u64),
}

impl TargetSelector {
    pub fn new(config: &TargetingConfig) -> Self {
        let mut table = Vec::new();
        for range in &config.ranges {
            let slots = (range.weight * 10.0).round() as usize;
            for _ in 0..slots {
                table.push((range.lo, range.hi));
            }
        }
        TargetSelector {
            table,
            wildcard_probability: config.wildcard_probability,
            full_range: (config.full_range_lo, config.full_range_hi),
        }
    }

    /// Draw one target identifier
    pub fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> TargetId {
        let (lo, hi) = if self.table.is_empty() || rng.gen::<f64>() < self.wildcard_probability {
            self.full_range
        } else {
            self.table[rng.gen_range(0..self.table.len())]
        };
        TargetId::from_catalog_number(rng.gen_range(lo..=hi))
    }

    /// Draw a fixed-size batch
    pub fn draw_batch<R: Rng + ?Sized>(&self, rng: &mut R, n: usize) -> Vec<TargetId> {
        (0..n).map(|_| self.draw(rng)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use starsweep_common::config::PriorityRange;

    fn catalog_number(id: &TargetId) -> u64 {
        id.as_str().trim_start_matches("TIC ").parse().unwrap()
    }

    #[test]
    fn draws_stay_inside_configured_spans() {
        let config = TargetingConfig::default();
        let selector = TargetSelector::new(&config);
        let mut rng = StdRng::seed_from_u64(1);

        for _ in 0..2000 {
            let n = catalog_number(&selector.draw(&mut rng));
            assert!(
                (config.full_range_lo..=config.full_range_hi).contains(&n),
                "catalog number {} outside full span",
                n
            );
        }
    }

    #[test]
    fn without_wildcard_all_draws_land_in_priority_ranges() {
        let config = TargetingConfig {
            wildcard_probability: 0.0,
            ..TargetingConfig::default()
        };
        let selector = TargetSelector::new(&config);
        let mut rng = StdRng::seed_from_u64(2);

        for _ in 0..1000 {
            let n = catalog_number(&selector.draw(&mut rng));
            let in_range = config.ranges.iter().any(|r| (r.lo..=r.hi).contains(&n));
            assert!(in_range, "catalog number {} outside priority ranges", n);
        }
    }

    #[test]
    fn wildcard_only_selector_covers_full_span() {
        let config = TargetingConfig {
            ranges: vec![],
            wildcard_probability: 0.0,
            full_range_lo: 100,
            full_range_hi: 200,
        };
        // Empty table falls back to the full span even with zero probability
        let selector = TargetSelector::new(&config);
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..100 {
            let n = catalog_number(&selector.draw(&mut rng));
            assert!((100..=200).contains(&n));
        }
    }

    #[test]
    fn heavier_ranges_are_drawn_more_often() {
        let config = TargetingConfig {
            ranges: vec![
                PriorityRange { lo: 0, hi: 9, weight: 0.9 },
                PriorityRange { lo: 1000, hi: 1009, weight: 0.1 },
            ],
            wildcard_probability: 0.0,
            full_range_lo: 0,
            full_range_hi: 2000,
        };
        let selector = TargetSelector::new(&config);
        let mut rng = StdRng::seed_from_u64(4);

        let mut low = 0u32;
        for _ in 0..5000 {
            if catalog_number(&selector.draw(&mut rng)) < 10 {
                low += 1;
            }
        }
        // Expected ratio 9:1; allow generous slack for the seed
        assert!(low > 4000, "heavy range drawn only {} of 5000", low);
    }

    #[test]
    fn batch_draw_honors_size() {
        let selector = TargetSelector::new(&TargetingConfig::default());
        let mut rng = StdRng::seed_from_u64(5);
        assert_eq!(selector.draw_batch(&mut rng, 50).len(), 50);
    }
}
