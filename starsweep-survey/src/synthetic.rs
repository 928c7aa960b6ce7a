//! Bundled synthetic archive
//!
//! Stands in for a network archive so the survey runs out of the box.
//! Each target maps deterministically to a population draw: most have
//! no usable data, a few carry an injected transit, a few an eclipsing
//! binary, the rest are quiet. Raw curves come with an instrumental
//! flux level, slow trends, flares and dropped samples so the cleaning
//! chain has real work to do.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sha2::{Digest, Sha256};
use starsweep_common::config::SyntheticConfig;
use starsweep_common::series::LightCurve;
use starsweep_common::{Result, TargetId};

use crate::source::LightCurveSource;

/// What the archive will synthesize for a given target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyntheticProfile {
    NoData,
    Planet,
    Binary,
    Quiet,
}

pub struct SyntheticArchive {
    config: SyntheticConfig,
}

impl SyntheticArchive {
    pub fn new(config: SyntheticConfig) -> Self {
        SyntheticArchive { config }
    }

    /// Every draw for a target comes from this stream, so the same
    /// target always synthesizes the same curve
    fn rng_for(&self, target: &TargetId) -> StdRng {
        let mut hasher = Sha256::new();
        hasher.update(self.config.seed.to_le_bytes());
        hasher.update(target.as_str().as_bytes());
        let digest = hasher.finalize();
        let mut seed = [0u8; 8];
        seed.copy_from_slice(&digest[..8]);
        StdRng::seed_from_u64(u64::from_le_bytes(seed))
    }

    pub fn profile(&self, target: &TargetId) -> SyntheticProfile {
        let roll: f64 = self.rng_for(target).gen();
        let planet_cut = self.config.no_data_fraction + self.config.planet_fraction;
        let binary_cut = planet_cut + self.config.binary_fraction;
        if roll < self.config.no_data_fraction {
            SyntheticProfile::NoData
        } else if roll < planet_cut {
            SyntheticProfile::Planet
        } else if roll < binary_cut {
            SyntheticProfile::Binary
        } else {
            SyntheticProfile::Quiet
        }
    }

    fn generate(&self, target: &TargetId) -> Option<LightCurve> {
        let mut rng = self.rng_for(target);
        let roll: f64 = rng.gen();
        let planet_cut = self.config.no_data_fraction + self.config.planet_fraction;
        let binary_cut = planet_cut + self.config.binary_fraction;
        if roll < self.config.no_data_fraction {
            return None;
        }

        let cadence = self.config.cadence_minutes / (24.0 * 60.0);
        let samples = (self.config.baseline_days / cadence) as usize;
        let level: f64 = rng.gen_range(800.0..1200.0);
        let noise: f64 = rng.gen_range(0.0005..0.0015);
        let trend_period: f64 = rng.gen_range(5.0..15.0);
        let trend_amp: f64 = rng.gen_range(0.001..0.008);

        let signal: Box<dyn Fn(f64) -> f64> = if roll < planet_cut {
            let period: f64 = rng.gen_range(0.8..12.0);
            let epoch: f64 = rng.gen_range(0.0..period);
            let depth: f64 = rng.gen_range(0.005..0.02);
            let duration = transit_duration(period);
            Box::new(move |t| {
                if near_phase(t, period, epoch, duration) {
                    1.0 - depth
                } else {
                    1.0
                }
            })
        } else if roll < binary_cut {
            let period: f64 = rng.gen_range(1.0..8.0);
            let epoch: f64 = rng.gen_range(0.0..period);
            let primary: f64 = rng.gen_range(0.03..0.08);
            let secondary = primary * rng.gen_range(0.25..0.6);
            let duration = transit_duration(period);
            Box::new(move |t| {
                let p1 = eclipse_fraction(t, period, epoch, duration);
                let p2 = eclipse_fraction(t, period, epoch + period / 2.0, duration);
                1.0 - primary * p1 - secondary * p2
            })
        } else {
            Box::new(|_| 1.0)
        };

        let mut time = Vec::with_capacity(samples);
        let mut flux = Vec::with_capacity(samples);
        for i in 0..samples {
            let t = i as f64 * cadence;
            let trend = 1.0 + trend_amp * (std::f64::consts::TAU * t / trend_period).sin();
            let eps = noise * gaussian(&mut rng);
            time.push(t);
            flux.push(level * trend * (signal(t) + eps));
        }

        // Occasional flare, decaying over a few samples
        if rng.gen::<f64>() < 0.3 && samples > 16 {
            let start = rng.gen_range(0..samples - 8);
            let amp: f64 = rng.gen_range(0.02..0.05);
            for k in 0..8 {
                flux[start + k] *= 1.0 + amp * (-(k as f64) / 2.5).exp();
            }
        }

        // Dropped samples show up as NaN in real archives
        for f in flux.iter_mut() {
            if rng.gen::<f64>() < 0.004 {
                *f = f64::NAN;
            }
        }

        Some(LightCurve::new(time, flux))
    }
}

#[async_trait::async_trait]
impl LightCurveSource for SyntheticArchive {
    async fn acquire(&self, target: &TargetId) -> Result<Option<LightCurve>> {
        Ok(self.generate(target))
    }
}

/// Duration scales with the cube root of the period, capped so the
/// in-transit fraction stays searchable
fn transit_duration(period: f64) -> f64 {
    (0.1 * period.cbrt()).min(0.09 * period)
}

/// True within half a duration of the epoch, modulo the period
fn near_phase(t: f64, period: f64, epoch: f64, duration: f64) -> bool {
    let phase = (t - epoch).rem_euclid(period);
    phase < duration / 2.0 || phase > period - duration / 2.0
}

/// V-shaped eclipse profile, 1.0 at center tapering to 0.0 at the edges
fn eclipse_fraction(t: f64, period: f64, epoch: f64, duration: f64) -> f64 {
    let phase = (t - epoch).rem_euclid(period);
    let offset = phase.min(period - phase);
    let half = duration / 2.0;
    if offset < half {
        1.0 - offset / half
    } else {
        0.0
    }
}

/// Box-Muller draw from the standard normal
fn gaussian<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    let u1: f64 = rng.gen_range(f64::MIN_POSITIVE..1.0);
    let u2: f64 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
}
