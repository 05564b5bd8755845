use std::f64::consts::{PI, TAU};

use rand::Rng;
use rand::seq::SliceRandom;

use crate::geo::EARTH_RADIUS_KM;
use crate::models::horse::Horse;
use crate::models::location::GeoPoint;

pub const HORSE_NAMES: [&str; 62] = [
    "Afrodita", "Elektra", "Harmony", "Athena", "Daphne", "Gaia", "Hebe", "Hera", "Kaliope",
    "Pandora", "Penelope", "Isis", "Juno", "Venus", "Luna", "Ahile", "Ares", "Zeus", "Apollo",
    "Hector", "Helios", "Icarus", "Castor", "Laius", "Midas", "Orfeu", "Pallas", "Zefir", "Horus",
    "Amon", "Hapi", "Aton", "Bachus", "Heracles", "Saturn", "Joey", "Spirit", "Ed", "Maximus",
    "Tornado", "Pegasus", "Mustang", "Angus", "Seabiscuit", "Asterix", "Bella", "Elsa", "Bond",
    "Romeo", "Majestic", "Eclipse", "Stardust", "Velvet", "Noble", "Aramis", "Caspian", "Sterling",
    "Silhouette", "Raven", "Obsidian", "Sapphire", "Aurora",
];

pub fn generate_horses(center: &GeoPoint, radius_km: f64, count: usize) -> Vec<Horse> {
    generate_horses_with(&mut rand::thread_rng(), center, radius_km, count)
}

/// Samples up to `count` id-less horses uniformly over the disk around `center`.
///
/// The radial coordinate is `sqrt(U)` scaled so density is uniform per unit
/// area. Samples that fall outside valid coordinates are dropped, not
/// retried, so the result can be shorter than `count`.
pub fn generate_horses_with<R>(
    rng: &mut R,
    center: &GeoPoint,
    radius_km: f64,
    count: usize,
) -> Vec<Horse>
where
    R: Rng + ?Sized,
{
    if !center.is_valid() || !radius_km.is_finite() || radius_km < 0.0 {
        return Vec::new();
    }

    let radius_degrees = radius_km / EARTH_RADIUS_KM * (180.0 / PI);

    (0..count)
        .filter_map(|_| {
            let distance = rng.gen_range(0.0..1.0_f64).sqrt() * radius_degrees;
            let angle = rng.gen_range(0.0..TAU);

            let location = GeoPoint {
                latitude: center.latitude + distance * angle.cos(),
                longitude: center.longitude + distance * angle.sin(),
            };
            if !location.is_valid() {
                return None;
            }

            let name = HORSE_NAMES.choose(&mut *rng).copied().unwrap_or("Spirit");
            Some(Horse {
                id: None,
                location,
                name: name.to_string(),
            })
        })
        .collect()
}
