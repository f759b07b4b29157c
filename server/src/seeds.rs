//! Weighted seed catalog and the seed service seam.

use crate::error::GameError;
use log::{info, warn};
use rand::Rng;
use shared::PlayerId;
use std::collections::HashMap;
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SeedCategory {
    /// Let the world provisioner pick any seed
    Random,
    RandomSeedGen,
    SetSeedGen,
    Village,
    Shipwreck,
    DesertTemple,
    RuinedPortal,
}

impl SeedCategory {
    pub const ALL: [SeedCategory; 7] = [
        SeedCategory::Random,
        SeedCategory::RandomSeedGen,
        SeedCategory::SetSeedGen,
        SeedCategory::Village,
        SeedCategory::Shipwreck,
        SeedCategory::DesertTemple,
        SeedCategory::RuinedPortal,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            SeedCategory::Random => "random",
            SeedCategory::RandomSeedGen => "random_seed_gen",
            SeedCategory::SetSeedGen => "set_seed_gen",
            SeedCategory::Village => "village",
            SeedCategory::Shipwreck => "shipwreck",
            SeedCategory::DesertTemple => "desert_temple",
            SeedCategory::RuinedPortal => "ruined_portal",
        }
    }

    /// Filter name used by the seed service endpoint.
    pub fn filter_name(&self) -> &'static str {
        match self {
            SeedCategory::Random => "random",
            SeedCategory::RandomSeedGen => "rsg",
            SeedCategory::SetSeedGen => "ssg",
            SeedCategory::Village => "village",
            SeedCategory::Shipwreck => "shipwreck",
            SeedCategory::DesertTemple => "temple",
            SeedCategory::RuinedPortal => "portal",
        }
    }

    fn file_name(&self) -> String {
        format!("{}.txt", self.name())
    }
}

impl fmt::Display for SeedCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SeedCategory {
    type Err = GameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.to_ascii_lowercase();
        SeedCategory::ALL
            .iter()
            .copied()
            .find(|c| c.name() == wanted || c.filter_name() == wanted)
            .ok_or_else(|| GameError::UnknownSeedCategory(s.to_string()))
    }
}

/// Outcome of a weighted pick. `seed` is `None` for the random category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedChoice {
    pub category: SeedCategory,
    pub seed: Option<i64>,
}

impl SeedChoice {
    pub fn random() -> Self {
        Self {
            category: SeedCategory::Random,
            seed: None,
        }
    }
}

#[derive(Debug, Clone)]
struct SeedPool {
    weight: u32,
    seeds: Vec<i64>,
}

/// Seeds grouped by category, picked by category weight.
///
/// A category takes part in the pick when its weight is positive and, unless
/// it is [`SeedCategory::Random`], it holds at least one seed.
#[derive(Debug, Clone)]
pub struct SeedCatalog {
    pools: HashMap<SeedCategory, SeedPool>,
    directory: Option<PathBuf>,
}

impl Default for SeedCatalog {
    fn default() -> Self {
        let mut catalog = Self {
            pools: HashMap::new(),
            directory: None,
        };
        catalog.set_weight(SeedCategory::Random, 1);
        catalog
    }
}

impl SeedCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads one seed file per category from `directory`, creating missing
    /// files. Unreadable files and malformed lines are skipped with a warning.
    pub fn load(directory: &Path, weights: &HashMap<SeedCategory, u32>) -> io::Result<Self> {
        fs::create_dir_all(directory)?;

        let mut catalog = Self {
            pools: HashMap::new(),
            directory: Some(directory.to_path_buf()),
        };

        for category in SeedCategory::ALL {
            let weight = weights.get(&category).copied().unwrap_or(1);
            catalog.set_weight(category, weight);
            if category == SeedCategory::Random {
                continue;
            }

            let path = directory.join(category.file_name());
            if !path.exists() {
                if let Err(e) = fs::File::create(&path) {
                    warn!("Failed to create seed file {}: {}", path.display(), e);
                    continue;
                }
            }

            match fs::read_to_string(&path) {
                Ok(text) => {
                    let seeds = parse_seed_lines(&text, &path);
                    catalog.pool_mut(category).seeds = seeds;
                }
                Err(e) => warn!("Failed to read seed file {}: {}", path.display(), e),
            }
        }

        info!(
            "Loaded seed catalog: {}",
            SeedCategory::ALL
                .iter()
                .filter(|c| **c != SeedCategory::Random)
                .map(|c| format!("{}={}", c, catalog.seeds(*c).len()))
                .collect::<Vec<_>>()
                .join(", ")
        );
        Ok(catalog)
    }

    fn pool_mut(&mut self, category: SeedCategory) -> &mut SeedPool {
        self.pools.entry(category).or_insert_with(|| SeedPool {
            weight: 0,
            seeds: Vec::new(),
        })
    }

    pub fn set_weight(&mut self, category: SeedCategory, weight: u32) {
        self.pool_mut(category).weight = weight;
    }

    pub fn seeds(&self, category: SeedCategory) -> &[i64] {
        self.pools
            .get(&category)
            .map(|pool| pool.seeds.as_slice())
            .unwrap_or(&[])
    }

    fn is_selectable(category: SeedCategory, pool: &SeedPool) -> bool {
        pool.weight > 0 && (category == SeedCategory::Random || !pool.seeds.is_empty())
    }

    pub fn total_weight(&self) -> u32 {
        self.pools
            .iter()
            .filter(|(category, pool)| Self::is_selectable(**category, pool))
            .map(|(_, pool)| pool.weight)
            .sum()
    }

    /// Weighted pick of a category, then a uniform pick of a seed within it.
    pub fn select_seed<R: Rng>(&self, rng: &mut R) -> SeedChoice {
        let total = self.total_weight();
        if total == 0 {
            return SeedChoice::random();
        }

        let mut roll = rng.gen_range(0..total);
        for category in SeedCategory::ALL {
            let Some(pool) = self.pools.get(&category) else {
                continue;
            };
            if !Self::is_selectable(category, pool) {
                continue;
            }
            if roll < pool.weight {
                if category == SeedCategory::Random {
                    return SeedChoice::random();
                }
                let seed = pool.seeds[rng.gen_range(0..pool.seeds.len())];
                info!("Picked seed category {}, seed {}", category, seed);
                return SeedChoice {
                    category,
                    seed: Some(seed),
                };
            }
            roll -= pool.weight;
        }

        SeedChoice::random()
    }

    /// Appends seeds to a category in memory and in its seed file. Returns
    /// how many seeds were added.
    pub fn extend(&mut self, category: SeedCategory, seeds: &[i64]) -> usize {
        if category == SeedCategory::Random || seeds.is_empty() {
            return 0;
        }

        if let Some(directory) = &self.directory {
            let path = directory.join(category.file_name());
            if let Err(e) = append_seeds(&path, seeds) {
                warn!("Failed to persist seeds to {}: {}", path.display(), e);
            }
        }

        self.pool_mut(category).seeds.extend_from_slice(seeds);
        info!("Added {} seeds to {}", seeds.len(), category);
        seeds.len()
    }
}

fn append_seeds(path: &Path, seeds: &[i64]) -> io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    for seed in seeds {
        writeln!(file, "{}", seed)?;
    }
    Ok(())
}

fn parse_seed_lines(text: &str, path: &Path) -> Vec<i64> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| match line.parse::<i64>() {
            Ok(seed) => Some(seed),
            Err(_) => {
                warn!("Invalid seed in {}: {}", path.display(), line);
                None
            }
        })
        .collect()
}

/// Validated request for more seeds of one category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedFetchRequest {
    pub requester: Option<PlayerId>,
    pub category: SeedCategory,
    pub count: u32,
}

impl SeedFetchRequest {
    pub fn new(
        requester: Option<PlayerId>,
        category: SeedCategory,
        count: u32,
        max: u32,
    ) -> Result<Self, GameError> {
        if category == SeedCategory::Random {
            return Err(GameError::RandomSeedCategory);
        }
        if count < 1 || count > max {
            return Err(GameError::InvalidSeedAmount { max });
        }
        Ok(Self {
            requester,
            category,
            count,
        })
    }
}

/// Seeds actually obtained for a request. May hold fewer than requested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedFetchOutcome {
    pub request: SeedFetchRequest,
    pub seeds: Vec<i64>,
}

pub trait SeedFetcher {
    /// Starts fetching seeds in the background. The result comes back through
    /// [`crate::game::Game::on_seeds_fetched`].
    fn fetch_seeds(&mut self, request: SeedFetchRequest);
}

/// Extracts the seed from a service response of the form `{"seed":"123",...}`.
pub fn parse_seed_response(body: &str) -> Option<i64> {
    const KEY: &str = "\"seed\":\"";
    let start = body.find(KEY)? + KEY.len();
    let end = body[start..].find('"')? + start;
    body[start..end].parse().ok()
}
