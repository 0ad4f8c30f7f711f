//! Discovery pipeline and read-only views over the collection.
//!
//! [`BadgeService::discover_animal`] guarantees at most one badge per animal
//! name: identify, look the name up, generate only when it is new, then
//! persist. Runs are serialized, so two concurrent discoveries of the same
//! species cannot both pass the lookup.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::badge_model::{normalize_name, BadgeRecord, StorageStats};
use crate::badge_store::BadgeStore;
use crate::collaborators::{AnimalIdentifier, BadgeGenerator, Photo};
use crate::error::{DiscoveryError, RemoteError, StoreResult};
use crate::retry::RetryPolicy;

/// Size of the placeholder image used by [`BadgeService::simulate_discovery`].
const SIMULATED_IMAGE_LEN: usize = 1024;

/// Terminal outcome of one discovery run.
#[derive(Debug)]
pub enum DiscoveryResult {
    /// A new badge was created.
    Success { badge: BadgeRecord },
    /// The species is already in the collection. Nothing was generated.
    AlreadyExists {
        animal_name: String,
        existing_badge: BadgeRecord,
    },
    Failure { error: DiscoveryError },
}

impl DiscoveryResult {
    pub fn is_success(&self) -> bool {
        matches!(self, DiscoveryResult::Success { .. })
    }

    pub fn badge(&self) -> Option<&BadgeRecord> {
        match self {
            DiscoveryResult::Success { badge } => Some(badge),
            DiscoveryResult::AlreadyExists { existing_badge, .. } => Some(existing_badge),
            DiscoveryResult::Failure { .. } => None,
        }
    }
}

impl From<DiscoveryError> for DiscoveryResult {
    fn from(error: DiscoveryError) -> Self {
        DiscoveryResult::Failure { error }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionStats {
    pub total_badges: usize,
    pub unique_species: usize,
    pub last_discovery: Option<DateTime<Utc>>,
    /// Over the trailing window, rounded to two decimals.
    pub average_discoveries_per_day: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortBy {
    #[default]
    Date,
    Name,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

/// Gallery query. Without an explicit order, dates sort newest first and
/// names sort A to Z.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BadgeFilter {
    pub search: Option<String>,
    pub sort_by: SortBy,
    pub sort_order: Option<SortOrder>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionExport {
    pub badges: Vec<BadgeRecord>,
    pub stats: CollectionStats,
    pub export_date: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub is_healthy: bool,
    pub message: String,
    pub stats: Option<StorageStats>,
}

pub struct BadgeService {
    store: Arc<BadgeStore>,
    identifier: Arc<dyn AnimalIdentifier>,
    generator: Arc<dyn BadgeGenerator>,
    identify_policy: RetryPolicy,
    generate_policy: RetryPolicy,
    recent_window_days: u32,
    discovery_lock: Mutex<()>,
}

impl BadgeService {
    /// Retry policies and the statistics window come from the store's
    /// configuration.
    pub fn new(
        store: Arc<BadgeStore>,
        identifier: Arc<dyn AnimalIdentifier>,
        generator: Arc<dyn BadgeGenerator>,
    ) -> Self {
        let config = store.config();
        let identify_policy = config.identify.clone();
        let generate_policy = config.generate.clone();
        let recent_window_days = config.recent_window_days;
        Self {
            store,
            identifier,
            generator,
            identify_policy,
            generate_policy,
            recent_window_days,
            discovery_lock: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &Arc<BadgeStore> {
        &self.store
    }

    pub async fn discover_animal(&self, photo: Photo) -> DiscoveryResult {
        let _running = self.discovery_lock.lock().await;

        let identification = match self
            .identify_policy
            .run("identify", || self.identifier.identify(&photo))
            .await
            .and_then(|found| found.validated())
        {
            Ok(found) => found,
            Err(e) => return DiscoveryError::Identification(e).into(),
        };
        info!("Identified animal: {}", identification.name);

        let name = identification.name.clone();
        let existing = match self
            .on_store(move |store| store.get_badge_by_animal_name(&name))
            .await
        {
            Ok(existing) => existing,
            Err(e) => return e.into(),
        };
        if let Some(existing_badge) = existing {
            info!(
                "{} already discovered as badge {}; skipping generation",
                identification.name, existing_badge.id
            );
            return DiscoveryResult::AlreadyExists {
                animal_name: identification.name,
                existing_badge,
            };
        }

        let generated = match self
            .generate_policy
            .run("generate", || self.generator.generate(&identification.name))
            .await
        {
            Ok(generated) if generated.image.is_empty() => {
                return DiscoveryError::Generation(RemoteError::malformed(
                    "badge generation returned an empty image",
                ))
                .into()
            }
            Ok(generated) => generated,
            Err(e) => return DiscoveryError::Generation(e).into(),
        };

        let original = photo.as_original();
        let saved = self
            .on_store(move |store| {
                store.save_badge(
                    &identification.name,
                    &identification.description,
                    &generated.image,
                    Some(&original),
                    generated.extra,
                )
            })
            .await;

        match saved {
            Ok(Ok(badge)) => {
                info!("Discovery complete: badge {} for {}", badge.id, badge.animal_name);
                DiscoveryResult::Success { badge }
            }
            Ok(Err(e)) => {
                warn!("Discovery could not persist the badge: {e}");
                DiscoveryError::Persistence(e).into()
            }
            Err(e) => e.into(),
        }
    }

    /// Saves a badge with a placeholder image without calling either remote
    /// service. Still one badge per name.
    pub async fn simulate_discovery(&self, animal_name: &str, description: &str) -> DiscoveryResult {
        let _running = self.discovery_lock.lock().await;
        let name = animal_name.to_string();
        let description = description.to_string();

        let outcome = self
            .on_store(move |store| -> StoreResult<Result<BadgeRecord, BadgeRecord>> {
                if let Some(existing_badge) = store.get_badge_by_animal_name(&name) {
                    return Ok(Err(existing_badge));
                }
                let placeholder = vec![0u8; SIMULATED_IMAGE_LEN];
                store
                    .save_badge(&name, &description, &placeholder, None, None)
                    .map(Ok)
            })
            .await;

        match outcome {
            Ok(Ok(Ok(badge))) => DiscoveryResult::Success { badge },
            Ok(Ok(Err(existing_badge))) => DiscoveryResult::AlreadyExists {
                animal_name: animal_name.to_string(),
                existing_badge,
            },
            Ok(Err(e)) => DiscoveryError::Persistence(e).into(),
            Err(e) => e.into(),
        }
    }

    async fn on_store<T, F>(&self, task: F) -> Result<T, DiscoveryError>
    where
        F: FnOnce(&BadgeStore) -> T + Send + 'static,
        T: Send + 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || task(&store))
            .await
            .map_err(|e| DiscoveryError::Interrupted(e.to_string()))
    }

    pub fn collection_stats(&self) -> CollectionStats {
        self.collection_stats_at(Utc::now())
    }

    pub fn collection_stats_at(&self, now: DateTime<Utc>) -> CollectionStats {
        compute_stats(&self.store.get_all_badges(), now, self.recent_window_days)
    }

    pub fn filtered_badges(&self, filter: &BadgeFilter) -> Vec<BadgeRecord> {
        apply_filter(self.store.get_all_badges(), filter)
    }

    pub fn export_collection(&self) -> CollectionExport {
        let now = Utc::now();
        let badges = self.store.get_all_badges();
        let stats = compute_stats(&badges, now, self.recent_window_days);
        info!("Exporting collection of {} badge(s)", badges.len());
        CollectionExport {
            badges,
            stats,
            export_date: now,
        }
    }

    /// Integrity round trip, then repair. Healthy only if neither found a
    /// problem.
    pub fn check_store_health(&self) -> HealthReport {
        if !self.store.test_integrity() {
            return HealthReport {
                is_healthy: false,
                message: "Storage failed the write/read check".to_string(),
                stats: None,
            };
        }

        let repair = self.store.repair();
        if repair.repaired {
            return HealthReport {
                is_healthy: false,
                message: repair.message,
                stats: None,
            };
        }

        HealthReport {
            is_healthy: true,
            message: "Storage is working correctly".to_string(),
            stats: Some(self.store.get_storage_stats()),
        }
    }
}

pub fn compute_stats(badges: &[BadgeRecord], now: DateTime<Utc>, window_days: u32) -> CollectionStats {
    let unique_species = badges
        .iter()
        .map(|badge| normalize_name(&badge.animal_name))
        .collect::<HashSet<_>>()
        .len();
    let last_discovery = badges.iter().map(|badge| badge.discovered_at).max();

    let window_days = window_days.max(1);
    let cutoff = now - Duration::days(i64::from(window_days));
    let recent = badges
        .iter()
        .filter(|badge| badge.discovered_at > cutoff)
        .count();
    let average = recent as f64 / f64::from(window_days);

    CollectionStats {
        total_badges: badges.len(),
        unique_species,
        last_discovery,
        average_discoveries_per_day: (average * 100.0).round() / 100.0,
    }
}

pub fn apply_filter(mut badges: Vec<BadgeRecord>, filter: &BadgeFilter) -> Vec<BadgeRecord> {
    if let Some(term) = filter
        .search
        .as_deref()
        .map(str::trim)
        .filter(|term| !term.is_empty())
    {
        let term = term.to_lowercase();
        badges.retain(|badge| {
            badge.animal_name.to_lowercase().contains(&term)
                || badge.description.to_lowercase().contains(&term)
        });
    }

    match filter.sort_by {
        SortBy::Name => {
            let descending = filter.sort_order == Some(SortOrder::Desc);
            badges.sort_by(|a, b| {
                let ordering = a.animal_name.to_lowercase().cmp(&b.animal_name.to_lowercase());
                if descending {
                    ordering.reverse()
                } else {
                    ordering
                }
            });
        }
        SortBy::Date => {
            let ascending = filter.sort_order == Some(SortOrder::Asc);
            badges.sort_by(|a, b| {
                let ordering: Ordering = a.discovered_at.cmp(&b.discovered_at);
                if ascending {
                    ordering
                } else {
                    ordering.reverse()
                }
            });
        }
    }

    if let Some(limit) = filter.limit {
        badges.truncate(limit);
    }
    badges
}
