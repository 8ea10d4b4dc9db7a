//! Station catalog loader
//!
//! Loads the static station catalog document (stations grouped by country
//! and by city) and exposes read-only lookup and filtering over it. The
//! catalog is immutable once loaded; every other component borrows stations
//! from here.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};
use url::Url;

use crate::errors::CatalogError;
use crate::models::Station;

/// Raw catalog entry as it appears in the JSON document. The location field
/// is called `state` in the source data.
#[derive(Debug, Clone, Deserialize)]
struct CatalogEntry {
    name: String,
    url: String,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    bitrate: Option<u32>,
    #[serde(default)]
    language: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CatalogDocument {
    #[serde(default)]
    stations_by_country: HashMap<String, Vec<CatalogEntry>>,
}

/// In-memory station catalog keyed by country.
#[derive(Debug, Clone, Default)]
pub struct StationCatalog {
    stations_by_country: HashMap<String, Vec<Station>>,
}

impl StationCatalog {
    /// Load the catalog from a JSON document.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let contents =
            std::fs::read_to_string(path).map_err(|e| CatalogError::Unreadable {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
        let catalog = Self::from_json(&contents)?;
        info!(
            "Loaded {} stations across {} countries from {}",
            catalog.station_count(),
            catalog.stations_by_country.len(),
            path.display()
        );
        Ok(catalog)
    }

    /// Parse a catalog from an in-memory JSON document.
    pub fn from_json(contents: &str) -> Result<Self, CatalogError> {
        let document: CatalogDocument = serde_json::from_str(contents)?;
        Ok(Self::from_document(document))
    }

    /// Load the catalog, falling back to an empty catalog on any failure.
    pub fn load_or_empty<P: AsRef<Path>>(path: P) -> Self {
        match Self::load(&path) {
            Ok(catalog) => catalog,
            Err(e) => {
                warn!("Falling back to empty station catalog: {}", e);
                Self::default()
            }
        }
    }

    fn from_document(document: CatalogDocument) -> Self {
        let mut stations_by_country: HashMap<String, Vec<Station>> = HashMap::new();

        for (country, entries) in document.stations_by_country {
            let mut stations = Vec::with_capacity(entries.len());
            for entry in entries {
                if Url::parse(&entry.url).is_err() {
                    warn!(
                        "Skipping station '{}' with unparseable URL: {}",
                        entry.name, entry.url
                    );
                    continue;
                }
                stations.push(Station {
                    name: entry.name,
                    url: entry.url,
                    country: country.clone(),
                    city: entry
                        .state
                        .filter(|s| !s.trim().is_empty())
                        .unwrap_or_else(|| "Unknown".to_string()),
                    bitrate: entry.bitrate,
                    language: entry.language,
                });
            }
            if !stations.is_empty() {
                stations_by_country.insert(country, stations);
            }
        }

        Self {
            stations_by_country,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.stations_by_country.is_empty()
    }

    pub fn station_count(&self) -> usize {
        self.stations_by_country.values().map(Vec::len).sum()
    }

    /// Countries with at least one station, sorted.
    pub fn countries(&self) -> Vec<String> {
        let mut countries: Vec<String> = self.stations_by_country.keys().cloned().collect();
        countries.sort();
        countries
    }

    /// Distinct cities within one country, sorted.
    pub fn cities_in(&self, country: &str) -> Vec<String> {
        let mut cities: Vec<String> = self
            .stations_by_country
            .get(country)
            .map(|stations| stations.iter().map(|s| s.city.clone()).collect())
            .unwrap_or_default();
        cities.sort();
        cities.dedup();
        cities
    }

    /// Stations within a country, optionally narrowed to one city.
    pub fn stations_in(&self, country: &str, city: Option<&str>) -> Vec<Station> {
        self.stations_by_country
            .get(country)
            .map(|stations| {
                stations
                    .iter()
                    .filter(|s| city.map_or(true, |c| s.city == c))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Look up one station by location and name.
    pub fn find_station(
        &self,
        country: &str,
        city: Option<&str>,
        name: &str,
    ) -> Result<Station, CatalogError> {
        self.stations_in(country, city)
            .into_iter()
            .find(|s| s.name == name)
            .ok_or_else(|| {
                let location = match city {
                    Some(c) => format!("{}/{}", country, c),
                    None => country.to_string(),
                };
                CatalogError::station_not_found(name, location)
            })
    }

    /// Stations grouped by country, for components that walk the whole map.
    pub fn by_country(&self) -> &HashMap<String, Vec<Station>> {
        &self.stations_by_country
    }

    /// Every catalogued station, country order unspecified.
    pub fn all_stations(&self) -> Vec<Station> {
        self.stations_by_country
            .values()
            .flat_map(|stations| stations.iter().cloned())
            .collect()
    }

    /// Expand a bulk filter: one country or the whole catalog, with an
    /// optional cap on the number of stations.
    pub fn filter_stations(
        &self,
        country_filter: Option<&str>,
        max_stations: Option<usize>,
    ) -> Vec<Station> {
        let mut stations = match country_filter {
            Some(country) => self
                .stations_by_country
                .get(country)
                .cloned()
                .unwrap_or_default(),
            None => {
                // Keep country order deterministic for stable bulk batches
                let mut all = Vec::new();
                for country in self.countries() {
                    all.extend(self.stations_by_country[&country].iter().cloned());
                }
                all
            }
        };

        if let Some(max) = max_stations {
            stations.truncate(max);
        }
        stations
    }
}
