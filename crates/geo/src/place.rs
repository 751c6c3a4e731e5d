//! Place names, granularity levels and the normalization rules that map a
//! raw reverse-geocoding response onto a folder-ready name.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Specificity level of a resolved location name.
///
/// Serialized (and `Display`ed) in kebab-case so it round-trips through the
/// cache database and the transaction log unambiguously.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Granularity {
    Country,
    State,
    StateCity,
    StatePark,
    Unknown,
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Country => "country",
            Self::State => "state",
            Self::StateCity => "state-city",
            Self::StatePark => "state-park",
            Self::Unknown => "unknown",
        })
    }
}

impl FromStr for Granularity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "country" => Ok(Self::Country),
            "state" => Ok(Self::State),
            "state-city" => Ok(Self::StateCity),
            "state-park" => Ok(Self::StatePark),
            "unknown" => Ok(Self::Unknown),
            other => Err(format!("unrecognized granularity `{other}`")),
        }
    }
}

/// Address components as returned by a reverse-geocoding provider, before
/// any granularity rules are applied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawPlace {
    pub country: String,
    pub state: Option<String>,
    pub city: Option<String>,
    pub county: Option<String>,
}

/// A normalized place: the folder-ready name plus the components it was
/// derived from. Created once per quantization cell and cached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Place {
    /// Folder-ready representative name, already [`sanitize`]d.
    pub name: String,
    pub granularity: Granularity,
    pub country: String,
    pub state: Option<String>,
    pub city: Option<String>,
    pub park: Option<String>,
}

impl Place {
    /// The place used for coordinates that could not be resolved.
    pub fn unknown() -> Self {
        Self {
            name: "Unknown".to_string(),
            granularity: Granularity::Unknown,
            country: String::new(),
            state: None,
            city: None,
            park: None,
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.granularity == Granularity::Unknown
    }
}

/// Granularity rules for turning a [`RawPlace`] into a [`Place`].
///
/// The ladder, most specific first:
/// 1. US national park (matched against county or city) → `State-Park`
/// 2. US major city → `State-City`
/// 3. Any other US location → state name only
/// 4. Foreign country → country name only
#[derive(Debug, Clone)]
pub struct NamingPolicy {
    major_cities: Vec<String>,
    national_parks: Vec<String>,
}

impl NamingPolicy {
    pub fn new(
        major_cities: impl IntoIterator<Item = impl Into<String>>,
        national_parks: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            major_cities: major_cities.into_iter().map(Into::into).collect(),
            national_parks: national_parks.into_iter().map(Into::into).collect(),
        }
    }

    /// Apply the granularity ladder to a provider response.
    pub fn classify(&self, raw: &RawPlace) -> Place {
        let country = raw.country.trim();
        if country.is_empty() {
            return Place::unknown();
        }

        if !is_united_states(country) {
            return Place {
                name: sanitize(country),
                granularity: Granularity::Country,
                country: country.to_string(),
                state: raw.state.clone(),
                city: raw.city.clone(),
                park: None,
            };
        }

        let state = raw.state.as_deref().unwrap_or("").trim();
        let city = raw.city.as_deref().unwrap_or("").trim();
        let county = raw.county.as_deref().unwrap_or("").trim();

        if let Some(park) = self.matching_park(city, county) {
            return Place {
                name: hyphenate(state, &park),
                granularity: Granularity::StatePark,
                country: country.to_string(),
                state: raw.state.clone(),
                city: raw.city.clone(),
                park: Some(park),
            };
        }

        if !city.is_empty() && self.is_major_city(city) {
            return Place {
                name: hyphenate(state, city),
                granularity: Granularity::StateCity,
                country: country.to_string(),
                state: raw.state.clone(),
                city: raw.city.clone(),
                park: None,
            };
        }

        if state.is_empty() {
            return Place::unknown();
        }
        Place {
            name: sanitize(state),
            granularity: Granularity::State,
            country: country.to_string(),
            state: raw.state.clone(),
            city: raw.city.clone(),
            park: None,
        }
    }

    fn is_major_city(&self, city: &str) -> bool {
        let city = city.to_lowercase();
        self.major_cities.iter().any(|major| city.contains(&major.to_lowercase()))
    }

    /// Park membership is matched against both the county and the city
    /// component, since providers file park land under either.
    fn matching_park(&self, city: &str, county: &str) -> Option<String> {
        let city = city.to_lowercase();
        let county = county.to_lowercase();
        self.national_parks
            .iter()
            .find(|park| {
                let park = park.to_lowercase();
                (!county.is_empty() && county.contains(&park)) || (!city.is_empty() && city.contains(&park))
            })
            .cloned()
    }
}

impl Default for NamingPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAJOR_CITIES.iter().copied(), DEFAULT_NATIONAL_PARKS.iter().copied())
    }
}

fn is_united_states(country: &str) -> bool {
    country == "US" || country.contains("United States") || country.contains("USA")
}

fn hyphenate(state: &str, leaf: &str) -> String {
    if state.is_empty() {
        return sanitize(leaf);
    }
    format!("{}-{}", sanitize(state), sanitize(leaf))
}

/// Make a place name safe for use as a single path segment.
///
/// Spaces become underscores; everything that isn't alphanumeric, an
/// underscore or a hyphen is stripped. Deterministic: equal inputs always
/// sanitize identically.
///
/// ```
/// use snapsort_geo::sanitize;
///
/// assert_eq!(sanitize("San Francisco"), "San_Francisco");
/// assert_eq!(sanitize("Provence-Alpes-Côte d'Azur"), "Provence-Alpes-Côte_dAzur");
/// ```
pub fn sanitize(name: &str) -> String {
    name.trim()
        .replace(' ', "_")
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '-')
        .collect()
}

/// Default major-US-city list, overridable through configuration.
pub const DEFAULT_MAJOR_CITIES: &[&str] = &[
    "New York",
    "Los Angeles",
    "Chicago",
    "Houston",
    "Phoenix",
    "Philadelphia",
    "San Antonio",
    "San Diego",
    "Dallas",
    "San Francisco",
    "Seattle",
    "Boston",
    "Miami",
    "Atlanta",
    "Denver",
    "Las Vegas",
    "Portland",
    "Austin",
    "Nashville",
    "Washington",
];

/// Default US national-park list, overridable through configuration.
pub const DEFAULT_NATIONAL_PARKS: &[&str] = &[
    "Yosemite",
    "Yellowstone",
    "Grand Canyon",
    "Zion",
    "Rocky Mountain",
    "Acadia",
    "Grand Teton",
    "Olympic",
    "Glacier",
    "Bryce Canyon",
    "Arches",
    "Joshua Tree",
    "Great Smoky Mountains",
    "Shenandoah",
    "Canyonlands",
    "Mount Rainier",
    "Sequoia",
    "Kings Canyon",
    "Death Valley",
    "Badlands",
];

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn raw(country: &str, state: Option<&str>, city: Option<&str>, county: Option<&str>) -> RawPlace {
        RawPlace {
            country: country.to_string(),
            state: state.map(str::to_string),
            city: city.map(str::to_string),
            county: county.map(str::to_string),
        }
    }

    #[test]
    fn foreign_country_uses_country_name() {
        let place = NamingPolicy::default().classify(&raw("Norway", None, Some("Oslo"), None));
        assert_eq!(place.name, "Norway");
        assert_eq!(place.granularity, Granularity::Country);
    }

    #[rstest]
    #[case("United States")]
    #[case("United States of America")]
    #[case("USA")]
    #[case("US")]
    fn us_spelling_variants_are_domestic(#[case] country: &str) {
        let place = NamingPolicy::default().classify(&raw(country, Some("Montana"), None, None));
        assert_eq!(place.granularity, Granularity::State);
        assert_eq!(place.name, "Montana");
    }

    #[test]
    fn major_city_gets_state_city_name() {
        let place =
            NamingPolicy::default().classify(&raw("United States", Some("California"), Some("San Francisco"), None));
        assert_eq!(place.granularity, Granularity::StateCity);
        assert_eq!(place.name, "California-San_Francisco");
    }

    #[test]
    fn park_county_beats_major_city() {
        let place = NamingPolicy::default().classify(&raw(
            "United States",
            Some("Wyoming"),
            Some("Jackson"),
            Some("Yellowstone County"),
        ));
        assert_eq!(place.granularity, Granularity::StatePark);
        assert_eq!(place.name, "Wyoming-Yellowstone");
    }

    #[test]
    fn rural_us_is_state_only() {
        let place = NamingPolicy::default().classify(&raw("United States", Some("Montana"), Some("Ekalaka"), None));
        assert_eq!(place.granularity, Granularity::State);
        assert_eq!(place.name, "Montana");
    }

    #[test]
    fn empty_country_is_unknown() {
        assert!(NamingPolicy::default().classify(&RawPlace::default()).is_unknown());
    }

    #[test]
    fn granularity_round_trips_as_text() {
        for g in [
            Granularity::Country,
            Granularity::State,
            Granularity::StateCity,
            Granularity::StatePark,
            Granularity::Unknown,
        ] {
            assert_eq!(g.to_string().parse::<Granularity>().unwrap(), g);
        }
    }

    #[test]
    fn sanitize_is_idempotent() {
        let once = sanitize("Great Smoky Mountains (TN/NC)");
        assert_eq!(once, "Great_Smoky_Mountains_TNNC");
        assert_eq!(sanitize(&once), once);
    }
}
