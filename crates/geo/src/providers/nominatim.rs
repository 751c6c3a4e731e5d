//! Reverse geocoding via OpenStreetMap's Nominatim service.

use crate::coord::Coordinate;
use crate::place::RawPlace;
use crate::provider::{GeocodeProvider, ProviderErrorKind, ProviderResult};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

const DEFAULT_ENDPOINT: &str = "https://nominatim.openstreetmap.org/reverse";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
// Nominatim's usage policy requires an identifying agent.
const USER_AGENT: &str = concat!("snapsort/", env!("CARGO_PKG_VERSION"));

/// Free OpenStreetMap reverse geocoder. No credentials, but a strict usage
/// policy (1 req/s), which is why it usually sits last in the fallback chain
/// with a conservative token bucket.
pub struct Nominatim {
    client: reqwest::Client,
    endpoint: String,
}

#[derive(Deserialize)]
struct Response {
    #[serde(default)]
    address: Address,
}

/// Nominatim scatters the "city" concept over several keys depending on the
/// locality type; same for state. Mirror them all and coalesce.
#[derive(Deserialize, Default)]
struct Address {
    country: Option<String>,
    state: Option<String>,
    province: Option<String>,
    region: Option<String>,
    city: Option<String>,
    town: Option<String>,
    village: Option<String>,
    municipality: Option<String>,
    county: Option<String>,
}

impl Nominatim {
    pub fn new() -> Self {
        Self::with_endpoint(DEFAULT_ENDPOINT)
    }

    /// Point at a self-hosted (or test) instance.
    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .user_agent(USER_AGENT)
                .build()
                .unwrap_or_default(),
            endpoint: endpoint.into(),
        }
    }
}

impl Default for Nominatim {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GeocodeProvider for Nominatim {
    fn name(&self) -> &str {
        "nominatim"
    }

    async fn reverse(&self, coordinate: Coordinate) -> ProviderResult<RawPlace> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("lat", coordinate.latitude().to_string()),
                ("lon", coordinate.longitude().to_string()),
                ("format", "jsonv2".to_string()),
                // Zoom 10 is city level; we never need street detail.
                ("zoom", "10".to_string()),
                ("accept-language", "en".to_string()),
            ])
            .send()
            .await
            .map_err(classify_transport)?;

        let status = response.status();
        if status.as_u16() == 429 {
            exn::bail!(ProviderErrorKind::Quota);
        }
        if status.is_server_error() {
            exn::bail!(ProviderErrorKind::Service(format!("nominatim returned {status}")));
        }
        if !status.is_success() {
            exn::bail!(ProviderErrorKind::Rejected(format!("nominatim returned {status}")));
        }

        let body: Response = response
            .json()
            .await
            .map_err(|e| exn::Exn::from(ProviderErrorKind::Rejected(format!("invalid response body: {e}"))))?;
        Ok(parse_address(body.address))
    }
}

pub(super) fn classify_transport(error: reqwest::Error) -> exn::Exn<ProviderErrorKind> {
    if error.is_timeout() {
        exn::Exn::from(ProviderErrorKind::Timeout)
    } else {
        exn::Exn::from(ProviderErrorKind::Service(error.to_string()))
    }
}

fn parse_address(address: Address) -> RawPlace {
    RawPlace {
        country: address.country.unwrap_or_default(),
        state: address.state.or(address.province).or(address.region),
        city: address.city.or(address.town).or(address.village).or(address.municipality),
        county: address.county,
    }
}
