//! Reverse geocoding via the LocationIQ API.

use super::nominatim::classify_transport;
use crate::coord::Coordinate;
use crate::place::RawPlace;
use crate::provider::{GeocodeProvider, ProviderErrorKind, ProviderResult};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

const DEFAULT_ENDPOINT: &str = "https://us1.locationiq.com/v1/reverse.php";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Commercial geocoder with a generous free tier. Requires an API key, so it
/// is only added to the chain when one is configured — but when present it
/// takes priority over Nominatim.
pub struct LocationIq {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

#[derive(Deserialize)]
struct Response {
    #[serde(default)]
    address: Address,
}

#[derive(Deserialize, Default)]
struct Address {
    country: Option<String>,
    state: Option<String>,
    city: Option<String>,
    town: Option<String>,
    village: Option<String>,
    county: Option<String>,
}

impl LocationIq {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_endpoint(DEFAULT_ENDPOINT, api_key)
    }

    pub fn with_endpoint(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build().unwrap_or_default(),
            endpoint: endpoint.into(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl GeocodeProvider for LocationIq {
    fn name(&self) -> &str {
        "locationiq"
    }

    async fn reverse(&self, coordinate: Coordinate) -> ProviderResult<RawPlace> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("key", self.api_key.as_str()),
                ("lat", &coordinate.latitude().to_string()),
                ("lon", &coordinate.longitude().to_string()),
                ("format", "json"),
                ("zoom", "10"),
                ("accept-language", "en"),
            ])
            .send()
            .await
            .map_err(classify_transport)?;

        let status = response.status();
        match status.as_u16() {
            // Daily quota exhausted; permanent for this run.
            429 => exn::bail!(ProviderErrorKind::Quota),
            // Invalid key: no point hitting this provider again either.
            401 | 403 => exn::bail!(ProviderErrorKind::Rejected(format!("locationiq returned {status}"))),
            _ if status.is_server_error() => {
                exn::bail!(ProviderErrorKind::Service(format!("locationiq returned {status}")))
            },
            _ if !status.is_success() => {
                exn::bail!(ProviderErrorKind::Rejected(format!("locationiq returned {status}")))
            },
            _ => {},
        }

        let body: Response = response
            .json()
            .await
            .map_err(|e| exn::Exn::from(ProviderErrorKind::Rejected(format!("invalid response body: {e}"))))?;
        Ok(RawPlace {
            country: body.address.country.unwrap_or_default(),
            state: body.address.state,
            city: body.address.city.or(body.address.town).or(body.address.village),
            county: body.address.county,
        })
    }
}
