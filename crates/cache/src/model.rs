//! Row mapping between SQLite and [`CacheValue`].

use crate::error::{Error, ErrorKind};
use exn::{OptionExt, ResultExt};
use snapsort_geo::{CacheValue, Granularity, Place, QuantizedKey};
use time::UtcDateTime;

pub(crate) const STATUS_RESOLVED: &str = "resolved";
pub(crate) const STATUS_FAILED: &str = "failed";

#[derive(sqlx::FromRow)]
pub(crate) struct EntryRow {
    status: String,
    name: Option<String>,
    granularity: Option<String>,
    country: Option<String>,
    state: Option<String>,
    city: Option<String>,
    park: Option<String>,
    retry_after: Option<i64>,
}

impl TryFrom<EntryRow> for CacheValue {
    type Error = Error;

    fn try_from(row: EntryRow) -> Result<Self, Self::Error> {
        match row.status.as_str() {
            STATUS_RESOLVED => Ok(CacheValue::Resolved(Place {
                name: row.name.ok_or_raise(|| ErrorKind::InvalidData("name"))?,
                granularity: row
                    .granularity
                    .ok_or_raise(|| ErrorKind::InvalidData("granularity"))?
                    .parse::<Granularity>()
                    .map_err(|_| exn::Exn::from(ErrorKind::InvalidData("granularity")))?,
                country: row.country.unwrap_or_default(),
                state: row.state,
                city: row.city,
                park: row.park,
            })),
            STATUS_FAILED => {
                let ts = row.retry_after.ok_or_raise(|| ErrorKind::InvalidData("retry_after"))?;
                Ok(CacheValue::Failed {
                    retry_after: UtcDateTime::from_unix_timestamp(ts)
                        .or_raise(|| ErrorKind::InvalidData("retry_after"))?,
                })
            },
            _ => Err(exn::Exn::from(ErrorKind::InvalidData("status"))),
        }
    }
}

/// Bind-ready decomposition of a key+value pair.
pub(crate) struct EntryBinds {
    pub lat_q: i64,
    pub lon_q: i64,
    pub precision: i64,
    pub status: &'static str,
    pub name: Option<String>,
    pub granularity: Option<String>,
    pub country: Option<String>,
    pub state: Option<String>,
    pub city: Option<String>,
    pub park: Option<String>,
    pub retry_after: Option<i64>,
}

impl EntryBinds {
    pub fn new(key: QuantizedKey, value: CacheValue) -> Self {
        let (lat_q, lon_q, precision) = (i64::from(key.lat_q), i64::from(key.lon_q), i64::from(key.precision));
        match value {
            CacheValue::Resolved(place) => Self {
                lat_q,
                lon_q,
                precision,
                status: STATUS_RESOLVED,
                name: Some(place.name),
                granularity: Some(place.granularity.to_string()),
                country: Some(place.country),
                state: place.state,
                city: place.city,
                park: place.park,
                retry_after: None,
            },
            CacheValue::Failed { retry_after } => Self {
                lat_q,
                lon_q,
                precision,
                status: STATUS_FAILED,
                name: None,
                granularity: None,
                country: None,
                state: None,
                city: None,
                park: None,
                retry_after: Some(retry_after.unix_timestamp()),
            },
        }
    }
}
