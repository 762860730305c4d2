use serde::Deserialize;
use time::Date;

use crate::clock::iso_date;

#[derive(Debug, Deserialize)]
pub struct GrantCreditsRequest {
    pub count: u32,
}

/// Exactly one of `until` or `days` must be given.
#[derive(Debug, Deserialize)]
pub struct GrantUnlimitedRequest {
    #[serde(default, with = "iso_date::option")]
    pub until: Option<Date>,
    #[serde(default)]
    pub days: Option<u32>,
}
