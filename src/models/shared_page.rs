use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error_page::ErrorPageParams;

/// A persisted, uniquely named snapshot of error page parameters.
///
/// Records are written once and never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SharedPage {
    pub name: String,
    pub params: ErrorPageParams,
    pub created_at: DateTime<Utc>,
}

impl SharedPage {
    pub fn new(name: String, params: ErrorPageParams) -> Self {
        Self {
            name,
            params,
            created_at: Utc::now(),
        }
    }
}
