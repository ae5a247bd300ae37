use serde::Deserialize;

use crate::error::{ForgeError, Result};

pub const MAX_PER_PAGE: u32 = 100;

/// `?page=2&per_page=20`, 1-indexed.
#[derive(Debug, Clone, Deserialize)]
pub struct PaginationQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
}

fn default_page() -> u32 {
    1
}

fn default_per_page() -> u32 {
    20
}

impl Default for PaginationQuery {
    fn default() -> Self {
        Self {
            page: default_page(),
            per_page: default_per_page(),
        }
    }
}

impl PaginationQuery {
    pub fn validate(&self) -> Result<()> {
        if self.page == 0 {
            return Err(ForgeError::bad_request("page must be >= 1"));
        }
        if self.per_page == 0 || self.per_page > MAX_PER_PAGE {
            return Err(ForgeError::bad_request(format!(
                "per_page must be between 1 and {}",
                MAX_PER_PAGE
            )));
        }
        Ok(())
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.per_page)
    }

    pub fn limit(&self) -> u64 {
        u64::from(self.per_page)
    }
}

/// `?limit=50` for endpoints that only return the newest rows.
#[derive(Debug, Clone, Deserialize)]
pub struct LimitQuery {
    #[serde(default = "default_per_page")]
    pub limit: u32,
}

impl LimitQuery {
    pub fn clamped(&self) -> u64 {
        u64::from(self.limit.clamp(1, MAX_PER_PAGE))
    }
}
