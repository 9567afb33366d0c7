/*!
 * Allocator Configuration
 *
 * Page geometry and strategy knobs. Loaded from defaults, a JSON document,
 * or `KMA_*` environment overrides, and validated before any allocator is built.
 */

use super::bits::{align_up, is_pow2};
use super::errors::{KmaError, KmaResult};
use super::limits::{
    BUDDY_HEADER_PREFIX, DEFAULT_MIN_BLOCK_SIZE, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE,
    MIN_BLOCKS_PER_PAGE,
};
use super::types::{Size, WORD};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Allocator configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KmaConfig {
    /// Size of every provider page in bytes
    pub page_size: Size,
    /// Smallest block: buddy leaf size and first free-list class
    pub min_block_size: Size,
    /// Merge address-adjacent free blocks on release (resource map only)
    pub coalesce_free_blocks: bool,
    /// Maximum pages the simulated provider hands out
    pub page_limit: Option<usize>,
}

impl Default for KmaConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            min_block_size: DEFAULT_MIN_BLOCK_SIZE,
            coalesce_free_blocks: false,
            page_limit: None,
        }
    }
}

impl KmaConfig {
    pub fn with_page_size(mut self, page_size: Size) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_min_block_size(mut self, min_block_size: Size) -> Self {
        self.min_block_size = min_block_size;
        self
    }

    pub fn with_coalescing(mut self, enabled: bool) -> Self {
        self.coalesce_free_blocks = enabled;
        self
    }

    pub fn with_page_limit(mut self, limit: usize) -> Self {
        self.page_limit = Some(limit);
        self
    }

    /// Parse a JSON document; missing fields take their defaults
    pub fn from_json(json: &str) -> KmaResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| KmaError::InvalidConfig(format!("malformed JSON: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> KmaResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            KmaError::InvalidConfig(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&json)
    }

    /// Apply `KMA_PAGE_SIZE`, `KMA_MIN_BLOCK_SIZE`, `KMA_COALESCE` and `KMA_PAGE_LIMIT`
    pub fn with_env_overrides(self) -> KmaResult<Self> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> KmaResult<Self> {
        if let Some(value) = lookup("KMA_PAGE_SIZE") {
            self.page_size = parse_env("KMA_PAGE_SIZE", &value)?;
        }
        if let Some(value) = lookup("KMA_MIN_BLOCK_SIZE") {
            self.min_block_size = parse_env("KMA_MIN_BLOCK_SIZE", &value)?;
        }
        if let Some(value) = lookup("KMA_COALESCE") {
            self.coalesce_free_blocks = value == "1" || value.eq_ignore_ascii_case("true");
        }
        if let Some(value) = lookup("KMA_PAGE_LIMIT") {
            self.page_limit = Some(parse_env("KMA_PAGE_LIMIT", &value)?);
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> KmaResult<()> {
        if !is_pow2(self.page_size) || !is_pow2(self.min_block_size) {
            return Err(KmaError::InvalidConfig(format!(
                "page size {} and min block size {} must be powers of two",
                self.page_size, self.min_block_size
            )));
        }
        if self.min_block_size < 2 * WORD {
            return Err(KmaError::InvalidConfig(format!(
                "min block size {} is below {} bytes",
                self.min_block_size,
                2 * WORD
            )));
        }
        if self.page_size > MAX_PAGE_SIZE
            || self.page_size < MIN_BLOCKS_PER_PAGE * self.min_block_size
        {
            return Err(KmaError::InvalidConfig(format!(
                "page size {} must be within [{}, {}]",
                self.page_size,
                MIN_BLOCKS_PER_PAGE * self.min_block_size,
                MAX_PAGE_SIZE
            )));
        }
        if self.buddy_header_size() >= self.page_size {
            return Err(KmaError::InvalidConfig(format!(
                "buddy header of {} bytes does not fit a {} byte page",
                self.buddy_header_size(),
                self.page_size
            )));
        }
        if self.page_limit == Some(0) {
            return Err(KmaError::InvalidConfig("page limit must be positive".into()));
        }
        Ok(())
    }

    /// Leaves of the buddy tree
    pub fn buddy_leaves(&self) -> usize {
        self.page_size / self.min_block_size
    }

    /// In-page bytes of a buddy header: prefix plus `2N - 1` 16-bit counters
    pub fn buddy_header_size(&self) -> Size {
        let counters = 2 * self.buddy_leaves() - 1;
        align_up(BUDDY_HEADER_PREFIX + counters * 2, WORD)
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> KmaResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| KmaError::InvalidConfig(format!("{}={} is not a number", key, value)))
}
