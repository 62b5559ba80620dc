//! Configuration value types.
//!
//! Plain structs with `Default` impls, constructed by the caller and
//! handed to `Cache::create` / the array `create` entry points. None of
//! them reach into the byte store or class registry.

use serde::{Deserialize, Serialize};

/// Configuration for a `Cache` instance (spec §4.1.1, §3.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Soft byte budget for `index_size` (spec §3.1, I5).
    pub max_cache_size: usize,
    /// Target for how many clean bytes MSIC tries to keep available
    /// (spec §4.1.3).
    pub min_clean_size: usize,
    /// Number of rings; ring 0 is outermost (spec §4.1.4).
    pub ring_count: usize,
    /// Number of buckets in the address hash table (spec §4.1.2). Should
    /// be a power of two comparable to the expected live-entry count.
    pub hash_buckets: usize,
    /// Whether the cache starts with eviction enabled.
    pub evictions_enabled: bool,
    /// Enable SWMR-write semantics (spec §4.1.8).
    pub swmr_write: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_cache_size: 4 * 1024 * 1024,
            min_clean_size: 1024 * 1024,
            ring_count: 5,
            hash_buckets: 1 << 12,
            evictions_enabled: true,
            swmr_write: false,
        }
    }
}

/// Increase-mode knobs for the auto-resize controller (spec §4.1.7).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum IncreaseMode {
    Off,
    Threshold { increment: f64 },
}

/// Decrease-mode knobs for the auto-resize controller (spec §4.1.7).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum DecreaseMode {
    Off,
    Threshold { decrement: f64 },
    AgeOut { age_out_accesses: u64 },
    AgeOutWithThreshold { age_out_accesses: u64 },
}

/// Flash-increase knobs: react to a sudden large insert between samples
/// (spec §4.1.7).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum FlashIncreaseMode {
    Off,
    /// Increase immediately if a single insert consumes more than
    /// `flash_threshold` of the current `max_size`.
    AddSpace,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AutoResizeConfig {
    pub lower_hr: f64,
    pub upper_hr: f64,
    pub increase_mode: IncreaseMode,
    pub decrease_mode: DecreaseMode,
    pub min_size: usize,
    pub max_size: usize,
    pub flash_incr_mode: FlashIncreaseMode,
    pub flash_threshold: f64,
    /// Sample the hit rate every this many accesses.
    pub epoch_length: u64,
}

impl Default for AutoResizeConfig {
    fn default() -> Self {
        Self {
            lower_hr: 0.9,
            upper_hr: 0.999,
            increase_mode: IncreaseMode::Threshold { increment: 1.2 },
            decrease_mode: DecreaseMode::AgeOutWithThreshold { age_out_accesses: 20_000 },
            min_size: 1 << 20,
            max_size: 1 << 30,
            flash_incr_mode: FlashIncreaseMode::AddSpace,
            flash_threshold: 0.25,
            epoch_length: 50_000,
        }
    }
}

/// Creation parameters for an extensible array (spec §3.1 "EA header").
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EaCreateParams {
    /// Size in bytes of a single element.
    pub element_size: u32,
    /// log2 of the maximum index the array may ever reach.
    pub max_nelmts_bits: u8,
    /// Number of elements stored inline in the index block.
    pub idx_blk_elmts: u32,
    /// Threshold: minimum aggregate data-block pointer count before a
    /// super block stops being addressed directly from the index block.
    pub sup_blk_min_data_ptrs: u32,
    /// Elements in the smallest data block (`sblk_info[0].dblk_nelmts`).
    pub data_blk_min_elmts: u32,
    /// log2 of the number of elements per data-block page; 0 disables
    /// paging.
    pub max_dblk_page_bits: u8,
}

impl EaCreateParams {
    pub fn validate(&self) -> crate::Result<()> {
        if self.element_size == 0 {
            return Err(crate::Error::corrupt("element_size", "must be nonzero"));
        }
        if self.data_blk_min_elmts == 0 {
            return Err(crate::Error::corrupt("data_blk_min_elmts", "must be nonzero"));
        }
        if self.idx_blk_elmts == 0 {
            return Err(crate::Error::corrupt("idx_blk_elmts", "must be nonzero"));
        }
        Ok(())
    }
}

/// Creation parameters for a fixed array (spec §3.1 "FA header").
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FaCreateParams {
    pub element_size: u32,
    pub max_dblk_page_bits: u8,
    pub nelmts: u64,
}

impl FaCreateParams {
    pub fn validate(&self) -> crate::Result<()> {
        if self.element_size == 0 {
            return Err(crate::Error::corrupt("element_size", "must be nonzero"));
        }
        Ok(())
    }

    /// Whether the data block is paged (spec §4.3).
    pub fn is_paged(&self) -> bool {
        self.max_dblk_page_bits > 0 && self.nelmts > (1u64 << self.max_dblk_page_bits)
    }
}
