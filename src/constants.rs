//! Centralized magic numbers for the sniping core.
//!
//! Values mirror the defaults enumerated in the configuration effect table;
//! components read these as fallbacks when a config struct field is unset.

use std::time::Duration;

// ============================================================================
// SOLANA BLOCKCHAIN CONSTANTS
// ============================================================================

/// 1 SOL = 1 billion lamports
pub const SOL_DECIMALS: u64 = 1_000_000_000;

pub const fn lamports_to_sol(lamports: u64) -> f64 {
    lamports as f64 / SOL_DECIMALS as f64
}

pub const fn sol_to_lamports(sol: f64) -> u64 {
    (sol * SOL_DECIMALS as f64) as u64
}

pub const SOLANA_SLOT_TIME_MS: u64 = 400;
pub const DEFAULT_TX_TIMEOUT_SECONDS: u64 = 30;

// ============================================================================
// DEX PROGRAM IDS (pool-init parsers, C2)
// ============================================================================

pub const RAYDIUM_AMM_V4_PROGRAM_ID: &str = "675kPX9MHTjS2zt1qfr1NYHuzeLXfQM9H24wFSUt1Mp8";
pub const RAYDIUM_CLMM_PROGRAM_ID: &str = "CAMMCzo5YL8w4VFF8KVHrK22GGUsp5VTaW7grrKgrWqK";
pub const ORCA_WHIRLPOOLS_PROGRAM_ID: &str = "whirLbMiicVdio4qvUfM5KAg6Ct8VwpYzGff3uctyCc";
pub const METEORA_DLMM_PROGRAM_ID: &str = "LBUZKhRxPF3XUpBCjp4YzTKgLccjZhTSDM9YuVaPwxo";
pub const METEORA_DAMM_V2_PROGRAM_ID: &str = "cpamdpZCGKUy5JxQXB4dcpGPiikHawvSWAd6mEn1sGG";

/// Canonical PumpFun program id. The reference bot carried two conflicting
/// constants across files; this is the one used by its live detection path.
pub const PUMPFUN_PROGRAM_ID: &str = "6EF8rrecthR5Dkzon8Nwu78hRvfCKubJ14M5uBEwF6P";
pub const PUMPSWAP_PROGRAM_ID: &str = "GMk6j2defJhS7F194toqmJNFNhAkbDXhYJo5oR3Rpump";

pub const SOL_MINT: &str = "So11111111111111111111111111111111111111112";
pub const USDC_MINT: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";
pub const USDT_MINT: &str = "Es9vMFrzaCERmJfrF4H2FYD4KCoNkY11McCe8BenwNYB";

// ============================================================================
// SOURCE MANAGER DEFAULTS
// ============================================================================

/// Reputation per source, used in the priority-score formula.
pub const REPUTATION_RAYDIUM_V4: f64 = 95.0;
pub const REPUTATION_RAYDIUM_CLMM: f64 = 90.0;
pub const REPUTATION_ORCA_WHIRLPOOL: f64 = 85.0;
pub const REPUTATION_METEORA: f64 = 80.0;
pub const REPUTATION_PUMP_FUN: f64 = 60.0;
pub const REPUTATION_PUMPSWAP: f64 = 60.0;

pub const FIRST_BONUS_FIRST: f64 = 30.0;
pub const FIRST_BONUS_DUPLICATE: f64 = 15.0;
pub const TIMING_SCORE_FIRST: f64 = 30.0;
pub const TIMING_SCORE_DUPLICATE: f64 = 20.0;
pub const REPUTATION_WEIGHT: f64 = 0.4;

pub const DEFAULT_DUPLICATE_WINDOW_MS: u64 = 5_000;
pub const DUPLICATE_WINDOW_CLEANUP_INTERVAL_MS: u64 = 1_000;

// ============================================================================
// STREAM SOURCE DEFAULTS
// ============================================================================

pub const STREAM_RECONNECT_BASE_DELAY_MS: u64 = 5_000;
pub const STREAM_RECONNECT_MAX_DELAY_MS: u64 = 60_000;
pub const STREAM_RECONNECT_MAX_ATTEMPTS: u32 = 5;
pub const STREAM_LATENCY_SAMPLE_CAPACITY: usize = 100;

// ============================================================================
// EVENT BUS DEFAULTS
// ============================================================================

pub const EVENT_BUS_IDEMPOTENCY_WINDOW_MS: u64 = 1_000;
pub const POOL_DETECTION_RAW_CHANNEL: &str = "pool:detection:raw";
pub const POOL_DETECTION_SCORED_CHANNEL: &str = "pool:detection:scored";

// ============================================================================
// PRICE FEED DEFAULTS
// ============================================================================

pub const PRICE_TIER1_MAX_ENTRIES: usize = 1_000;
pub const PRICE_TIER1_TTL_MS: u64 = 1_000;
pub const PRICE_TIER2_TTL_SECONDS: u64 = 60;
pub const PRICE_RATE_LIMIT_REQUESTS: u32 = 300;
pub const PRICE_RATE_LIMIT_WINDOW_SECONDS: u64 = 60;
pub const PRICE_FETCH_TIMEOUT_MS: u64 = 5_000;
pub const PRICE_RETRY_ATTEMPTS: u32 = 3;
pub const PRICE_RETRY_BASE_DELAY_MS: u64 = 100;
pub const PRICE_RETRY_JITTER_FACTOR: f64 = 0.10;

// ============================================================================
// CIRCUIT BREAKER DEFAULTS (shared by C6 price feed, C9 exit executor)
// ============================================================================

pub const CIRCUIT_BREAKER_FAILURE_THRESHOLD: u32 = 5;
pub const CIRCUIT_BREAKER_TIMEOUT_MS: u64 = 60_000;
pub const CIRCUIT_BREAKER_SUCCESS_THRESHOLD: u32 = 2;

// ============================================================================
// TRADE EXECUTOR DEFAULTS
// ============================================================================

pub const DEFAULT_SLIPPAGE_BPS: u16 = 100;
pub const DEFAULT_COMMISSION_BPS: u16 = 100;
pub const DEFAULT_MIN_COMMISSION_USD: f64 = 0.05;

// ============================================================================
// POSITION MONITOR DEFAULTS
// ============================================================================

pub const POSITION_CHECK_INTERVAL_MS: u64 = 5_000;
pub const POSITION_MAX_CONCURRENT_CHECKS: usize = 10;

// ============================================================================
// EXIT EXECUTOR / JITO BUNDLE RELAY DEFAULTS
// ============================================================================

pub const JITO_MAINNET_BLOCK_ENGINE: &str = "https://mainnet.block-engine.jito.wtf";
pub const JITO_RATE_LIMIT_MS: u64 = 1_100;
pub const MIN_JITO_TIP_LAMPORTS: u64 = 100_000;
pub const MAX_JITO_TIP_LAMPORTS: u64 = 5_000_000;
pub const JITO_TIP_BASELINE_PERCENTILE: u8 = 99;
pub const JITO_TIP_SCALE_HIGH_MARGIN: f64 = 3.0;
pub const JITO_TIP_SCALE_MED_MARGIN: f64 = 2.0;
pub const JITO_TIP_SCALE_LOW_MARGIN: f64 = 1.0;
pub const JITO_TIP_REFRESH_MINUTES: u64 = 10;

pub const EXIT_MAX_ATTEMPTS: u32 = 3;
pub const EXIT_CIRCUIT_BREAKER_THRESHOLD: u32 = 5;
pub const EXIT_CIRCUIT_BREAKER_TIMEOUT_MS: u64 = 60_000;

// ============================================================================
// SECURITY CONSTANTS
// ============================================================================

pub const AES_KEY_SIZE: usize = 32;
pub const AES_NONCE_SIZE: usize = 16; // the envelope's IV field, 16 bytes
pub const AES_TAG_SIZE: usize = 16;
pub const VAULT_SALT_SIZE: usize = 32;

/// Argon2id parameters, chosen to exceed the required floor (memory >= 64
/// MiB, iterations >= 3, lanes >= 4).
pub const ARGON2_MEMORY_KIB: u32 = 65_536; // 64 MiB
pub const ARGON2_ITERATIONS: u32 = 3;
pub const ARGON2_LANES: u32 = 4;

pub const SESSION_TOKEN_BYTES: usize = 32; // >= 128 bits
pub const STRICT_SESSION_TTL_SECONDS: u64 = 120;
pub const REUSE_SESSION_TTL_SECONDS: u64 = 900;

// ============================================================================
// HELPERS
// ============================================================================

pub const fn bps_to_percentage(bps: u16) -> f64 {
    bps as f64 / 100.0
}

pub const fn percentage_to_bps(percentage: f64) -> u16 {
    (percentage * 100.0) as u16
}

pub const fn duration_from_ms(ms: u64) -> Duration {
    Duration::from_millis(ms)
}

/// Truncate a string to at most `max_chars` characters, respecting UTF-8
/// boundaries (safe alternative to byte-index slicing for logging).
pub fn truncate_safe(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sol_lamports_conversion() {
        assert_eq!(sol_to_lamports(1.0), SOL_DECIMALS);
        assert_eq!(lamports_to_sol(SOL_DECIMALS), 1.0);
        assert_eq!(sol_to_lamports(0.5), 500_000_000);
    }

    #[test]
    fn test_bps_percentage_conversion() {
        assert_eq!(bps_to_percentage(25), 0.25);
        assert_eq!(percentage_to_bps(0.25), 25);
    }

    #[test]
    fn test_truncate_safe_respects_char_boundaries() {
        assert_eq!(truncate_safe("hello world", 5), "hello");
        assert_eq!(truncate_safe("hi", 5), "hi");
        assert_eq!(truncate_safe("héllo", 2), "hé");
    }

    #[test]
    fn test_argon2_params_meet_memory_hardness_floor() {
        assert!(ARGON2_MEMORY_KIB >= 64 * 1024);
        assert!(ARGON2_ITERATIONS >= 3);
        assert!(ARGON2_LANES >= 4);
    }
}
