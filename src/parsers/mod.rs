//! DEX Parsers: recognize pool-*initialization* transactions per DEX
//! and emit a `RawPoolDetection`.
//!
//! Grounded on `dex_parser.rs`'s discriminator-first matching structure
//! (`VersionedMessage::Legacy`/`V0` handling, per-program `Vec<u8>`
//! discriminator table) repurposed from swap discriminators to
//! pool-initialization discriminators. Pool-init
//! discriminators are not present anywhere in the retrieval pack (only
//! swap discriminators are); this crate defines its own, documented in
//! DESIGN.md.

mod meteora;
mod orca;
mod pumpfun;
mod pumpswap;
mod raydium;

pub use meteora::MeteoraParser;
pub use orca::OrcaWhirlpoolParser;
pub use pumpfun::PumpFunParser;
pub use pumpswap::PumpSwapParser;
pub use raydium::{RaydiumClmmParser, RaydiumV4Parser};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use solana_sdk::{message::VersionedMessage, pubkey::Pubkey, transaction::VersionedTransaction};

use crate::constants::{SOL_MINT, USDC_MINT, USDT_MINT};
use crate::errors::ParseError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolSource {
    RaydiumV4,
    RaydiumClmm,
    OrcaWhirlpool,
    Meteora,
    PumpFun,
    PumpSwap,
}

impl std::fmt::Display for PoolSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PoolSource::RaydiumV4 => "raydium_v4",
            PoolSource::RaydiumClmm => "raydium_clmm",
            PoolSource::OrcaWhirlpool => "orca_whirlpool",
            PoolSource::Meteora => "meteora",
            PoolSource::PumpFun => "pump_fun",
            PoolSource::PumpSwap => "pumpswap",
        };
        f.write_str(s)
    }
}

/// Which side of the pair was treated as quote when orienting
/// `token_mint_a`/`token_mint_b`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuoteKind {
    Sol,
    Usdc,
    Usdt,
    UnknownQuote,
}

fn quote_kind_for(mint: &str) -> Option<QuoteKind> {
    match mint {
        m if m == SOL_MINT => Some(QuoteKind::Sol),
        m if m == USDC_MINT => Some(QuoteKind::Usdc),
        m if m == USDT_MINT => Some(QuoteKind::Usdt),
        _ => None,
    }
}

/// Orient a raw pair of mints so the quote side lands in `token_mint_b`.
/// The SOL-side of a pair is placed in `token_mint_b`; pools whose neither
/// side is a known quote are reported with whichever orientation the
/// on-chain layout implies and labeled `unknown_quote`.
pub fn orient_mints(mint_x: String, mint_y: String) -> (String, String, QuoteKind) {
    if let Some(kind) = quote_kind_for(&mint_y) {
        (mint_x, mint_y, kind)
    } else if let Some(kind) = quote_kind_for(&mint_x) {
        (mint_y, mint_x, kind)
    } else {
        (mint_x, mint_y, QuoteKind::UnknownQuote)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeSchedulerConfig {
    pub cliff_fee_bps: u32,
    pub num_periods: u32,
    pub period_sec: u32,
    /// Fraction (0.0-1.0) the fee reduces by each period.
    pub reduction_factor: f64,
    pub launch_time_sec: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimiterConfig {
    pub base_fee_bps: u32,
    pub max_fee_bps: u32,
    pub fee_increment_bps: u32,
    pub reference_amount_lamports: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlphaVaultConfig {
    pub is_active: bool,
    pub ends_at_sec: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeteoraAntiSniperConfig {
    pub has_fee_scheduler: bool,
    pub has_rate_limiter: bool,
    pub has_alpha_vault: bool,
    pub fee_scheduler: Option<FeeSchedulerConfig>,
    pub rate_limiter: Option<RateLimiterConfig>,
    pub alpha_vault: Option<AlphaVaultConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawPoolDetection {
    pub pool_address: String,
    pub token_mint_a: String,
    pub token_mint_b: String,
    pub source: PoolSource,
    pub signature: String,
    pub slot: u64,
    pub block_time: Option<i64>,
    pub quote_kind: QuoteKind,
    pub creator: Option<String>,
    pub meteora_anti_sniper: Option<MeteoraAntiSniperConfig>,
}

/// A block update may carry transactions directly, or be wrapped one level
/// deeper -- block messages can arrive in either shape. The stream layer
/// normalizes both into this before handing a parser a single transaction
/// at a time.
pub struct ParserInput<'a> {
    pub transaction: &'a VersionedTransaction,
    pub signature: &'a str,
    pub slot: u64,
    pub block_time: Option<i64>,
}

/// Capability to fetch raw account data, used only as a last resort (e.g.
/// Meteora anti-sniper config not fully encoded in instruction data).
/// Stubbable so parser tests stay deterministic and I/O-free.
#[async_trait]
pub trait AccountDataFetcher: Send + Sync {
    async fn fetch_account_data(&self, pubkey: &Pubkey) -> Result<Vec<u8>, ParseError>;
}

/// No-op fetcher for tests and for DEXs whose pool-init instruction already
/// carries everything a detection needs.
pub struct NullAccountDataFetcher;

#[async_trait]
impl AccountDataFetcher for NullAccountDataFetcher {
    async fn fetch_account_data(&self, _pubkey: &Pubkey) -> Result<Vec<u8>, ParseError> {
        Err(ParseError::MissingAccount(0))
    }
}

#[async_trait]
pub trait PoolInitParser: Send + Sync {
    fn source(&self) -> PoolSource;

    /// Inspect one transaction for this DEX's pool-initialization
    /// instruction. Discriminator-first: an unrecognized discriminator
    /// returns `Ok(None)` without further cost.
    async fn parse_pool_init(
        &self,
        input: &ParserInput<'_>,
    ) -> Result<Option<RawPoolDetection>, ParseError>;
}

/// Tries every parser in turn against one transaction, discriminator-first:
/// the first parser that recognizes its own pool-init instruction wins.
/// Records a detection/error count per DEX on the way so a single dispatch
/// point is enough to keep parser metrics accurate regardless of how many
/// DEXs are wired in.
pub async fn dispatch(
    parsers: &[std::sync::Arc<dyn PoolInitParser>],
    input: &ParserInput<'_>,
    metrics: &crate::metrics::Metrics,
) -> Result<Option<RawPoolDetection>, ParseError> {
    for parser in parsers {
        match parser.parse_pool_init(input).await {
            Ok(Some(detection)) => {
                metrics
                    .parser_detections_total
                    .with_label_values(&[&parser.source().to_string()])
                    .inc();
                return Ok(Some(detection));
            }
            Ok(None) => continue,
            Err(e) => {
                metrics
                    .parser_errors_total
                    .with_label_values(&[&parser.source().to_string()])
                    .inc();
                return Err(e);
            }
        }
    }
    Ok(None)
}

/// Shared helper: pull `(instructions, account_keys)` out of either message
/// version, mirroring `dex_parser.rs`'s `VersionedMessage::Legacy/V0` match.
pub(crate) fn instructions_and_keys(
    message: &VersionedMessage,
) -> (&[solana_sdk::instruction::CompiledInstruction], &[Pubkey]) {
    match message {
        VersionedMessage::Legacy(msg) => (&msg.instructions, &msg.account_keys),
        VersionedMessage::V0(msg) => (&msg.instructions, &msg.account_keys),
    }
}

pub(crate) fn account_at(keys: &[Pubkey], idx: u8) -> Option<Pubkey> {
    keys.get(idx as usize).copied()
}

#[cfg(test)]
pub(crate) mod test_support {
    use solana_sdk::hash::Hash;
    use solana_sdk::instruction::CompiledInstruction;
    use solana_sdk::message::{Message, MessageHeader, VersionedMessage};
    use solana_sdk::pubkey::Pubkey;
    use solana_sdk::signature::Signature;
    use solana_sdk::transaction::VersionedTransaction;

    /// Build a minimal legacy-message transaction with a single instruction
    /// targeting `program_id`, for parser unit tests.
    pub fn tx_with(
        program_id: Pubkey,
        discriminator: [u8; 8],
        mut account_keys: Vec<Pubkey>,
        ix_accounts: Vec<u8>,
    ) -> VersionedTransaction {
        let program_id_index = account_keys.len() as u8;
        account_keys.push(program_id);

        let instruction = CompiledInstruction {
            program_id_index,
            accounts: ix_accounts,
            data: discriminator.to_vec(),
        };

        VersionedTransaction {
            signatures: vec![Signature::default()],
            message: VersionedMessage::Legacy(Message {
                header: MessageHeader {
                    num_required_signatures: 1,
                    num_readonly_signed_accounts: 0,
                    num_readonly_unsigned_accounts: 0,
                },
                account_keys,
                recent_blockhash: Hash::default(),
                instructions: vec![instruction],
            }),
        }
    }

    /// Same as `tx_with` but lets the caller append extra raw bytes after
    /// the 8-byte discriminator (e.g. Meteora anti-sniper payloads).
    pub fn tx_with_payload(
        program_id: Pubkey,
        discriminator: [u8; 8],
        payload: Vec<u8>,
        mut account_keys: Vec<Pubkey>,
        ix_accounts: Vec<u8>,
    ) -> VersionedTransaction {
        let program_id_index = account_keys.len() as u8;
        account_keys.push(program_id);

        let mut data = discriminator.to_vec();
        data.extend(payload);

        let instruction = CompiledInstruction {
            program_id_index,
            accounts: ix_accounts,
            data,
        };

        VersionedTransaction {
            signatures: vec![Signature::default()],
            message: VersionedMessage::Legacy(Message {
                header: MessageHeader {
                    num_required_signatures: 1,
                    num_readonly_signed_accounts: 0,
                    num_readonly_unsigned_accounts: 0,
                },
                account_keys,
                recent_blockhash: Hash::default(),
                instructions: vec![instruction],
            }),
        }
    }
}
