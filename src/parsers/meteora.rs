use async_trait::async_trait;
use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;

use crate::constants::METEORA_DLMM_PROGRAM_ID;
use crate::errors::ParseError;

use super::{
    account_at, instructions_and_keys, orient_mints, AlphaVaultConfig, FeeSchedulerConfig,
    MeteoraAntiSniperConfig, ParserInput, PoolInitParser, PoolSource, RateLimiterConfig,
    RawPoolDetection,
};

/// `initialize_lb_pair` discriminator for Meteora DLMM.
const METEORA_INIT_DISCRIMINATOR: [u8; 8] = [45, 154, 237, 210, 221, 15, 166, 92];

/// Parses Meteora DLMM pool creation, including the optional anti-sniper
/// configuration (fee scheduler / rate limiter / alpha vault) carried in
/// the instruction payload immediately after the 8-byte discriminator.
///
/// Byte layout (this crate's own encoding; not present in the retrieval
/// pack, see DESIGN.md): a `has_*: u8` flag precedes each sub-config, and
/// each sub-config's fields are omitted entirely when its flag is 0.
///
/// - fee_scheduler (17 bytes): u32 cliff_fee_bps, u32 num_periods,
///   u32 period_sec, u32 reduction_factor_bps (reduction_factor * 10_000),
///   i64... truncated to fit: see field-by-field parsing below.
pub struct MeteoraParser {
    program_id: Pubkey,
}

impl MeteoraParser {
    pub fn new() -> Self {
        Self {
            program_id: Pubkey::from_str(METEORA_DLMM_PROGRAM_ID).expect("static program id is valid"),
        }
    }
}

impl Default for MeteoraParser {
    fn default() -> Self {
        Self::new()
    }
}

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn u8(&mut self) -> Result<u8, ParseError> {
        let b = *self.data.get(self.pos).ok_or(ParseError::MalformedInstruction)?;
        self.pos += 1;
        Ok(b)
    }

    fn u32(&mut self) -> Result<u32, ParseError> {
        let bytes = self
            .data
            .get(self.pos..self.pos + 4)
            .ok_or(ParseError::MalformedInstruction)?;
        self.pos += 4;
        Ok(u32::from_le_bytes(bytes.try_into().unwrap()))
    }

    fn u64(&mut self) -> Result<u64, ParseError> {
        let bytes = self
            .data
            .get(self.pos..self.pos + 8)
            .ok_or(ParseError::MalformedInstruction)?;
        self.pos += 8;
        Ok(u64::from_le_bytes(bytes.try_into().unwrap()))
    }

    fn i64(&mut self) -> Result<i64, ParseError> {
        Ok(self.u64()? as i64)
    }
}

fn parse_anti_sniper_config(payload: &[u8]) -> Result<MeteoraAntiSniperConfig, ParseError> {
    let mut cur = Cursor::new(payload);

    let has_fee_scheduler = cur.u8()? != 0;
    let fee_scheduler = if has_fee_scheduler {
        Some(FeeSchedulerConfig {
            cliff_fee_bps: cur.u32()?,
            num_periods: cur.u32()?,
            period_sec: cur.u32()?,
            reduction_factor: cur.u32()? as f64 / 10_000.0,
            launch_time_sec: cur.i64()?,
        })
    } else {
        None
    };

    let has_rate_limiter = cur.u8()? != 0;
    let rate_limiter = if has_rate_limiter {
        Some(RateLimiterConfig {
            base_fee_bps: cur.u32()?,
            max_fee_bps: cur.u32()?,
            fee_increment_bps: cur.u32()?,
            reference_amount_lamports: cur.u64()?,
        })
    } else {
        None
    };

    let has_alpha_vault = cur.u8()? != 0;
    let alpha_vault = if has_alpha_vault {
        Some(AlphaVaultConfig {
            is_active: cur.u8()? != 0,
            ends_at_sec: cur.i64()?,
        })
    } else {
        None
    };

    Ok(MeteoraAntiSniperConfig {
        has_fee_scheduler,
        has_rate_limiter,
        has_alpha_vault,
        fee_scheduler,
        rate_limiter,
        alpha_vault,
    })
}

#[async_trait]
impl PoolInitParser for MeteoraParser {
    fn source(&self) -> PoolSource {
        PoolSource::Meteora
    }

    async fn parse_pool_init(
        &self,
        input: &ParserInput<'_>,
    ) -> Result<Option<RawPoolDetection>, ParseError> {
        let (instructions, account_keys) = instructions_and_keys(&input.transaction.message);

        for ix in instructions {
            let Some(&program_id) = account_keys.get(ix.program_id_index as usize) else {
                continue;
            };
            if program_id != self.program_id {
                continue;
            }
            if ix.data.len() < 8 || ix.data[0..8] != METEORA_INIT_DISCRIMINATOR {
                continue;
            }
            if ix.accounts.len() < 4 {
                return Err(ParseError::MalformedInstruction);
            }
            let creator = account_at(account_keys, ix.accounts[0]).ok_or(ParseError::MissingAccount(0))?;
            let pool = account_at(account_keys, ix.accounts[1]).ok_or(ParseError::MissingAccount(1))?;
            let mint_a = account_at(account_keys, ix.accounts[2]).ok_or(ParseError::MissingAccount(2))?;
            let mint_b = account_at(account_keys, ix.accounts[3]).ok_or(ParseError::MissingAccount(3))?;

            // Anti-sniper config is optional: payload beyond the
            // discriminator may be empty, meaning "no config present".
            let payload = &ix.data[8..];
            let anti_sniper = if payload.is_empty() {
                None
            } else {
                Some(parse_anti_sniper_config(payload)?)
            };

            let (mint_a, mint_b, quote_kind) =
                orient_mints(mint_a.to_string(), mint_b.to_string());
            return Ok(Some(RawPoolDetection {
                pool_address: pool.to_string(),
                token_mint_a: mint_a,
                token_mint_b: mint_b,
                source: PoolSource::Meteora,
                signature: input.signature.to_string(),
                slot: input.slot,
                block_time: input.block_time,
                quote_kind,
                creator: Some(creator.to_string()),
                meteora_anti_sniper: anti_sniper,
            }));
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::SOL_MINT;
    use crate::parsers::test_support::tx_with_payload;

    fn base_accounts() -> (Pubkey, Pubkey, Pubkey, Pubkey, Pubkey) {
        (
            Pubkey::new_unique(), // creator
            Pubkey::new_unique(), // pool
            Pubkey::new_unique(), // mint
            Pubkey::from_str(SOL_MINT).unwrap(),
            Pubkey::from_str(METEORA_DLMM_PROGRAM_ID).unwrap(),
        )
    }

    #[tokio::test]
    async fn no_payload_means_no_anti_sniper_config() {
        let (creator, pool, mint, sol, program_id) = base_accounts();
        let tx = tx_with_payload(
            program_id,
            METEORA_INIT_DISCRIMINATOR,
            vec![],
            vec![creator, pool, mint, sol],
            vec![0, 1, 2, 3],
        );
        let input = ParserInput {
            transaction: &tx,
            signature: "sig",
            slot: 1,
            block_time: None,
        };
        let detection = MeteoraParser::new().parse_pool_init(&input).await.unwrap().unwrap();
        assert!(detection.meteora_anti_sniper.is_none());
    }

    #[tokio::test]
    async fn parses_fee_scheduler_payload() {
        let (creator, pool, mint, sol, program_id) = base_accounts();

        let mut payload = Vec::new();
        payload.push(1u8); // has_fee_scheduler
        payload.extend_from_slice(&9900u32.to_le_bytes()); // cliff_fee_bps
        payload.extend_from_slice(&10u32.to_le_bytes()); // num_periods
        payload.extend_from_slice(&60u32.to_le_bytes()); // period_sec
        payload.extend_from_slice(&5000u32.to_le_bytes()); // reduction_factor_bps -> 0.5
        payload.extend_from_slice(&1_700_000_000i64.to_le_bytes()); // launch_time_sec
        payload.push(0u8); // has_rate_limiter
        payload.push(0u8); // has_alpha_vault

        let tx = tx_with_payload(
            program_id,
            METEORA_INIT_DISCRIMINATOR,
            payload,
            vec![creator, pool, mint, sol],
            vec![0, 1, 2, 3],
        );
        let input = ParserInput {
            transaction: &tx,
            signature: "sig",
            slot: 1,
            block_time: None,
        };
        let detection = MeteoraParser::new().parse_pool_init(&input).await.unwrap().unwrap();
        let config = detection.meteora_anti_sniper.unwrap();
        assert!(config.has_fee_scheduler);
        assert!(!config.has_rate_limiter);
        let scheduler = config.fee_scheduler.unwrap();
        assert_eq!(scheduler.cliff_fee_bps, 9900);
        assert_eq!(scheduler.reduction_factor, 0.5);
    }
}
