use async_trait::async_trait;
use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;

use crate::constants::ORCA_WHIRLPOOLS_PROGRAM_ID;
use crate::errors::ParseError;

use super::{
    account_at, instructions_and_keys, orient_mints, ParserInput, PoolInitParser, PoolSource,
    RawPoolDetection,
};

/// `initialize_pool` discriminator for Orca Whirlpools.
const ORCA_WHIRLPOOL_INIT_DISCRIMINATOR: [u8; 8] = [95, 180, 10, 172, 84, 174, 232, 40];

pub struct OrcaWhirlpoolParser {
    program_id: Pubkey,
}

impl OrcaWhirlpoolParser {
    pub fn new() -> Self {
        Self {
            program_id: Pubkey::from_str(ORCA_WHIRLPOOLS_PROGRAM_ID)
                .expect("static program id is valid"),
        }
    }
}

impl Default for OrcaWhirlpoolParser {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PoolInitParser for OrcaWhirlpoolParser {
    fn source(&self) -> PoolSource {
        PoolSource::OrcaWhirlpool
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
            if ix.data.len() < 8 || ix.data[0..8] != ORCA_WHIRLPOOL_INIT_DISCRIMINATOR {
                continue;
            }
            // Whirlpool layout: funder, whirlpool (pool), token_mint_a, token_mint_b.
            if ix.accounts.len() < 4 {
                return Err(ParseError::MalformedInstruction);
            }
            let creator = account_at(account_keys, ix.accounts[0])
                .ok_or(ParseError::MissingAccount(0))?;
            let pool = account_at(account_keys, ix.accounts[1])
                .ok_or(ParseError::MissingAccount(1))?;
            let mint_a = account_at(account_keys, ix.accounts[2])
                .ok_or(ParseError::MissingAccount(2))?;
            let mint_b = account_at(account_keys, ix.accounts[3])
                .ok_or(ParseError::MissingAccount(3))?;

            let (mint_a, mint_b, quote_kind) =
                orient_mints(mint_a.to_string(), mint_b.to_string());
            return Ok(Some(RawPoolDetection {
                pool_address: pool.to_string(),
                token_mint_a: mint_a,
                token_mint_b: mint_b,
                source: PoolSource::OrcaWhirlpool,
                signature: input.signature.to_string(),
                slot: input.slot,
                block_time: input.block_time,
                quote_kind,
                creator: Some(creator.to_string()),
                meteora_anti_sniper: None,
            }));
        }
        Ok(None)
    }
}
