use async_trait::async_trait;
use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;

use crate::constants::PUMPSWAP_PROGRAM_ID;
use crate::errors::ParseError;

use super::{
    account_at, instructions_and_keys, orient_mints, ParserInput, PoolInitParser, PoolSource,
    RawPoolDetection,
};

/// `create_pool` discriminator for PumpSwap (the AMM pump.fun graduates into).
const PUMPSWAP_CREATE_POOL_DISCRIMINATOR: [u8; 8] = [233, 146, 209, 142, 207, 104, 64, 189];

pub struct PumpSwapParser {
    program_id: Pubkey,
}

impl PumpSwapParser {
    pub fn new() -> Self {
        Self {
            program_id: Pubkey::from_str(PUMPSWAP_PROGRAM_ID).expect("static program id is valid"),
        }
    }
}

impl Default for PumpSwapParser {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PoolInitParser for PumpSwapParser {
    fn source(&self) -> PoolSource {
        PoolSource::PumpSwap
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
            if ix.data.len() < 8 || ix.data[0..8] != PUMPSWAP_CREATE_POOL_DISCRIMINATOR {
                continue;
            }
            // Layout: creator, pool, base_mint, quote_mint.
            if ix.accounts.len() < 4 {
                return Err(ParseError::MalformedInstruction);
            }
            let creator = account_at(account_keys, ix.accounts[0]).ok_or(ParseError::MissingAccount(0))?;
            let pool = account_at(account_keys, ix.accounts[1]).ok_or(ParseError::MissingAccount(1))?;
            let mint_a = account_at(account_keys, ix.accounts[2]).ok_or(ParseError::MissingAccount(2))?;
            let mint_b = account_at(account_keys, ix.accounts[3]).ok_or(ParseError::MissingAccount(3))?;

            let (mint_a, mint_b, quote_kind) =
                orient_mints(mint_a.to_string(), mint_b.to_string());
            return Ok(Some(RawPoolDetection {
                pool_address: pool.to_string(),
                token_mint_a: mint_a,
                token_mint_b: mint_b,
                source: PoolSource::PumpSwap,
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::SOL_MINT;
    use crate::parsers::test_support::tx_with;

    #[tokio::test]
    async fn recognizes_pumpswap_create_pool() {
        let creator = Pubkey::new_unique();
        let pool = Pubkey::new_unique();
        let mint = Pubkey::new_unique();
        let sol = Pubkey::from_str(SOL_MINT).unwrap();
        let program_id = Pubkey::from_str(PUMPSWAP_PROGRAM_ID).unwrap();

        let tx = tx_with(
            program_id,
            PUMPSWAP_CREATE_POOL_DISCRIMINATOR,
            vec![creator, pool, mint, sol],
            vec![0, 1, 2, 3],
        );
        let input = ParserInput {
            transaction: &tx,
            signature: "sig",
            slot: 1,
            block_time: None,
        };
        let parser = PumpSwapParser::new();
        let detection = parser.parse_pool_init(&input).await.unwrap().unwrap();
        assert_eq!(detection.source, PoolSource::PumpSwap);
        assert_eq!(detection.token_mint_b, sol.to_string());
    }
}
