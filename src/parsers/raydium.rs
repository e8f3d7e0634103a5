use async_trait::async_trait;
use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;

use crate::constants::{RAYDIUM_AMM_V4_PROGRAM_ID, RAYDIUM_CLMM_PROGRAM_ID};
use crate::errors::ParseError;

use super::{
    account_at, instructions_and_keys, orient_mints, ParserInput, PoolInitParser, PoolSource,
    RawPoolDetection,
};

/// `initialize2` discriminator for Raydium AMM V4 pool creation (distinct
/// from the swap discriminator carried by `dex_parser.rs`).
const RAYDIUM_V4_INIT_DISCRIMINATOR: [u8; 8] = [175, 175, 109, 31, 13, 152, 155, 237];
/// `create_pool` discriminator for Raydium CLMM.
const RAYDIUM_CLMM_INIT_DISCRIMINATOR: [u8; 8] = [233, 146, 209, 142, 207, 104, 64, 188];

/// Account layout for both Raydium pool-init instructions: creator, pool
/// (AMM id / pool state), mint A, mint B.
fn extract(
    account_keys: &[Pubkey],
    accounts: &[u8],
) -> Option<(Pubkey, Pubkey, Pubkey, Pubkey)> {
    if accounts.len() < 4 {
        return None;
    }
    let creator = account_at(account_keys, accounts[0])?;
    let pool = account_at(account_keys, accounts[1])?;
    let mint_a = account_at(account_keys, accounts[2])?;
    let mint_b = account_at(account_keys, accounts[3])?;
    Some((creator, pool, mint_a, mint_b))
}

macro_rules! raydium_parser {
    ($name:ident, $source:expr, $program_id:expr, $discriminator:expr) => {
        pub struct $name {
            program_id: Pubkey,
        }

        impl $name {
            pub fn new() -> Self {
                Self {
                    program_id: Pubkey::from_str($program_id).expect("static program id is valid"),
                }
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        #[async_trait]
        impl PoolInitParser for $name {
            fn source(&self) -> PoolSource {
                $source
            }

            async fn parse_pool_init(
                &self,
                input: &ParserInput<'_>,
            ) -> Result<Option<RawPoolDetection>, ParseError> {
                let (instructions, account_keys) = instructions_and_keys(&input.transaction.message);

                for ix in instructions {
                    let program_idx = ix.program_id_index as usize;
                    let Some(&program_id) = account_keys.get(program_idx) else {
                        continue;
                    };
                    if program_id != self.program_id {
                        continue;
                    }
                    if ix.data.len() < 8 || ix.data[0..8] != $discriminator {
                        continue;
                    }
                    let Some((creator, pool, mint_a, mint_b)) = extract(account_keys, &ix.accounts)
                    else {
                        return Err(ParseError::MalformedInstruction);
                    };
                    let (mint_a, mint_b, quote_kind) =
                        orient_mints(mint_a.to_string(), mint_b.to_string());
                    return Ok(Some(RawPoolDetection {
                        pool_address: pool.to_string(),
                        token_mint_a: mint_a,
                        token_mint_b: mint_b,
                        source: $source,
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
    };
}

raydium_parser!(
    RaydiumV4Parser,
    PoolSource::RaydiumV4,
    RAYDIUM_AMM_V4_PROGRAM_ID,
    RAYDIUM_V4_INIT_DISCRIMINATOR
);
raydium_parser!(
    RaydiumClmmParser,
    PoolSource::RaydiumClmm,
    RAYDIUM_CLMM_PROGRAM_ID,
    RAYDIUM_CLMM_INIT_DISCRIMINATOR
);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::SOL_MINT;
    use crate::parsers::test_support::tx_with;

    #[tokio::test]
    async fn recognizes_raydium_v4_init() {
        let creator = Pubkey::new_unique();
        let pool = Pubkey::new_unique();
        let mint = Pubkey::new_unique();
        let sol = Pubkey::from_str(SOL_MINT).unwrap();

        let program_id = Pubkey::from_str(RAYDIUM_AMM_V4_PROGRAM_ID).unwrap();
        let tx = tx_with(
            program_id,
            RAYDIUM_V4_INIT_DISCRIMINATOR,
            vec![creator, pool, mint, sol],
            vec![0, 1, 2, 3],
        );
        let input = ParserInput {
            transaction: &tx,
            signature: "sig1",
            slot: 42,
            block_time: Some(1000),
        };

        let parser = RaydiumV4Parser::new();
        let detection = parser.parse_pool_init(&input).await.unwrap().unwrap();
        assert_eq!(detection.pool_address, pool.to_string());
        assert_eq!(detection.token_mint_b, sol.to_string());
        assert_eq!(detection.source, PoolSource::RaydiumV4);
    }

    #[tokio::test]
    async fn unrecognized_discriminator_returns_none() {
        let program_id = Pubkey::from_str(RAYDIUM_AMM_V4_PROGRAM_ID).unwrap();
        let tx = tx_with(
            program_id,
            [1, 2, 3, 4, 5, 6, 7, 8],
            vec![Pubkey::new_unique(), Pubkey::new_unique(), Pubkey::new_unique(), Pubkey::new_unique()],
            vec![0, 1, 2, 3],
        );
        let input = ParserInput {
            transaction: &tx,
            signature: "sig2",
            slot: 1,
            block_time: None,
        };
        let parser = RaydiumV4Parser::new();
        assert!(parser.parse_pool_init(&input).await.unwrap().is_none());
    }
}
