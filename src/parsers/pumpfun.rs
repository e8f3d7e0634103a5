use async_trait::async_trait;
use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;

use crate::constants::{PUMPFUN_PROGRAM_ID, SOL_MINT};
use crate::errors::ParseError;

use super::{account_at, instructions_and_keys, ParserInput, PoolInitParser, PoolSource, QuoteKind, RawPoolDetection};

/// `create` discriminator for Pump.fun bonding-curve creation. Every
/// Pump.fun launch quotes against SOL by construction, so no orientation
/// step is needed here (unlike the AMM-style DEXs).
const PUMPFUN_CREATE_DISCRIMINATOR: [u8; 8] = [24, 30, 200, 40, 5, 28, 7, 119];

pub struct PumpFunParser {
    program_id: Pubkey,
}

impl PumpFunParser {
    pub fn new() -> Self {
        Self {
            program_id: Pubkey::from_str(PUMPFUN_PROGRAM_ID).expect("static program id is valid"),
        }
    }
}

impl Default for PumpFunParser {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PoolInitParser for PumpFunParser {
    fn source(&self) -> PoolSource {
        PoolSource::PumpFun
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
            if ix.data.len() < 8 || ix.data[0..8] != PUMPFUN_CREATE_DISCRIMINATOR {
                continue;
            }
            // Layout: mint, bonding_curve (pool), creator.
            if ix.accounts.len() < 3 {
                return Err(ParseError::MalformedInstruction);
            }
            let mint = account_at(account_keys, ix.accounts[0]).ok_or(ParseError::MissingAccount(0))?;
            let bonding_curve =
                account_at(account_keys, ix.accounts[1]).ok_or(ParseError::MissingAccount(1))?;
            let creator = account_at(account_keys, ix.accounts[2]).ok_or(ParseError::MissingAccount(2))?;

            return Ok(Some(RawPoolDetection {
                pool_address: bonding_curve.to_string(),
                token_mint_a: mint.to_string(),
                token_mint_b: SOL_MINT.to_string(),
                source: PoolSource::PumpFun,
                signature: input.signature.to_string(),
                slot: input.slot,
                block_time: input.block_time,
                quote_kind: QuoteKind::Sol,
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
    use crate::parsers::test_support::tx_with;

    #[tokio::test]
    async fn recognizes_pumpfun_create() {
        let mint = Pubkey::new_unique();
        let bonding_curve = Pubkey::new_unique();
        let creator = Pubkey::new_unique();
        let program_id = Pubkey::from_str(PUMPFUN_PROGRAM_ID).unwrap();

        let tx = tx_with(
            program_id,
            PUMPFUN_CREATE_DISCRIMINATOR,
            vec![mint, bonding_curve, creator],
            vec![0, 1, 2],
        );
        let input = ParserInput {
            transaction: &tx,
            signature: "sig",
            slot: 1,
            block_time: None,
        };
        let parser = PumpFunParser::new();
        let detection = parser.parse_pool_init(&input).await.unwrap().unwrap();
        assert_eq!(detection.token_mint_b, SOL_MINT);
        assert_eq!(detection.quote_kind, QuoteKind::Sol);
    }
}
