//! JSON-RPC chain reader.
//!
//! Talks to an Ethereum node over HTTP using `eth_call`, `eth_getLogs` and
//! `eth_blockNumber`. Calldata and return values use the standard ABI word
//! layout; only the handful of static types the protocol contracts return are
//! decoded here.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use sha3::{Digest, Keccak256};

use super::{
    CapitalFloor, ChainError, ChainHead, CoverRegistry, PayoutEvent, PriceFeed, ProtocolAddresses,
    StakePool, TokenPriceOracle, UnstakeRequest,
};
use crate::domain::units::from_wei;
use crate::domain::{Address, CoverRecord, CoverStatus, Currency};

/// One 32-byte ABI word.
pub type Word = [u8; 32];

/// Cover status value the registry uses for an accepted claim.
const STATUS_CLAIM_ACCEPTED: u64 = 1;

/// Currency rates are published with two implied decimals.
const RATE_DECIMALS: u32 = 2;

/// Reader for the protocol contracts over a node's JSON-RPC endpoint.
#[derive(Debug)]
pub struct JsonRpcChain {
    url: String,
    client: reqwest::Client,
    addresses: ProtocolAddresses,
    next_id: AtomicU64,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawLog {
    block_number: String,
    data: String,
}

impl JsonRpcChain {
    /// Creates a reader for the node at `url`.
    #[must_use]
    pub fn new(client: reqwest::Client, url: impl Into<String>, addresses: ProtocolAddresses) -> Self {
        Self {
            url: url.into(),
            client,
            addresses,
            next_id: AtomicU64::new(1),
        }
    }

    /// Addresses this reader was configured with.
    #[must_use]
    pub const fn addresses(&self) -> &ProtocolAddresses {
        &self.addresses
    }

    async fn call(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, ChainError> {
        let body = serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": self.next_id.fetch_add(1, Ordering::Relaxed),
        });

        let response: RpcResponse = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ChainError::Transport(e.to_string()))?
            .json()
            .await
            .map_err(|e| ChainError::Decode(format!("{method} response: {e}")))?;

        if let Some(err) = response.error {
            return Err(ChainError::Rpc(format!("{method}: {err}")));
        }
        response
            .result
            .ok_or_else(|| ChainError::Decode(format!("{method} returned no result")))
    }

    async fn eth_call(&self, to: Address, calldata: &[u8]) -> Result<Vec<Word>, ChainError> {
        let result = self
            .call(
                "eth_call",
                serde_json::json!([
                    { "to": to.to_string(), "data": format!("0x{}", hex::encode(calldata)) },
                    "latest"
                ]),
            )
            .await?;
        let raw = result
            .as_str()
            .ok_or_else(|| ChainError::Decode("eth_call result is not a string".to_string()))?;
        decode_words(&parse_hex_bytes(raw)?)
    }

    async fn logs(
        &self,
        address: Address,
        topics: serde_json::Value,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<RawLog>, ChainError> {
        let result = self
            .call(
                "eth_getLogs",
                serde_json::json!([{
                    "address": address.to_string(),
                    "fromBlock": format!("0x{from_block:x}"),
                    "toBlock": format!("0x{to_block:x}"),
                    "topics": topics,
                }]),
            )
            .await?;
        serde_json::from_value(result).map_err(|e| ChainError::Decode(format!("logs: {e}")))
    }
}

#[async_trait]
impl ChainHead for JsonRpcChain {
    async fn block_number(&self) -> Result<u64, ChainError> {
        let result = self.call("eth_blockNumber", serde_json::json!([])).await?;
        let raw = result
            .as_str()
            .ok_or_else(|| ChainError::Decode("block number is not a string".to_string()))?;
        parse_hex_u64(raw)
    }
}

#[async_trait]
impl CoverRegistry for JsonRpcChain {
    async fn cover_count(&self) -> Result<u64, ChainError> {
        let words = self
            .eth_call(self.addresses.cover_registry, &calldata("getCoverLength()", &[]))
            .await?;
        // Id 0 is a placeholder; real covers are 1..length.
        Ok(word_u64(word_at(&words, 0)?)?.saturating_sub(1))
    }

    async fn cover(&self, id: u64) -> Result<CoverRecord, ChainError> {
        let args = [encode_u64(id)];
        let details1 = calldata("getCoverDetailsByCoverID1(uint256)", &args);
        let details2 = calldata("getCoverDetailsByCoverID2(uint256)", &args);
        let (first, second) = tokio::try_join!(
            self.eth_call(self.addresses.cover_registry, &details1),
            self.eth_call(self.addresses.cover_registry, &details2),
        )?;
        decode_cover(id, &first, &second)
    }

    async fn payout_events(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<PayoutEvent>, ChainError> {
        let topic = event_topic("Payout(address,uint256,uint256)");
        let logs = self
            .logs(self.addresses.pool, serde_json::json!([topic]), from_block, to_block)
            .await?;
        logs.iter()
            .map(|log| {
                let words = decode_words(&parse_hex_bytes(&log.data)?)?;
                let cover_id = words.first().map(word_u64).transpose()?;
                Ok(PayoutEvent {
                    block_number: parse_hex_u64(&log.block_number)?,
                    cover_id,
                })
            })
            .collect()
    }
}

#[async_trait]
impl StakePool for JsonRpcChain {
    async fn contract_stake(&self, contract: Address) -> Result<Decimal, ChainError> {
        let words = self
            .eth_call(
                self.addresses.staking_pool,
                &calldata("contractStake(address)", &[encode_address(contract)]),
            )
            .await?;
        Ok(from_wei(word_u128(word_at(&words, 0)?)?)?)
    }

    async fn unstake_requests(
        &self,
        contract: Address,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<UnstakeRequest>, ChainError> {
        let topic = event_topic("UnstakeRequested(address,address,uint256,uint256)");
        let contract_topic = format!("0x{}", hex::encode(encode_address(contract)));
        let logs = self
            .logs(
                self.addresses.staking_pool,
                serde_json::json!([topic, contract_topic]),
                from_block,
                to_block,
            )
            .await?;
        logs.iter()
            .map(|log| {
                let words = decode_words(&parse_hex_bytes(&log.data)?)?;
                Ok(UnstakeRequest {
                    contract,
                    amount: from_wei(word_u128(word_at(&words, 0)?)?)?,
                    effective_at: timestamp(word_u64(word_at(&words, 1)?)?)?,
                    block_number: parse_hex_u64(&log.block_number)?,
                })
            })
            .collect()
    }

    async fn first_unprocessed_unstake(&self) -> Result<Option<DateTime<Utc>>, ChainError> {
        let signature = "unstakeRequests(uint256)";
        // Request 0 is the queue head; its `next` field points at the oldest pending request.
        let head = self
            .eth_call(self.addresses.staking_pool, &calldata(signature, &[encode_u64(0)]))
            .await?;
        let next = word_u64(word_at(&head, 4)?)?;
        if next == 0 {
            return Ok(None);
        }
        let request = self
            .eth_call(self.addresses.staking_pool, &calldata(signature, &[encode_u64(next)]))
            .await?;
        timestamp(word_u64(word_at(&request, 1)?)?).map(Some)
    }
}

#[async_trait]
impl TokenPriceOracle for JsonRpcChain {
    async fn token_price_eth(&self) -> Result<Decimal, ChainError> {
        let words = self
            .eth_call(
                self.addresses.capital_model,
                &calldata("calculateTokenPrice(bytes4)", &[encode_bytes4(Currency::Eth.code())]),
            )
            .await?;
        Ok(from_wei(word_u128(word_at(&words, 0)?)?)?)
    }
}

#[async_trait]
impl CapitalFloor for JsonRpcChain {
    async fn capital_floor_eth(&self) -> Result<Decimal, ChainError> {
        let words = self
            .eth_call(self.addresses.pool_data, &calldata("getLastMCREther()", &[]))
            .await?;
        Ok(from_wei(word_u128(word_at(&words, 0)?)?)?)
    }
}

#[async_trait]
impl PriceFeed for JsonRpcChain {
    async fn dai_per_eth(&self) -> Result<Decimal, ChainError> {
        let words = self
            .eth_call(
                self.addresses.pool_data,
                &calldata("getCAAvgRate(bytes4)", &[encode_bytes4(Currency::Dai.code())]),
            )
            .await?;
        decode_rate(word_at(&words, 0)?)
    }
}

/// Currency rate word with [`RATE_DECIMALS`] implied decimals.
fn decode_rate(word: &Word) -> Result<Decimal, ChainError> {
    let raw = i64::try_from(word_u64(word)?)
        .map_err(|_| ChainError::Decode("currency rate exceeds i64".to_string()))?;
    Ok(Decimal::new(raw, RATE_DECIMALS))
}

/// First four bytes of the keccak-256 of a function signature.
#[must_use]
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = Keccak256::digest(signature.as_bytes());
    let mut out = [0u8; 4];
    out.copy_from_slice(hash.get(..4).unwrap_or(&[0u8; 4]));
    out
}

/// `0x`-prefixed keccak-256 of an event signature, as used in `topics[0]`.
#[must_use]
pub fn event_topic(signature: &str) -> String {
    format!("0x{}", hex::encode(Keccak256::digest(signature.as_bytes())))
}

/// Builds calldata from a function signature and pre-encoded arguments.
#[must_use]
pub fn calldata(signature: &str, args: &[Word]) -> Vec<u8> {
    let mut data = Vec::with_capacity(4 + args.len() * 32);
    data.extend_from_slice(&selector(signature));
    for arg in args {
        data.extend_from_slice(arg);
    }
    data
}

/// Left-pads an address to a word.
#[must_use]
pub fn encode_address(address: Address) -> Word {
    let mut word = [0u8; 32];
    let (_, low) = word.split_at_mut(12);
    low.copy_from_slice(address.as_bytes());
    word
}

/// Big-endian `uint256` encoding of a `u64`.
#[must_use]
pub fn encode_u64(value: u64) -> Word {
    let mut word = [0u8; 32];
    let (_, low) = word.split_at_mut(24);
    low.copy_from_slice(&value.to_be_bytes());
    word
}

/// Right-pads a `bytes4` to a word.
#[must_use]
pub fn encode_bytes4(value: [u8; 4]) -> Word {
    let mut word = [0u8; 32];
    let (high, _) = word.split_at_mut(4);
    high.copy_from_slice(&value);
    word
}

/// Splits ABI return data into words.
///
/// # Errors
///
/// Returns [`ChainError::Decode`] if the length is not a multiple of 32.
pub fn decode_words(data: &[u8]) -> Result<Vec<Word>, ChainError> {
    if data.len() % 32 != 0 {
        return Err(ChainError::Decode(format!(
            "return data length {} is not word aligned",
            data.len()
        )));
    }
    Ok(data
        .chunks_exact(32)
        .map(|chunk| {
            let mut word = [0u8; 32];
            word.copy_from_slice(chunk);
            word
        })
        .collect())
}

/// Interprets a word as an unsigned integer that must fit in `u128`.
///
/// # Errors
///
/// Returns [`ChainError::Decode`] if the high 16 bytes are not zero.
pub fn word_u128(word: &Word) -> Result<u128, ChainError> {
    let (high, low) = word.split_at(16);
    if high.iter().any(|b| *b != 0) {
        return Err(ChainError::Decode("uint256 value exceeds u128".to_string()));
    }
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(low);
    Ok(u128::from_be_bytes(bytes))
}

/// Interprets a word as an unsigned integer that must fit in `u64`.
///
/// # Errors
///
/// Returns [`ChainError::Decode`] if the value exceeds `u64`.
pub fn word_u64(word: &Word) -> Result<u64, ChainError> {
    u64::try_from(word_u128(word)?)
        .map_err(|_| ChainError::Decode("uint256 value exceeds u64".to_string()))
}

fn word_at(words: &[Word], index: usize) -> Result<&Word, ChainError> {
    words
        .get(index)
        .ok_or_else(|| ChainError::Decode(format!("missing return word {index}")))
}

fn parse_hex_bytes(raw: &str) -> Result<Vec<u8>, ChainError> {
    let digits = raw.strip_prefix("0x").unwrap_or(raw);
    hex::decode(digits).map_err(|e| ChainError::Decode(format!("hex data: {e}")))
}

fn parse_hex_u64(raw: &str) -> Result<u64, ChainError> {
    let digits = raw.strip_prefix("0x").unwrap_or(raw);
    u64::from_str_radix(digits, 16).map_err(|e| ChainError::Decode(format!("quantity {raw}: {e}")))
}

fn timestamp(secs: u64) -> Result<DateTime<Utc>, ChainError> {
    i64::try_from(secs)
        .ok()
        .and_then(|s| DateTime::from_timestamp(s, 0))
        .ok_or_else(|| ChainError::Decode(format!("timestamp {secs} out of range")))
}

/// Assembles a cover from the two registry detail calls.
///
/// The first call returns `(cid, member, contract, currency, sumAssured,
/// premium)`, the second `(cid, status, sumAssured, period, validUntil)`.
fn decode_cover(id: u64, first: &[Word], second: &[Word]) -> Result<CoverRecord, ChainError> {
    let contract = Address::from_word(word_at(first, 2)?);
    let mut code = [0u8; 4];
    code.copy_from_slice(word_at(first, 3)?.split_at(4).0);
    let currency = Currency::from_code(code)
        .ok_or_else(|| ChainError::Decode(format!("cover {id} has unknown currency {code:?}")))?;
    let sum_assured = Decimal::from(word_u64(word_at(first, 4)?)?);
    let status = if word_u64(word_at(second, 1)?)? == STATUS_CLAIM_ACCEPTED {
        CoverStatus::ClaimAccepted
    } else {
        CoverStatus::Active
    };
    let valid_until = timestamp(word_u64(word_at(second, 4)?)?)?;

    Ok(CoverRecord {
        id,
        contract,
        currency,
        sum_assured,
        valid_until,
        status,
        requested_payout_amount: Decimal::ZERO,
    })
}
