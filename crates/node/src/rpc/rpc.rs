use core::{fmt::Display, str::FromStr};

use anyhow::anyhow;
use async_trait::async_trait;
use bitcoin::{
    block::{Header, Version},
    consensus::deserialize,
    hash_types::TxMerkleNode,
    hashes::Hash,
    hex::FromHex,
    Block, BlockHash, CompactTarget, Network, Transaction,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, to_value, value::RawValue};

use idx_primitives::{ChainedHeader, Height};

use super::traits::{BlockByHash, HeaderClient};

/// RPCError is a struct that represents an error returned by the Bitcoin RPC
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RPCError {
    pub code: i32,
    pub message: String,
}

impl Display for RPCError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "RPCError {}: {}", self.code, self.message)
    }
}

/// Response is a struct that represents a response returned by the Bitcoin RPC.
/// Generic over the type of the result field.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
struct Response<R = String> {
    pub result: Option<R>,
    pub error: Option<RPCError>,
    pub id: String,
}

/// BitcoinClient is a struct that represents a read-only connection to a
/// Bitcoin Core node: it only exercises the JSON-RPC methods this indexer's
/// block repository and chain view need.
#[derive(Debug, Clone)]
pub struct BitcoinClient {
    url: String,
    client: reqwest::Client,
    #[allow(dead_code)]
    network: Network,
}

impl BitcoinClient {
    pub fn new(url: String, username: String, password: String, network: Network) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(
            "Authorization",
            format!(
                "Basic {}",
                BASE64.encode(format!("{}:{}", username, password))
            )
            .parse()
            .expect("Failed to parse auth header!"),
        );
        headers.insert(
            "Content-Type",
            "application/json"
                .parse()
                .expect("Failed to parse content type header!"),
        );
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .expect("Failed to build client!");

        Self {
            url,
            client,
            network,
        }
    }

    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<serde_json::Value>,
    ) -> Result<T, anyhow::Error> {
        let response = self
            .client
            .post(&self.url)
            .json(&json!({
                "jsonrpc": "1.0",
                "id": method,
                "method": method,
                "params": params
            }))
            .send()
            .await;

        if let Err(error) = response {
            return Err(anyhow!(error));
        }

        let response = response.unwrap().json::<Response<T>>().await?;

        if let Some(error) = response.error {
            return Err(anyhow!(error));
        }

        Ok(response.result.unwrap())
    }

    /// Returns the current chain tip height as reported by the node.
    pub async fn get_block_count(&self) -> Result<u64, anyhow::Error> {
        self.call::<u64>("getblockcount", vec![]).await
    }

    /// Returns `(height, prev_hash, time)` for the block at `hash`, via
    /// `getblockheader`'s verbose JSON form.
    pub async fn get_block_header_info(
        &self,
        hash: String,
    ) -> Result<(u64, BlockHash, u32), anyhow::Error> {
        let result = self
            .call::<Box<RawValue>>("getblockheader", vec![to_value(hash)?, to_value(true)?])
            .await?
            .to_string();
        let info: serde_json::Value = serde_json::from_str(&result)?;

        let height = info["height"].as_u64().unwrap();
        let time = info["time"].as_u64().unwrap() as u32;
        // genesis has no previousblockhash field
        let prev_hash = match info["previousblockhash"].as_str() {
            Some(h) => BlockHash::from_str(h)?,
            None => BlockHash::all_zeros(),
        };

        Ok((height, prev_hash, time))
    }

    /// Returns the block at the given hash, with full transaction data.
    pub async fn get_block(&self, hash: String) -> Result<Block, anyhow::Error> {
        let result = self
            .call::<Box<RawValue>>("getblock", vec![to_value(hash.clone())?, to_value(3)?])
            .await?
            .to_string();

        let full_block: serde_json::Value = serde_json::from_str(&result)?;

        let header: Header = Header {
            bits: CompactTarget::from_consensus(u32::from_str_radix(
                full_block["bits"].as_str().unwrap(),
                16,
            )?),
            merkle_root: TxMerkleNode::from_str(full_block["merkleroot"].as_str().unwrap())?,
            nonce: full_block["nonce"].as_u64().unwrap() as u32,
            prev_blockhash: BlockHash::from_str(full_block["previousblockhash"].as_str().unwrap())?,
            time: full_block["time"].as_u64().unwrap() as u32,
            version: Version::from_consensus(full_block["version"].as_u64().unwrap() as i32),
        };

        let txdata = full_block["tx"].as_array().unwrap();

        let txs: Vec<Transaction> = txdata
            .iter()
            .map(|tx| {
                let tx_hex = tx["hex"].as_str().unwrap();
                deserialize(&hex::decode(tx_hex).unwrap()).unwrap()
            })
            .collect();

        Ok(Block {
            header,
            txdata: txs,
        })
    }

    /// Returns the 32-byte block hash at the given height.
    async fn get_block_hash(&self, height: u64) -> Result<[u8; 32], anyhow::Error> {
        let str_hash = self
            .call::<String>("getblockhash", vec![to_value(height)?])
            .await?;

        let bytes = Vec::from_hex(&str_hash)?;
        if bytes.len() != 32 {
            return Err(anyhow::anyhow!("Invalid hex length"));
        }
        let mut array = [0u8; 32];
        array.copy_from_slice(&bytes);
        Ok(array)
    }
}

#[async_trait]
impl HeaderClient for BitcoinClient {
    async fn header_by_hash(&self, hash: BlockHash) -> anyhow::Result<Option<ChainedHeader>> {
        match self.get_block_header_info(hash.to_string()).await {
            Ok((height, prev_hash, time)) => {
                Ok(Some(ChainedHeader::new(height, hash, prev_hash, time)))
            }
            Err(_) => Ok(None),
        }
    }

    async fn header_at_height(&self, height: Height) -> anyhow::Result<Option<ChainedHeader>> {
        let hash_bytes = match self.get_block_hash(height).await {
            Ok(h) => h,
            Err(_) => return Ok(None),
        };
        let hash = BlockHash::from_slice(&hash_bytes)?;
        self.header_by_hash(hash).await
    }

    async fn tip_height(&self) -> anyhow::Result<Height> {
        self.get_block_count().await
    }
}

#[async_trait]
impl BlockByHash for BitcoinClient {
    async fn block_by_hash(&self, hash: BlockHash) -> anyhow::Result<Option<Block>> {
        match self.get_block(hash.to_string()).await {
            Ok(block) => Ok(Some(block)),
            Err(_) => Ok(None),
        }
    }
}
