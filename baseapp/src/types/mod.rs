pub mod context;
pub mod tx;

use serde_derive::{Deserialize, Serialize};

use crate::error::Error;

/// Header of the block being executed, as handed over by consensus.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub chain_id: String,
    pub height: i64,

    /// Unix seconds.
    pub time: i64,
}

/// Consensus-level block limits captured at chain initialization.
///
/// `max_gas` follows the consensus sign convention: -1 and 0 both denote an
/// unlimited block gas budget, positive values are a hard limit, and values
/// below -1 are malformed.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BlockParams {
    pub max_gas: i64,
    pub max_bytes: i64,
}

impl Default for BlockParams {
    fn default() -> Self {
        Self { max_gas: -1, max_bytes: -1 }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestInitChain {
    pub chain_id: String,
    pub consensus_params: Option<BlockParams>,

    /// Opaque genesis payload handed to the init chainer.
    #[serde(with = "serde_bytes")]
    pub app_state: Vec<u8>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestBeginBlock {
    pub header: BlockHeader,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestEndBlock {
    pub height: i64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseEndBlock {}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestQuery {
    pub path: String,

    #[serde(with = "serde_bytes")]
    pub data: Vec<u8>,

    /// Committed version to read at; zero means latest.
    pub height: i64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseQuery {
    pub code: u32,
    pub error: Option<Error>,

    #[serde(with = "serde_bytes")]
    pub value: Vec<u8>,

    pub log: String,
    pub height: i64,
}

impl ResponseQuery {
    pub fn ok(value: Vec<u8>, height: i64) -> Self {
        Self { value, height, ..Default::default() }
    }

    pub fn err(error: Error, height: i64) -> Self {
        Self {
            code: error.code(),
            log: error.to_string(),
            error: Some(error),
            height,
            ..Default::default()
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseCommit {
    /// The app hash: the combined multi-store commit hash.
    #[serde(with = "serde_bytes")]
    pub data: Vec<u8>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseInfo {
    pub name: String,
    pub version: String,
    pub last_block_height: i64,

    #[serde(with = "serde_bytes")]
    pub last_block_app_hash: Vec<u8>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestSetOption {
    pub key: String,
    pub value: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseSetOption {
    pub code: u32,
    pub log: String,
}
