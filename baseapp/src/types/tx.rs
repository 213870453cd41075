use std::any::Any;

use serde_derive::{Deserialize, Serialize};

use crate::error::{CResult, Error};
use crate::gas::Gas;

/// A single operation inside a transaction.
///
/// Messages are polymorphic: the core only cares about the route naming the
/// responsible handler, basic validity, and the signer set. Concrete message
/// types are registered by the application through its tx decoder, and
/// handlers downcast through `as_any` to recover them.
pub trait Msg: Send {
    /// Name of the handler route responsible for this message.
    fn route(&self) -> String;

    fn type_name(&self) -> String;

    /// Stateless validity check, run before any handler sees the message.
    fn validate_basic(&self) -> CResult<()>;

    /// Canonical bytes the signature layer signs over. The core never
    /// inspects them; signature verification is the ante handler's business.
    fn sign_bytes(&self) -> Vec<u8> {
        Vec::new()
    }

    /// Addresses expected to have signed the enclosing transaction.
    fn signers(&self) -> Vec<String> {
        Vec::new()
    }

    fn as_any(&self) -> &dyn Any;
}

/// An ordered, non-empty batch of messages plus fee and metadata. The core
/// does not look past the message list and the fee.
pub trait Tx: Send {
    fn msgs(&self) -> Vec<&dyn Msg>;

    fn fee(&self) -> &Fee;

    fn memo(&self) -> &str;

    fn as_any(&self) -> &dyn Any;
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Coin {
    pub denom: String,
    pub amount: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Fee {
    /// The gas limit the per-tx meter is created with.
    pub gas_wanted: Gas,
    pub amount: Vec<Coin>,
}

/// The stock transaction type: boxed messages, fee, memo, and signature
/// blobs the core never parses.
pub struct StdTx {
    pub msgs: Vec<Box<dyn Msg>>,
    pub fee: Fee,
    pub memo: String,
    pub signatures: Vec<Vec<u8>>,
}

impl Tx for StdTx {
    fn msgs(&self) -> Vec<&dyn Msg> {
        self.msgs.iter().map(|m| m.as_ref()).collect()
    }

    fn fee(&self) -> &Fee {
        &self.fee
    }

    fn memo(&self) -> &str {
        &self.memo
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Deserializes raw consensus bytes into a transaction. Registered once at
/// construction; the wire format is the application's business.
pub type TxDecoder = Box<dyn Fn(&[u8]) -> CResult<Box<dyn Tx>> + Send>;

/// What a message handler returns on success.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MsgResult {
    #[serde(with = "serde_bytes")]
    pub data: Vec<u8>,

    pub log: String,
}

/// The outcome of running one transaction through the pipeline.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TxResult {
    pub error: Option<Error>,

    #[serde(with = "serde_bytes")]
    pub data: Vec<u8>,

    pub log: String,
    pub gas_wanted: Gas,
    pub gas_used: Gas,
}

impl TxResult {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    pub fn from_error(error: Error, gas_wanted: Gas, gas_used: Gas) -> Self {
        Self {
            log: error.to_string(),
            error: Some(error),
            data: Vec::new(),
            gas_wanted,
            gas_used,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Ping;

    impl Msg for Ping {
        fn route(&self) -> String {
            "ping".to_string()
        }

        fn type_name(&self) -> String {
            "ping/Ping".to_string()
        }

        fn validate_basic(&self) -> CResult<()> {
            Ok(())
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[test]
    fn std_tx_exposes_its_messages() {
        let tx = StdTx {
            msgs: vec![Box::new(Ping), Box::new(Ping)],
            fee: Fee { gas_wanted: 100, amount: vec![] },
            memo: "hi".to_string(),
            signatures: vec![],
        };

        assert_eq!(tx.msgs().len(), 2);
        assert_eq!(tx.msgs()[0].route(), "ping");
        assert_eq!(tx.fee().gas_wanted, 100);
        assert_eq!(tx.memo(), "hi");
        assert!(tx.as_any().downcast_ref::<StdTx>().is_some());
    }

    #[test]
    fn tx_result_error_carries_log_and_gas() {
        let res = TxResult::from_error(Error::OutOfGas("handler".to_string()), 10, 16);
        assert!(!res.is_ok());
        assert_eq!(res.gas_wanted, 10);
        assert_eq!(res.gas_used, 16);
        assert_eq!(res.log, "out of gas: handler");
    }
}
