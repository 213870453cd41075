use std::any::Any;

use anyhow::Result;
use serde_derive::{Deserialize, Serialize};

use baseapp::app::{App, AppBuilder};
use baseapp::codec;
use baseapp::error::{CResult, Error};
use baseapp::gas;
use baseapp::storage::memory::MemDb;
use baseapp::storage::{Store, StoreKey};
use baseapp::types::tx::{Fee, Msg, MsgResult, Tx};
use baseapp::types::{
    BlockHeader, RequestBeginBlock, RequestEndBlock, RequestInitChain, RequestQuery,
};

const TOTAL_KEY: &[u8] = b"total";

fn main() {
    println!("Hello, baseapp!");

    run().unwrap();

    println!("Bye~");
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct WireTx {
    amounts: Vec<u64>,
    gas_wanted: u64,
}

struct AddMsg {
    amount: u64,
}

impl Msg for AddMsg {
    fn route(&self) -> String {
        "adder".to_string()
    }

    fn type_name(&self) -> String {
        "adder/Add".to_string()
    }

    fn validate_basic(&self) -> CResult<()> {
        if self.amount == 0 {
            return Err(Error::InvalidSequence("amount must be positive".to_string()));
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct AddTx {
    msgs: Vec<Box<dyn Msg>>,
    fee: Fee,
}

impl Tx for AddTx {
    fn msgs(&self) -> Vec<&dyn Msg> {
        self.msgs.iter().map(|m| m.as_ref()).collect()
    }

    fn fee(&self) -> &Fee {
        &self.fee
    }

    fn memo(&self) -> &str {
        ""
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn build_app(db: &MemDb, main_key: &StoreKey) -> Result<App> {
    let store_key = main_key.clone();
    let genesis_key = main_key.clone();

    let app = AppBuilder::new("adder", db.clone())
        .with_app_version("v0.1.0")
        .with_tx_decoder(Box::new(|bytes| {
            let wire: WireTx = codec::decode(bytes)?;
            let msgs = wire
                .amounts
                .iter()
                .map(|amount| Box::new(AddMsg { amount: *amount }) as Box<dyn Msg>)
                .collect();
            Ok(Box::new(AddTx {
                msgs,
                fee: Fee { gas_wanted: wire.gas_wanted, amount: vec![] },
            }) as Box<dyn Tx>)
        }))
        .with_ante_handler(Box::new(|ctx, tx, _simulate| {
            // One flat unit per transaction, against the fee's gas budget.
            let ctx = ctx.with_gas_meter(gas::finite_meter(tx.fee().gas_wanted));
            ctx.charge_gas(1, "ante");
            (ctx, Ok(()))
        }))
        .with_init_chainer(Box::new(move |ctx, req| {
            let genesis: serde_json::Value = serde_json::from_slice(&req.app_state)
                .map_err(|e| Error::TxDecode(e.to_string()))?;
            let total = genesis["total"].as_u64().unwrap_or(0);
            ctx.store(&genesis_key).lock().unwrap().set(TOTAL_KEY, total.to_be_bytes().to_vec());
            Ok(())
        }))
        .add_route(
            "adder",
            Box::new(move |ctx, msg| {
                let msg = msg.as_any().downcast_ref::<AddMsg>().expect("adder handles AddMsg");
                ctx.charge_gas(msg.amount, "add");

                let store = ctx.store(&store_key);
                let mut store = store.lock().unwrap();
                let total = store
                    .get(TOTAL_KEY)
                    .map(|bytes| u64::from_be_bytes(bytes.as_slice().try_into().unwrap()))
                    .unwrap_or(0)
                    + msg.amount;
                store.set(TOTAL_KEY, total.to_be_bytes().to_vec());

                Ok(MsgResult { data: vec![], log: format!("total {}", total) })
            }),
        )
        .mount_store(main_key)
        .load_latest_version()?;

    Ok(app)
}

fn run() -> Result<()> {
    let db = MemDb::new();
    let main_key = StoreKey::new("main");
    let mut app = build_app(&db, &main_key)?;

    app.init_chain(RequestInitChain {
        chain_id: "adder-chain".to_string(),
        consensus_params: None,
        app_state: serde_json::to_vec(&serde_json::json!({ "total": 100 }))?,
    })?;

    let header = BlockHeader { chain_id: "adder-chain".to_string(), height: 1, time: 0 };
    app.begin_block(RequestBeginBlock { header })?;

    for amounts in [vec![1, 2, 3], vec![10], vec![0]] {
        let tx = codec::encode(&WireTx { amounts: amounts.clone(), gas_wanted: 100 })?;
        let result = app.deliver_tx(&tx);
        match &result.error {
            None => println!("delivered {:?}: gas used {}", amounts, result.gas_used),
            Some(err) => println!("rejected {:?}: {}", amounts, err),
        }
    }

    app.end_block(RequestEndBlock { height: 1 })?;
    let commit = app.commit();
    println!(
        "committed version {} app hash {} bytes",
        app.last_commit_id().version,
        commit.data.len()
    );

    let response = app.query(RequestQuery {
        path: format!("/store/{}/key", main_key.name()),
        data: TOTAL_KEY.to_vec(),
        height: 0,
    });
    let total = u64::from_be_bytes(response.value.as_slice().try_into().unwrap());
    println!("total after block: {}", total);
    assert_eq!(total, 116);

    Ok(())
}
