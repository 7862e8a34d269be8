//! External service clients.

pub mod rpc;

pub use rpc::{create_rpc_client, LedgerClient, RpcLedgerClient};
