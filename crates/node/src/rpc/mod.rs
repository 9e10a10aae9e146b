pub mod error;
#[allow(clippy::module_inception)]
pub mod rpc;
pub mod traits;

pub use error::ClientError;
pub use rpc::BitcoinClient;
pub use traits::{BlockByHash, HeaderClient};
