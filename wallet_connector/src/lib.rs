pub mod connector;
pub mod lnd;

pub use connector::{launch_wallet_backend, WalletConnector, WalletConnectorSettings};
