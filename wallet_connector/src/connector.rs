use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use core_types::payload::{NodeInfo, TlvRecord, Transaction};
use xerror::wallet_connector::WalletConnectorError;

use crate::lnd::{LndConnector, LndConnectorSettings};

pub const LND_BACKEND_TYPE: &str = "lnd";

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct WalletConnectorSettings {
    /// Which backend to launch, e.g. `lnd`.
    pub backend_type: String,
    pub lnd: Option<LndConnectorSettings>,
}

/// Capability interface over a Lightning backend. All amounts cross this
/// boundary in millisatoshis; preimages and hashes are lowercase hex.
#[async_trait]
pub trait WalletConnector: Send + Sync {
    async fn send_payment(&self, invoice: String) -> Result<String, WalletConnectorError>;

    async fn send_keysend(
        &self,
        amount_msat: u64,
        dest_pubkey: String,
        preimage: Option<String>,
        tlv_records: Vec<TlvRecord>,
    ) -> Result<String, WalletConnectorError>;

    async fn get_balance(&self) -> Result<u64, WalletConnectorError>;

    async fn make_invoice(
        &self,
        amount_msat: u64,
        description: String,
        description_hash: String,
        expiry_seconds: u64,
    ) -> Result<Transaction, WalletConnectorError>;

    async fn lookup_invoice(&self, payment_hash: String) -> Result<Transaction, WalletConnectorError>;

    #[allow(clippy::too_many_arguments)]
    async fn list_transactions(
        &self,
        from: u64,
        until: u64,
        limit: u64,
        offset: u64,
        unpaid: bool,
        transaction_type: Option<String>,
    ) -> Result<Vec<Transaction>, WalletConnectorError>;

    async fn get_info(&self) -> Result<NodeInfo, WalletConnectorError>;

    async fn shutdown(&self) -> Result<(), WalletConnectorError>;
}

/// Create the wallet backend selected by the settings, shutting a prior
/// instance down first when relaunching. An unsupported backend type is a
/// configuration error and aborts the process; this only runs during init.
pub async fn launch_wallet_backend(
    settings: &WalletConnectorSettings,
    prior: Option<Arc<dyn WalletConnector>>,
) -> Result<Arc<dyn WalletConnector>, WalletConnectorError> {
    if let Some(prior) = prior {
        prior.shutdown().await?;
    }

    match settings.backend_type.as_str() {
        LND_BACKEND_TYPE => {
            let lnd_settings = settings
                .lnd
                .clone()
                .unwrap_or_else(|| panic!("Missing lnd settings for backend type {}", LND_BACKEND_TYPE));
            let connector = LndConnector::new(lnd_settings).await?;
            Ok(Arc::new(connector))
        }
        other => panic!("Unsupported wallet backend type: {}", other),
    }
}
