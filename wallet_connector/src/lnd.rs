use std::collections::HashMap;

use async_trait::async_trait;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;

use core_types::payload::{NodeInfo, TlvRecord, Transaction};
use xerror::wallet_connector::WalletConnectorError;

use crate::connector::WalletConnector;

/// TLV record carrying the keysend preimage.
const KEYSEND_PREIMAGE_RECORD: u64 = 5482373484;

const LIST_CHUNK_SIZE: u64 = 1000;

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LndConnectorSettings {
    pub node_url: String,
    pub macaroon_path: String,
    pub tls_path: String,
}

pub struct LndConnector {
    _settings: LndConnectorSettings,
    client: Mutex<tonic_lnd::Client>,
}

impl LndConnector {
    pub async fn new(settings: LndConnectorSettings) -> Result<Self, WalletConnectorError> {
        let client = tonic_lnd::connect(
            settings.node_url.clone(),
            settings.tls_path.clone(),
            settings.macaroon_path.clone(),
        )
        .await
        .map_err(|_| WalletConnectorError::FailedToConnect)?;

        Ok(Self {
            _settings: settings,
            client: Mutex::new(client),
        })
    }
}

#[async_trait]
impl WalletConnector for LndConnector {
    async fn send_payment(&self, invoice: String) -> Result<String, WalletConnectorError> {
        // Cap routing fees at 2%.
        let limit = tonic_lnd::rpc::fee_limit::Limit::Percent(2);
        let fee_limit = tonic_lnd::rpc::FeeLimit { limit: Some(limit) };
        let send_payment = tonic_lnd::rpc::SendRequest {
            payment_request: invoice,
            fee_limit: Some(fee_limit),
            allow_self_payment: true,
            ..Default::default()
        };

        let mut client = self.client.lock().await;
        let resp = client
            .send_payment_sync(send_payment)
            .await
            .map_err(|_| WalletConnectorError::FailedToSendPayment)?
            .into_inner();
        if !resp.payment_error.is_empty() {
            return Err(map_payment_error(&resp.payment_error));
        }
        Ok(hex::encode(resp.payment_preimage))
    }

    async fn send_keysend(
        &self,
        amount_msat: u64,
        dest_pubkey: String,
        preimage: Option<String>,
        tlv_records: Vec<TlvRecord>,
    ) -> Result<String, WalletConnectorError> {
        let preimage_bytes = match preimage {
            Some(preimage) => hex::decode(&preimage).map_err(|_| WalletConnectorError::Internal)?,
            None => {
                let mut bytes = [0u8; 32];
                rand::thread_rng().fill_bytes(&mut bytes);
                bytes.to_vec()
            }
        };
        let payment_hash = Sha256::digest(&preimage_bytes).to_vec();

        let mut dest_custom_records: HashMap<u64, Vec<u8>> = HashMap::new();
        dest_custom_records.insert(KEYSEND_PREIMAGE_RECORD, preimage_bytes.clone());
        for record in tlv_records {
            let value = hex::decode(&record.value).map_err(|_| WalletConnectorError::Internal)?;
            dest_custom_records.insert(record.tlv_type, value);
        }

        let send_payment = tonic_lnd::rpc::SendRequest {
            dest: hex::decode(&dest_pubkey).map_err(|_| WalletConnectorError::Internal)?,
            amt_msat: amount_msat as i64,
            payment_hash,
            dest_custom_records,
            final_cltv_delta: 40,
            ..Default::default()
        };

        let mut client = self.client.lock().await;
        let resp = client
            .send_payment_sync(send_payment)
            .await
            .map_err(|_| WalletConnectorError::FailedToSendPayment)?
            .into_inner();
        if !resp.payment_error.is_empty() {
            return Err(map_payment_error(&resp.payment_error));
        }
        Ok(hex::encode(preimage_bytes))
    }

    async fn get_balance(&self) -> Result<u64, WalletConnectorError> {
        let mut client = self.client.lock().await;
        let resp = client
            .channel_balance(tonic_lnd::rpc::ChannelBalanceRequest {})
            .await
            .map_err(|_| WalletConnectorError::Internal)?
            .into_inner();
        Ok(resp.balance as u64 * 1000)
    }

    async fn make_invoice(
        &self,
        amount_msat: u64,
        description: String,
        description_hash: String,
        expiry_seconds: u64,
    ) -> Result<Transaction, WalletConnectorError> {
        let description_hash_bytes = if description_hash.is_empty() {
            Vec::new()
        } else {
            hex::decode(&description_hash).map_err(|_| WalletConnectorError::FailedToCreateInvoice)?
        };

        let invoice = tonic_lnd::rpc::Invoice {
            memo: description.clone(),
            description_hash: description_hash_bytes,
            value_msat: amount_msat as i64,
            expiry: expiry_seconds as i64,
            ..Default::default()
        };

        let mut client = self.client.lock().await;
        let resp = client
            .add_invoice(invoice)
            .await
            .map_err(|_| WalletConnectorError::FailedToCreateInvoice)?
            .into_inner();

        let created_at = utils::time::time_now_seconds() as i64;
        Ok(Transaction {
            transaction_type: "incoming".to_string(),
            invoice: resp.payment_request,
            description,
            description_hash,
            preimage: String::new(),
            payment_hash: hex::encode(resp.r_hash),
            amount: amount_msat as i64,
            fees_paid: 0,
            created_at,
            expires_at: Some(created_at + expiry_seconds as i64),
            settled_at: None,
        })
    }

    async fn lookup_invoice(&self, payment_hash: String) -> Result<Transaction, WalletConnectorError> {
        let r_hash = hex::decode(&payment_hash).map_err(|_| WalletConnectorError::NotFound)?;
        let request = tonic_lnd::rpc::PaymentHash {
            r_hash,
            r_hash_str: payment_hash,
        };

        let mut client = self.client.lock().await;
        let resp = client.lookup_invoice(request).await.map_err(|status| {
            if status.message().contains("unable to locate invoice") {
                WalletConnectorError::NotFound
            } else {
                WalletConnectorError::Internal
            }
        })?;
        Ok(invoice_to_transaction(&resp.into_inner()))
    }

    async fn list_transactions(
        &self,
        from: u64,
        until: u64,
        limit: u64,
        offset: u64,
        unpaid: bool,
        transaction_type: Option<String>,
    ) -> Result<Vec<Transaction>, WalletConnectorError> {
        let incoming_only = transaction_type.as_deref() == Some("incoming");
        let outgoing_only = transaction_type.as_deref() == Some("outgoing");

        let mut transactions = Vec::new();

        if !outgoing_only {
            let request = tonic_lnd::rpc::ListInvoiceRequest {
                pending_only: unpaid,
                num_max_invoices: LIST_CHUNK_SIZE,
                reversed: true,
                ..Default::default()
            };
            let mut client = self.client.lock().await;
            let resp = client
                .list_invoices(request)
                .await
                .map_err(|_| WalletConnectorError::Internal)?
                .into_inner();
            transactions.extend(resp.invoices.iter().map(invoice_to_transaction));
        }

        // Outgoing payments have no unpaid state worth reporting.
        if !incoming_only && !unpaid {
            let request = tonic_lnd::rpc::ListPaymentsRequest {
                include_incomplete: false,
                max_payments: LIST_CHUNK_SIZE,
                reversed: true,
                ..Default::default()
            };
            let mut client = self.client.lock().await;
            let resp = client
                .list_payments(request)
                .await
                .map_err(|_| WalletConnectorError::Internal)?
                .into_inner();
            transactions.extend(resp.payments.iter().map(payment_to_transaction));
        }

        transactions.retain(|tx| {
            (from == 0 || tx.created_at >= from as i64) && (until == 0 || tx.created_at <= until as i64)
        });
        transactions.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let transactions = transactions
            .into_iter()
            .skip(offset as usize)
            .take(if limit == 0 { usize::MAX } else { limit as usize })
            .collect();
        Ok(transactions)
    }

    async fn get_info(&self) -> Result<NodeInfo, WalletConnectorError> {
        let mut client = self.client.lock().await;
        let resp = client
            .get_info(tonic_lnd::rpc::GetInfoRequest {})
            .await
            .map_err(|_| WalletConnectorError::FailedToGetNodeInfo)?
            .into_inner();

        let network = resp
            .chains
            .first()
            .map(|chain| chain.network.clone())
            .unwrap_or_default();
        Ok(NodeInfo {
            pubkey: resp.identity_pubkey,
            alias: resp.alias,
            color: resp.color,
            network,
            block_height: resp.block_height,
            block_hash: resp.block_hash,
        })
    }

    async fn shutdown(&self) -> Result<(), WalletConnectorError> {
        // The tonic channel closes when the client is dropped.
        Ok(())
    }
}

fn map_payment_error(payment_error: &str) -> WalletConnectorError {
    let lowered = payment_error.to_lowercase();
    if lowered.contains("insufficient") {
        WalletConnectorError::InsufficientBalance
    } else if lowered.contains("unable to find a path") || lowered.contains("no route") {
        WalletConnectorError::RouteNotFound
    } else {
        WalletConnectorError::FailedToSendPayment
    }
}

fn invoice_to_transaction(invoice: &tonic_lnd::rpc::Invoice) -> Transaction {
    let settled = invoice.state == tonic_lnd::rpc::invoice::InvoiceState::Settled as i32;
    Transaction {
        transaction_type: "incoming".to_string(),
        invoice: invoice.payment_request.clone(),
        description: invoice.memo.clone(),
        description_hash: hex::encode(&invoice.description_hash),
        preimage: if settled {
            hex::encode(&invoice.r_preimage)
        } else {
            String::new()
        },
        payment_hash: hex::encode(&invoice.r_hash),
        amount: invoice.value_msat,
        fees_paid: 0,
        created_at: invoice.creation_date,
        expires_at: Some(invoice.creation_date + invoice.expiry),
        settled_at: if settled { Some(invoice.settle_date) } else { None },
    }
}

fn payment_to_transaction(payment: &tonic_lnd::rpc::Payment) -> Transaction {
    Transaction {
        transaction_type: "outgoing".to_string(),
        invoice: payment.payment_request.clone(),
        description: String::new(),
        description_hash: String::new(),
        preimage: payment.payment_preimage.clone(),
        payment_hash: payment.payment_hash.clone(),
        amount: payment.value_msat,
        fees_paid: payment.fee_msat,
        created_at: payment.creation_date,
        expires_at: None,
        settled_at: Some(payment.creation_date),
    }
}
